//! zsearch - 编辑器内的增量搜索引擎
//!
//! 模块结构：
//! - core: 核心约定（Service）
//! - kernel::services::ports: 数据契约（Match, SearchEvent, FileLookup, SearchSettings）
//! - kernel::services::adapters: 实现（匹配器、搜索缓存、扫描流水线、工作流、防抖协调器）

pub mod core;
pub mod kernel;

pub use kernel::services::adapters::{DebouncedSearch, LocalFileLookup, SearchWorkflow};
pub use kernel::services::ports::{
    FileLookup, FileMatchSet, Match, MatchRange, SearchEvent, SearchMode, SearchParams,
    SearchRequest, SearchSettings,
};
