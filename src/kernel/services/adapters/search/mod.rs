//! 增量搜索引擎
//!
//! - matcher: 分块模式匹配（Text / Regex，捕获组后缀）
//! - cache: 按查询前缀组织的搜索树
//! - pipeline: 有界并发扫描 + 取消信号
//! - workflow: 单次运行的状态机
//! - coordinator: 防抖入口

mod cache;
mod coordinator;
mod events;
mod matcher;
mod pipeline;
mod workflow;

pub use cache::{CacheNode, NodeId, SearchCache, DEFAULT_MAX_SIZE};
pub use coordinator::DebouncedSearch;
pub use events::EventHub;
pub use matcher::{find_all, find_matches, scan, ChunkScanner, CompiledQuery, ScanStatus, ScanStep};
pub use pipeline::{CancelSignal, PipelineOutcome, ScanPipeline};
pub use workflow::{SearchWorkflow, WorkflowState};
