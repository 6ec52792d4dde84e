//! 文件查找模块
//!
//! 工作区文件枚举与读取，供搜索工作流使用

pub mod local;

pub use local::LocalFileLookup;
