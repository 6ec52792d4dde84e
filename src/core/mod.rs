//! 核心框架模块
//!
//! - Service: 长生命周期服务的公共约定

pub mod service;

pub use service::Service;
