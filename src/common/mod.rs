//! 公共模块
//!
//! 提供跨模块使用的通用组件

mod refresh_coordinator;

pub use refresh_coordinator::{RefreshCoordinator, RefreshGuard};
