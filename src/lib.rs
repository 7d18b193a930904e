// Download Status Library
// 浏览器下载状态栏的后台协调服务

// 公共模块（刷新合并等）
pub mod common;

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 平台能力抽象与本地实现
pub mod platform;

// Web服务器模块
pub mod server;

// 下载状态协调模块
pub mod status;

// 导出常用类型
pub use config::AppConfig;
pub use platform::{
    DownloadRegistry, FileOptionsStore, LocalDownloadRegistry, OptionsStore, PlatformError,
    TabRegistry,
};
pub use server::AppState;
pub use status::{
    DownloadDelta, DownloadId, DownloadRecord, DownloadState, DownloadStatusCoordinator,
    OptionChange, OptionsSnapshot, StatusCommand, StatusError,
};
