//! 平台能力抽象
//!
//! 协调器通过以下三个 trait 访问宿主平台：
//! - `DownloadRegistry`: 权威下载注册表（查询与控制单个下载）
//! - `TabRegistry`: 标签页注册表（枚举标签页并投递消息）
//! - `OptionsStore`: 用户选项存储（读取与变更通知）
//!
//! 具体实现：
//! - `local.rs`: 进程内下载注册表，由宿主桥接通过 HTTP 上报数据
//! - `file_options.rs`: 基于 JSON 文件的选项存储，文件变化时热加载
//! - WebSocket 连接作为标签页，见 `server::websocket`

pub mod file_options;
pub mod local;

#[cfg(test)]
pub(crate) mod testing;

use crate::status::{DownloadId, DownloadRecord, OptionChange, OptionsSnapshot};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

pub use file_options::FileOptionsStore;
pub use local::LocalDownloadRegistry;

/// 标签页 ID
pub type TabId = String;

/// 平台调用错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("下载不存在: {0}")]
    NotFound(DownloadId),

    #[error("下载 {id} 当前状态不允许该操作: {reason}")]
    InvalidState { id: DownloadId, reason: String },

    #[error("标签页不可用: {0}")]
    TabUnavailable(TabId),

    #[error("I/O 错误: {0}")]
    Io(String),

    #[error("平台不可用: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for PlatformError {
    fn from(e: std::io::Error) -> Self {
        PlatformError::Io(e.to_string())
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// 权威下载注册表
#[async_trait]
pub trait DownloadRegistry: Send + Sync {
    /// 按 ID 查询下载，正常情况下最多返回一条
    async fn search(&self, id: DownloadId) -> PlatformResult<Vec<DownloadRecord>>;

    /// 在系统文件管理器中显示下载的文件
    async fn show(&self, id: DownloadId) -> PlatformResult<()>;

    async fn cancel(&self, id: DownloadId) -> PlatformResult<()>;

    async fn pause(&self, id: DownloadId) -> PlatformResult<()>;

    async fn resume(&self, id: DownloadId) -> PlatformResult<()>;

    /// 删除下载对应的本地文件
    async fn remove_file(&self, id: DownloadId) -> PlatformResult<()>;
}

/// 标签页注册表
#[async_trait]
pub trait TabRegistry: Send + Sync {
    /// 枚举当前所有打开的标签页
    async fn query_tabs(&self) -> PlatformResult<Vec<TabId>>;

    /// 向标签页投递下载列表，标签页没有监听者时返回错误，调用方可忽略
    async fn send_message(&self, tab: &str, downloads: &[DownloadRecord]) -> PlatformResult<()>;
}

/// 用户选项存储
#[async_trait]
pub trait OptionsStore: Send + Sync {
    async fn get_all(&self) -> PlatformResult<OptionsSnapshot>;

    /// 订阅变更通知，每条通知包含一批变更
    fn subscribe(&self) -> broadcast::Receiver<Vec<OptionChange>>;

    async fn set(&self, changes: Vec<OptionChange>) -> PlatformResult<()>;
}
