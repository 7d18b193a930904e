//! 内容脚本发往协调器的命令消息
//!
//! 每条消息带有 `event` 字段，负载中的 `download` 只需要 `id`，
//! 完整的下载记录也可以直接传入（多余字段会被忽略）

use super::types::DownloadId;
use serde::{Deserialize, Serialize};

/// 下载引用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRef {
    pub id: DownloadId,
}

impl From<DownloadId> for DownloadRef {
    fn from(id: DownloadId) -> Self {
        Self { id }
    }
}

/// 状态栏命令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum StatusCommand {
    /// 清除所有已完成的下载
    ClearDownloads,
    /// 从状态栏清除单个下载
    ClearDownload { download: DownloadRef },
    /// 在文件管理器中显示
    ShowDownload { download: DownloadRef },
    CancelDownload { download: DownloadRef },
    PauseDownload { download: DownloadRef },
    ResumeDownload { download: DownloadRef },
    /// 删除下载的本地文件
    DeleteDownload { download: DownloadRef },
}

impl StatusCommand {
    /// 命令名称（与协议中的 `event` 字段一致）
    pub fn name(&self) -> &'static str {
        match self {
            StatusCommand::ClearDownloads => "clearDownloads",
            StatusCommand::ClearDownload { .. } => "clearDownload",
            StatusCommand::ShowDownload { .. } => "showDownload",
            StatusCommand::CancelDownload { .. } => "cancelDownload",
            StatusCommand::PauseDownload { .. } => "pauseDownload",
            StatusCommand::ResumeDownload { .. } => "resumeDownload",
            StatusCommand::DeleteDownload { .. } => "deleteDownload",
        }
    }

    /// 命令针对的下载 ID
    pub fn download_id(&self) -> Option<DownloadId> {
        match self {
            StatusCommand::ClearDownloads => None,
            StatusCommand::ClearDownload { download }
            | StatusCommand::ShowDownload { download }
            | StatusCommand::CancelDownload { download }
            | StatusCommand::PauseDownload { download }
            | StatusCommand::ResumeDownload { download }
            | StatusCommand::DeleteDownload { download } => Some(download.id),
        }
    }
}
