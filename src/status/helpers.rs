//! 下载列表的无状态辅助函数

use super::types::{DownloadId, DownloadRecord};

/// 移除所有已完成的下载，其余记录保持原有顺序
pub fn filter_completed_downloads(downloads: Vec<DownloadRecord>) -> Vec<DownloadRecord> {
    downloads.into_iter().filter(|d| !d.is_complete()).collect()
}

/// 按 ID 移除指定下载
///
/// 列表中不存在该 ID 时原样返回
pub fn remove_selected_download(id: DownloadId, downloads: Vec<DownloadRecord>) -> Vec<DownloadRecord> {
    downloads.into_iter().filter(|d| d.id != id).collect()
}

/// 是否存在下载中的记录
pub fn has_in_progress(downloads: &[DownloadRecord]) -> bool {
    downloads.iter().any(DownloadRecord::is_in_progress)
}
