//! 进程内下载注册表
//!
//! 宿主桥接（浏览器侧）通过 HTTP 上报下载的创建与变更，本注册表保存每个下载的权威快照，
//! 控制操作（取消/暂停/恢复）直接修改快照，桥接可回读 `/downloads/registry/:id` 同步到真实下载

use super::{DownloadRegistry, PlatformError, PlatformResult};
use crate::status::{DownloadDelta, DownloadId, DownloadRecord, DownloadState};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 用户取消时写入的中断原因
pub const USER_CANCELED: &str = "USER_CANCELED";

/// 进程内下载注册表
#[derive(Debug, Default)]
pub struct LocalDownloadRegistry {
    records: DashMap<DownloadId, DownloadRecord>,
}

impl LocalDownloadRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// 写入（或覆盖）一条下载记录
    pub fn upsert(&self, record: DownloadRecord) {
        debug!("注册表写入下载: id={}, state={}", record.id, record.state.as_str());
        self.records.insert(record.id, record);
    }

    /// 应用变更增量，返回更新后的记录
    pub fn apply_delta(&self, delta: &DownloadDelta) -> PlatformResult<DownloadRecord> {
        let mut entry = self
            .records
            .get_mut(&delta.id)
            .ok_or(PlatformError::NotFound(delta.id))?;
        entry.apply_delta(delta);
        Ok(entry.clone())
    }

    pub fn get(&self, id: DownloadId) -> Option<DownloadRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    /// 从注册表中删除记录（宿主报告下载被清除时使用）
    pub fn remove(&self, id: DownloadId) -> Option<DownloadRecord> {
        self.records.remove(&id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 在持有记录可变引用的情况下执行状态转换
    fn transition<F>(&self, id: DownloadId, f: F) -> PlatformResult<()>
    where
        F: FnOnce(&mut DownloadRecord) -> Result<(), String>,
    {
        let mut entry = self.records.get_mut(&id).ok_or(PlatformError::NotFound(id))?;
        f(entry.value_mut()).map_err(|reason| PlatformError::InvalidState { id, reason })
    }

    fn file_path(&self, id: DownloadId) -> PlatformResult<PathBuf> {
        let record = self.get(id).ok_or(PlatformError::NotFound(id))?;
        record
            .filename
            .map(PathBuf::from)
            .ok_or_else(|| PlatformError::InvalidState {
                id,
                reason: "下载没有本地文件名".to_string(),
            })
    }
}

#[async_trait]
impl DownloadRegistry for LocalDownloadRegistry {
    async fn search(&self, id: DownloadId) -> PlatformResult<Vec<DownloadRecord>> {
        Ok(self.get(id).into_iter().collect())
    }

    async fn show(&self, id: DownloadId) -> PlatformResult<()> {
        let path = self.file_path(id)?;
        info!("在文件管理器中显示下载: id={}, path={:?}", id, path);
        reveal_in_file_manager(&path)
    }

    async fn cancel(&self, id: DownloadId) -> PlatformResult<()> {
        self.transition(id, |record| {
            if !record.is_in_progress() {
                return Err(format!("只能取消下载中的任务，当前状态: {}", record.state.as_str()));
            }
            record.state = DownloadState::Interrupted;
            record.error = Some(USER_CANCELED.to_string());
            record.paused = false;
            record.can_resume = Some(false);
            Ok(())
        })?;
        info!("下载已取消: id={}", id);
        Ok(())
    }

    async fn pause(&self, id: DownloadId) -> PlatformResult<()> {
        self.transition(id, |record| {
            if !record.is_in_progress() {
                return Err(format!("只能暂停下载中的任务，当前状态: {}", record.state.as_str()));
            }
            if record.paused {
                return Err("下载已处于暂停状态".to_string());
            }
            record.paused = true;
            record.can_resume = Some(true);
            Ok(())
        })?;
        info!("下载已暂停: id={}", id);
        Ok(())
    }

    async fn resume(&self, id: DownloadId) -> PlatformResult<()> {
        self.transition(id, |record| {
            let resumable = match record.state {
                DownloadState::InProgress => record.paused,
                DownloadState::Interrupted => record.can_resume.unwrap_or(false),
                DownloadState::Complete => false,
            };
            if !resumable {
                return Err(format!("下载不可恢复，当前状态: {}", record.state.as_str()));
            }
            record.state = DownloadState::InProgress;
            record.paused = false;
            record.error = None;
            Ok(())
        })?;
        info!("下载已恢复: id={}", id);
        Ok(())
    }

    async fn remove_file(&self, id: DownloadId) -> PlatformResult<()> {
        let record = self.get(id).ok_or(PlatformError::NotFound(id))?;
        if !record.is_complete() {
            return Err(PlatformError::InvalidState {
                id,
                reason: "只能删除已完成下载的文件".to_string(),
            });
        }
        let path = self.file_path(id)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("已删除下载文件: id={}, path={:?}", id, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("下载文件已不存在，视为删除成功: id={}, path={:?}", id, path);
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(mut entry) = self.records.get_mut(&id) {
            entry.exists = false;
        }
        Ok(())
    }
}

/// 启动外部程序，并在后台等待其退出以回收进程
fn spawn_detached(command: &mut Command) -> std::io::Result<JoinHandle<()>> {
    let mut child = command.spawn()?;
    Ok(tokio::spawn(async move {
        if let Err(e) = child.wait().await {
            debug!("等待文件管理器进程退出失败: {}", e);
        }
    }))
}

/// 在系统文件管理器中显示文件（跨平台）
fn reveal_in_file_manager(path: &Path) -> PlatformResult<()> {
    #[cfg(target_os = "windows")]
    {
        spawn_detached(Command::new("explorer").arg(format!("/select,{}", path.display())))
            .map_err(|e| PlatformError::Io(format!("无法打开资源管理器: {}", e)))?;
    }

    #[cfg(target_os = "macos")]
    {
        spawn_detached(Command::new("open").arg("-R").arg(path))
            .map_err(|e| PlatformError::Io(format!("无法打开 Finder: {}", e)))?;
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        // xdg-open 不支持选中文件，退而打开所在目录
        let dir = path.parent().unwrap_or(path);
        let mut opened = spawn_detached(Command::new("xdg-open").arg(dir)).is_ok();

        if !opened {
            for fm in ["nautilus", "dolphin", "thunar", "pcmanfm", "nemo"] {
                if spawn_detached(Command::new(fm).arg(dir)).is_ok() {
                    opened = true;
                    break;
                }
            }
        }

        if !opened {
            return Err(PlatformError::Unavailable(
                "未找到可用的文件管理器，请安装 xdg-open".to_string(),
            ));
        }
    }

    Ok(())
}
