//! 基于 JSON 文件的选项存储
//!
//! 文件内容为扁平 JSON 对象，例如 `{"autohideEnable": true, "autohideDuration": 5}`。
//! 文件不存在时视为空选项；启用监听后文件的任何修改都会被重新读取、与上次内容比较，
//! 并把变化的键作为一批变更广播出去

use super::{OptionsStore, PlatformError, PlatformResult};
use crate::status::{OptionChange, OptionsSnapshot};
use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// 变更通知通道容量
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// JSON 文件选项存储
pub struct FileOptionsStore {
    path: PathBuf,
    /// 最近一次读取/写入的内容
    current: Arc<Mutex<OptionsSnapshot>>,
    sender: broadcast::Sender<Vec<OptionChange>>,
    /// 文件监听器，drop 后停止监听
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl FileOptionsStore {
    /// 打开选项文件（不存在时为空选项）
    pub async fn open(path: impl Into<PathBuf>) -> PlatformResult<Self> {
        let path = path.into();
        let snapshot = read_options_file(&path)?;
        info!("选项文件已加载: {:?} ({} 项)", path, snapshot.len());

        let (sender, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            current: Arc::new(Mutex::new(snapshot)),
            sender,
            watcher: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 启动文件监听
    ///
    /// 监听文件所在目录而不是文件本身，编辑器替换文件时也能收到事件
    pub fn start_watching(&self) -> PlatformResult<()> {
        let mut guard = self.watcher.lock();
        if guard.is_some() {
            return Ok(());
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let path = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let current = Arc::clone(&self.current);
        let sender = self.sender.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if event.kind.is_access() {
                        return;
                    }
                    let touches_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_file {
                        return;
                    }
                    if let Err(e) = reload_into(&path, &current, &sender) {
                        warn!("重新加载选项文件失败: {:?}, 错误: {}", path, e);
                    }
                }
                Err(e) => warn!("选项文件监听错误: {:?}", e),
            }
        })
        .map_err(|e| PlatformError::Unavailable(format!("创建文件监听器失败: {}", e)))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| PlatformError::Unavailable(format!("监听目录失败: {}", e)))?;

        info!("选项文件监听已启动: {:?}", self.path);
        *guard = Some(watcher);
        Ok(())
    }

    /// 停止文件监听
    pub fn stop_watching(&self) {
        if self.watcher.lock().take().is_some() {
            info!("选项文件监听已停止: {:?}", self.path);
        }
    }

    /// 立即从磁盘重新读取并广播变化
    pub fn reload(&self) -> PlatformResult<Vec<OptionChange>> {
        reload_into(&self.path, &self.current, &self.sender)
    }
}

#[async_trait]
impl OptionsStore for FileOptionsStore {
    async fn get_all(&self) -> PlatformResult<OptionsSnapshot> {
        Ok(self.current.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<OptionChange>> {
        self.sender.subscribe()
    }

    async fn set(&self, changes: Vec<OptionChange>) -> PlatformResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut next = self.current.lock().clone();
        next.apply(&changes);

        let content = serde_json::to_string_pretty(&next)
            .map_err(|e| PlatformError::Io(format!("序列化选项失败: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, content).await?;

        // 监听器可能已经先一步读到新内容，这里按差异广播，避免重复通知
        let effective = {
            let mut current = self.current.lock();
            let effective = current.diff(&next);
            *current = next;
            effective
        };

        if !effective.is_empty() {
            debug!("选项已写入: {} 项变更", effective.len());
            let _ = self.sender.send(effective);
        }
        Ok(())
    }
}

/// 读取选项文件，文件不存在时返回空选项
fn read_options_file(path: &Path) -> PlatformResult<OptionsSnapshot> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(OptionsSnapshot::new()),
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| PlatformError::Io(format!("解析选项文件失败: {}", e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(OptionsSnapshot::new()),
        Err(e) => Err(e.into()),
    }
}

/// 重新读取文件，与当前内容比较后更新并广播
fn reload_into(
    path: &Path,
    current: &Mutex<OptionsSnapshot>,
    sender: &broadcast::Sender<Vec<OptionChange>>,
) -> PlatformResult<Vec<OptionChange>> {
    let next = read_options_file(path)?;

    let changes = {
        let mut current = current.lock();
        let changes = current.diff(&next);
        if !changes.is_empty() {
            *current = next;
        }
        changes
    };

    if !changes.is_empty() {
        info!(
            "选项文件已变更: {:?}",
            changes.iter().map(|c| c.key.as_str()).collect::<Vec<_>>()
        );
        // 没有订阅者时发送失败，忽略
        let _ = sender.send(changes.clone());
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{AUTOHIDE_DURATION, AUTOHIDE_ENABLE};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileOptionsStore::open(dir.path().join("options.json")).await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileOptionsStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_set_writes_file_and_notifies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        let store = FileOptionsStore::open(&path).await.unwrap();
        let mut rx = store.subscribe();

        store
            .set(vec![
                OptionChange::set(AUTOHIDE_ENABLE, json!(true)),
                OptionChange::set(AUTOHIDE_DURATION, json!(5)),
            ])
            .await
            .unwrap();

        let changes = rx.recv().await.unwrap();
        assert_eq!(changes.len(), 2);

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"autohideEnable": true, "autohideDuration": 5}));

        let snapshot = store.get_all().await.unwrap();
        assert_eq!(snapshot.autohide_delay(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_reload_broadcasts_only_changed_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"autohideEnable": false, "autohideDuration": 5}"#).unwrap();

        let store = FileOptionsStore::open(&path).await.unwrap();
        let mut rx = store.subscribe();

        std::fs::write(&path, r#"{"autohideEnable": true, "autohideDuration": 5}"#).unwrap();
        let changes = store.reload().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key, AUTOHIDE_ENABLE);
        assert_eq!(changes[0].new_value, Some(json!(true)));
        assert_eq!(rx.recv().await.unwrap(), changes);

        // 内容未变化时不广播
        assert!(store.reload().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
