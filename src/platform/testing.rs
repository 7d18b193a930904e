//! 单元测试用的平台能力替身

use super::{DownloadRegistry, OptionsStore, PlatformError, PlatformResult, TabId, TabRegistry};
use crate::status::{DownloadId, DownloadRecord, DownloadState, OptionChange, OptionsSnapshot};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// 可注入故障的下载注册表
#[derive(Default)]
pub struct FakeRegistry {
    records: Mutex<HashMap<DownloadId, DownloadRecord>>,
    /// 查询会失败的下载
    failing_lookups: Mutex<HashSet<DownloadId>>,
    /// 控制操作会被拒绝的下载
    rejecting_actions: Mutex<HashSet<DownloadId>>,
    /// 已执行的调用，如 `pause:1`
    calls: Mutex<Vec<String>>,
    search_delay: Mutex<Option<Duration>>,
    searches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, record: DownloadRecord) {
        self.records.lock().insert(record.id, record);
    }

    pub fn set_state(&self, id: DownloadId, state: DownloadState) {
        if let Some(record) = self.records.lock().get_mut(&id) {
            record.state = state;
        }
    }

    pub fn fail_lookup(&self, id: DownloadId) {
        self.failing_lookups.lock().insert(id);
    }

    pub fn reject_actions(&self, id: DownloadId) {
        self.rejecting_actions.lock().insert(id);
    }

    pub fn set_search_delay(&self, delay: Duration) {
        *self.search_delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// 同时进行中的查询数量峰值
    pub fn max_concurrent_searches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn action(&self, name: &str, id: DownloadId) -> PlatformResult<()> {
        self.calls.lock().push(format!("{}:{}", name, id));
        if self.rejecting_actions.lock().contains(&id) {
            return Err(PlatformError::InvalidState {
                id,
                reason: format!("{} rejected", name),
            });
        }
        if !self.records.lock().contains_key(&id) {
            return Err(PlatformError::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadRegistry for FakeRegistry {
    async fn search(&self, id: DownloadId) -> PlatformResult<Vec<DownloadRecord>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.search_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.failing_lookups.lock().contains(&id) {
            Err(PlatformError::Unavailable(format!("lookup {} failed", id)))
        } else {
            Ok(self.records.lock().get(&id).cloned().into_iter().collect())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn show(&self, id: DownloadId) -> PlatformResult<()> {
        self.action("show", id)
    }

    async fn cancel(&self, id: DownloadId) -> PlatformResult<()> {
        self.action("cancel", id)?;
        if let Some(record) = self.records.lock().get_mut(&id) {
            record.state = DownloadState::Interrupted;
        }
        Ok(())
    }

    async fn pause(&self, id: DownloadId) -> PlatformResult<()> {
        self.action("pause", id)?;
        if let Some(record) = self.records.lock().get_mut(&id) {
            record.paused = true;
        }
        Ok(())
    }

    async fn resume(&self, id: DownloadId) -> PlatformResult<()> {
        self.action("resume", id)?;
        if let Some(record) = self.records.lock().get_mut(&id) {
            record.paused = false;
        }
        Ok(())
    }

    async fn remove_file(&self, id: DownloadId) -> PlatformResult<()> {
        self.action("remove_file", id)?;
        if let Some(record) = self.records.lock().get_mut(&id) {
            record.exists = false;
        }
        Ok(())
    }
}

/// 记录所有投递消息的标签页注册表
#[derive(Default)]
pub struct RecordingTabs {
    tabs: Mutex<Vec<TabId>>,
    sent: Mutex<Vec<(TabId, Vec<DownloadRecord>)>>,
}

impl RecordingTabs {
    pub fn with_tabs(tabs: &[&str]) -> Self {
        Self {
            tabs: Mutex::new(tabs.iter().map(|t| t.to_string()).collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<(TabId, Vec<DownloadRecord>)> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// 某个标签页最近收到的下载 ID 列表
    pub fn last_ids(&self, tab: &str) -> Option<Vec<DownloadId>> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(t, _)| t == tab)
            .map(|(_, downloads)| downloads.iter().map(|d| d.id).collect())
    }
}

#[async_trait]
impl TabRegistry for RecordingTabs {
    async fn query_tabs(&self) -> PlatformResult<Vec<TabId>> {
        Ok(self.tabs.lock().clone())
    }

    async fn send_message(&self, tab: &str, downloads: &[DownloadRecord]) -> PlatformResult<()> {
        if !self.tabs.lock().iter().any(|t| t == tab) {
            return Err(PlatformError::TabUnavailable(tab.to_string()));
        }
        self.sent.lock().push((tab.to_string(), downloads.to_vec()));
        Ok(())
    }
}

/// 内存选项存储
pub struct MemoryOptionsStore {
    snapshot: Mutex<OptionsSnapshot>,
    sender: broadcast::Sender<Vec<OptionChange>>,
}

impl MemoryOptionsStore {
    pub fn new(snapshot: OptionsSnapshot) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            snapshot: Mutex::new(snapshot),
            sender,
        }
    }

    /// 模拟外部修改
    pub fn push(&self, changes: Vec<OptionChange>) {
        self.snapshot.lock().apply(&changes);
        let _ = self.sender.send(changes);
    }
}

#[async_trait]
impl OptionsStore for MemoryOptionsStore {
    async fn get_all(&self) -> PlatformResult<OptionsSnapshot> {
        Ok(self.snapshot.lock().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<OptionChange>> {
        self.sender.subscribe()
    }

    async fn set(&self, changes: Vec<OptionChange>) -> PlatformResult<()> {
        self.push(changes);
        Ok(())
    }
}
