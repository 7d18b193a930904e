//! 下载状态协调器
//!
//! 持有被跟踪的下载列表，与平台的权威注册表对账，并把列表广播给所有标签页。
//!
//! ## 状态机
//! - Idle：不轮询
//! - Polling：按固定间隔（默认 1 秒）执行 `refresh()`
//!
//! 下载创建或任何非完成的变更事件使其进入 Polling；
//! 只有在一轮 `refresh()` 结束时发现没有下载中的记录才回到 Idle。
//!
//! ## 并发
//! - 列表只通过本模块的方法修改
//! - 对账刷新经 `RefreshCoordinator` 合并，同一时刻最多一个在执行
//! - 对账结果合并进当前列表：对账期间被移除的记录不会复活，新加入的记录会保留

use super::autohide::AutoHideTimers;
use super::helpers;
use super::message::StatusCommand;
use super::options::{OptionChange, OptionsSnapshot};
use super::types::{DownloadDelta, DownloadId, DownloadRecord};
use crate::common::RefreshCoordinator;
use crate::platform::{DownloadRegistry, OptionsStore, PlatformError, TabRegistry};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 协调器配置
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// 有下载进行中时的对账间隔
    pub poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// 命令执行错误
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("平台调用失败: {0}")]
    Platform(#[from] PlatformError),
}

pub type StatusResult<T> = Result<T, StatusError>;

/// 下载状态协调器
pub struct DownloadStatusCoordinator {
    registry: Arc<dyn DownloadRegistry>,
    tabs: Arc<dyn TabRegistry>,
    config: CoordinatorConfig,
    /// 被跟踪的下载（按发现顺序）
    downloads: RwLock<Vec<DownloadRecord>>,
    /// 用户选项镜像
    options: RwLock<OptionsSnapshot>,
    /// 轮询任务的取消令牌，`Some` 表示处于 Polling 状态
    polling: Mutex<Option<CancellationToken>>,
    refresh_coordinator: RefreshCoordinator,
    autohide: AutoHideTimers,
    options_listener: Mutex<Option<CancellationToken>>,
    /// 供后台任务回调使用，避免循环引用
    weak_self: Weak<DownloadStatusCoordinator>,
}

impl DownloadStatusCoordinator {
    /// 创建协调器，初始状态为 Idle
    pub fn new(
        registry: Arc<dyn DownloadRegistry>,
        tabs: Arc<dyn TabRegistry>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            registry,
            tabs,
            config,
            downloads: RwLock::new(Vec::new()),
            options: RwLock::new(OptionsSnapshot::new()),
            polling: Mutex::new(None),
            refresh_coordinator: RefreshCoordinator::new(),
            autohide: AutoHideTimers::new(),
            options_listener: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    // ==================== 查询 ====================

    /// 当前跟踪的下载列表
    pub fn downloads(&self) -> Vec<DownloadRecord> {
        self.downloads.read().clone()
    }

    /// 当前选项快照
    pub fn options(&self) -> OptionsSnapshot {
        self.options.read().clone()
    }

    /// 是否处于 Polling 状态
    pub fn is_polling(&self) -> bool {
        self.polling.lock().is_some()
    }

    /// 等待中的自动隐藏定时器数量
    pub fn pending_autohide(&self) -> usize {
        self.autohide.len()
    }

    // ==================== 平台事件 ====================

    /// 平台通知：新下载已创建
    pub fn on_download_created(&self, record: DownloadRecord) {
        let id = record.id;
        {
            let mut downloads = self.downloads.write();
            match downloads.iter_mut().find(|d| d.id == id) {
                // 平台保证 ID 唯一，重复上报时只更新快照
                Some(existing) => *existing = record,
                None => downloads.push(record),
            }
        }
        debug!("开始跟踪下载: id={}", id);
        self.start_polling();
    }

    /// 平台通知：下载发生变化
    ///
    /// 完成事件按选项调度自动隐藏，其余变更确保轮询处于活动状态
    pub fn on_download_changed(&self, delta: &DownloadDelta) {
        if delta.is_complete() {
            let delay = self.options.read().autohide_delay();
            if let Some(delay) = delay {
                self.schedule_autohide(delta.id, delay);
            }
        } else {
            self.start_polling();
        }
    }

    /// 标签页加载完成，立即推送当前快照
    pub async fn on_tab_loaded(&self, tab: &str) {
        let downloads = self.downloads();
        if let Err(e) = self.tabs.send_message(tab, &downloads).await {
            debug!("向新加载的标签页推送失败: tab={}, 错误: {}", tab, e);
        }
    }

    // ==================== 选项 ====================

    /// 接入选项存储：读取完整快照并持续应用变更通知
    ///
    /// 先订阅再读取，读取期间到达的变更会被再次应用（幂等）
    pub async fn attach_options(&self, store: Arc<dyn OptionsStore>) -> StatusResult<()> {
        let mut receiver = store.subscribe();
        let snapshot = store.get_all().await?;
        info!(
            "选项已加载: 自动隐藏={}, 时长={:?}",
            snapshot.autohide_enabled(),
            snapshot.autohide_duration()
        );
        *self.options.write() = snapshot;

        let token = CancellationToken::new();
        if let Some(previous) = self.options_listener.lock().replace(token.clone()) {
            previous.cancel();
        }

        let weak_self = self.weak_self.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = token.cancelled() => break,
                    message = receiver.recv() => message,
                };

                let Some(coordinator) = weak_self.upgrade() else {
                    break;
                };

                match message {
                    Ok(changes) => coordinator.apply_option_changes(&changes),
                    Err(RecvError::Lagged(skipped)) => {
                        // 丢失了变更通知，重新读取完整快照以保证收敛
                        warn!("选项变更通知积压，丢弃 {} 条，重新同步", skipped);
                        match store.get_all().await {
                            Ok(snapshot) => *coordinator.options.write() = snapshot,
                            Err(e) => error!("重新同步选项失败: {}", e),
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("选项存储已关闭变更通道");
                        break;
                    }
                }
            }
            debug!("选项监听任务退出");
        });

        Ok(())
    }

    /// 应用一批选项变更
    pub fn apply_option_changes(&self, changes: &[OptionChange]) {
        self.options.write().apply(changes);
        debug!(
            "选项已更新: {:?}",
            changes.iter().map(|c| c.key.as_str()).collect::<Vec<_>>()
        );
    }

    // ==================== 轮询 ====================

    /// 进入 Polling 状态；已在轮询时不做任何事
    pub fn start_polling(&self) {
        let token = {
            let mut polling = self.polling.lock();
            if polling.is_some() {
                return;
            }
            let token = CancellationToken::new();
            *polling = Some(token.clone());
            token
        };

        let period = self.config.poll_interval;
        let weak_self = self.weak_self.clone();
        info!("开始轮询下载状态，间隔 {:?}", period);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match weak_self.upgrade() {
                    Some(coordinator) => coordinator.refresh().await,
                    None => break,
                }
            }
            debug!("轮询任务退出");
        });
    }

    /// 回到 Idle 状态；未在轮询时安全调用
    pub fn stop_polling(&self) {
        if let Some(token) = self.polling.lock().take() {
            token.cancel();
            info!("没有下载中的任务，停止轮询");
        }
    }

    // ==================== 对账与广播 ====================

    /// 与权威注册表对账，替换跟踪列表并广播
    ///
    /// 刷新进行中时本次请求被合并，由进行中的刷新再执行一轮
    pub async fn refresh(&self) {
        let Some(mut guard) = self.refresh_coordinator.try_acquire() else {
            debug!(
                "对账进行中，本次刷新请求已合并（累计合并 {} 次）",
                self.refresh_coordinator.coalesced_count()
            );
            return;
        };

        loop {
            self.refresh_cycle().await;
            if !guard.rerun_requested() {
                break;
            }
            debug!("执行合并的刷新请求");
        }
    }

    async fn refresh_cycle(&self) {
        let snapshot = self.downloads();
        let reconciled = self.reconcile(&snapshot).await;

        let merged = {
            let mut downloads = self.downloads.write();
            let looked_up: HashSet<DownloadId> = snapshot.iter().map(|d| d.id).collect();
            let merged = merge_reconciled(&looked_up, reconciled, &downloads);

            for id in &looked_up {
                if !merged.iter().any(|d| d.id == *id) {
                    self.autohide.cancel(*id);
                }
            }
            *downloads = merged.clone();

            // 持有列表锁时判断，避免与并发的创建事件交错导致漏掉新下载
            if !helpers::has_in_progress(&downloads) {
                self.stop_polling();
            }
            merged
        };

        self.broadcast(&merged).await;
    }

    /// 逐条查询权威注册表，返回保持原顺序的新快照
    ///
    /// 所有查询并发发出，全部结束后返回；查询失败或查不到的记录被丢弃
    pub async fn reconcile(&self, downloads: &[DownloadRecord]) -> Vec<DownloadRecord> {
        let lookups = downloads.iter().map(|download| {
            let id = download.id;
            async move {
                match self.registry.search(id).await {
                    Ok(found) => {
                        let record = found.into_iter().next();
                        if record.is_none() {
                            debug!("注册表中已不存在该下载，移除: id={}", id);
                        }
                        record
                    }
                    Err(e) => {
                        warn!("查询下载状态失败，移除: id={}, 错误: {}", id, e);
                        None
                    }
                }
            }
        });

        join_all(lookups).await.into_iter().flatten().collect()
    }

    /// 向所有打开的标签页推送下载列表
    ///
    /// 没有监听者的标签页直接忽略，不重试
    pub async fn broadcast(&self, downloads: &[DownloadRecord]) {
        let tabs = match self.tabs.query_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("枚举标签页失败，跳过本次广播: {}", e);
                return;
            }
        };

        let deliveries = tabs.iter().map(|tab| async move {
            if let Err(e) = self.tabs.send_message(tab, downloads).await {
                debug!("标签页未接收下载列表: tab={}, 错误: {}", tab, e);
            }
        });
        join_all(deliveries).await;

        debug!("下载列表已广播: {} 条记录, {} 个标签页", downloads.len(), tabs.len());
    }

    // ==================== 命令 ====================

    /// 执行内容脚本发来的命令，失败时统一记录日志
    pub async fn handle_command(&self, command: StatusCommand) -> StatusResult<()> {
        let name = command.name();
        let id = command.download_id();
        debug!("收到命令: event={}, id={:?}", name, id);

        let result = match command {
            StatusCommand::ClearDownloads => self.clear_downloads().await,
            StatusCommand::ClearDownload { download } => self.clear_download(download.id).await,
            StatusCommand::ShowDownload { download } => self.show_download(download.id).await,
            StatusCommand::CancelDownload { download } => self.cancel_download(download.id).await,
            StatusCommand::PauseDownload { download } => self.pause_download(download.id).await,
            StatusCommand::ResumeDownload { download } => self.resume_download(download.id).await,
            StatusCommand::DeleteDownload { download } => self.delete_download(download.id).await,
        };

        if let Err(e) = &result {
            error!("命令执行失败: event={}, id={:?}, 错误: {}", name, id, e);
        }
        result
    }

    /// 从状态栏移除单个下载
    pub async fn clear_download(&self, id: DownloadId) -> StatusResult<()> {
        self.remove_tracked(id);
        self.refresh().await;
        Ok(())
    }

    /// 移除所有已完成的下载
    pub async fn clear_downloads(&self) -> StatusResult<()> {
        let removed: Vec<DownloadId> = {
            let mut downloads = self.downloads.write();
            let current = std::mem::take(&mut *downloads);
            let removed = current
                .iter()
                .filter(|d| d.is_complete())
                .map(|d| d.id)
                .collect();
            *downloads = helpers::filter_completed_downloads(current);
            removed
        };

        for id in &removed {
            self.autohide.cancel(*id);
        }
        info!("已清除 {} 个已完成的下载", removed.len());

        self.refresh().await;
        Ok(())
    }

    /// 在文件管理器中显示下载
    pub async fn show_download(&self, id: DownloadId) -> StatusResult<()> {
        self.registry.show(id).await?;
        Ok(())
    }

    pub async fn cancel_download(&self, id: DownloadId) -> StatusResult<()> {
        let result = self.registry.cancel(id).await;
        // 失败时同样刷新，让标签页与平台状态保持一致
        self.refresh().await;
        Ok(result?)
    }

    pub async fn pause_download(&self, id: DownloadId) -> StatusResult<()> {
        let result = self.registry.pause(id).await;
        self.refresh().await;
        Ok(result?)
    }

    pub async fn resume_download(&self, id: DownloadId) -> StatusResult<()> {
        let result = self.registry.resume(id).await;
        self.refresh().await;
        Ok(result?)
    }

    /// 删除下载的本地文件
    ///
    /// 成功后直接移除记录并广播本地列表，不经过对账
    pub async fn delete_download(&self, id: DownloadId) -> StatusResult<()> {
        self.registry.remove_file(id).await?;
        self.remove_tracked(id);

        let downloads = self.downloads();
        self.broadcast(&downloads).await;
        Ok(())
    }

    // ==================== 生命周期 ====================

    /// 停止所有后台任务
    pub fn shutdown(&self) {
        self.stop_polling();
        self.autohide.cancel_all();
        if let Some(token) = self.options_listener.lock().take() {
            token.cancel();
        }
        info!("下载状态协调器已关闭");
    }

    // ==================== 内部方法 ====================

    fn remove_tracked(&self, id: DownloadId) {
        {
            let mut downloads = self.downloads.write();
            let current = std::mem::take(&mut *downloads);
            *downloads = helpers::remove_selected_download(id, current);
        }
        self.autohide.cancel(id);
    }

    /// 调度自动隐藏：到期后移除该下载并重新广播
    fn schedule_autohide(&self, id: DownloadId, delay: Duration) {
        let ticket = self.autohide.register(id);
        let weak_self = self.weak_self.clone();
        debug!("已调度自动隐藏: id={}, 延迟={:?}", id, delay);

        tokio::spawn(async move {
            tokio::select! {
                _ = ticket.token.cancelled() => {
                    debug!("自动隐藏已取消: id={}", id);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let Some(coordinator) = weak_self.upgrade() else {
                return;
            };
            if !coordinator.autohide.fire(&ticket) {
                return;
            }

            info!("自动隐藏已完成的下载: id={}", id);
            if let Err(e) = coordinator.clear_download(id).await {
                error!("自动隐藏失败: id={}, 错误: {}", id, e);
            }
        });
    }
}

/// 把对账结果合并进当前列表
///
/// - 有新快照的记录被替换
/// - 参与了查询却没有结果的记录被丢弃
/// - 查询开始后才加入的记录原样保留
/// - 查询期间被移除的记录不会重新出现
fn merge_reconciled(
    looked_up: &HashSet<DownloadId>,
    reconciled: Vec<DownloadRecord>,
    current: &[DownloadRecord],
) -> Vec<DownloadRecord> {
    let mut fresh: HashMap<DownloadId, DownloadRecord> =
        reconciled.into_iter().map(|r| (r.id, r)).collect();

    current
        .iter()
        .filter_map(|record| match fresh.remove(&record.id) {
            Some(updated) => Some(updated),
            None if looked_up.contains(&record.id) => None,
            None => Some(record.clone()),
        })
        .collect()
}
