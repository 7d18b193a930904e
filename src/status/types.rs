//! 下载状态类型定义
//!
//! 字段命名与浏览器下载 API 保持一致（camelCase），协调器只解释 `id` 与 `state`，
//! 其余字段原样透传给内容脚本

use serde::{Deserialize, Serialize};

/// 下载 ID（平台分配，整个下载生命周期内唯一且稳定）
pub type DownloadId = u64;

/// 下载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// 下载中
    InProgress,
    /// 已中断（失败或被取消）
    Interrupted,
    /// 已完成
    Complete,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::InProgress => "in_progress",
            DownloadState::Interrupted => "interrupted",
            DownloadState::Complete => "complete",
        }
    }
}

/// 下载记录快照
///
/// 平台拥有权威记录，协调器只持有某一时刻的快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: DownloadId,
    pub state: DownloadState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// 本地文件绝对路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_resume: Option<bool>,
    /// 中断原因（如 `USER_CANCELED`）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub bytes_received: u64,
    /// 总字节数，未知时为 -1
    #[serde(default = "unknown_size")]
    pub total_bytes: i64,
    #[serde(default = "unknown_size")]
    pub file_size: i64,
    #[serde(default = "default_exists")]
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// 未建模的字段，原样透传
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn unknown_size() -> i64 {
    -1
}

fn default_exists() -> bool {
    true
}

impl DownloadRecord {
    /// 创建只包含必要字段的记录
    pub fn new(id: DownloadId, state: DownloadState) -> Self {
        Self {
            id,
            state,
            url: None,
            filename: None,
            paused: false,
            can_resume: None,
            error: None,
            bytes_received: 0,
            total_bytes: unknown_size(),
            file_size: unknown_size(),
            exists: default_exists(),
            mime: None,
            start_time: None,
            end_time: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn is_in_progress(&self) -> bool {
        self.state == DownloadState::InProgress
    }

    pub fn is_complete(&self) -> bool {
        self.state == DownloadState::Complete
    }

    /// 将变更增量应用到记录上
    ///
    /// 只覆盖增量中带有 `current` 值的字段
    pub fn apply_delta(&mut self, delta: &DownloadDelta) {
        if let Some(state) = delta.state.as_ref().and_then(|c| c.current) {
            self.state = state;
        }
        if let Some(paused) = delta.paused.as_ref().and_then(|c| c.current) {
            self.paused = paused;
        }
        if let Some(change) = &delta.error {
            self.error = change.current.clone();
        }
        if let Some(filename) = delta.filename.as_ref().and_then(|c| c.current.clone()) {
            self.filename = Some(filename);
        }
        if let Some(exists) = delta.exists.as_ref().and_then(|c| c.current) {
            self.exists = exists;
        }
        if let Some(can_resume) = delta.can_resume.as_ref().and_then(|c| c.current) {
            self.can_resume = Some(can_resume);
        }
        if let Some(bytes) = delta.bytes_received.as_ref().and_then(|c| c.current) {
            self.bytes_received = bytes;
        }
        if let Some(total) = delta.total_bytes.as_ref().and_then(|c| c.current) {
            self.total_bytes = total;
        }
        if let Some(size) = delta.file_size.as_ref().and_then(|c| c.current) {
            self.file_size = size;
        }
        if let Some(end_time) = delta.end_time.as_ref().and_then(|c| c.current.clone()) {
            self.end_time = Some(end_time);
        }
    }
}

/// 单个字段的变更（前值 / 当前值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<T>,
}

impl<T> StateChange<T> {
    pub fn to(current: T) -> Self {
        Self {
            current: Some(current),
            previous: None,
        }
    }
}

/// 下载变更增量
///
/// 平台的 onChanged 通知只携带发生变化的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadDelta {
    pub id: DownloadId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateChange<DownloadState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<StateChange<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StateChange<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<StateChange<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<StateChange<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_resume: Option<StateChange<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<StateChange<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<StateChange<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<StateChange<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<StateChange<String>>,
}

impl DownloadDelta {
    /// 创建空增量
    pub fn new(id: DownloadId) -> Self {
        Self {
            id,
            state: None,
            paused: None,
            error: None,
            filename: None,
            exists: None,
            can_resume: None,
            bytes_received: None,
            total_bytes: None,
            file_size: None,
            end_time: None,
        }
    }

    pub fn with_state(mut self, state: DownloadState) -> Self {
        self.state = Some(StateChange::to(state));
        self
    }

    pub fn with_bytes_received(mut self, bytes: u64) -> Self {
        self.bytes_received = Some(StateChange::to(bytes));
        self
    }

    /// 增量是否报告下载已完成
    pub fn is_complete(&self) -> bool {
        matches!(
            self.state.as_ref().and_then(|c| c.current),
            Some(DownloadState::Complete)
        )
    }
}
