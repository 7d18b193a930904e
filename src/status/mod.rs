//! 下载状态模块
//!
//! 跟踪浏览器下载，与权威注册表对账，并把列表推送给所有标签页

pub mod autohide;
pub mod coordinator;
pub mod helpers;
pub mod message;
pub mod options;
pub mod types;

pub use autohide::{AutoHideTicket, AutoHideTimers};
pub use coordinator::{
    CoordinatorConfig, DownloadStatusCoordinator, StatusError, StatusResult, DEFAULT_POLL_INTERVAL,
};
pub use helpers::{filter_completed_downloads, has_in_progress, remove_selected_download};
pub use message::{DownloadRef, StatusCommand};
pub use options::{OptionChange, OptionsSnapshot, AUTOHIDE_DURATION, AUTOHIDE_ENABLE};
pub use types::{DownloadDelta, DownloadId, DownloadRecord, DownloadState, StateChange};
