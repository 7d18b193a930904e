//! 自动隐藏定时器
//!
//! 每个已完成的下载最多一个定时器，记录被移除时定时器随之取消

use super::types::DownloadId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// 定时器登记信息
#[derive(Debug, Clone)]
pub struct AutoHideTicket {
    pub id: DownloadId,
    /// 世代号，用于区分同一下载先后调度的定时器
    pub generation: u64,
    pub token: CancellationToken,
}

/// 按下载 ID 管理的自动隐藏定时器
#[derive(Debug, Default)]
pub struct AutoHideTimers {
    timers: Mutex<HashMap<DownloadId, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
}

impl AutoHideTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个新定时器，同一下载已有的定时器会被取消
    pub fn register(&self, id: DownloadId) -> AutoHideTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();

        if let Some((_, previous)) = self
            .timers
            .lock()
            .insert(id, (generation, token.clone()))
        {
            previous.cancel();
        }

        AutoHideTicket {
            id,
            generation,
            token,
        }
    }

    /// 定时器到期时调用，移除自己的登记
    ///
    /// 返回 `false` 表示该定时器已被取消或替换，不应再执行移除
    pub fn fire(&self, ticket: &AutoHideTicket) -> bool {
        let mut timers = self.timers.lock();
        match timers.get(&ticket.id) {
            Some((generation, _)) if *generation == ticket.generation => {
                timers.remove(&ticket.id);
                !ticket.token.is_cancelled()
            }
            _ => false,
        }
    }

    /// 取消指定下载的定时器
    pub fn cancel(&self, id: DownloadId) -> bool {
        match self.timers.lock().remove(&id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消所有定时器
    pub fn cancel_all(&self) {
        for (_, (_, token)) in self.timers.lock().drain() {
            token.cancel();
        }
    }

    #[cfg(test)]
    pub fn is_scheduled(&self, id: DownloadId) -> bool {
        self.timers.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_replaces_previous() {
        let timers = AutoHideTimers::new();
        let first = timers.register(1);
        let second = timers.register(1);

        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert_eq!(timers.len(), 1);

        // 旧定时器到期不生效
        assert!(!timers.fire(&first));
        assert!(timers.fire(&second));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_cancel() {
        let timers = AutoHideTimers::new();
        let ticket = timers.register(7);
        assert!(timers.is_scheduled(7));

        assert!(timers.cancel(7));
        assert!(ticket.token.is_cancelled());
        assert!(!timers.fire(&ticket));
        assert!(!timers.cancel(7));
    }

    #[test]
    fn test_cancel_all() {
        let timers = AutoHideTimers::new();
        let a = timers.register(1);
        let b = timers.register(2);
        timers.cancel_all();
        assert!(a.token.is_cancelled());
        assert!(b.token.is_cancelled());
        assert!(timers.is_empty());
    }
}
