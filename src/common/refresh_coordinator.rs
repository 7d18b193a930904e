//! 刷新协调器
//!
//! 保证同一时刻最多只有一个对账刷新在执行：
//! 刷新进行中到达的请求不会并发执行，而是登记为"需要重跑"，
//! 由当前持有者在本轮结束后再执行一轮

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// 刷新协调器
///
/// 使用原子操作实现，不持有任何锁跨越 await
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    /// 是否正在刷新
    is_refreshing: AtomicBool,
    /// 刷新期间是否有新的刷新请求
    rerun_requested: AtomicBool,
    /// 被合并的请求数
    coalesced: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试获取刷新权
    ///
    /// # 返回
    /// - `Some(RefreshGuard)`: 成功获取，可以执行刷新
    /// - `None`: 已有刷新在进行，本次请求已登记为重跑
    pub fn try_acquire(&self) -> Option<RefreshGuard<'_>> {
        // compare_exchange 确保只有一个调用方能成功
        if self
            .is_refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.rerun_requested.store(true, Ordering::SeqCst);
            self.coalesced.fetch_add(1, Ordering::SeqCst);
            return None;
        }

        Some(RefreshGuard {
            coordinator: self,
            active: true,
        })
    }

    /// 检查是否正在刷新
    #[cfg(test)]
    pub fn is_refreshing(&self) -> bool {
        self.is_refreshing.load(Ordering::SeqCst)
    }

    /// 被合并到进行中刷新的请求总数
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::SeqCst)
    }
}

/// 刷新守卫（RAII）
///
/// drop 时释放刷新权
pub struct RefreshGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    active: bool,
}

impl<'a> RefreshGuard<'a> {
    /// 一轮刷新结束后调用
    ///
    /// 返回 `true` 表示期间有新请求，调用方应继续持有守卫再刷新一轮；
    /// 返回 `false` 表示刷新权已释放
    pub fn rerun_requested(&mut self) -> bool {
        let coordinator = self.coordinator;

        if coordinator.rerun_requested.swap(false, Ordering::SeqCst) {
            return true;
        }

        coordinator.is_refreshing.store(false, Ordering::SeqCst);
        self.active = false;

        // 释放与检查之间到达的请求：重新抢占刷新权后继续执行，
        // 抢占失败说明已有新的持有者，请求由它负责
        if coordinator.rerun_requested.swap(false, Ordering::SeqCst)
            && coordinator
                .is_refreshing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            self.active = true;
            return true;
        }

        false
    }
}

impl<'a> Drop for RefreshGuard<'a> {
    fn drop(&mut self) {
        if self.active {
            self.coordinator
                .is_refreshing
                .store(false, Ordering::SeqCst);
        }
    }
}
