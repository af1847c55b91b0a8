//! 活跃任务集合
//!
//! 同一请求者同一时刻最多一个任务在管线内。
//! 占位以作用域守卫表达，任何退出路径（包括 panic 展开）都保证释放

use std::sync::Arc;

use dashmap::DashSet;

/// 活跃任务集合（进程级，按请求者ID去重）
#[derive(Debug, Clone, Default)]
pub struct ActiveJobSet {
    inner: Arc<DashSet<i64>>,
}

impl ActiveJobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试为请求者占位
    ///
    /// 已有在途任务时返回 None；成功时返回守卫，守卫析构即释放占位
    pub fn try_acquire(&self, user_id: i64) -> Option<JobGuard> {
        if self.inner.insert(user_id) {
            Some(JobGuard {
                set: Arc::clone(&self.inner),
                user_id,
            })
        } else {
            None
        }
    }

    /// 请求者是否有在途任务
    pub fn contains(&self, user_id: i64) -> bool {
        self.inner.contains(&user_id)
    }

    /// 在途任务数
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// 活跃任务占位守卫
#[derive(Debug)]
pub struct JobGuard {
    set: Arc<DashSet<i64>>,
    user_id: i64,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.set.remove(&self.user_id);
    }
}
