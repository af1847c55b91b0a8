//! 进度回调节流器
//!
//! 传输循环每写入一块数据都会询问一次是否应该上报进度；
//! 节流器保证上报频率不超过配置间隔，避免刷爆展示通道

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// 默认节流间隔（秒），对应消息编辑类展示通道的限流要求
pub const DEFAULT_THROTTLE_INTERVAL_SECS: u64 = 7;

/// 进度回调节流器
///
/// 线程安全的时间节流器，使用原子操作避免锁竞争。
/// 典型用法：每次进度推进时调用 `should_emit()`，返回 true 时才触发回调
#[derive(Debug)]
pub struct ProgressThrottler {
    /// 上次触发回调的时间戳（纳秒，原子更新）
    last_emit_nanos: AtomicU64,
    /// 节流间隔（纳秒）
    interval_nanos: u64,
}

impl ProgressThrottler {
    /// 创建新的节流器
    pub fn new(interval: Duration) -> Self {
        Self {
            last_emit_nanos: AtomicU64::new(0),
            interval_nanos: interval.as_nanos() as u64,
        }
    }

    /// 使用默认间隔（7秒）创建节流器
    pub fn default_interval() -> Self {
        Self::new(Duration::from_secs(DEFAULT_THROTTLE_INTERVAL_SECS))
    }

    /// 使用指定秒数间隔创建节流器
    pub fn with_secs(interval_secs: u64) -> Self {
        Self::new(Duration::from_secs(interval_secs))
    }

    /// 检查是否应该触发回调
    ///
    /// 首次调用必定触发；之后距离上次触发超过节流间隔时返回 true 并更新时间戳。
    /// 使用 CAS 更新时间戳，多线程同时到达间隔边界时只有一个成功
    pub fn should_emit(&self) -> bool {
        let now_nanos = Self::current_nanos();
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        // 0 是哨兵值：从未触发过
        if last == 0 || now_nanos.saturating_sub(last) >= self.interval_nanos {
            self.last_emit_nanos
                .compare_exchange(last, now_nanos, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        } else {
            false
        }
    }

    /// 强制触发（用于完成时的最后一次上报）
    pub fn force_emit(&self) -> bool {
        self.last_emit_nanos
            .store(Self::current_nanos(), Ordering::Relaxed);
        true
    }

    /// 重置节流器状态
    pub fn reset(&self) {
        self.last_emit_nanos.store(0, Ordering::Relaxed);
    }

    /// 获取当前时间的纳秒表示
    ///
    /// 基于进程级单调时钟，避免系统时钟跳变影响；
    /// 加一保证返回值永不为 0（0 留作"从未触发"哨兵）
    fn current_nanos() -> u64 {
        static START: OnceLock<Instant> = OnceLock::new();
        START.get_or_init(Instant::now).elapsed().as_nanos() as u64 + 1
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::default_interval()
    }
}

impl Clone for ProgressThrottler {
    fn clone(&self) -> Self {
        Self {
            last_emit_nanos: AtomicU64::new(self.last_emit_nanos.load(Ordering::Relaxed)),
            interval_nanos: self.interval_nanos,
        }
    }
}
