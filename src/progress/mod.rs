// 进度节流与格式化模块

pub mod throttle;

pub use throttle::{ProgressThrottler, DEFAULT_THROTTLE_INTERVAL_SECS};

use std::time::Instant;

/// 进度回调：参数为（已完成字节数，总大小；总大小未知时为 0）
///
/// 回调是即发即忘的通知，绝不能阻塞传输循环；
/// 展示层的失败由回调方自行吞掉，不作为传输错误传播
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// 传输阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// 下载中
    Downloading,
    /// 上传中
    Uploading,
}

impl TransferPhase {
    pub fn label(&self) -> &'static str {
        match self {
            TransferPhase::Downloading => "下载中",
            TransferPhase::Uploading => "上传中",
        }
    }
}

/// 字节数的人类可读表示（1024 进制）
pub fn human_bytes(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if size == 0 {
        return "0 B".to_string();
    }

    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", size)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// 渲染进度文本
///
/// 形如：
/// ```text
/// 下载中
/// [■■■■■■□□□□] 60.00%
/// 300.00 MiB / 500.00 MiB
/// 速度: 5.00 MiB/s | 剩余: 40s
/// ```
///
/// `total` 为 0（响应头缺失 Content-Length）时省略百分比和剩余时间
pub fn format_progress(phase: TransferPhase, current: u64, total: u64, started: Instant) -> String {
    let elapsed = started.elapsed().as_secs_f64().max(1.0);
    let speed = current as f64 / elapsed;
    let speed_text = format!("{}/s", human_bytes(speed as u64));

    if total == 0 {
        return format!(
            "{}\n{} / ?\n速度: {}",
            phase.label(),
            human_bytes(current),
            speed_text
        );
    }

    let percentage = (current as f64 * 100.0 / total as f64).min(100.0);
    let completed = ((percentage / 10.0) as usize).min(10);
    let bar: String = "■".repeat(completed) + &"□".repeat(10 - completed);

    let eta_text = if speed > 0.0 && current < total {
        format!("{}s", ((total - current) as f64 / speed).round() as u64)
    } else {
        "-".to_string()
    };

    format!(
        "{}\n[{}] {:.2}%\n{} / {}\n速度: {} | 剩余: {}",
        phase.label(),
        bar,
        percentage,
        human_bytes(current),
        human_bytes(total),
        speed_text,
        eta_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1023), "1023 B");
        // 进位边界恰好在 1024
        assert_eq!(human_bytes(1024), "1.00 KiB");
        assert_eq!(human_bytes(2048), "2.00 KiB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
    }

    #[test]
    fn test_format_progress_with_total() {
        let text = format_progress(TransferPhase::Downloading, 600, 1000, Instant::now());
        assert!(text.contains("60.00%"));
        assert!(text.contains("■■■■■■□□□□"));
        assert!(text.contains("600 B / 1000 B"));
    }

    #[test]
    fn test_format_progress_unknown_total() {
        // Content-Length 缺失时 total 为 0，不渲染百分比
        let text = format_progress(TransferPhase::Uploading, 600, 0, Instant::now());
        assert!(!text.contains('%'));
        assert!(text.contains("600 B / ?"));
    }
}
