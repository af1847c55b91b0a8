// 管线状态通知类型

use crate::access::AccessTier;
use crate::progress::{format_progress, human_bytes, TransferPhase};
use crate::resolver::ResolutionError;
use std::time::Instant;

/// 管线状态更新
///
/// 通过即发即忘的回调送往展示层；回调失败被吞掉，绝不反灌进传输循环
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// 准入被拒
    AccessDenied { tier: AccessTier },
    /// 请求者已有在途任务
    AlreadyActive,
    /// 开始解析链接
    Resolving,
    /// 链接解析失败（该链接的终态）
    ResolutionFailed { error: ResolutionError },
    /// 解析完成
    Resolved { file_count: usize },
    /// 免费配额在解析后、传输前被并发请求抢光
    CreditsExhausted,
    /// 开始下载某个资产
    Downloading { filename: String },
    /// 传输进度（已按节流间隔限频）
    Progress {
        phase: TransferPhase,
        current: u64,
        total: u64,
    },
    /// 文件超预算，开始分割
    Splitting { filename: String, size_bytes: u64 },
    /// 开始投递某个分段
    Uploading { filename: String },
    /// 单个资产失败（不影响同任务的其他资产）
    AssetFailed { filename: String, message: String },
    /// 单个资产完成
    AssetCompleted { filename: String },
    /// 任务被取消
    Cancelled,
    /// 任务结束（逐资产统计，部分成功不折叠成整体失败）
    JobCompleted { delivered: usize, failed: usize },
}

impl StatusUpdate {
    /// 渲染成面向用户的文本
    pub fn render(&self, started: Instant) -> String {
        match self {
            StatusUpdate::AccessDenied { tier } => match tier {
                AccessTier::Banned => "🚫 你已被禁止使用本服务".to_string(),
                _ => "⏳ 配额或会员已到期，请联系管理员续期".to_string(),
            },
            StatusUpdate::AlreadyActive => "⚠️ 你已有一个任务在进行中，请等它结束".to_string(),
            StatusUpdate::Resolving => "🔎 正在解析分享链接...".to_string(),
            StatusUpdate::ResolutionFailed { error } => format!("❌ 链接解析失败: {}", error),
            StatusUpdate::Resolved { file_count } => {
                format!("✅ 找到 {} 个文件，开始传输", file_count)
            }
            StatusUpdate::CreditsExhausted => "⚠️ 配额刚好被用完，本次任务未开始".to_string(),
            StatusUpdate::Downloading { filename } => format!("⬇️ 下载中: {}", filename),
            StatusUpdate::Progress {
                phase,
                current,
                total,
            } => format_progress(*phase, *current, *total, started),
            StatusUpdate::Splitting {
                filename,
                size_bytes,
            } => format!("✂️ {} 超过大小上限（{}），分割中...", filename, human_bytes(*size_bytes)),
            StatusUpdate::Uploading { filename } => format!("⬆️ 投递中: {}", filename),
            StatusUpdate::AssetFailed { filename, message } => {
                format!("❌ {} 失败: {}", filename, message)
            }
            StatusUpdate::AssetCompleted { filename } => format!("✅ 完成: {}", filename),
            StatusUpdate::Cancelled => "⚠️ 任务已取消".to_string(),
            StatusUpdate::JobCompleted { delivered, failed } => {
                if *failed == 0 {
                    format!("🎉 全部完成，共投递 {} 个文件", delivered)
                } else {
                    format!("⚠️ 结束：{} 个成功，{} 个失败", delivered, failed)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_denied() {
        let now = Instant::now();
        let banned = StatusUpdate::AccessDenied {
            tier: AccessTier::Banned,
        };
        assert!(banned.render(now).contains("禁止"));

        let expired = StatusUpdate::AccessDenied {
            tier: AccessTier::Expired,
        };
        assert!(expired.render(now).contains("到期"));
    }

    #[test]
    fn test_render_partial_success() {
        let update = StatusUpdate::JobCompleted {
            delivered: 2,
            failed: 1,
        };
        let text = update.render(Instant::now());
        assert!(text.contains('2') && text.contains('1'));
    }
}
