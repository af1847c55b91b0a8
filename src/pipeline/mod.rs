// 管线调度模块
//
// 准入 → 解析 → 逐资产 {下载 → 按需分割 → 逐段投递}。
// 同一请求者同时只跑一个任务；任何阶段的失败都折算成状态通知，
// 绝不让错误悄悄离开任务执行体

pub mod active;
pub mod status;

pub use active::{ActiveJobSet, JobGuard};
pub use status::StatusUpdate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{AccessStore, AccessTier};
use crate::downloader::Fetcher;
use crate::progress::TransferPhase;
use crate::relay::Relay;
use crate::resolver::{LinkResolver, ResolutionError, ResolvedAsset, ShareSource};
use crate::splitter::Splitter;

/// 状态回调：即发即忘，实现方不得阻塞
pub type StatusFn<'a> = &'a (dyn Fn(StatusUpdate) + Send + Sync);

/// 单个资产的传输任务
///
/// 分段文件在各自投递成功后立即删除；
/// 分割成功后原始文件也随即删除，本地不会同时驻留原件和全部分段
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// 任务ID
    pub id: Uuid,
    /// 对应资产
    pub asset: ResolvedAsset,
    /// 下载落盘路径
    pub local_path: PathBuf,
    /// 分段路径（未分割时为单元素的原路径）
    pub parts: Vec<PathBuf>,
}

/// 任务结局
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// 准入被拒
    Denied(AccessTier),
    /// 请求者已有在途任务
    AlreadyActive,
    /// 链接解析失败
    ResolutionFailed(ResolutionError),
    /// 配额被并发请求抢光
    CreditsExhausted,
    /// 任务被取消
    Cancelled { delivered: usize, failed: usize },
    /// 跑完（部分成功按资产计，不折叠成整体失败）
    Completed { delivered: usize, failed: usize },
}

/// 管线控制器
///
/// 所有协作方都是显式传入的服务对象，没有模块级单例
pub struct PipelineController<S: ShareSource> {
    /// 准入闸门
    gate: Arc<AccessStore>,
    /// 链接解析器
    resolver: LinkResolver<S>,
    /// 资产下载器
    fetcher: Arc<dyn Fetcher>,
    /// 文件分割器
    splitter: Splitter,
    /// 分段中转器
    relay: Relay,
    /// 下载临时目录（每个任务一个私有子目录）
    download_dir: PathBuf,
    /// 活跃任务集合
    active: ActiveJobSet,
}

impl<S: ShareSource> PipelineController<S> {
    pub fn new(
        gate: Arc<AccessStore>,
        resolver: LinkResolver<S>,
        fetcher: Arc<dyn Fetcher>,
        splitter: Splitter,
        relay: Relay,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            gate,
            resolver,
            fetcher,
            splitter,
            relay,
            download_dir,
            active: ActiveJobSet::new(),
        }
    }

    /// 活跃任务集合
    pub fn active_jobs(&self) -> &ActiveJobSet {
        &self.active
    }

    /// 执行一次完整的链接任务
    ///
    /// 返回 Err 仅代表基础设施故障（如数据库不可用）；
    /// 业务上的失败都在 [`JobOutcome`] 和状态通知里
    pub async fn run(
        &self,
        user_id: i64,
        raw_url: &str,
        cancel: &CancellationToken,
        on_status: StatusFn<'_>,
    ) -> Result<JobOutcome> {
        // 1. 准入评估
        let (allowed, tier) = self.gate.evaluate(user_id)?;
        if !allowed {
            on_status(StatusUpdate::AccessDenied { tier });
            return Ok(JobOutcome::Denied(tier));
        }

        // 2. 活跃占位：守卫析构保证任何退出路径都释放
        let _guard = match self.active.try_acquire(user_id) {
            Some(guard) => guard,
            None => {
                on_status(StatusUpdate::AlreadyActive);
                return Ok(JobOutcome::AlreadyActive);
            }
        };

        let job_id = Uuid::new_v4();
        info!("任务开始: user={}, job={}, url={}", user_id, job_id, raw_url);

        // 3. 解析链接
        on_status(StatusUpdate::Resolving);
        let resolution = match self.resolver.resolve(raw_url).await {
            Ok(resolution) => resolution,
            Err(error) => {
                warn!("链接解析失败: user={}, {}", user_id, error);
                on_status(StatusUpdate::ResolutionFailed {
                    error: error.clone(),
                });
                return Ok(JobOutcome::ResolutionFailed(error));
            }
        };
        on_status(StatusUpdate::Resolved {
            file_count: resolution.assets.len(),
        });

        // 4. 免费档在任何传输开始前扣配额；被并发请求抢光就终止
        if tier == AccessTier::Free && !self.gate.consume_credit(user_id)? {
            on_status(StatusUpdate::CreditsExhausted);
            return Ok(JobOutcome::CreditsExhausted);
        }

        // 5. 任务私有目录，结束时整体清理
        let job_dir = self.download_dir.join(job_id.to_string());
        tokio::fs::create_dir_all(&job_dir)
            .await
            .context("创建任务目录失败")?;

        let mut delivered = 0usize;
        let mut failed = 0usize;
        let mut cancelled = false;

        for asset in &resolution.assets {
            if cancel.is_cancelled() {
                cancelled = true;
                on_status(StatusUpdate::Cancelled);
                break;
            }

            // 单个资产失败只上报，不中断兄弟资产
            match self
                .process_asset(user_id, job_id, &job_dir, asset, on_status)
                .await
            {
                Ok(()) => {
                    delivered += 1;
                    on_status(StatusUpdate::AssetCompleted {
                        filename: asset.filename.clone(),
                    });
                }
                Err(message) => {
                    failed += 1;
                    warn!("资产失败: user={}, {}: {}", user_id, asset.filename, message);
                    on_status(StatusUpdate::AssetFailed {
                        filename: asset.filename.clone(),
                        message,
                    });
                }
            }
        }

        let _ = tokio::fs::remove_dir_all(&job_dir).await;

        on_status(StatusUpdate::JobCompleted { delivered, failed });
        info!(
            "任务结束: user={}, job={}, delivered={}, failed={}",
            user_id, job_id, delivered, failed
        );

        Ok(if cancelled {
            JobOutcome::Cancelled { delivered, failed }
        } else {
            JobOutcome::Completed { delivered, failed }
        })
    }

    /// 处理单个资产：下载 → 按需分割 → 逐段投递
    ///
    /// 返回 Err(用户可读的失败原因)；本地文件无论成败都被清理
    async fn process_asset(
        &self,
        user_id: i64,
        job_id: Uuid,
        job_dir: &Path,
        asset: &ResolvedAsset,
        on_status: StatusFn<'_>,
    ) -> std::result::Result<(), String> {
        let local_path = job_dir.join(sanitize_filename(&asset.filename));

        on_status(StatusUpdate::Downloading {
            filename: asset.filename.clone(),
        });
        let fetched = match self
            .fetcher
            .fetch(asset, &local_path, &|current, total| {
                on_status(StatusUpdate::Progress {
                    phase: TransferPhase::Downloading,
                    current,
                    total,
                });
            })
            .await
        {
            Ok(path) => path,
            Err(e) => {
                // 半截输出由本层丢弃
                let _ = tokio::fs::remove_file(&local_path).await;
                return Err(e.to_string());
            }
        };

        let mut job = TransferJob {
            id: job_id,
            asset: asset.clone(),
            local_path: fetched.clone(),
            parts: Vec::new(),
        };

        let size = tokio::fs::metadata(&fetched)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size > self.splitter.part_size() {
            on_status(StatusUpdate::Splitting {
                filename: asset.filename.clone(),
                size_bytes: size,
            });
        }

        job.parts = match self.splitter.split_if_needed(&fetched).await {
            Ok(parts) => parts,
            Err(e) => {
                let _ = tokio::fs::remove_file(&fetched).await;
                return Err(e.to_string());
            }
        };

        // 分割确实发生时立刻删掉原始大文件，腾出磁盘
        if job.parts.len() > 1 {
            let _ = tokio::fs::remove_file(&fetched).await;
        }

        let mut first_error = None;
        for part in &job.parts {
            if first_error.is_none() {
                let part_name = part
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("part")
                    .to_string();
                on_status(StatusUpdate::Uploading {
                    filename: part_name,
                });

                if let Err(e) = self
                    .relay
                    .relay(part, user_id, &|current, total| {
                        on_status(StatusUpdate::Progress {
                            phase: TransferPhase::Uploading,
                            current,
                            total,
                        });
                    })
                    .await
                {
                    first_error = Some(e.to_string());
                }
            }

            // 无论投递成败，分段文件都立即清理
            let _ = tokio::fs::remove_file(part).await;
        }

        match first_error {
            None => Ok(()),
            Some(message) => Err(message),
        }
    }
}

/// 把服务端文件名压成安全的本地文件名
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
