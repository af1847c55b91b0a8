// 分割模块
//
// 超过大小预算的文件切成可独立播放的分段：先走 ffmpeg segment 复制流分割，
// 任何探测/分割失败都回落到固定大小二进制切分（不可播放，属于接受的降级而非错误）

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::SplitConfig;
use crate::downloader::TransferError;

/// 二进制切分的默认读缓冲大小
const DEFAULT_COPY_BUF_SIZE: usize = 1024 * 1024;

/// 分段时长的安全余量：码率波动和封装开销会让分段略超估算值，
/// 预留 5% 让分段以高概率不超预算（不是硬保证）
const SEGMENT_SAFETY_MARGIN: f64 = 0.95;

/// 文件分割器
pub struct Splitter {
    config: SplitConfig,
    /// 二进制切分的读缓冲大小
    copy_buf_size: usize,
}

impl Splitter {
    pub fn new(config: SplitConfig) -> Self {
        Self {
            config,
            copy_buf_size: DEFAULT_COPY_BUF_SIZE,
        }
    }

    /// 指定二进制切分的读缓冲大小（下载配置里的 chunk_size）
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.copy_buf_size = size.max(1);
        self
    }

    /// 分段大小预算（字节）
    pub fn part_size(&self) -> u64 {
        self.config.part_size
    }

    /// 按需分割
    ///
    /// 不超预算时原样返回单元素列表（不拷贝）；超预算时返回分段路径列表。
    /// 从不原地修改输入文件，原文件的删除由调用方在分段确认送达后执行
    pub async fn split_if_needed(&self, input: &Path) -> Result<Vec<PathBuf>, TransferError> {
        let file_size = tokio::fs::metadata(input).await?.len();
        if file_size <= self.config.part_size {
            return Ok(vec![input.to_path_buf()]);
        }

        match self.segment_split(input, file_size).await {
            Ok(parts) => Ok(parts),
            Err(e) => {
                // 非媒体文件、工具缺失、容器不兼容都走这里
                warn!("流分割失败，回落到二进制切分: {:#}", e);
                self.binary_split(input, self.config.part_size).await
            }
        }
    }

    /// ffmpeg segment 复制流分割（不重编码，分段各自从零起播）
    async fn segment_split(&self, input: &Path, file_size: u64) -> Result<Vec<PathBuf>> {
        let duration = self.probe_duration(input).await?;
        let segment_time =
            compute_segment_duration(file_size, duration, self.config.part_size);

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .context("无效的输入文件名")?;
        let ext = input
            .extension()
            .and_then(|s| s.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let parent = input.parent().context("无效的输入路径")?;
        let pattern = parent.join(format!("{}_part%03d{}", stem, ext));

        info!(
            "流分割: {:?}, duration={:.1}s, segment_time={:.1}s",
            input, duration, segment_time
        );

        let status = Command::new(&self.config.ffmpeg_path)
            .arg("-i")
            .arg(input)
            .args(["-c", "copy", "-map", "0", "-f", "segment"])
            .args(["-segment_time", &format!("{:.3}", segment_time)])
            .args(["-reset_timestamps", "1"])
            .arg(&pattern)
            .status()
            .await
            .context("启动 ffmpeg 失败")?;

        if !status.success() {
            bail!("ffmpeg 退出码异常: {}", status);
        }

        let parts = collect_parts(parent, &format!("{}_part", stem), &ext).await?;
        if parts.is_empty() {
            bail!("ffmpeg 没有产出任何分段");
        }
        Ok(parts)
    }

    /// ffprobe 探测媒体时长（秒）
    async fn probe_duration(&self, input: &Path) -> Result<f64> {
        let output = Command::new(&self.config.ffprobe_path)
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(input)
            .output()
            .await
            .context("启动 ffprobe 失败")?;

        if !output.status.success() {
            bail!("ffprobe 退出码异常: {}", output.status);
        }

        let duration: f64 = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .context("解析媒体时长失败")?;
        if duration <= 0.0 {
            bail!("媒体时长无效: {}", duration);
        }
        Ok(duration)
    }

    /// 固定大小二进制切分，分段命名 `<input>.part<N>`（N 从 1 起）
    ///
    /// 磁盘耗尽等IO失败按传输IO错误上报
    async fn binary_split(
        &self,
        input: &Path,
        part_size: u64,
    ) -> Result<Vec<PathBuf>, TransferError> {
        let mut reader = File::open(input).await?;
        let mut buf = vec![0u8; self.copy_buf_size];
        let mut parts = Vec::new();
        let mut part_num = 1;
        let mut eof = false;

        while !eof {
            let part_path = PathBuf::from(format!("{}.part{}", input.display(), part_num));
            let mut writer = File::create(&part_path).await?;
            let mut written = 0u64;

            while written < part_size {
                let want = (part_size - written).min(buf.len() as u64) as usize;
                let n = reader.read(&mut buf[..want]).await?;
                if n == 0 {
                    eof = true;
                    break;
                }
                writer.write_all(&buf[..n]).await?;
                written += n as u64;
            }
            writer.flush().await?;

            if written == 0 {
                // 输入恰好在分段边界耗尽，丢掉空尾段
                drop(writer);
                tokio::fs::remove_file(&part_path).await?;
                break;
            }
            parts.push(part_path);
            part_num += 1;
        }

        info!("二进制切分完成: {:?} -> {} 段", input, parts.len());
        Ok(parts)
    }
}

/// 按平均码率推算分段时长（秒）
///
/// `bitrate = size*8/duration`，`segment = budget*8/bitrate`，再乘安全余量
pub fn compute_segment_duration(file_size: u64, duration_secs: f64, budget: u64) -> f64 {
    let bitrate = file_size as f64 * 8.0 / duration_secs;
    (budget as f64 * 8.0 / bitrate) * SEGMENT_SAFETY_MARGIN
}

/// 收集分割产物，按文件名排序（%03d 序号保证字典序即分段序）
async fn collect_parts(dir: &Path, prefix: &str, ext: &str) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await.context("读取输出目录失败")?;
    let mut parts = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix) && name.ends_with(ext) {
            parts.push(entry.path());
        }
    }
    parts.sort();
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter_with(part_size: u64) -> Splitter {
        Splitter::new(SplitConfig {
            part_size,
            // 指向不存在的工具，强制流分割失败走回落路径
            ffmpeg_path: "/nonexistent/ffmpeg".into(),
            ffprobe_path: "/nonexistent/ffprobe".into(),
        })
    }

    #[tokio::test]
    async fn test_under_budget_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("small.bin");
        tokio::fs::write(&input, vec![7u8; 100]).await.unwrap();

        let parts = splitter_with(1024).split_if_needed(&input).await.unwrap();
        assert_eq!(parts, vec![input.clone()]);
        // 原文件未被动过
        assert_eq!(tokio::fs::metadata(&input).await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_binary_fallback_exact_multiple() {
        // 5×part_size 的非媒体文件：恰好 5 段，每段 part_size
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("blob.bin");
        let part_size = 1024u64;
        tokio::fs::write(&input, vec![1u8; (part_size * 5) as usize])
            .await
            .unwrap();

        let parts = splitter_with(part_size).split_if_needed(&input).await.unwrap();
        assert_eq!(parts.len(), 5);
        for part in &parts {
            assert_eq!(tokio::fs::metadata(part).await.unwrap().len(), part_size);
        }
        // 输入保持原样
        assert!(input.exists());
    }

    #[tokio::test]
    async fn test_binary_fallback_last_part_smaller() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("blob.bin");
        tokio::fs::write(&input, vec![1u8; 2500]).await.unwrap();

        let parts = splitter_with(1000).split_if_needed(&input).await.unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(tokio::fs::metadata(&parts[0]).await.unwrap().len(), 1000);
        assert_eq!(tokio::fs::metadata(&parts[2]).await.unwrap().len(), 500);

        // 分段顺序与命名一致
        assert!(parts[0].to_string_lossy().ends_with(".part1"));
        assert!(parts[2].to_string_lossy().ends_with(".part3"));
    }

    #[tokio::test]
    async fn test_binary_fallback_with_configured_chunk_size() {
        // 读缓冲比分段小得多时，切分产物不变
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("blob.bin");
        tokio::fs::write(&input, vec![1u8; 2500]).await.unwrap();

        let splitter = splitter_with(1000).with_chunk_size(64);
        let parts = splitter.split_if_needed(&input).await.unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(tokio::fs::metadata(&parts[0]).await.unwrap().len(), 1000);
        assert_eq!(tokio::fs::metadata(&parts[2]).await.unwrap().len(), 500);
    }

    #[test]
    fn test_segment_duration_respects_budget() {
        // 恒定码率下每个整段字节数不超过预算（含 5% 余量）
        let budget = 2000u64 * 1024 * 1024;
        let file_size = (budget as f64 * 2.2) as u64;
        let duration = 7200.0;

        let segment_time = compute_segment_duration(file_size, duration, budget);
        let bitrate = file_size as f64 * 8.0 / duration;
        let segment_bytes = bitrate * segment_time / 8.0;

        assert!(segment_bytes <= budget as f64);
        assert!(segment_bytes >= budget as f64 * 0.9);
    }
}
