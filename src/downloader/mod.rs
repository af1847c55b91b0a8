// 下载模块
//
// 把单个资产的下载直链流式写入本地文件，进度回调按节流间隔上报。
// 本层不做重试，重试策略（如果有）属于调用方

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::progress::{ProgressFn, ProgressThrottler};
use crate::resolver::ResolvedAsset;

/// 传输错误
///
/// 只对当前资产是终态，不影响同一任务里的其他资产
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// 服务端未下发下载直链（未登录会话常见），对该资产是终态
    #[error("资产没有可用的下载直链")]
    MissingLink,
    /// 响应状态非 2xx，发生在写入任何字节之前
    #[error("下载HTTP错误: {0}")]
    HttpStatus(u16),
    /// 传输中途的网络或磁盘故障；已写入的部分留给调用方清理
    #[error("传输IO失败: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransferError {
    fn from(e: std::io::Error) -> Self {
        TransferError::Io(e.to_string())
    }
}

/// 资产下载器
///
/// HTTP 实现见 [`HttpDownloader`]；测试注入替身
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 把资产下载到目标路径，成功时返回落盘路径
    async fn fetch(
        &self,
        asset: &ResolvedAsset,
        dest: &Path,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf, TransferError>;
}

/// 流式HTTP下载器
pub struct HttpDownloader {
    /// HTTP客户端
    client: Client,
    /// 进度回调节流间隔
    progress_interval: Duration,
}

impl HttpDownloader {
    /// 创建下载器
    ///
    /// 直链服务端校验 User-Agent 和 Referer，必须与解析会话保持一致
    pub fn new(user_agent: &str, referer: &str, progress_interval: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Referer",
            HeaderValue::from_str(referer).context("无效的 Referer")?,
        );

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .context("创建HTTP客户端失败")?;

        Ok(Self {
            client,
            progress_interval,
        })
    }
}

#[async_trait]
impl Fetcher for HttpDownloader {
    async fn fetch(
        &self,
        asset: &ResolvedAsset,
        dest: &Path,
        on_progress: ProgressFn<'_>,
    ) -> Result<PathBuf, TransferError> {
        if asset.download_link.is_empty() {
            return Err(TransferError::MissingLink);
        }

        let response = self
            .client
            .get(&asset.download_link)
            .send()
            .await
            .map_err(|e| TransferError::Io(e.to_string()))?;

        // 非 2xx 在写入任何字节之前就终止
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::HttpStatus(status.as_u16()));
        }

        let total_size = response.content_length().unwrap_or(0);
        debug!(
            "开始下载: {} -> {:?}, total={}",
            asset.filename, dest, total_size
        );

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(dest).await?;

        let throttler = ProgressThrottler::new(self.progress_interval);
        let mut stream = response.bytes_stream();
        let mut bytes_written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransferError::Io(e.to_string()))?;
            file.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;

            // 节流上报，绝不逐块回调
            if throttler.should_emit() {
                on_progress(bytes_written, total_size);
            }
        }

        file.flush().await?;
        on_progress(bytes_written, total_size);

        info!("下载完成: {:?}, {} bytes", dest, bytes_written);
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset_without_link() -> ResolvedAsset {
        ResolvedAsset {
            fs_id: 1,
            filename: "a.mp4".to_string(),
            size_bytes: 10,
            download_link: String::new(),
            is_dir: false,
        }
    }

    #[tokio::test]
    async fn test_missing_link_is_terminal() {
        // 空直链不发起任何请求，直接终态
        let downloader =
            HttpDownloader::new("ua", "https://host/", Duration::from_secs(7)).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = downloader
            .fetch(&asset_without_link(), &dir.path().join("a.mp4"), &|_, _| {})
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::MissingLink);
        assert!(!dir.path().join("a.mp4").exists());
    }

    /// 只应答一次固定响应的本地监听器，返回其地址
    async fn spawn_responder(response: &'static str) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_http_error_status_writes_nothing() {
        // 非 2xx 在写入任何字节之前终止，目标文件不存在
        let addr =
            spawn_responder("HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n").await;

        let downloader =
            HttpDownloader::new("ua", "https://host/", Duration::from_secs(7)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.mp4");

        let asset = ResolvedAsset {
            fs_id: 1,
            filename: "a.mp4".to_string(),
            size_bytes: 10,
            download_link: format!("http://{}/file", addr),
            is_dir: false,
        };

        let err = downloader.fetch(&asset, &dest, &|_, _| {}).await.unwrap_err();
        assert_eq!(err, TransferError::HttpStatus(404));
        assert!(!dest.exists());
    }
}
