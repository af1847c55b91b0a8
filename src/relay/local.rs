//! 本地文件系统传输
//!
//! 把分段复制进输出目录的按会话子目录，消息ID自增分配。
//! 供不接聊天传输的部署和测试使用

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::progress::ProgressFn;
use crate::relay::transport::{MessageRef, RelayError, Transport};
use crate::relay::MediaKind;

/// 一条已投递记录
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub message: MessageRef,
    pub kind: MediaKind,
    /// 投递后的本地落点
    pub stored_path: PathBuf,
    pub caption: String,
}

/// 本地文件系统传输
pub struct LocalTransport {
    /// 输出根目录
    output_dir: PathBuf,
    /// 消息ID分配器
    next_message_id: AtomicI64,
    /// 已投递记录（copy_message 按引用查找落点）
    sent: Mutex<Vec<SentRecord>>,
}

impl LocalTransport {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            next_message_id: AtomicI64::new(1),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// 已投递记录快照（测试和审计用）
    pub fn sent_records(&self) -> Vec<SentRecord> {
        self.sent.lock().clone()
    }

    async fn deliver(
        &self,
        kind: MediaKind,
        chat_id: i64,
        path: &Path,
        caption: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| RelayError::Io(e.to_string()))?
            .len();

        let chat_dir = self.output_dir.join(chat_id.to_string());
        tokio::fs::create_dir_all(&chat_dir)
            .await
            .map_err(|e| RelayError::Io(e.to_string()))?;

        let file_name = path
            .file_name()
            .ok_or_else(|| RelayError::Io(format!("无效的文件路径: {:?}", path)))?;
        let target = chat_dir.join(file_name);
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        on_progress(size, size);

        let message = MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::Relaxed),
        };
        debug!("本地投递: {:?} -> {:?} ({:?})", path, target, kind);

        self.sent.lock().push(SentRecord {
            message: message.clone(),
            kind,
            stored_path: target,
            caption: caption.to_string(),
        });
        Ok(message)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send_video(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError> {
        self.deliver(MediaKind::Video, chat_id, path, caption, on_progress)
            .await
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError> {
        self.deliver(MediaKind::Photo, chat_id, path, caption, on_progress)
            .await
    }

    async fn send_audio(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError> {
        self.deliver(MediaKind::Audio, chat_id, path, caption, on_progress)
            .await
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError> {
        self.deliver(MediaKind::Document, chat_id, path, caption, on_progress)
            .await
    }

    async fn copy_message(
        &self,
        message: &MessageRef,
        to_chat: i64,
    ) -> Result<MessageRef, RelayError> {
        // 按引用查找已投递的落点，从落点复制，不回读原始文件
        let record = {
            let sent = self.sent.lock();
            sent.iter()
                .find(|r| r.message == *message)
                .cloned()
                .ok_or_else(|| {
                    RelayError::Transport(format!("消息不存在: {:?}", message))
                })?
        };

        self.deliver(
            record.kind,
            to_chat,
            &record.stored_path,
            &record.caption,
            &|_, _| {},
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_and_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let transport = LocalTransport::new(&out);

        let src = dir.path().join("clip.mp4");
        tokio::fs::write(&src, b"data").await.unwrap();

        let sent = transport
            .send_video(42, &src, "clip.mp4", &|_, _| {})
            .await
            .unwrap();
        assert!(out.join("42/clip.mp4").exists());

        // 按引用镜像到审计会话
        let mirrored = transport.copy_message(&sent, -100).await.unwrap();
        assert_ne!(mirrored.message_id, sent.message_id);
        assert!(out.join("-100/clip.mp4").exists());

        let records = transport.sent_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, MediaKind::Video);
    }

    #[tokio::test]
    async fn test_copy_unknown_message_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());

        let err = transport
            .copy_message(
                &MessageRef {
                    chat_id: 1,
                    message_id: 777,
                },
                2,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }

    #[tokio::test]
    async fn test_missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());

        let err = transport
            .send_document(1, Path::new("/no/such/file"), "f", &|_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
