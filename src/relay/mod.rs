// 中转（上传）模块
//
// 按扩展名把本地分段分发到对应的传输原语，投递成功后镜像到审计频道

pub mod local;
pub mod transport;

pub use local::{LocalTransport, SentRecord};
pub use transport::{MessageRef, RelayError, Transport};

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::progress::ProgressFn;

/// 内容类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// 视频
    Video,
    /// 图片
    Photo,
    /// 音频
    Audio,
    /// 其他文档
    Document,
}

impl MediaKind {
    /// 按扩展名归类，未知扩展名一律按文档投递
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "mp4" | "mkv" | "avi" | "mov" => MediaKind::Video,
            "jpg" | "jpeg" | "png" | "webp" => MediaKind::Photo,
            "mp3" | "flac" | "wav" => MediaKind::Audio,
            _ => MediaKind::Document,
        }
    }
}

/// 分段中转器
pub struct Relay {
    /// 输出传输
    transport: Arc<dyn Transport>,
    /// 审计频道ID（配置后每条投递成功的消息镜像一份）
    audit_chat_id: Option<i64>,
}

impl Relay {
    pub fn new(transport: Arc<dyn Transport>, audit_chat_id: Option<i64>) -> Self {
        Self {
            transport,
            audit_chat_id,
        }
    }

    /// 投递一个本地分段
    ///
    /// 任一步失败都是该分段的终态；本地文件清理由调用方负责（无论成败）
    pub async fn relay(
        &self,
        path: &Path,
        chat_id: i64,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError> {
        let caption = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let kind = MediaKind::from_path(path);
        debug!("投递分段: {:?} ({:?}) -> chat {}", path, kind, chat_id);

        let sent = match kind {
            MediaKind::Video => {
                self.transport
                    .send_video(chat_id, path, &caption, on_progress)
                    .await?
            }
            MediaKind::Photo => {
                self.transport
                    .send_photo(chat_id, path, &caption, on_progress)
                    .await?
            }
            MediaKind::Audio => {
                self.transport
                    .send_audio(chat_id, path, &caption, on_progress)
                    .await?
            }
            MediaKind::Document => {
                self.transport
                    .send_document(chat_id, path, &caption, on_progress)
                    .await?
            }
        };

        // 审计镜像：按引用复制，不重传字节
        if let Some(audit_chat) = self.audit_chat_id {
            self.transport.copy_message(&sent, audit_chat).await?;
        }

        info!("投递完成: {} -> chat {}", caption, chat_id);
        Ok(sent)
    }
}
