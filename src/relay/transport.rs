// 输出传输抽象

use std::path::Path;

use async_trait::async_trait;

use crate::progress::ProgressFn;

/// 已投递消息的引用
///
/// 审计镜像按引用复制，不重传字节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    /// 目标会话ID
    pub chat_id: i64,
    /// 消息ID（传输实现内部分配）
    pub message_id: i64,
}

/// 中转错误，携带底层原因；对当前分段是终态
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("投递失败: {0}")]
    Transport(String),
    #[error("读取本地文件失败: {0}")]
    Io(String),
}

/// 输出传输
///
/// 四类内容分别走各自的传输原语，进度回调与下载共用同一节流契约。
/// 本地文件系统实现见 [`super::LocalTransport`]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_video(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError>;

    async fn send_audio(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError>;

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: &str,
        on_progress: ProgressFn<'_>,
    ) -> Result<MessageRef, RelayError>;

    /// 把已投递的消息按引用复制到另一个会话（审计镜像用）
    async fn copy_message(&self, message: &MessageRef, to_chat: i64)
        -> Result<MessageRef, RelayError>;
}
