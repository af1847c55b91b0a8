// Terabox Relay Rust Library
// Terabox 分享链接中转管线核心库

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 访问控制模块
pub mod access;

// 进度节流与格式化模块
pub mod progress;

// 分享链接解析模块
pub mod resolver;

// 下载模块
pub mod downloader;

// 分割模块
pub mod splitter;

// 中转（上传）模块
pub mod relay;

// 管线调度模块
pub mod pipeline;

// 导出常用类型
pub use access::{AccessStore, AccessTier, UserAccessRecord};
pub use config::AppConfig;
pub use downloader::{Fetcher, HttpDownloader, TransferError};
pub use pipeline::{ActiveJobSet, JobOutcome, PipelineController, StatusFn, StatusUpdate, TransferJob};
pub use progress::ProgressThrottler;
pub use relay::{LocalTransport, MediaKind, Relay, RelayError, Transport};
pub use resolver::{LinkResolver, ResolutionError, ResolvedAsset, ShareClient, ShareResolution, ShareSource};
pub use splitter::Splitter;
