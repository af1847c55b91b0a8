// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 访问控制配置
    #[serde(default)]
    pub access: AccessConfig,
    /// 链接解析配置
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// 下载配置
    #[serde(default)]
    pub download: DownloadConfig,
    /// 分割配置
    #[serde(default)]
    pub split: SplitConfig,
    /// 中转配置
    #[serde(default)]
    pub relay: RelayConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 访问控制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// 管理员用户ID
    #[serde(default)]
    pub admin_id: i64,
    /// 用户数据库路径
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// 新用户初始配额
    #[serde(default = "default_initial_credits")]
    pub initial_credits: i64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/users.db")
}

fn default_initial_credits() -> i64 {
    3
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admin_id: 0,
            database_path: default_database_path(),
            initial_credits: default_initial_credits(),
        }
    }
}

/// 链接解析配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// 分享API根地址
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Netscape 格式 Cookie 文件路径（未登录会话可能拿不到 dlink）
    #[serde(default = "default_cookie_file")]
    pub cookie_file: PathBuf,
    /// 请求 User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 目录递归展开的最大深度
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// 请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://www.terabox.com".to_string()
}

fn default_cookie_file() -> PathBuf {
    PathBuf::from("www.terabox.com_cookies.txt")
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36".to_string()
}

fn default_max_depth() -> usize {
    32
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            cookie_file: default_cookie_file(),
            user_agent: default_user_agent(),
            max_depth: default_max_depth(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// 下载临时目录
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// 读写缓冲大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 进度回调节流间隔（秒）
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_chunk_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_progress_interval_secs() -> u64 {
    7
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            chunk_size: default_chunk_size(),
            progress_interval_secs: default_progress_interval_secs(),
        }
    }
}

/// 分割配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// 单个分段大小上限（字节）
    #[serde(default = "default_part_size")]
    pub part_size: u64,
    /// ffmpeg 可执行文件路径
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// ffprobe 可执行文件路径
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
}

fn default_part_size() -> u64 {
    2000 * 1024 * 1024 // 2000MB (~1.95GB)
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

/// 中转配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// 审计频道ID（设置后，每条投递成功的消息会镜像一份）
    #[serde(default)]
    pub audit_chat_id: Option<i64>,
    /// 本地传输的输出目录
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("delivered")
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            audit_chat_id: None,
            output_dir: default_output_dir(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// 默认配置文件路径
    pub const DEFAULT_PATH: &'static str = "config/app.toml";

    /// 从配置文件加载，文件不存在时返回默认配置
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("解析配置文件失败: {:?}", path))?;
        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;
        Ok(())
    }
}
