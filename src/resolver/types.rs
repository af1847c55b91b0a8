// 分享链接解析类型定义

use serde::{Deserialize, Deserializer, Serialize};

/// 分享列表条目（share-info / 目录列表接口共用的条目形状）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareEntry {
    /// 文件服务器ID
    #[serde(default, rename = "fs_id")]
    pub fs_id: u64,

    /// 服务器文件名
    #[serde(default)]
    pub server_filename: String,

    /// 服务器路径（目录条目用它发起子目录列表请求）
    #[serde(default)]
    pub path: String,

    /// 文件大小（字节，目录为 0）
    #[serde(default)]
    pub size: u64,

    /// 下载直链（未登录会话可能为空）
    #[serde(default)]
    pub dlink: String,

    /// 是否是目录（服务端会返回 "1" 或 1，两种编码都要容忍）
    #[serde(default, deserialize_with = "de_flag")]
    pub isdir: i32,
}

impl ShareEntry {
    /// 是否是目录
    pub fn is_directory(&self) -> bool {
        self.isdir == 1
    }
}

/// 把 "1" / 1 / true 统一解析成 i32 标志位
fn de_flag<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let flag = match value {
        serde_json::Value::String(s) => s.parse::<i32>().unwrap_or(0),
        serde_json::Value::Number(n) => n.as_i64().unwrap_or(0) as i32,
        serde_json::Value::Bool(b) => b as i32,
        _ => 0,
    };
    Ok(flag)
}

/// share-info / 目录列表响应
#[derive(Debug, Deserialize)]
pub struct ShareInfoResponse {
    /// 错误码（0表示成功）
    pub errno: i64,

    /// 条目列表
    #[serde(default)]
    pub list: Vec<ShareEntry>,

    /// 分享ID
    #[serde(default)]
    pub shareid: u64,

    /// 分享者UK
    #[serde(default)]
    pub uk: u64,
}

/// 解析出的可下载资产
///
/// 解析器返回后不可变，由下载器消费
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedAsset {
    /// 文件服务器ID
    pub fs_id: u64,
    /// 文件名（服务端缺失时回落为 "file_<fs_id>"）
    pub filename: String,
    /// 文件大小（字节）
    pub size_bytes: u64,
    /// 下载直链（可能为空，对该资产是终态而非可重试错误）
    pub download_link: String,
    /// 是否是目录
    pub is_dir: bool,
}

impl From<ShareEntry> for ResolvedAsset {
    fn from(entry: ShareEntry) -> Self {
        let filename = if entry.server_filename.is_empty() {
            format!("file_{}", entry.fs_id)
        } else {
            entry.server_filename
        };
        Self {
            fs_id: entry.fs_id,
            filename,
            size_bytes: entry.size,
            download_link: entry.dlink,
            is_dir: entry.isdir == 1,
        }
    }
}

/// 一次链接解析的结果，临时数据，不落盘
#[derive(Debug, Clone)]
pub struct ShareResolution {
    /// 展平后的资产列表（保持服务端列表顺序，目录被其展开内容原位替换）
    pub assets: Vec<ResolvedAsset>,
    /// 分享ID
    pub share_id: u64,
    /// 分享者UK
    pub user_key: u64,
}

/// 链接解析错误
///
/// 原样上报给调用方作为该链接的终态，从不自动重试
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("无法从链接中提取分享标识")]
    NoToken,
    #[error("分享可达但没有可见文件（通常需要登录会话）")]
    Empty,
    #[error("目录嵌套超过最大深度 {0}")]
    TooDeep(usize),
    #[error("分享已过期或被删除")]
    ShareExpired,
    #[error("登录会话已失效，请更新 Cookie")]
    AuthExpired,
    #[error("分享标识无效或没有访问权限")]
    PermissionDenied,
    #[error("分享API错误: errno={0}")]
    UnknownApi(i64),
    #[error("网络错误: {0}")]
    Network(String),
}

impl ResolutionError {
    /// 集中式 errno → 错误类型映射
    ///
    /// 已知码表：105 = 分享过期/删除，2 = 会话失效，4000020 = 标识无效/无权限；
    /// 其余非零码带原始值上报，便于诊断
    pub fn from_errno(errno: i64) -> Self {
        match errno {
            105 => ResolutionError::ShareExpired,
            2 => ResolutionError::AuthExpired,
            4000020 => ResolutionError::PermissionDenied,
            other => ResolutionError::UnknownApi(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_isdir_string_and_number() {
        // 服务端对 isdir 的两种编码都能解析
        let from_string: ShareEntry = serde_json::from_str(
            r#"{"fs_id": 1, "server_filename": "dir", "size": 0, "isdir": "1"}"#,
        )
        .unwrap();
        assert!(from_string.is_directory());

        let from_number: ShareEntry =
            serde_json::from_str(r#"{"fs_id": 2, "server_filename": "f.mp4", "isdir": 0}"#)
                .unwrap();
        assert!(!from_number.is_directory());
    }

    #[test]
    fn test_missing_dlink_defaults_empty() {
        let entry: ShareEntry =
            serde_json::from_str(r#"{"fs_id": 3, "server_filename": "f.bin", "size": 7}"#).unwrap();
        assert_eq!(entry.dlink, "");
    }

    #[test]
    fn test_asset_filename_fallback() {
        let entry: ShareEntry = serde_json::from_str(r#"{"fs_id": 42, "size": 10}"#).unwrap();
        let asset = ResolvedAsset::from(entry);
        assert_eq!(asset.filename, "file_42");
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(ResolutionError::from_errno(105), ResolutionError::ShareExpired);
        assert_eq!(ResolutionError::from_errno(2), ResolutionError::AuthExpired);
        assert_eq!(
            ResolutionError::from_errno(4000020),
            ResolutionError::PermissionDenied
        );
        assert_eq!(
            ResolutionError::from_errno(-9),
            ResolutionError::UnknownApi(-9)
        );
    }

    #[test]
    fn test_response_defaults() {
        // 错误响应里 list/shareid/uk 可能缺失
        let resp: ShareInfoResponse = serde_json::from_str(r#"{"errno": 105}"#).unwrap();
        assert_eq!(resp.errno, 105);
        assert!(resp.list.is_empty());
    }
}
