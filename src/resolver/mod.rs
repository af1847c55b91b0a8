// 分享链接解析模块
//
// 把原始链接字符串解析成展平的可下载资产列表：
// 提取分享标识 → 标准化 → 拉取分享元数据 → 递归展开目录

pub mod client;
pub mod types;

pub use client::{parse_netscape_cookies, CookieRecord, ShareClient};
pub use types::{
    ResolutionError, ResolvedAsset, ShareEntry, ShareInfoResponse, ShareResolution,
};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

/// 分享标识的固定前缀标记，API 要求标识以它开头
const TOKEN_MARKER: char = '1';

/// 分享列表数据源
///
/// HTTP 实现见 [`ShareClient`]；测试注入替身
#[async_trait]
pub trait ShareSource: Send + Sync {
    /// 获取分享根信息
    async fn share_info(&self, token: &str) -> Result<ShareInfoResponse, ResolutionError>;

    /// 列出分享内某个目录
    async fn list_folder(&self, token: &str, dir: &str)
        -> Result<ShareInfoResponse, ResolutionError>;

    /// 跟随重定向，返回最终URL；不支持时返回 None
    async fn final_url(&self, _url: &str) -> Option<String> {
        None
    }
}

/// 从链接中提取分享标识
///
/// 依次尝试：路径形式 `/s/<token>`、查询参数 `surl=<token>`
/// （后者同时覆盖 `sharing/link?surl=` 路径形式）
pub fn extract_share_token(url: &str) -> Option<String> {
    let re_path = Regex::new(r"/s/([A-Za-z0-9_-]+)").ok()?;
    if let Some(caps) = re_path.captures(url) {
        return Some(caps.get(1)?.as_str().to_string());
    }

    let re_surl = Regex::new(r"[?&]surl=([A-Za-z0-9_-]+)").ok()?;
    if let Some(caps) = re_surl.captures(url) {
        return Some(caps.get(1)?.as_str().to_string());
    }

    None
}

/// 标准化分享标识：缺少前缀标记时补上，幂等
pub fn normalize_token(token: &str) -> String {
    if token.starts_with(TOKEN_MARKER) {
        token.to_string()
    } else {
        format!("{}{}", TOKEN_MARKER, token)
    }
}

/// 链接解析器
///
/// 泛型于数据源，目录展开用显式栈而非调用栈递归：
/// 服务端数据不受信任，深度由计数器显式封顶
pub struct LinkResolver<S: ShareSource> {
    source: S,
    max_depth: usize,
}

impl<S: ShareSource> LinkResolver<S> {
    pub fn new(source: S, max_depth: usize) -> Self {
        Self { source, max_depth }
    }

    /// 解析链接为展平的资产列表
    pub async fn resolve(&self, raw_url: &str) -> Result<ShareResolution, ResolutionError> {
        // 1. 提取分享标识；原始URL提取不到时跟随一次重定向后重试，
        //    仍失败则回退到原始URL
        let token = match extract_share_token(raw_url) {
            Some(t) => t,
            None => self
                .source
                .final_url(raw_url)
                .await
                .as_deref()
                .and_then(extract_share_token)
                .or_else(|| extract_share_token(raw_url))
                .ok_or(ResolutionError::NoToken)?,
        };

        // 2. 标准化
        let token = normalize_token(&token);
        debug!("分享标识: {}", token);

        // 3. 拉取分享元数据
        let root = self.source.share_info(&token).await?;
        if root.errno != 0 {
            return Err(ResolutionError::from_errno(root.errno));
        }
        let share_id = root.shareid;
        let user_key = root.uk;

        // 4. 深度优先展开目录：目录被其内容原位替换，同级顺序不变。
        //    条目逆序入栈，出栈顺序即服务端列表顺序
        let mut stack: Vec<(ShareEntry, usize)> =
            root.list.into_iter().rev().map(|e| (e, 0)).collect();
        let mut assets = Vec::new();

        while let Some((entry, depth)) = stack.pop() {
            if entry.is_directory() {
                let next_depth = depth + 1;
                if next_depth > self.max_depth {
                    return Err(ResolutionError::TooDeep(self.max_depth));
                }

                let listing = self.source.list_folder(&token, &entry.path).await?;
                if listing.errno != 0 {
                    return Err(ResolutionError::from_errno(listing.errno));
                }
                for child in listing.list.into_iter().rev() {
                    stack.push((child, next_depth));
                }
            } else {
                assets.push(ResolvedAsset::from(entry));
            }
        }

        // 5. 分享可达但没有可见文件（与 NoToken/API 错误区分）
        if assets.is_empty() {
            return Err(ResolutionError::Empty);
        }

        info!("链接解析完成: {} 个文件", assets.len());
        Ok(ShareResolution {
            assets,
            share_id,
            user_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_extract_token_path_form() {
        assert_eq!(
            extract_share_token("https://host/s/1abc").as_deref(),
            Some("1abc")
        );
    }

    #[test]
    fn test_extract_token_surl_forms() {
        assert_eq!(
            extract_share_token("https://host/sharing/link?surl=1abc").as_deref(),
            Some("1abc")
        );
        assert_eq!(
            extract_share_token("https://host/path?x=1&surl=1abc").as_deref(),
            Some("1abc")
        );
    }

    #[test]
    fn test_extract_token_none() {
        assert_eq!(extract_share_token("https://host/home"), None);
    }

    #[test]
    fn test_normalize_token_idempotent() {
        assert_eq!(normalize_token("abc"), "1abc");
        assert_eq!(normalize_token("1abc"), "1abc");
    }

    /// 测试替身：用 HashMap 模拟目录树
    struct MockSource {
        root_errno: i64,
        root: Vec<ShareEntry>,
        folders: HashMap<String, Vec<ShareEntry>>,
        redirect: Option<String>,
    }

    impl MockSource {
        fn new(root: Vec<ShareEntry>) -> Self {
            Self {
                root_errno: 0,
                root,
                folders: HashMap::new(),
                redirect: None,
            }
        }
    }

    #[async_trait]
    impl ShareSource for MockSource {
        async fn share_info(&self, _token: &str) -> Result<ShareInfoResponse, ResolutionError> {
            Ok(ShareInfoResponse {
                errno: self.root_errno,
                list: self.root.clone(),
                shareid: 111,
                uk: 222,
            })
        }

        async fn list_folder(
            &self,
            _token: &str,
            dir: &str,
        ) -> Result<ShareInfoResponse, ResolutionError> {
            Ok(ShareInfoResponse {
                errno: 0,
                list: self.folders.get(dir).cloned().unwrap_or_default(),
                shareid: 111,
                uk: 222,
            })
        }

        async fn final_url(&self, _url: &str) -> Option<String> {
            self.redirect.clone()
        }
    }

    fn file(fs_id: u64, name: &str, size: u64) -> ShareEntry {
        ShareEntry {
            fs_id,
            server_filename: name.to_string(),
            path: format!("/{}", name),
            size,
            dlink: format!("https://d.host/{}", fs_id),
            isdir: 0,
        }
    }

    fn dir(fs_id: u64, path: &str) -> ShareEntry {
        ShareEntry {
            fs_id,
            server_filename: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            size: 0,
            dlink: String::new(),
            isdir: 1,
        }
    }

    #[tokio::test]
    async fn test_flatten_depth_three_preserves_order() {
        // 根: [a.mp4, dir1, z.mp4]，dir1: [b.mp4, dir2]，dir2: [c.mp4]
        // 期望顺序: a, b, c, z（目录被展开内容原位替换）
        let mut source = MockSource::new(vec![
            file(1, "a.mp4", 10),
            dir(2, "/dir1"),
            file(3, "z.mp4", 30),
        ]);
        source
            .folders
            .insert("/dir1".to_string(), vec![file(4, "b.mp4", 40), dir(5, "/dir1/dir2")]);
        source
            .folders
            .insert("/dir1/dir2".to_string(), vec![file(6, "c.mp4", 60)]);

        let resolver = LinkResolver::new(source, 32);
        let resolution = resolver.resolve("https://host/s/1tok").await.unwrap();

        let names: Vec<&str> = resolution
            .assets
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4", "c.mp4", "z.mp4"]);
        // 展平结果只含文件
        assert!(resolution.assets.iter().all(|a| !a.is_dir));
        assert_eq!(resolution.share_id, 111);
        assert_eq!(resolution.user_key, 222);
    }

    #[tokio::test]
    async fn test_api_error_mapped() {
        let mut source = MockSource::new(vec![]);
        source.root_errno = 105;

        let resolver = LinkResolver::new(source, 32);
        let err = resolver.resolve("https://host/s/1tok").await.unwrap_err();
        assert_eq!(err, ResolutionError::ShareExpired);
    }

    #[tokio::test]
    async fn test_empty_share() {
        let resolver = LinkResolver::new(MockSource::new(vec![]), 32);
        let err = resolver.resolve("https://host/s/1tok").await.unwrap_err();
        assert_eq!(err, ResolutionError::Empty);
    }

    #[tokio::test]
    async fn test_self_referencing_folder_hits_depth_cap() {
        // 服务端数据不保证无环：自引用目录必须被深度上限拦住
        let mut source = MockSource::new(vec![dir(1, "/loop")]);
        source
            .folders
            .insert("/loop".to_string(), vec![dir(1, "/loop")]);

        let resolver = LinkResolver::new(source, 8);
        let err = resolver.resolve("https://host/s/1tok").await.unwrap_err();
        assert_eq!(err, ResolutionError::TooDeep(8));
    }

    #[tokio::test]
    async fn test_redirect_fallback_extraction() {
        // 原始URL提取不到标识，跟随重定向后的最终URL能提取到
        let mut source = MockSource::new(vec![file(1, "a.mp4", 10)]);
        source.redirect = Some("https://main.host/s/1abc".to_string());

        let resolver = LinkResolver::new(source, 32);
        let resolution = resolver.resolve("https://short.host/xyz").await.unwrap();
        assert_eq!(resolution.assets.len(), 1);
    }

    #[tokio::test]
    async fn test_no_token_anywhere() {
        let resolver = LinkResolver::new(MockSource::new(vec![]), 32);
        let err = resolver.resolve("https://host/home").await.unwrap_err();
        assert_eq!(err, ResolutionError::NoToken);
    }
}
