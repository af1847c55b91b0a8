//! 分享API的HTTP会话实现
//!
//! Cookie 从 Netscape 格式文件装载进 Cookie Jar；
//! 未登录会话也能解析分享，但服务端通常不下发 dlink

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::resolver::types::{ResolutionError, ShareInfoResponse};
use crate::resolver::ShareSource;

/// Netscape cookies.txt 中的一条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRecord {
    pub domain: String,
    pub path: String,
    pub name: String,
    pub value: String,
}

/// 解析 Netscape 格式的 cookie 文件内容
///
/// 每行 7 个制表符分隔字段：domain, flag, path, secure, expiry, name, value；
/// 注释行和残缺行直接跳过
pub fn parse_netscape_cookies(content: &str) -> Vec<CookieRecord> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                return None;
            }
            Some(CookieRecord {
                domain: fields[0].trim_start_matches('.').to_string(),
                path: fields[2].to_string(),
                name: fields[5].to_string(),
                value: fields[6].to_string(),
            })
        })
        .collect()
}

/// 分享API客户端
#[derive(Debug, Clone)]
pub struct ShareClient {
    /// HTTP客户端（启用自动 Cookie 管理和重定向跟随）
    client: Client,
    /// API根地址
    api_base: String,
}

impl ShareClient {
    /// 创建新的分享API客户端
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let base_url = config
            .api_base
            .parse::<reqwest::Url>()
            .with_context(|| format!("无效的API地址: {}", config.api_base))?;

        // 装载本地 cookie 文件（缺失只告警，未登录会话照常工作）
        match std::fs::read_to_string(&config.cookie_file) {
            Ok(content) => {
                let records = parse_netscape_cookies(&content);
                info!("装载 Cookie 文件: {:?}, {} 条", config.cookie_file, records.len());
                for record in records {
                    let cookie = format!(
                        "{}={}; Domain={}; Path={}",
                        record.name, record.value, record.domain, record.path
                    );
                    jar.add_cookie_str(&cookie, &base_url);
                }
            }
            Err(e) => {
                warn!("读取 Cookie 文件失败: {:?}: {}", config.cookie_file, e);
            }
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(
            "Referer",
            HeaderValue::from_str(&format!("{}/", config.api_base.trim_end_matches('/')))
                .context("无效的 Referer")?,
        );

        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("创建HTTP客户端失败")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// 调用分享API并反序列化响应
    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ShareInfoResponse, ResolutionError> {
        let url = format!("{}{}", self.api_base, path);
        debug!("请求分享API: {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| ResolutionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolutionError::Network(format!("HTTP {}", status)));
        }

        response
            .json::<ShareInfoResponse>()
            .await
            .map_err(|e| ResolutionError::Network(format!("响应解析失败: {}", e)))
    }
}

#[async_trait]
impl ShareSource for ShareClient {
    /// 获取分享根信息
    async fn share_info(&self, token: &str) -> Result<ShareInfoResponse, ResolutionError> {
        self.get_json("/api/shorturlinfo", &[("shorturl", token), ("root", "1")])
            .await
    }

    /// 列出分享内某个目录
    async fn list_folder(
        &self,
        token: &str,
        dir: &str,
    ) -> Result<ShareInfoResponse, ResolutionError> {
        self.get_json(
            "/share/list",
            &[("shorturl", token), ("dir", dir), ("root", "0")],
        )
        .await
    }

    /// 跟随重定向，返回最终URL（短链域名跳转到主站时用于二次提取）
    async fn final_url(&self, url: &str) -> Option<String> {
        match self.client.get(url).send().await {
            Ok(response) => Some(response.url().to_string()),
            Err(e) => {
                warn!("跟随重定向失败: {}", e);
                None
            }
        }
    }
}
