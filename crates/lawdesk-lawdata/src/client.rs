use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use lawdesk_core::{backend::LegalDataSource, config::Config, types::ContentType};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

const BASE: &str = "https://www.law.go.kr/DRF/lawSearch.do";

/// Client for the law.go.kr DRF search endpoint (statutes and precedents).
pub struct LawClient {
    base_url: String,
    access_key: String,
    http: reqwest::Client,
}

/// Transport settings for the search client.
#[derive(Debug, Clone)]
pub struct LawClientOptions {
    pub timeout: Duration,
    /// Tolerate self-signed or intercepted certificates.
    pub accept_invalid_certs: bool,
}

impl Default for LawClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            accept_invalid_certs: false,
        }
    }
}

impl LawClient {
    pub fn new(access_key: &str, options: &LawClientOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("lawdesk/0.1")
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;
        Ok(Self {
            base_url: BASE.into(),
            access_key: access_key.to_string(),
            http,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let options = LawClientOptions {
            timeout: Duration::from_secs(config.law_api_timeout_s),
            accept_invalid_certs: config.law_api_accept_invalid_certs,
        };
        Ok(Self::new(&config.law_api_key, &options)?.with_base_url(&config.law_api_base))
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    /// Full request URL, including the access key.
    pub fn search_url(&self, keyword: &str, content_type: ContentType) -> String {
        format!(
            "{}?OC={}&target={}&type=JSON&q={}",
            self.base_url,
            urlencoding::encode(&self.access_key),
            content_type.target(),
            urlencoding::encode(keyword)
        )
    }

    /// One GET, no retry. Any failure is `None`.
    pub async fn search_raw(&self, keyword: &str, content_type: ContentType) -> Option<Value> {
        let url = self.search_url(keyword, content_type);

        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(keyword = %keyword, target = %content_type, "law search timed out");
                return None;
            },
            Err(e) => {
                // reqwest errors embed the URL; drop it so the access key stays out of logs
                warn!(keyword = %keyword, target = %content_type, "law search failed: {}", e.without_url());
                return None;
            },
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!(keyword = %keyword, target = %content_type, status = %status, "law search returned non-200");
            return None;
        }

        match response.json::<Value>().await {
            Ok(v) => {
                debug!(keyword = %keyword, target = %content_type, "law search ok");
                Some(v)
            },
            Err(e) => {
                warn!(keyword = %keyword, target = %content_type, "law search body is not JSON: {}", e.without_url());
                None
            },
        }
    }
}

#[async_trait]
impl LegalDataSource for LawClient {
    async fn search(&self, keyword: &str, content_type: ContentType) -> Option<Value> {
        self.search_raw(keyword, content_type).await
    }
}
