//! ブラウザを使わない取得方式
//!
//! 取得済みHTMLを `scraper` で解析し、`PageHandle` として扱う。
//! `dataLayer` はインラインの `dataLayer.push({...})` 呼び出しから復元する。

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::traits::{PageFetcher, PageHandle};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// 静的HTMLページ
#[derive(Debug, Clone)]
pub struct HtmlPage {
    html: String,
}

impl HtmlPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    fn select_first_text(&self, selector: &str) -> Option<String> {
        let selector = match Selector::parse(selector) {
            Ok(s) => s,
            Err(e) => {
                debug!("Invalid selector {}: {:?}", selector, e);
                return None;
            }
        };
        let document = Html::parse_document(&self.html);
        let text = document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<Vec<_>>().join(" "));
        text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
    }

    fn select_scripts(&self, mime_type: &str) -> Vec<String> {
        let Ok(selector) = Selector::parse(&format!("script[type=\"{mime_type}\"]")) else {
            return Vec::new();
        };
        let document = Html::parse_document(&self.html);
        let scripts = document
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .collect();
        scripts
    }

    fn inline_pushes(&self, var_name: &str) -> Vec<serde_json::Value> {
        let pattern = format!(r"{}\.push\((\{{[\s\S]*?\}})\)", regex::escape(var_name));
        let Ok(push_re) = Regex::new(&pattern) else {
            return Vec::new();
        };
        push_re
            .captures_iter(&self.html)
            .filter_map(|cap| cap.get(1))
            .filter_map(|m| serde_json::from_str(m.as_str()).ok())
            .collect()
    }
}

#[async_trait]
impl PageHandle for HtmlPage {
    async fn query_selector_text(&self, selector: &str) -> Option<String> {
        self.select_first_text(selector)
    }

    async fn scripts_of_type(&self, mime_type: &str) -> Vec<String> {
        self.select_scripts(mime_type)
    }

    async fn global_array_pushes(&self, var_name: &str) -> Vec<serde_json::Value> {
        self.inline_pushes(var_name)
    }
}

/// HTTP GET でページを取得するフェッチャー
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, SyncError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    type Page = HtmlPage;

    async fn load(&self, url: &str, timeout: Duration) -> Result<HtmlPage, SyncError> {
        debug!("HTTP GET {}", url);
        let response = self
            .client
            .get(url)
            .header("Accept-Language", "es-CO,es;q=0.9")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncError::Timeout(format!("{url}: {e}"))
                } else {
                    SyncError::Navigation(format!("{url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Navigation(format!("{url}: HTTP {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| SyncError::Navigation(format!("{url}: {e}")))?;
        info!("Fetched {} ({} bytes)", url, html.len());
        Ok(HtmlPage::new(html))
    }
}
