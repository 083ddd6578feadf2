//! ヘッドレスブラウザによるページ取得
//!
//! ブラウザは1回の実行につき1つ起動し、URLごとに新しいタブを開いて抽出後に必ず閉じる。

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::traits::{PageFetcher, PageHandle};

/// ネットワークアイドル待機のタイムアウト（ミリ秒）
const NETWORK_IDLE_TIMEOUT_MS: u64 = 15000;
/// ネットワークアイドル判定のインターバル（ミリ秒）
const NETWORK_IDLE_CHECK_INTERVAL_MS: u64 = 500;
const REQUIRED_IDLE_CHECKS: u32 = 3;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub struct BrowserFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserFetcher {
    /// ブラウザを起動
    pub async fn launch(config: &SyncConfig) -> Result<Self, SyncError> {
        info!("Launching browser (headless={})...", config.headless);

        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("price-sync-{}", unique_id));

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(1280, 800);

        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(config.fetch_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--lang=es-CO")
            .arg(format!("--user-agent={}", USER_AGENT));

        let browser_config = builder
            .build()
            .map_err(|e| SyncError::BrowserInit(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SyncError::BrowserInit(e.to_string()))?;

        // ハンドラータスクを起動
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {:?}", e);
                }
            }
        });

        info!("Browser launched");
        Ok(Self { browser, handler })
    }

    /// ブラウザを終了
    pub async fn close(mut self) -> Result<(), SyncError> {
        info!("Closing browser...");
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
        info!("Browser closed");
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    type Page = BrowserPage;

    async fn load(&self, url: &str, timeout: Duration) -> Result<BrowserPage, SyncError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SyncError::BrowserInit(e.to_string()))?;

        let navigation = async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        };
        let outcome = tokio::time::timeout(timeout, navigation).await;

        let page = BrowserPage { page };
        match outcome {
            Ok(Ok(())) => {
                debug!("Navigated to {}", url);
            }
            Ok(Err(e)) => {
                page.close().await;
                return Err(SyncError::Navigation(format!("{url}: {e}")));
            }
            Err(_) => {
                page.close().await;
                return Err(SyncError::Timeout(format!(
                    "{url}: navigation exceeded {}ms",
                    timeout.as_millis()
                )));
            }
        }

        page.wait_request_idle().await;
        Ok(page)
    }
}

/// ブラウザのタブ1つ
pub struct BrowserPage {
    page: Page,
}

impl BrowserPage {
    async fn evaluate_string(&self, expression: &str) -> Option<String> {
        match self.page.evaluate(expression).await {
            Ok(result) => result.into_value::<String>().ok(),
            Err(e) => {
                debug!("Evaluation failed: {}", e);
                None
            }
        }
    }

    /// ネットワークリクエストがアイドル状態になるまで待機（タイムアウト時はそのまま続行）
    async fn wait_request_idle(&self) {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(NETWORK_IDLE_TIMEOUT_MS);
        let mut idle_count = 0;

        while start.elapsed() < timeout {
            let result = self
                .page
                .evaluate(
                    r#"
                    (() => {
                        if (document.readyState !== 'complete') return false;
                        const entries = performance.getEntriesByType('resource');
                        const now = performance.now();
                        const recent = entries.filter(e => (now - e.startTime) < 500 && e.duration === 0);
                        return recent.length === 0;
                    })()
                "#,
                )
                .await;

            match result {
                Ok(val) => {
                    if val.into_value::<bool>().unwrap_or(false) {
                        idle_count += 1;
                        if idle_count >= REQUIRED_IDLE_CHECKS {
                            debug!("Network idle after {:?}", start.elapsed());
                            return;
                        }
                    } else {
                        idle_count = 0;
                    }
                }
                Err(e) => {
                    debug!("Network idle check error: {}", e);
                    idle_count = 0;
                }
            }

            sleep(Duration::from_millis(NETWORK_IDLE_CHECK_INTERVAL_MS)).await;
        }

        debug!(
            "Network idle timeout after {:?}, proceeding anyway",
            start.elapsed()
        );
    }
}

#[async_trait]
impl PageHandle for BrowserPage {
    async fn query_selector_text(&self, selector: &str) -> Option<String> {
        let element = self.page.find_element(selector).await.ok()?;
        let text = element.inner_text().await.ok()??;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    async fn scripts_of_type(&self, mime_type: &str) -> Vec<String> {
        let Ok(mime) = serde_json::to_string(mime_type) else {
            return Vec::new();
        };
        let expression = format!(
            "JSON.stringify(Array.from(document.querySelectorAll('script[type=\"' + {mime} + '\"]')).map(s => s.textContent || ''))"
        );
        self.evaluate_string(&expression)
            .await
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    async fn global_array_pushes(&self, var_name: &str) -> Vec<serde_json::Value> {
        let Ok(name) = serde_json::to_string(var_name) else {
            return Vec::new();
        };
        // 循環参照などシリアライズできない要素は個別に捨てる
        let expression = format!(
            r#"
            (() => {{
                const arr = window[{name}];
                if (!Array.isArray(arr)) return '[]';
                const out = [];
                for (const e of arr) {{
                    try {{ out.push(JSON.parse(JSON.stringify(e))); }} catch (_) {{}}
                }}
                return JSON.stringify(out);
            }})()
            "#
        );
        self.evaluate_string(&expression)
            .await
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            debug!("Failed to close page: {}", e);
        }
    }
}
