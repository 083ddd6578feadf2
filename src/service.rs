use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::Service;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::extract::{ExtractionPipeline, ExtractionResult};
use crate::traits::{PageFetcher, PageHandle};

/// 抽出リクエスト（1行分）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub row: usize,
    pub url: String,
}

impl ExtractRequest {
    pub fn new(row: usize, url: impl Into<String>) -> Self {
        Self {
            row,
            url: url.into(),
        }
    }
}

/// tower::Serviceを実装した抽出サービス
///
/// ページ取得 → 抽出 → ページ解放 を1リクエストとして扱う。取得失敗は `Err` で返す。
pub struct ExtractService<F> {
    fetcher: Arc<F>,
    pipeline: Arc<ExtractionPipeline>,
    timeout: Duration,
}

impl<F> Clone for ExtractService<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            pipeline: Arc::clone(&self.pipeline),
            timeout: self.timeout,
        }
    }
}

impl<F> ExtractService<F> {
    pub fn new(fetcher: Arc<F>, pipeline: ExtractionPipeline, timeout: Duration) -> Self {
        Self {
            fetcher,
            pipeline: Arc::new(pipeline),
            timeout,
        }
    }
}

impl<F> Service<ExtractRequest> for ExtractService<F>
where
    F: PageFetcher + 'static,
{
    type Response = ExtractionResult;
    type Error = SyncError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ExtractRequest) -> Self::Future {
        info!("Extract request: row={}, url={}", req.row, req.url);

        let fetcher = Arc::clone(&self.fetcher);
        let pipeline = Arc::clone(&self.pipeline);
        let timeout = self.timeout;

        Box::pin(async move {
            let page = fetcher.load(&req.url, timeout).await?;

            let result = pipeline.extract(&page).await;

            // 成否に関わらずページを解放
            page.close().await;
            debug!("Page closed: row={}", req.row);

            Ok(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tower::ServiceExt;

    use super::*;
    use crate::html::HtmlPage;

    /// close 呼び出し回数を数えるページ
    struct CountingPage {
        inner: HtmlPage,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PageHandle for CountingPage {
        async fn query_selector_text(&self, selector: &str) -> Option<String> {
            self.inner.query_selector_text(selector).await
        }

        async fn scripts_of_type(&self, mime_type: &str) -> Vec<String> {
            self.inner.scripts_of_type(mime_type).await
        }

        async fn global_array_pushes(&self, var_name: &str) -> Vec<serde_json::Value> {
            self.inner.global_array_pushes(var_name).await
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubFetcher {
        html: &'static str,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        type Page = CountingPage;

        async fn load(&self, url: &str, _timeout: Duration) -> Result<CountingPage, SyncError> {
            if url.contains("timeout") {
                return Err(SyncError::Timeout(url.to_string()));
            }
            Ok(CountingPage {
                inner: HtmlPage::new(self.html),
                closed: Arc::clone(&self.closed),
            })
        }
    }

    fn service(html: &'static str, closed: &Arc<AtomicUsize>) -> ExtractService<StubFetcher> {
        ExtractService::new(
            Arc::new(StubFetcher {
                html,
                closed: Arc::clone(closed),
            }),
            ExtractionPipeline::new("Éxito"),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_found_and_page_closed() {
        let closed = Arc::new(AtomicUsize::new(0));
        let svc = service("<span class='price'>$ 12.900</span>", &closed);

        let result = svc
            .oneshot(ExtractRequest::new(2, "https://www.exito.com/p1/p"))
            .await
            .unwrap();
        assert!(result.is_found());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_still_closes_page() {
        let closed = Arc::new(AtomicUsize::new(0));
        let svc = service("<p>sin precio</p>", &closed);

        let result = svc
            .oneshot(ExtractRequest::new(3, "https://www.exito.com/p2/p"))
            .await
            .unwrap();
        assert_eq!(result, ExtractionResult::NotFound);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let closed = Arc::new(AtomicUsize::new(0));
        let svc = service("", &closed);

        let err = svc
            .oneshot(ExtractRequest::new(4, "https://www.exito.com/timeout/p"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));
    }
}
