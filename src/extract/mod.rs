//! 価格・販売者抽出パイプライン
//!
//! 戦略を固定順で試し、最初に正の価格を返した戦略の結果を採用する。
//! 価格と販売者は必ず同じ戦略から揃えて返す。

mod event_log;
mod jsonld;
mod price;
mod visible;

use tracing::{debug, info};

use crate::traits::PageHandle;

pub use event_log::latest_product_event;
pub use jsonld::product_from_jsonld;
pub use price::normalize_price;
pub use visible::seller_from_text;

/// 戦略1つが返す候補（販売者は任意）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub price: String,
    pub seller: Option<String>,
}

/// 1URLの抽出結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    Found { price: String, seller: String },
    NotFound,
    FetchError { reason: String },
}

impl ExtractionResult {
    pub fn is_found(&self) -> bool {
        matches!(self, ExtractionResult::Found { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionResult::Found { .. } => "found",
            ExtractionResult::NotFound => "not_found",
            ExtractionResult::FetchError { .. } => "fetch_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// 描画済みDOMの表示要素
    VisibleElements,
    /// JSON-LD (schema.org Product)
    StructuredData,
    /// dataLayer push
    EventLog,
}

impl Strategy {
    pub const DEFAULT_ORDER: [Strategy; 3] = [
        Strategy::VisibleElements,
        Strategy::StructuredData,
        Strategy::EventLog,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::VisibleElements => "visible",
            Strategy::StructuredData => "json-ld",
            Strategy::EventLog => "data-layer",
        }
    }

    pub async fn apply<P: PageHandle + ?Sized>(self, page: &P) -> Option<Candidate> {
        match self {
            Strategy::VisibleElements => visible::extract(page).await,
            Strategy::StructuredData => jsonld::extract(page).await,
            Strategy::EventLog => event_log::extract(page).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    strategies: Vec<Strategy>,
    fallback_seller: String,
}

impl ExtractionPipeline {
    pub fn new(fallback_seller: impl Into<String>) -> Self {
        Self {
            strategies: Strategy::DEFAULT_ORDER.to_vec(),
            fallback_seller: fallback_seller.into(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub async fn extract<P: PageHandle + ?Sized>(&self, page: &P) -> ExtractionResult {
        for strategy in &self.strategies {
            match strategy.apply(page).await {
                Some(candidate) => {
                    info!(
                        "Strategy {} matched: price={}, seller={:?}",
                        strategy.name(),
                        candidate.price,
                        candidate.seller
                    );
                    return ExtractionResult::Found {
                        price: candidate.price,
                        seller: candidate
                            .seller
                            .unwrap_or_else(|| self.fallback_seller.clone()),
                    };
                }
                None => debug!("Strategy {} found nothing", strategy.name()),
            }
        }
        ExtractionResult::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::HtmlPage;

    const JSONLD_ONLY: &str = r#"<html><head>
        <script type="application/ld+json">
        {"@type":"Product","offers":{"price":"52900","seller":{"name":"Tecno Plaza"}}}
        </script></head><body></body></html>"#;

    #[tokio::test]
    async fn test_visible_beats_structured_data() {
        let page = HtmlPage::new(
            r#"<html><head>
            <script type="application/ld+json">
            {"@type":"Product","offers":{"price":"99900","seller":{"name":"JSON Seller"}}}
            </script></head>
            <body><span class="product-price">$ 89.900</span></body></html>"#,
        );
        let result = ExtractionPipeline::new("Éxito").extract(&page).await;
        assert_eq!(
            result,
            ExtractionResult::Found {
                price: "89900".into(),
                seller: "Éxito".into()
            }
        );
    }

    #[tokio::test]
    async fn test_structured_data_fallback() {
        let page = HtmlPage::new(JSONLD_ONLY);
        let result = ExtractionPipeline::new("Éxito").extract(&page).await;
        assert_eq!(
            result,
            ExtractionResult::Found {
                price: "52900".into(),
                seller: "Tecno Plaza".into()
            }
        );
    }

    #[tokio::test]
    async fn test_event_log_last_resort() {
        let page = HtmlPage::new(
            r#"<html><head><script>
            window.dataLayer = window.dataLayer || [];
            dataLayer.push({"event":"productDetail","productId":"881","productPriceTo":349900});
            </script></head><body><span class="price">Consultar</span></body></html>"#,
        );
        let result = ExtractionPipeline::new("Éxito").extract(&page).await;
        assert_eq!(
            result,
            ExtractionResult::Found {
                price: "349900".into(),
                seller: "Éxito".into()
            }
        );
    }

    #[tokio::test]
    async fn test_not_found() {
        let page = HtmlPage::new("<html><body><p>Producto no disponible</p></body></html>");
        let result = ExtractionPipeline::new("Éxito").extract(&page).await;
        assert_eq!(result, ExtractionResult::NotFound);
        assert_eq!(result.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_custom_strategy_order() {
        let page = HtmlPage::new(JSONLD_ONLY);
        let pipeline = ExtractionPipeline::new("Éxito").with_strategies(vec![Strategy::EventLog]);
        assert_eq!(pipeline.strategies(), &[Strategy::EventLog]);
        assert_eq!(pipeline.extract(&page).await, ExtractionResult::NotFound);
    }
}
