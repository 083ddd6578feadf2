//! 戦略1: 表示要素から価格・販売者を取得

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::price::normalize_price;
use super::Candidate;
use crate::traits::PageHandle;

/// VTEX (Éxito) の描画済みDOMで価格を含む要素
pub const PRICE_SELECTORS: &[&str] = &[
    "[class*='sellingPriceValue']",
    "[class*='currencyContainer']",
    "span[class*='price']",
    "div[class*='price'] span",
    "span[data-testid*='price']",
];

pub const SELLER_SELECTORS: &[&str] = &[
    "[class*='sellerName']",
    "[class*='seller-name']",
    "[class*='seller'] a",
    "[class*='seller']",
];

static SOLD_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)vendido\s+por[:\s]*([^\n\r]+)").expect("valid regex"));

pub async fn extract<P: PageHandle + ?Sized>(page: &P) -> Option<Candidate> {
    let mut price = None;
    for selector in PRICE_SELECTORS {
        if let Some(text) = page.query_selector_text(selector).await {
            if let Some(p) = normalize_price(&text) {
                debug!("Visible price via {}: {:?} -> {}", selector, text, p);
                price = Some(p);
                break;
            }
        }
    }
    let price = price?;

    let mut seller = None;
    for selector in SELLER_SELECTORS {
        if let Some(text) = page.query_selector_text(selector).await {
            if let Some(name) = seller_from_text(&text) {
                seller = Some(name);
                break;
            }
        }
    }

    Some(Candidate { price, seller })
}

/// "Vendido por: Tienda X" から販売者名を抜き出す。ラベルがなければテキスト全体
pub fn seller_from_text(text: &str) -> Option<String> {
    let name = match SOLD_BY_RE.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => text.lines().next().unwrap_or_default(),
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}
