//! 戦略2: schema.org JSON-LD の Product/offers から取得

use serde_json::Value;
use tracing::debug;

use super::price::price_from_json;
use super::Candidate;
use crate::traits::PageHandle;

pub const JSONLD_MIME: &str = "application/ld+json";

pub async fn extract<P: PageHandle + ?Sized>(page: &P) -> Option<Candidate> {
    page.scripts_of_type(JSONLD_MIME)
        .await
        .iter()
        .find_map(|raw| product_from_jsonld(raw))
}

/// JSON-LD 1ブロックから最初の有効な Product を探す
pub fn product_from_jsonld(raw: &str) -> Option<Candidate> {
    let value: Value = match serde_json::from_str(raw.trim()) {
        Ok(v) => v,
        Err(e) => {
            debug!("Skipping malformed JSON-LD block: {}", e);
            return None;
        }
    };

    // トップレベルの配列と @graph を展開
    let mut nodes: Vec<&Value> = match &value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let graph: Vec<&Value> = nodes
        .iter()
        .copied()
        .filter_map(|n| n.get("@graph").and_then(Value::as_array))
        .flatten()
        .collect();
    nodes.extend(graph);

    let found = nodes
        .into_iter()
        .filter(|n| is_product(n))
        .find_map(offer_candidate);
    found
}

fn is_product(node: &Value) -> bool {
    match node.get("@type") {
        Some(Value::String(t)) => t == "Product",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Product")),
        _ => false,
    }
}

fn offer_candidate(product: &Value) -> Option<Candidate> {
    let offers = match product.get("offers")? {
        Value::Array(list) => list.first()?,
        other => other,
    };

    // AggregateOffer は lowPrice/highPrice、内側の offers 配列を持つこともある
    let nested = offers
        .get("offers")
        .and_then(Value::as_array)
        .and_then(|list| list.first());

    let price = ["price", "lowPrice", "highPrice"]
        .iter()
        .find_map(|key| offers.get(*key).and_then(price_from_json))
        .or_else(|| nested.and_then(|n| n.get("price")).and_then(price_from_json))?;

    let seller = offers
        .get("seller")
        .or_else(|| nested.and_then(|n| n.get("seller")))
        .and_then(seller_name);

    Some(Candidate { price, seller })
}

fn seller_name(seller: &Value) -> Option<String> {
    let name = match seller {
        Value::String(s) => s.as_str(),
        other => other.get("name").and_then(Value::as_str)?,
    };
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}
