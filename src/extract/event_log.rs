//! 戦略3: アナリティクスの dataLayer push から取得
//!
//! クライアント側のトラッキング状態なので最後の手段として使う。

use serde_json::Value;

use super::price::price_from_json;
use super::Candidate;
use crate::traits::PageHandle;

pub const EVENT_ARRAY: &str = "dataLayer";

const PRICE_KEYS: &[&str] = &["price", "productPrice", "productPriceTo", "sellingPrice"];
const IDENTITY_KEYS: &[&str] = &[
    "productId",
    "productSku",
    "skuId",
    "productReferenceId",
    "item_id",
    "id",
];
const SELLER_KEYS: &[&str] = &["sellerName", "seller"];

pub async fn extract<P: PageHandle + ?Sized>(page: &P) -> Option<Candidate> {
    latest_product_event(&page.global_array_pushes(EVENT_ARRAY).await)
}

/// 新しい push から順に、数値価格と商品IDを持つレコードを探す
pub fn latest_product_event(events: &[Value]) -> Option<Candidate> {
    events.iter().rev().find_map(|event| {
        product_records(event)
            .into_iter()
            .find_map(candidate_from_record)
    })
}

/// push 1件に含まれる商品レコード（フラット形式と ecommerce 形式）
fn product_records(event: &Value) -> Vec<&Value> {
    let mut records = vec![event];
    if let Some(ecommerce) = event.get("ecommerce") {
        for path in [&["items"][..], &["detail", "products"][..]] {
            let list = path
                .iter()
                .try_fold(ecommerce, |node, key| node.get(*key))
                .and_then(Value::as_array);
            if let Some(list) = list {
                records.extend(list.iter());
            }
        }
    }
    records
}

fn candidate_from_record(record: &Value) -> Option<Candidate> {
    let has_identity = IDENTITY_KEYS.iter().any(|key| match record.get(*key) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    });
    if !has_identity {
        return None;
    }

    let price = PRICE_KEYS
        .iter()
        .find_map(|key| record.get(*key).and_then(price_from_json))?;

    let seller = SELLER_KEYS
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string);

    Some(Candidate { price, seller })
}
