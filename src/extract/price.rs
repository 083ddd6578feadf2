//! 価格文字列の正規化
//!
//! "$ 1.299.900" / "1.299.900,50" / "29.99" / 1299900 を十進文字列へ揃える。

use std::sync::LazyLock;

use regex::Regex;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*").expect("valid regex"));

/// 正の数値として解釈できる場合のみ正規化済み文字列を返す
pub fn normalize_price(raw: &str) -> Option<String> {
    let token = NUMBER_RE.find(raw)?.as_str().trim_end_matches(['.', ',']);

    let (integer, fraction) = split_decimal(token);
    let integer: String = integer.chars().filter(char::is_ascii_digit).collect();
    let fraction = fraction.trim_end_matches('0');

    let value: f64 = if fraction.is_empty() {
        integer.parse().ok()?
    } else {
        format!("{integer}.{fraction}").parse().ok()?
    };
    if !value.is_finite() || value <= 0.0 {
        return None;
    }

    let integer = integer.trim_start_matches('0');
    let integer = if integer.is_empty() { "0" } else { integer };
    Some(if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{integer}.{fraction}")
    })
}

/// JSON値（数値または文字列）から価格を取り出す
pub fn price_from_json(value: &serde_json::Value) -> Option<String> {
    match value {
        // 数値は区切り文字の推定をしない
        serde_json::Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v.to_string()),
        serde_json::Value::String(s) => normalize_price(s),
        _ => None,
    }
}

/// 最後の区切り文字の後ろが3桁なら桁区切り、それ以外は小数点とみなす
fn split_decimal(token: &str) -> (&str, &str) {
    match token.rfind(['.', ',']) {
        Some(pos) => {
            let tail = &token[pos + 1..];
            if tail.len() == 3 {
                (token, "")
            } else {
                (&token[..pos], tail)
            }
        }
        None => (token, ""),
    }
}
