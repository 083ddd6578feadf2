use std::time::Duration;

use async_trait::async_trait;

use crate::error::SyncError;

/// 読み込み済みページ
///
/// ブラウザ実装・HTML実装どちらも同じインターフェースで抽出戦略に渡される。
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// セレクタに最初に一致した要素のテキスト
    async fn query_selector_text(&self, selector: &str) -> Option<String>;

    /// 指定MIMEタイプの `<script>` 本文
    async fn scripts_of_type(&self, mime_type: &str) -> Vec<String>;

    /// グローバル配列（`window.dataLayer` など）に push されたレコード
    async fn global_array_pushes(&self, var_name: &str) -> Vec<serde_json::Value>;

    /// リソース解放
    async fn close(&self) {}
}

/// URL からページを読み込む
#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Page: PageHandle + 'static;

    async fn load(&self, url: &str, timeout: Duration) -> Result<Self::Page, SyncError>;
}

/// 1セル分の書き込み
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub header: String,
    pub value: String,
}

impl CellUpdate {
    pub fn new(header: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            value: value.into(),
        }
    }
}

/// 表形式ストア（行番号は1始まり、1行目はヘッダー）
#[async_trait]
pub trait RowStore: Send + Sync {
    /// ヘッダー行
    async fn headers(&self) -> Result<Vec<String>, SyncError>;

    /// 列の全セル（index 0 が1行目）。ヘッダー名は大文字小文字を区別しない
    async fn read_column(&self, header: &str) -> Result<Vec<String>, SyncError>;

    /// 1行分のセルを1回の更新として書き込む
    async fn write_row(&self, row: usize, cells: &[CellUpdate]) -> Result<(), SyncError>;

    /// A1形式アドレスのセル値
    async fn read_cell(&self, address: &str) -> Result<Option<String>, SyncError>;

    async fn write_cell(&self, address: &str, value: &str) -> Result<(), SyncError>;
}
