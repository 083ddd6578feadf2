//! Sheets / Drive API の型定義

use serde::{Deserialize, Serialize};

/// Drive ファイル検索結果
#[derive(Debug, Clone, Deserialize)]
pub struct DriveFileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// スプレッドシートのメタデータ（`fields=sheets.properties.title`）
#[derive(Debug, Clone, Deserialize)]
pub struct SpreadsheetMeta {
    #[serde(default)]
    pub sheets: Vec<SheetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetEntry {
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetProperties {
    pub title: String,
}

/// 値の範囲（読み込み・書き込み共通）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<String>>,
}

/// `values:batchUpdate` リクエスト
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateRequest {
    pub value_input_option: String,
    pub data: Vec<ValueRange>,
}
