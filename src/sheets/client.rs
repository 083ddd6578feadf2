//! Google Sheets を行ストアとして使うクライアント
//!
//! 認証はサービスアカウント鍵または発行済みトークン。行ごとの書き込みは
//! `values:batchUpdate` 1リクエストにまとめる。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::auth::Authorizer;
use super::types::{BatchUpdateRequest, DriveFileList, SpreadsheetMeta, ValueRange};
use crate::config::{Credentials, SyncConfig};
use crate::cursor::CURSOR_ROW;
use crate::error::{ConfigError, SyncError};
use crate::traits::{CellUpdate, RowStore};

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct SheetsStore {
    client: Client,
    auth: Authorizer,
    sheets_base: Url,
    spreadsheet_id: String,
    tab: String,
    headers: Vec<String>,
}

impl SheetsStore {
    /// 設定からスプレッドシート・タブを開く
    pub async fn open(config: &SyncConfig) -> Result<Self, SyncError> {
        Self::open_sheet(
            &config.credentials,
            &config.sheets_api_url,
            &config.drive_api_url,
            &config.spreadsheet_name,
            &config.sheet_name,
        )
        .await
    }

    /// 名前でスプレッドシートを探し、タブの存在とヘッダー行を確認する
    pub async fn open_sheet(
        credentials: &Credentials,
        sheets_api_url: &str,
        drive_api_url: &str,
        spreadsheet_name: &str,
        tab_name: &str,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let sheets_base = parse_base(sheets_api_url)?;
        let drive_base = parse_base(drive_api_url)?;
        let auth = Authorizer::from_credentials(credentials)?;
        let token = auth.bearer().await?;

        info!("Opening spreadsheet '{}' / tab '{}'", spreadsheet_name, tab_name);

        // Drive でファイルIDを解決
        let mut files_url = join(&drive_base, &["files"]);
        files_url
            .query_pairs_mut()
            .append_pair(
                "q",
                &format!(
                    "name = '{}' and mimeType = '{}' and trashed = false",
                    spreadsheet_name.replace('\'', "\\'"),
                    SPREADSHEET_MIME
                ),
            )
            .append_pair("fields", "files(id,name)");
        let files: DriveFileList =
            get_json(client.get(files_url).bearer_auth(&token), spreadsheet_name).await?;
        let spreadsheet_id = files
            .files
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| SyncError::SheetNotFound(spreadsheet_name.to_string()))?;
        debug!("Resolved spreadsheet id {}", spreadsheet_id);

        // タブの存在確認
        let mut meta_url = join(&sheets_base, &["spreadsheets", &spreadsheet_id]);
        meta_url
            .query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let meta: SpreadsheetMeta =
            get_json(client.get(meta_url).bearer_auth(&token), spreadsheet_name).await?;
        if !meta.sheets.iter().any(|s| s.properties.title == tab_name) {
            return Err(SyncError::SheetNotFound(format!(
                "{spreadsheet_name} / {tab_name}"
            )));
        }

        let mut store = Self {
            client,
            auth,
            sheets_base,
            spreadsheet_id,
            tab: tab_name.to_string(),
            headers: Vec::new(),
        };
        store.headers = store
            .get_range("1:1")
            .await?
            .values
            .into_iter()
            .next()
            .unwrap_or_default();
        info!("Sheet opened, headers: {:?}", store.headers);

        Ok(store)
    }

    fn a1(&self, range: &str) -> String {
        format!("'{}'!{}", self.tab.replace('\'', "''"), range)
    }

    fn column_letter_for(&self, header: &str) -> Result<String, SyncError> {
        find_header(&self.headers, header)
            .map(|idx| column_letter(idx + 1))
            .ok_or_else(|| SyncError::MissingHeader(header.to_string()))
    }

    fn values_url(&self, range: &str) -> Url {
        join(
            &self.sheets_base,
            &["spreadsheets", &self.spreadsheet_id, "values", &self.a1(range)],
        )
    }

    async fn get_range(&self, range: &str) -> Result<ValueRange, SyncError> {
        let url = self.values_url(range);
        let token = self.auth.bearer().await?;
        get_json(self.client.get(url).bearer_auth(token), &self.tab).await
    }
}

#[async_trait]
impl RowStore for SheetsStore {
    async fn headers(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.headers.clone())
    }

    async fn read_column(&self, header: &str) -> Result<Vec<String>, SyncError> {
        let letter = self.column_letter_for(header)?;
        // カーソルセルの行は読まない
        let last = CURSOR_ROW - 1;
        let mut url = self.values_url(&format!("{letter}1:{letter}{last}"));
        url.query_pairs_mut().append_pair("majorDimension", "COLUMNS");
        let token = self.auth.bearer().await?;
        let range: ValueRange =
            get_json(self.client.get(url).bearer_auth(token), &self.tab).await?;
        Ok(range.values.into_iter().next().unwrap_or_default())
    }

    async fn write_row(&self, row: usize, cells: &[CellUpdate]) -> Result<(), SyncError> {
        if cells.is_empty() {
            return Ok(());
        }
        let data = cells
            .iter()
            .map(|cell| -> Result<ValueRange, SyncError> {
                let letter = self.column_letter_for(&cell.header)?;
                Ok(ValueRange {
                    range: Some(self.a1(&format!("{letter}{row}"))),
                    values: vec![vec![cell.value.clone()]],
                })
            })
            .collect::<Result<Vec<_>, SyncError>>()?;

        let url = join(
            &self.sheets_base,
            &["spreadsheets", &self.spreadsheet_id, "values:batchUpdate"],
        );
        let token = self.auth.bearer().await?;
        let body = BatchUpdateRequest {
            value_input_option: "USER_ENTERED".to_string(),
            data,
        };
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::StoreWrite {
                row,
                message: e.to_string(),
            })?;
        check_status(response, &self.tab)
            .await
            .map_err(|e| SyncError::StoreWrite {
                row,
                message: e.to_string(),
            })?;
        debug!("Wrote {} cells to row {}", cells.len(), row);
        Ok(())
    }

    async fn read_cell(&self, address: &str) -> Result<Option<String>, SyncError> {
        let range = self.get_range(address).await?;
        Ok(range
            .values
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next()))
    }

    async fn write_cell(&self, address: &str, value: &str) -> Result<(), SyncError> {
        let mut url = self.values_url(address);
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = ValueRange {
            range: Some(self.a1(address)),
            values: vec![vec![value.to_string()]],
        };
        let token = self.auth.bearer().await?;
        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        check_status(response, &self.tab).await?;
        Ok(())
    }
}

/// ヘッダー名の位置（前後空白・大文字小文字を無視）
pub fn find_header(headers: &[String], name: &str) -> Option<usize> {
    let wanted = name.trim().to_uppercase();
    headers.iter().position(|h| h.trim().to_uppercase() == wanted)
}

/// 1始まりの列番号をA1形式の列文字に変換（1 -> A, 27 -> AA）
pub fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn parse_base(raw: &str) -> Result<Url, SyncError> {
    Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| {
            SyncError::Config(ConfigError::InvalidEnvVar {
                var: "SHEETS_API_URL/DRIVE_API_URL".to_string(),
                reason: format!("'{raw}': {e}"),
            })
        })
}

fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

async fn check_status(response: Response, context: &str) -> Result<Response, SyncError> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(SyncError::Auth(format!("{context}: HTTP {status}")))
        }
        StatusCode::NOT_FOUND => Err(SyncError::SheetNotFound(context.to_string())),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(SyncError::Store(format!("{context}: HTTP {status}: {body}")))
        }
    }
}

async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    context: &str,
) -> Result<T, SyncError> {
    let response = check_status(request.send().await?, context).await?;
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const TAB: &str = "Hoja";

    fn test_credentials() -> Credentials {
        Credentials::AccessToken("test-token".into())
    }

    /// Drive検索・メタデータ・ヘッダー行をモックする
    async fn mock_sheet(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/drive/files"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"files": [{"id": "abc", "name": "Precios"}]})),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/abc"))
            .and(query_param("fields", "sheets.properties.title"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sheets": [
                    {"properties": {"title": "Resumen"}},
                    {"properties": {"title": TAB}}
                ]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/spreadsheets/abc/values/.+!1:1$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Hoja!A1:D1",
                "values": [["URL", "VENDEDOR", "PRECIO VEI", "ACTUALIZADO"]]
            })))
            .mount(server)
            .await;
    }

    async fn open(server: &MockServer) -> Result<SheetsStore, SyncError> {
        SheetsStore::open_sheet(
            &test_credentials(),
            &server.uri(),
            &format!("{}/drive", server.uri()),
            "Precios",
            TAB,
        )
        .await
    }

    #[tokio::test]
    async fn test_open_reads_headers() {
        let server = MockServer::start().await;
        mock_sheet(&server).await;

        let store = open(&server).await.unwrap();
        assert_eq!(
            store.headers().await.unwrap(),
            vec!["URL", "VENDEDOR", "PRECIO VEI", "ACTUALIZADO"]
        );
    }

    #[tokio::test]
    async fn test_read_column_by_header() {
        let server = MockServer::start().await;
        mock_sheet(&server).await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/spreadsheets/abc/values/.+!C1:C99999$"))
            .and(query_param("majorDimension", "COLUMNS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [["PRECIO VEI", "", "45900"]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = open(&server).await.unwrap();
        let prices = store.read_column("precio vei").await.unwrap();
        assert_eq!(prices, vec!["PRECIO VEI", "", "45900"]);

        let err = store.read_column("SKU").await.unwrap_err();
        assert!(matches!(err, SyncError::MissingHeader(_)));
    }

    #[tokio::test]
    async fn test_write_row_single_batch_update() {
        let server = MockServer::start().await;
        mock_sheet(&server).await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets/abc/values:batchUpdate"))
            .and(body_partial_json(json!({
                "valueInputOption": "USER_ENTERED",
                "data": [
                    {"range": "'Hoja'!C7", "values": [["1299900"]]},
                    {"range": "'Hoja'!B7", "values": [["Vendido por: Tienda"]]}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"totalUpdatedCells": 2})))
            .expect(1)
            .mount(&server)
            .await;

        let store = open(&server).await.unwrap();
        store
            .write_row(
                7,
                &[
                    CellUpdate::new("PRECIO VEI", "1299900"),
                    CellUpdate::new("VENDEDOR", "Vendido por: Tienda"),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_row_failure_is_row_scoped() {
        let server = MockServer::start().await;
        mock_sheet(&server).await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets/abc/values:batchUpdate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
            .mount(&server)
            .await;

        let store = open(&server).await.unwrap();
        let err = store
            .write_row(3, &[CellUpdate::new("PRECIO VEI", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::StoreWrite { row: 3, .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_cursor_cell_round_trip() {
        let server = MockServer::start().await;
        mock_sheet(&server).await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/spreadsheets/abc/values/.+!A100000$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"range": "Hoja!A100000"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/spreadsheets/abc/values/.+!A100000$"))
            .and(query_param("valueInputOption", "RAW"))
            .and(body_partial_json(json!({"values": [["22"]]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let store = open(&server).await.unwrap();
        assert_eq!(store.read_cell("A100000").await.unwrap(), None);
        store.write_cell("A100000", "22").await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/files"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = open(&server).await.err().unwrap();
        assert!(matches!(err, SyncError::Auth(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_unknown_spreadsheet_or_tab() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
            .mount(&server)
            .await;
        let err = open(&server).await.err().unwrap();
        assert!(matches!(err, SyncError::SheetNotFound(_)));

        let server = MockServer::start().await;
        mock_sheet(&server).await;
        let err = SheetsStore::open_sheet(
            &test_credentials(),
            &server.uri(),
            &format!("{}/drive", server.uri()),
            "Precios",
            "EXITO PRODUCTOS GPT",
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, SyncError::SheetNotFound(ref name) if name.contains("EXITO")));
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_find_header_case_insensitive() {
        let headers: Vec<String> = ["Producto", " url ", "Vendedor", "Precio VEI"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(find_header(&headers, "URL"), Some(1));
        assert_eq!(find_header(&headers, "VENDEDOR"), Some(2));
        assert_eq!(find_header(&headers, "PRECIO VEI"), Some(3));
        assert_eq!(find_header(&headers, "ACTUALIZADO"), None);
    }
}
