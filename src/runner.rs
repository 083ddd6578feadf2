//! バッチ実行
//!
//! 営業時間ゲート → カーソル → 各URLの取得・抽出・書き込み → カーソル保存。
//! URLごとの失敗は他の行に影響しない。

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::cursor::{self, Batch, FIRST_DATA_ROW};
use crate::error::SyncError;
use crate::extract::{ExtractionPipeline, ExtractionResult};
use crate::gate::TimeWindow;
use crate::service::{ExtractRequest, ExtractService};
use crate::traits::{CellUpdate, PageFetcher, RowStore};

pub const URL_HEADER: &str = "URL";
pub const SELLER_HEADER: &str = "VENDEDOR";
pub const PRICE_HEADER: &str = "PRECIO VEI";
pub const UPDATED_HEADER: &str = "ACTUALIZADO";

pub const REQUIRED_HEADERS: [&str; 3] = [URL_HEADER, SELLER_HEADER, PRICE_HEADER];

/// 抽出できなかった場合のセンチネル
pub const NOT_AVAILABLE: &str = "NO DISPONIBLE";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// シート上の商品行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    pub index: usize,
    pub url: String,
    pub seller: Option<String>,
    pub price: Option<String>,
    pub last_updated: Option<String>,
}

/// 1行の処理結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowReport {
    pub row: usize,
    pub url: String,
    pub result: ExtractionResult,
    /// 書き込んだセル数（書き込みなし・失敗時は0）
    pub cells_written: usize,
    pub write_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub batch: Batch,
    pub reports: Vec<RowReport>,
    pub skipped_empty: usize,
}

impl RunSummary {
    fn count(&self, kind: &str) -> usize {
        self.reports.iter().filter(|r| r.result.kind() == kind).count()
    }

    pub fn found(&self) -> usize {
        self.count("found")
    }

    pub fn not_found(&self) -> usize {
        self.count("not_found")
    }

    pub fn fetch_errors(&self) -> usize {
        self.count("fetch_error")
    }

    pub fn write_errors(&self) -> usize {
        self.reports.iter().filter(|r| r.write_error.is_some()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// 営業時間外のため何もしなかった
    GateDenied,
    Completed(RunSummary),
}

/// 書き込み対象の列構成
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub has_updated: bool,
}

pub struct BatchRunner<F> {
    service: ExtractService<F>,
    batch_size: usize,
    concurrency: usize,
    seller_prefix: String,
    offset: FixedOffset,
}

impl<F> BatchRunner<F>
where
    F: PageFetcher + 'static,
{
    pub fn new(fetcher: Arc<F>, config: &SyncConfig) -> Self {
        let pipeline = ExtractionPipeline::new(&config.fallback_seller);
        Self {
            service: ExtractService::new(fetcher, pipeline, config.fetch_timeout),
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            seller_prefix: config.seller_prefix.clone(),
            offset: config.utc_offset,
        }
    }

    /// 行ごとに取得・抽出する（書き込みなし）。取得失敗は `FetchError` として返す
    pub async fn run(&self, rows: Vec<ProductRow>) -> Vec<(ProductRow, ExtractionResult)> {
        stream::iter(rows)
            .map(|row| async move {
                let result = self.extract_one(&row).await;
                (row, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn extract_one(&self, row: &ProductRow) -> ExtractionResult {
        let request = ExtractRequest::new(row.index, row.url.clone());
        match self.service.clone().oneshot(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Fetch failed for row {} ({}): {}", row.index, row.url, e);
                ExtractionResult::FetchError {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// 各行を抽出し、その行の結果を1回の書き込みで反映する
    pub async fn process<S>(&self, store: &S, rows: Vec<ProductRow>, columns: Columns) -> Vec<RowReport>
    where
        S: RowStore + ?Sized,
    {
        stream::iter(rows)
            .map(|row| async move {
                let result = self.extract_one(&row).await;
                let updates = row_updates(&row, &result, columns, &self.seller_prefix, self.now());

                let mut report = RowReport {
                    row: row.index,
                    url: row.url.clone(),
                    result,
                    cells_written: 0,
                    write_error: None,
                };
                if updates.is_empty() {
                    return report;
                }

                match store.write_row(row.index, &updates).await {
                    Ok(()) => {
                        report.cells_written = updates.len();
                        info!(
                            "Row {} updated ({}): {}",
                            row.index,
                            report.result.kind(),
                            row.url
                        );
                    }
                    Err(e) => {
                        warn!("Failed to write row {}: {}", row.index, e);
                        report.write_error = Some(e.to_string());
                    }
                }
                report
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// 1回分の同期処理（ゲート確認済みの前提）
    pub async fn sync_batch<S>(&self, store: &S) -> Result<RunSummary, SyncError>
    where
        S: RowStore + ?Sized,
    {
        let columns = preflight(store).await?;

        let urls = data_rows(store.read_column(URL_HEADER).await?);
        let total_rows = urls.len();

        let start = cursor::load_cursor(store, total_rows).await;
        let mut batch = cursor::next_batch(start, total_rows, self.batch_size);
        if batch.is_empty() && total_rows >= FIRST_DATA_ROW {
            // 末尾まで処理済み: 先頭から再開
            info!("Cursor {} is past the last row, rewinding", start);
            batch = cursor::next_batch(FIRST_DATA_ROW, total_rows, self.batch_size);
        }

        if batch.is_empty() {
            info!("No URLs found to process");
            persist_cursor(store, batch.next_cursor).await;
            return Ok(RunSummary {
                batch,
                reports: Vec::new(),
                skipped_empty: 0,
            });
        }

        let sellers = store.read_column(SELLER_HEADER).await?;
        let prices = store.read_column(PRICE_HEADER).await?;
        let updated = if columns.has_updated {
            store.read_column(UPDATED_HEADER).await?
        } else {
            Vec::new()
        };
        let sheet = SheetColumns {
            urls: &urls,
            sellers: &sellers,
            prices: &prices,
            updated: &updated,
        };

        let (mut rows, mut skipped_empty) = sheet.product_rows(&batch);
        if rows.is_empty() && batch.start != FIRST_DATA_ROW {
            // URLのない範囲: 先頭から取り直す
            info!(
                "No URLs in rows {} through {}, rewinding",
                batch.start,
                batch.end - 1
            );
            batch = cursor::next_batch(FIRST_DATA_ROW, total_rows, self.batch_size);
            (rows, skipped_empty) = sheet.product_rows(&batch);
        }

        info!(
            "Processing rows {} through {} ({} URLs)",
            batch.start,
            batch.end - 1,
            rows.len()
        );

        let mut reports = self.process(store, rows, columns).await;
        reports.sort_by_key(|r| r.row);

        // 行ごとの成否に関わらず計画した範囲で進める
        persist_cursor(store, batch.next_cursor).await;

        let summary = RunSummary {
            batch,
            reports,
            skipped_empty,
        };
        info!(
            "Processed rows {} through {}: found={}, not_found={}, fetch_errors={}, write_errors={}, skipped={}, next_cursor={}",
            batch.start,
            batch.end - 1,
            summary.found(),
            summary.not_found(),
            summary.fetch_errors(),
            summary.write_errors(),
            summary.skipped_empty,
            batch.next_cursor
        );
        Ok(summary)
    }

    /// 営業時間ゲートを確認してから同期する。拒否時はストアに一切触れない
    pub async fn run_once<S, Tz>(
        &self,
        window: &TimeWindow,
        now: &DateTime<Tz>,
        store: &S,
    ) -> Result<RunOutcome, SyncError>
    where
        S: RowStore + ?Sized,
        Tz: TimeZone,
    {
        if !window.is_allowed(now) {
            info!("Outside permitted hours; skipping execution");
            return Ok(RunOutcome::GateDenied);
        }
        self.sync_batch(store).await.map(RunOutcome::Completed)
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// URL列からデータ行だけを残す
///
/// 列全体の読み込みにはカーソルセルの行も含まれるため、その行以降を落とし
/// 末尾の空セルを詰める。戻り値の長さが最終データ行の行番号になる。
pub fn data_rows(mut column: Vec<String>) -> Vec<String> {
    column.truncate(cursor::CURSOR_ROW - 1);
    while column.last().is_some_and(|v| v.trim().is_empty()) {
        column.pop();
    }
    column
}

/// 読み込み済みの列（インデックス0が1行目）
struct SheetColumns<'a> {
    urls: &'a [String],
    sellers: &'a [String],
    prices: &'a [String],
    updated: &'a [String],
}

impl SheetColumns<'_> {
    fn cell(column: &[String], row: usize) -> Option<String> {
        column
            .get(row - 1)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// バッチ範囲の商品行と、URLが空でスキップした行数
    fn product_rows(&self, batch: &Batch) -> (Vec<ProductRow>, usize) {
        let mut rows = Vec::with_capacity(batch.len());
        let mut skipped_empty = 0;
        for index in batch.rows() {
            match Self::cell(self.urls, index) {
                Some(url) => rows.push(ProductRow {
                    index,
                    url,
                    seller: Self::cell(self.sellers, index),
                    price: Self::cell(self.prices, index),
                    last_updated: Self::cell(self.updated, index),
                }),
                None => {
                    debug!("Row {} has no URL, skipping", index);
                    skipped_empty += 1;
                }
            }
        }
        (rows, skipped_empty)
    }
}

/// 必須列の確認
pub async fn preflight<S: RowStore + ?Sized>(store: &S) -> Result<Columns, SyncError> {
    let headers = store.headers().await?;
    let has = |name: &str| crate::sheets::find_header(&headers, name).is_some();

    if let Some(missing) = REQUIRED_HEADERS.into_iter().find(|h| !has(h)) {
        error!("Required column '{}' not found in header row", missing);
        return Err(SyncError::MissingHeader(missing.to_string()));
    }
    Ok(Columns {
        has_updated: has(UPDATED_HEADER),
    })
}

async fn persist_cursor<S: RowStore + ?Sized>(store: &S, next: usize) {
    match cursor::save_cursor(store, next).await {
        Ok(()) => debug!("Cursor saved: {}", next),
        Err(e) => error!("Failed to save cursor {}: {}", next, e),
    }
}

/// 抽出結果から1行分の書き込み内容を作る
///
/// - `Found`: 価格・販売者（＋更新日時）を必ず同時に書く
/// - `NotFound`: 空セルにのみセンチネルを書く
/// - `FetchError`: 何も書かない
pub fn row_updates(
    row: &ProductRow,
    result: &ExtractionResult,
    columns: Columns,
    seller_prefix: &str,
    now: DateTime<FixedOffset>,
) -> Vec<CellUpdate> {
    match result {
        ExtractionResult::Found { price, seller } => {
            let mut updates = vec![
                CellUpdate::new(PRICE_HEADER, price.clone()),
                CellUpdate::new(SELLER_HEADER, label_seller(seller, seller_prefix)),
            ];
            if columns.has_updated {
                updates.push(CellUpdate::new(
                    UPDATED_HEADER,
                    now.format(TIMESTAMP_FORMAT).to_string(),
                ));
            }
            updates
        }
        ExtractionResult::NotFound => {
            let mut updates = Vec::new();
            if row.price.is_none() {
                updates.push(CellUpdate::new(PRICE_HEADER, NOT_AVAILABLE));
            }
            if row.seller.is_none() {
                updates.push(CellUpdate::new(SELLER_HEADER, NOT_AVAILABLE));
            }
            updates
        }
        ExtractionResult::FetchError { .. } => Vec::new(),
    }
}

/// "Vendido por: " を付ける（既に付いている場合はそのまま）
pub fn label_seller(seller: &str, prefix: &str) -> String {
    let marker = prefix.trim().trim_end_matches(':').to_lowercase();
    if marker.is_empty() || seller.to_lowercase().starts_with(&marker) {
        seller.to_string()
    } else {
        format!("{prefix}{seller}")
    }
}
