//! バッチカーソル
//!
//! シート外のセンチネルセルに次回開始行を保持し、末尾を超えたら2行目へ巻き戻す。

use tracing::{debug, warn};

use crate::error::SyncError;
use crate::traits::RowStore;

/// カーソル保存先セル（データ範囲外）
pub const CURSOR_CELL: &str = "A100000";

/// カーソルセルの行。データ行はこれより上に限る
pub const CURSOR_ROW: usize = 100_000;

/// 1行目はヘッダー
pub const FIRST_DATA_ROW: usize = 2;

/// 今回処理する行範囲 `[start, end)` と次回カーソル
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub start: usize,
    pub end: usize,
    pub next_cursor: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// 次のバッチ範囲を計算する
///
/// `total_rows` は最終行の行番号（ヘッダー含む）。
pub fn next_batch(cursor: usize, total_rows: usize, batch_size: usize) -> Batch {
    if total_rows < FIRST_DATA_ROW {
        return Batch {
            start: FIRST_DATA_ROW,
            end: FIRST_DATA_ROW,
            next_cursor: FIRST_DATA_ROW,
        };
    }

    let start = cursor.clamp(FIRST_DATA_ROW, total_rows + 1);
    let end = start.saturating_add(batch_size).min(total_rows + 1);
    let next_cursor = if end <= total_rows { end } else { FIRST_DATA_ROW };

    Batch {
        start,
        end,
        next_cursor,
    }
}

/// 保存値を解釈する。不正値・範囲外は2行目として扱う
pub fn resolve_cursor(raw: Option<&str>, total_rows: usize) -> usize {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return FIRST_DATA_ROW;
    };

    match raw.parse::<i64>() {
        Ok(value) if value >= FIRST_DATA_ROW as i64 && value <= total_rows as i64 + 1 => {
            value as usize
        }
        Ok(value) => {
            warn!(
                "Cursor {} outside [{}, {}], restarting at row {}",
                value,
                FIRST_DATA_ROW,
                total_rows + 1,
                FIRST_DATA_ROW
            );
            FIRST_DATA_ROW
        }
        Err(_) => {
            warn!("Cursor cell holds '{}', restarting at row {}", raw, FIRST_DATA_ROW);
            FIRST_DATA_ROW
        }
    }
}

/// ストアからカーソルを読み込む。読み取り失敗も2行目として扱う
pub async fn load_cursor<S: RowStore + ?Sized>(store: &S, total_rows: usize) -> usize {
    match store.read_cell(CURSOR_CELL).await {
        Ok(raw) => {
            let cursor = resolve_cursor(raw.as_deref(), total_rows);
            debug!("Loaded cursor {} (raw={:?})", cursor, raw);
            cursor
        }
        Err(e) => {
            warn!("Failed to read cursor cell {}: {}", CURSOR_CELL, e);
            FIRST_DATA_ROW
        }
    }
}

pub async fn save_cursor<S: RowStore + ?Sized>(store: &S, cursor: usize) -> Result<(), SyncError> {
    store.write_cell(CURSOR_CELL, &cursor.to_string()).await
}
