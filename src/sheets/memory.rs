//! メモリ上のシート

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::client::find_header;
use crate::error::SyncError;
use crate::traits::{CellUpdate, RowStore};

#[derive(Debug, Default)]
struct State {
    /// rows[0] がヘッダー行
    rows: Vec<Vec<String>>,
    /// データ範囲外のセル（A1アドレス）
    cells: HashMap<String, String>,
    writes: Vec<(usize, Vec<CellUpdate>)>,
    cell_writes: usize,
    reads: usize,
    failing_rows: HashSet<usize>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(headers: &[&str], rows: Vec<Vec<&str>>) -> Self {
        let mut all = vec![headers.iter().map(|h| h.to_string()).collect::<Vec<_>>()];
        all.extend(
            rows.into_iter()
                .map(|r| r.into_iter().map(str::to_string).collect()),
        );
        Self {
            state: Mutex::new(State {
                rows: all,
                ..Default::default()
            }),
        }
    }

    pub fn with_cell(self, address: &str, value: &str) -> Self {
        self.lock()
            .cells
            .insert(address.to_uppercase(), value.to_string());
        self
    }

    /// 指定行への書き込みを失敗させる
    pub fn fail_writes_for(self, row: usize) -> Self {
        self.lock().failing_rows.insert(row);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 行番号（1始まり）とヘッダー名でセルを取得
    pub fn cell(&self, row: usize, header: &str) -> Option<String> {
        let state = self.lock();
        let col = find_header(state.rows.first()?, header)?;
        state.rows.get(row.checked_sub(1)?)?.get(col).cloned()
    }

    pub fn out_of_band(&self, address: &str) -> Option<String> {
        self.lock().cells.get(&address.to_uppercase()).cloned()
    }

    /// 行書き込みの履歴（セル単位の書き込みは含まない）
    pub fn row_writes(&self) -> Vec<(usize, Vec<CellUpdate>)> {
        self.lock().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// 行書き込み・セル書き込みの合計
    pub fn write_count(&self) -> usize {
        let state = self.lock();
        state.writes.len() + state.cell_writes
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn headers(&self) -> Result<Vec<String>, SyncError> {
        let mut state = self.lock();
        state.reads += 1;
        Ok(state.rows.first().cloned().unwrap_or_default())
    }

    async fn read_column(&self, header: &str) -> Result<Vec<String>, SyncError> {
        let mut state = self.lock();
        state.reads += 1;
        let col = state
            .rows
            .first()
            .and_then(|h| find_header(h, header))
            .ok_or_else(|| SyncError::MissingHeader(header.to_string()))?;

        let mut values: Vec<String> = state
            .rows
            .iter()
            .map(|row| row.get(col).cloned().unwrap_or_default())
            .collect();
        // Sheets API と同じく末尾の空セルは返さない
        while values.last().is_some_and(|v| v.is_empty()) {
            values.pop();
        }
        Ok(values)
    }

    async fn write_row(&self, row: usize, cells: &[CellUpdate]) -> Result<(), SyncError> {
        let mut state = self.lock();
        if row == 0 || state.failing_rows.contains(&row) {
            return Err(SyncError::StoreWrite {
                row,
                message: "simulated write failure".to_string(),
            });
        }

        let headers = state.rows.first().cloned().unwrap_or_default();
        let columns = cells
            .iter()
            .map(|cell| {
                find_header(&headers, &cell.header)
                    .ok_or_else(|| SyncError::MissingHeader(cell.header.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // ロック中にまとめて反映する
        while state.rows.len() < row {
            state.rows.push(Vec::new());
        }
        let target = &mut state.rows[row - 1];
        for (col, cell) in columns.into_iter().zip(cells) {
            if target.len() <= col {
                target.resize(col + 1, String::new());
            }
            target[col] = cell.value.clone();
        }
        state.writes.push((row, cells.to_vec()));
        Ok(())
    }

    async fn read_cell(&self, address: &str) -> Result<Option<String>, SyncError> {
        let mut state = self.lock();
        state.reads += 1;
        Ok(state.cells.get(&address.to_uppercase()).cloned())
    }

    async fn write_cell(&self, address: &str, value: &str) -> Result<(), SyncError> {
        let mut state = self.lock();
        state.cell_writes += 1;
        state.cells.insert(address.to_uppercase(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_column_trims_trailing_empty() {
        let store = MemoryStore::new(
            &["URL", "VENDEDOR"],
            vec![vec!["https://a", ""], vec!["https://b", "X"], vec!["", ""]],
        );
        let col = store.read_column("url").await.unwrap();
        assert_eq!(col, vec!["URL", "https://a", "https://b"]);
        let sellers = store.read_column("Vendedor").await.unwrap();
        assert_eq!(sellers, vec!["VENDEDOR", "", "X"]);
    }

    #[tokio::test]
    async fn test_write_row_applies_all_cells() {
        let store = MemoryStore::new(&["URL", "VENDEDOR", "PRECIO VEI"], vec![vec!["https://a"]]);
        store
            .write_row(
                2,
                &[
                    CellUpdate::new("PRECIO VEI", "1000"),
                    CellUpdate::new("VENDEDOR", "Tienda"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.cell(2, "PRECIO VEI").as_deref(), Some("1000"));
        assert_eq!(store.cell(2, "VENDEDOR").as_deref(), Some("Tienda"));
        assert_eq!(store.row_writes().len(), 1);
    }

    #[tokio::test]
    async fn test_write_row_unknown_header_writes_nothing() {
        let store = MemoryStore::new(&["URL", "VENDEDOR"], vec![vec!["https://a", "Old"]]);
        let err = store
            .write_row(
                2,
                &[
                    CellUpdate::new("VENDEDOR", "New"),
                    CellUpdate::new("NOPE", "x"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::MissingHeader(_)));
        assert_eq!(store.cell(2, "VENDEDOR").as_deref(), Some("Old"));
    }
}
