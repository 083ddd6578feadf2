//! スプレッドシート行ストア
//!
//! - `SheetsStore`: Google Sheets API v4
//! - `MemoryStore`: メモリ上のシート（テスト用）

mod auth;
mod client;
#[cfg(test)]
mod memory;
mod types;

pub use client::{column_letter, find_header, SheetsStore};
#[cfg(test)]
pub(crate) use memory::MemoryStore;
