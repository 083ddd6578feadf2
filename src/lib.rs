//! 価格同期ライブラリ
//!
//! - Éxito 商品ページから価格・販売者を抽出
//! - Google スプレッドシートの行へ書き戻す（営業時間内のみ・カーソルで分割処理）
//!
//! # 使用例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use price_sync_service::{load_config, BatchRunner, BrowserFetcher, SheetsStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let store = SheetsStore::open(&config).await?;
//!     let fetcher = Arc::new(BrowserFetcher::launch(&config).await?);
//!
//!     let runner = BatchRunner::new(Arc::clone(&fetcher), &config);
//!     let now = chrono::Utc::now();
//!     let outcome = runner.run_once(&config.time_window(), &now, &store).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! # 抽出のみ（tower Service）
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use price_sync_service::{ExtractRequest, ExtractService, ExtractionPipeline, HttpFetcher};
//! use tower::ServiceExt;
//!
//! let service = ExtractService::new(
//!     Arc::new(HttpFetcher::new()?),
//!     ExtractionPipeline::new("Éxito"),
//!     Duration::from_secs(45),
//! );
//! let result = service
//!     .oneshot(ExtractRequest::new(2, "https://www.exito.com/producto/p"))
//!     .await?;
//! ```

pub mod browser;
pub mod config;
pub mod cursor;
pub mod error;
pub mod extract;
pub mod gate;
pub mod html;
pub mod runner;
pub mod service;
pub mod sheets;
pub mod traits;

// 主要な型をリエクスポート
pub use browser::BrowserFetcher;
pub use config::{load_config, Credentials, FetchMode, SyncConfig};
pub use error::{ConfigError, SyncError};
pub use extract::{ExtractionPipeline, ExtractionResult};
pub use gate::TimeWindow;
pub use html::HttpFetcher;
pub use runner::{BatchRunner, ProductRow, RunOutcome, RunSummary};
pub use service::{ExtractRequest, ExtractService};
pub use sheets::SheetsStore;
pub use traits::{CellUpdate, PageFetcher, PageHandle, RowStore};
