//! 価格同期バッチ
//!
//! 実行方法:
//! ```
//! cargo run --bin price-sync
//! ```
//!
//! 営業時間外は何もせず正常終了する。設定・認証・シート構成の不備は非0で終了。

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use price_sync_service::{
    load_config, BatchRunner, BrowserFetcher, FetchMode, HttpFetcher, PageFetcher, RowStore,
    RunOutcome, SheetsStore, SyncConfig,
};

#[tokio::main]
async fn main() -> ExitCode {
    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;

    // ストアに触れる前にゲートを確認
    let window = config.time_window();
    let now = Utc::now();
    if !window.is_allowed(&now) {
        info!(
            "Outside permitted hours ({}); skipping execution",
            now.with_timezone(&window.offset()).format("%Y-%m-%d %H:%M")
        );
        return Ok(());
    }

    let store = SheetsStore::open(&config)
        .await
        .context("failed to open spreadsheet")?;

    match config.fetch_mode {
        FetchMode::Browser => {
            let fetcher = Arc::new(
                BrowserFetcher::launch(&config)
                    .await
                    .context("failed to launch browser")?,
            );
            let result = sync(Arc::clone(&fetcher), &config, &store).await;

            // 結果に関わらずブラウザを終了
            match Arc::try_unwrap(fetcher) {
                Ok(fetcher) => fetcher.close().await?,
                Err(_) => error!("Browser still in use; leaving it to drop"),
            }
            result
        }
        FetchMode::Http => {
            let fetcher = Arc::new(HttpFetcher::new()?);
            sync(fetcher, &config, &store).await
        }
    }
}

async fn sync<F, S>(fetcher: Arc<F>, config: &SyncConfig, store: &S) -> anyhow::Result<()>
where
    F: PageFetcher + 'static,
    S: RowStore,
{
    let runner = BatchRunner::new(fetcher, config);
    match runner.run_once(&config.time_window(), &Utc::now(), store).await {
        Ok(RunOutcome::GateDenied) => {
            info!("Permitted hours ended before the run started");
            Ok(())
        }
        Ok(RunOutcome::Completed(summary)) => {
            info!(
                "Run complete: {} rows, {} found, {} not found, {} fetch errors",
                summary.reports.len(),
                summary.found(),
                summary.not_found(),
                summary.fetch_errors()
            );
            Ok(())
        }
        Err(e) if e.is_fatal() => Err(e).context("sheet is not usable"),
        Err(e) => Err(e.into()),
    }
}
