use thiserror::Error;

/// 設定読み込みエラー（起動前に検出される致命的エラー）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("環境変数が設定されていません: {0}")]
    MissingEnvVar(String),

    #[error("環境変数の値が不正です: {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("設定エラー: {0}")]
    Config(#[from] ConfigError),

    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("認証エラー: {0}")]
    Auth(String),

    #[error("シートが見つかりません: {0}")]
    SheetNotFound(String),

    #[error("必須列が見つかりません: {0}")]
    MissingHeader(String),

    #[error("ストア書き込みエラー (row {row}): {message}")]
    StoreWrite { row: usize, message: String },

    #[error("ストアエラー: {0}")]
    Store(String),
}

impl SyncError {
    /// 起動前チェックで失敗した場合など、実行全体を中断すべきエラーか
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_)
                | SyncError::BrowserInit(_)
                | SyncError::Auth(_)
                | SyncError::SheetNotFound(_)
                | SyncError::MissingHeader(_)
        )
    }
}
