//! Sheets / Drive API 用のBearerトークン

use gcp_auth::{CustomServiceAccount, TokenProvider};
use tracing::debug;

use crate::config::Credentials;
use crate::error::{ConfigError, SyncError};

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.readonly",
];

pub(crate) enum Authorizer {
    Static(String),
    /// 期限切れ前のトークンは gcp_auth 側でキャッシュされる
    ServiceAccount(CustomServiceAccount),
}

impl Authorizer {
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, SyncError> {
        match credentials {
            Credentials::AccessToken(token) => Ok(Self::Static(token.clone())),
            Credentials::ServiceAccountKey(json) => CustomServiceAccount::from_json(json)
                .map(Self::ServiceAccount)
                .map_err(|e| {
                    SyncError::Config(ConfigError::InvalidEnvVar {
                        var: "GOOGLE_CREDENTIALS_JSON".to_string(),
                        reason: e.to_string(),
                    })
                }),
        }
    }

    pub async fn bearer(&self) -> Result<String, SyncError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::ServiceAccount(account) => {
                let token = account
                    .token(SCOPES)
                    .await
                    .map_err(|e| SyncError::Auth(format!("token request failed: {e}")))?;
                debug!("Service account token ready");
                Ok(token.as_str().to_string())
            }
        }
    }
}
