use std::env::VarError;
use std::fmt;
use std::time::Duration;

use chrono::{FixedOffset, Weekday};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::gate::TimeWindow;

pub const DEFAULT_SHEET_NAME: &str = "EXITO PRODUCTOS GPT";
pub const DEFAULT_SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";

/// ページ取得方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// ヘッドレスブラウザでレンダリング
    Browser,
    /// HTTP取得 + HTML解析（ブラウザなし）
    Http,
}

/// Google API の認証情報
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// 発行済みのアクセストークン（更新しない）
    AccessToken(String),
    /// サービスアカウント鍵のJSON。トークンは実行中に発行・更新する
    ServiceAccountKey(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::AccessToken(_) => f.write_str("AccessToken(..)"),
            Credentials::ServiceAccountKey(_) => f.write_str("ServiceAccountKey(..)"),
        }
    }
}

/// 起動時に確認するサービスアカウント鍵の項目
#[derive(Deserialize)]
struct ServiceAccountFields {
    #[serde(rename = "type")]
    key_type: String,
    #[serde(default)]
    client_email: String,
    #[serde(default)]
    private_key: String,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub credentials: Credentials,
    pub spreadsheet_name: String,
    pub sheet_name: String,
    pub batch_size: usize,
    pub open_hour: u32,
    pub close_hour: u32,
    pub allowed_weekdays: Vec<Weekday>,
    pub utc_offset: FixedOffset,
    pub fetch_timeout: Duration,
    pub concurrency: usize,
    pub fetch_mode: FetchMode,
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub fallback_seller: String,
    pub seller_prefix: String,
    pub sheets_api_url: String,
    pub drive_api_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::AccessToken(String::new()),
            spreadsheet_name: String::new(),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            batch_size: 20,
            open_hour: 8,
            close_hour: 18,
            allowed_weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
            ],
            // America/Bogota (DSTなし)
            utc_offset: FixedOffset::west_opt(5 * 3600).expect("-05:00 is a valid offset"),
            fetch_timeout: Duration::from_millis(45_000),
            concurrency: 2,
            fetch_mode: FetchMode::Browser,
            headless: true,
            chrome_path: None,
            fallback_seller: "Éxito".to_string(),
            seller_prefix: "Vendido por: ".to_string(),
            sheets_api_url: DEFAULT_SHEETS_API_URL.to_string(),
            drive_api_url: DEFAULT_DRIVE_API_URL.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn new(access_token: impl Into<String>, spreadsheet_name: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::AccessToken(access_token.into()),
            spreadsheet_name: spreadsheet_name.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_fallback_seller(mut self, seller: impl Into<String>) -> Self {
        self.fallback_seller = seller.into();
        self
    }

    /// 営業時間ゲートを構築
    pub fn time_window(&self) -> TimeWindow {
        TimeWindow::new(
            self.open_hour,
            self.close_hour,
            self.allowed_weekdays.clone(),
            self.utc_offset,
        )
    }
}

/// `.env` を読み込んでから環境変数で設定を構築する
pub fn load_config() -> Result<SyncConfig, ConfigError> {
    dotenvy::dotenv().ok();
    build_config(|key| std::env::var(key))
}

/// 任意の lookup 関数から設定を構築（テストでは HashMap を渡す）
pub fn build_config<F>(lookup: F) -> Result<SyncConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let defaults = SyncConfig::default();

    let require = |var: &str| -> Result<String, ConfigError> {
        match lookup(var) {
            Ok(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ConfigError::MissingEnvVar(var.to_string())),
        }
    };
    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };
    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };
    let parse_num = |var: &str, default: u64| -> Result<u64, ConfigError> {
        match optional(var) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| invalid(var, e.to_string())),
            None => Ok(default),
        }
    };

    // GOOGLE_ACCESS_TOKEN があれば鍵より優先
    let credentials = match optional("GOOGLE_ACCESS_TOKEN") {
        Some(token) => Credentials::AccessToken(token.trim().to_string()),
        None => {
            let key = require("GOOGLE_CREDENTIALS_JSON")?;
            check_service_account_key(&key)
                .map_err(|r| invalid("GOOGLE_CREDENTIALS_JSON", r))?;
            Credentials::ServiceAccountKey(key)
        }
    };
    let spreadsheet_name = require("SPREADSHEET_NAME")?;
    let sheet_name = optional("SHEET_NAME").unwrap_or(defaults.sheet_name);

    let batch_size = parse_num("BATCH_SIZE", defaults.batch_size as u64)? as usize;
    if batch_size == 0 {
        return Err(invalid("BATCH_SIZE", "must be at least 1".into()));
    }
    let concurrency = parse_num("CONCURRENCY", defaults.concurrency as u64)? as usize;
    if concurrency == 0 {
        return Err(invalid("CONCURRENCY", "must be at least 1".into()));
    }

    let open_hour = parse_num("OPEN_HOUR", u64::from(defaults.open_hour))? as u32;
    let close_hour = parse_num("CLOSE_HOUR", u64::from(defaults.close_hour))? as u32;
    if close_hour > 24 || open_hour >= close_hour {
        return Err(invalid(
            "CLOSE_HOUR",
            format!("window [{open_hour}, {close_hour}) is empty or out of range"),
        ));
    }

    let allowed_weekdays = match optional("ALLOWED_WEEKDAYS") {
        Some(raw) => parse_weekdays(&raw).map_err(|r| invalid("ALLOWED_WEEKDAYS", r))?,
        None => defaults.allowed_weekdays,
    };

    let utc_offset = match optional("UTC_OFFSET") {
        Some(raw) => parse_utc_offset(&raw).map_err(|r| invalid("UTC_OFFSET", r))?,
        None => defaults.utc_offset,
    };

    let fetch_timeout = Duration::from_millis(parse_num(
        "FETCH_TIMEOUT_MS",
        defaults.fetch_timeout.as_millis() as u64,
    )?);

    let fetch_mode = match optional("FETCH_MODE").as_deref().map(str::trim) {
        None | Some("browser") => FetchMode::Browser,
        Some("http") => FetchMode::Http,
        Some(other) => return Err(invalid("FETCH_MODE", format!("unknown mode '{other}'"))),
    };

    let headless = match optional("HEADLESS").as_deref().map(str::trim) {
        None => defaults.headless,
        Some("1" | "true" | "yes") => true,
        Some("0" | "false" | "no") => false,
        Some(other) => return Err(invalid("HEADLESS", format!("not a boolean: '{other}'"))),
    };

    Ok(SyncConfig {
        credentials,
        spreadsheet_name,
        sheet_name,
        batch_size,
        open_hour,
        close_hour,
        allowed_weekdays,
        utc_offset,
        fetch_timeout,
        concurrency,
        fetch_mode,
        headless,
        chrome_path: optional("CHROME_PATH").or_else(|| optional("CHROMIUM_PATH")),
        fallback_seller: optional("FALLBACK_SELLER").unwrap_or(defaults.fallback_seller),
        seller_prefix: lookup("SELLER_PREFIX").unwrap_or(defaults.seller_prefix),
        sheets_api_url: optional("SHEETS_API_URL").unwrap_or(defaults.sheets_api_url),
        drive_api_url: optional("DRIVE_API_URL").unwrap_or(defaults.drive_api_url),
    })
}

/// サービスアカウント鍵として最低限の項目が揃っているか
fn check_service_account_key(raw: &str) -> Result<(), String> {
    let key: ServiceAccountFields =
        serde_json::from_str(raw).map_err(|e| format!("not a JSON key: {e}"))?;
    if key.key_type != "service_account" {
        return Err(format!("type is '{}', expected 'service_account'", key.key_type));
    }
    if key.client_email.trim().is_empty() {
        return Err("client_email is empty".into());
    }
    if !key.private_key.contains("PRIVATE KEY") {
        return Err("private_key is not a PEM key".into());
    }
    Ok(())
}

/// "Mon,Tue,Sat" 形式の曜日リストを解析
fn parse_weekdays(raw: &str) -> Result<Vec<Weekday>, String> {
    let days = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Weekday>()
                .map_err(|_| format!("unknown weekday '{s}'"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if days.is_empty() {
        return Err("no weekdays given".into());
    }
    Ok(days)
}

/// "-05:00" / "+09:00" / "-5" 形式のUTCオフセットを解析
fn parse_utc_offset(raw: &str) -> Result<FixedOffset, String> {
    let raw = raw.trim();
    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'-') => (-1, &raw[1..]),
        Some(b'+') => (1, &raw[1..]),
        _ => (1, raw),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours
        .parse()
        .map_err(|_| format!("invalid offset hours in '{raw}'"))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| format!("invalid offset minutes in '{raw}'"))?;
    if minutes >= 60 {
        return Err(format!("invalid offset minutes in '{raw}'"));
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("offset out of range: '{raw}'"))
}
