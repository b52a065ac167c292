// File: grabbot-common/src/models/config.rs

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::error::Error;

pub const DEFAULT_CLAIM_ENDPOINT: &str =
    "https://www.binance.com/bapi/pay/v1/private/binance-pay/gift-box/code/grabV2";

/// Telegram's own service account; its messages are never user content.
pub const TELEGRAM_SERVICE_SENDER: i64 = 777000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub claim: ClaimConfig,
    pub telegram: TelegramConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    pub endpoint: String,
    /// Session cookies, csrf token, device fingerprint... sent as-is.
    pub headers: BTreeMap<String, String>,
    /// 0 = unlimited.
    pub max_hour_requests: u32,
    pub request_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub storage_path: PathBuf,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CLAIM_ENDPOINT.to_string(),
            headers: default_headers(),
            max_hour_requests: 100,
            request_delay_secs: 3,
            request_timeout_secs: 30,
            storage_path: default_storage_path(),
        }
    }
}

// Header values can hold cookies, so they are never printed.
impl fmt::Debug for ClaimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimConfig")
            .field("endpoint", &self.endpoint)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("max_hour_requests", &self.max_hour_requests)
            .field("request_delay_secs", &self.request_delay_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("storage_path", &self.storage_path)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// 0 = no admin; notifications are only logged.
    pub admin_chat_id: i64,
    /// Empty = every chat the bot can see.
    pub allowed_chats: Vec<i64>,
    pub ignored_senders: Vec<i64>,
    pub poll_timeout_secs: u64,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            admin_chat_id: 0,
            allowed_chats: Vec::new(),
            ignored_senders: vec![TELEGRAM_SERVICE_SENDER],
            poll_timeout_secs: 30,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &mask_secret(&self.bot_token))
            .field("admin_chat_id", &self.admin_chat_id)
            .field("allowed_chats", &self.allowed_chats)
            .field("ignored_senders", &self.ignored_senders)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        let cfg: Config = serde_json::from_str(s)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let url = Url::parse(&self.claim.endpoint)?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(Error::Config(format!(
                "claim endpoint must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.claim.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be > 0".into()));
        }
        if self.claim.storage_path.as_os_str().is_empty() {
            return Err(Error::Config("storage_path must not be empty".into()));
        }
        Ok(())
    }
}

/// `"1234567890:AAH...xyz"` => `"**********...xyz"`
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return "<not set>".to_string();
    }
    let tail: String = secret.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("{}{}", "*".repeat(10), tail)
}

fn default_storage_path() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join("grabbot").join("claimed_codes.json"),
        None => PathBuf::from("claimed_codes.json"),
    }
}

fn default_headers() -> BTreeMap<String, String> {
    let mut h = BTreeMap::new();
    h.insert("clienttype".to_string(), "web".to_string());
    h.insert("Accept".to_string(), "*/*".to_string());
    h.insert("Origin".to_string(), "https://www.binance.com".to_string());
    h.insert(
        "Referer".to_string(),
        "https://www.binance.com/en/my/wallet/account/payment/cryptobox".to_string(),
    );
    h
}
