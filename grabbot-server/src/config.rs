// File: grabbot-server/src/config.rs

use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use tracing::{info, warn};

use grabbot_common::models::Config;

pub const DEFAULT_CONFIG_FILE: &str = "grabbot.json";

pub const ENV_BOT_TOKEN: &str = "GRABBOT_BOT_TOKEN";
pub const ENV_ADMIN_CHAT_ID: &str = "GRABBOT_ADMIN_CHAT_ID";
pub const ENV_STORAGE_PATH: &str = "GRABBOT_STORAGE_PATH";
pub const ENV_MAX_HOUR_REQUESTS: &str = "GRABBOT_MAX_HOUR_REQUESTS";

/// Reads the JSON file (defaults when it does not exist), applies `.env`
/// and environment overrides, then validates.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Err(e) = dotenv::dotenv() {
        tracing::debug!("No .env loaded: {}", e);
    }

    let path: PathBuf = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut cfg = if path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Config::from_json_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        warn!("Config file {} not found; using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    cfg.validate().context("invalid configuration")?;

    info!("Loaded configuration: {:?}", cfg);
    Ok(cfg)
}

/// `lookup` is `std::env::var` in production.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup(ENV_BOT_TOKEN) {
        cfg.telegram.bot_token = token;
    }
    if let Some(raw) = lookup(ENV_ADMIN_CHAT_ID) {
        cfg.telegram.admin_chat_id = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_ADMIN_CHAT_ID}='{raw}' is not a chat id"))?;
    }
    if let Some(path) = lookup(ENV_STORAGE_PATH) {
        cfg.claim.storage_path = PathBuf::from(path);
    }
    if let Some(raw) = lookup(ENV_MAX_HOUR_REQUESTS) {
        cfg.claim.max_hour_requests = raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_MAX_HOUR_REQUESTS}='{raw}' is not a number"))?;
    }
    Ok(())
}
