//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::sync::Once;

static INIT: Once = Once::new();

/// Store location (path or http(s) URL) used when `--db` is not given.
pub const STORE_ENV: &str = "SCRIPT_DB";
/// Comma-separated hosts accepted for script URLs.
pub const ALLOWED_HOSTS_ENV: &str = "SCRIPT_ALLOWED_HOSTS";
/// Identifier scheme preset name (broad | b-series).
pub const ID_SCHEME_ENV: &str = "SCRIPT_ID_SCHEME";

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Comma-separated list; empty entries dropped.
pub fn env_list(key: &str) -> Vec<String> {
    env_opt(key).map(|raw| split_list(&raw)).unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
