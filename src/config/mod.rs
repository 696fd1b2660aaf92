//! Configuration module for the LUG site backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Email address that is always treated as an administrator.
pub const DEFAULT_ADMIN_EMAIL: &str = "lugbpdc@dubai.bits-pilani.ac.in";

/// Organizational domain that sign-in is restricted to.
pub const DEFAULT_HOSTED_DOMAIN: &str = "dubai.bits-pilani.ac.in";

/// Named booleans gating navigation entries and page sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub show_sign_in: bool,
    pub show_join_us: bool,
    pub show_forum: bool,
    pub show_events: bool,
    pub show_mascot: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            show_sign_in: true,
            show_join_us: false,
            show_forum: false,
            show_events: true,
            show_mascot: false,
        }
    }
}

impl FeatureFlags {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            show_sign_in: env_flag("LUG_SHOW_SIGN_IN", defaults.show_sign_in),
            show_join_us: env_flag("LUG_SHOW_JOIN_US", defaults.show_join_us),
            show_forum: env_flag("LUG_SHOW_FORUM", defaults.show_forum),
            show_events: env_flag("LUG_SHOW_EVENTS", defaults.show_events),
            show_mascot: env_flag("LUG_SHOW_MASCOT", defaults.show_mascot),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Directory holding uploaded chat images
    pub blob_dir: PathBuf,
    /// Base URL that download links are built from
    pub public_base_url: String,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// HS256 secret used to verify identity tokens
    pub token_secret: String,
    /// Reserved administrator email
    pub admin_email: String,
    /// Hosted domain sign-in is restricted to; `None` accepts any domain
    pub hosted_domain: Option<String>,
    /// Largest accepted image upload, in decoded bytes
    pub max_upload_bytes: usize,
    /// How often analytics are recomputed even without changes
    pub analytics_refresh: Duration,
    /// Navigation and section visibility
    pub feature_flags: FeatureFlags,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let db_path = env::var("LUG_DB_PATH")
            .unwrap_or_else(|_| "./data/site.sqlite".to_string())
            .into();

        let blob_dir = env::var("LUG_BLOB_DIR")
            .unwrap_or_else(|_| "./data/blobs".to_string())
            .into();

        let bind_addr_raw =
            env::var("LUG_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = bind_addr_raw
            .parse()
            .map_err(|e| format!("Invalid LUG_BIND_ADDR {:?}: {}", bind_addr_raw, e))?;

        let public_base_url = env::var("LUG_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}", bind_addr_raw))
            .trim_end_matches('/')
            .to_string();

        let log_level = env::var("LUG_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let token_secret =
            env::var("LUG_TOKEN_SECRET").unwrap_or_else(|_| "dev-insecure-secret".to_string());

        let admin_email =
            env::var("LUG_ADMIN_EMAIL").unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string());

        let hosted_domain = match env::var("LUG_HOSTED_DOMAIN") {
            Ok(v) if v.trim().is_empty() || v == "*" => None,
            Ok(v) => Some(v),
            Err(_) => Some(DEFAULT_HOSTED_DOMAIN.to_string()),
        };

        let max_upload_bytes = env_number("LUG_MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?;
        let analytics_refresh = env_interval("LUG_ANALYTICS_REFRESH_SECS", 60)?;

        Ok(Self {
            db_path,
            blob_dir,
            public_base_url,
            bind_addr,
            log_level,
            token_secret,
            admin_email,
            hosted_domain,
            max_upload_bytes,
            analytics_refresh,
            feature_flags: FeatureFlags::from_env(),
        })
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_number(key: &str, default: usize) -> Result<usize, String> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| format!("Invalid {} {:?}: {}", key, v, e)),
        Err(_) => Ok(default),
    }
}

/// A whole number of seconds; zero is rejected since it cannot drive a timer.
fn env_interval(key: &str, default_secs: u64) -> Result<Duration, String> {
    let secs = env_number(key, default_secs as usize)?;
    if secs == 0 {
        return Err(format!("{} must be at least 1 second", key));
    }
    Ok(Duration::from_secs(secs as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        for key in [
            "LUG_DB_PATH",
            "LUG_BLOB_DIR",
            "LUG_BIND_ADDR",
            "LUG_PUBLIC_BASE_URL",
            "LUG_LOG_LEVEL",
            "LUG_TOKEN_SECRET",
            "LUG_ADMIN_EMAIL",
            "LUG_HOSTED_DOMAIN",
            "LUG_MAX_UPLOAD_BYTES",
            "LUG_ANALYTICS_REFRESH_SECS",
            "LUG_SHOW_SIGN_IN",
            "LUG_SHOW_JOIN_US",
            "LUG_SHOW_FORUM",
            "LUG_SHOW_EVENTS",
            "LUG_SHOW_MASCOT",
        ] {
            env::remove_var(key);
        }

        let config = Config::from_env().unwrap();

        assert_eq!(config.db_path, PathBuf::from("./data/site.sqlite"));
        assert_eq!(config.blob_dir, PathBuf::from("./data/blobs"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.public_base_url, "http://127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.admin_email, DEFAULT_ADMIN_EMAIL);
        assert_eq!(config.hosted_domain.as_deref(), Some(DEFAULT_HOSTED_DOMAIN));
        assert_eq!(config.analytics_refresh, Duration::from_secs(60));
        assert_eq!(config.feature_flags, FeatureFlags::default());
    }

    #[test]
    fn test_env_flag_parsing() {
        env::set_var("LUG_TEST_FLAG_ON", "Yes");
        env::set_var("LUG_TEST_FLAG_OFF", "0");
        assert!(env_flag("LUG_TEST_FLAG_ON", false));
        assert!(!env_flag("LUG_TEST_FLAG_OFF", true));
        assert!(env_flag("LUG_TEST_FLAG_MISSING", true));
    }

    #[test]
    fn test_env_interval_rejects_zero() {
        env::set_var("LUG_TEST_INTERVAL_ZERO", "0");
        env::set_var("LUG_TEST_INTERVAL_FIVE", "5");
        assert!(env_interval("LUG_TEST_INTERVAL_ZERO", 60).is_err());
        assert_eq!(
            env_interval("LUG_TEST_INTERVAL_FIVE", 60).unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(
            env_interval("LUG_TEST_INTERVAL_MISSING", 60).unwrap(),
            Duration::from_secs(60)
        );
    }
}
