//! Environment-driven configuration for the NX portal.
//!
//! All variables carry the `NX_` prefix. `.env.local` loading is the
//! caller's job (daemon/CLI run dotenvy before `from_env`); this crate only
//! reads the process environment so tests can inject values directly.
//!
//! Secrets (`provider_secret_key`, `provider_api_key`, `database_url`) are
//! masked in the Debug representation — config must never leak credentials
//! into logs.

use std::fmt;

use anyhow::{Context, Result};

pub const ENV_DB_URL: &str = "NX_DATABASE_URL";
pub const ENV_BIND_ADDR: &str = "NX_BIND_ADDR";
pub const ENV_SESSION_TTL_HOURS: &str = "NX_SESSION_TTL_HOURS";

pub const ENV_PROVIDER_API_KEY: &str = "NX_PROVIDER_API_KEY";
pub const ENV_PROVIDER_SITE_ID: &str = "NX_PROVIDER_SITE_ID";
pub const ENV_PROVIDER_SECRET_KEY: &str = "NX_PROVIDER_SECRET_KEY";
pub const ENV_PROVIDER_BASE_URL: &str = "NX_PROVIDER_BASE_URL";
pub const ENV_PROVIDER_RETURN_URL: &str = "NX_PROVIDER_RETURN_URL";
pub const ENV_PROVIDER_CANCEL_URL: &str = "NX_PROVIDER_CANCEL_URL";
pub const ENV_PROVIDER_NOTIFY_URL: &str = "NX_PROVIDER_NOTIFY_URL";

const DEFAULT_PROVIDER_BASE_URL: &str = "https://sandbox-api-checkout.cinetpay.com";

/// Payment-provider connection settings.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub site_id: String,
    /// HMAC key for webhook signature verification.
    pub secret_key: String,
    pub base_url: String,
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
}

/// Full portal configuration as read from the environment.
#[derive(Clone)]
pub struct PortalConfig {
    pub database_url: String,
    /// `host:port` the daemon binds. Defaults to 127.0.0.1:8088.
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub provider: ProviderConfig,
}

impl PortalConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = require(ENV_DB_URL)?;

        let bind_addr =
            std::env::var(ENV_BIND_ADDR).unwrap_or_else(|_| "127.0.0.1:8088".to_string());

        let session_ttl_hours = match std::env::var(ENV_SESSION_TTL_HOURS) {
            Ok(v) => v
                .parse::<i64>()
                .with_context(|| format!("{ENV_SESSION_TTL_HOURS} must be an integer, got {v:?}"))?,
            Err(_) => 24,
        };

        let provider = ProviderConfig {
            api_key: require(ENV_PROVIDER_API_KEY)?,
            site_id: require(ENV_PROVIDER_SITE_ID)?,
            secret_key: require(ENV_PROVIDER_SECRET_KEY)?,
            base_url: std::env::var(ENV_PROVIDER_BASE_URL)
                .unwrap_or_else(|_| DEFAULT_PROVIDER_BASE_URL.to_string()),
            return_url: require(ENV_PROVIDER_RETURN_URL)?,
            cancel_url: require(ENV_PROVIDER_CANCEL_URL)?,
            notify_url: require(ENV_PROVIDER_NOTIFY_URL)?,
        };

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            provider,
        })
    }
}

fn require(var: &str) -> Result<String> {
    std::env::var(var).with_context(|| format!("missing env var {var}"))
}

/// Show enough of a secret to identify it without exposing it.
fn mask(s: &str) -> String {
    if s.len() <= 4 {
        return "****".to_string();
    }
    format!("{}…({} chars)", &s[..4], s.len())
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &mask(&self.api_key))
            .field("site_id", &self.site_id)
            .field("secret_key", &mask(&self.secret_key))
            .field("base_url", &self.base_url)
            .field("return_url", &self.return_url)
            .field("cancel_url", &self.cancel_url)
            .field("notify_url", &self.notify_url)
            .finish()
    }
}

impl fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalConfig")
            .field("database_url", &mask(&self.database_url))
            .field("bind_addr", &self.bind_addr)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("provider", &self.provider)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_never_prints_secret_tail() {
        let m = mask("sk_live_abcdefghij");
        assert!(m.starts_with("sk_l"));
        assert!(!m.contains("abcdefghij"));
        assert_eq!(mask("abc"), "****");
    }

    #[test]
    fn debug_masks_credentials() {
        let cfg = PortalConfig {
            database_url: "postgres://nx:hunter2pass@db/nx".to_string(),
            bind_addr: "127.0.0.1:8088".to_string(),
            session_ttl_hours: 24,
            provider: ProviderConfig {
                api_key: "apikey-aaaabbbbcccc".to_string(),
                site_id: "site-1".to_string(),
                secret_key: "whsec-ddddeeeeffff".to_string(),
                base_url: "https://provider.test".to_string(),
                return_url: "https://portal.test/pay/ok".to_string(),
                cancel_url: "https://portal.test/pay/ko".to_string(),
                notify_url: "https://portal.test/v1/payments/webhook".to_string(),
            },
        };

        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2pass"));
        assert!(!dbg.contains("ddddeeeeffff"));
        assert!(dbg.contains("site-1"));
    }
}
