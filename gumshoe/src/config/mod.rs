//! Process configuration read from environment variables.
//!
//! Each section follows the same `VAR -> parse -> default` pattern. Required
//! values that are missing or blank produce [`Error::Configuration`]; optional
//! values that fail to parse fall back to their default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::{DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS};
use crate::notification::{PipelineConfig, SmtpConfig};
use crate::scheduler::DEFAULT_NOTIFY_CRON;
use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:gumshoe.db?mode=rwc";
pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_TVDB_URL: &str = "https://api4.thetvdb.com/v4";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Source of raw configuration values.
trait Env {
    fn get(&self, key: &str) -> Option<String>;

    /// Trimmed value, `None` when unset or blank.
    fn value(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.value(key)
            .ok_or_else(|| Error::config(format!("{key} must be set")))
    }

    fn parsed_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.value(key)
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.value(key).unwrap_or_else(|| default.to_string())
    }
}

impl<F> Env for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Algorithm used to sign magic links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureSchemeKind {
    #[default]
    Hmac,
    Argon2,
}

impl FromStr for SignatureSchemeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hmac" => Ok(Self::Hmac),
            "argon2" => Ok(Self::Argon2),
            other => Err(Error::config(format!(
                "unknown signature scheme '{other}' (expected 'hmac' or 'argon2')"
            ))),
        }
    }
}

/// Magic-link signing.
#[derive(Clone)]
pub struct AuthSettings {
    pub secret_key: String,
    pub scheme: SignatureSchemeKind,
    pub token_ttl_secs: i64,
    /// Public base URL embedded in mailed links.
    pub api_url: String,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret_key", &"<redacted>")
            .field("scheme", &self.scheme)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl AuthSettings {
    /// Environment variables:
    /// - `SECRET_KEY`: signing secret (required)
    /// - `SIGNATURE_SCHEME`: `hmac` or `argon2` (default: hmac)
    /// - `TOKEN_TTL_SECS`: link lifetime, at most one year (default: 86400 = 24 hours)
    /// - `API_URL`: public base URL (default: http://localhost:8080)
    fn load(env: &impl Env) -> Result<Self> {
        let scheme = match env.value("SIGNATURE_SCHEME") {
            Some(raw) => raw.parse()?,
            None => SignatureSchemeKind::default(),
        };

        let token_ttl_secs = env.parsed_or("TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS);
        if token_ttl_secs <= 0 {
            return Err(Error::config("TOKEN_TTL_SECS must be positive"));
        }
        if token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(Error::config(format!(
                "TOKEN_TTL_SECS must be at most {MAX_TOKEN_TTL_SECS}"
            )));
        }

        Ok(Self {
            secret_key: env.required("SECRET_KEY")?,
            scheme,
            token_ttl_secs,
            api_url: env.or("API_URL", DEFAULT_API_URL),
        })
    }
}

/// External catalog endpoint and credentials.
#[derive(Clone)]
pub struct CatalogSettings {
    pub base_url: String,
    pub api_key: String,
    pub pin: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for CatalogSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("pin", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CatalogSettings {
    /// Environment variables:
    /// - `TVDB_URL`: API base (default: https://api4.thetvdb.com/v4)
    /// - `TVDB_KEY`: API key (required)
    /// - `TVDB_PIN`: subscriber pin (default: "string")
    /// - `CATALOG_TIMEOUT_SECS`: request timeout (default: 30)
    fn load(env: &impl Env) -> Result<Self> {
        Ok(Self {
            base_url: env.or("TVDB_URL", DEFAULT_TVDB_URL),
            api_key: env.required("TVDB_KEY")?,
            pin: env.or("TVDB_PIN", "string"),
            timeout: Duration::from_secs(env.parsed_or("CATALOG_TIMEOUT_SECS", 30)),
        })
    }
}

fn load_smtp(env: &impl Env) -> Result<SmtpConfig> {
    let defaults = SmtpConfig::default();
    Ok(SmtpConfig {
        host: env.required("MAILER_HOST")?,
        port: env.parsed_or("MAILER_PORT", defaults.port),
        username: env.required("MAILER_USER")?,
        password: env.required("MAILER_PASS")?,
        from_name: env.or("MAILER_FROM_NAME", &defaults.from_name),
    })
}

fn load_pipeline(env: &impl Env) -> PipelineConfig {
    let defaults = PipelineConfig::default();
    PipelineConfig {
        catalog_concurrency: env
            .parsed_or("CATALOG_CONCURRENCY", defaults.catalog_concurrency)
            .max(1),
        email_concurrency: env
            .parsed_or("EMAIL_CONCURRENCY", defaults.email_concurrency)
            .max(1),
    }
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub auth: AuthSettings,
    pub catalog: CatalogSettings,
    pub smtp: SmtpConfig,
    pub pipeline: PipelineConfig,
    /// 6-field cron expression evaluated in UTC.
    pub notify_cron: String,
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Read the configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::load(&lookup)
    }

    fn load(env: &impl Env) -> Result<Self> {
        Ok(Self {
            database_url: env.or("DATABASE_URL", DEFAULT_DATABASE_URL),
            auth: AuthSettings::load(env)?,
            catalog: CatalogSettings::load(env)?,
            smtp: load_smtp(env)?,
            pipeline: load_pipeline(env),
            notify_cron: env.or("NOTIFY_CRON", DEFAULT_NOTIFY_CRON),
            log_dir: PathBuf::from(env.or("LOG_DIR", DEFAULT_LOG_DIR)),
        })
    }
}
