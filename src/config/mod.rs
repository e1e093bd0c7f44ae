use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Credential transport names and session windows.
///
/// The external token's signature is not verified here: deployments must
/// terminate and verify the identity provider's token upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Cookie carrying the opaque legacy session token
    #[serde(default = "default_legacy_cookie")]
    pub legacy_cookie: String,
    /// Cookie carrying the identity provider's three-part token
    #[serde(default = "default_external_cookie")]
    pub external_cookie: String,
    /// Header carrying the external user id (internal RPC transport)
    #[serde(default = "default_external_user_header")]
    pub external_user_header: String,
    /// Header carrying the external session id (internal RPC transport)
    #[serde(default = "default_external_session_header")]
    pub external_session_header: String,
    /// Header carrying the optional tenant scope
    #[serde(default = "default_team_header")]
    pub team_header: String,
    /// Validity window of sessions synthesized from external claims
    #[serde(default = "default_external_session_ttl_days")]
    pub external_session_ttl_days: i64,
    /// How long a caller may reuse a resolved session before refreshing
    #[serde(default = "default_session_cache_max_age_secs")]
    pub session_cache_max_age_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            legacy_cookie: default_legacy_cookie(),
            external_cookie: default_external_cookie(),
            external_user_header: default_external_user_header(),
            external_session_header: default_external_session_header(),
            team_header: default_team_header(),
            external_session_ttl_days: default_external_session_ttl_days(),
            session_cache_max_age_secs: default_session_cache_max_age_secs(),
        }
    }
}

/// Ten years
const MAX_EXTERNAL_SESSION_TTL_DAYS: i64 = 3650;
/// One day
const MAX_SESSION_CACHE_MAX_AGE_SECS: i64 = 86_400;

impl AuthConfig {
    pub fn external_session_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.external_session_ttl_days)
    }

    pub fn session_cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_cache_max_age_secs)
    }
}

fn default_legacy_cookie() -> String {
    "session_token".to_string()
}

fn default_external_cookie() -> String {
    "__session".to_string()
}

fn default_external_user_header() -> String {
    "x-external-user-id".to_string()
}

fn default_external_session_header() -> String {
    "x-external-session-id".to_string()
}

fn default_team_header() -> String {
    "x-team-id".to_string()
}

fn default_external_session_ttl_days() -> i64 {
    30
}

fn default_session_cache_max_age_secs() -> i64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Attempts per sync before a write conflict is surfaced
    #[serde(default = "default_sync_max_attempts")]
    pub max_attempts: u32,
    /// Delay before retry n is n times this value
    #[serde(default = "default_sync_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_sync_max_attempts(),
            retry_backoff_ms: default_sync_retry_backoff_ms(),
        }
    }
}

fn default_sync_max_attempts() -> u32 {
    3
}

fn default_sync_retry_backoff_ms() -> u64 {
    25
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_EXTERNAL_SESSION_TTL_DAYS).contains(&self.auth.external_session_ttl_days) {
            anyhow::bail!(
                "auth.external_session_ttl_days must be between 1 and {}",
                MAX_EXTERNAL_SESSION_TTL_DAYS
            );
        }
        if !(0..=MAX_SESSION_CACHE_MAX_AGE_SECS).contains(&self.auth.session_cache_max_age_secs) {
            anyhow::bail!(
                "auth.session_cache_max_age_secs must be between 0 and {}",
                MAX_SESSION_CACHE_MAX_AGE_SECS
            );
        }
        if self.sync.max_attempts == 0 {
            anyhow::bail!("sync.max_attempts must be at least 1");
        }
        Ok(())
    }
}
