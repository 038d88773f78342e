use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parley.toml",
    "config/parley.toml",
    "crates/config/parley.toml",
    "../parley.toml",
    "../config/parley.toml",
    "../../parley.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://parley.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Settings for verifying session tokens minted by the identity service.
///
/// ```
/// use parley_config::AuthConfig;
///
/// let auth = AuthConfig::default();
/// assert_eq!(auth.cookie_name, "access_token");
/// assert_eq!(auth.issuer, "parley");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "AuthConfig::default_issuer")]
    pub issuer: String,
    #[serde(default = "AuthConfig::default_audience")]
    pub audience: String,
    #[serde(default = "AuthConfig::default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "AuthConfig::default_token_ttl")]
    pub token_ttl_seconds: u64,
}

impl AuthConfig {
    fn default_issuer() -> String {
        "parley".to_string()
    }

    fn default_audience() -> String {
        "parley-users".to_string()
    }

    fn default_cookie_name() -> String {
        "access_token".to_string()
    }

    const fn default_token_ttl() -> u64 {
        86_400
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "default_secret_change_in_production".to_string(),
            issuer: Self::default_issuer(),
            audience: Self::default_audience(),
            cookie_name: Self::default_cookie_name(),
            token_ttl_seconds: Self::default_token_ttl(),
        }
    }
}

/// Tuning for live room connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Frames queued per connection before it is treated as a slow consumer.
    #[serde(default = "RealtimeConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "RealtimeConfig::default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    #[serde(default = "RealtimeConfig::default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default = "RealtimeConfig::default_history_page_limit")]
    pub history_page_limit: u32,
}

impl RealtimeConfig {
    const fn default_outbound_buffer() -> usize {
        64
    }

    const fn default_idle_timeout() -> u64 {
        300
    }

    const fn default_max_message_chars() -> usize {
        4_000
    }

    const fn default_history_page_limit() -> u32 {
        200
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: Self::default_outbound_buffer(),
            idle_timeout_seconds: Self::default_idle_timeout(),
            max_message_chars: Self::default_max_message_chars(),
            history_page_limit: Self::default_history_page_limit(),
        }
    }
}

/// Upper bound for `realtime.idle_timeout_seconds` (one week).
pub const MAX_IDLE_TIMEOUT_SECONDS: u64 = 7 * 24 * 60 * 60;

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parley_config::load;
///
/// std::env::remove_var("PARLEY_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret.clone())?
        .set_default("auth.issuer", defaults.auth.issuer.clone())?
        .set_default("auth.audience", defaults.auth.audience.clone())?
        .set_default("auth.cookie_name", defaults.auth.cookie_name.clone())?
        .set_default(
            "auth.token_ttl_seconds",
            clamp_to_i64(defaults.auth.token_ttl_seconds),
        )?
        .set_default(
            "realtime.outbound_buffer",
            clamp_to_i64(defaults.realtime.outbound_buffer as u64),
        )?
        .set_default(
            "realtime.idle_timeout_seconds",
            clamp_to_i64(defaults.realtime.idle_timeout_seconds),
        )?
        .set_default(
            "realtime.max_message_chars",
            clamp_to_i64(defaults.realtime.max_message_chars as u64),
        )?
        .set_default(
            "realtime.history_page_limit",
            i64::from(defaults.realtime.history_page_limit),
        )?;

    let environment_overrides = config::Environment::with_prefix("PARLEY").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARLEY_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARLEY_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.token_ttl_seconds > i64::MAX as u64 {
        config.auth.token_ttl_seconds = i64::MAX as u64;
    }
    if config.realtime.outbound_buffer == 0 {
        config.realtime.outbound_buffer = 1;
    }
    config.realtime.idle_timeout_seconds = config
        .realtime
        .idle_timeout_seconds
        .clamp(1, MAX_IDLE_TIMEOUT_SECONDS);

    debug!(
        http = ?config.http,
        database = ?config.database,
        realtime = ?config.realtime,
        "loaded backend configuration"
    );
    Ok(config)
}
