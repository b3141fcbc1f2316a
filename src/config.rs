use anyhow::{Context, Result};
use std::{env, path::PathBuf, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Backend REST API configuration
    pub backend: BackendConfig,

    /// OpenID Connect identity provider configuration
    pub identity: IdentityConfig,

    /// Session lifecycle timings
    pub session: SessionConfig,

    /// Path configuration
    pub paths: PathConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Timings of the session controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound for a single token acquisition (initial or forced refresh)
    pub token_timeout: Duration,
    /// Provider notifications closer than this to the last processed one are dropped
    pub debounce_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_timeout: Duration::from_millis(SessionConfig::DEFAULT_TOKEN_TIMEOUT_MS),
            debounce_window: Duration::from_millis(SessionConfig::DEFAULT_DEBOUNCE_MS),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    pub session_cache: PathBuf,
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// On first call, it loads and validates all configuration from environment
    /// variables. Subsequent calls return the cached instance.
    ///
    /// # Panics
    /// Panics if configuration loading fails. Use [`AppConfig::load`] to handle
    /// the error instead.
    pub fn get() -> &'static Self {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
        APP_CONFIG.get_or_init(|| Self::load().expect("failed to load application configuration"))
    }

    /// Load and validate all configuration from environment variables
    pub fn load() -> Result<Self> {
        let backend = BackendConfig::load()?;
        let identity = IdentityConfig::load()?;
        let session = SessionConfig::load()?;
        let paths = PathConfig::load()?;

        Ok(Self {
            backend,
            identity,
            session,
            paths,
        })
    }
}

impl BackendConfig {
    fn load() -> Result<Self> {
        let base_url = env::var("BACKEND_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string())
            .trim_end_matches('/')
            .to_string();

        let request_timeout = env::var("BACKEND_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("failed to parse BACKEND_TIMEOUT_SECS: invalid format")?;

        Ok(Self {
            base_url,
            request_timeout,
        })
    }
}

impl IdentityConfig {
    fn load() -> Result<Self> {
        let token_url = env::var("OIDC_TOKEN_URL").unwrap_or_else(|_| {
            "http://127.0.0.1:8080/realms/monitoring/protocol/openid-connect/token".to_string()
        });
        let client_id = env::var("OIDC_CLIENT_ID").unwrap_or_else(|_| "dashboard".to_string());
        let client_secret = env::var("OIDC_CLIENT_SECRET").ok().filter(|s| !s.is_empty());

        Ok(Self {
            token_url,
            client_id,
            client_secret,
        })
    }
}

impl SessionConfig {
    pub const DEFAULT_TOKEN_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

    fn load() -> Result<Self> {
        let token_timeout = Self::millis("TOKEN_TIMEOUT_MS", Self::DEFAULT_TOKEN_TIMEOUT_MS)?;
        let debounce_window = Self::millis("AUTH_DEBOUNCE_MS", Self::DEFAULT_DEBOUNCE_MS)?;

        Ok(Self {
            token_timeout,
            debounce_window,
        })
    }

    fn millis(name: &str, default: u64) -> Result<Duration> {
        match env::var(name) {
            Ok(value) => value
                .parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("failed to parse {name}: invalid format")),
            Err(_) => Ok(Duration::from_millis(default)),
        }
    }
}

impl PathConfig {
    fn load() -> Result<Self> {
        let session_cache = env::var("SESSION_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                env::temp_dir().join(format!("{}-session.json", env!("CARGO_PKG_NAME")))
            });

        Ok(Self { session_cache })
    }
}
