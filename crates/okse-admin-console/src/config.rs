//! Console configuration: TOML file, then environment, then CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use okse_admin_protocol::{ConfigurationError, CsrfCredential, Tab, UnknownTabError};
use serde::{Deserialize, Serialize};

use crate::ConsoleError;

pub const ENV_BASE_URL: &str = "OKSE_CONSOLE_BASE_URL";
pub const ENV_INTERVAL_SECS: &str = "OKSE_CONSOLE_INTERVAL_SECS";
pub const ENV_CSRF_HEADER: &str = "OKSE_CONSOLE_CSRF_HEADER";
pub const ENV_CSRF_TOKEN: &str = "OKSE_CONSOLE_CSRF_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub csrf: CsrfConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Absolute URL every endpoint is appended to.
    pub base_url: String,
    /// Per-request timeout; 0 disables it.
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8083/api/".to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between polls; clamped to the scheduler's floor.
    pub update_interval_secs: f64,
    pub startup_tab: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 2.0,
            startup_tab: Tab::Main.id().to_string(),
        }
    }
}

/// Either an explicit header/token pair, or a page whose meta tags carry it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub header_name: Option<String>,
    pub token: Option<String>,
    pub page_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

impl ConsoleConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("okse-console").join("config.toml"))
    }

    /// Load from `path`, or from the default location. An explicit path
    /// must exist; a missing default file just means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConsoleError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConsoleError::ConfigRead { path, source }),
        };

        let config = toml::from_str(&text)
            .map_err(|source| ConsoleError::ConfigParse { path: path.clone(), source })?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an environment-like lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.api.base_url = url;
        }
        if let Some(raw) = lookup(ENV_INTERVAL_SECS) {
            match raw.trim().parse::<f64>() {
                Ok(secs) => self.polling.update_interval_secs = secs,
                Err(_) => tracing::warn!(value = %raw, "Ignoring non-numeric {ENV_INTERVAL_SECS}"),
            }
        }
        if let Some(header) = lookup(ENV_CSRF_HEADER) {
            self.csrf.header_name = Some(header);
        }
        if let Some(token) = lookup(ENV_CSRF_TOKEN) {
            self.csrf.token = Some(token);
        }
    }

    /// Request timeout, or `None` when `timeout_ms` is 0.
    pub fn timeout(&self) -> Option<Duration> {
        (self.api.timeout_ms > 0).then(|| Duration::from_millis(self.api.timeout_ms))
    }

    pub fn startup_tab(&self) -> Result<Tab, UnknownTabError> {
        self.polling.startup_tab.parse()
    }
}

impl CsrfConfig {
    /// The explicit header/token pair, if both are configured.
    pub fn explicit(&self) -> Option<Result<CsrfCredential, ConfigurationError>> {
        match (&self.header_name, &self.token) {
            (Some(header), Some(token)) => Some(CsrfCredential::new(header.as_str(), token.as_str())),
            _ => None,
        }
    }
}

/// Produce the CSRF credential once at startup: explicit configuration
/// first, otherwise the meta tags of `page_url`.
pub async fn resolve_csrf(
    config: &CsrfConfig,
    timeout: Option<Duration>,
) -> Result<CsrfCredential, ConfigurationError> {
    if let Some(explicit) = config.explicit() {
        return explicit;
    }

    let Some(page_url) = &config.page_url else {
        return Err(ConfigurationError::MissingCsrfCredential(
            "no header/token configured and no page_url to read them from".into(),
        ));
    };

    let page_error = |e: reqwest::Error| {
        ConfigurationError::MissingCsrfCredential(format!("could not load {page_url}: {e}"))
    };
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build().map_err(page_error)?;
    let html = client
        .get(page_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(page_error)?
        .text()
        .await
        .map_err(page_error)?;

    let credential = CsrfCredential::from_page_metadata(&html)?;
    tracing::info!(page = %page_url, header = %credential.header_name(), "Loaded CSRF credential from page metadata");
    Ok(credential)
}
