//! Configuration for the ServiceNow connection and the translation engine.
//!
//! The configuration file is JSON, shaped like the `servicenow` block of a
//! provider configuration, either bare or wrapped in `{"servicenow": {...}}`.
//! The engine itself only sees the derived [`EngineOptions`] and
//! [`ClientSettings`].
//!
//! # Examples
//!
//! ```
//! use snowgeo_core::config::ServiceNowConfig;
//! use snowgeo_core::identity::IdentityMode;
//!
//! let config = ServiceNowConfig::from_json_str(
//!     r#"{"url": "https://example.service-now.com", "trackObjectIds": true}"#,
//! )
//! .unwrap();
//! let options = config.engine_options();
//! assert_eq!(options.ttl, 600);
//! assert_eq!(options.identity, IdentityMode::tracked());
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use geojson::JsonValue;
use serde::Deserialize;
use url::Url;

use crate::collect::DEFAULT_TTL_SECONDS;
use crate::error::{ConfigError, Result};
use crate::identity::IdentityMode;
use crate::tables::TicketTable;

/// Environment variable consulted when the configured password is empty.
pub const PASSWORD_ENV_VAR: &str = "SERVICENOW_PASSWORD";

const DEFAULT_MAX_FEATURES: usize = 10_000;
const DEFAULT_PAGE_SIZE: usize = 10_000;
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Per-layer configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LayerConfig {
    /// Symbology passed through to the collection metadata.
    #[serde(default)]
    pub renderer: Option<JsonValue>,
}

/// The `servicenow` configuration block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNowConfig {
    /// Instance base URL.
    #[serde(default)]
    pub url: String,
    /// Basic auth user.
    #[serde(default)]
    pub username: String,
    /// Basic auth password.
    #[serde(default)]
    pub password: String,
    /// Collection time-to-live in seconds.
    #[serde(default = "default_ttl")]
    pub cache_time_to_live_seconds: u64,
    /// Maximum rows accumulated per request.
    #[serde(default = "default_max_features")]
    pub max_features_to_cache: usize,
    /// Page size of each table query.
    #[serde(default = "default_page_size", alias = "sysparm_limit")]
    pub sysparm_limit: usize,
    /// Source column advertised as the identity field.
    #[serde(default)]
    pub id_field: Option<String>,
    /// Assign synthetic integer identities.
    #[serde(default)]
    pub track_object_ids: bool,
    /// Deadline of each upstream request in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Incident layer settings.
    #[serde(default)]
    pub incidents: LayerConfig,
    /// Request layer settings.
    #[serde(default)]
    pub requests: LayerConfig,
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_SECONDS
}

fn default_max_features() -> usize {
    DEFAULT_MAX_FEATURES
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigDocument {
    Wrapped { servicenow: ServiceNowConfig },
    Bare(ServiceNowConfig),
}

/// Parameters of the translation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Maximum rows accumulated per request (may overshoot by one page).
    pub cap: usize,
    /// Rows per page.
    pub page_size: usize,
    /// Collection time-to-live in seconds.
    pub ttl: u64,
    /// Identity handling.
    pub identity: IdentityMode,
    /// Renderer block per table.
    pub renderers: HashMap<TicketTable, JsonValue>,
}

impl EngineOptions {
    /// Renderer configured for `table`.
    #[must_use]
    pub fn renderer(&self, table: TicketTable) -> Option<&JsonValue> {
        self.renderers.get(&table)
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cap: DEFAULT_MAX_FEATURES,
            page_size: DEFAULT_PAGE_SIZE,
            ttl: DEFAULT_TTL_SECONDS,
            identity: IdentityMode::Disabled,
            renderers: HashMap::new(),
        }
    }
}

/// Connection settings for the HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    /// Instance base URL.
    pub base_url: Url,
    /// Basic auth user.
    pub username: String,
    /// Basic auth password.
    pub password: String,
    /// Per-request deadline.
    pub timeout: Duration,
}

impl ServiceNowConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: ConfigDocument =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config = match document {
            ConfigDocument::Wrapped { servicenow } => servicenow,
            ConfigDocument::Bare(config) => config,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid configuration.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: ConfigDocument =
            serde_json::from_str(text).map_err(|e| ConfigError::InvalidOption {
                option: "configuration".to_string(),
                message: e.to_string(),
            })?;
        let config = match document {
            ConfigDocument::Wrapped { servicenow } => servicenow,
            ConfigDocument::Bare(config) => config,
        };
        config.validate()?;
        Ok(config)
    }

    /// Fills an empty password from [`PASSWORD_ENV_VAR`].
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.password.is_empty()
            && let Some(password) = lookup(PASSWORD_ENV_VAR)
        {
            self.password = password;
        }
    }

    /// Checks option values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a missing or unparsable URL, or a zero cap or page size.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                option: "url".to_string(),
            }
            .into());
        }
        self.base_url()?;
        if self.max_features_to_cache == 0 {
            return Err(ConfigError::InvalidOption {
                option: "maxFeaturesToCache".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }
        if self.sysparm_limit == 0 {
            return Err(ConfigError::InvalidOption {
                option: "sysparmLimit".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidOption {
                option: "timeoutSeconds".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn base_url(&self) -> Result<Url> {
        let url = Url::parse(self.url.trim()).map_err(|e| ConfigError::InvalidOption {
            option: "url".to_string(),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidOption {
                option: "url".to_string(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            }
            .into());
        }
        Ok(url)
    }

    /// Identity handling: a non-empty `idField` wins over `trackObjectIds`.
    #[must_use]
    pub fn identity_mode(&self) -> IdentityMode {
        match self.id_field.as_deref().filter(|f| !f.is_empty()) {
            Some(field) => IdentityMode::SourceField {
                field: field.to_string(),
            },
            None if self.track_object_ids => IdentityMode::tracked(),
            None => IdentityMode::Disabled,
        }
    }

    /// Derives the engine parameters.
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        let mut renderers = HashMap::new();
        for (table, layer) in [
            (TicketTable::Incident, &self.incidents),
            (TicketTable::Request, &self.requests),
        ] {
            if let Some(renderer) = &layer.renderer {
                renderers.insert(table, renderer.clone());
            }
        }
        EngineOptions {
            cap: self.max_features_to_cache,
            page_size: self.sysparm_limit,
            ttl: self.cache_time_to_live_seconds,
            identity: self.identity_mode(),
            renderers,
        }
    }

    /// Derives the HTTP client settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL is invalid.
    pub fn client_settings(&self) -> Result<ClientSettings> {
        Ok(ClientSettings {
            base_url: self.base_url()?,
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
        })
    }
}
