use fhirlake_fetch::auth::DEFAULT_AUTHORITY_HOST;
use fhirlake_table::output::ParquetCompression;
use fhirlake_table::{SaveMode, TableFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Raised for unusable configuration; the binary exits with status 2.
#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Identity provider credentials
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub fhir: FhirSettings,
    /// Target table
    #[serde(default)]
    pub lakehouse: LakehouseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // FHIR validations
        if self.fhir.url.trim().is_empty() {
            return Err("fhir.url is required".into());
        }
        Url::parse(&self.fhir.url).map_err(|e| format!("fhir.url is not a valid URL: {e}"))?;
        if self.fhir.max_pages == Some(0) {
            return Err("fhir.max_pages must be > 0".into());
        }
        if self.fhir.timeout_secs == Some(0) {
            return Err("fhir.timeout_secs must be > 0".into());
        }
        // Identity validations
        if !self.identity.has_static_token() {
            let missing: Vec<&str> = [
                ("identity.tenant_id", &self.identity.tenant_id),
                ("identity.client_id", &self.identity.client_id),
                ("identity.client_secret", &self.identity.client_secret),
            ]
            .into_iter()
            .filter(|(_, v)| v.as_deref().unwrap_or("").trim().is_empty())
            .map(|(k, _)| k)
            .collect();
            if !missing.is_empty() {
                return Err(format!(
                    "missing {} (or set identity.access_token)",
                    missing.join(", ")
                ));
            }
            Url::parse(&self.identity.authority_host)
                .map_err(|e| format!("identity.authority_host is not a valid URL: {e}"))?;
        }
        // Lakehouse validation
        if self.lakehouse.path.trim().is_empty() {
            return Err("lakehouse.path is required".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Token scope; defaults to `<fhir origin>/.default`
    pub scope: Option<String>,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    /// Pre-issued bearer token, used instead of the client credentials flow
    pub access_token: Option<String>,
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.into()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            scope: None,
            authority_host: default_authority_host(),
            access_token: None,
        }
    }
}

impl IdentityConfig {
    pub fn has_static_token(&self) -> bool {
        self.access_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// The configured scope, or the `.default` scope of the FHIR server.
    pub fn resolved_scope(&self, fhir_url: &str) -> Result<String, String> {
        if let Some(scope) = self.scope.as_deref()
            && !scope.trim().is_empty()
        {
            return Ok(scope.to_string());
        }
        let url = Url::parse(fhir_url).map_err(|e| format!("invalid fhir.url: {e}"))?;
        Ok(format!("{}/.default", url.origin().ascii_serialization()))
    }
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("IdentityConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("scope", &self.scope)
            .field("authority_host", &self.authority_host)
            .field("access_token", &redact(&self.access_token))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FhirSettings {
    /// Search URL of the first page, e.g. `https://fhir.example.com/Patient`
    #[serde(default)]
    pub url: String,
    /// Stop after this many pages
    pub max_pages: Option<usize>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LakehouseConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub format: TableFormat,
    #[serde(default)]
    pub mode: SaveMode,
    #[serde(default = "default_true")]
    pub merge_schema: bool,
    /// Codec for Parquet data files; ignored for NDJSON.
    #[serde(default)]
    pub compression: ParquetCompression,
}

fn default_true() -> bool {
    true
}

impl Default for LakehouseConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            format: TableFormat::default(),
            mode: SaveMode::default(),
            merge_schema: true,
            compression: ParquetCompression::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{AppConfig, ConfigError};
    use config::{Config, Environment, File, FileFormat};
    use std::path::Path;

    /// Load the file at `path` (skipped if absent), then apply
    /// `FHIRLAKE__SECTION__KEY` environment overrides, then validate.
    pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using environment only");
        }
        // Environment variable overrides, e.g., FHIRLAKE__FHIR__MAX_PAGES=10
        builder = builder.add_source(
            Environment::with_prefix("FHIRLAKE")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError(format!("config build error: {e}")))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError(format!("config deserialize error: {e}")))?;
        merged.validate().map_err(ConfigError)?;
        Ok(merged)
    }
}
