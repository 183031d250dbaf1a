use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DRIVE_TOKEN_ENV: &str = "ANIKURA_DRIVE_ACCESS_TOKEN";
pub const STORAGE_KEY_ENV: &str = "ANIKURA_STORAGE_ACCESS_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub drive: DriveConfig,

    pub storage: StorageConfig,

    pub transfer: TransferConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Event bus buffer size (default: 256)
    pub event_bus_buffer_size: usize,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,

    /// Days of `system_logs` kept; older rows are pruned at startup.
    /// 0 keeps everything.
    pub log_retention_days: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/anikura.db".to_string(),
            log_level: "info".to_string(),
            event_bus_buffer_size: 256,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            log_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Admin keys accepted through `X-Api-Key` or `Authorization: Bearer`.
    /// An empty list leaves the admin routes open, for local use only.
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 6790,
            cors_allowed_origins: vec![
                "http://localhost:6790".to_string(),
                "http://127.0.0.1:6790".to_string(),
            ],
            api_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub api_base_url: String,

    /// OAuth bearer token. Takes precedence over `api_key`.
    pub access_token: Option<String>,

    /// API key for publicly shared folders.
    pub api_key: Option<String>,

    /// Timeout for metadata and listing requests. Downloads are governed by
    /// `transfer.stall_timeout_seconds` instead.
    pub request_timeout_seconds: u64,

    pub page_size: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com/drive/v3".to_string(),
            access_token: None,
            api_key: None,
            request_timeout_seconds: 30,
            page_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub zone_name: String,

    pub access_key: String,

    pub storage_base_url: String,

    /// Public base of the pull zone. Defaults to `https://{zone}.b-cdn.net`.
    pub cdn_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            zone_name: String::new(),
            access_key: String::new(),
            storage_base_url: "https://storage.bunnycdn.com".to_string(),
            cdn_base_url: None,
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.zone_name.is_empty() && !self.access_key.is_empty()
    }

    /// Public URL of an object stored under `path`.
    #[must_use]
    pub fn cdn_url_for(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match &self.cdn_base_url {
            Some(base) => format!("{}/{path}", base.trim_end_matches('/')),
            None => format!("https://{}.b-cdn.net/{path}", self.zone_name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Seconds without a single received chunk before a file is failed (default: 900 = 15 min)
    pub stall_timeout_seconds: u64,

    /// Catalog write attempts after a successful upload (default: 3)
    pub persist_retries: u32,

    pub persist_retry_base_ms: u64,

    /// Batches kept in memory for the status endpoints. Older finished
    /// batches are still available from the database.
    pub max_retained_batches: usize,

    /// Emit a progress event every N MiB transferred
    pub progress_log_interval_mb: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            stall_timeout_seconds: 900,
            persist_retries: 3,
            persist_retry_base_ms: 500,
            max_retained_batches: 50,
            progress_log_interval_mb: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "anikura".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(DRIVE_TOKEN_ENV)
            && !token.is_empty()
        {
            self.drive.access_token = Some(token);
        }

        if let Ok(key) = std::env::var(STORAGE_KEY_ENV)
            && !key.is_empty()
        {
            self.storage.access_key = key;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("anikura").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".anikura").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    /// Checks the settings a transfer needs. Catalog-only use (no storage
    /// configured) is valid; the transfer entry points check
    /// `storage.is_configured()` themselves.
    pub fn validate(&self) -> Result<()> {
        if self.storage.zone_name.is_empty() != self.storage.access_key.is_empty() {
            anyhow::bail!("storage.zone_name and storage.access_key must be set together");
        }

        if self.transfer.persist_retries == 0 {
            anyhow::bail!("transfer.persist_retries must be at least 1");
        }

        if self.transfer.stall_timeout_seconds == 0 {
            anyhow::bail!("transfer.stall_timeout_seconds must be > 0");
        }

        if self.drive.page_size == 0 || self.drive.page_size > 1000 {
            anyhow::bail!("drive.page_size must be between 1 and 1000");
        }

        if self.server.api_keys.iter().any(String::is_empty) {
            anyhow::bail!("server.api_keys cannot contain empty keys");
        }

        Ok(())
    }
}
