//! Configuration loading and root folder resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MUSIVAULT_CONFIG";

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "MUSIVAULT_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "musivault.db";

/// Logging section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Discogs API section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscogsConfig {
    /// Consumer key of the Discogs application
    pub consumer_key: Option<String>,
    /// Consumer secret of the Discogs application
    pub consumer_secret: Option<String>,
    /// User-Agent sent with every request (required by Discogs)
    pub user_agent: String,
    /// Minimum delay between two outbound requests
    pub min_request_interval_ms: u64,
    /// Retries after a 429 response before the lookup fails
    pub max_retries: u32,
    /// Fixed wait before retrying a rate-limited request
    pub retry_wait_ms: u64,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for DiscogsConfig {
    fn default() -> Self {
        Self {
            consumer_key: None,
            consumer_secret: None,
            user_agent: format!("Musivault/{}", env!("CARGO_PKG_VERSION")),
            min_request_interval_ms: 1000,
            max_retries: 3,
            retry_wait_ms: 2000,
            request_timeout_secs: 30,
        }
    }
}

/// Import pipeline section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// Poll interval advertised to clients
    pub poll_interval_ms: u64,
    /// Hard limit on one job's run time, unlimited when absent
    pub job_timeout_secs: Option<u64>,
    /// Largest accepted upload
    pub max_upload_bytes: usize,
    /// Largest accepted number of data rows per file
    pub max_rows: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            job_timeout_secs: None,
            max_upload_bytes: 5 * 1024 * 1024,
            max_rows: 5000,
        }
    }
}

/// Contents of `config.toml`
///
/// Every field is optional; a missing file or section falls back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub logging: LoggingConfig,
    pub discogs: DiscogsConfig,
    pub import: ImportConfig,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }
}

/// Compiled fallbacks used when no other source provides a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_address: "127.0.0.1:5780".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/musivault (or /var/lib/musivault for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("musivault"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/musivault"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("musivault"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/musivault"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("musivault"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\musivault"))
    } else {
        PathBuf::from("./musivault_data")
    }
}

/// Candidate config file locations, in lookup order
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("musivault").join("config.toml"));
    }
    if cfg!(target_os = "linux") {
        paths.push(PathBuf::from("/etc/musivault/config.toml"));
    }
    paths
}

/// Load the TOML configuration
///
/// An explicit path (CLI flag or `MUSIVAULT_CONFIG`) must exist and parse.
/// Without one, the default locations are searched; finding none is not an
/// error and yields the defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

    if let Some(path) = explicit {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        return TomlConfig::from_toml_str(&content);
    }

    for path in default_config_paths() {
        if !path.exists() {
            debug!("No config file at {}", path.display());
            continue;
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        return TomlConfig::from_toml_str(&content);
    }

    warn!("No config file found, using compiled defaults");
    Ok(TomlConfig::default())
}

/// Root folder resolution: CLI → ENV → TOML → compiled default
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self { cli_arg }
    }

    pub fn resolve(&self, toml_config: &TomlConfig) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &toml_config.root_folder {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder: {}", self.root_folder.display());
        }
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}
