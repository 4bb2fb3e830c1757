//! Configuration resolution for musivault-api
//!
//! Priority: command-line flag → environment → TOML → compiled default.
//! Flags and their environment fallbacks arrive together from clap; this
//! module merges them with the TOML file.

use musivault_common::config::{
    load_toml_config, CompiledDefaults, DiscogsConfig, ImportConfig, RootFolderInitializer,
    RootFolderResolver, TomlConfig,
};
use musivault_common::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DISCOGS_KEY_ENV_VAR: &str = "MUSIVAULT_DISCOGS_KEY";
pub const DISCOGS_SECRET_ENV_VAR: &str = "MUSIVAULT_DISCOGS_SECRET";

/// Command-line values (already merged with their environment variables)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub root_folder: Option<PathBuf>,
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub bind_address: SocketAddr,
    pub log_level: String,
    pub discogs: DiscogsConfig,
    pub import: ImportConfig,
}

/// Non-empty, non-whitespace credential
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn pick_credential(name: &str, env_value: Option<String>, toml_value: Option<String>) -> Option<String> {
    if let Some(value) = env_value.filter(|v| is_valid_key(v)) {
        if toml_value.as_deref().is_some_and(is_valid_key) {
            warn!("Discogs {} set in both environment and TOML, using environment", name);
        }
        info!("Discogs {} loaded from environment variable", name);
        return Some(value.trim().to_string());
    }

    toml_value
        .filter(|v| is_valid_key(v))
        .map(|v| v.trim().to_string())
}

/// Apply environment credential overrides to the TOML Discogs section
pub fn resolve_discogs_config(
    mut discogs: DiscogsConfig,
    env_key: Option<String>,
    env_secret: Option<String>,
) -> DiscogsConfig {
    discogs.consumer_key = pick_credential("consumer key", env_key, discogs.consumer_key.take());
    discogs.consumer_secret =
        pick_credential("consumer secret", env_secret, discogs.consumer_secret.take());
    discogs
}

/// Bind address from flag/env, then TOML, then default; `port` replaces the port
pub fn resolve_bind_address(
    cli_bind: Option<&str>,
    port: Option<u16>,
    toml_config: &TomlConfig,
) -> Result<SocketAddr> {
    let defaults = CompiledDefaults::for_current_platform();
    let raw = cli_bind
        .or(toml_config.bind_address.as_deref())
        .unwrap_or(&defaults.bind_address);

    let mut addr: SocketAddr = raw
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", raw, e)))?;
    if let Some(port) = port {
        addr.set_port(port);
    }
    Ok(addr)
}

impl ServiceConfig {
    /// Resolve from flags, environment and the TOML file
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let toml_config = load_toml_config(cli.config.as_deref())?;
        Self::from_parts(
            cli,
            toml_config,
            std::env::var(DISCOGS_KEY_ENV_VAR).ok(),
            std::env::var(DISCOGS_SECRET_ENV_VAR).ok(),
        )
    }

    /// Resolve from an already loaded TOML file and explicit credential overrides
    pub fn from_parts(
        cli: &CliOverrides,
        toml_config: TomlConfig,
        env_key: Option<String>,
        env_secret: Option<String>,
    ) -> Result<Self> {
        let root_folder = RootFolderResolver::new(cli.root_folder.clone()).resolve(&toml_config);
        let database_path = RootFolderInitializer::new(root_folder.clone()).database_path();
        let bind_address = resolve_bind_address(cli.bind.as_deref(), cli.port, &toml_config)?;

        Ok(Self {
            root_folder,
            database_path,
            bind_address,
            log_level: toml_config.logging.level.clone(),
            discogs: resolve_discogs_config(toml_config.discogs, env_key, env_secret),
            import: toml_config.import,
        })
    }

    /// Fail when the Discogs credential pair is incomplete
    pub fn require_discogs_credentials(&self) -> Result<()> {
        match (&self.discogs.consumer_key, &self.discogs.consumer_secret) {
            (Some(_), Some(_)) => Ok(()),
            _ => Err(Error::Config(format!(
                "Discogs credentials not configured. Set {} and {}, or \
                 consumer_key/consumer_secret in the [discogs] section of the config file",
                DISCOGS_KEY_ENV_VAR, DISCOGS_SECRET_ENV_VAR
            ))),
        }
    }
}
