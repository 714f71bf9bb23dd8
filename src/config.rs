//! Configuration for the conversion service.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags (applied by the `serve` command)
//! 2. Environment variables (JSON_TO_EXCEL_*)
//! 3. Config file (.json-to-excel/config.yaml)
//! 4. Defaults (localhost:8080, ./downloads, 2 minute validity, 30 second sweep)
//!
//! Config file discovery:
//! - Searches current directory and parents for .json-to-excel/config.yaml
//! - Relative paths in the config file are resolved against the project root
//!   (the parent of .json-to-excel/)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::RegistryConfig;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Directory holding the config file
pub const CONFIG_DIR: &str = ".json-to-excel";

/// Config file name inside [`CONFIG_DIR`]
pub const CONFIG_FILE: &str = "config.yaml";

pub const ENV_HOST: &str = "JSON_TO_EXCEL_HOST";
pub const ENV_PORT: &str = "JSON_TO_EXCEL_PORT";
pub const ENV_PUBLIC_URL: &str = "JSON_TO_EXCEL_PUBLIC_URL";
pub const ENV_DOWNLOAD_DIR: &str = "JSON_TO_EXCEL_DOWNLOAD_DIR";
pub const ENV_VALIDITY_SECS: &str = "JSON_TO_EXCEL_VALIDITY_SECS";
pub const ENV_SWEEP_SECS: &str = "JSON_TO_EXCEL_SWEEP_SECS";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Origin used in download links when the service sits behind a proxy
    pub public_url: Option<String>,
    pub request_timeout_seconds: Option<u64>,
    pub max_body_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactsConfig {
    /// Download directory (relative to the project root)
    pub dir: Option<String>,
    pub validity_seconds: Option<u64>,
    pub sweep_interval_seconds: Option<u64>,
}

/// Resolved configuration
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub server: ServerSettings,
    pub artifacts: ArtifactSettings,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub public_url: Option<String>,
    pub request_timeout_seconds: u64,
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            public_url: None,
            request_timeout_seconds: 15,
            max_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl ServerSettings {
    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Origin that prefixes download links
    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub dir: PathBuf,
    pub validity_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./downloads"),
            validity_seconds: 120,
            sweep_interval_seconds: 30,
        }
    }
}

impl ArtifactSettings {
    /// Registry construction inputs
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            root: self.dir.clone(),
            validity: Duration::from_secs(self.validity_seconds),
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Parse an environment value, naming the variable on failure
fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}

/// Merge defaults, an optional config file and environment lookups
fn resolve(
    file: Option<(&Path, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let mut server = ServerSettings::default();
    let mut artifacts = ArtifactSettings::default();
    let mut config_file = None;

    if let Some((config_path, config)) = file {
        // Project root is the parent of .json-to-excel/
        let base_dir = config_path
            .parent()
            .and_then(|p| p.parent())
            .unwrap_or(Path::new("."));

        if let Some(host) = config.server.host {
            server.host = host;
        }
        server.port = config.server.port.unwrap_or(server.port);
        server.public_url = config.server.public_url.or(server.public_url);
        server.request_timeout_seconds = config
            .server
            .request_timeout_seconds
            .unwrap_or(server.request_timeout_seconds);
        server.max_body_bytes = config.server.max_body_bytes.unwrap_or(server.max_body_bytes);

        if let Some(ref dir) = config.artifacts.dir {
            artifacts.dir = resolve_path(base_dir, dir);
        }
        artifacts.validity_seconds = config
            .artifacts
            .validity_seconds
            .unwrap_or(artifacts.validity_seconds);
        artifacts.sweep_interval_seconds = config
            .artifacts
            .sweep_interval_seconds
            .unwrap_or(artifacts.sweep_interval_seconds);

        config_file = Some(config_path.to_path_buf());
    }

    if let Some(host) = env(ENV_HOST) {
        server.host = host;
    }
    if let Some(port) = parse_env(&env, ENV_PORT)? {
        server.port = port;
    }
    if let Some(url) = env(ENV_PUBLIC_URL) {
        server.public_url = Some(url);
    }
    if let Some(dir) = env(ENV_DOWNLOAD_DIR) {
        artifacts.dir = PathBuf::from(dir);
    }
    if let Some(secs) = parse_env(&env, ENV_VALIDITY_SECS)? {
        artifacts.validity_seconds = secs;
    }
    if let Some(secs) = parse_env(&env, ENV_SWEEP_SECS)? {
        artifacts.sweep_interval_seconds = secs;
    }

    Ok(ResolvedConfig {
        server,
        artifacts,
        config_file,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let env = |key: &str| std::env::var(key).ok();

    match find_config_file() {
        Some(path) => {
            let file = load_config_file(&path)?;
            resolve(Some((&path, file)), env)
        }
        None => resolve(None, env),
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
