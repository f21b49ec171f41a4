//! Client config: backend base URL and named endpoint paths.
//! Layers, lowest first: built-in defaults, `~/.medkb/config.yaml`, then the
//! `MEDKB_API_BASE_URL` environment variable.

use std::path::{Path, PathBuf};

/// Environment variable overriding the backend base URL.
pub const BASE_URL_ENV: &str = "MEDKB_API_BASE_URL";

/// Environment variable pointing at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "MEDKB_CONFIG";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Named endpoint paths, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub chat: String,
    pub sources: String,
    pub health: String,
    pub documents: String,
    pub upload: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            chat: "/api/chat".into(),
            sources: "/api/sources".into(),
            health: "/api/health".into(),
            documents: "/api/documents".into(),
            upload: "/api/documents/upload".into(),
        }
    }
}

/// API section (base_url, endpoints).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
}

/// Full config file schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
}

impl Config {
    /// Base URL with the built-in default applied.
    pub fn base_url(&self) -> &str {
        self.api.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Join the base URL and an endpoint path, tolerating a trailing `/` on
    /// the base and a missing leading `/` on the path.
    pub fn build_url(&self, endpoint: &str) -> String {
        join_url(self.base_url(), endpoint)
    }

    /// Apply the environment layer. An empty variable is ignored.
    pub fn with_env_override(mut self) -> Self {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                self.api.base_url = Some(url.to_string());
            }
        }
        self
    }
}

pub(crate) fn join_url(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    if endpoint.is_empty() {
        base.to_string()
    } else if endpoint.starts_with('/') {
        format!("{}{}", base, endpoint)
    } else {
        format!("{}/{}", base, endpoint)
    }
}

/// Returns the default config file path: `~/.medkb/config.yaml` (platform-specific).
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".medkb").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Pick the config file: explicit override, then `MEDKB_CONFIG`, then the default path.
pub fn resolve_config_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = override_path {
        return Some(p.to_path_buf());
    }
    if let Some(val) = std::env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(val));
    }
    default_config_path()
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let contents = serde_yaml::to_string(config).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, contents).map_err(io_err)
}

/// Resolve the effective config once at startup.
///
/// A missing file falls back to defaults; a file that exists but cannot be
/// read or parsed is an error. The environment override is applied last.
pub fn resolve(override_path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match resolve_config_path(override_path) {
        Some(path) if path.exists() => {
            tracing::debug!(path = %path.display(), "loading config file");
            load(&path)?
        }
        Some(path) => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        }
        None => Config::default(),
    };
    Ok(file.with_env_override())
}

/// Config load/save error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
