use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for the quill tools.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathsConfig {
    /// Root of the synced content tree (defaults to ~/quill/content)
    pub content_dir: Option<PathBuf>,

    /// Fallback directory for embedded image lookups
    pub media_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    /// Base URL of the remote document-hosting service
    pub base_url: Option<String>,

    /// API token sent with every request
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Delay after startup before creation events are honored
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_settle_ms() -> u64 {
    2000
}

impl Config {
    /// Load configuration from the default location, creating a default
    /// config file on first use.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            let default_config = Self::default();
            let toml_str = toml::to_string_pretty(&default_config)
                .context("Failed to serialize default config")?;
            fs::write(&config_path, toml_str).context("Failed to write default config file")?;
            return Ok(default_config);
        }
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration back to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    /// Resolved path of the config file. The `QUILL_CONFIG` environment
    /// variable overrides the default `~/.config/quill/quill.toml`.
    fn config_path() -> Result<PathBuf> {
        if let Ok(custom_path) = std::env::var("QUILL_CONFIG") {
            return Ok(PathBuf::from(custom_path));
        }
        let home_dir = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home_dir.join(".config").join("quill").join("quill.toml"))
    }

    /// Get the content directory, using the default if not configured.
    /// A leading `~` is expanded to the home directory.
    pub fn content_dir(&self) -> PathBuf {
        match &self.paths.content_dir {
            Some(dir) => expand_tilde(dir),
            None => {
                let home_dir = dirs::home_dir().expect("Cannot determine home directory");
                home_dir.join("quill").join("content")
            }
        }
    }

    /// Media directory with `~` expansion, if configured.
    pub fn media_dir(&self) -> Option<PathBuf> {
        self.paths.media_dir.as_ref().map(|dir| expand_tilde(dir))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if let Some(stripped) = raw.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            let without_sep = stripped.trim_start_matches(std::path::MAIN_SEPARATOR);
            return home.join(without_sep);
        }
    }
    path.to_path_buf()
}

// Global cached configuration: loaded once on first access
lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: Config = Config::load().expect("Failed to load config");
}

/// Get the global cached configuration
pub fn get_config() -> &'static Config {
    &GLOBAL_CONFIG
}
