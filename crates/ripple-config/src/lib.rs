//! Configuration management for ripple.
//!
//! Parses `ripple.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - every entry of `live_reload.watch`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the directory of static files to serve.
    pub root_dir: Option<PathBuf>,
    /// Override the directories watched for changes.
    pub watch: Option<Vec<PathBuf>>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "ripple.toml";

/// Directories watched when `live_reload.watch` is omitted.
pub const DEFAULT_WATCH_DIRS: [&str; 2] = ["assets", "views"];

const DEFAULT_KEEP_ALIVE_MS: u64 = 1000;
const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Site configuration (paths are relative strings from TOML).
    site: SiteConfigRaw,
    /// Live reload configuration (paths are relative strings from TOML).
    live_reload: LiveReloadConfigRaw,

    /// Resolved site configuration (set after loading).
    #[serde(skip)]
    pub site_resolved: SiteConfig,
    /// Resolved live reload configuration (set after loading).
    #[serde(skip)]
    pub live_reload_resolved: LiveReloadConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7878,
        }
    }
}

/// Raw site configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SiteConfigRaw {
    root_dir: Option<String>,
}

/// Resolved site configuration with absolute paths.
#[derive(Debug, Default)]
pub struct SiteConfig {
    /// Directory whose files are served over HTTP.
    pub root_dir: PathBuf,
}

/// Raw live reload configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LiveReloadConfigRaw {
    enabled: Option<bool>,
    watch: Option<Vec<String>>,
    keep_alive_ms: Option<u64>,
    debounce_ms: Option<u64>,
}

/// Resolved live reload configuration.
#[derive(Debug)]
pub struct LiveReloadConfig {
    /// Whether live reload is enabled.
    pub enabled: bool,
    /// Directories watched recursively for changes.
    pub watch: Vec<PathBuf>,
    /// Idle period after which a session emits a keep-alive marker.
    pub keep_alive: Duration,
    /// Quiet period used to batch filesystem events.
    pub debounce: Duration,
}

impl LiveReloadConfig {
    fn with_base(base: &Path) -> Self {
        Self {
            enabled: true,
            watch: DEFAULT_WATCH_DIRS.iter().map(|d| base.join(d)).collect(),
            keep_alive: Duration::from_millis(DEFAULT_KEEP_ALIVE_MS),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self::with_base(Path::new("."))
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`live_reload.watch[0]`").
        field: String,
        /// Error message (e.g., "${`ASSETS_DIR`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `ripple.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values. The merged result
    /// is validated once more, so a bad override fails the same way a bad file
    /// does.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root_dir) = &settings.root_dir {
            self.site_resolved.root_dir.clone_from(root_dir);
        }
        if let Some(watch) = &settings.watch {
            self.live_reload_resolved.watch.clone_from(watch);
        }
        if let Some(live_reload_enabled) = settings.live_reload_enabled {
            self.live_reload_resolved.enabled = live_reload_enabled;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            site: SiteConfigRaw::default(),
            live_reload: LiveReloadConfigRaw::default(),
            site_resolved: SiteConfig {
                root_dir: base.join("public"),
            },
            live_reload_resolved: LiveReloadConfig::with_base(base),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file and after CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_live_reload()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but it's
        // unlikely to be intentional in a config file
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate live reload configuration.
    ///
    /// Skipped entirely when live reload is disabled.
    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        let live_reload = &self.live_reload_resolved;
        if !live_reload.enabled {
            return Ok(());
        }

        if live_reload.watch.is_empty() {
            return Err(ConfigError::Validation(
                "live_reload.watch cannot be empty".to_owned(),
            ));
        }
        for (i, dir) in live_reload.watch.iter().enumerate() {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "live_reload.watch[{i}] cannot be empty"
                )));
            }
        }

        if live_reload.keep_alive.is_zero() {
            return Err(ConfigError::Validation(
                "live_reload.keep_alive_ms must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref watch) = self.live_reload.watch {
            self.live_reload.watch = Some(expand::expand_env_list(watch, "live_reload.watch")?);
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    ///
    /// Rejects blank `live_reload.watch` entries, which would otherwise
    /// resolve to the config directory itself.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        self.site_resolved = SiteConfig {
            root_dir: config_dir.join(self.site.root_dir.as_deref().unwrap_or("public")),
        };

        let watch = match &self.live_reload.watch {
            Some(dirs) => {
                for (i, dir) in dirs.iter().enumerate() {
                    require_non_empty(dir, &format!("live_reload.watch[{i}]"))?;
                }
                dirs.iter().map(|d| config_dir.join(d)).collect()
            }
            None => DEFAULT_WATCH_DIRS.iter().map(|d| config_dir.join(d)).collect(),
        };

        self.live_reload_resolved = LiveReloadConfig {
            enabled: self.live_reload.enabled.unwrap_or(true),
            watch,
            keep_alive: Duration::from_millis(
                self.live_reload.keep_alive_ms.unwrap_or(DEFAULT_KEEP_ALIVE_MS),
            ),
            debounce: Duration::from_millis(
                self.live_reload.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
            ),
        };

        Ok(())
    }
}
