//! Store configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/tabula/config.toml)
//! 3. Environment variables (TABULA_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "TABULA";

/// Database name that selects an in-memory SQLite database
pub const IN_MEMORY: &str = ":memory:";

/// Connection settings plus id generation knobs
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database host
    #[serde(default = "default_host")]
    pub host: String,

    /// Database user
    #[serde(default)]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Database name; a file path or `:memory:` for SQLite
    #[serde(default = "default_database")]
    pub database: String,

    /// Driver used to reach the database
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Length of ids generated by `push`
    #[serde(default = "default_id_length")]
    pub id_length: usize,

    /// Collision retries allowed in `push` (0 = unbounded)
    #[serde(default = "default_max_id_attempts")]
    pub max_id_attempts: usize,

    /// Log file for the CLI (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            user: String::new(),
            password: String::new(),
            database: default_database(),
            driver: default_driver(),
            id_length: default_id_length(),
            max_id_attempts: default_max_id_attempts(),
            log_file: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("driver", &self.driver)
            .field("id_length", &self.id_length)
            .field("max_id_attempts", &self.max_id_attempts)
            .field("log_file", &self.log_file)
            .finish()
    }
}

impl Config {
    /// Build a configuration from the four connection fields
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Configuration for a private in-memory database
    pub fn in_memory() -> Self {
        Self {
            database: IN_MEMORY.to_string(),
            ..Self::default()
        }
    }

    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (TABULA_HOST, TABULA_DATABASE, ...)
    /// 2. Config file (~/.config/tabula/config.toml or TABULA_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok();

        if let Some(val) = var("HOST") {
            self.host = val;
        }
        if let Some(val) = var("USER") {
            self.user = val;
        }
        if let Some(val) = var("PASSWORD") {
            self.password = val;
        }
        if let Some(val) = var("DATABASE") {
            self.database = val;
        }
        if let Some(val) = var("DRIVER") {
            self.driver = val;
        }
    }

    /// Save configuration to a file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with TABULA_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabula")
            .join("config.toml")
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == IN_MEMORY
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

/// Default database file under the local data directory
fn default_database() -> String {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tabula")
        .join("tabula.db")
        .to_string_lossy()
        .into_owned()
}

fn default_driver() -> String {
    "sqlite".to_string()
}

fn default_id_length() -> usize {
    10
}

fn default_max_id_attempts() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "TABULA_HOST",
        "TABULA_USER",
        "TABULA_PASSWORD",
        "TABULA_DATABASE",
        "TABULA_DRIVER",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.driver, "sqlite");
        assert_eq!(config.id_length, 10);
        assert!(config.database.ends_with("tabula.db"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = Config::new("db.local", "joe", "hunter2", "app");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_env_override_connection_fields() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("TABULA_DATABASE", "/tmp/tabula-test.db");
        env::set_var("TABULA_USER", "svc");
        config.apply_env_overrides();

        assert_eq!(config.database, "/tmp/tabula-test.db");
        assert_eq!(config.user, "svc");
        assert_eq!(config.host, "localhost");
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            host = "db.example.com"
            user = "app"
            password = "secret"
            database = ":memory:"
            max_id_attempts = 0
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.password, "secret");
        assert!(config.is_in_memory());
        assert_eq!(config.max_id_attempts, 0);
        assert_eq!(config.id_length, 10);
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::new("h", "u", "p", "/data/app.db");
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.host, "h");
        assert_eq!(loaded.database, "/data/app.db");
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.driver, "sqlite");
    }
}
