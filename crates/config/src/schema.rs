use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokenkeep_types::{CaptureDatePolicy, KeepError, traits::Result};

/// Prefix for environment-variable overrides (e.g. `TOKENKEEP_DATABASE`).
pub const ENV_PREFIX: &str = "TOKENKEEP_";

fn default_database() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".tokenkeep").join("tokens.db")
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout_ms() -> u64 {
    5_000
}
fn default_level() -> String {
    "info".to_string()
}

/// Logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence (defaults to `info`).
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `SQLite` database file (defaults to `~/.tokenkeep/tokens.db`).
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Connection pool size (defaults to 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Milliseconds a writer waits on a locked database (defaults to 5000).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Whether an upsert replaces or keeps the stored capture date.
    #[serde(default)]
    pub capture_date: CaptureDatePolicy,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            capture_date: CaptureDatePolicy::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Loads defaults, then the optional YAML file, then `TOKENKEEP_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`KeepError::Config`] if a source cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| KeepError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
database: "/var/lib/tokenkeep/tokens.db"
max_connections: 2
capture_date: preserve_first
log:
  level: debug
  json: true
"#;

    /// Loads `yaml` from a scratch directory; the jail also serializes env access.
    fn load_yaml(yaml: &str) -> Result<Config> {
        let mut loaded = None;
        figment::Jail::expect_with(|jail| {
            jail.create_file("tokenkeep.yaml", yaml)?;
            loaded = Some(Config::load(Some(Path::new("tokenkeep.yaml"))));
            Ok(())
        });
        loaded.unwrap()
    }

    #[test]
    fn test_default_config() {
        let c = Config::default();
        assert!(c.database.ends_with(".tokenkeep/tokens.db"));
        assert_eq!(c.max_connections, 5);
        assert_eq!(c.busy_timeout_ms, 5_000);
        assert_eq!(c.capture_date, CaptureDatePolicy::Overwrite);
        assert_eq!(c.log.level, "info");
        assert!(!c.log.json);
    }

    #[test]
    fn test_load_yaml() {
        let c = load_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.database, PathBuf::from("/var/lib/tokenkeep/tokens.db"));
        assert_eq!(c.max_connections, 2);
        assert_eq!(c.capture_date, CaptureDatePolicy::PreserveFirst);
        assert_eq!(c.log.level, "debug");
        assert!(c.log.json);
    }

    #[test]
    fn test_load_yaml_defaults_applied() {
        let c = load_yaml("busy_timeout_ms: 250\n").unwrap();
        assert_eq!(c.busy_timeout_ms, 250);
        assert_eq!(c.max_connections, 5); // default preserved
    }

    #[test]
    fn test_load_rejects_unknown_policy() {
        let err = load_yaml("capture_date: sometimes\n").unwrap_err();
        assert!(matches!(err, KeepError::Config(_)));
    }

    #[test]
    fn test_load_malformed_yaml_is_config_error() {
        let err = load_yaml("max_connections: [unclosed\n").unwrap_err();
        assert!(matches!(err, KeepError::Config(_)));
    }

    #[test]
    fn test_load_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("tokenkeep.yaml", "max_connections: 3\ndatabase: a.db\n")?;
            jail.set_env("TOKENKEEP_DATABASE", "b.db");
            jail.set_env("TOKENKEEP_LOG__LEVEL", "warn");
            let c = Config::load(Some(Path::new("tokenkeep.yaml")))
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(c.max_connections, 3);
            assert_eq!(c.database, PathBuf::from("b.db"));
            assert_eq!(c.log.level, "warn");
            Ok(())
        });
    }
}
