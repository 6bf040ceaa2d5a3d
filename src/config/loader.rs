//! Configuration Loader
//!
//! Layers configuration sources in increasing priority:
//!
//! 1. the environment preset ([`CoreConfig::for_environment`])
//! 2. an optional TOML file
//! 3. `NESTFEED__SECTION__KEY` environment variables, e.g.
//!    `NESTFEED__MEMBERSHIP_CACHE__TTL_MS=15000` or
//!    `NESTFEED__LIMITER__CAPACITIES__PHOTOS=2`
//!
//! The merged result is deserialized and validated before it is returned.

use super::{detect_environment, CoreConfig};
use crate::error::{CoreError, CoreResult};
use ::config::{Config, Environment, File, Map};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_VAR: &str = "NESTFEED_CONFIG";

const ENV_PREFIX: &str = "NESTFEED";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    environment: String,
    config_file: Option<PathBuf>,
    env_vars: Option<Map<String, String>>,
}

impl ConfigLoader {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            config_file: None,
            env_vars: None,
        }
    }

    /// Loader for the detected environment, reading the file named by `NESTFEED_CONFIG` if set
    pub fn from_env() -> Self {
        let loader = Self::new(detect_environment());
        match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => loader.with_file(path),
            Err(_) => loader,
        }
    }

    /// Layer a TOML file over the preset. A missing file is skipped.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Use `vars` instead of the process environment for overrides
    pub fn with_env_vars(mut self, vars: Map<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    pub fn load(&self) -> CoreResult<CoreConfig> {
        let preset = CoreConfig::for_environment(&self.environment);
        let mut builder = Config::builder().add_source(Config::try_from(&preset)?);

        if let Some(path) = &self.config_file {
            debug!(path = %path.display(), "Layering configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(self.env_vars.clone()),
        );

        let mut config: CoreConfig = builder
            .build()?
            .try_deserialize()
            .map_err(|e| CoreError::Configuration(format!("invalid configuration: {e}")))?;
        config.environment = self.environment.clone();

        config.validate()?;

        info!(
            environment = %config.environment,
            config_file = ?self.config_file,
            "Client core configuration loaded"
        );
        debug!(
            "Effective configuration: {}",
            serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MEMBERSHIPS_RESOURCE;
    use std::io::Write;

    fn no_env() -> Map<String, String> {
        Map::new()
    }

    #[test]
    fn test_load_preset_without_file() {
        let config = ConfigLoader::new("test")
            .with_env_vars(no_env())
            .load()
            .unwrap();

        assert_eq!(config, CoreConfig::for_test());
    }

    #[test]
    fn test_file_overrides_preset() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[deadline]
default_timeout_ms = 1234

[membership_cache]
ttl_ms = 42
resource_class = "memberships"
timeout_ms = 100

[limiter.capacities]
photos = 9
"#
        )
        .unwrap();

        let config = ConfigLoader::new("development")
            .with_file(file.path())
            .with_env_vars(no_env())
            .load()
            .unwrap();

        assert_eq!(config.environment, "development");
        assert_eq!(config.deadline.default_timeout_ms, 1234);
        assert_eq!(config.membership_cache.ttl_ms, 42);
        assert_eq!(config.membership_cache.timeout_ms, Some(100));
        assert_eq!(config.limiter.capacity_for("photos"), 9);
        assert_eq!(config.limiter.capacity_for(MEMBERSHIPS_RESOURCE), 3);
    }

    #[test]
    fn test_env_vars_override_file() {
        let vars = Map::from([
            (
                "NESTFEED__IDENTITY_RELATION_CACHE__TTL_MS".to_string(),
                "2500".to_string(),
            ),
            (
                "NESTFEED__LIMITER__DEFAULT_CAPACITY".to_string(),
                "8".to_string(),
            ),
        ]);

        let config = ConfigLoader::new("production")
            .with_env_vars(vars)
            .load()
            .unwrap();

        assert_eq!(config.identity_relation_cache.ttl_ms, 2500);
        assert_eq!(config.limiter.default_capacity, 8);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config = ConfigLoader::new("test")
            .with_file("does/not/exist.toml")
            .with_env_vars(no_env())
            .load()
            .unwrap();

        assert_eq!(config, CoreConfig::for_test());
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let vars = Map::from([(
            "NESTFEED__LIMITER__DEFAULT_CAPACITY".to_string(),
            "0".to_string(),
        )]);

        let result = ConfigLoader::new("test").with_env_vars(vars).load();

        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }
}
