//! # Client Core Configuration
//!
//! Configuration for the limiters, deadlines and caches of the client core.
//! Values come from environment-specific presets, optionally layered with a
//! TOML file and `NESTFEED__SECTION__KEY` environment variables (see
//! [`ConfigLoader`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nestfeed_core::config::CoreConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CoreConfig::from_environment();
//! config.validate()?;
//!
//! let ttl = config.membership_cache.ttl();
//! let capacity = config.limiter.capacity_for("memberships");
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

pub use loader::ConfigLoader;

/// Resource class used by the identity relation cache unless configured otherwise
pub const IDENTITY_RELATIONS_RESOURCE: &str = "identity_relations";

/// Resource class used by the membership cache unless configured otherwise
pub const MEMBERSHIPS_RESOURCE: &str = "memberships";

/// Root configuration for the client core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Environment name the configuration was built for
    pub environment: String,

    /// Concurrency limits per resource class
    pub limiter: LimiterConfig,

    /// Default caller-side deadline for remote reads
    pub deadline: DeadlineConfig,

    /// "Who acts through which resource" cache
    pub identity_relation_cache: CacheTypeConfig,

    /// Per-identity membership set cache
    pub membership_cache: CacheTypeConfig,
}

/// Concurrency limiter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Capacity for resource classes without an explicit entry
    pub default_capacity: usize,

    /// Explicit capacity per resource class
    #[serde(default)]
    pub capacities: HashMap<String, usize>,
}

impl LimiterConfig {
    pub fn capacity_for(&self, resource_class: &str) -> usize {
        self.capacities
            .get(resource_class)
            .copied()
            .unwrap_or(self.default_capacity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineConfig {
    pub default_timeout_ms: u64,
}

impl DeadlineConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Settings for one cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTypeConfig {
    /// Time after which an entry is stale
    pub ttl_ms: u64,

    /// Limiter resource class the cache submits its remote reads through
    pub resource_class: String,

    /// Per-read deadline; falls back to [`DeadlineConfig::default_timeout_ms`]
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl CacheTypeConfig {
    fn new(ttl_ms: u64, resource_class: &str) -> Self {
        Self {
            ttl_ms,
            resource_class: resource_class.to_string(),
            timeout_ms: None,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn timeout(&self, deadline: &DeadlineConfig) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| deadline.default_timeout())
    }
}

impl Default for CoreConfig {
    /// Production settings
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            limiter: LimiterConfig {
                default_capacity: 6,
                capacities: HashMap::from([
                    (IDENTITY_RELATIONS_RESOURCE.to_string(), 4),
                    (MEMBERSHIPS_RESOURCE.to_string(), 4),
                ]),
            },
            deadline: DeadlineConfig {
                default_timeout_ms: 10_000,
            },
            identity_relation_cache: CacheTypeConfig::new(60_000, IDENTITY_RELATIONS_RESOURCE),
            membership_cache: CacheTypeConfig::new(30_000, MEMBERSHIPS_RESOURCE),
        }
    }
}

impl CoreConfig {
    /// Short TTLs and deadlines for rapid test feedback
    pub fn for_test() -> Self {
        Self {
            environment: "test".to_string(),
            limiter: LimiterConfig {
                default_capacity: 2,
                capacities: HashMap::from([
                    (IDENTITY_RELATIONS_RESOURCE.to_string(), 2),
                    (MEMBERSHIPS_RESOURCE.to_string(), 2),
                ]),
            },
            deadline: DeadlineConfig {
                default_timeout_ms: 500,
            },
            identity_relation_cache: CacheTypeConfig::new(1_000, IDENTITY_RELATIONS_RESOURCE),
            membership_cache: CacheTypeConfig::new(1_000, MEMBERSHIPS_RESOURCE),
        }
    }

    pub fn for_development() -> Self {
        Self {
            environment: "development".to_string(),
            limiter: LimiterConfig {
                default_capacity: 4,
                capacities: HashMap::from([
                    (IDENTITY_RELATIONS_RESOURCE.to_string(), 3),
                    (MEMBERSHIPS_RESOURCE.to_string(), 3),
                ]),
            },
            deadline: DeadlineConfig {
                default_timeout_ms: 5_000,
            },
            identity_relation_cache: CacheTypeConfig::new(10_000, IDENTITY_RELATIONS_RESOURCE),
            membership_cache: CacheTypeConfig::new(5_000, MEMBERSHIPS_RESOURCE),
        }
    }

    /// Preset for a named environment; unknown names get production settings
    pub fn for_environment(environment: &str) -> Self {
        match environment {
            "test" => Self::for_test(),
            "development" => Self::for_development(),
            other => Self {
                environment: other.to_string(),
                ..Self::default()
            },
        }
    }

    /// Preset for the environment named by `NESTFEED_ENV` or `APP_ENV`
    pub fn from_environment() -> Self {
        let environment = detect_environment();
        info!(environment = %environment, "Loading client core configuration preset");
        Self::for_environment(&environment)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.limiter.default_capacity == 0 {
            return Err(CoreError::Configuration(
                "limiter.default_capacity must be at least 1".to_string(),
            ));
        }
        if let Some((class, _)) = self.limiter.capacities.iter().find(|(_, c)| **c == 0) {
            return Err(CoreError::Configuration(format!(
                "limiter capacity for '{class}' must be at least 1"
            )));
        }
        if self.deadline.default_timeout_ms == 0 {
            return Err(CoreError::Configuration(
                "deadline.default_timeout_ms must be greater than 0".to_string(),
            ));
        }

        for (name, cache) in [
            ("identity_relation_cache", &self.identity_relation_cache),
            ("membership_cache", &self.membership_cache),
        ] {
            if cache.ttl_ms == 0 {
                return Err(CoreError::Configuration(format!(
                    "{name}.ttl_ms must be greater than 0"
                )));
            }
            if cache.resource_class.trim().is_empty() {
                return Err(CoreError::Configuration(format!(
                    "{name}.resource_class must not be empty"
                )));
            }
            if cache.timeout_ms == Some(0) {
                return Err(CoreError::Configuration(format!(
                    "{name}.timeout_ms must be greater than 0"
                )));
            }
            if cache.timeout(&self.deadline) > cache.ttl() {
                warn!(
                    cache = name,
                    timeout_ms = duration_ms(cache.timeout(&self.deadline)),
                    ttl_ms = cache.ttl_ms,
                    "Cache read deadline is longer than its TTL"
                );
            }
        }

        Ok(())
    }

    pub fn log_configuration(&self) {
        info!("Client Core Configuration:");
        info!("  Environment: {}", self.environment);
        info!(
            "  Limiter: default capacity {}, {} explicit resource classes",
            self.limiter.default_capacity,
            self.limiter.capacities.len()
        );
        info!("  Deadline: {}ms", self.deadline.default_timeout_ms);
        info!(
            "  Identity Relation Cache: {}ms TTL via '{}'",
            self.identity_relation_cache.ttl_ms, self.identity_relation_cache.resource_class
        );
        info!(
            "  Membership Cache: {}ms TTL via '{}'",
            self.membership_cache.ttl_ms, self.membership_cache.resource_class
        );
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn detect_environment() -> String {
    env::var("NESTFEED_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}
