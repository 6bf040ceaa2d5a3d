//! # Client Core
//!
//! Service container owning the limiter registry and both caches. It is built
//! once at application start and passed by reference (or `Arc`) to whatever
//! needs it; there is no process-global instance.
//!
//! ```rust,no_run
//! use nestfeed_core::config::CoreConfig;
//! use nestfeed_core::context::ClientCore;
//! use nestfeed_core::source::InMemoryRelationSource;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), nestfeed_core::error::CoreError> {
//! let core = ClientCore::new(CoreConfig::for_development(), Arc::new(InMemoryRelationSource::new()))?;
//!
//! let acting_as = core.identity_relations().resolve("user-1").await?;
//! let following = core.memberships().is_member("user-1", "space-9");
//! # Ok(())
//! # }
//! ```

use crate::cache::{CacheStatsSnapshot, IdentityRelationCache, MembershipSetCache};
use crate::concurrency::{LimiterRegistry, ResourceClassStatus};
use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::source::RelationSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Serializable snapshot of the whole core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreStatus {
    pub environment: String,
    pub observed_at: DateTime<Utc>,
    pub limiters: BTreeMap<String, ResourceClassStatus>,
    pub identity_relation_cache: CacheCounts,
    pub membership_cache: CacheCounts,
}

/// Entry count plus hit/miss counters for one cache
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheCounts {
    pub entries: usize,
    pub stats: CacheStatsSnapshot,
}

impl CoreStatus {
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug)]
pub struct ClientCore {
    config: CoreConfig,
    limiters: Arc<LimiterRegistry>,
    identity_relations: IdentityRelationCache,
    memberships: MembershipSetCache,
}

impl ClientCore {
    /// Validate `config` and build the limiters and caches it describes
    pub fn new(config: CoreConfig, source: Arc<dyn RelationSource>) -> CoreResult<Self> {
        config.validate()?;
        config.log_configuration();

        let limiters = Arc::new(LimiterRegistry::new(config.limiter.clone()));

        let relation_settings = &config.identity_relation_cache;
        let identity_relations = IdentityRelationCache::new(
            Arc::clone(&source),
            limiters.get_or_create(&relation_settings.resource_class)?,
            relation_settings.ttl(),
            relation_settings.timeout(&config.deadline),
        );

        let membership_settings = &config.membership_cache;
        let memberships = MembershipSetCache::new(
            source,
            limiters.get_or_create(&membership_settings.resource_class)?,
            membership_settings.ttl(),
            membership_settings.timeout(&config.deadline),
        );

        info!(
            environment = %config.environment,
            resource_classes = ?limiters.list_resource_classes(),
            "Client core ready"
        );

        Ok(Self {
            config,
            limiters,
            identity_relations,
            memberships,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn limiters(&self) -> &Arc<LimiterRegistry> {
        &self.limiters
    }

    pub fn identity_relations(&self) -> &IdentityRelationCache {
        &self.identity_relations
    }

    pub fn memberships(&self) -> &MembershipSetCache {
        &self.memberships
    }

    pub fn status(&self) -> CoreStatus {
        CoreStatus {
            environment: self.config.environment.clone(),
            observed_at: Utc::now(),
            limiters: self.limiters.system_status(),
            identity_relation_cache: CacheCounts {
                entries: self.identity_relations.len(),
                stats: self.identity_relations.stats(),
            },
            membership_cache: CacheCounts {
                entries: self.memberships.len(),
                stats: self.memberships.stats(),
            },
        }
    }
}
