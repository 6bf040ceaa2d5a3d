//! # Limiter Registry
//!
//! One [`ConcurrencyLimiter`] per logical resource class, created lazily on
//! first use from [`LimiterConfig`] and shared as `Arc<ConcurrencyLimiter>`.
//! Every caller asking for the same class gets the same limiter, so the
//! capacity bound holds across every component submitting to that class.

use crate::concurrency::limiter::{ConcurrencyLimiter, LimiterMetrics, LimiterStatus};
use crate::config::LimiterConfig;
use crate::error::CoreResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

/// Occupancy and counters of one registered limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceClassStatus {
    pub status: LimiterStatus,
    pub metrics: LimiterMetrics,
}

#[derive(Debug)]
pub struct LimiterRegistry {
    /// Limiters by resource class
    limiters: RwLock<HashMap<String, Arc<ConcurrencyLimiter>>>,

    config: LimiterConfig,
}

impl LimiterRegistry {
    pub fn new(config: LimiterConfig) -> Self {
        info!(
            default_capacity = config.default_capacity,
            configured_classes = config.capacities.len(),
            "Initializing limiter registry"
        );
        Self {
            limiters: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Limiter for `resource_class`, creating it with the configured capacity on first use
    pub fn get_or_create(&self, resource_class: &str) -> CoreResult<Arc<ConcurrencyLimiter>> {
        if let Some(limiter) = self.limiters.read().get(resource_class) {
            return Ok(Arc::clone(limiter));
        }

        let mut limiters = self.limiters.write();

        // Another caller may have created it between the two locks
        if let Some(limiter) = limiters.get(resource_class) {
            return Ok(Arc::clone(limiter));
        }

        let limiter = Arc::new(ConcurrencyLimiter::new(
            resource_class,
            self.config.capacity_for(resource_class),
        )?);
        limiters.insert(resource_class.to_string(), Arc::clone(&limiter));

        info!(
            resource_class,
            capacity = limiter.capacity(),
            total_limiters = limiters.len(),
            "Created limiter for resource class"
        );

        Ok(limiter)
    }

    /// Existing limiter for `resource_class`, without creating one
    pub fn get(&self, resource_class: &str) -> Option<Arc<ConcurrencyLimiter>> {
        self.limiters.read().get(resource_class).cloned()
    }

    /// Registered resource classes, sorted
    pub fn list_resource_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.limiters.read().keys().cloned().collect();
        classes.sort();
        classes
    }

    /// Status of every registered limiter, keyed by resource class
    pub fn system_status(&self) -> BTreeMap<String, ResourceClassStatus> {
        self.limiters
            .read()
            .iter()
            .map(|(class, limiter)| {
                (
                    class.clone(),
                    ResourceClassStatus {
                        status: limiter.status(),
                        metrics: limiter.metrics(),
                    },
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.limiters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.read().is_empty()
    }
}
