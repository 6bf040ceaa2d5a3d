//! Shared setup for integration tests

#![allow(dead_code)]

pub mod strategies;

use nestfeed_core::{ClientCore, CoreConfig, InMemoryRelationSource};
use std::sync::Arc;
use std::time::Duration;

/// `ClientCore` on test presets over an in-memory source the test can steer
pub fn test_core() -> (ClientCore, Arc<InMemoryRelationSource>) {
    test_core_with(CoreConfig::for_test())
}

pub fn test_core_with(config: CoreConfig) -> (ClientCore, Arc<InMemoryRelationSource>) {
    let source = Arc::new(InMemoryRelationSource::new());
    let core = ClientCore::new(config, source.clone()).expect("test config is valid");
    (core, source)
}

/// Let spawned background work run; with paused time this also lets the clock advance
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
