//! Configuration loading from the shipped sample file and from temp files

use nestfeed_core::config::ConfigLoader;
use nestfeed_core::{ClientCore, CoreError, InMemoryRelationSource};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn sample_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/nestfeed.toml")
}

#[test]
fn test_sample_config_loads_and_builds_core() {
    let config = assert_ok!(ConfigLoader::new("production")
        .with_file(sample_config_path())
        .with_env_vars(HashMap::new())
        .load());

    assert_eq!(config.environment, "production");
    assert_eq!(config.limiter.capacity_for("photos"), 2);
    assert_eq!(config.limiter.capacity_for("comments"), 6);
    assert_eq!(
        config.membership_cache.timeout(&config.deadline),
        Duration::from_secs(5)
    );
    assert_eq!(
        config.identity_relation_cache.timeout(&config.deadline),
        Duration::from_secs(10)
    );

    let core = assert_ok!(ClientCore::new(
        config,
        Arc::new(InMemoryRelationSource::new())
    ));
    assert_eq!(
        core.limiters().get("memberships").map(|l| l.capacity()),
        Some(4)
    );
}

#[test]
fn test_malformed_file_is_a_configuration_error() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[limiter\ndefault_capacity = ").unwrap();

    let error = assert_err!(ConfigLoader::new("test")
        .with_file(file.path())
        .with_env_vars(HashMap::new())
        .load());

    assert!(matches!(error, CoreError::Configuration(_)));
}

#[test]
fn test_env_override_reaches_nested_map() {
    let vars = HashMap::from([(
        "NESTFEED__LIMITER__CAPACITIES__PHOTOS".to_string(),
        "1".to_string(),
    )]);

    let config = assert_ok!(ConfigLoader::new("development")
        .with_file(sample_config_path())
        .with_env_vars(vars)
        .load());

    assert_eq!(config.environment, "development");
    assert_eq!(config.limiter.capacity_for("photos"), 1);
    assert_eq!(config.limiter.capacity_for("listings"), 3);
}

#[test]
fn test_zero_ttl_in_file_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[identity_relation_cache]\nttl_ms = 0").unwrap();

    let error = assert_err!(ConfigLoader::new("test")
        .with_file(file.path())
        .with_env_vars(HashMap::new())
        .load());

    assert!(matches!(error, CoreError::Configuration(message) if message.contains("ttl_ms")));
}
