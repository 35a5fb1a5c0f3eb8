use std::path::Path;
use std::time::Duration;

use auth_cache::config::Config;

use crate::{TEST_CONFIG, load_config};

#[test]
fn test_load_from_file() {
    let config = load_config(TEST_CONFIG);

    assert!(config.cypress_user_manager.ignore_existing);

    let cache = &config.caching_cypress_user_manager.cache;
    assert_eq!(cache.success_ttl, Duration::from_secs(300));
    assert_eq!(cache.error_ttl, Duration::from_millis(200));
    assert_eq!(cache.fetch_deadline, Duration::from_millis(50));
    assert_eq!(cache.sweep_interval, Duration::ZERO);
    assert_eq!(cache.capacity, None);
}

#[test]
fn test_missing_file() {
    let err = Config::get(Some(Path::new("/nonexistent/auth-cache.yml"))).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"failed to open configuration file");
}

#[test]
fn test_defaults_without_file() {
    let config = Config::get(None).unwrap();
    let cache = &config.caching_cypress_user_manager.cache;

    assert!(config.cypress_user_manager.ignore_existing);
    assert_eq!(cache.success_ttl, Duration::from_secs(300));
    assert_eq!(cache.error_ttl, Duration::from_secs(15));
    assert_eq!(cache.fetch_deadline, Duration::from_secs(30));
}
