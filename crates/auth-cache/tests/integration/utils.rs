use std::io::Write;
use std::sync::Arc;

use auth_cache::config::Config;
use auth_cache::services::{InMemoryCypress, UserManager, create_user_manager};

pub use auth_cache_test::setup;

/// A configuration with short lifetimes and deadlines, and without a background sweep.
pub const TEST_CONFIG: &str = r#"
cypress_user_manager:
  ignore_existing: true
caching_cypress_user_manager:
  cache:
    success_ttl: 5m
    error_ttl: 200ms
    fetch_deadline: 50ms
    sweep_interval: 0s
"#;

/// Loads a [`Config`] the way a process does, from a file on disk.
pub fn load_config(yaml: &str) -> Config {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    Config::get(Some(file.path())).unwrap()
}

/// Creates the caching user resolution in front of a fresh in-memory authority.
pub fn setup_service(config: &Config) -> (Arc<InMemoryCypress>, Arc<dyn UserManager>) {
    let client = Arc::new(InMemoryCypress::new());
    let manager = create_user_manager(config, client.clone());
    (client, manager)
}
