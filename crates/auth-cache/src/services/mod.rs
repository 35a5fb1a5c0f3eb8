//! Authentication resolutions backed by the remote metadata authority.
//!
//! Every resolution comes in two layers: a thin service that talks to the authority through a
//! [`CypressClient`], and a caching service with the same interface that puts a
//! [`Cacher`](crate::caching::Cacher) in front of it. The main [`create_user_manager`] fn wires
//! both layers together according to the provided [`Config`].

use std::sync::Arc;

use crate::config::Config;

pub mod cypress;
mod user_manager;

pub use cypress::{ClientError, CypressClient, InMemoryCypress};
pub use user_manager::{CachingCypressUserManager, CypressUserManager, UserManager};

/// Creates the user resolution, with a cache in front of the given client.
pub fn create_user_manager(config: &Config, client: Arc<dyn CypressClient>) -> Arc<dyn UserManager> {
    let upstream = Arc::new(CypressUserManager::new(
        config.cypress_user_manager.clone(),
        client,
    ));

    Arc::new(CachingCypressUserManager::new(
        &config.caching_cypress_user_manager,
        upstream,
    ))
}
