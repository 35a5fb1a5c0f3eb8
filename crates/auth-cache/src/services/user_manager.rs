//! Resolution of user names to the ids of their user objects.
//!
//! Resolving a user creates its object on first use, so the resolution is an idempotent
//! `create-or-get` that always yields the same id for the same name.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::caching::{CacheContents, CacheError, CacheStats, Cacher, FetchFunction};
use crate::config::{CachingCypressUserManagerConfig, CypressUserManagerConfig};
use crate::types::{CreateObjectOptions, ObjectId, ObjectType};

use super::cypress::{ClientError, CypressClient};

/// Resolves user names to the ids of their user objects.
pub trait UserManager: fmt::Debug + Send + Sync {
    /// Creates the user object for `name`, or returns the existing one.
    fn create_user(&self, name: &str) -> BoxFuture<'static, CacheContents<ObjectId>>;
}

/// A [`UserManager`] that asks the metadata authority on every call.
#[derive(Debug)]
pub struct CypressUserManager {
    config: CypressUserManagerConfig,
    client: Arc<dyn CypressClient>,
}

impl CypressUserManager {
    pub fn new(config: CypressUserManagerConfig, client: Arc<dyn CypressClient>) -> Self {
        Self { config, client }
    }
}

impl UserManager for CypressUserManager {
    fn create_user(&self, name: &str) -> BoxFuture<'static, CacheContents<ObjectId>> {
        tracing::debug!(name, "Creating user object");

        let ignore_existing = self.config.ignore_existing;
        let mut options = CreateObjectOptions {
            ignore_existing,
            ..Default::default()
        };
        options.attributes.insert("name".into(), name.into());

        let request = self.client.create_object(ObjectType::User, options);
        let name = name.to_owned();

        Box::pin(async move {
            let result = match request.await {
                Ok(id) => Ok(id),
                Err(ClientError::AlreadyExists { existing }) if ignore_existing => Ok(existing),
                Err(err) => {
                    tracing::debug!(name, error = %err, "Failed to create user object");
                    Err(CacheError::Upstream(err.to_string()))
                }
            };

            let status = if result.is_ok() { "ok" } else { "error" };
            metric!(counter("services.users.create") += 1, "status" => status);
            result
        })
    }
}

/// The fetch function of the [`CachingCypressUserManager`].
#[derive(Debug, Clone)]
struct CreateUserRequest {
    upstream: Arc<dyn UserManager>,
}

impl FetchFunction<String, ObjectId> for CreateUserRequest {
    fn fetch(&self, name: String) -> BoxFuture<'static, CacheContents<ObjectId>> {
        self.upstream.create_user(&name)
    }
}

/// A [`UserManager`] that memoizes the resolutions of another one.
///
/// Concurrent resolutions of the same name share one upstream request.
#[derive(Debug, Clone)]
pub struct CachingCypressUserManager {
    cache: Cacher<String, ObjectId, CreateUserRequest>,
}

impl CachingCypressUserManager {
    pub fn new(config: &CachingCypressUserManagerConfig, upstream: Arc<dyn UserManager>) -> Self {
        let request = CreateUserRequest { upstream };
        Self {
            cache: Cacher::new("cypress_users", config.cache.clone(), request),
        }
    }

    /// Forgets the resolution of `name`.
    pub fn invalidate(&self, name: &str) {
        self.cache.invalidate(&name.to_owned());
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl UserManager for CachingCypressUserManager {
    fn create_user(&self, name: &str) -> BoxFuture<'static, CacheContents<ObjectId>> {
        self.cache.get(name.to_owned())
    }
}
