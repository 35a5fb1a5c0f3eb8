//! The boundary to the remote metadata authority.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use thiserror::Error;

use crate::types::{CreateObjectOptions, ObjectId, ObjectType};

/// An error reported by the metadata authority.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The object to create exists already, and `ignore_existing` was not set.
    #[error("object already exists as {existing}")]
    AlreadyExists { existing: ObjectId },
    /// The authority refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
    /// The authority could not be reached or failed internally.
    #[error("authority unavailable: {0}")]
    Unavailable(String),
}

/// A client of the metadata authority.
pub trait CypressClient: fmt::Debug + Send + Sync {
    /// Creates an object, or returns the existing one when `ignore_existing` is set.
    fn create_object(
        &self,
        object_type: ObjectType,
        options: CreateObjectOptions,
    ) -> BoxFuture<'static, Result<ObjectId, ClientError>>;
}

#[derive(Debug, Default)]
struct InMemoryState {
    objects: BTreeMap<(ObjectType, String), ObjectId>,
    calls: usize,
    latency: Duration,
    failure: Option<ClientError>,
    hang: bool,
}

/// A [`CypressClient`] that keeps all objects in memory.
///
/// Objects are identified by their type and `name` attribute and receive random ids. Latency,
/// failures and hangs can be injected to simulate an unhealthy authority.
#[derive(Debug, Default)]
pub struct InMemoryCypress {
    state: Mutex<InMemoryState>,
}

impl InMemoryCypress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every response by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// Answers all following requests with `failure`, or resumes normal operation on `None`.
    pub fn set_failure(&self, failure: Option<ClientError>) {
        self.state.lock().failure = failure;
    }

    /// Makes all following requests never complete.
    pub fn set_hang(&self, hang: bool) {
        self.state.lock().hang = hang;
    }

    /// The number of `create_object` calls so far.
    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    /// Looks up an existing object.
    pub fn lookup(&self, object_type: ObjectType, name: &str) -> Option<ObjectId> {
        let state = self.state.lock();
        state.objects.get(&(object_type, name.to_owned())).copied()
    }

    /// Creates an object without going through the client interface.
    pub fn insert(&self, object_type: ObjectType, name: &str) -> ObjectId {
        let mut state = self.state.lock();
        *state
            .objects
            .entry((object_type, name.to_owned()))
            .or_insert_with(ObjectId::random)
    }

    fn resolve(
        state: &mut InMemoryState,
        object_type: ObjectType,
        options: &CreateObjectOptions,
    ) -> Result<ObjectId, ClientError> {
        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }
        let Some(name) = options.name() else {
            return Err(ClientError::Rejected(format!(
                "{object_type} requires a name attribute"
            )));
        };

        match state.objects.entry((object_type, name.to_owned())) {
            Entry::Occupied(entry) if options.ignore_existing => Ok(*entry.get()),
            Entry::Occupied(entry) => Err(ClientError::AlreadyExists {
                existing: *entry.get(),
            }),
            Entry::Vacant(entry) => Ok(*entry.insert(ObjectId::random())),
        }
    }
}

impl CypressClient for InMemoryCypress {
    fn create_object(
        &self,
        object_type: ObjectType,
        options: CreateObjectOptions,
    ) -> BoxFuture<'static, Result<ObjectId, ClientError>> {
        let mut state = self.state.lock();
        state.calls += 1;
        let result = Self::resolve(&mut state, object_type, &options);
        let latency = state.latency;
        let hang = state.hang;
        drop(state);

        Box::pin(async move {
            if hang {
                future::pending::<()>().await;
            }
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }
}
