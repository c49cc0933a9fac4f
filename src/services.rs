//! External collaborator contracts.
//!
//! The pipeline treats user lookup, message listing, and spam
//! classification as opaque remote services with unspecified latency and
//! failure modes. These traits are the whole contract it requires of them;
//! retry policy, if any, belongs behind the implementations.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::pipeline::types::{MessageId, User};

/// Resolves an email address to a user identity.
///
/// Idempotent — may be called concurrently and repeatedly for the same
/// email, and must return the same identity each time.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve_user(&self, email: &str) -> Result<User, ServiceError>;
}

/// Lists the messages belonging to a batch of users.
///
/// Accepts 1..=B users per call and returns the union of message
/// identifiers across all of them.
#[async_trait]
pub trait MessageLister: Send + Sync {
    async fn list_messages(&self, users: &[User]) -> Result<Vec<MessageId>, ServiceError>;
}

/// Classifies one message as spam or not.
///
/// A pure function of its input; no ordering is required across calls.
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn classify(&self, id: MessageId) -> Result<bool, ServiceError>;
}

/// Shared service handles for one pipeline run.
#[derive(Clone)]
pub struct Services {
    pub resolver: Arc<dyn UserResolver>,
    pub lister: Arc<dyn MessageLister>,
    pub classifier: Arc<dyn SpamClassifier>,
}

impl Services {
    pub fn new(
        resolver: Arc<dyn UserResolver>,
        lister: Arc<dyn MessageLister>,
        classifier: Arc<dyn SpamClassifier>,
    ) -> Self {
        Self {
            resolver,
            lister,
            classifier,
        }
    }
}
