//! User directory port, used to resolve email recipients.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::UserId;

use crate::error::SagaError;

/// The slice of the user account this subsystem reads.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

/// Read-only user lookup.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user by ID.
    async fn find(&self, user_id: UserId) -> Result<Option<User>, SagaError>;
}

/// In-memory user directory for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUsers {
    users: Arc<RwLock<HashMap<UserId, User>>>,
}

impl InMemoryUsers {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user.
    pub fn insert(&self, user: User) {
        self.users.write().unwrap().insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUsers {
    async fn find(&self, user_id: UserId) -> Result<Option<User>, SagaError> {
        Ok(self.users.read().unwrap().get(&user_id).cloned())
    }
}
