//! Identity verification: session principal id to live user record.

use crate::domain::{UserId, UserRecord};
use crate::error::GatewayError;
use crate::persistence::Persistence;

/// Resolves principal ids to the accounts they refer to.
#[derive(Debug, Clone)]
pub struct IdentityVerifier {
    persistence: Persistence,
}

impl IdentityVerifier {
    /// Creates a verifier over the given user store.
    #[must_use]
    pub fn new(persistence: Persistence) -> Self {
        Self { persistence }
    }

    /// Returns the account for `user_id`, or `None` if it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] on store failure.
    pub async fn resolve(&self, user_id: UserId) -> Result<Option<UserRecord>, GatewayError> {
        self.persistence.find_user_by_id(user_id).await
    }
}
