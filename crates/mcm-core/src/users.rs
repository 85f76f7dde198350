use mcm_model::{EntityQuery, USERS, UserId, UserRecord};
use tracing::debug;

use crate::{error::UserError, store::EntityStore};

/// Account bookkeeping on top of the `users` collection.
///
/// Stores whatever hash it is given; hashing and authentication live elsewhere.
#[derive(Clone)]
pub struct UserDirectory {
    store: EntityStore,
}

impl UserDirectory {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRecord, UserError> {
        if username.is_empty() {
            return Err(UserError::MissingField("username"));
        }
        if password_hash.is_empty() {
            return Err(UserError::MissingField("passwordHash"));
        }

        let user = self
            .store
            .update_or_add(USERS, UserRecord::new(username, password_hash))?;
        debug!(target: "mcm.store", id = ?user.id, username, "user created");
        Ok(user)
    }

    pub fn get(&self, id: UserId) -> Result<Option<UserRecord>, UserError> {
        Ok(self.store.get_one_by_id(USERS, id)?)
    }

    /// First account with exactly this username.
    pub fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, UserError> {
        let query = EntityQuery::new().with("username", username);
        let found: Vec<UserRecord> = self.store.query_with(USERS, &query)?;
        Ok(found.into_iter().next())
    }
}
