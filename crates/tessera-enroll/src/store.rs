//! The persistence seam between the state machine and the outside world.
//!
//! The real user database is an external collaborator; the machine only
//! needs two operations over one record. [`MemoryStore`] is the reference
//! implementation used by tests and demos — there is deliberately no
//! process-wide singleton or file-backed fallback here.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::EnrollError;
use crate::state::EnrollmentState;

/// Key-value persistence for per-user enrollment state.
///
/// A user with no stored record loads as [`EnrollmentState::Disabled`];
/// `setup` is the creating write. Implementations translate their own I/O
/// failures into [`EnrollError::Store`].
pub trait UserStore: Send + Sync {
    /// Load the enrollment state for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::Store`] on backend failure.
    fn load(&self, user_id: &str) -> Result<EnrollmentState, EnrollError>;

    /// Persist the enrollment state for `user_id`, replacing any prior value.
    ///
    /// # Errors
    ///
    /// Returns [`EnrollError::Store`] on backend failure.
    fn save(&self, user_id: &str, state: &EnrollmentState) -> Result<(), EnrollError>;
}

/// In-memory store: a mutex-guarded map.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, EnrollmentState>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryStore {
    fn load(&self, user_id: &str) -> Result<EnrollmentState, EnrollError> {
        let records = self
            .records
            .lock()
            .map_err(|e| EnrollError::Store(format!("memory store lock poisoned: {e}")))?;
        Ok(records.get(user_id).cloned().unwrap_or_default())
    }

    fn save(&self, user_id: &str, state: &EnrollmentState) -> Result<(), EnrollError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| EnrollError::Store(format!("memory store lock poisoned: {e}")))?;
        records.insert(user_id.to_owned(), state.clone());
        Ok(())
    }
}
