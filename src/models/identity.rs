// src/models/identity.rs

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Authenticated caller of one request.
///
/// Built by the auth middleware from the JWT and passed explicitly into every
/// engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
}

impl Identity {
    pub fn new(user_id: i64) -> Self {
        Self { user_id }
    }

    /// Fails with `Forbidden` unless the caller is `user_id`.
    pub fn ensure_user(&self, user_id: i64) -> Result<(), AppError> {
        if self.user_id != user_id {
            return Err(AppError::Forbidden(
                "You can only access your own records".to_string(),
            ));
        }
        Ok(())
    }
}
