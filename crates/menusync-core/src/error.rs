//! Error taxonomy shared by the synchronization layer.
//!
//! Every error is `Clone` so that a single in-flight fetch can hand the same
//! outcome to each caller that joined it.

use thiserror::Error;

use crate::api::TransportError;
use crate::models::ResourceClass;
use crate::decode::DecodeError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Not authenticated - sign in to load this resource")]
    NotAuthenticated,

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Cached {class} value has an unexpected shape for key {key}")]
    TypeMismatch { class: ResourceClass, key: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Whether the error should send the user to the sign-in flow.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            SyncError::NotAuthenticated | SyncError::Transport(TransportError::Unauthorized)
        )
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_login() {
        assert!(SyncError::NotAuthenticated.requires_login());
        assert!(SyncError::from(TransportError::Unauthorized).requires_login());
        assert!(!SyncError::from(TransportError::RateLimited).requires_login());
        assert!(!SyncError::Timeout("orders".into()).requires_login());
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = SyncError::TypeMismatch {
            class: ResourceClass::Order,
            key: "user/u1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cached order value has an unexpected shape for key user/u1"
        );
    }
}
