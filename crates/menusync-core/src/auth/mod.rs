//! Identity of the signed-in user.
//!
//! Token management is opaque to the sync layer. All it needs is
//! [`Identity::current_user_id`]; `None` means orders cannot be fetched.

pub mod session;

pub use session::{Session, SessionData};

use std::sync::Mutex;

use crate::utils::lock_unpoisoned;

pub trait Identity: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// Identity set programmatically, for embedding and tests.
#[derive(Debug, Default)]
pub struct FixedIdentity {
    user_id: Mutex<Option<String>>,
}

impl FixedIdentity {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Mutex::new(Some(user_id.into())),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn set(&self, user_id: Option<String>) {
        *lock_unpoisoned(&self.user_id) = user_id;
    }
}

impl Identity for FixedIdentity {
    fn current_user_id(&self) -> Option<String> {
        lock_unpoisoned(&self.user_id).clone()
    }
}
