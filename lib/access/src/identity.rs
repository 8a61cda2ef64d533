//! The authenticated user's identity.
//!
//! An `Identity` is never stored: it is decoded from the current ID token on
//! every request and lives only as long as that request.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Gravatar image size in pixels.
const AVATAR_SIZE: u32 = 80;

/// User identity decoded from verified ID-token claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The `preferred_username` claim.
    pub username: String,
    /// The `email` claim.
    pub email: String,
    /// The `groups` claim.
    pub groups: BTreeSet<String>,
}

impl Identity {
    /// Creates an identity with the given username and no email or groups.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Sets the email claim.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Sets the groups.
    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the user belongs to `group`.
    #[must_use]
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Returns the user's Gravatar URL, or `None` when no email is known.
    #[must_use]
    pub fn avatar_url(&self) -> Option<String> {
        let email = self.email.trim();
        if email.is_empty() {
            return None;
        }
        let digest = Sha256::digest(email.to_lowercase().as_bytes());
        Some(format!(
            "https://www.gravatar.com/avatar/{digest:x}?s={AVATAR_SIZE}&d=retro"
        ))
    }
}
