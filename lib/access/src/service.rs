//! Dashboard services and who may see them.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// A service listed on the dashboard.
///
/// A service that names neither `users` nor `groups` is visible to everyone.
/// Otherwise it is visible to the listed users and to members of any listed
/// group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub url: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
}

impl ServiceConfig {
    /// Creates an unrestricted service.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            icon: String::new(),
            url: url.into(),
            groups: Vec::new(),
            users: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Restricts the service to members of `groups`.
    #[must_use]
    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    /// Restricts the service to the given usernames.
    #[must_use]
    pub fn with_users(mut self, users: Vec<String>) -> Self {
        self.users = users;
        self
    }

    /// Returns true if the service names any users or groups.
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        !self.users.is_empty() || !self.groups.is_empty()
    }

    /// Returns true if `viewer` may see this service.
    #[must_use]
    pub fn is_visible_to(&self, viewer: Viewer<'_>) -> bool {
        match viewer {
            Viewer::Unrestricted => true,
            Viewer::Anonymous => !self.is_restricted(),
            Viewer::User(identity) => {
                !self.is_restricted()
                    || self.users.iter().any(|user| *user == identity.username)
                    || self.groups.iter().any(|group| identity.in_group(group))
            }
        }
    }
}

/// Who is looking at the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer<'a> {
    /// Authentication is disabled; every service is shown.
    Unrestricted,
    /// Authentication is enabled but nobody is signed in.
    Anonymous,
    /// A signed-in user.
    User(&'a Identity),
}

impl<'a> Viewer<'a> {
    /// Maps an optional identity to a viewer when authentication is enabled.
    #[must_use]
    pub fn from_identity(identity: Option<&'a Identity>) -> Self {
        identity.map_or(Self::Anonymous, Self::User)
    }
}

/// Returns the services `viewer` may see, in configuration order.
#[must_use]
pub fn visible_services<'s>(services: &'s [ServiceConfig], viewer: Viewer<'_>) -> Vec<&'s ServiceConfig> {
    services
        .iter()
        .filter(|service| service.is_visible_to(viewer))
        .collect()
}
