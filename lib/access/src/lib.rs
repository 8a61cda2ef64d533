//! Identity, session, and service-visibility types for goboard.
//!
//! This crate provides:
//! - Authentication configuration (`AuthConfig`)
//! - The per-request user identity decoded from ID-token claims (`Identity`)
//! - Session records and the token material they carry (`Session`, `SessionId`, `TokenSet`)
//! - Login-flow bookkeeping (`PendingAuthRequest`, `LoginChallenge`)
//! - Service visibility rules (`ServiceConfig`, `Viewer`)
//! - The authentication error taxonomy (`AuthenticationError`)
//!
//! Nothing in here performs I/O; the server crate owns the stores and the
//! identity-provider client.
//!
//! # Example
//!
//! ```
//! use goboard_access::{Identity, ServiceConfig, Viewer, visible_services};
//!
//! let services = vec![
//!     ServiceConfig::new("Wiki", "https://wiki.example.com"),
//!     ServiceConfig::new("Grafana", "https://grafana.example.com")
//!         .with_groups(vec!["ops".to_string()]),
//! ];
//!
//! let alice = Identity::new("alice").with_groups(["ops"]);
//! assert_eq!(visible_services(&services, Viewer::User(&alice)).len(), 2);
//! assert_eq!(visible_services(&services, Viewer::Anonymous).len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod pending;
pub mod service;
pub mod session;

pub use config::{AuthConfig, AuthConfigBuilder};
pub use error::AuthenticationError;
pub use identity::Identity;
pub use pending::{LoginChallenge, PendingAuthRequest};
pub use service::{ServiceConfig, Viewer, visible_services};
pub use session::{Session, SessionId, TokenSet};
