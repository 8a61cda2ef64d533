//! goboard web server.
//!
//! Serves a dashboard of configured services, filtered by the signed-in
//! user's name and groups. Users sign in through an external OpenID Connect
//! provider; sessions live in memory for the lifetime of the process.

pub mod app;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod logging;
