//! SIS auth backend
//!
//! Login, dual-token issuance, refresh, and logout for the school
//! information system. Binaries and integration tests build on [`routes::App`].

pub mod auth;
pub mod config;
pub mod middleware;
pub mod routes;
