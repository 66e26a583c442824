//! Authentication Module
//! Credential checks, dual-token issuance, single-session refresh, and revocation on logout.

pub mod api;
pub mod clock;
pub mod errors;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod revocation;
pub mod service;
pub mod user_store;

pub use api::AuthState;
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::AuthError;
pub use jwt::JwtHandler;
pub use middleware::{auth_middleware, Gatekeeper};
pub use password::CredentialVerifier;
pub use revocation::{InMemoryRevocationStore, RevocationStore};
pub use service::SessionService;
pub use user_store::{IdentityStore, SessionStore, UserStore};
