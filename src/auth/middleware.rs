//! Authentication Middleware
//! Guards protected routes with access-token validation and the revocation list.

use crate::auth::{
    errors::{AuthError, Unauthorized},
    jwt::JwtHandler,
    models::{AuthenticatedUser, PresentedToken},
    revocation::RevocationStore,
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-request authentication
pub struct Gatekeeper {
    jwt: Arc<JwtHandler>,
    revocations: Arc<dyn RevocationStore>,
}

impl Gatekeeper {
    pub fn new(jwt: Arc<JwtHandler>, revocations: Arc<dyn RevocationStore>) -> Self {
        Self { jwt, revocations }
    }

    /// Authenticate an `Authorization` header value.
    ///
    /// The header must be `Bearer <token>`, the token must not be revoked,
    /// and it must verify as an access token. Revocation is checked first.
    pub fn authenticate(
        &self,
        header: Option<&str>,
    ) -> Result<(AuthenticatedUser, PresentedToken), AuthError> {
        let header = header.ok_or(AuthError::MissingToken)?;
        let token = bearer_token(header)?;

        let revoked = self
            .revocations
            .contains(token)
            .map_err(AuthError::StorageFailure)?;
        if revoked {
            return Err(AuthError::TokenRevoked);
        }

        let claims = self.jwt.verify_access(token)?;

        let user = AuthenticatedUser {
            id: claims.sub,
            username: claims.username,
            role: claims.role,
        };
        let presented = PresentedToken {
            token: token.to_string(),
            expires_at: claims.exp,
        };
        Ok((user, presented))
    }
}

/// Split `Bearer <token>` into its token. Exactly two space-separated parts.
fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::InvalidFormat),
    }
}

/// Auth middleware: rejects with 401 or attaches the caller to the request
pub async fn auth_middleware(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Unauthorized> {
    let header = match req.headers().get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| Unauthorized(AuthError::InvalidFormat))?),
        None => None,
    };

    let (user, presented) = gatekeeper.authenticate(header).map_err(|e| {
        match &e {
            AuthError::StorageFailure(cause) => {
                warn!("Revocation check failed, rejecting request: {:#}", cause)
            }
            other => debug!("Rejected {} {}: {}", req.method(), req.uri().path(), other),
        }
        Unauthorized(e)
    })?;

    debug!(
        "User access: {} (role: {}) -> {} {}",
        user.username,
        user.role,
        req.method(),
        req.uri().path()
    );

    // Handlers read these back as extensions
    req.extensions_mut().insert(user);
    req.extensions_mut().insert(presented);

    Ok(next.run(req).await)
}
