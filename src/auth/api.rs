//! Authentication API Endpoints
//! Login, refresh, logout, and the current-user lookup.

use crate::auth::{
    errors::AuthError,
    models::{
        AuthenticatedUser, LoginRequest, LoginResponse, MessageResponse, PresentedToken,
        RefreshRequest, RefreshResponse,
    },
    service::SessionService,
};
use axum::{extract::State, Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;
use tracing::{error, info};

pub const REFRESH_COOKIE: &str = "refresh_token";

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<SessionService>,
    pub cookie_secure: bool,
}

impl AuthState {
    pub fn new(service: Arc<SessionService>, cookie_secure: bool) -> Self {
        Self {
            service,
            cookie_secure,
        }
    }

    fn refresh_cookie(&self, value: String, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build((REFRESH_COOKIE, value))
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(max_age_secs))
            .build()
    }

    /// Same attributes as the live cookie, empty and already expired
    fn expired_refresh_cookie(&self) -> Cookie<'static> {
        self.refresh_cookie(String::new(), 0)
    }
}

/// Session work touches SQLite and bcrypt; keep it off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::Internal(e.into()))?
}

/// Login endpoint - POST /login
pub async fn login(
    State(state): State<AuthState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AuthError> {
    info!("Login attempt: {}", payload.username);

    let service = state.service.clone();
    let outcome =
        run_blocking(move || service.login(&payload.username, &payload.password)).await?;

    let expires_in = outcome.access.lifetime_secs();
    let cookie_max_age = outcome.refresh.lifetime_secs();
    let cookie = state.refresh_cookie(outcome.refresh.token.clone(), cookie_max_age);

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            access_token: outcome.access.token,
            refresh_token: outcome.refresh.token,
            token_type: "Bearer".to_string(),
            expires_in,
        }),
    ))
}

/// Refresh endpoint - POST /refresh
/// The refresh token comes from the JSON body if given, otherwise from the cookie.
pub async fn refresh(
    State(state): State<AuthState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<Json<RefreshResponse>, AuthError> {
    let token = body
        .and_then(|Json(req)| req.refresh_token)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            jar.get(REFRESH_COOKIE)
                .map(|c| c.value().to_string())
                .filter(|t| !t.is_empty())
        })
        .ok_or(AuthError::MissingToken)?;

    let service = state.service.clone();
    let access = run_blocking(move || service.refresh(&token)).await?;

    let expires_in = access.lifetime_secs();
    Ok(Json(RefreshResponse {
        access_token: access.token,
        token_type: "Bearer".to_string(),
        expires_in,
    }))
}

/// Logout endpoint - POST /logout (behind the auth middleware)
/// Always succeeds once the caller is authenticated, and always expires the refresh cookie.
pub async fn logout(
    State(state): State<AuthState>,
    Extension(user): Extension<AuthenticatedUser>,
    Extension(presented): Extension<PresentedToken>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let service = state.service.clone();
    let result = run_blocking(move || {
        service.logout(&user, &presented);
        Ok(())
    })
    .await;
    if let Err(e) = result {
        error!("Logout task failed: {}", e);
    }

    (
        jar.add(state.expired_refresh_cookie()),
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    )
}

/// Current user - GET /me
/// Built from the verified token, no store lookup.
pub async fn get_current_user(
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<AuthenticatedUser> {
    Json(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        clock::SystemClock, jwt::JwtHandler, models::Role, password::CredentialVerifier,
        revocation::InMemoryRevocationStore, user_store::UserStore,
    };
    use axum::{http::header::SET_COOKIE, response::IntoResponse};
    use tempfile::NamedTempFile;

    fn test_state(cookie_secure: bool) -> (AuthState, Arc<UserStore>, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = Arc::new(UserStore::new(temp.path().to_str().unwrap(), 4).unwrap());
        let clock = Arc::new(SystemClock);
        let jwt = Arc::new(JwtHandler::new("a", "b", clock.clone()).unwrap());
        let service = SessionService::new(
            CredentialVerifier::new(store.clone(), 4).unwrap(),
            store.clone(),
            store.clone(),
            Arc::new(InMemoryRevocationStore::new(clock)),
            jwt,
        );
        (AuthState::new(Arc::new(service), cookie_secure), store, temp)
    }

    #[test]
    fn test_refresh_cookie_attributes() {
        let (state, _store, _temp) = test_state(true);

        let cookie = state.refresh_cookie("r1".to_string(), 604_800);
        assert_eq!(cookie.name(), REFRESH_COOKIE);
        assert_eq!(cookie.value(), "r1");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(604_800)));
    }

    #[tokio::test]
    async fn test_logout_expires_cookie_without_incoming_cookie() {
        let (state, store, _temp) = test_state(false);
        store.create_user("alice", "correct", Role::Student).unwrap();
        let outcome = state.service.login("alice", "correct").unwrap();

        let presented = PresentedToken {
            token: outcome.access.token.clone(),
            expires_at: outcome.access.expires_at,
        };
        let response = logout(
            State(state),
            Extension(outcome.user.clone()),
            Extension(presented),
            CookieJar::new(),
        )
        .await
        .into_response();

        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .expect("logout must expire the refresh cookie")
            .to_str()
            .unwrap();
        assert!(set_cookie.starts_with("refresh_token=;"));
        assert!(set_cookie.contains("Max-Age=0"));
        assert!(set_cookie.contains("Path=/"));
        assert!(set_cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_empty_body_token_falls_back_to_cookie() {
        let (state, store, _temp) = test_state(false);
        store.create_user("alice", "correct", Role::Student).unwrap();
        let outcome = state.service.login("alice", "correct").unwrap();

        let jar = CookieJar::new().add(Cookie::new(REFRESH_COOKIE, outcome.refresh.token));
        let body = Json(RefreshRequest {
            refresh_token: Some(String::new()),
        });

        let Json(response) = refresh(State(state), jar, Some(body)).await.unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert!(!response.access_token.is_empty());
    }
}
