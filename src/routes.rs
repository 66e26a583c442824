//! Router assembly and component wiring.

use crate::auth::{
    api as auth_api, auth_middleware, AuthState, Clock, CredentialVerifier, Gatekeeper,
    InMemoryRevocationStore, JwtHandler, SessionService, UserStore,
};
use crate::config::Config;
use crate::middleware::request_logging;
use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Everything the server needs, wired together
pub struct App {
    pub router: Router,
    pub users: Arc<UserStore>,
    pub revocations: Arc<InMemoryRevocationStore>,
    pub jwt: Arc<JwtHandler>,
}

impl App {
    pub fn build(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let users = Arc::new(UserStore::new(&config.auth_db_path, config.bcrypt_cost)?);
        info!("Auth database ready at: {}", config.auth_db_path);

        let jwt = Arc::new(
            JwtHandler::new(&config.access_secret, &config.refresh_secret, clock.clone())?
                .with_lifetimes(
                    chrono::Duration::seconds(config.access_ttl_secs),
                    chrono::Duration::seconds(config.refresh_ttl_secs),
                ),
        );
        let revocations = Arc::new(InMemoryRevocationStore::new(clock));

        let verifier = CredentialVerifier::new(users.clone(), config.bcrypt_cost)?;
        let service = Arc::new(SessionService::new(
            verifier,
            users.clone(),
            users.clone(),
            revocations.clone(),
            jwt.clone(),
        ));
        let gatekeeper = Arc::new(Gatekeeper::new(jwt.clone(), revocations.clone()));

        let router = build_router(
            AuthState::new(service, config.refresh_cookie_secure),
            gatekeeper,
        );

        Ok(Self {
            router,
            users,
            revocations,
            jwt,
        })
    }
}

pub fn build_router(auth_state: AuthState, gatekeeper: Arc<Gatekeeper>) -> Router {
    // Public auth routes
    let auth_routes = Router::new()
        .route("/login", post(auth_api::login))
        .route("/refresh", post(auth_api::refresh))
        .with_state(auth_state.clone());

    // Protected routes
    let protected_routes = Router::new()
        .route("/logout", post(auth_api::logout))
        .route("/me", get(auth_api::get_current_user))
        .route_layer(middleware::from_fn_with_state(gatekeeper, auth_middleware))
        .with_state(auth_state);

    let public_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health_check() -> &'static str {
    "OK"
}
