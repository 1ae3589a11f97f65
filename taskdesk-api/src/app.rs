/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use taskdesk_api::{app::{build_router, AppState}, config::Config};
/// use taskdesk_shared::repository::memory::MemoryRepository;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let repository = Arc::new(MemoryRepository::new());
/// let state = AppState::new(repository.clone(), repository, config);
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, middleware::security::SecurityHeadersLayer};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use taskdesk_shared::auth::middleware::{require_principal, AuthState};
use taskdesk_shared::repository::{TaskRepository, UserRepository};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Task store
    pub tasks: Arc<dyn TaskRepository>,

    /// User store
    pub users: Arc<dyn UserRepository>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        users: Arc<dyn UserRepository>,
        config: Config,
    ) -> Self {
        Self {
            tasks,
            users,
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    fn auth_state(&self) -> AuthState {
        AuthState::new(self.jwt_secret(), Arc::clone(&self.users))
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                     # Health check (public)
/// └── /v1/
///     ├── /auth/                  # Public
///     │   ├── POST /register
///     │   ├── POST /login
///     │   └── POST /refresh
///     ├── GET  /me                # Bearer token required from here on
///     ├── GET  /dashboard
///     ├── /tasks/
///     │   ├── GET    /            # Paged listing (10 per page)
///     │   ├── POST   /            # Admin only
///     │   ├── GET    /page        # Paged listing (5 per page)
///     │   ├── GET    /export      # CSV
///     │   ├── GET    /:id
///     │   ├── PATCH  /:id
///     │   ├── DELETE /:id
///     │   └── PATCH  /:id/toggle
///     └── /users/                 # Admin only
///         ├── GET    /
///         ├── POST   /
///         ├── GET    /:id
///         ├── PATCH  /:id
///         └── DELETE /:id
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Authentication (per-route basis)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let task_routes = Router::new()
        .route("/", get(routes::tasks::index).post(routes::tasks::store))
        .route("/page", get(routes::tasks::page))
        .route("/export", get(routes::tasks::export))
        .route(
            "/:id",
            get(routes::tasks::show)
                .patch(routes::tasks::update)
                .delete(routes::tasks::destroy),
        )
        .route("/:id/toggle", patch(routes::tasks::toggle));

    let user_routes = Router::new()
        .route("/", get(routes::users::index).post(routes::users::store))
        .route(
            "/:id",
            get(routes::users::show)
                .patch(routes::users::update)
                .delete(routes::users::destroy),
        );

    let protected_routes = Router::new()
        .route("/me", get(routes::auth::me))
        .route("/dashboard", get(routes::dashboard::index))
        .nest("/tasks", task_routes)
        .nest("/users", user_routes)
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_principal,
        ));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .merge(protected_routes);

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
