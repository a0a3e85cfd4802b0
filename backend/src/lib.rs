pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod types;
pub mod utils;
pub mod validation;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Builds the full HTTP surface: public, device (bearer), and admin (session) routes.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/setup/status", get(handlers::auth::setup_status))
        .route("/api/setup/create-user", post(handlers::auth::setup_create_user))
        .route(
            "/api/uninstall",
            get(handlers::device_api::uninstall_page).post(handlers::device_api::uninstall),
        )
        .route("/api/ws", get(handlers::ws::ws_handler));

    let device_routes = Router::new()
        .route("/api/patterns", get(handlers::device_api::get_patterns))
        .route("/api/requests", post(handlers::device_api::create_request))
        .route("/api/heartbeat", post(handlers::device_api::heartbeat))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_device,
        ));

    let admin_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route(
            "/api/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route(
            "/api/admin/devices",
            get(handlers::admin::devices::list_devices)
                .post(handlers::admin::devices::create_device),
        )
        .route(
            "/api/admin/devices/{id}",
            axum::routing::delete(handlers::admin::devices::delete_device),
        )
        .route(
            "/api/admin/devices/{id}/regenerate-token",
            post(handlers::admin::devices::regenerate_token),
        )
        .route(
            "/api/admin/patterns",
            get(handlers::admin::patterns::list_patterns)
                .post(handlers::admin::patterns::create_pattern),
        )
        .route(
            "/api/admin/patterns/{id}",
            put(handlers::admin::patterns::update_pattern)
                .delete(handlers::admin::patterns::delete_pattern),
        )
        .route(
            "/api/admin/patterns/{id}/toggle",
            post(handlers::admin::patterns::toggle_pattern),
        )
        .route(
            "/api/admin/requests",
            get(handlers::admin::requests::list_requests),
        )
        .route(
            "/api/admin/requests/{id}/approve",
            post(handlers::admin::requests::approve_request),
        )
        .route(
            "/api/admin/requests/{id}/deny",
            post(handlers::admin::requests::deny_request),
        )
        .route(
            "/api/admin/users",
            get(handlers::admin::users::list_users).post(handlers::admin::users::create_user),
        )
        .route(
            "/api/admin/notifications/prefs",
            get(handlers::admin::notifications::get_prefs)
                .put(handlers::admin::notifications::update_prefs),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ));

    let cors = cors_layer(&state.config.cors_allow_origins);

    Router::new()
        .merge(public_routes)
        .merge(device_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(cors),
        )
        .with_state(state)
}

/// Agents call from arbitrary origins; credentials are only allowed for the
/// configured admin origins.
fn cors_layer(allow_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .max_age(Duration::from_secs(24 * 60 * 60));

    let origins: Vec<HeaderValue> = allow_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        return base.allow_origin(Any).allow_headers(Any);
    }
    base.allow_origin(AllowOrigin::list(origins))
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
