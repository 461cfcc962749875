//! API module providing the HTTP surface of the pizza service.
//!
//! This module is organized into submodules:
//! - `auth` - Dual-mode bearer authentication middleware and extractors
//! - `account` - Local accounts (/auth/*)
//! - `pizza` - Pizza resource (/pizzas/*)
//! - `health` - Liveness and database ping (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration
//!
//! The OAuth2 routes live in [`crate::oauth2`] and are merged in here.

pub mod account;
pub mod auth;
pub mod health;
pub mod openapi;
pub mod pizza;

pub use health::OPS_TAG;

use crate::AppResources;
use crate::oauth2::{self, OAuth2State};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Assembles every route with its middleware. Used by the server and by tests.
pub fn build_router(app_resources: AppResources, oauth2_state: OAuth2State) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/pizzas", pizza::router(oauth2_state.clone()))
        .nest("/auth", account::router(oauth2_state.clone()))
        .merge(oauth2::clients::router(oauth2_state.clone()))
        .merge(oauth2::router(oauth2_state))
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(app_resources, oauth2_state))]
pub async fn start_webserver(
    app_resources: AppResources,
    oauth2_state: OAuth2State,
) -> color_eyre::Result<()> {
    let addr = app_resources.config.listen_addr.clone();
    let router = build_router(app_resources, oauth2_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
