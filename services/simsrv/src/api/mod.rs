//! REST admin API
//!
//! CRUD over devices and templates, lifecycle control, point value reads
//! and the per-device activity log. Every route is a thin pass-through to
//! [`DeviceManager`].

pub mod dto;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::core::manager::DeviceManager;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<DeviceManager>,
}

/// Build the admin API router
pub fn router(manager: Arc<DeviceManager>) -> Router {
    let state = AppState { manager };

    Router::new()
        .route("/api/health", get(handlers::health))
        .route(
            "/api/devices",
            get(handlers::list_devices).post(handlers::create_device),
        )
        .route(
            "/api/devices/{name}",
            get(handlers::get_device)
                .put(handlers::update_device)
                .delete(handlers::delete_device),
        )
        .route("/api/devices/{name}/start", post(handlers::start_device))
        .route("/api/devices/{name}/stop", post(handlers::stop_device))
        .route("/api/devices/{name}/logs", get(handlers::device_logs))
        .route("/api/devices/{name}/clients", get(handlers::device_clients))
        .route(
            "/api/devices/{name}/units/{unit_id}/points/{point_id}/value",
            get(handlers::point_value),
        )
        .route(
            "/api/templates",
            get(handlers::list_templates).post(handlers::create_template),
        )
        .route(
            "/api/templates/{name}",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route(
            "/api/templates/{name}/instantiate",
            post(handlers::instantiate_template),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
