// routes.rs
use std::sync::Arc;

use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::get,
    Extension, Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        admin::admin_handler, bookings::bookings_handler, slots::slots_handler,
        subscriptions::subscriptions_handler, wallet::wallet_handler, webhooks::webhooks_handler,
        worker::worker_handler,
    },
    middleware::{auth, role_check},
    models::usermodel::UserType,
    AppState,
};

async fn health_check(Extension(app_state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running",
        "cache": app_state.db_client.cache_status(),
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let admin_routes = admin_handler()
        .layer(middleware::from_fn(|req: Request, next: Next| {
            role_check(req, next, vec![UserType::Admin])
        }))
        .layer(middleware::from_fn(auth));

    // Admins may read an assignment's live location through the same routes.
    let worker_routes = worker_handler()
        .layer(middleware::from_fn(|req: Request, next: Next| {
            role_check(req, next, vec![UserType::Worker, UserType::Admin])
        }))
        .layer(middleware::from_fn(auth));

    let api_route = Router::new()
        .nest("/bookings", bookings_handler().layer(middleware::from_fn(auth)))
        .nest("/services", slots_handler().layer(middleware::from_fn(auth)))
        .nest("/wallet", wallet_handler().layer(middleware::from_fn(auth)))
        .nest(
            "/subscriptions",
            subscriptions_handler().layer(middleware::from_fn(auth)),
        )
        .nest("/worker", worker_routes)
        .nest("/admin", admin_routes)
        .nest("/webhooks", webhooks_handler())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state.clone()));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_route)
        .layer(Extension(app_state))
}
