//! HTTP route table.

pub mod api;
pub mod health;
pub mod webhook;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws::session::ws_handler;

/// Build the application router. Every `/api` route is registered with and
/// without a trailing slash for UI compatibility.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::root))
        .route("/health-check", get(health::health_check))
        .route("/webhook", get(webhook::subscribe).post(webhook::receive))
        .route("/ws", get(ws_handler))
        .route("/api/users", get(api::list_users))
        .route("/api/users/", get(api::list_users))
        .route(
            "/api/conversations",
            get(api::list_conversations).post(api::create_conversation),
        )
        .route(
            "/api/conversations/",
            get(api::list_conversations).post(api::create_conversation),
        )
        .route(
            "/api/messages",
            get(api::list_messages).post(api::create_message),
        )
        .route(
            "/api/messages/",
            get(api::list_messages).post(api::create_message),
        )
}
