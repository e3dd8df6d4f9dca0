//! # api-adapters
//!
//! HTTP surface of the roleplay board engine.
//!
//! Handlers only translate between JSON and the `services` layer; every rule
//! lives behind the services. Metrics are always compiled in, the axum router
//! only with the `web-axum` feature.

pub mod dto;
pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;
#[cfg(feature = "web-axum")]
pub mod state;

pub use metrics::Metrics;

#[cfg(feature = "web-axum")]
pub use error::ApiError;
#[cfg(feature = "web-axum")]
pub use state::AppState;

#[cfg(feature = "web-axum")]
use axum::{
    routing::{get, post, put},
    Router,
};

/// Builds the full router with tracing and CORS applied.
///
/// The binary mounts this at the root; tests drive it directly with
/// `tower::ServiceExt::oneshot`.
#[cfg(feature = "web-axum")]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Activity
        .route("/api/activity/schedule", get(handlers::schedule))
        .route("/api/activity/tracker", get(handlers::tracker))
        .route("/api/activity/evaluate", post(handlers::evaluate))
        // Characters
        .route("/api/characters", post(handlers::create_character))
        .route("/api/characters/{id}", get(handlers::get_character))
        .route("/api/characters/{id}/reactivate", post(handlers::reactivate_character))
        .route("/api/characters/{id}/dead", post(handlers::mark_dead))
        .route("/api/characters/{id}/dropdown", put(handlers::set_show_in_dropdown))
        // Threads & posts
        .route("/api/threads", post(handlers::create_thread))
        .route("/api/threads/{id}", get(handlers::view_thread))
        .route("/api/threads/{id}/replies", post(handlers::reply))
        .route("/api/threads/{id}/pin", post(handlers::toggle_pin))
        .route("/api/threads/{id}/archive", post(handlers::archive_thread))
        .route("/api/threads/{id}/eligibility", get(handlers::eligibility))
        .route("/api/posts/{id}", put(handlers::edit_post))
        // Skill points
        .route("/api/skill-actions", get(handlers::skill_actions))
        .route(
            "/api/skill-claims",
            post(handlers::submit_claim).get(handlers::list_claims),
        )
        .route("/api/skill-claims/pending", get(handlers::pending_claims))
        .route("/api/skill-claims/pending/count", get(handlers::pending_claim_count))
        .route("/api/skill-claims/{id}/decision", post(handlers::decide_claim))
        .layer(middleware::cors_policy())
        .layer(middleware::trace_layer())
        .with_state(state)
}
