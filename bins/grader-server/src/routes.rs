use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;

use crate::handlers::{self, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Participant surface
        .route("/api/challenges", get(handlers::list_challenges))
        .route("/api/challenges/:id", get(handlers::get_challenge))
        .route("/api/challenges/:id/submit", post(handlers::submit))
        .route(
            "/api/challenges/:id/leaderboard",
            get(handlers::get_leaderboard),
        )
        .route(
            "/api/challenges/:id/replay/:participant",
            get(handlers::get_replay),
        )
        // Administrative surface
        .route(
            "/api/admin/challenges",
            get(handlers::admin_list_challenges).post(handlers::admin_create_challenge),
        )
        .route(
            "/api/admin/challenges/order",
            put(handlers::admin_reorder),
        )
        .route(
            "/api/admin/challenges/order/repair",
            post(handlers::admin_repair_order),
        )
        .route(
            "/api/admin/challenges/:id",
            patch(handlers::admin_update_challenge).delete(handlers::admin_delete_challenge),
        )
        .route(
            "/api/admin/challenges/:id/leaderboard/:participant",
            delete(handlers::admin_remove_leaderboard_entry),
        )
}
