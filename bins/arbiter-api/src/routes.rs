// Route table for the Arbiter API

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/contests/:contest_id/problems/:problem_id/submissions",
            post(handlers::submit_solution),
        )
        .route(
            "/contests/:contest_id/submissions",
            get(handlers::list_submissions),
        )
        .route(
            "/contests/:contest_id/registrations",
            post(handlers::register_contestant),
        )
        .route("/contests/:contest_id/scoreboard", get(handlers::get_scoreboard))
        .route("/submissions/:submission_id", get(handlers::get_submission))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_route_table_builds() {
        // axum validates path syntax when routes are added
        let _router = super::routes();
    }
}
