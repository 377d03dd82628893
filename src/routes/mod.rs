use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod bookings;
pub mod health;

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let job_routes = Router::new()
        .route("/", post(bookings::create_job))
        .route(
            "/:id",
            get(bookings::get_job).patch(bookings::update_job),
        )
        .route("/:id/assignments", get(bookings::list_assignments))
        .route("/:id/accept", post(bookings::accept_job))
        .route("/:id/cancel", post(bookings::cancel_job))
        .route("/:id/end", post(bookings::end_session))
        .route("/:id/no-show", post(bookings::customer_no_show))
        .route("/:id/reopen", post(bookings::reopen_job))
        .route("/:id/expire", post(bookings::expire_job))
        .route("/:id/status", post(bookings::change_status))
        .route("/:id/candidates", get(bookings::list_candidates))
        .route("/:id/resend-push", post(bookings::resend_push))
        .route("/:id/resend-sms", post(bookings::resend_sms));

    Router::new()
        .nest("/api/jobs", job_routes)
        .route("/api/potential-jobs", get(bookings::potential_jobs))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
