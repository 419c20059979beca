//! API routes

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use dialwave_core::{CampaignManager, CampaignScheduler, Clock, OutcomeProcessor};
use dialwave_storage::DatabasePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, health, outcomes, scheduler};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CampaignManager>,
    pub outcomes: OutcomeProcessor,
    pub scheduler: Arc<CampaignScheduler>,
    pub clock: Arc<dyn Clock>,
    /// PostgreSQL pool for readiness checks; `None` with the in-memory store
    pub db_pool: Option<DatabasePool>,
    /// Shared secret for call outcome callbacks
    pub outcome_secret: Option<String>,
}

/// Create the API router
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let state = Arc::new(state);

    // Health check routes
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/", post(campaigns::create_campaign))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id/pause", post(campaigns::pause_campaign))
        .route("/:campaign_id/resume", post(campaigns::resume_campaign))
        .route("/:campaign_id/cancel", post(campaigns::cancel_campaign))
        .route(
            "/:campaign_id/contacts/:contact_id/attempts",
            get(campaigns::list_attempts),
        );

    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .route("/call-outcomes", post(outcomes::record_call_outcome))
        .route("/scheduler/tick", post(scheduler::run_tick))
        .with_state(state);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    cors.allow_origin(origins)
}
