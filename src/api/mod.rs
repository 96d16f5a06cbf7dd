pub mod handlers;

use crate::models::PageSize;
use crate::service::{AllocationStore, CandidateResolver, SessionRegistry};
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub resolver: Arc<CandidateResolver>,
    pub store: Arc<dyn AllocationStore>,
    pub default_page_size: PageSize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/documents", get(handlers::search_documents))
        .route("/api/sessions", post(handlers::create_session))
        .route("/api/sessions/:id", get(handlers::get_session))
        .route("/api/sessions/:id/documents/:bucket", put(handlers::select_document))
        .route("/api/sessions/:id/candidates/:bucket", get(handlers::search_candidates))
        .route("/api/sessions/:id/rows", post(handlers::add_row))
        .route(
            "/api/sessions/:id/rows/:bucket/:document_id/:item_code",
            delete(handlers::remove_row),
        )
        .route("/api/sessions/:id/additional-cost", put(handlers::set_additional_cost))
        .route("/api/sessions/:id/export.csv", get(handlers::export_csv))
        .route("/api/sessions/:id/submit", post(handlers::submit))
        // 请求日志
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
