pub mod actor;
pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::service::WorkflowEngine;

pub use actor::CurrentActor;
pub use error::ApiError;
pub use handlers::*;

/// 构建路由
pub fn router(engine: Arc<WorkflowEngine>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/invoices", post(submit_invoice).get(list_invoices))
        .route("/api/invoices/:id", get(get_invoice))
        .route("/api/invoices/:id/actions", post(apply_action))
        .route("/api/invoices/:id/audit", get(invoice_audit))
        .route("/api/audit", get(audit_log))
        .route("/api/match/batch", post(batch_match))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::{Backends, MemoryStore};
    use crate::service::{LogNotificationSink, Outbox};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let (outbox, _) = Outbox::spawn(Arc::new(LogNotificationSink));
        let engine = WorkflowEngine::new(
            Backends::shared(Arc::new(MemoryStore::new())),
            outbox,
            &AppConfig::default(),
        )
        .unwrap();
        router(Arc::new(engine))
    }

    #[tokio::test]
    async fn health_passes_through_the_middleware_stack() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn requests_without_actor_headers_are_refused() {
        let response = app()
            .oneshot(Request::get("/api/invoices").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
