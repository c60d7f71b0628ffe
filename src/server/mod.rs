//! Inbound webhook.
//!
//! Thin layer over the engine: validates the job description, acknowledges
//! with 202, runs the workflow in a background task and hands the result to
//! the notifier. Malformed input never reaches the workflow core.

pub mod notify;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use viabot_core_types::ViabilityJob;
use workflow_engine::WorkflowEngine;

use self::notify::Notifier;

pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub notifier: Arc<Notifier>,
    started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>, notifier: Arc<Notifier>) -> Self {
        Self {
            engine,
            notifier,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/webhook/viability", post(submit_viability))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "viability workflow webhook",
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn submit_viability(
    State(state): State<Arc<AppState>>,
    Json(job): Json<ViabilityJob>,
) -> impl IntoResponse {
    if let Err(err) = job.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": err.to_string(),
            })),
        );
    }

    info!(
        enterprise = job.enterprise_id,
        name = %job.enterprise_name,
        city = %job.city,
        "viability request accepted"
    );

    let state = state.clone();
    tokio::spawn(async move {
        let result = state.engine.execute(&job).await;
        if result.success {
            info!(
                enterprise = result.enterprise_id,
                protocol = %result.protocol_number,
                attempts = result.attempts,
                "workflow finished"
            );
        } else {
            error!(
                enterprise = result.enterprise_id,
                attempts = result.attempts,
                status = %result.status,
                "workflow failed"
            );
        }
        state.notifier.notify(&result).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": "request accepted and queued for processing",
            "timestamp": Utc::now().to_rfc3339(),
            "estimated_time": "5-10 minutes",
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use surface_adapter::mock::{MockLauncher, MockSession};
    use tower::ServiceExt;
    use workflow_engine::{
        EngineSettings, MemoryArtifactStore, SequencerConfig, WorkflowEngine,
    };
    use viabot_core_types::{Credentials, FiscalRepresentative, RequestDefaults};

    fn test_state() -> Arc<AppState> {
        let sequencer = SequencerConfig::new(
            Credentials {
                cpf: "11122233344".into(),
                password: "hunter2".into(),
            },
            FiscalRepresentative {
                name: "Maria".into(),
                cpf: "55566677788".into(),
                phone: "81999990000".into(),
            },
            RequestDefaults {
                institution: "OAB".into(),
                state_registry_requested: "Não".into(),
                commercial_establishment_area: "25".into(),
                property_sequential_number: "7654321".into(),
                sepul_protocol: None,
                built_area: "25".into(),
                requestor_phone: "81988887777".into(),
            },
        );
        let settings = EngineSettings::new("https://portal.example/login", sequencer);
        let launcher = Arc::new(MockLauncher::single(Arc::new(MockSession::lenient())));
        let engine = Arc::new(WorkflowEngine::new(
            launcher,
            Arc::new(MemoryArtifactStore::new()),
            settings,
        ));
        Arc::new(AppState::new(engine, Arc::new(Notifier::disabled())))
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_ownership_is_rejected_before_the_engine() {
        let app = router(test_state());
        let body = serde_json::json!({
            "enterpriseId": 42,
            "enterpriseName": "ACME",
            "enterprisePurpose": "Consultoria",
            "city": "RECIFE",
            "state": "PE",
            "townRegistry": "7654321",
            "ownershipStructure": [],
        });
        let response = app
            .oneshot(
                Request::post("/webhook/viability")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_request_is_acknowledged_with_202() {
        let app = router(test_state());
        let body = serde_json::json!({
            "enterpriseId": 42,
            "enterpriseName": "ACME",
            "enterprisePurpose": "Consultoria",
            "city": "RECIFE",
            "state": "PE",
            "townRegistry": "7654321",
            "ownershipStructure": [{"cpf": "00000000000"}],
        });
        let response = app
            .oneshot(
                Request::post("/webhook/viability")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
