//! HTTP API server for a running RETE cluster.

use crate::{
    error::Error,
    metrics::MetricsSnapshot,
    parsing::rdf_parser,
    transport::ClusterHandle,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::{sync::Arc, time::Instant};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info};

/// Response after submitting facts
#[derive(Debug, Serialize)]
pub struct SubmitFactsResponse {
    pub accepted: usize,
    pub in_flight: usize,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    pub facts_per_second: f64,
    pub in_flight: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub rules: usize,
    pub uptime_seconds: f64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Shared application state
pub struct AppState {
    pub cluster: Arc<ClusterHandle>,
    pub rules: usize,
    pub started: Instant,
}

pub enum ApiError {
    BadRequest(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::FactParse(msg) => ApiError::BadRequest(msg),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

/// Create the HTTP server with all routes
pub fn create_server(cluster: Arc<ClusterHandle>, rules: usize) -> Router {
    let state = Arc::new(AppState { cluster, rules, started: Instant::now() });

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/facts", post(submit_facts))
        .route("/metrics", get(metrics))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// GET /health
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        rules: state.rules,
        uptime_seconds: state.started.elapsed().as_secs_f64(),
    })
}

/// POST /facts - body is N-Triples, one fact per line. A bad line rejects the
/// whole request before anything is submitted.
async fn submit_facts(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<SubmitFactsResponse>, ApiError> {
    let facts = rdf_parser::parse_rdf_document(&body)?;
    let accepted = facts.len();
    for fact in facts {
        state.cluster.submit(fact);
    }
    debug!(accepted, "Accepted facts over HTTP");

    Ok(Json(SubmitFactsResponse { accepted, in_flight: state.cluster.in_flight().count() }))
}

/// GET /metrics
async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    let metrics = state.cluster.metrics();
    Json(MetricsResponse {
        facts_per_second: metrics.facts_per_second(),
        metrics,
        in_flight: state.cluster.in_flight().count(),
    })
}

/// Bind `addr` and serve until the process exits.
pub async fn start_server(
    addr: &str,
    cluster: Arc<ClusterHandle>,
    rules: usize,
) -> Result<(), Error> {
    let app = create_server(cluster, rules);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP API listening on http://{}", addr);
    info!("  POST /facts    - Submit N-Triples facts");
    info!("  GET  /metrics  - Engine counters");
    info!("  GET  /health   - Health check");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::metrics::EngineMetrics;
    use crate::nodes::ManualClock;
    use crate::parsing::RuleParser;
    use crate::sinks::CollectingSink;
    use crate::topology::TopologyBuilder;
    use crate::transport::Cluster;
    use std::time::Duration;

    fn state(sink: CollectingSink) -> Arc<AppState> {
        let rules = RuleParser::new()
            .parse_rules("[(?x <http://e/p> ?y) -> (?y <http://e/q> ?x)]")
            .unwrap();
        let config = EngineConfig { feedback: false, ..EngineConfig::default() };
        let topology = TopologyBuilder::new(config).add_rules(rules).build().unwrap();
        let cluster = Cluster::start(
            topology,
            Arc::new(ManualClock::new(0)),
            Arc::new(EngineMetrics::new()),
            vec![Box::new(sink)],
        )
        .unwrap();
        Arc::new(AppState { cluster: Arc::new(cluster), rules: 1, started: Instant::now() })
    }

    #[tokio::test]
    async fn test_submitted_facts_reach_the_sink() {
        let sink = CollectingSink::new();
        let state = state(sink.clone());

        let body = "<http://e/a> <http://e/p> <http://e/b> .\n\
                    <http://e/c> <http://e/p> <http://e/d> .\n";
        let Json(response) =
            submit_facts(State(state.clone()), body.to_string()).await.ok().unwrap();
        assert_eq!(response.accepted, 2);

        tokio::time::timeout(Duration::from_secs(5), state.cluster.wait_idle()).await.unwrap();
        assert_eq!(sink.len(), 2);

        let Json(metrics) = metrics(State(state.clone())).await;
        assert_eq!(metrics.metrics.facts_received, 2);
        assert_eq!(metrics.in_flight, 0);
        state.cluster.stop();
    }

    #[tokio::test]
    async fn test_bad_body_is_rejected_whole() {
        let sink = CollectingSink::new();
        let state = state(sink.clone());

        let body = "<http://e/a> <http://e/p> <http://e/b> .\nnot rdf\n";
        let result = submit_facts(State(state.clone()), body.to_string()).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert_eq!(state.cluster.metrics().facts_received, 0);
        state.cluster.stop();
    }
}
