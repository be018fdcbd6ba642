//! HTTP adapter for a running cluster
//!
//! Provides REST endpoints for:
//! - Fact ingestion (N-Triples request bodies)
//! - Engine metrics
//! - Health checks

pub mod server;

pub use server::{
    create_server, start_server, AppState, ErrorResponse, HealthResponse, MetricsResponse,
    SubmitFactsResponse,
};
