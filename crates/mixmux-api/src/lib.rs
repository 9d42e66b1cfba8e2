//! Axum HTTP API for the merge pipeline.
//!
//! This crate provides:
//! - Merge endpoints for URL and multipart inputs, streaming the result
//! - Background music catalog listing
//! - Health, readiness and Prometheus metrics endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, CatalogConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
