//! Data source seam between the domain model and the upstream SimRail API.
//!
//! Entities only ever talk to a [`TrainApi`], so tests can script responses
//! and embedders can swap the transport.

pub mod models;
pub mod rest;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use self::models::{ServerSnapshot, StationSnapshot, TimetableSnapshot, TrainSnapshot};

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Diagnostic record published for every upstream request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLog {
    /// Unique request ID for correlation
    pub id: String,
    /// When the request was made (RFC 3339)
    pub timestamp: String,
    pub method: String,
    pub endpoint: String,
    /// Query parameters sent with the request
    pub params: Option<std::collections::HashMap<String, String>>,
    pub duration_ms: u64,
    /// HTTP status code (0 when no response was received)
    pub status: u16,
    /// Response body size in bytes
    pub response_size: Option<usize>,
    pub error: Option<String>,
}

/// Async access to the two upstream endpoints.
///
/// Single-key lookups fail with [`ApiError::NotFound`] when the key is
/// unknown, except [`TrainApi::active_train`] where an absent train is a
/// valid `Ok(None)` outcome.
pub trait TrainApi: Send + Sync {
    fn active_servers(&self) -> BoxFuture<'_, Result<Vec<ServerSnapshot>, ApiError>>;

    fn active_server<'a>(
        &'a self,
        server_code: &'a str,
    ) -> BoxFuture<'a, Result<ServerSnapshot, ApiError>>;

    fn active_stations<'a>(
        &'a self,
        server_code: &'a str,
    ) -> BoxFuture<'a, Result<Vec<StationSnapshot>, ApiError>>;

    fn active_station<'a>(
        &'a self,
        server_code: &'a str,
        station_code: &'a str,
    ) -> BoxFuture<'a, Result<StationSnapshot, ApiError>>;

    fn active_trains<'a>(
        &'a self,
        server_code: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TrainSnapshot>, ApiError>>;

    fn active_train<'a>(
        &'a self,
        server_code: &'a str,
        train_number: &'a str,
    ) -> BoxFuture<'a, Result<Option<TrainSnapshot>, ApiError>>;

    fn timetable<'a>(
        &'a self,
        server_code: &'a str,
        train_number: &'a str,
    ) -> BoxFuture<'a, Result<TimetableSnapshot, ApiError>>;
}
