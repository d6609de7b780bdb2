use chrono::Utc;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::models::{
    LiveDataResponse, ServerSnapshot, StationSnapshot, TimetableSnapshot, TrainSnapshot,
};
use super::{ApiError, RequestLog, TrainApi};
use crate::config::Config;

/// Capacity of the request diagnostics channel
const DIAGNOSTICS_CHANNEL_CAPACITY: usize = 100;

/// HTTP client for the SimRail live data and timetable endpoints.
///
/// The upstream only exposes collection routes, so single-key lookups
/// filter the collection responses.
pub struct RestApi {
    client: Client,
    config: Config,
    /// Sender for request diagnostics
    diagnostics_tx: broadcast::Sender<RequestLog>,
}

impl RestApi {
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let (diagnostics_tx, _) = broadcast::channel(DIAGNOSTICS_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            config,
            diagnostics_tx,
        })
    }

    /// Subscribe to per-request diagnostics.
    pub fn diagnostics(&self) -> broadcast::Receiver<RequestLog> {
        self.diagnostics_tx.subscribe()
    }

    /// Send a diagnostics log entry
    fn log_request(&self, log: RequestLog) {
        // Ignore send errors - they just mean no one is listening
        let _ = self.diagnostics_tx.send(log);
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: String,
        params: HashMap<String, String>,
    ) -> Result<T, ApiError> {
        let start = Instant::now();

        let mut log = RequestLog {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            method: "GET".to_string(),
            endpoint: endpoint.to_string(),
            params: Some(params),
            duration_ms: 0,
            status: 0,
            response_size: None,
            error: None,
        };

        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                log.duration_ms = start.elapsed().as_millis() as u64;
                log.error = Some(e.to_string());
                self.log_request(log);
                return Err(ApiError::Network(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        log.status = status;

        if !response.status().is_success() {
            log.duration_ms = start.elapsed().as_millis() as u64;
            log.error = Some(format!("HTTP error: {}", status));
            self.log_request(log);
            return Err(ApiError::Api(format!("HTTP error: {}", status)));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                log.duration_ms = start.elapsed().as_millis() as u64;
                log.error = Some(format!("Failed to read body: {}", e));
                self.log_request(log);
                return Err(ApiError::Network(format!("Failed to read body: {}", e)));
            }
        };

        log.duration_ms = start.elapsed().as_millis() as u64;
        log.response_size = Some(body.len());

        match serde_json::from_str::<T>(&body) {
            Ok(parsed) => {
                self.log_request(log);
                Ok(parsed)
            }
            Err(e) => {
                tracing::warn!(endpoint, error = %e, "Failed to parse upstream response");
                log.error = Some(format!("Parse error: {}", e));
                self.log_request(log);
                Err(ApiError::Parse(e.to_string()))
            }
        }
    }

    /// Fetch and unwrap a live data collection response.
    async fn live_collection<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: String,
        params: HashMap<String, String>,
    ) -> Result<Vec<T>, ApiError> {
        let resp: LiveDataResponse<T> = self.get_json(endpoint, url, params).await?;
        if !resp.result {
            return Err(ApiError::Api(format!(
                "Upstream reported failure: {}",
                resp.description
            )));
        }
        Ok(resp.data)
    }

    async fn fetch_servers(&self) -> Result<Vec<ServerSnapshot>, ApiError> {
        let url = format!("{}/servers-open", self.config.live_data_url);
        self.live_collection("servers-open", url, HashMap::new())
            .await
    }

    async fn fetch_stations(&self, server_code: &str) -> Result<Vec<StationSnapshot>, ApiError> {
        let url = format!(
            "{}/stations-open?serverCode={}",
            self.config.live_data_url,
            urlencoding::encode(server_code)
        );
        let mut params = HashMap::new();
        params.insert("serverCode".to_string(), server_code.to_string());
        self.live_collection("stations-open", url, params).await
    }

    async fn fetch_trains(&self, server_code: &str) -> Result<Vec<TrainSnapshot>, ApiError> {
        let url = format!(
            "{}/trains-open?serverCode={}",
            self.config.live_data_url,
            urlencoding::encode(server_code)
        );
        let mut params = HashMap::new();
        params.insert("serverCode".to_string(), server_code.to_string());
        self.live_collection("trains-open", url, params).await
    }

    async fn fetch_timetable(
        &self,
        server_code: &str,
        train_number: &str,
    ) -> Result<TimetableSnapshot, ApiError> {
        let url = format!(
            "{}/getAllTimetables?serverCode={}&train={}",
            self.config.timetable_url,
            urlencoding::encode(server_code),
            urlencoding::encode(train_number)
        );
        let mut params = HashMap::new();
        params.insert("serverCode".to_string(), server_code.to_string());
        params.insert("train".to_string(), train_number.to_string());

        let timetables: Vec<TimetableSnapshot> =
            self.get_json("getAllTimetables", url, params).await?;
        timetables.into_iter().next().ok_or_else(|| {
            ApiError::NotFound(format!("train {} on server {}", train_number, server_code))
        })
    }
}

impl TrainApi for RestApi {
    fn active_servers(&self) -> BoxFuture<'_, Result<Vec<ServerSnapshot>, ApiError>> {
        Box::pin(self.fetch_servers())
    }

    fn active_server<'a>(
        &'a self,
        server_code: &'a str,
    ) -> BoxFuture<'a, Result<ServerSnapshot, ApiError>> {
        Box::pin(async move {
            self.fetch_servers()
                .await?
                .into_iter()
                .find(|s| s.server_code == server_code)
                .ok_or_else(|| ApiError::NotFound(format!("server {}", server_code)))
        })
    }

    fn active_stations<'a>(
        &'a self,
        server_code: &'a str,
    ) -> BoxFuture<'a, Result<Vec<StationSnapshot>, ApiError>> {
        Box::pin(self.fetch_stations(server_code))
    }

    fn active_station<'a>(
        &'a self,
        server_code: &'a str,
        station_code: &'a str,
    ) -> BoxFuture<'a, Result<StationSnapshot, ApiError>> {
        Box::pin(async move {
            let wanted = station_code.to_lowercase();
            self.fetch_stations(server_code)
                .await?
                .into_iter()
                .find(|s| s.code() == wanted)
                .ok_or_else(|| {
                    ApiError::NotFound(format!(
                        "station {} on server {}",
                        station_code, server_code
                    ))
                })
        })
    }

    fn active_trains<'a>(
        &'a self,
        server_code: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TrainSnapshot>, ApiError>> {
        Box::pin(self.fetch_trains(server_code))
    }

    fn active_train<'a>(
        &'a self,
        server_code: &'a str,
        train_number: &'a str,
    ) -> BoxFuture<'a, Result<Option<TrainSnapshot>, ApiError>> {
        Box::pin(async move {
            let trains = self.fetch_trains(server_code).await?;
            Ok(trains.into_iter().find(|t| t.train_number == train_number))
        })
    }

    fn timetable<'a>(
        &'a self,
        server_code: &'a str,
        train_number: &'a str,
    ) -> BoxFuture<'a, Result<TimetableSnapshot, ApiError>> {
        Box::pin(self.fetch_timetable(server_code, train_number))
    }
}
