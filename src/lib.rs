//! Typed client-side domain model over the SimRail multiplayer API.
//!
//! The entry point is [`Sdk`]: it resolves [`Server`] handles and keeps
//! them in an identity cache, servers resolve [`Station`]s and [`Train`]s,
//! and every train owns a [`LiveData`] poller and a [`Timetable`] that
//! follow the game state through broadcast events.
//!
//! ```no_run
//! # async fn run() -> Result<(), simrail_core::CoreError> {
//! let sdk = simrail_core::Sdk::new(simrail_core::Config::default())?;
//! let train = sdk.train("en1", "4144").await?;
//! let live_data = train.live_data()?;
//! live_data.set_auto_update(true)?;
//! let mut events = live_data.subscribe();
//! while let Ok(event) = events.recv().await {
//!     tracing::info!(?event, "train changed");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod server;
pub mod station;
pub mod train;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::CoreError;
pub use server::{Server, ServerData};
pub use station::{Dispatcher, Station, StationData, StationImages};
pub use train::entry::{EntryData, StopKind, TimetableEntry};
pub use train::live_data::{
    Driver, LiveData, LiveDataEvent, LiveDataSnapshot, Signal, DEFAULT_UPDATE_INTERVAL,
};
pub use train::timetable::{Timetable, TimetableEvent};
pub use train::{Train, TrainData, TrainDestination, TrainOrigin};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use provider::rest::RestApi;
use provider::TrainApi;

/// Facade over the whole model.
///
/// Cheap to clone; clones share the server cache.
#[derive(Clone)]
pub struct Sdk {
    inner: Arc<SdkInner>,
}

struct SdkInner {
    api: Arc<dyn TrainApi>,
    /// Server cache; the lock is held across hydration fetches so a key
    /// is fetched at most once.
    servers: Mutex<HashMap<String, Server>>,
}

impl Sdk {
    /// Connect to the real upstream endpoints.
    pub fn new(config: Config) -> Result<Self, CoreError> {
        let api = RestApi::new(config)?;
        Ok(Self::with_api(Arc::new(api)))
    }

    /// Run against any data source, for embedders bringing their own
    /// transport.
    pub fn with_api(api: Arc<dyn TrainApi>) -> Self {
        Self {
            inner: Arc::new(SdkInner {
                api,
                servers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Cached server lookup; fetches and caches on first access.
    pub async fn server(&self, code: &str) -> Result<Server, CoreError> {
        let mut servers = self.inner.servers.lock().await;
        if let Some(server) = servers.get(code) {
            return Ok(server.clone());
        }
        let server = Server::hydrate(self.inner.api.clone(), code).await?;
        servers.insert(code.to_string(), server.clone());
        Ok(server)
    }

    /// Fetch all servers; already cached instances are kept, new ones are
    /// inserted. Returns an owned snapshot of the cache.
    pub async fn servers(&self) -> Result<HashMap<String, Server>, CoreError> {
        let mut servers = self.inner.servers.lock().await;
        let snapshots = self.inner.api.active_servers().await?;
        for snapshot in &snapshots {
            if servers.contains_key(&snapshot.server_code) {
                continue;
            }
            let server =
                Server::from_snapshot(self.inner.api.clone(), &snapshot.server_code, snapshot)?;
            servers.insert(snapshot.server_code.clone(), server);
        }
        Ok(servers.clone())
    }

    pub async fn station(
        &self,
        server_code: &str,
        station_code: &str,
    ) -> Result<Station, CoreError> {
        self.server(server_code).await?.station(station_code).await
    }

    pub async fn stations(
        &self,
        server_code: &str,
    ) -> Result<HashMap<String, Station>, CoreError> {
        self.server(server_code).await?.stations().await
    }

    pub async fn train(&self, server_code: &str, number: &str) -> Result<Train, CoreError> {
        self.server(server_code).await?.train(number).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{server_snapshot, station_snapshot, timetable_snapshot, MockApi};
    use std::time::Duration;

    fn make_sdk(mock: &Arc<MockApi>) -> Sdk {
        Sdk::with_api(mock.clone() as Arc<dyn TrainApi>)
    }

    #[tokio::test]
    async fn repeated_lookups_return_the_same_instance() {
        let mock = Arc::new(MockApi::new());
        let sdk = make_sdk(&mock);

        let first = sdk.server("en1").await.unwrap();
        let second = sdk.server("en1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.server_fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_lookups_fetch_once() {
        let mock = Arc::new(MockApi::new());
        mock.set_server_delay(Duration::from_millis(10));
        let sdk = make_sdk(&mock);

        let (first, second) = tokio::join!(sdk.server("en1"), sdk.server("en1"));
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(mock.server_fetches(), 1);
    }

    #[tokio::test]
    async fn unknown_server_code_maps_to_invalid_code() {
        let mock = Arc::new(MockApi::new());
        let sdk = make_sdk(&mock);
        assert!(matches!(
            sdk.server("zz9").await.unwrap_err(),
            CoreError::InvalidServerCode(code) if code == "zz9"
        ));
    }

    #[tokio::test]
    async fn servers_keeps_cached_instances_and_returns_a_snapshot() {
        let mock = Arc::new(MockApi::new());
        mock.put_server(server_snapshot("de1"));
        let sdk = make_sdk(&mock);

        let cached = sdk.server("en1").await.unwrap();
        let all = sdk.servers().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["en1"], cached);

        // the returned map is an owned snapshot, later cache growth does
        // not show up in it
        mock.put_server(server_snapshot("fr1"));
        let _ = sdk.server("fr1").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn station_and_train_delegate_through_the_server() {
        let mock = Arc::new(MockApi::new());
        mock.put_station("en1", station_snapshot("KO", "Katowice"));
        mock.put_timetable("en1", timetable_snapshot("4144", 3));
        let sdk = make_sdk(&mock);

        let station = sdk.station("en1", "KO").await.unwrap();
        assert_eq!(station.name(), "Katowice");

        let train = sdk.train("en1", "4144").await.unwrap();
        assert_eq!(train.id().unwrap(), "run-4144");

        // trains are never cached
        let again = sdk.train("en1", "4144").await.unwrap();
        assert_ne!(train, again);
    }
}
