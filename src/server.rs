use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::provider::models::ServerSnapshot;
use crate::provider::{ApiError, TrainApi};
use crate::station::Station;
use crate::train::Train;

/// Serializable view of a server's current state.
#[derive(Debug, Clone, Serialize)]
pub struct ServerData {
    pub code: String,
    pub id: String,
    pub name: String,
    pub region: String,
    pub is_active: bool,
}

/// One multiplayer server.
///
/// Cheap to clone; clones share state, including the station cache.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    api: Arc<dyn TrainApi>,
    code: String,
    id: String,
    name: String,
    region: String,
    is_active: AtomicBool,
    /// Station cache; the lock is held across hydration fetches so a key
    /// is fetched at most once.
    stations: Mutex<HashMap<String, Station>>,
}

/// Handle identity, not value equality.
impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("code", &self.inner.code)
            .field("id", &self.inner.id)
            .field("is_active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Server {
    pub(crate) fn from_snapshot(
        api: Arc<dyn TrainApi>,
        code: &str,
        snapshot: &ServerSnapshot,
    ) -> Result<Self, CoreError> {
        if snapshot.server_code != code {
            return Err(CoreError::IdentityMismatch {
                entity: "server code",
                expected: code.to_string(),
                actual: snapshot.server_code.clone(),
            });
        }
        Ok(Self {
            inner: Arc::new(ServerInner {
                api,
                code: code.to_string(),
                id: snapshot.id.clone(),
                name: snapshot.server_name.clone(),
                region: snapshot.server_region.clone(),
                is_active: AtomicBool::new(snapshot.is_active),
                stations: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub(crate) async fn hydrate(api: Arc<dyn TrainApi>, code: &str) -> Result<Self, CoreError> {
        tracing::debug!(server = %code, "hydrating server");
        let snapshot = api.active_server(code).await.map_err(|e| match e {
            ApiError::NotFound(_) => CoreError::InvalidServerCode(code.to_string()),
            other => CoreError::Api(other),
        })?;
        Self::from_snapshot(api, code, &snapshot)
    }

    /// Re-fetch and merge; the id must not have changed.
    pub async fn update(&self) -> Result<(), CoreError> {
        let snapshot = self.inner.api.active_server(&self.inner.code).await?;
        self.apply(&snapshot)
    }

    pub(crate) fn apply(&self, snapshot: &ServerSnapshot) -> Result<(), CoreError> {
        if snapshot.server_code != self.inner.code {
            return Err(CoreError::IdentityMismatch {
                entity: "server code",
                expected: self.inner.code.clone(),
                actual: snapshot.server_code.clone(),
            });
        }
        if snapshot.id != self.inner.id {
            return Err(CoreError::IdentityMismatch {
                entity: "server id",
                expected: self.inner.id.clone(),
                actual: snapshot.id.clone(),
            });
        }
        self.inner
            .is_active
            .store(snapshot.is_active, Ordering::Relaxed);
        Ok(())
    }

    pub fn code(&self) -> &str {
        &self.inner.code
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn region(&self) -> &str {
        &self.inner.region
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active.load(Ordering::Relaxed)
    }

    pub fn data(&self) -> ServerData {
        ServerData {
            code: self.inner.code.clone(),
            id: self.inner.id.clone(),
            name: self.inner.name.clone(),
            region: self.inner.region.clone(),
            is_active: self.is_active(),
        }
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(&self.data())?)
    }

    /// Cached station lookup; fetches and caches on first access.
    pub async fn station(&self, code: &str) -> Result<Station, CoreError> {
        let key = code.to_lowercase();
        let mut stations = self.inner.stations.lock().await;
        if let Some(station) = stations.get(&key) {
            return Ok(station.clone());
        }
        let station =
            Station::hydrate(self.inner.api.clone(), &self.inner.code, &key).await?;
        stations.insert(key, station.clone());
        Ok(station)
    }

    /// Fetch all stations; already cached instances are kept, new ones are
    /// inserted. Returns an owned snapshot of the cache.
    pub async fn stations(&self) -> Result<HashMap<String, Station>, CoreError> {
        let mut stations = self.inner.stations.lock().await;
        let snapshots = self.inner.api.active_stations(&self.inner.code).await?;
        for snapshot in &snapshots {
            let key = snapshot.code();
            if stations.contains_key(&key) {
                continue;
            }
            let station = Station::from_snapshot(
                self.inner.api.clone(),
                &self.inner.code,
                &key,
                snapshot,
            )?;
            stations.insert(key, station);
        }
        Ok(stations.clone())
    }

    /// Numbers of all trains currently running on this server.
    pub async fn active_train_numbers(&self) -> Result<Vec<String>, CoreError> {
        let trains = self.inner.api.active_trains(&self.inner.code).await?;
        Ok(trains.into_iter().map(|t| t.train_number).collect())
    }

    /// Resolve a train. Trains are never cached; every call hydrates a
    /// fresh instance.
    pub async fn train(&self, number: &str) -> Result<Train, CoreError> {
        Train::hydrate(self.inner.api.clone(), &self.inner.code, number).await
    }
}
