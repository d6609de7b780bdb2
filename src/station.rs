use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::CoreError;
use crate::provider::models::StationSnapshot;
use crate::provider::TrainApi;

/// A player currently dispatching a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dispatcher {
    pub steam_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationImages {
    pub primary: String,
    pub secondary: Vec<String>,
}

/// Serializable view of a station's current state.
#[derive(Debug, Clone, Serialize)]
pub struct StationData {
    pub server_code: String,
    pub code: String,
    pub id: String,
    pub name: String,
    pub prefix: String,
    pub difficulty_level: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub images: StationImages,
    pub dispatchers: Option<Vec<Dispatcher>>,
}

/// A dispatchable station on one server.
///
/// Cheap to clone; clones share state. The id and descriptive fields are
/// fixed by the first fetch, only the dispatcher list changes afterwards.
#[derive(Clone)]
pub struct Station {
    inner: Arc<StationInner>,
}

struct StationInner {
    api: Arc<dyn TrainApi>,
    server_code: String,
    code: String,
    id: String,
    name: String,
    prefix: String,
    difficulty_level: u8,
    latitude: f64,
    longitude: f64,
    images: StationImages,
    dispatchers: RwLock<Option<Vec<Dispatcher>>>,
}

/// Handle identity, not value equality.
impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Station")
            .field("server_code", &self.inner.server_code)
            .field("code", &self.inner.code)
            .field("id", &self.inner.id)
            .finish_non_exhaustive()
    }
}

impl Station {
    pub(crate) fn from_snapshot(
        api: Arc<dyn TrainApi>,
        server_code: &str,
        code: &str,
        snapshot: &StationSnapshot,
    ) -> Result<Self, CoreError> {
        if snapshot.code() != code {
            return Err(CoreError::IdentityMismatch {
                entity: "station code",
                expected: code.to_string(),
                actual: snapshot.code(),
            });
        }

        let mut secondary = Vec::new();
        if let Some(url) = &snapshot.additional_image1_url {
            secondary.push(url.clone());
        }
        if let Some(url) = &snapshot.additional_image2_url {
            secondary.push(url.clone());
        }

        let station = Self {
            inner: Arc::new(StationInner {
                api,
                server_code: server_code.to_string(),
                code: code.to_string(),
                id: snapshot.id.clone(),
                name: snapshot.name.clone(),
                prefix: snapshot.prefix.clone(),
                difficulty_level: snapshot.difficulty_level,
                latitude: snapshot.latitude,
                longitude: snapshot.longitude,
                images: StationImages {
                    primary: snapshot.main_image_url.clone(),
                    secondary,
                },
                dispatchers: RwLock::new(None),
            }),
        };
        station.merge_dispatchers(snapshot);
        Ok(station)
    }

    pub(crate) async fn hydrate(
        api: Arc<dyn TrainApi>,
        server_code: &str,
        code: &str,
    ) -> Result<Self, CoreError> {
        let snapshot = api
            .active_station(server_code, code)
            .await
            .map_err(|e| match e {
                crate::provider::ApiError::NotFound(_) => {
                    CoreError::InvalidStationCode(code.to_string())
                }
                other => CoreError::Api(other),
            })?;
        Self::from_snapshot(api, server_code, code, &snapshot)
    }

    /// Re-fetch and merge; fixed fields are verified, never overwritten.
    pub async fn update(&self) -> Result<(), CoreError> {
        let snapshot = self
            .inner
            .api
            .active_station(&self.inner.server_code, &self.inner.code)
            .await?;
        self.apply(&snapshot)
    }

    pub(crate) fn apply(&self, snapshot: &StationSnapshot) -> Result<(), CoreError> {
        if snapshot.code() != self.inner.code {
            return Err(CoreError::IdentityMismatch {
                entity: "station code",
                expected: self.inner.code.clone(),
                actual: snapshot.code(),
            });
        }
        if snapshot.id != self.inner.id {
            return Err(CoreError::IdentityMismatch {
                entity: "station id",
                expected: self.inner.id.clone(),
                actual: snapshot.id.clone(),
            });
        }
        self.merge_dispatchers(snapshot);
        Ok(())
    }

    // A payload without dispatchers means "not reported", not "nobody":
    // only a report with at least one dispatcher replaces the list.
    fn merge_dispatchers(&self, snapshot: &StationSnapshot) {
        if let Some(list) = &snapshot.dispatched_by {
            if !list.is_empty() {
                *self.inner.dispatchers.write() = Some(
                    list.iter()
                        .map(|d| Dispatcher {
                            steam_id: d.steam_id.clone(),
                        })
                        .collect(),
                );
            }
        }
    }

    pub fn server_code(&self) -> &str {
        &self.inner.server_code
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

    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    pub fn difficulty_level(&self) -> u8 {
        self.inner.difficulty_level
    }

    pub fn latitude(&self) -> f64 {
        self.inner.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.inner.longitude
    }

    pub fn images(&self) -> StationImages {
        self.inner.images.clone()
    }

    /// `None` means no dispatcher report has been seen yet.
    pub fn dispatchers(&self) -> Option<Vec<Dispatcher>> {
        self.inner.dispatchers.read().clone()
    }

    pub fn data(&self) -> StationData {
        StationData {
            server_code: self.inner.server_code.clone(),
            code: self.inner.code.clone(),
            id: self.inner.id.clone(),
            name: self.inner.name.clone(),
            prefix: self.inner.prefix.clone(),
            difficulty_level: self.inner.difficulty_level,
            latitude: self.inner.latitude,
            longitude: self.inner.longitude,
            images: self.inner.images.clone(),
            dispatchers: self.dispatchers(),
        }
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(&self.data())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{station_snapshot, MockApi};

    fn make_station(snapshot: &StationSnapshot) -> Station {
        let api: Arc<dyn TrainApi> = Arc::new(MockApi::new());
        Station::from_snapshot(api, "en1", &snapshot.code(), snapshot).unwrap()
    }

    #[test]
    fn first_snapshot_fixes_descriptive_fields() {
        let snap = station_snapshot("KO", "Katowice");
        let station = make_station(&snap);
        assert_eq!(station.code(), "ko");
        assert_eq!(station.name(), "Katowice");
        assert_eq!(station.images().secondary.len(), 2);
        assert!(station.dispatchers().is_none());
    }

    #[test]
    fn changed_id_is_rejected() {
        let snap = station_snapshot("KO", "Katowice");
        let station = make_station(&snap);

        let mut changed = snap.clone();
        changed.id = "other-id".into();
        let err = station.apply(&changed).unwrap_err();
        assert!(matches!(
            err,
            CoreError::IdentityMismatch {
                entity: "station id",
                ..
            }
        ));
        assert_eq!(station.id(), snap.id);
    }

    #[test]
    fn wrong_station_code_is_rejected() {
        let snap = station_snapshot("KO", "Katowice");
        let station = make_station(&snap);

        let other = station_snapshot("KG", "Krakow Glowny");
        assert!(matches!(
            station.apply(&other).unwrap_err(),
            CoreError::IdentityMismatch {
                entity: "station code",
                ..
            }
        ));
    }

    #[test]
    fn dispatcher_report_replaces_but_absence_keeps() {
        let mut snap = station_snapshot("KO", "Katowice");
        let station = make_station(&snap);

        snap.dispatched_by = Some(vec![crate::provider::models::DispatcherSnapshot {
            server_code: "en1".into(),
            steam_id: "7656119".into(),
        }]);
        station.apply(&snap).unwrap();
        assert_eq!(
            station.dispatchers(),
            Some(vec![Dispatcher {
                steam_id: "7656119".into()
            }])
        );

        // absent report must not clear the last known dispatchers
        snap.dispatched_by = None;
        station.apply(&snap).unwrap();
        assert!(station.dispatchers().is_some());

        // neither must an empty one
        snap.dispatched_by = Some(vec![]);
        station.apply(&snap).unwrap();
        assert_eq!(
            station.dispatchers(),
            Some(vec![Dispatcher {
                steam_id: "7656119".into()
            }])
        );
    }

    #[test]
    fn to_json_contains_nested_images() {
        let snap = station_snapshot("KO", "Katowice");
        let station = make_station(&snap);
        let json = station.to_json().unwrap();
        assert!(json.contains("\"code\":\"ko\""));
        assert!(json.contains("\"primary\""));
    }
}
