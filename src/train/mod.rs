pub mod entry;
pub mod live_data;
pub mod timetable;

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CoreError;
use crate::provider::models::{TimetableSnapshot, TrainSnapshot};
use crate::provider::TrainApi;
use live_data::{LiveData, LiveDataSnapshot};
use timetable::Timetable;

/// Where and when a train's run begins.
#[derive(Debug, Clone, Serialize)]
pub struct TrainOrigin {
    pub station_name: String,
    pub departs_at: String,
}

/// Where and when a train's run ends.
#[derive(Debug, Clone, Serialize)]
pub struct TrainDestination {
    pub station_name: String,
    pub arrives_at: String,
}

/// Fields fixed by the first timetable fetch.
#[derive(Debug, Clone, Serialize)]
struct TrainIdentity {
    /// Run id; this is the train's id for identity checks
    id: String,
    name: String,
    int_number: Option<String>,
    continues_as: Option<String>,
    length: u32,
    weight: u32,
    loco_type: String,
    origin: TrainOrigin,
    destination: TrainDestination,
}

/// Serializable view of a train.
#[derive(Debug, Clone, Serialize)]
pub struct TrainData {
    pub server_code: String,
    pub number: String,
    pub id: String,
    pub name: String,
    pub int_number: Option<String>,
    pub continues_as: Option<String>,
    pub length: u32,
    pub weight: u32,
    pub loco_type: String,
    pub origin: TrainOrigin,
    pub destination: TrainDestination,
    /// Present once live data has been applied at least once
    pub live_data: Option<LiveDataSnapshot>,
}

/// One train run on one server, composed of its live data and timetable.
///
/// Trains are never cached; every resolution yields a fresh instance with
/// a fresh LiveData/Timetable pair. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Train {
    inner: Arc<TrainInner>,
}

struct TrainInner {
    api: Arc<dyn TrainApi>,
    server_code: String,
    number: String,
    identity: TrainIdentity,
    live_data: LiveData,
    timetable: Timetable,
    destroyed: AtomicBool,
}

/// Handle identity, not value equality.
impl PartialEq for Train {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Train {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Train")
            .field("server_code", &self.inner.server_code)
            .field("number", &self.inner.number)
            .field("id", &self.inner.identity.id)
            .finish_non_exhaustive()
    }
}

impl Train {
    /// Build a train from pre-fetched payloads without touching the network.
    pub(crate) fn from_parts(
        api: Arc<dyn TrainApi>,
        server_code: &str,
        number: &str,
        live: Option<&TrainSnapshot>,
        schedule: &TimetableSnapshot,
    ) -> Result<Self, CoreError> {
        if schedule.train_no_local != number {
            return Err(CoreError::IdentityMismatch {
                entity: "train number",
                expected: number.to_string(),
                actual: schedule.train_no_local.clone(),
            });
        }
        if let Some(snapshot) = live {
            if snapshot.run_id != schedule.run_id {
                return Err(CoreError::IdentityMismatch {
                    entity: "train run id",
                    expected: schedule.run_id.clone(),
                    actual: snapshot.run_id.clone(),
                });
            }
        }

        let live_data = LiveData::new(api.clone(), server_code, number, live);
        let timetable = Timetable::new(
            api.clone(),
            server_code,
            number,
            live_data.clone(),
            schedule,
        );

        Ok(Self {
            inner: Arc::new(TrainInner {
                api,
                server_code: server_code.to_string(),
                number: number.to_string(),
                identity: TrainIdentity {
                    id: schedule.run_id.clone(),
                    name: schedule.train_name.clone(),
                    int_number: schedule.train_no_international.clone(),
                    continues_as: schedule.continues_as.clone(),
                    length: schedule.train_length,
                    weight: schedule.train_weight,
                    loco_type: schedule.loco_type.clone(),
                    origin: TrainOrigin {
                        station_name: schedule.start_station.clone(),
                        departs_at: schedule.starts_at.clone(),
                    },
                    destination: TrainDestination {
                        station_name: schedule.end_station.clone(),
                        arrives_at: schedule.ends_at.clone(),
                    },
                },
                live_data,
                timetable,
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    /// Fetch live data (tolerating absence) and the schedule (mandatory),
    /// then build the train.
    pub(crate) async fn hydrate(
        api: Arc<dyn TrainApi>,
        server_code: &str,
        number: &str,
    ) -> Result<Self, CoreError> {
        let live = match api.active_train(server_code, number).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!(
                    train = %number,
                    server = %server_code,
                    error = %e,
                    "live data unavailable during hydration"
                );
                None
            }
        };
        let schedule = api.timetable(server_code, number).await?;
        Self::from_parts(api, server_code, number, live.as_ref(), &schedule)
    }

    fn check_destroyed(&self) -> Result<(), CoreError> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(CoreError::ObjectDestroyed);
        }
        Ok(())
    }

    /// Re-fetch both payloads and verify the run id has not changed. The
    /// live payload is applied; the schedule is only verified, a rebuild
    /// of the entries is [`Timetable::update`]'s job.
    pub async fn update(&self) -> Result<(), CoreError> {
        self.check_destroyed()?;
        let live = match self
            .inner
            .api
            .active_train(&self.inner.server_code, &self.inner.number)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!(
                    train = %self.inner.number,
                    error = %e,
                    "live data unavailable during update"
                );
                None
            }
        };
        self.check_destroyed()?;
        if let Some(snapshot) = &live {
            if snapshot.run_id != self.inner.identity.id {
                return Err(CoreError::IdentityMismatch {
                    entity: "train run id",
                    expected: self.inner.identity.id.clone(),
                    actual: snapshot.run_id.clone(),
                });
            }
        }
        self.inner.live_data.apply(live.as_ref())?;

        let schedule = self
            .inner
            .api
            .timetable(&self.inner.server_code, &self.inner.number)
            .await?;
        self.check_destroyed()?;
        if schedule.run_id != self.inner.identity.id {
            return Err(CoreError::IdentityMismatch {
                entity: "train run id",
                expected: self.inner.identity.id.clone(),
                actual: schedule.run_id.clone(),
            });
        }
        Ok(())
    }

    /// Resolve the same train number on another server as an independent
    /// new instance.
    pub async fn switch_server(&self, server_code: &str) -> Result<Train, CoreError> {
        self.check_destroyed()?;
        Train::hydrate(self.inner.api.clone(), server_code, &self.inner.number).await
    }

    /// Tear down the train and both subcomponents. Stops polling and the
    /// event forwarding; afterwards every accessor errors.
    pub fn destroy(&self) -> Result<(), CoreError> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Err(CoreError::ObjectDestroyed);
        }
        self.inner.timetable.destroy()?;
        self.inner.live_data.destroy()?;
        Ok(())
    }

    pub fn live_data(&self) -> Result<LiveData, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.live_data.clone())
    }

    pub fn timetable(&self) -> Result<Timetable, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.timetable.clone())
    }

    pub fn server_code(&self) -> &str {
        &self.inner.server_code
    }

    pub fn number(&self) -> &str {
        &self.inner.number
    }

    pub fn id(&self) -> Result<&str, CoreError> {
        self.check_destroyed()?;
        Ok(&self.inner.identity.id)
    }

    pub fn name(&self) -> Result<&str, CoreError> {
        self.check_destroyed()?;
        Ok(&self.inner.identity.name)
    }

    pub fn int_number(&self) -> Result<Option<&str>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.identity.int_number.as_deref())
    }

    pub fn continues_as(&self) -> Result<Option<&str>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.identity.continues_as.as_deref())
    }

    pub fn length(&self) -> Result<u32, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.identity.length)
    }

    pub fn weight(&self) -> Result<u32, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.identity.weight)
    }

    pub fn loco_type(&self) -> Result<&str, CoreError> {
        self.check_destroyed()?;
        Ok(&self.inner.identity.loco_type)
    }

    pub fn origin(&self) -> Result<TrainOrigin, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.identity.origin.clone())
    }

    pub fn destination(&self) -> Result<TrainDestination, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.identity.destination.clone())
    }

    pub fn data(&self) -> Result<TrainData, CoreError> {
        self.check_destroyed()?;
        let identity = &self.inner.identity;
        let live_snapshot = self.inner.live_data.data()?;
        Ok(TrainData {
            server_code: self.inner.server_code.clone(),
            number: self.inner.number.clone(),
            id: identity.id.clone(),
            name: identity.name.clone(),
            int_number: identity.int_number.clone(),
            continues_as: identity.continues_as.clone(),
            length: identity.length,
            weight: identity.weight,
            loco_type: identity.loco_type.clone(),
            origin: identity.origin.clone(),
            destination: identity.destination.clone(),
            live_data: live_snapshot.timestamp.map(|_| live_snapshot.clone()),
        })
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(&self.data()?)?)
    }
}
