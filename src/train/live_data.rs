use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::CoreError;
use crate::provider::models::TrainSnapshot;
use crate::provider::TrainApi;

/// Default polling period of the auto-update timer
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(5000);
/// Capacity of the per-instance event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Who is driving the train.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Driver {
    Bot,
    User { steam_id: String },
}

/// The signal ahead of the train.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    /// Signal name, the raw descriptor truncated at the first `@`
    pub id: String,
    /// Raw descriptor as reported upstream
    pub data: String,
    /// Distance to the signal in meters
    pub distance: Option<f64>,
    /// Speed limit the signal currently shows, km/h
    pub speed: Option<f64>,
}

/// Serializable view of the live state of one train.
#[derive(Debug, Clone, Serialize)]
pub struct LiveDataSnapshot {
    pub server_code: String,
    pub train_number: String,
    pub available: bool,
    pub last_available_check: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f64>,
    pub driver: Driver,
    pub signal: Option<Signal>,
    pub in_playable_area: bool,
    pub timetable_index: Option<usize>,
    pub vehicles: Vec<String>,
}

/// Change notifications, emitted in a fixed order per update:
/// InPlayableAreaChanged, TimetableIndexChanged, AvailableChanged (on a
/// flip only), then DataUpdated.
#[derive(Debug, Clone)]
pub enum LiveDataEvent {
    AutoUpdateChanged { enabled: bool, interval: Duration },
    AutoUpdateIntervalChanged { interval: Duration },
    AvailableChanged { available: bool },
    InPlayableAreaChanged { in_playable_area: bool },
    TimetableIndexChanged { index: Option<usize> },
    DataUpdated { data: LiveDataSnapshot },
}

struct LiveDataState {
    available: bool,
    last_available_check: Option<DateTime<Utc>>,
    timestamp: Option<DateTime<Utc>>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    speed: Option<f64>,
    driver: Driver,
    signal: Option<Signal>,
    in_playable_area: bool,
    timetable_index: Option<usize>,
    vehicles: Vec<String>,
    auto_update_interval: Duration,
}

/// Volatile per-train state with optional background polling.
///
/// Cheap to clone; clones share state, the timer and the event channel.
#[derive(Clone)]
pub struct LiveData {
    inner: Arc<LiveDataInner>,
}

struct LiveDataInner {
    api: Arc<dyn TrainApi>,
    server_code: String,
    train_number: String,
    state: RwLock<LiveDataState>,
    /// Handle of the polling task while auto-update is on
    timer: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
    events: broadcast::Sender<LiveDataEvent>,
}

impl fmt::Debug for LiveData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveData")
            .field("server_code", &self.inner.server_code)
            .field("train_number", &self.inner.train_number)
            .field("available", &self.inner.state.read().available)
            .finish_non_exhaustive()
    }
}

impl LiveData {
    pub(crate) fn new(
        api: Arc<dyn TrainApi>,
        server_code: &str,
        train_number: &str,
        initial: Option<&TrainSnapshot>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let live_data = Self {
            inner: Arc::new(LiveDataInner {
                api,
                server_code: server_code.to_string(),
                train_number: train_number.to_string(),
                state: RwLock::new(LiveDataState {
                    available: false,
                    last_available_check: None,
                    timestamp: None,
                    latitude: None,
                    longitude: None,
                    speed: None,
                    driver: Driver::Bot,
                    signal: None,
                    in_playable_area: false,
                    timetable_index: None,
                    vehicles: Vec::new(),
                    auto_update_interval: DEFAULT_UPDATE_INTERVAL,
                }),
                timer: Mutex::new(None),
                destroyed: AtomicBool::new(false),
                events,
            }),
        };
        live_data.apply_payload(initial);
        live_data
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveDataEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: LiveDataEvent) {
        // Ignore send errors - they just mean no one is listening
        let _ = self.inner.events.send(event);
    }

    fn check_destroyed(&self) -> Result<(), CoreError> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(CoreError::ObjectDestroyed);
        }
        Ok(())
    }

    /// Poll the upstream once and apply the result. A failed fetch counts
    /// as an absent train, not as an error.
    pub async fn update(&self) -> Result<(), CoreError> {
        self.check_destroyed()?;
        let fetched = match self
            .inner
            .api
            .active_train(&self.inner.server_code, &self.inner.train_number)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!(
                    train = %self.inner.train_number,
                    server = %self.inner.server_code,
                    error = %e,
                    "live data fetch failed, treating train as unavailable"
                );
                None
            }
        };
        // the instance may have been destroyed while the fetch was in flight
        self.check_destroyed()?;
        self.apply_payload(fetched.as_ref());
        Ok(())
    }

    pub(crate) fn apply(&self, payload: Option<&TrainSnapshot>) -> Result<(), CoreError> {
        self.check_destroyed()?;
        self.apply_payload(payload);
        Ok(())
    }

    fn apply_payload(&self, payload: Option<&TrainSnapshot>) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.write();
            state.last_available_check = Some(Utc::now());

            match payload {
                None => {
                    if state.available {
                        state.available = false;
                        events.push(LiveDataEvent::AvailableChanged { available: false });
                    }
                }
                Some(snapshot) => {
                    let data = &snapshot.train_data;
                    state.latitude = Some(data.latitude);
                    state.longitude = Some(data.longitude);
                    state.speed = Some(data.velocity);
                    state.vehicles = snapshot.vehicles.clone();
                    state.timestamp = Some(Utc::now());
                    state.driver = match &data.controlled_by_steam_id {
                        Some(steam_id) => Driver::User {
                            steam_id: steam_id.clone(),
                        },
                        None => Driver::Bot,
                    };
                    state.signal = data.signal_in_front.as_ref().map(|raw| Signal {
                        id: raw.split('@').next().unwrap_or(raw).to_string(),
                        data: raw.clone(),
                        distance: data.distance_to_signal_in_front,
                        speed: data.signal_in_front_speed,
                    });

                    let in_playable_area = !data.in_border_station_area;
                    if in_playable_area != state.in_playable_area {
                        state.in_playable_area = in_playable_area;
                        events.push(LiveDataEvent::InPlayableAreaChanged { in_playable_area });
                    }

                    let index = usize::try_from(data.vd_delayed_timetable_index).ok();
                    if index != state.timetable_index {
                        state.timetable_index = index;
                        events.push(LiveDataEvent::TimetableIndexChanged { index });
                    }

                    if !state.available {
                        state.available = true;
                        events.push(LiveDataEvent::AvailableChanged { available: true });
                    }
                }
            }
        }

        for event in events {
            self.emit(event);
        }

        if payload.is_none() {
            // an absent train also turns background polling off
            self.stop_timer();
            return;
        }
        self.emit(LiveDataEvent::DataUpdated {
            data: self.snapshot(),
        });
    }

    /// Turn background polling on or off.
    pub fn set_auto_update(&self, enabled: bool) -> Result<(), CoreError> {
        if enabled {
            self.start()
        } else {
            self.stop()
        }
    }

    /// Start background polling; a no-op while already running.
    pub fn start(&self) -> Result<(), CoreError> {
        self.check_destroyed()?;
        let interval = {
            let mut timer = self.inner.timer.lock();
            if timer.is_some() {
                return Ok(());
            }
            let interval = self.inner.state.read().auto_update_interval;
            *timer = Some(self.spawn_timer(interval));
            interval
        };
        self.emit(LiveDataEvent::AutoUpdateChanged {
            enabled: true,
            interval,
        });
        Ok(())
    }

    /// Stop background polling; a no-op while not running.
    pub fn stop(&self) -> Result<(), CoreError> {
        self.check_destroyed()?;
        self.stop_timer();
        Ok(())
    }

    fn stop_timer(&self) {
        let handle = self.inner.timer.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            let interval = self.inner.state.read().auto_update_interval;
            self.emit(LiveDataEvent::AutoUpdateChanged {
                enabled: false,
                interval,
            });
        }
    }

    fn spawn_timer(&self, period: Duration) -> JoinHandle<()> {
        let live_data = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if live_data.update().await.is_err() {
                    break;
                }
            }
        })
    }

    pub fn auto_update(&self) -> Result<bool, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.timer.lock().is_some())
    }

    pub fn auto_update_interval(&self) -> Result<Duration, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().auto_update_interval)
    }

    /// Change the polling period. A running timer restarts at the new
    /// period; setting the current value is a no-op.
    pub fn set_auto_update_interval(&self, interval: Duration) -> Result<(), CoreError> {
        self.check_destroyed()?;
        {
            let mut state = self.inner.state.write();
            if state.auto_update_interval == interval {
                return Ok(());
            }
            state.auto_update_interval = interval;
        }
        {
            let mut timer = self.inner.timer.lock();
            if let Some(handle) = timer.take() {
                handle.abort();
                *timer = Some(self.spawn_timer(interval));
            }
        }
        self.emit(LiveDataEvent::AutoUpdateIntervalChanged { interval });
        Ok(())
    }

    pub(crate) fn destroy(&self) -> Result<(), CoreError> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Err(CoreError::ObjectDestroyed);
        }
        if let Some(handle) = self.inner.timer.lock().take() {
            handle.abort();
        }
        Ok(())
    }

    pub fn server_code(&self) -> &str {
        &self.inner.server_code
    }

    pub fn train_number(&self) -> &str {
        &self.inner.train_number
    }

    pub fn available(&self) -> Result<bool, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().available)
    }

    pub fn last_available_check(&self) -> Result<Option<DateTime<Utc>>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().last_available_check)
    }

    pub fn timestamp(&self) -> Result<Option<DateTime<Utc>>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().timestamp)
    }

    pub fn latitude(&self) -> Result<Option<f64>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().latitude)
    }

    pub fn longitude(&self) -> Result<Option<f64>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().longitude)
    }

    pub fn speed(&self) -> Result<Option<f64>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().speed)
    }

    pub fn driver(&self) -> Result<Driver, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().driver.clone())
    }

    pub fn signal(&self) -> Result<Option<Signal>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().signal.clone())
    }

    pub fn in_playable_area(&self) -> Result<bool, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().in_playable_area)
    }

    pub fn timetable_index(&self) -> Result<Option<usize>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().timetable_index)
    }

    pub fn vehicles(&self) -> Result<Vec<String>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.state.read().vehicles.clone())
    }

    pub fn data(&self) -> Result<LiveDataSnapshot, CoreError> {
        self.check_destroyed()?;
        Ok(self.snapshot())
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(&self.data()?)?)
    }

    fn snapshot(&self) -> LiveDataSnapshot {
        let state = self.inner.state.read();
        LiveDataSnapshot {
            server_code: self.inner.server_code.clone(),
            train_number: self.inner.train_number.clone(),
            available: state.available,
            last_available_check: state.last_available_check,
            timestamp: state.timestamp,
            latitude: state.latitude,
            longitude: state.longitude,
            speed: state.speed,
            driver: state.driver.clone(),
            signal: state.signal.clone(),
            in_playable_area: state.in_playable_area,
            timetable_index: state.timetable_index,
            vehicles: state.vehicles.clone(),
        }
    }
}
