//! Scripted [`TrainApi`] double and fixture builders for the test suites.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::provider::models::{
    EntrySnapshot, ServerSnapshot, StationSnapshot, TimetableSnapshot, TrainDataSnapshot,
    TrainSnapshot,
};
use crate::provider::{ApiError, TrainApi};

type TrainPoll = Result<Option<TrainSnapshot>, ApiError>;

/// In-memory data source. Snapshots are keyed like the upstream keys them;
/// live train polls are a scripted queue, one pop per poll, empty meaning
/// "not currently running".
pub(crate) struct MockApi {
    servers: Mutex<HashMap<String, ServerSnapshot>>,
    stations: Mutex<HashMap<(String, String), StationSnapshot>>,
    train_lists: Mutex<HashMap<String, Vec<TrainSnapshot>>>,
    train_polls: Mutex<HashMap<(String, String), VecDeque<TrainPoll>>>,
    timetables: Mutex<HashMap<(String, String), TimetableSnapshot>>,
    server_delay: Mutex<Option<Duration>>,
    server_fetches: AtomicUsize,
    station_fetches: AtomicUsize,
    train_fetches: AtomicUsize,
    timetable_fetches: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Self {
        let mock = Self {
            servers: Mutex::new(HashMap::new()),
            stations: Mutex::new(HashMap::new()),
            train_lists: Mutex::new(HashMap::new()),
            train_polls: Mutex::new(HashMap::new()),
            timetables: Mutex::new(HashMap::new()),
            server_delay: Mutex::new(None),
            server_fetches: AtomicUsize::new(0),
            station_fetches: AtomicUsize::new(0),
            train_fetches: AtomicUsize::new(0),
            timetable_fetches: AtomicUsize::new(0),
        };
        mock.put_server(server_snapshot("en1"));
        mock
    }

    pub fn put_server(&self, snapshot: ServerSnapshot) {
        self.servers
            .lock()
            .insert(snapshot.server_code.clone(), snapshot);
    }

    pub fn put_station(&self, server_code: &str, snapshot: StationSnapshot) {
        self.stations
            .lock()
            .insert((server_code.to_string(), snapshot.code()), snapshot);
    }

    pub fn put_train_list(&self, server_code: &str, trains: Vec<TrainSnapshot>) {
        self.train_lists
            .lock()
            .insert(server_code.to_string(), trains);
    }

    pub fn push_train_poll(
        &self,
        server_code: &str,
        train_number: &str,
        poll: Option<TrainSnapshot>,
    ) {
        self.train_polls
            .lock()
            .entry((server_code.to_string(), train_number.to_string()))
            .or_default()
            .push_back(Ok(poll));
    }

    pub fn push_train_error(&self, server_code: &str, train_number: &str, error: ApiError) {
        self.train_polls
            .lock()
            .entry((server_code.to_string(), train_number.to_string()))
            .or_default()
            .push_back(Err(error));
    }

    pub fn put_timetable(&self, server_code: &str, snapshot: TimetableSnapshot) {
        self.timetables.lock().insert(
            (server_code.to_string(), snapshot.train_no_local.clone()),
            snapshot,
        );
    }

    /// Delay every single-server lookup, for fetch-overlap tests.
    pub fn set_server_delay(&self, delay: Duration) {
        *self.server_delay.lock() = Some(delay);
    }

    pub fn server_fetches(&self) -> usize {
        self.server_fetches.load(Ordering::SeqCst)
    }

    pub fn station_fetches(&self) -> usize {
        self.station_fetches.load(Ordering::SeqCst)
    }

    pub fn train_fetches(&self) -> usize {
        self.train_fetches.load(Ordering::SeqCst)
    }

    pub fn timetable_fetches(&self) -> usize {
        self.timetable_fetches.load(Ordering::SeqCst)
    }
}

impl TrainApi for MockApi {
    fn active_servers(&self) -> BoxFuture<'_, Result<Vec<ServerSnapshot>, ApiError>> {
        Box::pin(async move { Ok(self.servers.lock().values().cloned().collect()) })
    }

    fn active_server<'a>(
        &'a self,
        server_code: &'a str,
    ) -> BoxFuture<'a, Result<ServerSnapshot, ApiError>> {
        Box::pin(async move {
            let delay = *self.server_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.server_fetches.fetch_add(1, Ordering::SeqCst);
            self.servers
                .lock()
                .get(server_code)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(format!("server {}", server_code)))
        })
    }

    fn active_stations<'a>(
        &'a self,
        server_code: &'a str,
    ) -> BoxFuture<'a, Result<Vec<StationSnapshot>, ApiError>> {
        Box::pin(async move {
            Ok(self
                .stations
                .lock()
                .iter()
                .filter(|((server, _), _)| server == server_code)
                .map(|(_, snapshot)| snapshot.clone())
                .collect())
        })
    }

    fn active_station<'a>(
        &'a self,
        server_code: &'a str,
        station_code: &'a str,
    ) -> BoxFuture<'a, Result<StationSnapshot, ApiError>> {
        Box::pin(async move {
            self.station_fetches.fetch_add(1, Ordering::SeqCst);
            self.stations
                .lock()
                .get(&(server_code.to_string(), station_code.to_lowercase()))
                .cloned()
                .ok_or_else(|| ApiError::NotFound(format!("station {}", station_code)))
        })
    }

    fn active_trains<'a>(
        &'a self,
        server_code: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TrainSnapshot>, ApiError>> {
        Box::pin(async move {
            Ok(self
                .train_lists
                .lock()
                .get(server_code)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn active_train<'a>(
        &'a self,
        server_code: &'a str,
        train_number: &'a str,
    ) -> BoxFuture<'a, Result<Option<TrainSnapshot>, ApiError>> {
        Box::pin(async move {
            self.train_fetches.fetch_add(1, Ordering::SeqCst);
            let poll = self
                .train_polls
                .lock()
                .get_mut(&(server_code.to_string(), train_number.to_string()))
                .and_then(|queue| queue.pop_front());
            poll.unwrap_or(Ok(None))
        })
    }

    fn timetable<'a>(
        &'a self,
        server_code: &'a str,
        train_number: &'a str,
    ) -> BoxFuture<'a, Result<TimetableSnapshot, ApiError>> {
        Box::pin(async move {
            self.timetable_fetches.fetch_add(1, Ordering::SeqCst);
            self.timetables
                .lock()
                .get(&(server_code.to_string(), train_number.to_string()))
                .cloned()
                .ok_or_else(|| {
                    ApiError::NotFound(format!(
                        "train {} on server {}",
                        train_number, server_code
                    ))
                })
        })
    }
}

pub(crate) fn server_snapshot(code: &str) -> ServerSnapshot {
    ServerSnapshot {
        id: format!("srv-{}", code),
        server_code: code.to_string(),
        server_name: code.to_uppercase(),
        server_region: "Europe".to_string(),
        is_active: true,
    }
}

pub(crate) fn station_snapshot(prefix: &str, name: &str) -> StationSnapshot {
    StationSnapshot {
        id: format!("sta-{}", prefix.to_lowercase()),
        name: name.to_string(),
        prefix: prefix.to_string(),
        difficulty_level: 3,
        latitude: 50.25,
        longitude: 19.01,
        main_image_url: format!("https://img.test/{}.jpg", prefix.to_lowercase()),
        additional_image1_url: Some(format!("https://img.test/{}-1.jpg", prefix.to_lowercase())),
        additional_image2_url: Some(format!("https://img.test/{}-2.jpg", prefix.to_lowercase())),
        dispatched_by: None,
    }
}

pub(crate) fn train_snapshot(number: &str, timetable_index: i64) -> TrainSnapshot {
    TrainSnapshot {
        id: format!("live-{}", number),
        train_number: number.to_string(),
        train_name: "REG".to_string(),
        start_station: "Krakow Glowny".to_string(),
        end_station: "Katowice".to_string(),
        server_code: "en1".to_string(),
        run_id: format!("run-{}", number),
        vehicles: vec!["EN57-1".to_string(), "EN57-2".to_string()],
        train_data: TrainDataSnapshot {
            controlled_by_steam_id: None,
            in_border_station_area: false,
            latitude: 50.06,
            longitude: 19.94,
            velocity: 80.0,
            signal_in_front: Some("KZ_G@7129,82510".to_string()),
            distance_to_signal_in_front: Some(350.0),
            signal_in_front_speed: Some(60.0),
            vd_delayed_timetable_index: timetable_index,
        },
    }
}

pub(crate) fn entry_snapshot(index: usize, name: &str, stop_type: Option<&str>) -> EntrySnapshot {
    let stops = stop_type.is_some();
    EntrySnapshot {
        name_of_point: name.to_string(),
        point_id: format!("p{}", index),
        supervised_by: Some(name.to_string()),
        radio_channels: Some("R1".to_string()),
        arrival_time: (index > 0).then(|| format!("12:{:02}:00", index)),
        departure_time: Some(format!("12:{:02}:30", index)),
        stop_type: stop_type.map(str::to_string),
        line: 133,
        platform: stops.then(|| "II".to_string()),
        track: stops.then_some(2),
        train_type: "REG".to_string(),
        mileage: index as f64 * 10.0,
        max_speed: 100,
        station_category: stops.then(|| "B".to_string()),
    }
}

pub(crate) fn timetable_snapshot(number: &str, stops: usize) -> TimetableSnapshot {
    let timetable = (0..stops)
        .map(|index| {
            let stop_type = (index == 0 || index + 1 == stops).then_some("CommercialStop");
            entry_snapshot(index, &format!("Point {}", index), stop_type)
        })
        .collect();
    TimetableSnapshot {
        train_no_local: number.to_string(),
        train_no_international: None,
        train_name: "REG".to_string(),
        start_station: "Krakow Glowny".to_string(),
        starts_at: "12:00:30".to_string(),
        end_station: "Katowice".to_string(),
        ends_at: "13:30:00".to_string(),
        loco_type: "EN57".to_string(),
        train_length: 130,
        train_weight: 252,
        continues_as: None,
        run_id: format!("run-{}", number),
        timetable,
    }
}
