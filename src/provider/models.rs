use serde::Deserialize;

/// Envelope wrapping every live data endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveDataResponse<T> {
    pub result: bool,
    // a default path, not #[serde(default)], so deserializing does not
    // demand T: Default
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSnapshot {
    pub id: String,
    #[serde(rename = "ServerCode")]
    pub server_code: String,
    #[serde(rename = "ServerName")]
    pub server_name: String,
    #[serde(rename = "ServerRegion")]
    pub server_region: String,
    #[serde(rename = "IsActive")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationSnapshot {
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Prefix")]
    pub prefix: String,
    #[serde(rename = "DifficultyLevel")]
    pub difficulty_level: u8,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "MainImageURL")]
    pub main_image_url: String,
    #[serde(rename = "AdditionalImage1URL")]
    pub additional_image1_url: Option<String>,
    #[serde(rename = "AdditionalImage2URL")]
    pub additional_image2_url: Option<String>,
    #[serde(rename = "DispatchedBy")]
    pub dispatched_by: Option<Vec<DispatcherSnapshot>>,
}

impl StationSnapshot {
    /// Short lookup code the cache maps key stations by.
    pub fn code(&self) -> String {
        self.prefix.to_lowercase()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherSnapshot {
    #[serde(rename = "ServerCode")]
    pub server_code: String,
    #[serde(rename = "SteamId")]
    pub steam_id: String,
}

/// One train as reported by the live data endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainSnapshot {
    pub id: String,
    #[serde(rename = "TrainNoLocal")]
    pub train_number: String,
    #[serde(rename = "TrainName")]
    pub train_name: String,
    #[serde(rename = "StartStation")]
    pub start_station: String,
    #[serde(rename = "EndStation")]
    pub end_station: String,
    #[serde(rename = "ServerCode")]
    pub server_code: String,
    #[serde(rename = "RunId")]
    pub run_id: String,
    #[serde(rename = "Vehicles", default)]
    pub vehicles: Vec<String>,
    #[serde(rename = "TrainData")]
    pub train_data: TrainDataSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainDataSnapshot {
    #[serde(rename = "ControlledBySteamID")]
    pub controlled_by_steam_id: Option<String>,
    #[serde(rename = "InBorderStationArea", default)]
    pub in_border_station_area: bool,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Velocity")]
    pub velocity: f64,
    #[serde(rename = "SignalInFront")]
    pub signal_in_front: Option<String>,
    #[serde(rename = "DistanceToSignalInFront")]
    pub distance_to_signal_in_front: Option<f64>,
    #[serde(rename = "SignalInFrontSpeed")]
    pub signal_in_front_speed: Option<f64>,
    /// -1 while the dispatcher simulation has not placed the train yet.
    #[serde(rename = "VDDelayedTimetableIndex")]
    pub vd_delayed_timetable_index: i64,
}

/// One train's full schedule as reported by the timetable endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableSnapshot {
    pub train_no_local: String,
    pub train_no_international: Option<String>,
    pub train_name: String,
    pub start_station: String,
    pub starts_at: String,
    pub end_station: String,
    pub ends_at: String,
    pub loco_type: String,
    pub train_length: u32,
    pub train_weight: u32,
    pub continues_as: Option<String>,
    pub run_id: String,
    #[serde(default)]
    pub timetable: Vec<EntrySnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySnapshot {
    pub name_of_point: String,
    pub point_id: String,
    pub supervised_by: Option<String>,
    pub radio_channels: Option<String>,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
    pub stop_type: Option<String>,
    pub line: u32,
    pub platform: Option<String>,
    pub track: Option<u32>,
    pub train_type: String,
    pub mileage: f64,
    pub max_speed: u32,
    pub station_category: Option<String>,
}
