use serde::Deserialize;

/// Connection settings for the two upstream SimRail endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the live data endpoint (default: the official panel host)
    #[serde(default = "Config::default_live_data_url")]
    pub live_data_url: String,
    /// Base URL of the timetable endpoint (default: the official API host)
    #[serde(default = "Config::default_timetable_url")]
    pub timetable_url: String,
    /// Total request timeout in seconds (default: 30)
    #[serde(default = "Config::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds (default: 10)
    #[serde(default = "Config::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            live_data_url: Self::default_live_data_url(),
            timetable_url: Self::default_timetable_url(),
            request_timeout_secs: Self::default_request_timeout_secs(),
            connect_timeout_secs: Self::default_connect_timeout_secs(),
        }
    }
}

impl Config {
    fn default_live_data_url() -> String {
        "https://panel.simrail.eu:8084".to_string()
    }
    fn default_timetable_url() -> String {
        "https://api1.aws.simrail.eu:8082/api".to_string()
    }
    fn default_request_timeout_secs() -> u64 {
        30
    }
    fn default_connect_timeout_secs() -> u64 {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_official_hosts() {
        let config = Config::default();
        assert_eq!(config.live_data_url, "https://panel.simrail.eu:8084");
        assert_eq!(config.timetable_url, "https://api1.aws.simrail.eu:8082/api");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"live_data_url": "http://localhost:9000"}"#).unwrap();
        assert_eq!(config.live_data_url, "http://localhost:9000");
        assert_eq!(config.timetable_url, "https://api1.aws.simrail.eu:8082/api");
        assert_eq!(config.request_timeout_secs, 30);
    }
}
