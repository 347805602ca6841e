use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;

use crate::background_services::MonitorSettings;

#[derive(Parser, Debug, Clone)]
#[command(name = "fleet_trip_monitor")]
#[command(about = "Follows a fleet trip live: performed stops, next stop and travel estimate")]
pub struct Config {
    /// Trip to follow
    #[arg(env = "TRIP_ID")]
    pub trip_id: String,

    #[arg(long, env = "FLEET_API_URL", default_value = "http://localhost:3001/api")]
    pub api_url: String,

    #[arg(
        long,
        env = "DIRECTIONS_API_URL",
        default_value = "https://api.mapbox.com/directions/v5/mapbox/driving-traffic"
    )]
    pub directions_url: String,

    #[arg(long, env = "MAPBOX_ACCESS_TOKEN", hide_env_values = true)]
    pub directions_token: String,

    #[arg(long, env = "TICK_INTERVAL_SECS", default_value_t = 5)]
    pub tick_interval_secs: u64,

    /// Distance in meters at which a stopping point counts as performed
    #[arg(long, env = "GEOFENCE_RADIUS_M", default_value_t = 25.0)]
    pub geofence_radius_m: f64,

    /// Movement in meters below which the travel estimate isn't re-requested
    #[arg(long, env = "MIN_REFRESH_DISTANCE_M", default_value_t = 10.0)]
    pub min_refresh_distance_m: f64,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Serves `/health` and `/status` when set
    #[arg(long, env = "STATUS_LISTEN_ADDR")]
    pub listen: Option<SocketAddr>,

    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Exports spans over OTLP/gRPC when set
    #[arg(long, env = "OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },

    #[error("{name} must be a finite, non-negative number of meters, got {value}")]
    InvalidDistance { name: &'static str, value: f64 },

    #[error("the directions access token is empty")]
    MissingDirectionsToken,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::NotPositive {
                name: "tick interval",
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::NotPositive {
                name: "request timeout",
            });
        }

        for (name, value) in [
            ("geofence radius", self.geofence_radius_m),
            ("minimum refresh distance", self.min_refresh_distance_m),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidDistance { name, value });
            }
        }

        if self.directions_token.trim().is_empty() {
            return Err(ConfigError::MissingDirectionsToken);
        }

        Ok(())
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            geofence_radius_m: self.geofence_radius_m,
            min_refresh_distance_m: self.min_refresh_distance_m,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
