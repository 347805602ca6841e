use serde::{Deserialize, Serialize};

/// Mapbox Directions v5 response, only the fields the monitor reads
#[derive(Debug, Deserialize, Serialize)]
pub struct DirectionsResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DirectionsRoute {
    /// Meters
    pub distance: f64,
    /// Seconds
    pub duration: f64,
    pub geometry: DirectionsGeometry,
}

/// GeoJSON LineString
#[derive(Debug, Deserialize, Serialize)]
pub struct DirectionsGeometry {
    /// [longitude, latitude] pairs
    pub coordinates: Vec<[f64; 2]>,
}
