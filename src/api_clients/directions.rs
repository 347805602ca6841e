//! Directions provider: path, distance and duration between two points
use std::time::Duration;

use itertools::Itertools;
use reqwest::Client;
use tracing::{Instrument, info, info_span};

use crate::model::{Coordinate, directions_model::DirectionsResponse};

/// The best path the provider found
#[derive(Clone, Debug, PartialEq)]
pub struct Directions {
    pub distance_m: f64,
    pub duration_s: f64,
    pub geometry: Vec<Coordinate>,
}

pub trait DirectionsProvider {
    fn directions(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> impl Future<Output = Result<Directions, DirectionsError>> + Send;
}

#[derive(thiserror::Error, Debug)]
pub enum DirectionsError {
    #[error("error fetching directions")]
    HttpRequestError(#[from] reqwest::Error),

    #[error("error parsing directions \n{body}")]
    ParsingError {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("directions provider returned no routes (code {code:?})")]
    NoRoutes { code: Option<String> },
}

/// Mapbox Directions v5 client
#[derive(Clone, Debug)]
pub struct MapboxDirections {
    client: Client,
    base_url: String,
    access_token: String,
}

impl MapboxDirections {
    pub fn new(
        base_url: &str,
        access_token: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }
}

impl DirectionsProvider for MapboxDirections {
    #[tracing::instrument(err, skip(self))]
    async fn directions(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Directions, DirectionsError> {
        // Mapbox wants longitude first
        let url = format!(
            "{}/{},{};{},{}",
            self.base_url, origin.lng, origin.lat, destination.lng, destination.lat
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("alternatives", "false"),
                ("geometries", "geojson"),
                ("overview", "full"),
                ("steps", "false"),
                ("access_token", self.access_token.as_str()),
            ])
            .send()
            .instrument(info_span!("Fetching directions"))
            .await?
            .error_for_status()?;

        let body = response
            .text()
            .instrument(info_span!("Reading body of response"))
            .await?;

        let directions = parse_directions(body)?;

        info!(
            distance_m = directions.distance_m,
            duration_s = directions.duration_s,
            "got directions"
        );

        Ok(directions)
    }
}

fn parse_directions(body: String) -> Result<Directions, DirectionsError> {
    let response: DirectionsResponse = match serde_json::from_str(&body) {
        Ok(response) => response,
        Err(source) => return Err(DirectionsError::ParsingError { source, body }),
    };

    let Some(route) = response.routes.into_iter().next() else {
        return Err(DirectionsError::NoRoutes {
            code: response.code,
        });
    };

    Ok(Directions {
        distance_m: route.distance,
        duration_s: route.duration,
        geometry: route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lng, lat]| Coordinate::new(lat, lng))
            .collect_vec(),
    })
}
