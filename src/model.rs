pub mod directions_model;
pub mod fleet_api_model;
pub mod trip_model;

pub use trip_model::*;
