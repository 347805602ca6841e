pub mod trip_monitor;

pub use trip_monitor::*;
