pub mod estimate_refresher;
pub mod progress_tracker;
pub mod target_selector;

pub use estimate_refresher::*;
pub use progress_tracker::*;
pub use target_selector::*;
