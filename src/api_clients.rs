pub mod directions;
pub mod fleet;

pub use directions::*;
pub use fleet::*;
