mod counters;
mod logging;

pub use counters::*;
pub use logging::*;
