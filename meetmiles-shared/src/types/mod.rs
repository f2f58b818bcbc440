pub mod event;
pub mod query;

pub use event::*;
pub use query::*;
