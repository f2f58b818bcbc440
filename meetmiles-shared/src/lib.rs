pub mod types;
pub mod errors;
pub mod observability;
pub mod clients;

pub use types::*;
pub use errors::{AppError, ErrorCode, AppResult};
