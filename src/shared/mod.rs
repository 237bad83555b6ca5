pub mod api_client;
pub mod config;
pub mod database;
pub mod errors;
pub mod in_flight;
pub mod utils;
pub mod view_scope;

pub use errors::{AppError, AppResult};
