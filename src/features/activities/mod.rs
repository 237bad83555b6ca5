pub mod api_commands;
pub mod commands;
pub mod models;
pub mod poller;
pub mod repository;

pub use models::{Activity, ActivityType, NewActivity};
pub use poller::{UnreadCountPoller, UnreadCountSource};
