pub mod analyzer;
pub mod api_commands;
pub mod commands;
pub mod models;
pub mod presenter;
pub mod repository;

pub use models::{ActionType, ExecutionResult, NewRecommendation, Recommendation};
pub use presenter::{display_action, DisplayAction, RecommendationCard};
