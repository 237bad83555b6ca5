pub mod api_commands;
pub mod commands;
pub mod models;
pub mod repository;

pub use models::{BillingCycle, Subscription, SubscriptionStatus};
