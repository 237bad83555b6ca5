pub mod activities;
pub mod auth;
pub mod negotiations;
pub mod recommendations;
pub mod reports;
pub mod subscriptions;
