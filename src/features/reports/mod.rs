pub mod aggregator;
pub mod api_commands;
pub mod commands;
pub mod models;

pub use aggregator::ReportPeriod;
pub use models::{DashboardSummary, MonthlyReport};
