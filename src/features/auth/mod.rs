pub mod models;
pub mod service;
pub mod session;

pub use models::{LoginCredentials, SessionState, TokenResponse};
pub use service::AuthService;
pub use session::SessionContext;
