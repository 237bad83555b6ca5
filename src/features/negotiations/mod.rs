pub mod api_commands;
pub mod board;
pub mod commands;
pub mod models;
pub mod repository;
pub mod responder;
pub mod state;

pub use models::{FinalOffer, Message, Negotiation, NegotiationStatus};
pub use responder::{ProviderResponder, ScriptedResponder};
