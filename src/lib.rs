// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod server;
pub mod status;

// Re-export commonly used types
pub use api::*;
pub use error::BotError;
pub use models::*;
pub use status::StatusBoard;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
