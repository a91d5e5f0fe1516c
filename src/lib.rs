// Re-export needed modules for the binary and for integration tests
pub mod config;
pub mod models;
pub mod views;
pub mod ws;

// Re-export main types for convenience
pub use models::*;
pub use ws::{ChatClient, SessionManager};
