//! Shared application state and background tasks

pub mod state;
pub mod sweeper;

pub use state::AppState;
