//! ChatRelay Server - HTTP surface for the streaming relay

pub mod config;
pub mod http;
pub mod state;

pub use config::Config;
pub use state::AppState;
