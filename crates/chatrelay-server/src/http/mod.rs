//! HTTP surface for the relay

pub mod chat;
mod error;
pub mod middleware;
pub mod router;
pub mod status;

pub use error::ApiError;
pub use router::build_router;
