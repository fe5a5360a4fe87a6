//! Application layer - Commands and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Handlers own `Arc<dyn Port>` handles and never touch infrastructure
//! directly.

pub mod handlers;

pub use handlers::*;
