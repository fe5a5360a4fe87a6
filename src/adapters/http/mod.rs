//! HTTP adapters - REST API implementations.

mod app;
pub mod billing;
pub mod middleware;

pub use app::build_router;
pub use billing::{billing_router, BillingAppState};
