//! Adapters - Implementations of port interfaces.
//!
//! - `auth` - JWT session validation
//! - `http` - axum routes and middleware
//! - `memory` - in-memory stores for tests and local runs
//! - `postgres` - sqlx-backed stores
//! - `stripe` - the billing platform client and its mock

pub mod auth;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
