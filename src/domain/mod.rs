//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, auth, errors)
//! - `billing` - Subscription status, mirrored billing records and platform events

pub mod billing;
pub mod foundation;
