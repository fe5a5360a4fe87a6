//! Trainer Billing - subscription reconciliation for a coaching platform.
//!
//! Keeps the local record of who pays which trainer in step with the
//! billing platform: webhooks and checkout redirects are reconciled into a
//! customer registry, a subscription ledger and the trainer/member links.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
