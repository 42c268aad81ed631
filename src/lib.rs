//! Tiergate - Tiered Rate Limiting Gate
//!
//! This crate decides, for every inbound request, whether the caller has used
//! up the quota of its subscription tier. Quotas are enforced with a
//! sliding-window log kept in a shared Redis-compatible store, so any number
//! of service instances see the same budget. When the store cannot be
//! reached, requests are let through.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
