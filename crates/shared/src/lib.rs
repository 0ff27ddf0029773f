//! Growth Academy Shared Types and Utilities
//!
//! This crate contains types and utilities shared across the Growth Academy backend.

pub mod db;
pub mod rate_limit;
pub mod types;

pub use db::*;
pub use rate_limit::{Clock, RateLimitConfig, RateLimitService, SlidingWindowLimiter, SystemClock};
pub use types::*;
