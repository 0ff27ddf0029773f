//! Growth Academy API Library
//!
//! This crate contains the HTTP server components for the Growth Academy
//! backend: configuration, authentication, webhook routes, and the marketing
//! plan generation proxy.

pub mod auth;
pub mod clerk;
pub mod config;
pub mod error;
pub mod planner;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
