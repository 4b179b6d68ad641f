//! Shared types, errors, and configuration for Campuspay.
//!
//! This crate provides common types used across all other crates:
//! - Money in integer minor units (no floating point)
//! - Typed IDs for type-safe entity references
//! - Pagination types for list endpoints
//! - Application-wide error types
//! - Configuration management
//! - Caller identity claims and bearer-token validation

pub mod auth;
pub mod config;
pub mod error;
pub mod jwt;
pub mod types;

pub use auth::Claims;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use jwt::{JwtError, JwtService};
