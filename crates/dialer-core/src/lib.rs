//! Dialer Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the dialer billing engine. It includes:
//!
//! - Domain models (Client, Transaction, Call, Campaign, Lead, provider events)
//! - Repository and service traits implemented by the storage and provider crates
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
