//! Dialer Database Layer
//!
//! This crate provides storage for the dialer billing engine. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - PostgreSQL repository implementations for every core repository trait
//! - Row-locked, single-transaction call settlement
//! - An in-memory store implementing the same traits for tests and local runs

pub mod memory;
pub mod pool;
pub mod repositories;

pub use memory::InMemoryStore;
pub use pool::{create_pool, run_migrations, MIGRATOR};
pub use repositories::*;

// Re-export commonly used types
pub use dialer_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres};
