//! API layer for the dialer
//!
//! HTTP handlers for the provider webhook, clients and their ledgers,
//! campaigns, ad-hoc calls and billing settings. Handlers validate request
//! shape and delegate to dialer-services; authentication is left to the
//! gateway in front of the service.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;
pub mod state;

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::configure_api;
pub use state::{AppState, Repositories};
