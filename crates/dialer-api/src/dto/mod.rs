//! Data Transfer Objects (DTOs) for API requests and responses

pub mod call;
pub mod campaign;
pub mod client;
pub mod common;
pub mod settings;

pub use call::*;
pub use campaign::*;
pub use client::*;
pub use common::*;
pub use settings::*;
