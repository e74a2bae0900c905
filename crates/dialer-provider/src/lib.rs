//! Outbound calling provider integration
//!
//! Implements the `CallProvider` trait from dialer-core against the
//! provider's REST API: `POST {base_url}/call` places a call and
//! `GET {base_url}/call` lists the account's calls for sync.
//!
//! ```text
//! CallDispatcher
//!       |
//!       v
//! ProviderClient  --(bearer api key, JSON)-->  provider /call
//!       |
//!       v
//! ProviderCall { provider_call_id, created_at, status }
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use dialer_provider::ProviderClient;
//!
//! let client = ProviderClient::new("https://api.vapi.ai", 10_000, "Outbound Campaign")?;
//! let ack = client.create_call(&request).await?;
//! ```

pub mod client;
pub mod types;

pub use client::{ProviderClient, ProviderError};
pub use types::{CreateCallRequest, CreateCallResponse, Customer};
