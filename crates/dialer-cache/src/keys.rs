//! Cache key builders
//!
//! # Key Patterns
//!
//! - `rate_multiplier:global` - resolved global billing multiplier
//! - `rate_multiplier:{client_id}` - resolved multiplier for one client
//!
//! # Example
//!
//! ```
//! use dialer_cache::keys;
//!
//! assert_eq!(keys::rate_multiplier_key(None), "rate_multiplier:global");
//! assert_eq!(keys::rate_multiplier_key(Some(7)), "rate_multiplier:7");
//! ```

/// Prefix for resolved rate multipliers
pub const RATE_MULTIPLIER_PREFIX: &str = "rate_multiplier";

/// Build the cache key for a resolved multiplier
pub fn rate_multiplier_key(client_id: Option<i64>) -> String {
    match client_id {
        Some(id) => format!("{}:{}", RATE_MULTIPLIER_PREFIX, id),
        None => format!("{}:global", RATE_MULTIPLIER_PREFIX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_multiplier_keys() {
        assert_eq!(rate_multiplier_key(None), "rate_multiplier:global");
        assert_eq!(rate_multiplier_key(Some(12)), "rate_multiplier:12");
    }
}
