//! Settings DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Optional client scope for multiplier reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MultiplierQuery {
    pub client_id: Option<i64>,
}

/// Multiplier update; positivity is checked by the rate policy
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RateMultiplierRequest {
    pub multiplier: Decimal,
    pub client_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateMultiplierResponse {
    pub multiplier: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
}
