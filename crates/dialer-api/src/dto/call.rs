//! Call DTOs

use serde::Deserialize;
use validator::Validate;

/// Ad-hoc dispatch request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DispatchCallRequest {
    pub client_id: i64,

    #[validate(length(min = 1, max = 32, message = "Phone number is required"))]
    pub phone_number: String,

    pub lead_id: Option<i64>,
}
