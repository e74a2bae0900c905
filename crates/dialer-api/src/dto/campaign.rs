//! Campaign DTOs

use dialer_services::{LeadInput, NewCampaignRequest};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// One lead in a campaign creation request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LeadRequest {
    #[validate(length(min = 1, max = 32))]
    pub phone_number: String,

    #[validate(length(max = 200))]
    pub name: Option<String>,
}

/// Campaign creation request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCampaignRequest {
    pub client_id: i64,

    #[validate(length(min = 1, max = 200, message = "Campaign name is required"))]
    pub name: String,

    pub kind: Option<String>,

    #[validate(length(min = 1, message = "At least one lead is required"), nested)]
    pub leads: Vec<LeadRequest>,
}

impl CreateCampaignRequest {
    pub fn to_request(&self) -> NewCampaignRequest {
        NewCampaignRequest {
            client_id: self.client_id,
            name: self.name.clone(),
            kind: self.kind.clone(),
            leads: self
                .leads
                .iter()
                .map(|l| LeadInput {
                    phone_number: l.phone_number.clone(),
                    name: l.name.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_campaign_request_validation() {
        let req: CreateCampaignRequest = serde_json::from_value(json!({
            "client_id": 1,
            "name": "Spring",
            "leads": [{"phone_number": "+15550001111", "name": "Ana"}]
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.to_request().leads[0].name.as_deref(), Some("Ana"));

        let empty: CreateCampaignRequest =
            serde_json::from_value(json!({"client_id": 1, "name": "Spring", "leads": []})).unwrap();
        assert!(empty.validate().is_err());

        let bad_lead: CreateCampaignRequest = serde_json::from_value(json!({
            "client_id": 1,
            "name": "Spring",
            "leads": [{"phone_number": ""}]
        }))
        .unwrap();
        assert!(bad_lead.validate().is_err());
    }
}
