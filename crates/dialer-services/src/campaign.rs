//! Campaign builder
//!
//! Turns a name and a list of phone numbers into a Draft campaign with one
//! Pending call per distinct lead.

use dialer_core::{
    models::{
        normalize_phone, Call, CallStatus, Campaign, CampaignStats, Client, NewCall, NewCampaign,
    },
    traits::{CallRepository, CampaignRepository, ClientRepository, LeadRepository},
    AppError, AppResult,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default campaign kind
pub const OUTBOUND_KIND: &str = "outbound";

/// One lead in a campaign request
#[derive(Debug, Clone, Default)]
pub struct LeadInput {
    pub phone_number: String,
    pub name: Option<String>,
}

/// Request to create a campaign
#[derive(Debug, Clone, Default)]
pub struct NewCampaignRequest {
    pub client_id: i64,
    pub name: String,
    pub kind: Option<String>,
    pub leads: Vec<LeadInput>,
}

/// Recompute a campaign's aggregates from its calls
///
/// Completes the campaign when it is Running or Initiated and nothing is
/// outstanding.
pub async fn refresh_progress(
    calls: &dyn CallRepository,
    campaigns: &dyn CampaignRepository,
    campaign_id: i64,
) -> AppResult<Campaign> {
    let progress = calls.campaign_progress(campaign_id).await?;
    let campaign = campaigns.apply_progress(campaign_id, &progress).await?;

    debug!(
        "Campaign {} progress: {} processed, {}s actual, {} outstanding",
        campaign_id, progress.processed_leads, progress.actual_seconds, progress.outstanding
    );

    Ok(campaign)
}

pub struct CampaignService {
    campaigns: Arc<dyn CampaignRepository>,
    calls: Arc<dyn CallRepository>,
    leads: Arc<dyn LeadRepository>,
    clients: Arc<dyn ClientRepository>,
}

impl CampaignService {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        calls: Arc<dyn CallRepository>,
        leads: Arc<dyn LeadRepository>,
        clients: Arc<dyn ClientRepository>,
    ) -> Self {
        Self {
            campaigns,
            calls,
            leads,
            clients,
        }
    }

    async fn client(&self, client_id: i64) -> AppResult<Client> {
        self.clients
            .find_by_id(client_id)
            .await?
            .ok_or_else(|| AppError::ClientNotFound(client_id.to_string()))
    }

    async fn active_client(&self, client_id: i64) -> AppResult<Client> {
        let client = self.client(client_id).await?;

        if !client.is_active() {
            return Err(AppError::ClientInactive(client_id.to_string()));
        }
        Ok(client)
    }

    /// Create a Draft campaign with one Pending call per distinct lead
    ///
    /// Numbers are normalized and deduplicated; numbers without digits are
    /// skipped. Existing leads of the client are reused.
    ///
    /// # Errors
    ///
    /// - `Validation` if the name is blank or no usable number remains
    /// - `ClientNotFound` / `ClientInactive` for the owning client
    #[instrument(skip(self, request), fields(client_id = request.client_id, leads = request.leads.len()))]
    pub async fn create_campaign(&self, request: &NewCampaignRequest) -> AppResult<Campaign> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Campaign name is required".to_string()));
        }

        let client = self.active_client(request.client_id).await?;

        let mut seen = HashSet::new();
        let mut leads = Vec::with_capacity(request.leads.len());
        for input in &request.leads {
            match normalize_phone(&input.phone_number) {
                Some(phone) if seen.insert(phone.clone()) => leads.push((phone, input.name.as_deref())),
                Some(phone) => debug!("Skipping duplicate lead {}", phone),
                None => warn!("Skipping lead with unusable number {:?}", input.phone_number),
            }
        }

        if leads.is_empty() {
            return Err(AppError::Validation(
                "Campaign needs at least one valid phone number".to_string(),
            ));
        }

        let campaign = self
            .campaigns
            .create(&NewCampaign {
                client_id: client.id,
                name: name.to_string(),
                kind: request
                    .kind
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .unwrap_or_else(|| OUTBOUND_KIND.to_string()),
                total_leads: leads.len() as i64,
                estimated_seconds: client.estimated_seconds_for(leads.len()),
            })
            .await?;

        for (phone, lead_name) in &leads {
            let lead = self
                .leads
                .upsert(client.id, phone, *lead_name, Some(campaign.id))
                .await?;

            self.calls
                .create(&NewCall {
                    client_id: client.id,
                    lead_id: Some(lead.id),
                    campaign_id: Some(campaign.id),
                    customer_number: Some(phone.clone()),
                    assistant_id: client.assistant_id.clone(),
                    status: CallStatus::Pending,
                })
                .await?;

            self.leads
                .record_outcome(lead.id, CallStatus::Pending, None)
                .await?;
        }

        info!(
            "Created campaign {} '{}' with {} leads ({}s estimated)",
            campaign.id, campaign.name, campaign.total_leads, campaign.estimated_seconds
        );
        Ok(campaign)
    }

    pub async fn get_campaign(&self, campaign_id: i64) -> AppResult<Campaign> {
        self.campaigns
            .find_by_id(campaign_id)
            .await?
            .ok_or_else(|| AppError::CampaignNotFound(campaign_id.to_string()))
    }

    pub async fn list_calls(&self, campaign_id: i64) -> AppResult<Vec<Call>> {
        self.get_campaign(campaign_id).await?;
        self.calls.list_by_campaign(campaign_id).await
    }

    /// The client's campaigns, newest first
    pub async fn list_for_client(&self, client_id: i64) -> AppResult<Vec<Campaign>> {
        self.client(client_id).await?;
        self.campaigns.list_by_client(client_id).await
    }

    /// Campaign count plus completed calls and their talk time
    #[instrument(skip(self))]
    pub async fn stats(&self, client_id: i64) -> AppResult<CampaignStats> {
        self.client(client_id).await?;

        let total_campaigns = self.campaigns.list_by_client(client_id).await?.len() as i64;
        let (completed_calls, total_duration_seconds) =
            self.calls.completed_totals(client_id).await?;

        Ok(CampaignStats {
            client_id,
            total_campaigns,
            completed_calls,
            total_duration_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialer_core::models::{CallCompletion, CampaignStatus, ClientStatus, NewClient};
    use dialer_db::InMemoryStore;
    use rust_decimal_macros::dec;

    async fn setup() -> (Arc<InMemoryStore>, CampaignService, Client) {
        let store = Arc::new(InMemoryStore::new());
        let client = ClientRepository::create(
            store.as_ref(),
            &NewClient {
                name: "Acme".to_string(),
                assistant_id: Some("asst-1".to_string()),
                estimated_seconds_per_call: dec!(120),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let service = CampaignService::new(store.clone(), store.clone(), store.clone(), store.clone());
        (store, service, client)
    }

    fn leads(numbers: &[&str]) -> Vec<LeadInput> {
        numbers
            .iter()
            .map(|n| LeadInput {
                phone_number: n.to_string(),
                name: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_create_campaign_dedupes_leads() {
        let (store, service, client) = setup().await;

        let campaign = service
            .create_campaign(&NewCampaignRequest {
                client_id: client.id,
                name: "Spring".to_string(),
                kind: None,
                leads: leads(&["+1 555 000 1111", "15550001111", "(555) 000-2222", "n/a"]),
            })
            .await
            .unwrap();

        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.kind, OUTBOUND_KIND);
        assert_eq!(campaign.total_leads, 2);
        assert_eq!(campaign.estimated_seconds, dec!(240));

        let calls = store.pending_for_campaign(campaign.id).await.unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.assistant_id.as_deref() == Some("asst-1")));

        let lead_id = calls[0].lead_id.unwrap();
        let lead = LeadRepository::find_by_id(store.as_ref(), lead_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lead.status, CallStatus::Pending);
        assert_eq!(lead.campaign_id, Some(campaign.id));
    }

    #[tokio::test]
    async fn test_leads_reused_across_campaigns() {
        let (store, service, client) = setup().await;
        let request = |name: &str| NewCampaignRequest {
            client_id: client.id,
            name: name.to_string(),
            kind: None,
            leads: leads(&["+15550001111"]),
        };

        let first = service.create_campaign(&request("one")).await.unwrap();
        let second = service.create_campaign(&request("two")).await.unwrap();

        let a = store.list_by_campaign(first.id).await.unwrap();
        let b = store.list_by_campaign(second.id).await.unwrap();
        assert_eq!(a[0].lead_id, b[0].lead_id);
    }

    #[tokio::test]
    async fn test_create_campaign_validation() {
        let (store, service, client) = setup().await;

        let blank = service
            .create_campaign(&NewCampaignRequest {
                client_id: client.id,
                name: "  ".to_string(),
                kind: None,
                leads: leads(&["+15550001111"]),
            })
            .await;
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let no_numbers = service
            .create_campaign(&NewCampaignRequest {
                client_id: client.id,
                name: "Empty".to_string(),
                kind: None,
                leads: leads(&["none", ""]),
            })
            .await;
        assert!(matches!(no_numbers, Err(AppError::Validation(_))));

        store.set_status(client.id, ClientStatus::Inactive).await.unwrap();
        let inactive = service
            .create_campaign(&NewCampaignRequest {
                client_id: client.id,
                name: "Late".to_string(),
                kind: None,
                leads: leads(&["+15550001111"]),
            })
            .await;
        assert!(matches!(inactive, Err(AppError::ClientInactive(_))));
    }

    #[tokio::test]
    async fn test_get_missing_campaign() {
        let (_store, service, _client) = setup().await;
        assert!(matches!(
            service.get_campaign(404).await,
            Err(AppError::CampaignNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_campaigns_listed_for_client_newest_first() {
        let (_store, service, client) = setup().await;
        let request = |name: &str| NewCampaignRequest {
            client_id: client.id,
            name: name.to_string(),
            kind: None,
            leads: leads(&["+15550001111"]),
        };

        let first = service.create_campaign(&request("one")).await.unwrap();
        let second = service.create_campaign(&request("two")).await.unwrap();

        let listed = service.list_for_client(client.id).await.unwrap();
        assert_eq!(
            listed.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        assert!(matches!(
            service.list_for_client(404).await,
            Err(AppError::ClientNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_count_campaigns_and_completed_calls() {
        let (store, service, client) = setup().await;
        let campaign = service
            .create_campaign(&NewCampaignRequest {
                client_id: client.id,
                name: "Spring".to_string(),
                kind: None,
                leads: leads(&["+15550001111", "+15550002222"]),
            })
            .await
            .unwrap();

        let empty = service.stats(client.id).await.unwrap();
        assert_eq!(empty.total_campaigns, 1);
        assert_eq!(empty.completed_calls, 0);
        assert_eq!(empty.total_duration_seconds, dec!(0));

        let pending = store.pending_for_campaign(campaign.id).await.unwrap();
        store
            .mark_initiated(pending[0].id, "pc-1", chrono::Utc::now())
            .await
            .unwrap();
        for (pid, seconds) in [("pc-1", dec!(40)), ("pc-direct", dec!(20))] {
            store
                .upsert_completed(&CallCompletion {
                    provider_call_id: pid.to_string(),
                    client_id: client.id,
                    duration_seconds: seconds,
                    billable_seconds: seconds * dec!(2),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let stats = service.stats(client.id).await.unwrap();
        assert_eq!(
            stats,
            CampaignStats {
                client_id: client.id,
                total_campaigns: 1,
                completed_calls: 2,
                total_duration_seconds: dec!(60),
            }
        );
    }
}
