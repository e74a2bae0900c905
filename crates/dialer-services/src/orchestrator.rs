//! Campaign orchestrator
//!
//! Runs a Draft campaign: checks preconditions, moves it to Running,
//! dispatches its Pending calls one at a time and finally moves it to
//! Initiated. A failed dispatch is recorded and the loop moves on.

use dialer_core::{
    models::{CampaignRunReport, CampaignStatus, Client},
    traits::{CallRepository, CampaignRepository, ClientRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::campaign::refresh_progress;
use crate::dispatcher::CallDispatcher;

pub struct CampaignOrchestrator {
    campaigns: Arc<dyn CampaignRepository>,
    calls: Arc<dyn CallRepository>,
    clients: Arc<dyn ClientRepository>,
    dispatcher: Arc<CallDispatcher>,
}

impl CampaignOrchestrator {
    pub fn new(
        campaigns: Arc<dyn CampaignRepository>,
        calls: Arc<dyn CallRepository>,
        clients: Arc<dyn ClientRepository>,
        dispatcher: Arc<CallDispatcher>,
    ) -> Self {
        Self {
            campaigns,
            calls,
            clients,
            dispatcher,
        }
    }

    /// Run a Draft campaign
    ///
    /// # Errors
    ///
    /// Only precondition failures are returned; individual dispatch
    /// failures are counted in the report.
    ///
    /// - `CampaignNotFound`
    /// - `InvalidCampaignState` if the campaign is not in Draft
    /// - `ClientNotFound` / `ClientInactive`
    /// - `ConfigurationMissing` if the client has no complete credentials
    /// - `InsufficientBalance` if the balance does not cover the estimate
    #[instrument(skip(self))]
    pub async fn run_campaign(&self, campaign_id: i64) -> AppResult<CampaignRunReport> {
        let campaign = self
            .campaigns
            .find_by_id(campaign_id)
            .await?
            .ok_or_else(|| AppError::CampaignNotFound(campaign_id.to_string()))?;

        if campaign.status != CampaignStatus::Draft {
            return Err(AppError::InvalidCampaignState(format!(
                "Campaign {} is {}, expected Draft",
                campaign_id, campaign.status
            )));
        }

        let client = self.ready_client(campaign.client_id).await?;
        let pending = self.calls.pending_for_campaign(campaign_id).await?;

        if !client.can_afford(pending.len()) {
            let required = client.estimated_seconds_for(pending.len());
            warn!(
                "Client {} cannot start campaign {}: needs {}s, has {}s",
                client.id, campaign_id, required, client.balance_seconds
            );
            return Err(AppError::InsufficientBalance {
                required: required.to_string(),
                available: client.balance_seconds.to_string(),
            });
        }

        self.campaigns
            .transition(campaign_id, &[CampaignStatus::Draft], CampaignStatus::Running)
            .await?
            .ok_or_else(|| {
                AppError::InvalidCampaignState(format!("Campaign {} was already started", campaign_id))
            })?;

        info!(
            "Campaign {} running: {} calls to dispatch",
            campaign_id,
            pending.len()
        );

        let mut dispatched = 0;
        let mut failed = 0;

        for call in &pending {
            match self.dispatcher.dispatch_pending(&client, call).await {
                Ok(_) => {
                    dispatched += 1;
                    if let Err(e) =
                        refresh_progress(self.calls.as_ref(), self.campaigns.as_ref(), campaign_id)
                            .await
                    {
                        warn!("Campaign {} progress not refreshed: {}", campaign_id, e);
                    }
                }
                Err(e) => {
                    warn!("Campaign {} call {} not dispatched: {}", campaign_id, call.id, e);
                    failed += 1;
                }
            }
        }

        let mut status = match self
            .campaigns
            .transition(campaign_id, &[CampaignStatus::Running], CampaignStatus::Initiated)
            .await
        {
            Ok(Some(campaign)) => campaign.status,
            // Reports may already have completed the campaign
            Ok(None) => {
                info!("Campaign {} left Running before the dispatch loop ended", campaign_id);
                self.campaigns
                    .find_by_id(campaign_id)
                    .await
                    .ok()
                    .flatten()
                    .map(|c| c.status)
                    .unwrap_or(CampaignStatus::Completed)
            }
            Err(e) => {
                error!("Campaign {} could not be moved to Initiated: {}", campaign_id, e);
                CampaignStatus::Running
            }
        };

        match refresh_progress(self.calls.as_ref(), self.campaigns.as_ref(), campaign_id).await {
            Ok(campaign) => status = campaign.status,
            Err(e) => warn!("Campaign {} final progress not refreshed: {}", campaign_id, e),
        }

        info!(
            "Campaign {} dispatched {} calls, {} failed, now {}",
            campaign_id, dispatched, failed, status
        );

        Ok(CampaignRunReport {
            campaign_id,
            dispatched,
            failed,
            status,
        })
    }

    async fn ready_client(&self, client_id: i64) -> AppResult<Client> {
        let client = self
            .clients
            .find_by_id(client_id)
            .await?
            .ok_or_else(|| AppError::ClientNotFound(client_id.to_string()))?;

        if !client.is_active() {
            return Err(AppError::ClientInactive(client_id.to_string()));
        }

        client.credentials()?;
        Ok(client)
    }
}
