//! Call dispatcher
//!
//! Hands single calls to the provider and records the result on the call
//! and its lead. Dispatch never bills; billing happens when the
//! end-of-call report arrives.

use chrono::{DateTime, Utc};
use dialer_core::{
    models::{
        normalize_phone, Call, CallStatus, Client, NewCall, OutboundCallRequest,
        ProviderCredentials,
    },
    traits::{CallProvider, CallRepository, ClientRepository, LeadRepository},
    AppError, AppResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::constants::{DISPATCH_TIMEOUT_MS, MISSING_NUMBER_REASON};

/// Attempts at recording a call the provider accepted
const INITIATE_ATTEMPTS: usize = 2;

pub struct CallDispatcher {
    calls: Arc<dyn CallRepository>,
    leads: Arc<dyn LeadRepository>,
    clients: Arc<dyn ClientRepository>,
    provider: Arc<dyn CallProvider>,
    timeout: Duration,
}

impl CallDispatcher {
    pub fn new(
        calls: Arc<dyn CallRepository>,
        leads: Arc<dyn LeadRepository>,
        clients: Arc<dyn ClientRepository>,
        provider: Arc<dyn CallProvider>,
    ) -> Self {
        Self {
            calls,
            leads,
            clients,
            provider,
            timeout: Duration::from_millis(DISPATCH_TIMEOUT_MS),
        }
    }

    /// Bound on a single provider request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Place an ad-hoc call for a client
    ///
    /// Creates the call record, then dispatches it.
    ///
    /// # Errors
    ///
    /// - `ClientNotFound` / `ClientInactive`
    /// - `Validation` if the number has no digits
    /// - `ConfigurationMissing` if the client's credentials are incomplete;
    ///   no call record is created
    /// - `DispatchFailed` if the provider rejects the call or times out; the
    ///   call is recorded as Failed
    #[instrument(skip(self))]
    pub async fn dispatch_new(
        &self,
        client_id: i64,
        phone_number: &str,
        lead_id: Option<i64>,
    ) -> AppResult<Call> {
        let client = self
            .clients
            .find_by_id(client_id)
            .await?
            .ok_or_else(|| AppError::ClientNotFound(client_id.to_string()))?;

        if !client.is_active() {
            return Err(AppError::ClientInactive(client_id.to_string()));
        }

        let destination = normalize_phone(phone_number).ok_or_else(|| {
            AppError::Validation(format!("Invalid phone number: {:?}", phone_number))
        })?;

        let credentials = client.credentials()?;

        let call = self
            .calls
            .create(&NewCall {
                client_id,
                lead_id,
                campaign_id: None,
                customer_number: Some(destination.clone()),
                assistant_id: Some(credentials.assistant_id.clone()),
                status: CallStatus::Pending,
            })
            .await?;

        self.place(&call, destination, credentials).await
    }

    /// Dispatch an existing Pending call of a campaign
    ///
    /// A call without a usable number, or a client without complete
    /// credentials, is marked Failed without contacting the provider.
    #[instrument(skip(self, client, call), fields(call_id = call.id))]
    pub async fn dispatch_pending(&self, client: &Client, call: &Call) -> AppResult<Call> {
        if call.status != CallStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Call {} is {}, expected Pending",
                call.id, call.status
            )));
        }

        let Some(destination) = call.customer_number.as_deref().and_then(normalize_phone) else {
            self.record_failure(call, MISSING_NUMBER_REASON).await?;
            return Err(AppError::Validation(format!(
                "Call {}: {}",
                call.id, MISSING_NUMBER_REASON
            )));
        };

        let credentials = match client.credentials() {
            Ok(credentials) => credentials,
            Err(e) => {
                self.record_failure(call, &e.to_string()).await?;
                return Err(e);
            }
        };

        self.place(call, destination, credentials).await
    }

    async fn place(
        &self,
        call: &Call,
        destination: String,
        credentials: ProviderCredentials,
    ) -> AppResult<Call> {
        let request = OutboundCallRequest {
            destination_number: destination,
            credentials,
        };

        let result = match tokio::time::timeout(self.timeout, self.provider.create_call(&request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::DispatchFailed(format!(
                "Provider did not answer within {}ms",
                self.timeout.as_millis()
            ))),
        };

        match result {
            Ok(ack) => {
                let dispatched_at = ack.created_at.unwrap_or_else(Utc::now);
                let updated = match self
                    .attach(call.id, &ack.provider_call_id, dispatched_at)
                    .await
                {
                    Ok(updated) => updated,
                    Err(e) => {
                        let reason = format!(
                            "Provider accepted call as {} but it was not recorded: {}",
                            ack.provider_call_id, e
                        );
                        error!("Call {}: {}", call.id, reason);
                        if let Err(mark_err) = self.record_failure(call, &reason).await {
                            error!("Call {} left Pending: {}", call.id, mark_err);
                        }
                        return Err(e);
                    }
                };

                if let Some(lead_id) = call.lead_id {
                    let response = format!("Call initiated with ID: {}", ack.provider_call_id);
                    if let Err(e) = self
                        .leads
                        .record_outcome(lead_id, CallStatus::Initiated, Some(&response))
                        .await
                    {
                        warn!("Lead {} not updated for call {}: {}", lead_id, call.id, e);
                    }
                }

                info!(
                    "Call {} to {} initiated as {}",
                    call.id, request.destination_number, ack.provider_call_id
                );
                Ok(updated)
            }
            Err(e) => {
                let reason = match &e {
                    AppError::DispatchFailed(msg) => msg.clone(),
                    other => other.to_string(),
                };
                self.record_failure(call, &reason).await?;
                Err(AppError::DispatchFailed(reason))
            }
        }
    }

    /// Store the provider id on the call, retrying transient storage errors
    async fn attach(
        &self,
        call_id: i64,
        provider_call_id: &str,
        dispatched_at: DateTime<Utc>,
    ) -> AppResult<Call> {
        let mut attempt = 1;
        loop {
            match self
                .calls
                .mark_initiated(call_id, provider_call_id, dispatched_at)
                .await
            {
                Ok(call) => return Ok(call),
                Err(e) if e.is_transient() && attempt < INITIATE_ATTEMPTS => {
                    warn!(
                        "Recording dispatch of call {} failed (attempt {}): {}",
                        call_id, attempt, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn record_failure(&self, call: &Call, reason: &str) -> AppResult<()> {
        warn!("Call {} failed: {}", call.id, reason);
        self.calls.mark_failed(call.id, reason).await?;

        if let Some(lead_id) = call.lead_id {
            self.leads
                .record_outcome(lead_id, CallStatus::Failed, Some(reason))
                .await?;
        }
        Ok(())
    }
}
