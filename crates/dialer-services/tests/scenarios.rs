//! End-to-end billing scenarios against the in-memory store

use async_trait::async_trait;
use dialer_core::{
    models::{
        CallListQuery, CallStatus, CampaignStatus, Client, NewClient, OutboundCallRequest,
        ProviderCall, TransactionType,
    },
    traits::{CallProvider, CallRepository, CampaignRepository, ClientRepository, LedgerRepository},
    AppError, AppResult,
};
use dialer_db::InMemoryStore;
use dialer_services::{
    CallDispatcher, CallSync, CampaignOrchestrator, CampaignService, FixedRatePolicy, LeadInput,
    NewCampaignRequest, ReconciliationEngine, ReconciliationOutcome,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Provider that answers from a per-number script
#[derive(Default)]
struct ScriptedProvider {
    script: Mutex<HashMap<String, Result<String, String>>>,
    requests: Mutex<Vec<String>>,
    listing: Mutex<Vec<Value>>,
}

impl ScriptedProvider {
    fn accept(&self, number: &str, provider_call_id: &str) {
        self.script
            .lock()
            .insert(number.to_string(), Ok(provider_call_id.to_string()));
    }

    fn reject(&self, number: &str, reason: &str) {
        self.script
            .lock()
            .insert(number.to_string(), Err(reason.to_string()));
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    fn list(&self, calls: Vec<Value>) {
        *self.listing.lock() = calls;
    }
}

#[async_trait]
impl CallProvider for ScriptedProvider {
    async fn create_call(&self, request: &OutboundCallRequest) -> AppResult<ProviderCall> {
        self.requests.lock().push(request.destination_number.clone());

        let answer = self.script.lock().get(&request.destination_number).cloned();
        match answer {
            Some(Ok(id)) => Ok(ProviderCall {
                provider_call_id: id,
                created_at: None,
                status: Some("queued".to_string()),
            }),
            Some(Err(reason)) => Err(AppError::DispatchFailed(reason)),
            None => Err(AppError::DispatchFailed(format!(
                "unscripted number {}",
                request.destination_number
            ))),
        }
    }

    async fn list_calls(&self, _query: &CallListQuery) -> AppResult<Vec<Value>> {
        Ok(self.listing.lock().clone())
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    provider: Arc<ScriptedProvider>,
    engine: Arc<ReconciliationEngine>,
    dispatcher: Arc<CallDispatcher>,
    campaigns: CampaignService,
    orchestrator: CampaignOrchestrator,
    client: Client,
}

async fn harness(balance: Decimal) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(ScriptedProvider::default());

    let client = ClientRepository::create(
        store.as_ref(),
        &NewClient {
            name: "Acme".to_string(),
            api_key: Some("key".to_string()),
            assistant_id: Some("asst-1".to_string()),
            phone_number_id: Some("pn-1".to_string()),
            estimated_seconds_per_call: dec!(60),
        },
    )
    .await
    .unwrap();
    store
        .credit(client.id, balance, "opening balance", None)
        .await
        .unwrap();
    let client = ClientRepository::find_by_id(store.as_ref(), client.id)
        .await
        .unwrap()
        .unwrap();

    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FixedRatePolicy(dec!(2))),
    ));
    let dispatcher = Arc::new(CallDispatcher::new(
        store.clone(),
        store.clone(),
        store.clone(),
        provider.clone(),
    ));
    let campaigns = CampaignService::new(store.clone(), store.clone(), store.clone(), store.clone());
    let orchestrator =
        CampaignOrchestrator::new(store.clone(), store.clone(), store.clone(), dispatcher.clone());

    Harness {
        store,
        provider,
        engine,
        dispatcher,
        campaigns,
        orchestrator,
        client,
    }
}

fn end_of_call_report(provider_call_id: &str, duration: i64) -> Value {
    json!({
        "message": {
            "type": "end-of-call-report",
            "call": {"id": provider_call_id, "assistantId": "asst-1"},
            "durationSeconds": duration,
            "endedReason": "customer-ended-call"
        }
    })
}

fn status_update(provider_call_id: &str, status: &str) -> Value {
    json!({
        "message": {
            "type": "status-update",
            "call": {"id": provider_call_id},
            "status": status
        }
    })
}

async fn assert_ledger_balanced(store: &InMemoryStore, client_id: i64) {
    assert_eq!(
        store.balance_of(client_id).await.unwrap(),
        store.transaction_sum(client_id).await.unwrap()
    );
}

async fn debits(store: &InMemoryStore, client_id: i64) -> Vec<Decimal> {
    let (transactions, _) = store.list_transactions(client_id, 100, 0).await.unwrap();
    transactions
        .into_iter()
        .filter(|t| t.transaction_type == TransactionType::Debit)
        .map(|t| t.seconds)
        .collect()
}

#[tokio::test]
async fn scenario_a_single_report_debits_billable_seconds() {
    let h = harness(dec!(600)).await;
    h.provider.accept("+15550001111", "pc-a");

    let call = h
        .dispatcher
        .dispatch_new(h.client.id, "+15550001111", None)
        .await
        .unwrap();

    h.engine.handle(&end_of_call_report("pc-a", 100)).await.unwrap();

    assert_eq!(debits(&h.store, h.client.id).await, vec![dec!(-200)]);
    assert_eq!(h.store.balance_of(h.client.id).await.unwrap(), dec!(400));

    let call = CallRepository::find_by_id(h.store.as_ref(), call.id)
        .await
        .unwrap()
        .unwrap();
    assert!(call.cost_deducted);
    assert_eq!(call.status, CallStatus::Completed);
    assert_ledger_balanced(&h.store, h.client.id).await;
}

#[tokio::test]
async fn scenario_b_duplicate_report_is_billed_once() {
    let h = harness(dec!(600)).await;
    h.provider.accept("+15550001111", "pc-b");
    h.dispatcher
        .dispatch_new(h.client.id, "+15550001111", None)
        .await
        .unwrap();

    let first = h.engine.handle(&end_of_call_report("pc-b", 100)).await.unwrap();
    let second = h.engine.handle(&end_of_call_report("pc-b", 100)).await.unwrap();

    assert!(matches!(first, ReconciliationOutcome::Billed { .. }));
    assert!(matches!(second, ReconciliationOutcome::AlreadyBilled { .. }));
    assert_eq!(h.store.balance_of(h.client.id).await.unwrap(), dec!(400));
    assert_eq!(debits(&h.store, h.client.id).await.len(), 1);
    assert_ledger_balanced(&h.store, h.client.id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_c_concurrent_reports_are_billed_once() {
    let h = harness(dec!(600)).await;
    h.provider.accept("+15550001111", "pc-c");
    h.dispatcher
        .dispatch_new(h.client.id, "+15550001111", None)
        .await
        .unwrap();

    let body = end_of_call_report("pc-c", 100);
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = h.engine.clone();
            let body = body.clone();
            tokio::spawn(async move { engine.handle(&body).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(debits(&h.store, h.client.id).await, vec![dec!(-200)]);
    assert_eq!(h.store.balance_of(h.client.id).await.unwrap(), dec!(400));
    assert_ledger_balanced(&h.store, h.client.id).await;
}

#[tokio::test]
async fn scenario_d_early_status_update_is_dropped() {
    let h = harness(dec!(600)).await;

    let early = h.engine.handle(&status_update("pc-d", "ended")).await.unwrap();
    assert!(matches!(early, ReconciliationOutcome::Orphaned { .. }));
    assert!(h.store.find_by_provider_id("pc-d").await.unwrap().is_none());

    h.provider.accept("+15550001111", "pc-d");
    let call = h
        .dispatcher
        .dispatch_new(h.client.id, "+15550001111", None)
        .await
        .unwrap();
    assert_eq!(call.status, CallStatus::Initiated);

    h.engine.handle(&end_of_call_report("pc-d", 100)).await.unwrap();
    h.engine.handle(&end_of_call_report("pc-d", 100)).await.unwrap();

    let call = CallRepository::find_by_id(h.store.as_ref(), call.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(call.status, CallStatus::Completed);
    assert_eq!(debits(&h.store, h.client.id).await.len(), 1);
    assert_eq!(h.store.balance_of(h.client.id).await.unwrap(), dec!(400));
}

#[tokio::test]
async fn scenario_e_one_failed_dispatch_does_not_abort_campaign() {
    let h = harness(dec!(600)).await;
    let numbers = [
        "+15550000001",
        "+15550000002",
        "+15550000003",
        "+15550000004",
        "+15550000005",
    ];
    for (i, number) in numbers.iter().enumerate() {
        if i == 2 {
            h.provider.reject(number, "HTTP error 400: invalid number");
        } else {
            h.provider.accept(number, &format!("pc-e{}", i));
        }
    }

    let campaign = h
        .campaigns
        .create_campaign(&NewCampaignRequest {
            client_id: h.client.id,
            name: "Five leads".to_string(),
            kind: None,
            leads: numbers
                .iter()
                .map(|n| LeadInput {
                    phone_number: n.to_string(),
                    name: None,
                })
                .collect(),
        })
        .await
        .unwrap();

    let report = h.orchestrator.run_campaign(campaign.id).await.unwrap();
    assert_eq!(report.dispatched, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(report.status, CampaignStatus::Initiated);
    assert_eq!(h.provider.requests().len(), 5);

    let calls = h.store.list_by_campaign(campaign.id).await.unwrap();
    let initiated = calls.iter().filter(|c| c.status == CallStatus::Initiated).count();
    let failed: Vec<_> = calls.iter().filter(|c| c.status == CallStatus::Failed).collect();
    assert_eq!(initiated, 4);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].customer_number.as_deref(), Some("+15550000003"));

    let stored = CampaignRepository::find_by_id(h.store.as_ref(), campaign.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, CampaignStatus::Initiated);
    assert_eq!(stored.processed_leads, 4);
    assert!(debits(&h.store, h.client.id).await.is_empty());
}

#[tokio::test]
async fn campaign_completes_once_every_report_arrives() {
    let h = harness(dec!(600)).await;
    h.provider.accept("+15550000001", "pc-f1");
    h.provider.accept("+15550000002", "pc-f2");

    let campaign = h
        .campaigns
        .create_campaign(&NewCampaignRequest {
            client_id: h.client.id,
            name: "Two leads".to_string(),
            kind: None,
            leads: ["+15550000001", "+15550000002"]
                .iter()
                .map(|n| LeadInput {
                    phone_number: n.to_string(),
                    name: None,
                })
                .collect(),
        })
        .await
        .unwrap();
    h.orchestrator.run_campaign(campaign.id).await.unwrap();

    h.engine.handle(&end_of_call_report("pc-f1", 30)).await.unwrap();
    let midway = CampaignRepository::find_by_id(h.store.as_ref(), campaign.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(midway.status, CampaignStatus::Initiated);
    assert_eq!(midway.actual_seconds, dec!(30));

    h.engine.handle(&end_of_call_report("pc-f2", 45)).await.unwrap();
    let done = CampaignRepository::find_by_id(h.store.as_ref(), campaign.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, CampaignStatus::Completed);
    assert_eq!(done.actual_seconds, dec!(75));
    assert_eq!(done.processed_leads, 2);

    // 600 - (30 + 45) * 2
    assert_eq!(h.store.balance_of(h.client.id).await.unwrap(), dec!(450));
    assert_ledger_balanced(&h.store, h.client.id).await;
}

#[tokio::test]
async fn lost_webhook_is_recovered_by_sync_and_billed_once() {
    let h = harness(dec!(600)).await;
    h.provider.accept("+15550001111", "pc-lost");
    h.provider.accept("+15550002222", "pc-seen");

    h.dispatcher
        .dispatch_new(h.client.id, "+15550001111", None)
        .await
        .unwrap();
    h.dispatcher
        .dispatch_new(h.client.id, "+15550002222", None)
        .await
        .unwrap();

    // only one report reaches the webhook
    h.engine.handle(&end_of_call_report("pc-seen", 50)).await.unwrap();

    h.provider.list(vec![
        json!({
            "id": "pc-lost",
            "assistantId": "asst-1",
            "status": "ended",
            "startedAt": "2024-05-01T10:00:00Z",
            "endedAt": "2024-05-01T10:01:10Z"
        }),
        json!({
            "id": "pc-seen",
            "assistantId": "asst-1",
            "status": "ended",
            "startedAt": "2024-05-01T11:00:00Z",
            "endedAt": "2024-05-01T11:00:50Z"
        }),
    ]);

    let sync = CallSync::new(h.store.clone(), h.provider.clone(), h.engine.clone());
    let report = sync.sync_client(h.client.id).await.unwrap();
    assert_eq!(report.billed, 1);
    assert_eq!(report.already_billed, 1);

    let again = sync.sync_client(h.client.id).await.unwrap();
    assert_eq!(again.billed, 0);

    let mut charged = debits(&h.store, h.client.id).await;
    charged.sort();
    assert_eq!(charged, vec![dec!(-140), dec!(-100)]);
    assert_eq!(h.store.balance_of(h.client.id).await.unwrap(), dec!(360));

    let lost = h.store.find_by_provider_id("pc-lost").await.unwrap().unwrap();
    assert_eq!(lost.status, CallStatus::Completed);
    assert!(lost.cost_deducted);
    assert_ledger_balanced(&h.store, h.client.id).await;
}
