//! Shared application state
//!
//! Built once at startup and handed to every worker as `web::Data<AppState>`.

use dialer_cache::RedisCache;
use dialer_core::{
    config::{BillingConfig, ProviderConfig},
    traits::{
        CallProvider, CallRepository, CampaignRepository, ClientRepository, EventLogRepository,
        LeadRepository, LedgerRepository, SettingsRepository,
    },
};
use dialer_db::{
    InMemoryStore, PgCallRepository, PgCampaignRepository, PgClientRepository,
    PgEventLogRepository, PgLeadRepository, PgLedgerRepository, PgPool, PgSettingsRepository,
};
use dialer_services::{
    CallDispatcher, CallSync, CampaignOrchestrator, CampaignService, LedgerAuditor,
    LedgerService, ReconciliationEngine, SettingsRatePolicy,
};
use std::sync::Arc;
use std::time::Duration;

/// Storage backends for every repository trait
#[derive(Clone)]
pub struct Repositories {
    pub clients: Arc<dyn ClientRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub calls: Arc<dyn CallRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub leads: Arc<dyn LeadRepository>,
    pub events: Arc<dyn EventLogRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            clients: Arc::new(PgClientRepository::new(pool.clone())),
            ledger: Arc::new(PgLedgerRepository::new(pool.clone())),
            calls: Arc::new(PgCallRepository::new(pool.clone())),
            campaigns: Arc::new(PgCampaignRepository::new(pool.clone())),
            leads: Arc::new(PgLeadRepository::new(pool.clone())),
            events: Arc::new(PgEventLogRepository::new(pool.clone())),
            settings: Arc::new(PgSettingsRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            clients: store.clone(),
            ledger: store.clone(),
            calls: store.clone(),
            campaigns: store.clone(),
            leads: store.clone(),
            events: store.clone(),
            settings: store,
        }
    }
}

/// Services shared by all handlers
pub struct AppState {
    pub clients: Arc<dyn ClientRepository>,
    pub calls: Arc<dyn CallRepository>,
    pub ledger: Arc<LedgerService>,
    pub engine: Arc<ReconciliationEngine>,
    pub dispatcher: Arc<CallDispatcher>,
    pub campaigns: Arc<CampaignService>,
    pub orchestrator: Arc<CampaignOrchestrator>,
    pub rate_policy: Arc<SettingsRatePolicy>,
    pub auditor: Arc<LedgerAuditor>,
    pub sync: Arc<CallSync>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        provider: Arc<dyn CallProvider>,
        cache: Option<Arc<RedisCache>>,
        billing: &BillingConfig,
        provider_config: &ProviderConfig,
    ) -> Self {
        let rate_policy = Arc::new(
            SettingsRatePolicy::new(
                repos.settings.clone(),
                cache,
                billing.fallback_multiplier(),
            )
            .with_cache_ttl(billing.rate_cache_ttl_secs),
        );

        let engine = Arc::new(ReconciliationEngine::new(
            repos.calls.clone(),
            repos.ledger.clone(),
            repos.clients.clone(),
            repos.campaigns.clone(),
            repos.leads.clone(),
            repos.events.clone(),
            rate_policy.clone(),
        ));

        let dispatcher = Arc::new(
            CallDispatcher::new(
                repos.calls.clone(),
                repos.leads.clone(),
                repos.clients.clone(),
                provider.clone(),
            )
            .with_timeout(Duration::from_millis(provider_config.timeout_ms)),
        );

        let campaigns = Arc::new(CampaignService::new(
            repos.campaigns.clone(),
            repos.calls.clone(),
            repos.leads.clone(),
            repos.clients.clone(),
        ));

        let orchestrator = Arc::new(CampaignOrchestrator::new(
            repos.campaigns.clone(),
            repos.calls.clone(),
            repos.clients.clone(),
            dispatcher.clone(),
        ));

        let sync = Arc::new(
            CallSync::new(repos.clients.clone(), provider, engine.clone())
                .with_page_size(provider_config.sync_page_size),
        );

        let ledger = Arc::new(LedgerService::new(repos.ledger.clone(), repos.clients.clone()));

        let auditor = Arc::new(
            LedgerAuditor::new(repos.ledger.clone())
                .with_grace_period(billing.ledger_grace_period_secs),
        );

        Self {
            clients: repos.clients,
            calls: repos.calls,
            ledger,
            engine,
            dispatcher,
            campaigns,
            orchestrator,
            rate_policy,
            auditor,
            sync,
        }
    }
}
