//! Rate policy implementations
//!
//! The billing multiplier is resolved per client: a client override under
//! `call_rate_multiplier:<id>`, then the global `call_rate_multiplier`
//! setting, then the configured fallback. Resolved values are cached in
//! Redis when a cache is available.

use async_trait::async_trait;
use dialer_cache::{keys, RedisCache};
use dialer_core::{
    models::setting::{multiplier_value, parse_multiplier, rate_multiplier_key},
    traits::{CacheService, RatePolicy, SettingsRepository},
    AppError, AppResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::constants::{DEFAULT_RATE_MULTIPLIER, RATE_CACHE_TTL};

/// Multiplier backed by the settings store
pub struct SettingsRatePolicy {
    settings: Arc<dyn SettingsRepository>,
    cache: Option<Arc<RedisCache>>,
    fallback: Decimal,
    cache_ttl_secs: u64,
}

impl SettingsRatePolicy {
    pub fn new(
        settings: Arc<dyn SettingsRepository>,
        cache: Option<Arc<RedisCache>>,
        fallback: Decimal,
    ) -> Self {
        let fallback = if fallback > Decimal::ZERO {
            fallback
        } else {
            DEFAULT_RATE_MULTIPLIER
        };

        Self {
            settings,
            cache,
            fallback,
            cache_ttl_secs: RATE_CACHE_TTL,
        }
    }

    pub fn with_cache_ttl(mut self, ttl_secs: u64) -> Self {
        self.cache_ttl_secs = ttl_secs;
        self
    }

    pub fn fallback(&self) -> Decimal {
        self.fallback
    }

    /// Resolve from storage, skipping the cache
    #[instrument(skip(self))]
    pub async fn resolve(&self, client_id: Option<i64>) -> AppResult<Decimal> {
        if let Some(id) = client_id {
            if let Some(m) = self.stored(&rate_multiplier_key(Some(id))).await? {
                debug!("Client {} multiplier override: {}", id, m);
                return Ok(m);
            }
        }

        if let Some(m) = self.stored(&rate_multiplier_key(None)).await? {
            return Ok(m);
        }

        debug!("No multiplier setting, using fallback {}", self.fallback);
        Ok(self.fallback)
    }

    /// Store a multiplier for `client_id`, or the global one
    #[instrument(skip(self))]
    pub async fn set_multiplier(&self, client_id: Option<i64>, multiplier: Decimal) -> AppResult<Decimal> {
        if multiplier <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Multiplier must be positive, got {}",
                multiplier
            )));
        }

        let key = rate_multiplier_key(client_id);
        self.settings.put(&key, &multiplier_value(multiplier)).await?;
        info!("Rate multiplier {} set to {}", key, multiplier);

        // Cached per-client values expire by TTL after a global change
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.delete(&keys::rate_multiplier_key(client_id)).await {
                warn!("Failed to invalidate cached multiplier {}: {}", key, e);
            }
        }

        Ok(multiplier)
    }

    async fn stored(&self, key: &str) -> AppResult<Option<Decimal>> {
        let setting = self.settings.get(key).await?;

        Ok(setting.and_then(|s| {
            let parsed = parse_multiplier(&s.value);
            if parsed.is_none() {
                warn!("Ignoring unusable multiplier setting {}: {}", key, s.value);
            }
            parsed
        }))
    }

    async fn get_from_cache(&self, client_id: Option<i64>) -> Option<Decimal> {
        let cache = self.cache.as_ref()?;

        match cache.get::<Decimal>(&keys::rate_multiplier_key(client_id)).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Multiplier cache error: {}", e);
                None
            }
        }
    }

    async fn store_in_cache(&self, client_id: Option<i64>, multiplier: Decimal) {
        if let Some(cache) = &self.cache {
            let key = keys::rate_multiplier_key(client_id);
            if let Err(e) = cache.set(&key, &multiplier, self.cache_ttl_secs).await {
                warn!("Failed to cache multiplier {}: {}", key, e);
            }
        }
    }
}

#[async_trait]
impl RatePolicy for SettingsRatePolicy {
    async fn multiplier(&self, client_id: Option<i64>) -> Decimal {
        if let Some(m) = self.get_from_cache(client_id).await {
            return m;
        }

        match self.resolve(client_id).await {
            Ok(m) => {
                self.store_in_cache(client_id, m).await;
                m
            }
            Err(e) => {
                error!(
                    "Failed to read rate multiplier, using fallback {}: {}",
                    self.fallback, e
                );
                self.fallback
            }
        }
    }
}

/// Constant multiplier
#[derive(Debug, Clone, Copy)]
pub struct FixedRatePolicy(pub Decimal);

impl Default for FixedRatePolicy {
    fn default() -> Self {
        Self(DEFAULT_RATE_MULTIPLIER)
    }
}

#[async_trait]
impl RatePolicy for FixedRatePolicy {
    async fn multiplier(&self, _client_id: Option<i64>) -> Decimal {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dialer_core::models::Setting;
    use dialer_db::InMemoryStore;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    fn policy(store: &Arc<InMemoryStore>) -> SettingsRatePolicy {
        SettingsRatePolicy::new(store.clone(), None, dec!(2))
    }

    struct BrokenSettings;

    #[async_trait]
    impl SettingsRepository for BrokenSettings {
        async fn get(&self, _key: &str) -> AppResult<Option<Setting>> {
            Err(AppError::Database("connection reset".to_string()))
        }

        async fn put(&self, _key: &str, _value: &Value) -> AppResult<Setting> {
            Err(AppError::Database("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fallback_without_settings() {
        let store = Arc::new(InMemoryStore::new());
        assert_eq!(policy(&store).multiplier(Some(1)).await, dec!(2));
        assert_eq!(policy(&store).multiplier(None).await, dec!(2));
    }

    #[tokio::test]
    async fn test_global_setting_and_client_override() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put("call_rate_multiplier", &json!({"multiplier": 1.5}))
            .await
            .unwrap();
        store
            .put("call_rate_multiplier:9", &json!({"multiplier": "3"}))
            .await
            .unwrap();

        let policy = policy(&store);
        assert_eq!(policy.multiplier(None).await, dec!(1.5));
        assert_eq!(policy.multiplier(Some(1)).await, dec!(1.5));
        assert_eq!(policy.multiplier(Some(9)).await, dec!(3));
    }

    #[tokio::test]
    async fn test_unusable_setting_falls_through() {
        let store = Arc::new(InMemoryStore::new());
        store
            .put("call_rate_multiplier", &json!({"multiplier": -1}))
            .await
            .unwrap();

        assert_eq!(policy(&store).multiplier(None).await, dec!(2));
    }

    #[tokio::test]
    async fn test_storage_errors_use_fallback() {
        let policy = SettingsRatePolicy::new(Arc::new(BrokenSettings), None, dec!(2.5));
        assert_eq!(policy.multiplier(Some(3)).await, dec!(2.5));
    }

    #[tokio::test]
    async fn test_non_positive_fallback_replaced() {
        let store = Arc::new(InMemoryStore::new());
        let policy = SettingsRatePolicy::new(store, None, Decimal::ZERO);
        assert_eq!(policy.fallback(), DEFAULT_RATE_MULTIPLIER);
    }

    #[tokio::test]
    async fn test_set_multiplier() {
        let store = Arc::new(InMemoryStore::new());
        let policy = policy(&store);

        assert!(matches!(
            policy.set_multiplier(None, Decimal::ZERO).await,
            Err(AppError::Validation(_))
        ));

        policy.set_multiplier(None, dec!(1.25)).await.unwrap();
        assert_eq!(policy.multiplier(Some(4)).await, dec!(1.25));

        let stored = store.get("call_rate_multiplier").await.unwrap().unwrap();
        assert_eq!(parse_multiplier(&stored.value), Some(dec!(1.25)));
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_cached_multiplier_invalidated_on_update() {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(RedisCache::new("redis://127.0.0.1:6379").await.unwrap());
        cache.delete(&keys::rate_multiplier_key(None)).await.unwrap();

        let policy = SettingsRatePolicy::new(store.clone(), Some(cache), dec!(2));
        assert_eq!(policy.multiplier(None).await, dec!(2));

        policy.set_multiplier(None, dec!(4)).await.unwrap();
        assert_eq!(policy.multiplier(None).await, dec!(4));
    }

    #[tokio::test]
    async fn test_fixed_policy() {
        assert_eq!(FixedRatePolicy::default().multiplier(None).await, dec!(2));
        assert_eq!(FixedRatePolicy(dec!(1)).multiplier(Some(1)).await, dec!(1));
    }
}
