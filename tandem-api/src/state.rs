use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use tandem_commission::{CommissionService, WalletService};
use tandem_core::payment::PaymentGateway;
use tandem_core::repository::{
    LedgerRepository, OrderRepository, PhaseLevelRepository, ProfileRepository, SettingsRepository,
};
use tandem_core::AppSettings;
use tandem_order::{CommissionRetrier, OrderCreationService, OrderLifecycle, ReferralValidator};
use tandem_store::database::load_app_settings;
use tandem_store::InMemoryStore;

use crate::error::AppError;
use crate::metrics::Metrics;

/// How long a settings read is served from memory
const SETTINGS_TTL: Duration = Duration::from_secs(30);

/// Last settings read from storage, shared by every request
#[derive(Default)]
pub struct SettingsCache {
    entry: RwLock<Option<(AppSettings, Instant)>>,
}

impl SettingsCache {
    async fn fresh(&self) -> Option<AppSettings> {
        match &*self.entry.read().await {
            Some((settings, loaded_at)) if loaded_at.elapsed() < SETTINGS_TTL => Some(settings.clone()),
            _ => None,
        }
    }

    async fn store(&self, settings: AppSettings) {
        *self.entry.write().await = Some((settings, Instant::now()));
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

/// Storage ports the services are wired over
#[derive(Clone)]
pub struct Repositories {
    pub orders: Arc<dyn OrderRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub phases: Arc<dyn PhaseLevelRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Repositories {
    pub fn in_memory(store: InMemoryStore) -> Self {
        Self {
            orders: Arc::new(store.clone()),
            profiles: Arc::new(store.clone()),
            phases: Arc::new(store.clone()),
            ledger: Arc::new(store.clone()),
            settings: Arc::new(store),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub order_creation: Arc<OrderCreationService>,
    pub lifecycle: Arc<OrderLifecycle>,
    pub retrier: Arc<CommissionRetrier>,
    pub commissions: Arc<CommissionService>,
    pub referrals: Arc<ReferralValidator>,
    pub wallet: Arc<WalletService>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub webhook_secret: String,
    /// Used until an admin saves settings
    pub default_settings: AppSettings,
    pub settings_cache: Arc<SettingsCache>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        metrics: Arc<Metrics>,
        auth: AuthConfig,
        webhook_secret: String,
        default_settings: AppSettings,
    ) -> Self {
        let commissions = Arc::new(CommissionService::new(
            repos.orders.clone(),
            repos.profiles.clone(),
            repos.phases.clone(),
            repos.ledger.clone(),
        ));
        let order_creation = OrderCreationService::new(
            repos.orders.clone(),
            ReferralValidator::new(repos.profiles.clone()),
            commissions.clone(),
        );

        Self {
            order_creation: Arc::new(order_creation),
            lifecycle: Arc::new(OrderLifecycle::new(repos.orders.clone(), commissions.clone())),
            retrier: Arc::new(CommissionRetrier::new(repos.orders.clone(), commissions.clone())),
            referrals: Arc::new(ReferralValidator::new(repos.profiles.clone())),
            wallet: Arc::new(WalletService::new(repos.ledger.clone(), gateway)),
            commissions,
            repos,
            metrics,
            auth,
            webhook_secret,
            default_settings,
            settings_cache: Arc::default(),
        }
    }

    /// Current runtime settings, at most `SETTINGS_TTL` old
    pub async fn app_settings(&self) -> Result<AppSettings, AppError> {
        if let Some(settings) = self.settings_cache.fresh().await {
            return Ok(settings);
        }
        self.reload_app_settings().await
    }

    /// Read settings from storage and refresh the cache
    pub async fn reload_app_settings(&self) -> Result<AppSettings, AppError> {
        let settings = load_app_settings(self.repos.settings.as_ref(), &self.default_settings).await?;
        self.settings_cache.store(settings.clone()).await;
        Ok(settings)
    }

    /// Persist settings and serve them to the next request
    pub async fn save_app_settings(&self, settings: &AppSettings) -> Result<(), AppError> {
        self.repos.settings.save_app_settings(settings).await?;
        self.settings_cache.store(settings.clone()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::payment::MockPaymentGateway;

    fn defaults() -> AppSettings {
        AppSettings {
            maintenance_mode: false,
            coming_soon: false,
            max_commission_levels: 5,
            strict_referrals: true,
            min_payout_cents: 500,
            currency: "USD".into(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn state(store: InMemoryStore) -> AppState {
        AppState::new(
            Repositories::in_memory(store),
            Arc::new(MockPaymentGateway),
            Arc::new(Metrics::new().unwrap()),
            AuthConfig { secret: "secret".into() },
            "hook".into(),
            defaults(),
        )
    }

    #[tokio::test]
    async fn test_settings_are_served_from_cache() {
        let store = InMemoryStore::new();
        let state = state(store.clone());
        assert!(!state.app_settings().await.unwrap().maintenance_mode);

        // A write that bypasses the state is not seen until the entry expires
        let changed = AppSettings { maintenance_mode: true, ..defaults() };
        store.save_app_settings(&changed).await.unwrap();
        assert!(!state.app_settings().await.unwrap().maintenance_mode);
        assert!(state.reload_app_settings().await.unwrap().maintenance_mode);
    }

    #[tokio::test]
    async fn test_saved_settings_refresh_the_cache() {
        let store = InMemoryStore::new();
        let state = state(store.clone());
        state.app_settings().await.unwrap();

        let changed = AppSettings { coming_soon: true, ..defaults() };
        state.save_app_settings(&changed).await.unwrap();

        assert!(state.app_settings().await.unwrap().coming_soon);
        assert!(store.get_app_settings().await.unwrap().unwrap().coming_soon);
    }
}
