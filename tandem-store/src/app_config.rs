use chrono::Utc;
use serde::Deserialize;
use std::env;
use tandem_core::AppSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub payments: PaymentsConfig,
    pub commission: CommissionConfig,
    pub wallet: WalletConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Without a URL the API runs on the in-memory store
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    pub webhook_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommissionConfig {
    pub max_levels: i32,
    #[serde(default = "default_strict")]
    pub strict_referrals: bool,
    pub retry_interval_seconds: u64,
    pub retry_batch_size: i64,
}

fn default_strict() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    pub min_payout_cents: i64,
    pub currency: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `TANDEM__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("TANDEM").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Settings used until an admin saves a row in `app_settings`
    pub fn default_app_settings(&self) -> AppSettings {
        AppSettings {
            maintenance_mode: false,
            coming_soon: false,
            max_commission_levels: self.commission.max_levels,
            strict_referrals: self.commission.strict_referrals,
            min_payout_cents: self.wallet.min_payout_cents,
            currency: self.wallet.currency.clone(),
            updated_at: Utc::now(),
        }
    }
}
