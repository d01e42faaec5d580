pub mod app_config;
pub mod database;
pub mod ledger_repo;
pub mod memory;
pub mod order_repo;
pub mod profile_repo;
pub mod settings_repo;

mod rows;

pub use database::DbClient;
pub use ledger_repo::PgLedgerRepository;
pub use memory::InMemoryStore;
pub use order_repo::PgOrderRepository;
pub use profile_repo::{PgPhaseLevelRepository, PgProfileRepository};
pub use settings_repo::PgSettingsRepository;
