// Cadence Infrastructure - SQLite Adapter
// Implements: LockStore (shared across every process using the same file)

mod connection;
mod error;
mod lock_store;
mod migration;

pub use connection::{create_pool, open_database};
pub use lock_store::SqliteLockStore;
pub use migration::run_migrations;
