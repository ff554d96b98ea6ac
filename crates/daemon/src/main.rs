//! Cadence Daemon - Main Entry Point
//! Scheduler + shared SQLite lock store + JSON-RPC introspection

mod logging;
mod maintenance;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

// Import workspace crates
use cadence_api_rpc::{RpcServer, RpcServerConfig};
use cadence_core::application::{register_components, SchedulerDeps, TaskScheduler};
use cadence_core::port::time_provider::SystemTimeProvider;
use cadence_core::port::{AlertSink, LogAlertSink, ManagedComponent, TimeProvider};
use cadence_infra_sqlite::{open_database, run_migrations, SqliteLockStore};
use cadence_infra_system::{detect_identity, CommandAlertSink};

use maintenance::LockStoreMaintenance;
use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration (logging depends on it)
    let (settings, config_source) = Settings::load()?;

    // 2. Logging
    let _log_guard = logging::init(&settings)?;
    info!("Cadence daemon v{} starting...", VERSION);

    // 3. Shared lock store
    info!(db_path = %settings.db_path.display(), "Opening lock store...");
    let pool = open_database(&settings.db_path)
        .await
        .context("Lock store open failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let lock_store = Arc::new(SqliteLockStore::new(pool, time_provider.clone()));

    // 4. Identity and alerting
    let identity = detect_identity(settings.instance_host.as_deref(), settings.rpc_port);
    info!(identity = %identity, "Instance identity resolved");

    let alert_sink: Arc<dyn AlertSink> = match settings.alert_command.as_deref() {
        Some(command) => match CommandAlertSink::from_command_line(command) {
            Some(sink) => Arc::new(sink),
            None => {
                warn!("alert_command is blank, alerts will only be logged");
                Arc::new(LogAlertSink)
            }
        },
        None => Arc::new(LogAlertSink),
    };

    // 5. Scheduler and registration pass
    let scheduler = TaskScheduler::new(
        SchedulerDeps {
            time_provider,
            lock_store: lock_store.clone(),
            alert_sink,
            identity,
        },
        settings.scheduler_config(),
    );

    let components: Vec<Arc<dyn ManagedComponent>> =
        vec![Arc::new(LockStoreMaintenance::new(lock_store))];
    register_components(&scheduler, &config_source, components)
        .context("Task registration failed")?;
    scheduler.initialize()?;

    // 6. JSON-RPC introspection
    let rpc_config = RpcServerConfig {
        host: settings.rpc_host.clone(),
        port: settings.rpc_port,
    };
    let (rpc_handle, rpc_addr) = RpcServer::new(rpc_config, scheduler.clone())
        .start()
        .await
        .context("RPC server start failed")?;

    info!(rpc_addr = %rpc_addr, tasks = scheduler.tasks().len(), "System ready");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    scheduler.shutdown().await;
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;

    info!("Shutdown complete.");
    Ok(())
}
