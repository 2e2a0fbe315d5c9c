use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use isp_netcore::backup::BackupArchive;
use isp_netcore::config::Config;
use isp_netcore::db::Store;
use isp_netcore::mikrotik::RouterApiClient;
use isp_netcore::services::{MikrotikService, MonitoringService, OltService, RadiusService, RadiusSettings};
use isp_netcore::transport::NetTransport;

/// Periodic device jobs, meant to be invoked by cron
#[derive(Parser)]
#[command(name = "isp-netcore", version, about)]
struct Cli {
    #[command(subcommand)]
    job: Job,
}

#[derive(Subcommand)]
enum Job {
    /// Poll every router and OLT and record its health
    Monitor,
    /// Roll completed hours of raw bandwidth samples into hourly rows
    AggregateHourly,
    /// Roll completed days of hourly rows into daily rows
    AggregateDaily,
    /// Delete bandwidth rows already rolled up and past retention
    Prune {
        #[arg(long, env = "BANDWIDTH_RETENTION_DAYS")]
        retention_days: Option<i64>,
    },
    /// Discover ONUs on every active OLT and update the local records
    SyncOnus,
    /// Back up the running configuration of every active OLT
    BackupOlts,
    /// Point a router at the RADIUS server of its NAS
    ProvisionRouter {
        router_id: i64,
        /// Run again even if a previous run completed
        #[arg(long)]
        force: bool,
    },
}

/// Services wired against the production transports
struct Services {
    olt: Arc<OltService>,
    monitoring: MonitoringService,
    radius: RadiusService,
}

fn build_services(cfg: &Config, store: &Store) -> anyhow::Result<Services> {
    let transport = Arc::new(NetTransport::new(cfg.device_timeout(), cfg.snmp_timeout()));
    let router_api = Arc::new(RouterApiClient::new(cfg.http_timeout())?);

    let olt = Arc::new(OltService::new(
        store.clone(),
        transport,
        BackupArchive::new(&cfg.backup_dir),
        &cfg.snmp_default_community,
    ));
    let mikrotik = Arc::new(MikrotikService::new(store.clone(), router_api.clone()));
    let monitoring = MonitoringService::new(store.clone(), mikrotik, olt.clone(), cfg.monitor_concurrency);
    let radius = RadiusService::new(store.clone(), router_api, RadiusSettings::from(cfg));

    Ok(Services {
        olt,
        monitoring,
        radius,
    })
}

async fn run(job: Job, cfg: &Config, store: &Store) -> anyhow::Result<()> {
    let services = build_services(cfg, store)?;

    match job {
        Job::Monitor => {
            let summary = services.monitoring.monitor_all_devices().await?;
            tracing::info!(
                "Checked {} devices: {} online, {} offline, {} not recorded",
                summary.checked,
                summary.online,
                summary.offline,
                summary.failed
            );
        }
        Job::AggregateHourly => {
            services.monitoring.aggregate_hourly_data().await?;
        }
        Job::AggregateDaily => {
            services.monitoring.aggregate_daily_data().await?;
        }
        Job::Prune { retention_days } => {
            let days = retention_days.unwrap_or(cfg.bandwidth_retention_days);
            services.monitoring.prune_bandwidth_samples(days).await?;
        }
        Job::SyncOnus => {
            let synced = services.olt.sync_all_onus().await;
            tracing::info!("Synced {} ONUs", synced);
        }
        Job::BackupOlts => {
            let done = services.olt.backup_all_olts().await;
            tracing::info!("Backed up {} OLTs", done);
        }
        Job::ProvisionRouter { router_id, force } => {
            if !force && services.radius.is_provisioned(router_id).await? {
                tracing::info!("Router {} is already provisioned, use --force to run again", router_id);
                return Ok(());
            }
            let router = store
                .get_router(router_id)
                .await?
                .ok_or_else(|| isp_netcore::db::NotFoundError::new("Router", &router_id.to_string()))?;
            let result = services.radius.provision_on_first_connect(&router).await;
            if !result.success {
                anyhow::bail!("Provisioning {} failed: {}", router.name, result.message);
            }
            tracing::info!("{}", result.message);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "isp_netcore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let cfg = Config::load();
    tracing::info!("Database: {}", cfg.db_path);

    // Initialize database
    let store = Store::with_pool_size(&cfg.db_path, cfg.db_max_connections).await?;
    tracing::info!("Database initialized (pool_size={})", cfg.db_max_connections);

    tokio::select! {
        result = run(cli.job, &cfg, &store) => result,
        _ = shutdown_signal() => {
            tracing::warn!("Interrupted, job not finished");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
