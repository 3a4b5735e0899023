//! numrent server
//!
//! Runs the deposit reconciliation engine in the background and serves the
//! internal notification and redeem-code API.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, LoadedConfig, get_database_url, get_redis_url};
use numrent_core::gateway::{HttpSettlementGateway, SettlementGateway};
use numrent_core::kv::{KeyValueStore, MemoryStore, RedisStore};
use numrent_core::ledger::{LedgerStore, PgLedgerStore};
use numrent_core::notify::{
    ChatChannel, EmailChannel, NotificationChannel, Notifier, SmtpMailer, TelegramChatApi,
};
use numrent_core::reconcile::ReconciliationEngine;
use numrent_core::redeem::RedeemService;
use server::{build_router, run_server};
use shutdown::ShutdownSwitch;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// numrent - wallet reconciliation and notification service
#[derive(Parser, Debug)]
#[command(name = "numrent-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./numrent.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 127.0.0.1:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting numrent-server v{}", env!("CARGO_PKG_VERSION"));

    let loaded_config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let kv = connect_kv().await?;
    let ledger: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(db_pool.clone()));
    let notifier = Notifier::new(build_channels(&loaded_config, &kv, &ledger)?, ledger.clone());
    tracing::info!(channels = ?notifier.channel_names(), "Notification channels ready");

    let gateway: Option<Arc<dyn SettlementGateway>> = match &loaded_config.gateway {
        Some(gateway) => {
            let client = HttpSettlementGateway::new(gateway).map_err(|e| {
                tracing::error!("Failed to build the gateway client: {}", e);
                e
            })?;
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("No [gateway] configured, pending deposits will only expire");
            None
        }
    };

    let (shutdown, shutdown_rx) = ShutdownSwitch::new();
    let engine = ReconciliationEngine::new(
        ledger.clone(),
        gateway,
        notifier.clone(),
        loaded_config.reconcile.clone(),
    );
    let engine_handle = tokio::spawn(engine.run(shutdown_rx));

    let redeem = RedeemService::new(kv, ledger, notifier.clone(), loaded_config.redeem.clone());
    let router = build_router(AppState::new(notifier, redeem));

    tracing::info!("Starting HTTP server on {}", loaded_config.listen);
    let result = run_server(router, loaded_config.listen).await;

    shutdown.trigger();
    if let Err(e) = engine_handle.await {
        tracing::error!("Reconciliation engine task failed: {}", e);
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Connect to Redis when `REDIS_URL` is set, otherwise keep state in memory.
async fn connect_kv() -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match get_redis_url() {
        Some(url) => {
            tracing::info!("Connecting to Redis...");
            let store = RedisStore::connect(&url).await.map_err(|e| {
                tracing::error!("Failed to connect to Redis: {}", e);
                e
            })?;
            tracing::info!("Redis connection established");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!(
                "REDIS_URL not set, using the in-process store; thread and message handles and redeem codes will not survive a restart"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Build every channel that has credentials configured.
fn build_channels(
    config: &LoadedConfig,
    kv: &Arc<dyn KeyValueStore>,
    ledger: &Arc<dyn LedgerStore>,
) -> anyhow::Result<Vec<Arc<dyn NotificationChannel>>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    match &config.telegram {
        Some(telegram) => {
            let api = TelegramChatApi::new(telegram).map_err(|e| {
                tracing::error!("Failed to build the Telegram client: {}", e);
                e
            })?;
            let api = Arc::new(api);
            channels.push(Arc::new(ChatChannel::new(api, kv.clone())));
        }
        None => tracing::warn!("No [telegram] configured, chat notifications disabled"),
    }

    match &config.email {
        Some(email) => {
            let mailer = SmtpMailer::new(email).map_err(|e| {
                tracing::error!("Invalid [email] configuration: {}", e);
                e
            })?;
            channels.push(Arc::new(EmailChannel::new(
                Arc::new(mailer),
                ledger.clone(),
                email.admin_address.clone(),
            )));
        }
        None => tracing::warn!("No [email] configured, e-mail notifications disabled"),
    }

    Ok(channels)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
