//! Keeper daemon: schedules the market lifecycle tasks.
//!
//! Wiring: config → provider + signer → collaborator clients → tasks →
//! scheduler. Ctrl-C stops the scheduler, which drains every task loop
//! before the process exits.

use std::sync::Arc;
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::Address;
use alloy_provider::ProviderBuilder;
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use pm_keeper::alerts::{AlertSink, LogAlerter, WebhookAlerter};
use pm_keeper::chain::{SubmitterConfig, TxSubmitter};
use pm_keeper::keeper::lock::LockTask;
use pm_keeper::keeper::scheduler::{RetryPolicy, Scheduler};
use pm_keeper::keeper::settle::{SettleTask, SettlementContext};
use pm_keeper::keeper::settle_uma::UmaSettleTask;
use pm_keeper::market_api::{MarketApiClient, MarketStore};
use pm_keeper::sportsdata::{ResultProvider, SportsDataClient};
use pm_keeper::KeeperConfig;

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Ok(dir) = std::env::var("KEEPER_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(dir, "keeper.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cfg = KeeperConfig::from_env();
    let _log_guard = init_tracing();

    info!("═══════════════════════════════════════════════════");
    info!("  Market Keeper — lock & settle scheduler");
    info!("═══════════════════════════════════════════════════");
    info!(
        "📊 Config: lock_every={}s settle_every={}s lead={}s finalize_delay={}s \
         retries={}x{}s max_gas={}gwei workers≤{} optimistic={}",
        cfg.lock_interval_secs,
        cfg.settle_interval_secs,
        cfg.lock_lead_time_secs,
        cfg.finalize_delay_secs,
        cfg.retry_attempts,
        cfg.retry_delay_secs,
        cfg.max_gas_price_gwei,
        cfg.max_concurrent_settlements,
        cfg.use_optimistic_adapter,
    );

    // ═══ Chain access ═══
    let signer: PrivateKeySigner = cfg
        .private_key
        .expose_secret()
        .parse()
        .context("invalid KEEPER_PRIVATE_KEY")?;
    let sender = signer.address();
    let rpc_url: Url = cfg.rpc_url.parse().context("invalid KEEPER_RPC_URL")?;
    let provider = Arc::new(ProviderBuilder::new().wallet(signer).connect_http(rpc_url));
    info!("⛓️ signing as {sender} via {}", cfg.rpc_url);

    // ═══ Collaborators ═══
    let alerts: Arc<dyn AlertSink> = match &cfg.alert_webhook_url {
        Some(url) => {
            info!("🔔 alert webhook enabled: {url}");
            Arc::new(WebhookAlerter::new(url.clone()))
        }
        None => {
            info!("🔔 no alert webhook configured — alerts go to the log only");
            Arc::new(LogAlerter)
        }
    };

    let submitter = Arc::new(TxSubmitter::new(
        provider,
        sender,
        SubmitterConfig {
            max_gas_price: cfg.max_gas_price_wei(),
            receipt_timeout: Duration::from_secs(cfg.receipt_timeout_secs),
            receipt_poll_interval: Duration::from_secs(cfg.receipt_poll_secs),
        },
        alerts.clone(),
    ));

    let store: Arc<dyn MarketStore> = Arc::new(MarketApiClient::new(cfg.market_api_url.clone()));
    let results: Arc<dyn ResultProvider> = Arc::new(SportsDataClient::new(
        cfg.sportsdata_url.clone(),
        cfg.sportsdata_api_key.clone(),
    ));

    // ═══ Task wiring ═══
    let mut scheduler = Scheduler::new(RetryPolicy {
        attempts: cfg.retry_attempts,
        delay: Duration::from_secs(cfg.retry_delay_secs),
    });
    let shutdown = scheduler.shutdown_signal();

    let lock_task = Arc::new(LockTask::new(
        store.clone(),
        submitter.clone(),
        alerts.clone(),
        Duration::from_secs(cfg.lock_lead_time_secs),
        shutdown.clone(),
    ));
    scheduler.register_task(
        "lock-markets",
        lock_task,
        Duration::from_secs(cfg.lock_interval_secs),
    );

    let ctx = Arc::new(SettlementContext::new(
        store,
        results,
        Duration::from_secs(cfg.finalize_delay_secs),
    ));
    if cfg.use_optimistic_adapter {
        let adapter: Address = cfg
            .adapter_address
            .parse()
            .context("invalid KEEPER_ADAPTER_ADDRESS")?;
        let settle_task = Arc::new(UmaSettleTask::new(
            ctx,
            submitter,
            alerts,
            adapter,
            cfg.max_concurrent_settlements,
            shutdown,
        ));
        scheduler.register_task(
            "settle-markets-optimistic",
            settle_task,
            Duration::from_secs(cfg.settle_interval_secs),
        );
    } else {
        let settle_task = Arc::new(SettleTask::new(ctx, submitter, alerts, shutdown));
        scheduler.register_task(
            "settle-markets",
            settle_task,
            Duration::from_secs(cfg.settle_interval_secs),
        );
    }

    // ═══ Run until ctrl-c ═══
    let stopper = scheduler.stopper();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("🛑 ctrl-c — shutting down");
        stopper.stop();
    });

    scheduler.run().await;
    info!("👋 keeper stopped");
    Ok(())
}
