//! Lock task: Open → Locked.
//!
//! Each cycle queries markets whose lock time falls inside the lead
//! window and locks them one at a time, oldest first. Markets already at
//! or past their lock time are not re-queried: they belong to the
//! previous cycle or are stale.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::alerts::{Alert, AlertSink};
use crate::chain::MarketSubmitter;
use crate::keeper::scheduler::Task;
use crate::keeper::types::{MarketStatus, MarketStatusUpdate, MarketToLock, TxOutcome};
use crate::market_api::MarketStore;

pub struct LockTask {
    store: Arc<dyn MarketStore>,
    submitter: Arc<dyn MarketSubmitter>,
    alerts: Arc<dyn AlertSink>,
    lock_lead_time: Duration,
    shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Default)]
struct CycleStats {
    eligible: usize,
    locked: usize,
    failed: usize,
    aborted: usize,
}

impl LockTask {
    pub fn new(
        store: Arc<dyn MarketStore>,
        submitter: Arc<dyn MarketSubmitter>,
        alerts: Arc<dyn AlertSink>,
        lock_lead_time: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            submitter,
            alerts,
            lock_lead_time,
            shutdown,
        }
    }

    async fn run_cycle(&self) -> Result<()> {
        let now = Utc::now();
        let markets = self
            .store
            .markets_to_lock(now, self.lock_lead_time)
            .await
            .context("lock eligibility query failed")?;

        if markets.is_empty() {
            debug!("🔒 no markets approaching lock time");
            return Ok(());
        }

        let mut stats = CycleStats {
            eligible: markets.len(),
            ..CycleStats::default()
        };
        info!("🔒 {} market(s) approaching lock time", markets.len());

        for (index, market) in markets.iter().enumerate() {
            if *self.shutdown.borrow() {
                stats.aborted = markets.len() - index;
                warn!(
                    "🛑 shutdown — lock cycle aborted with {} market(s) unprocessed",
                    stats.aborted,
                );
                break;
            }

            match self.lock_market(market).await {
                Ok(outcome) => {
                    stats.locked += 1;
                    self.write_back(market, &outcome).await;
                }
                Err(err) => {
                    stats.failed += 1;
                    error!("❌ failed to lock market {}: {err:#}", market.address);
                    self.alerts
                        .notify(Alert::lock_failed(market.address, &err))
                        .await;
                }
            }
        }

        info!(
            "🔒 lock cycle done | eligible={} locked={} failed={} aborted={}",
            stats.eligible, stats.locked, stats.failed, stats.aborted,
        );
        Ok(())
    }

    async fn lock_market(&self, market: &MarketToLock) -> Result<TxOutcome> {
        if market.address.is_zero() {
            bail!("refusing to lock the zero market address");
        }

        let outcome = self.submitter.lock_market(market.address).await?;
        info!(
            "🔒 market {} locked | lock_time={} tx={}",
            market.address,
            market.lock_time.to_rfc3339(),
            outcome.tx_hash,
        );
        Ok(outcome)
    }

    /// Record the transition with the data provider. The chain is already
    /// authoritative at this point, so a failed write is logged and the
    /// cycle moves on.
    async fn write_back(&self, market: &MarketToLock, outcome: &TxOutcome) {
        let update = MarketStatusUpdate {
            address: market.address,
            status: MarketStatus::Locked,
            tx_hash: outcome.tx_hash,
            timestamp: Utc::now(),
            scores: None,
        };
        if let Err(err) = self.store.update_market_status(update).await {
            warn!(
                "⚠️ market {} locked on-chain but the status write-back failed: {err:#}",
                market.address,
            );
        }
    }
}

impl Task for LockTask {
    fn execute(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_cycle())
    }
}
