//! Settlement: Locked → Proposed, direct-oracle variant.
//!
//! Settlement is deliberately deferred by a finality buffer after the
//! nominal match end so late score corrections land before the keeper
//! reports anything on-chain. The shared [`SettlementContext`] carries
//! what both settle variants need (eligibility query, result fetch, facts
//! building) so the optimistic variant composes with it instead of
//! duplicating it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::alerts::{Alert, AlertSink};
use crate::chain::MarketSubmitter;
use crate::keeper::scheduler::Task;
use crate::keeper::types::{
    MarketStatus, MarketStatusUpdate, MarketToSettle, MatchFacts, ResultScope, TxOutcome,
};
use crate::market_api::MarketStore;
use crate::sportsdata::{MatchResult, ResultProvider};

/// Shared state for both settlement variants.
pub struct SettlementContext {
    store: Arc<dyn MarketStore>,
    results: Arc<dyn ResultProvider>,
    finalize_delay: Duration,
}

impl SettlementContext {
    pub fn new(
        store: Arc<dyn MarketStore>,
        results: Arc<dyn ResultProvider>,
        finalize_delay: Duration,
    ) -> Self {
        Self {
            store,
            results,
            finalize_delay,
        }
    }

    /// Locked markets whose match ended at least `finalize_delay` ago,
    /// oldest first.
    pub async fn markets_to_settle(&self) -> Result<Vec<MarketToSettle>> {
        let deadline = Utc::now() - ChronoDuration::seconds(self.finalize_delay.as_secs() as i64);
        self.store
            .markets_to_settle(deadline)
            .await
            .context("settle eligibility query failed")
    }

    pub async fn fetch_result(&self, event_id: &str) -> Result<MatchResult> {
        self.results
            .match_result(event_id)
            .await
            .with_context(|| format!("no usable result for event {event_id}"))
    }

    /// Assemble the fixed-shape oracle payload. Penalties are always
    /// reported as zero by this keeper.
    pub fn build_facts(&self, result: &MatchResult, scope: ResultScope) -> MatchFacts {
        MatchFacts {
            scope,
            home_goals: result.home_goals,
            away_goals: result.away_goals,
            extra_time: result.extra_time,
            home_penalties: 0,
            away_penalties: 0,
            reported_at: Utc::now().timestamp() as u64,
        }
    }

    /// Record Proposed plus the raw scores with the data provider. The
    /// proposal is already on-chain, so failures here are logged only.
    pub async fn write_proposed(
        &self,
        market: &MarketToSettle,
        outcome: &TxOutcome,
        result: &MatchResult,
    ) {
        let update = MarketStatusUpdate {
            address: market.address,
            status: MarketStatus::Proposed,
            tx_hash: outcome.tx_hash,
            timestamp: Utc::now(),
            scores: Some((result.home_goals, result.away_goals)),
        };
        if let Err(err) = self.store.update_market_status(update).await {
            warn!(
                "⚠️ market {} proposed on-chain but the status write-back failed: {err:#}",
                market.address,
            );
        }
    }
}

/// Direct-oracle settle task: proposes each market's result to the
/// market's own oracle contract, sequentially.
pub struct SettleTask {
    ctx: Arc<SettlementContext>,
    submitter: Arc<dyn MarketSubmitter>,
    alerts: Arc<dyn AlertSink>,
    shutdown: watch::Receiver<bool>,
}

impl SettleTask {
    pub fn new(
        ctx: Arc<SettlementContext>,
        submitter: Arc<dyn MarketSubmitter>,
        alerts: Arc<dyn AlertSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            ctx,
            submitter,
            alerts,
            shutdown,
        }
    }

    async fn run_cycle(&self) -> Result<()> {
        let markets = self.ctx.markets_to_settle().await?;
        if markets.is_empty() {
            debug!("⚖️ no markets ready to settle");
            return Ok(());
        }

        info!("⚖️ {} market(s) ready to settle", markets.len());
        let mut settled = 0usize;
        let mut failed = 0usize;

        for (index, market) in markets.iter().enumerate() {
            if *self.shutdown.borrow() {
                warn!(
                    "🛑 shutdown — settle cycle aborted with {} market(s) unprocessed",
                    markets.len() - index,
                );
                break;
            }

            match self.settle_market(market).await {
                Ok((outcome, result)) => {
                    settled += 1;
                    self.ctx.write_proposed(market, &outcome, &result).await;
                }
                Err(err) => {
                    failed += 1;
                    error!("❌ failed to settle market {}: {err:#}", market.address);
                    self.alerts
                        .notify(Alert::settle_failed(market.address, &err))
                        .await;
                }
            }
        }

        info!(
            "⚖️ settle cycle done | eligible={} settled={} failed={}",
            markets.len(),
            settled,
            failed,
        );
        Ok(())
    }

    async fn settle_market(&self, market: &MarketToSettle) -> Result<(TxOutcome, MatchResult)> {
        if market.address.is_zero() {
            bail!("refusing to settle the zero market address");
        }
        if market.oracle.is_zero() {
            bail!("market {} has no oracle to propose to", market.address);
        }

        let result = self.ctx.fetch_result(&market.event_id).await?;
        let facts = self.ctx.build_facts(&result, ResultScope::FullTime);
        let outcome = self
            .submitter
            .propose_result(market.address, market.oracle, facts)
            .await?;

        info!(
            "⚖️ proposed {}-{} for market {} | oracle={} tx={}",
            result.home_goals, result.away_goals, market.address, market.oracle, outcome.tx_hash,
        );
        Ok((outcome, result))
    }
}

impl Task for SettleTask {
    fn execute(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_cycle())
    }
}
