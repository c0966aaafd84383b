//! Settlement: Locked → Proposed, optimistic-oracle variant.
//!
//! Proposals go to a single adapter contract instead of each market's own
//! oracle; the proposal stands unless disputed, and the resulting status
//! change reaches the data provider through the adapter's on-chain events,
//! so this task performs no status write-back of its own. Markets are
//! processed through the bounded worker pool so one slow receipt does not
//! hold up the cycle.

use std::sync::Arc;

use anyhow::{bail, Result};
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::alerts::{Alert, AlertSink};
use crate::chain::MarketSubmitter;
use crate::keeper::outcome::over_under_outcome;
use crate::keeper::pool::process_markets;
use crate::keeper::scheduler::Task;
use crate::keeper::settle::SettlementContext;
use crate::keeper::types::{MarketToSettle, MarketType, ResultScope, TxOutcome};
use alloy_primitives::Address;

pub struct UmaSettleTask {
    inner: Arc<UmaSettleInner>,
}

struct UmaSettleInner {
    ctx: Arc<SettlementContext>,
    submitter: Arc<dyn MarketSubmitter>,
    alerts: Arc<dyn AlertSink>,
    adapter: Address,
    max_concurrent: usize,
    shutdown: watch::Receiver<bool>,
}

impl UmaSettleTask {
    pub fn new(
        ctx: Arc<SettlementContext>,
        submitter: Arc<dyn MarketSubmitter>,
        alerts: Arc<dyn AlertSink>,
        adapter: Address,
        max_concurrent: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inner: Arc::new(UmaSettleInner {
                ctx,
                submitter,
                alerts,
                adapter,
                max_concurrent,
                shutdown,
            }),
        }
    }

    async fn run_cycle(&self) -> Result<()> {
        if self.inner.adapter.is_zero() {
            bail!("optimistic oracle adapter address is not configured");
        }

        let markets = self.inner.ctx.markets_to_settle().await?;
        if markets.is_empty() {
            debug!("🔮 no markets ready for optimistic settlement");
            return Ok(());
        }

        info!(
            "🔮 {} market(s) ready for optimistic settlement | workers≤{}",
            markets.len(),
            self.inner.max_concurrent,
        );

        let handler_inner = self.inner.clone();
        let report = process_markets(
            markets,
            self.inner.max_concurrent,
            self.inner.shutdown.clone(),
            move |market: MarketToSettle| {
                let inner = handler_inner.clone();
                async move {
                    match inner.settle_market(&market).await {
                        Ok(_) => Ok(()),
                        Err(err) => {
                            error!("❌ failed to settle market {}: {err:#}", market.address);
                            inner
                                .alerts
                                .notify(Alert::settle_failed(market.address, &err))
                                .await;
                            Err(err)
                        }
                    }
                }
            },
        )
        .await;

        // Partial success is the normal shape of a cycle; only log the
        // aggregate and let every market be retried by re-selection.
        if report.all_succeeded() {
            info!("🔮 optimistic settle cycle done | settled={}", report.attempted);
        } else {
            error!(
                "🔮 optimistic settle cycle degraded | attempted={} failed={} first_error={}",
                report.attempted,
                report.failed,
                report.first_error.as_deref().unwrap_or("<none>"),
            );
        }
        Ok(())
    }
}

impl UmaSettleInner {
    async fn settle_market(&self, market: &MarketToSettle) -> Result<TxOutcome> {
        if market.address.is_zero() {
            bail!("refusing to settle the zero market address");
        }

        let result = self.ctx.fetch_result(&market.event_id).await?;
        let scope = if result.extra_time {
            ResultScope::AfterExtraTime
        } else {
            ResultScope::FullTime
        };

        if let Some(params) = &market.params {
            if params.market_type == MarketType::OverUnder {
                // Observability only: the adapter receives raw goal counts,
                // never this derived code.
                let outcome = over_under_outcome(
                    result.home_goals,
                    result.away_goals,
                    params.line,
                    params.half_line,
                );
                info!(
                    "🔮 market {} over/under {} line: total={} → {}",
                    market.address,
                    params.line as f64 / 1000.0,
                    result.total_goals(),
                    outcome.as_str(),
                );
            }
        }

        let facts = self.ctx.build_facts(&result, scope);
        let outcome = self
            .submitter
            .propose_result_via_adapter(market.address, self.adapter, facts)
            .await?;

        info!(
            "🔮 proposed {}-{} ({}) for market {} via adapter | tx={}",
            result.home_goals,
            result.away_goals,
            scope.as_str(),
            market.address,
            outcome.tx_hash,
        );
        Ok(outcome)
    }
}

impl Task for UmaSettleTask {
    fn execute(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_cycle())
    }
}
