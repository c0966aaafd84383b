//! On-chain plumbing: contract bindings and the transaction submitter.
//!
//! Every submission follows the same discipline: cap the suggested gas
//! price at the configured ceiling, fetch the account's pending nonce from
//! the chain (never cached, see [`TxSubmitter::next_nonce`]), sign and
//! send, then poll for the mined receipt under a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use alloy_eips::eip1898::BlockId;
use alloy_primitives::{Address, TxHash};
use alloy_provider::Provider;
use alloy_sol_types::sol;
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::alerts::{Alert, AlertSink};
use crate::keeper::types::{MatchFacts, TxOutcome};

sol! {
    #[sol(rpc)]
    interface ISportsMarket {
        function lock() external;
    }

    #[sol(rpc)]
    interface IResultOracle {
        function proposeResult(
            address market,
            uint8 scope,
            uint8 homeGoals,
            uint8 awayGoals,
            bool extraTime,
            uint8 homePenalties,
            uint8 awayPenalties,
            uint64 reportedAt
        ) external;
    }

    #[sol(rpc)]
    interface IOptimisticAdapter {
        function proposeResult(
            address market,
            uint8 scope,
            uint8 homeGoals,
            uint8 awayGoals,
            bool extraTime,
            uint8 homePenalties,
            uint8 awayPenalties,
            uint64 reportedAt
        ) external;
    }
}

/// Cap a suggested gas price at the configured ceiling.
///
/// Capping is a ceiling, never an error: during a fee spike the keeper
/// submits at the ceiling and accepts that the transaction may be slow to
/// mine.
pub fn cap_gas_price(suggested: u128, max_gas_price: u128) -> u128 {
    suggested.min(max_gas_price)
}

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Hard ceiling on the gas price, in wei.
    pub max_gas_price: u128,
    /// How long to poll for a mined receipt before giving up.
    pub receipt_timeout: Duration,
    /// Delay between receipt polls.
    pub receipt_poll_interval: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            max_gas_price: 500_000_000_000, // 500 gwei
            receipt_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Submission seam used by the lifecycle tasks. Each call covers the full
/// flow: gas pricing, nonce, signing, sending, and receipt confirmation.
pub trait MarketSubmitter: Send + Sync {
    fn lock_market(&self, market: Address) -> BoxFuture<'_, Result<TxOutcome>>;

    fn propose_result(
        &self,
        market: Address,
        oracle: Address,
        facts: MatchFacts,
    ) -> BoxFuture<'_, Result<TxOutcome>>;

    fn propose_result_via_adapter(
        &self,
        market: Address,
        adapter: Address,
        facts: MatchFacts,
    ) -> BoxFuture<'_, Result<TxOutcome>>;
}

/// Concrete submitter over an alloy provider with a wallet filler.
#[derive(Clone)]
pub struct TxSubmitter<P>
where
    P: Provider + Clone + 'static,
{
    provider: Arc<P>,
    sender: Address,
    cfg: SubmitterConfig,
    alerts: Arc<dyn AlertSink>,
}

impl<P> TxSubmitter<P>
where
    P: Provider + Clone + 'static,
{
    pub fn new(
        provider: Arc<P>,
        sender: Address,
        cfg: SubmitterConfig,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            provider,
            sender,
            cfg,
            alerts,
        }
    }

    /// Suggested network gas price, capped at the ceiling. The cap also
    /// raises a non-blocking HighGasPrice alert.
    async fn calculate_gas_price(&self) -> Result<u128> {
        let suggested = self
            .provider
            .get_gas_price()
            .await
            .context("failed to fetch the suggested gas price")?;
        let capped = cap_gas_price(suggested, self.cfg.max_gas_price);
        if capped < suggested {
            warn!(
                "⛽ suggested gas price {suggested} wei above ceiling {} wei — submitting at the ceiling",
                self.cfg.max_gas_price,
            );
            self.alerts
                .notify(Alert::high_gas_price(suggested, self.cfg.max_gas_price))
                .await;
        }
        Ok(capped)
    }

    /// Next nonce for the signing account, from the chain's pending view.
    ///
    /// Fetched fresh for every transaction and never cached. Two tasks
    /// submitting concurrently from the same account can still race each
    /// other here; the keeper accepts that in exchange for statelessness.
    async fn next_nonce(&self) -> Result<u64> {
        self.provider
            .get_transaction_count(self.sender)
            .block_id(BlockId::pending())
            .await
            .context("failed to fetch the account nonce")
    }

    /// Poll for the mined receipt of `hash` and require a success status.
    async fn confirm(&self, hash: TxHash, label: &str) -> Result<TxOutcome> {
        let deadline = tokio::time::Instant::now() + self.cfg.receipt_timeout;
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .context("receipt poll failed")?;

            if let Some(receipt) = receipt {
                if !receipt.status() {
                    bail!("{label} transaction {hash} reverted on-chain");
                }
                debug!(
                    "⛓️ {label} tx {hash} mined in block {:?} (gas used: {})",
                    receipt.block_number, receipt.gas_used,
                );
                return Ok(TxOutcome {
                    tx_hash: hash,
                    block_number: receipt.block_number,
                });
            }

            if tokio::time::Instant::now() >= deadline {
                bail!(
                    "timed out after {:?} waiting for {label} receipt {hash}",
                    self.cfg.receipt_timeout,
                );
            }
            tokio::time::sleep(self.cfg.receipt_poll_interval).await;
        }
    }

    async fn submit_lock(&self, market: Address) -> Result<TxOutcome> {
        let gas_price = self.calculate_gas_price().await?;
        let nonce = self.next_nonce().await?;

        let contract = ISportsMarket::new(market, self.provider.clone());
        let pending = contract
            .lock()
            .from(self.sender)
            .gas_price(gas_price)
            .nonce(nonce)
            .send()
            .await
            .context("failed to submit the lock transaction")?;
        let hash = *pending.tx_hash();
        info!("⛓️ lock tx {hash} sent | market={market} nonce={nonce} gas_price={gas_price}");

        self.confirm(hash, "lock").await
    }

    async fn submit_propose(
        &self,
        market: Address,
        oracle: Address,
        facts: MatchFacts,
    ) -> Result<TxOutcome> {
        let gas_price = self.calculate_gas_price().await?;
        let nonce = self.next_nonce().await?;

        let contract = IResultOracle::new(oracle, self.provider.clone());
        let pending = contract
            .proposeResult(
                market,
                facts.scope.code(),
                facts.home_goals,
                facts.away_goals,
                facts.extra_time,
                facts.home_penalties,
                facts.away_penalties,
                facts.reported_at,
            )
            .from(self.sender)
            .gas_price(gas_price)
            .nonce(nonce)
            .send()
            .await
            .context("failed to submit the propose-result transaction")?;
        let hash = *pending.tx_hash();
        info!("⛓️ propose tx {hash} sent | market={market} oracle={oracle} nonce={nonce}");

        self.confirm(hash, "propose").await
    }

    async fn submit_propose_via_adapter(
        &self,
        market: Address,
        adapter: Address,
        facts: MatchFacts,
    ) -> Result<TxOutcome> {
        let gas_price = self.calculate_gas_price().await?;
        let nonce = self.next_nonce().await?;

        let contract = IOptimisticAdapter::new(adapter, self.provider.clone());
        let pending = contract
            .proposeResult(
                market,
                facts.scope.code(),
                facts.home_goals,
                facts.away_goals,
                facts.extra_time,
                facts.home_penalties,
                facts.away_penalties,
                facts.reported_at,
            )
            .from(self.sender)
            .gas_price(gas_price)
            .nonce(nonce)
            .send()
            .await
            .context("failed to submit the adapter proposal transaction")?;
        let hash = *pending.tx_hash();
        info!("⛓️ adapter propose tx {hash} sent | market={market} adapter={adapter} nonce={nonce}");

        self.confirm(hash, "adapter propose").await
    }
}

impl<P> MarketSubmitter for TxSubmitter<P>
where
    P: Provider + Clone + 'static,
{
    fn lock_market(&self, market: Address) -> BoxFuture<'_, Result<TxOutcome>> {
        Box::pin(self.submit_lock(market))
    }

    fn propose_result(
        &self,
        market: Address,
        oracle: Address,
        facts: MatchFacts,
    ) -> BoxFuture<'_, Result<TxOutcome>> {
        Box::pin(self.submit_propose(market, oracle, facts))
    }

    fn propose_result_via_adapter(
        &self,
        market: Address,
        adapter: Address,
        facts: MatchFacts,
    ) -> BoxFuture<'_, Result<TxOutcome>> {
        Box::pin(self.submit_propose_via_adapter(market, adapter, facts))
    }
}
