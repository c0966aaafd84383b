//! HTTP client for the market data provider.
//!
//! The provider (fed by the chain indexer) owns the market records; this
//! keeper only reads eligibility slices and writes status transitions back.
//! The eligibility windows are re-applied client-side: the keeper never
//! acts on a market outside its own window, whatever the API returns.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::keeper::types::{
    MarketParams, MarketStatusUpdate, MarketToLock, MarketToSettle, MarketType,
};

/// Seam to the market data provider.
pub trait MarketStore: Send + Sync {
    /// Open markets whose lock time falls inside `(now, now + window]`,
    /// ascending by lock time.
    fn markets_to_lock(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> BoxFuture<'_, Result<Vec<MarketToLock>>>;

    /// Locked markets whose match ended at or before `deadline`,
    /// ascending by match end.
    fn markets_to_settle(
        &self,
        deadline: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<MarketToSettle>>>;

    /// Record a status transition after an on-chain action.
    fn update_market_status(&self, update: MarketStatusUpdate) -> BoxFuture<'_, Result<()>>;
}

// ─────────────────────────────────────────────────────────
// Eligibility windows (pure)
// ─────────────────────────────────────────────────────────

/// Keep markets inside the half-open lock window `(now, now + window]`,
/// ascending by lock time. Markets already at or past their lock time are
/// excluded: those belong to the previous cycle or are stale.
pub fn filter_lockable(
    mut markets: Vec<MarketToLock>,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<MarketToLock> {
    let until = now + ChronoDuration::seconds(window.as_secs() as i64);
    markets.retain(|m| m.lock_time > now && m.lock_time <= until);
    markets.sort_by_key(|m| m.lock_time);
    markets
}

/// Keep markets whose match ended at or before `deadline`, ascending by
/// match end.
pub fn filter_settleable(
    mut markets: Vec<MarketToSettle>,
    deadline: DateTime<Utc>,
) -> Vec<MarketToSettle> {
    markets.retain(|m| m.match_end <= deadline);
    markets.sort_by_key(|m| m.match_end);
    markets
}

// ─────────────────────────────────────────────────────────
// Wire DTOs
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMarket {
    address: String,
    #[serde(default)]
    lock_time: Option<i64>,
    #[serde(default)]
    match_end: Option<i64>,
    #[serde(default)]
    oracle_address: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    market_type: Option<String>,
    #[serde(default)]
    line: Option<i64>,
    #[serde(default)]
    half_line: Option<bool>,
}

impl ApiMarket {
    fn into_lockable(self) -> Option<MarketToLock> {
        let address = match self.address.parse() {
            Ok(a) => a,
            Err(_) => {
                warn!("📇 skipping market with unparseable address: {}", self.address);
                return None;
            }
        };
        let lock_time = self.lock_time.and_then(|t| DateTime::from_timestamp(t, 0))?;
        Some(MarketToLock { address, lock_time })
    }

    fn into_settleable(self) -> Option<MarketToSettle> {
        let address = match self.address.parse() {
            Ok(a) => a,
            Err(_) => {
                warn!("📇 skipping market with unparseable address: {}", self.address);
                return None;
            }
        };
        // Markets without a recorded match end are not settleable yet.
        let match_end = self.match_end.and_then(|t| DateTime::from_timestamp(t, 0))?;
        let oracle = self
            .oracle_address
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let event_id = self.event_id.unwrap_or_default();
        let params = match (self.market_type.as_deref(), self.line, self.half_line) {
            (Some("overUnder"), Some(line), Some(half_line)) => Some(MarketParams {
                market_type: MarketType::OverUnder,
                line,
                half_line,
            }),
            (Some("winner"), _, _) => Some(MarketParams {
                market_type: MarketType::Winner,
                line: 0,
                half_line: false,
            }),
            _ => None,
        };
        Some(MarketToSettle {
            address,
            oracle,
            event_id,
            match_end,
            params,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdateBody {
    status: &'static str,
    tx_hash: String,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    home_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    away_score: Option<u8>,
}

// ─────────────────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────────────────

/// HTTP implementation of [`MarketStore`].
pub struct MarketApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl MarketApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    async fn get_markets(&self, path: &str) -> Result<Vec<ApiMarket>> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to reach the market data provider")?;

        if !resp.status().is_success() {
            anyhow::bail!("market data provider returned status {}", resp.status());
        }

        resp.json()
            .await
            .context("failed to parse market list response")
    }

    async fn fetch_lockable(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<Vec<MarketToLock>> {
        let until = now.timestamp() + window.as_secs() as i64;
        let path = format!("/markets?status=open&lockBefore={until}");
        let markets = self
            .get_markets(&path)
            .await?
            .into_iter()
            .filter_map(ApiMarket::into_lockable)
            .collect();
        Ok(filter_lockable(markets, now, window))
    }

    async fn fetch_settleable(&self, deadline: DateTime<Utc>) -> Result<Vec<MarketToSettle>> {
        let path = format!("/markets?status=locked&endedBefore={}", deadline.timestamp());
        let markets = self
            .get_markets(&path)
            .await?
            .into_iter()
            .filter_map(ApiMarket::into_settleable)
            .collect();
        Ok(filter_settleable(markets, deadline))
    }

    async fn post_update(&self, update: MarketStatusUpdate) -> Result<()> {
        let url = format!("{}/markets/{}/status", self.base_url, update.address);
        let body = StatusUpdateBody {
            status: update.status.as_str(),
            tx_hash: format!("{:#x}", update.tx_hash),
            timestamp: update.timestamp.timestamp(),
            home_score: update.scores.map(|(h, _)| h),
            away_score: update.scores.map(|(_, a)| a),
        };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("failed to reach the market data provider")?;

        if !resp.status().is_success() {
            anyhow::bail!("status write-back rejected with status {}", resp.status());
        }
        Ok(())
    }
}

impl MarketStore for MarketApiClient {
    fn markets_to_lock(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> BoxFuture<'_, Result<Vec<MarketToLock>>> {
        Box::pin(self.fetch_lockable(now, window))
    }

    fn markets_to_settle(
        &self,
        deadline: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<MarketToSettle>>> {
        Box::pin(self.fetch_settleable(deadline))
    }

    fn update_market_status(&self, update: MarketStatusUpdate) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.post_update(update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    fn lockable(n: u8, offset_secs: i64, now: DateTime<Utc>) -> MarketToLock {
        MarketToLock {
            address: Address::repeat_byte(n),
            lock_time: now + ChronoDuration::seconds(offset_secs),
        }
    }

    fn settleable(n: u8, end: DateTime<Utc>) -> MarketToSettle {
        MarketToSettle {
            address: Address::repeat_byte(n),
            oracle: Address::repeat_byte(0xaa),
            event_id: format!("ev-{n}"),
            match_end: end,
            params: None,
        }
    }

    #[test]
    fn test_lock_window_is_half_open() {
        let now = Utc::now();
        let window = Duration::from_secs(3600);
        let markets = vec![
            lockable(1, -10, now),  // already past lock time: excluded
            lockable(2, 0, now),    // exactly now: excluded
            lockable(3, 1, now),    // just inside
            lockable(4, 3600, now), // exactly at the window edge: included
            lockable(5, 3601, now), // past the window: excluded
        ];
        let kept = filter_lockable(markets, now, window);
        let addrs: Vec<_> = kept.iter().map(|m| m.address).collect();
        assert_eq!(addrs, vec![Address::repeat_byte(3), Address::repeat_byte(4)]);
    }

    #[test]
    fn test_lockable_sorted_by_lock_time() {
        let now = Utc::now();
        let markets = vec![lockable(1, 300, now), lockable(2, 100, now), lockable(3, 200, now)];
        let kept = filter_lockable(markets, now, Duration::from_secs(3600));
        let addrs: Vec<_> = kept.iter().map(|m| m.address).collect();
        assert_eq!(
            addrs,
            vec![Address::repeat_byte(2), Address::repeat_byte(3), Address::repeat_byte(1)]
        );
    }

    #[test]
    fn test_settle_deadline_filter() {
        let deadline = Utc::now();
        let markets = vec![
            settleable(1, deadline - ChronoDuration::seconds(60)),
            settleable(2, deadline), // exactly at the deadline: included
            settleable(3, deadline + ChronoDuration::seconds(1)),
        ];
        let kept = filter_settleable(markets, deadline);
        let addrs: Vec<_> = kept.iter().map(|m| m.address).collect();
        assert_eq!(addrs, vec![Address::repeat_byte(1), Address::repeat_byte(2)]);
    }

    #[test]
    fn test_market_without_match_end_is_dropped() {
        let raw = ApiMarket {
            address: format!("{}", Address::repeat_byte(1)),
            lock_time: None,
            match_end: None,
            oracle_address: None,
            event_id: Some("ev".into()),
            market_type: None,
            line: None,
            half_line: None,
        };
        assert!(raw.into_settleable().is_none());
    }

    #[test]
    fn test_over_under_params_parsed() {
        let raw = ApiMarket {
            address: format!("{}", Address::repeat_byte(1)),
            lock_time: None,
            match_end: Some(Utc::now().timestamp()),
            oracle_address: Some(format!("{}", Address::repeat_byte(2))),
            event_id: Some("ev".into()),
            market_type: Some("overUnder".into()),
            line: Some(2500),
            half_line: Some(true),
        };
        let market = raw.into_settleable().unwrap();
        let params = market.params.unwrap();
        assert_eq!(params.market_type, MarketType::OverUnder);
        assert_eq!(params.line, 2500);
        assert!(params.half_line);
    }

    #[test]
    fn test_unparseable_address_is_skipped() {
        let raw = ApiMarket {
            address: "not-an-address".into(),
            lock_time: Some(Utc::now().timestamp()),
            match_end: None,
            oracle_address: None,
            event_id: None,
            market_type: None,
            line: None,
            half_line: None,
        };
        assert!(raw.into_lockable().is_none());
    }
}
