//! Shared domain types for the market lifecycle tasks.

use alloy_primitives::{Address, TxHash};
use chrono::{DateTime, Utc};

/// Market lifecycle status. Transitions are forward-only:
/// Open → Locked → Proposed → Resolved → Finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatus {
    Open,
    Locked,
    Proposed,
    Resolved,
    Finalized,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Open => "open",
            MarketStatus::Locked => "locked",
            MarketStatus::Proposed => "proposed",
            MarketStatus::Resolved => "resolved",
            MarketStatus::Finalized => "finalized",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(MarketStatus::Open),
            "locked" => Some(MarketStatus::Locked),
            "proposed" => Some(MarketStatus::Proposed),
            "resolved" => Some(MarketStatus::Resolved),
            "finalized" => Some(MarketStatus::Finalized),
            _ => None,
        }
    }
}

/// Market template tag carried in `MarketParams`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketType {
    /// Total-goals market with a line (e.g. over/under 2.5).
    OverUnder,
    /// Match-winner market (home / away / draw).
    Winner,
}

/// Template-specific parameters attached to a market by the data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketParams {
    pub market_type: MarketType,
    /// Betting line scaled by 1000 (2500 = 2.5 goals).
    pub line: i64,
    /// True for fractional lines (2.5); false for integer lines (2.0)
    /// where an exact tie refunds as a push.
    pub half_line: bool,
}

/// One market due to be locked, as returned by the eligibility query.
/// Per-cycle value; discarded once the cycle ends.
#[derive(Debug, Clone)]
pub struct MarketToLock {
    pub address: Address,
    pub lock_time: DateTime<Utc>,
}

/// One market due to be settled.
#[derive(Debug, Clone)]
pub struct MarketToSettle {
    pub address: Address,
    /// Oracle contract this market proposes results to (direct variant).
    pub oracle: Address,
    /// Key into the external match-result provider.
    pub event_id: String,
    pub match_end: DateTime<Utc>,
    pub params: Option<MarketParams>,
}

/// Which portion of the match a reported result covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultScope {
    FullTime,
    AfterExtraTime,
}

impl ResultScope {
    pub fn code(&self) -> u8 {
        match self {
            ResultScope::FullTime => 0,
            ResultScope::AfterExtraTime => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultScope::FullTime => "full_time",
            ResultScope::AfterExtraTime => "after_extra_time",
        }
    }
}

/// Fixed-shape result payload accepted by the oracle contracts.
/// Penalty fields are always reported as zero by this keeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchFacts {
    pub scope: ResultScope,
    pub home_goals: u8,
    pub away_goals: u8,
    pub extra_time: bool,
    pub home_penalties: u8,
    pub away_penalties: u8,
    /// Unix seconds at which the keeper observed the result.
    pub reported_at: u64,
}

/// Status write-back sent to the data provider after an on-chain action.
#[derive(Debug, Clone)]
pub struct MarketStatusUpdate {
    pub address: Address,
    pub status: MarketStatus,
    pub tx_hash: TxHash,
    pub timestamp: DateTime<Utc>,
    /// Raw final scores, recorded for settlements only.
    pub scores: Option<(u8, u8)>,
}

/// Result of one confirmed transaction submission.
#[derive(Debug, Clone, Copy)]
pub struct TxOutcome {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}
