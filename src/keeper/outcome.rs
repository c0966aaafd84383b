//! Over/Under outcome calculation.
//!
//! The line arrives as an integer scaled by 1000 (2500 = 2.5 goals) so the
//! comparison against the goal total stays exact, with no float tolerance
//! windows anywhere in the decision.

/// Winning-outcome code for an Over/Under market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverUnderOutcome {
    Over,
    Under,
    /// Exact hit on an integer line; stakes are refunded.
    Push,
}

impl OverUnderOutcome {
    /// Code understood by the oracle contracts: 0 = over, 1 = under, 2 = push.
    pub fn code(&self) -> u8 {
        match self {
            OverUnderOutcome::Over => 0,
            OverUnderOutcome::Under => 1,
            OverUnderOutcome::Push => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverUnderOutcome::Over => "OVER",
            OverUnderOutcome::Under => "UNDER",
            OverUnderOutcome::Push => "PUSH",
        }
    }
}

/// Decide an Over/Under market from the final goal counts.
///
/// `line` is scaled by 1000. `half_line` marks fractional lines (2.5),
/// which cannot push; integer lines (2.0) push on an exact hit.
pub fn over_under_outcome(
    home_goals: u8,
    away_goals: u8,
    line: i64,
    half_line: bool,
) -> OverUnderOutcome {
    // Scale the total instead of dividing the line: integers only.
    let scaled_total = (home_goals as i64 + away_goals as i64) * 1000;

    if half_line {
        if scaled_total > line {
            OverUnderOutcome::Over
        } else {
            OverUnderOutcome::Under
        }
    } else {
        match scaled_total.cmp(&line) {
            std::cmp::Ordering::Greater => OverUnderOutcome::Over,
            std::cmp::Ordering::Less => OverUnderOutcome::Under,
            std::cmp::Ordering::Equal => OverUnderOutcome::Push,
        }
    }
}
