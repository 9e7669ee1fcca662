//! Credit score arithmetic

use agentrix_types::RiskLevel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const MIN_CREDIT_SCORE: Decimal = Decimal::ZERO;
pub const MAX_CREDIT_SCORE: Decimal = Decimal::ONE_THOUSAND;
pub const INITIAL_CREDIT_SCORE: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

/// Audit entries kept on the agent; older entries are dropped
pub const CREDIT_HISTORY_LIMIT: usize = 100;

/// One credit score adjustment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditScoreChange {
    pub delta: Decimal,
    pub new_score: Decimal,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Decimal places kept for scores and deltas
pub const CREDIT_SCORE_SCALE: u32 = 2;

/// Apply `delta` and clamp into `[0, 1000]`
pub fn adjust_score(score: Decimal, delta: Decimal) -> Decimal {
    score
        .saturating_add(delta)
        .clamp(MIN_CREDIT_SCORE, MAX_CREDIT_SCORE)
}

pub fn risk_level_for(score: Decimal) -> RiskLevel {
    if score >= Decimal::from(800) {
        RiskLevel::Low
    } else if score >= Decimal::from(500) {
        RiskLevel::Medium
    } else if score >= Decimal::from(200) {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_clamped() {
        assert_eq!(adjust_score(dec!(990), dec!(50)), dec!(1000));
        assert_eq!(adjust_score(dec!(10), dec!(-50)), dec!(0));
        assert_eq!(adjust_score(INITIAL_CREDIT_SCORE, dec!(12.5)), dec!(512.5));
    }

    #[test]
    fn test_extreme_delta_clamps() {
        assert_eq!(adjust_score(dec!(500), Decimal::MAX), MAX_CREDIT_SCORE);
        assert_eq!(adjust_score(dec!(500), Decimal::MIN), MIN_CREDIT_SCORE);
    }

    #[test]
    fn test_tiers() {
        assert_eq!(risk_level_for(dec!(1000)), RiskLevel::Low);
        assert_eq!(risk_level_for(dec!(800)), RiskLevel::Low);
        assert_eq!(risk_level_for(dec!(799.99)), RiskLevel::Medium);
        assert_eq!(risk_level_for(dec!(500)), RiskLevel::Medium);
        assert_eq!(risk_level_for(dec!(200)), RiskLevel::High);
        assert_eq!(risk_level_for(dec!(199)), RiskLevel::Critical);
        assert_eq!(risk_level_for(dec!(0)), RiskLevel::Critical);
    }
}
