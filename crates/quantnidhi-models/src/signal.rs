//! Market-direction and expected-move inputs.
//!
//! Produced by the technical/options-flow analyzer and the volatility
//! profiler; the engine treats them as read-only context for one pass.

use serde::{Deserialize, Serialize};

/// Direction label from the external analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl MarketDirection {
    /// Directional sign: +1 bullish, -1 bearish, 0 neutral.
    pub fn sign(&self) -> f64 {
        match self {
            MarketDirection::Bullish => 1.0,
            MarketDirection::Bearish => -1.0,
            MarketDirection::Neutral => 0.0,
        }
    }
}

/// IV-environment label from the external analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IvEnvironment {
    /// IV percentile < 25: premium cheap
    Low,
    /// IV percentile 25-75
    Normal,
    /// IV percentile > 75: premium rich
    High,
    /// IV percentile > 90
    Extreme,
}

/// Market-direction signal consumed by the strike selector and ranker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DirectionSignal {
    /// Direction label
    pub direction: MarketDirection,
    /// Confidence in the label, 0.0 to 1.0
    pub confidence: f64,
    /// IV environment label
    pub iv_environment: IvEnvironment,
}

impl DirectionSignal {
    /// Signed directional strength in [-1, 1]: confidence with the
    /// direction's sign applied. Neutral signals are 0 regardless of
    /// confidence.
    pub fn signed_strength(&self) -> f64 {
        self.direction.sign() * self.confidence.clamp(0.0, 1.0)
    }

    /// One-standard-deviation expected move as a percent of spot, from ATM
    /// IV and days to expiry.
    pub fn expected_move_pct(iv: f64, dte: u32) -> f64 {
        iv * ((dte as f64) / 365.0).sqrt() * 100.0
    }
}

/// Holding-period bucket used to scale expected-move strike targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldingPeriod {
    /// 1-5 days
    Days1To5,
    /// 6-10 days
    Days6To10,
    /// 11-20 days
    Days11To20,
    /// 21-30 days
    Days21To30,
    /// 30+ days
    Days30Plus,
}

impl HoldingPeriod {
    /// Bucket a holding period expressed in days.
    pub fn from_days(days: u32) -> Self {
        match days {
            0..=5 => HoldingPeriod::Days1To5,
            6..=10 => HoldingPeriod::Days6To10,
            11..=20 => HoldingPeriod::Days11To20,
            21..=30 => HoldingPeriod::Days21To30,
            _ => HoldingPeriod::Days30Plus,
        }
    }

    /// Midpoint of the bucket in days, used when matching expiries.
    pub fn target_days(&self) -> u32 {
        match self {
            HoldingPeriod::Days1To5 => 3,
            HoldingPeriod::Days6To10 => 8,
            HoldingPeriod::Days11To20 => 15,
            HoldingPeriod::Days21To30 => 25,
            HoldingPeriod::Days30Plus => 40,
        }
    }
}

/// Per-pass market context: direction signal plus the externally supplied
/// one-standard-deviation expected move in absolute price units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketContext {
    /// Direction signal from the analyzer
    pub signal: DirectionSignal,
    /// 1-SD expected move, absolute price units
    pub expected_move: f64,
    /// Intended holding period
    pub holding_period: HoldingPeriod,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_strength() {
        let s = DirectionSignal {
            direction: MarketDirection::Bearish,
            confidence: 0.8,
            iv_environment: IvEnvironment::Normal,
        };
        assert!((s.signed_strength() + 0.8).abs() < 1e-12);

        let n = DirectionSignal {
            direction: MarketDirection::Neutral,
            confidence: 0.9,
            iv_environment: IvEnvironment::Normal,
        };
        assert_eq!(n.signed_strength(), 0.0);
    }

    #[test]
    fn test_holding_period_buckets() {
        assert_eq!(HoldingPeriod::from_days(3), HoldingPeriod::Days1To5);
        assert_eq!(HoldingPeriod::from_days(10), HoldingPeriod::Days6To10);
        assert_eq!(HoldingPeriod::from_days(31), HoldingPeriod::Days30Plus);
    }

    #[test]
    fn test_expected_move_pct() {
        // 20% IV, 365 DTE: one SD is the full 20%
        let pct = DirectionSignal::expected_move_pct(0.20, 365);
        assert!((pct - 20.0).abs() < 1e-9);
    }
}
