//! Engine configuration.
//!
//! All tunable decision tables live here as explicit data loaded once at
//! startup: timeframe multipliers, lot limits, rating multipliers, and the
//! selector/smile/sizing knobs. Components receive these tables by value
//! and never re-derive them per call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use quantnidhi_models::HoldingPeriod;

use crate::archetype::StrategyArchetype;
use crate::smile::SmileConfig;

/// Timeframe multipliers for expected-move strike targets, keyed by
/// holding-period bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeframeTable {
    pub days_1_to_5: f64,
    pub days_6_to_10: f64,
    pub days_11_to_20: f64,
    pub days_21_to_30: f64,
    pub days_30_plus: f64,
}

impl Default for TimeframeTable {
    fn default() -> Self {
        Self {
            days_1_to_5: 0.30,
            days_6_to_10: 0.50,
            days_11_to_20: 0.75,
            days_21_to_30: 1.00,
            days_30_plus: 1.25,
        }
    }
}

impl TimeframeTable {
    pub fn multiplier(&self, period: HoldingPeriod) -> f64 {
        match period {
            HoldingPeriod::Days1To5 => self.days_1_to_5,
            HoldingPeriod::Days6To10 => self.days_6_to_10,
            HoldingPeriod::Days11To20 => self.days_11_to_20,
            HoldingPeriod::Days21To30 => self.days_21_to_30,
            HoldingPeriod::Days30Plus => self.days_30_plus,
        }
    }
}

/// Per-archetype lot limits: archetype defaults plus optional overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LotLimitTable {
    /// Overrides keyed by archetype; absent entries use the archetype's
    /// built-in (min, max)
    pub overrides: HashMap<StrategyArchetype, (u32, u32)>,
}

impl LotLimitTable {
    pub fn limits(&self, archetype: StrategyArchetype) -> (u32, u32) {
        self.overrides
            .get(&archetype)
            .copied()
            .unwrap_or_else(|| archetype.default_lot_limits())
    }
}

/// Rating multipliers applied to lot sizing by composite-score band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingMultipliers {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub weak: f64,
}

impl Default for RatingMultipliers {
    fn default() -> Self {
        Self {
            excellent: 1.5,
            good: 1.2,
            fair: 1.0,
            weak: 0.7,
        }
    }
}

impl RatingMultipliers {
    /// Multiplier for a composite score in [0, ~1.1].
    pub fn for_score(&self, score: f64) -> f64 {
        if score >= 0.80 {
            self.excellent
        } else if score >= 0.65 {
            self.good
        } else if score >= 0.50 {
            self.fair
        } else {
            self.weak
        }
    }
}

/// Strike-selector knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Risk-free rate used for delta inversion and greeks approximation
    pub risk_free_rate: f64,
    /// Cap on max_distance_fraction after relaxation
    pub max_relaxed_distance: f64,
    /// Timeframe multipliers for expected-move targets
    pub timeframe_multipliers: TimeframeTable,
    /// Emergency fallback: rungs above/below ATM for OTM targets
    pub fallback_otm_rungs: u32,
    /// Emergency fallback: rungs toward the money for ITM targets
    pub fallback_itm_rungs: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.065,
            max_relaxed_distance: 0.20,
            timeframe_multipliers: TimeframeTable::default(),
            fallback_otm_rungs: 2,
            fallback_itm_rungs: 1,
        }
    }
}

/// Position-sizing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Capital allocated to this underlying
    pub allocated_capital: f64,
    /// Fraction of the Kelly-scaled budget actually deployed per trade
    pub risk_fraction: f64,
    /// Contract multiplier (units per lot)
    pub lot_size: u32,
    /// Reporting ceiling for risk percentage; does not alter lot counts
    pub max_risk_pct: f64,
    /// Lot limits table
    pub lot_limits: LotLimitTable,
    /// Rating multipliers table
    pub rating_multipliers: RatingMultipliers,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            allocated_capital: 1_000_000.0,
            risk_fraction: 0.5,
            lot_size: 50,
            max_risk_pct: 5.0,
            lot_limits: LotLimitTable::default(),
            rating_multipliers: RatingMultipliers::default(),
        }
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum composite score for a strategy to be emitted
    pub min_strategy_score: f64,
    /// Number of top-ranked strategies to emit per pass
    pub top_n: usize,
    /// Drop smile-rejected candidates instead of halving their score
    pub hard_smile_filter: bool,
    /// Smile model knobs
    pub smile: SmileConfig,
    /// Strike selector knobs
    pub selector: SelectorConfig,
    /// Sizing knobs
    pub sizing: SizingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_strategy_score: 0.40,
            top_n: 3,
            hard_smile_filter: false,
            smile: SmileConfig::default(),
            selector: SelectorConfig::default(),
            sizing: SizingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file. Missing sections fall back to
    /// defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|_| anyhow::anyhow!("Could not find config file: {}", path))?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }
}
