//! Constructed strategy instances.
//!
//! A `StrategyInstance` is the engine's output unit: resolved legs, payoff
//! analytics, probability and sizing, and the ranker's component scores.

use chrono::NaiveDate;
use quantnidhi_models::OptionType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::archetype::{PayoffProfile, StrategyArchetype};
use crate::greeks::Greeks;
use crate::probability::PositionSize;

/// Long or short position in a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

/// One resolved leg of a strategy. Owned by exactly one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyLeg {
    /// Role name from the archetype template (e.g. "put_short")
    pub role: String,
    /// Call or Put
    pub option_type: OptionType,
    /// Long or short
    pub side: PositionSide,
    /// Resolved strike
    pub strike: f64,
    /// Expiry date
    pub expiry: NaiveDate,
    /// Contract units per lot (all current archetypes use 1)
    pub quantity: u32,
    /// Entry premium per unit (mid price at selection)
    pub premium: f64,
    /// Greeks snapshot at selection; approximated when the feed had none
    pub greeks: Greeks,
    /// Open interest at selection, for liquidity scoring
    pub open_interest: u64,
}

impl StrategyLeg {
    /// Signed delta contribution of this leg.
    pub fn signed_delta(&self) -> f64 {
        self.side.sign() * self.greeks.delta
    }

    /// Signed theta contribution of this leg, per day.
    pub fn signed_theta(&self) -> f64 {
        self.side.sign() * self.greeks.theta
    }
}

/// Per-factor scores assigned by the ranker, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub pop: f64,
    pub direction_alignment: f64,
    pub risk_reward: f64,
    pub iv_compatibility: f64,
    pub theta: f64,
    pub liquidity: f64,
}

/// A fully constructed, scored strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInstance {
    /// Instance id
    pub id: Uuid,
    /// Archetype
    pub archetype: StrategyArchetype,
    /// Underlying symbol
    pub symbol: String,
    /// Legs in archetype template order
    pub legs: Vec<StrategyLeg>,
    /// Net premium per unit: positive debit, negative credit
    pub net_premium: f64,
    /// Maximum profit per unit; the capped realistic target when the
    /// theoretical payoff is unbounded
    pub max_profit: f64,
    /// Maximum loss per unit; the margin proxy when unbounded
    pub max_loss: f64,
    /// Theoretical profit is unbounded (long options, long straddles)
    pub unbounded_profit: bool,
    /// Theoretical loss is unbounded (short straddles/strangles)
    pub unbounded_loss: bool,
    /// Expiry breakeven points
    pub breakeven_points: Vec<f64>,
    /// Probability of profit, [0, 1]
    pub probability_of_profit: f64,
    /// Kelly fraction, [0.01, 0.25]
    pub kelly_fraction: f64,
    /// Lot sizing, when capital parameters were supplied
    pub position_size: Option<PositionSize>,
    /// Ranker component scores
    pub component_scores: ComponentScores,
    /// Composite score
    pub total_score: f64,
    /// Caller-supplied bonus applied multiplicatively by the ranker
    pub metadata_bonus: f64,
    /// Human-readable scoring and filter notes
    pub reasoning: Vec<String>,
}

impl StrategyInstance {
    /// Build an instance from resolved legs and payoff analytics. Scores
    /// and sizing are filled in by the probability engine and ranker.
    pub fn from_legs(
        archetype: StrategyArchetype,
        symbol: impl Into<String>,
        legs: Vec<StrategyLeg>,
        payoff: &PayoffProfile,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            archetype,
            symbol: symbol.into(),
            legs,
            net_premium: payoff.net_premium,
            max_profit: payoff.max_profit.unwrap_or(0.0),
            max_loss: payoff.max_loss.unwrap_or(payoff.risk_capital),
            unbounded_profit: payoff.max_profit.is_none(),
            unbounded_loss: payoff.max_loss.is_none(),
            breakeven_points: payoff.breakeven_points.clone(),
            probability_of_profit: 0.0,
            kelly_fraction: 0.0,
            position_size: None,
            component_scores: ComponentScores::default(),
            total_score: 0.0,
            metadata_bonus: 0.0,
            reasoning: Vec::new(),
        }
    }

    /// Sum of signed leg deltas.
    pub fn net_delta(&self) -> f64 {
        self.legs.iter().map(|l| l.signed_delta()).sum()
    }

    /// Sum of signed leg thetas, per day.
    pub fn net_theta(&self) -> f64 {
        self.legs.iter().map(|l| l.signed_theta()).sum()
    }

    /// Smallest open interest across legs.
    pub fn min_leg_open_interest(&self) -> u64 {
        self.legs
            .iter()
            .map(|l| l.open_interest)
            .min()
            .unwrap_or(0)
    }
}
