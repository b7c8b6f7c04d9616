//! Probability of profit and position sizing.
//!
//! Archetype-specific probability-of-profit estimates from leg deltas,
//! Kelly-fraction capital allocation, and lot sizing against the
//! per-archetype limit tables. Every output is clamped to its documented
//! range; degenerate inputs (zero deltas, zero max loss) produce the
//! documented conservative defaults instead of propagating out of range.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archetype::{PayoffProfile, StrategyArchetype};
use crate::config::SizingConfig;
use crate::strategy::StrategyLeg;

/// Kelly fraction bounds.
const KELLY_FLOOR: f64 = 0.01;
const KELLY_CAP: f64 = 0.25;

/// Probability of profit for an archetype given its resolved legs.
///
/// Deltas are read from the leg greeks snapshots (the selector fills in
/// model approximations when the feed had none), magnitudes only except in
/// the default branch, which uses position-signed deltas.
pub fn probability_of_profit(archetype: StrategyArchetype, legs: &[StrategyLeg]) -> f64 {
    let delta_of = |role: &str| -> f64 {
        legs.iter()
            .find(|l| l.role == role)
            .map(|l| l.greeks.delta.abs())
            .unwrap_or(0.5)
    };

    let pop = match archetype {
        StrategyArchetype::LongCall | StrategyArchetype::LongPut => {
            let delta = legs.first().map(|l| l.greeks.delta.abs()).unwrap_or(0.0);
            (delta * 0.92).min(0.92)
        }
        StrategyArchetype::BullCallSpread => (delta_of("short_call") * 0.8).min(0.70),
        StrategyArchetype::BearPutSpread => ((1.0 - delta_of("short_put")) * 0.8).min(0.70),
        // Credit verticals profit when the short leg expires worthless.
        StrategyArchetype::BearCallSpread => 1.0 - delta_of("short_call"),
        StrategyArchetype::BullPutSpread => 1.0 - delta_of("short_put"),
        StrategyArchetype::IronCondor | StrategyArchetype::IronButterfly => {
            let call_short = delta_of("call_short");
            let put_short = delta_of("put_short");
            ((1.0 - call_short) * put_short * 2.5).min(0.80)
        }
        StrategyArchetype::LongStraddle => 0.35,
        StrategyArchetype::ShortStraddle => 0.65,
        // Unlisted structures: directional lean from signed deltas around
        // a neutral 0.5 base.
        StrategyArchetype::LongStrangle | StrategyArchetype::ShortStrangle => {
            let net: f64 = legs
                .iter()
                .map(|l| l.side.sign() * l.greeks.delta)
                .sum();
            (0.5 + net * 0.3).clamp(0.2, 0.8)
        }
    };

    pop.clamp(0.0, 1.0)
}

/// Kelly fraction `f = (p*b - (1-p)) / b` with the documented clamps.
///
/// For unbounded-profit structures (long options, long straddles) the
/// payoff ratio uses the capped realistic target
/// `realistic_profit = max_loss * clamp(p*1.2, 0.3, 0.6)` rather than the
/// theoretical payout. A non-positive max loss short-circuits to the
/// conservative default 0.25.
pub fn kelly_fraction(pop: f64, payoff: &PayoffProfile) -> f64 {
    let p = pop.clamp(0.0, 1.0);
    let loss = payoff.max_loss.unwrap_or(payoff.risk_capital);
    if loss <= 0.0 {
        return KELLY_CAP;
    }

    let b = match payoff.max_profit {
        Some(profit) => profit / loss,
        None => (p * 1.2).clamp(0.3, 0.6),
    };
    if b <= 0.0 {
        return KELLY_FLOOR;
    }

    let f = (p * b - (1.0 - p)) / b;
    f.clamp(KELLY_FLOOR, KELLY_CAP)
}

/// Computed position size for one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSize {
    /// Number of lots
    pub lots: u32,
    /// Capital required per lot (premium or risk capital x multiplier)
    pub premium_per_lot: f64,
    /// Total capital at risk: lots x max loss per lot
    pub premium_at_risk: f64,
    /// Risk as a percent of allocated capital, capped at the configured
    /// reporting ceiling
    pub risk_percentage: f64,
    /// Kelly fraction used
    pub kelly_fraction: f64,
    /// Rating multiplier applied
    pub rating_multiplier: f64,
}

/// Lot sizing: Kelly-scaled budget divided by per-lot premium, clamped to
/// the archetype's lot limits.
///
/// The reporting cap on `risk_percentage` never alters the lot count.
pub fn size_position(
    archetype: StrategyArchetype,
    payoff: &PayoffProfile,
    pop: f64,
    composite_score: f64,
    config: &SizingConfig,
) -> PositionSize {
    let kelly = kelly_fraction(pop, payoff);
    let rating_multiplier = config.rating_multipliers.for_score(composite_score);
    let multiplier = config.lot_size as f64;

    // Capital consumed per lot: the debit for debit structures, the risk
    // capital for credit and short-premium structures.
    let per_unit = if payoff.net_premium > 0.0 {
        payoff.net_premium
    } else {
        payoff.risk_capital
    };
    let premium_per_lot = (per_unit * multiplier).max(1e-9);

    let budget = config.allocated_capital * config.risk_fraction * kelly * rating_multiplier;
    let raw_lots = (budget / premium_per_lot).floor() as i64;

    let (min_lots, max_lots) = config.lot_limits.limits(archetype);
    let lots = raw_lots.clamp(min_lots as i64, max_lots as i64) as u32;

    let max_loss_per_lot = payoff.max_loss.unwrap_or(payoff.risk_capital) * multiplier;
    let premium_at_risk = lots as f64 * max_loss_per_lot;
    let risk_percentage = if config.allocated_capital > 0.0 {
        (premium_at_risk / config.allocated_capital * 100.0).min(config.max_risk_pct)
    } else {
        config.max_risk_pct
    };

    debug!(
        archetype = archetype.display_name(),
        lots,
        kelly,
        rating_multiplier,
        premium_at_risk,
        "position sized"
    );

    PositionSize {
        lots,
        premium_per_lot,
        premium_at_risk,
        risk_percentage,
        kelly_fraction: kelly,
        rating_multiplier,
    }
}

/// Convenience entry point: probability, Kelly, and sizing in one call.
pub fn compute_probability_and_size(
    archetype: StrategyArchetype,
    legs: &[StrategyLeg],
    payoff: &PayoffProfile,
    composite_score: f64,
    config: &SizingConfig,
) -> (f64, f64, PositionSize) {
    let pop = probability_of_profit(archetype, legs);
    let kelly = kelly_fraction(pop, payoff);
    let size = size_position(archetype, payoff, pop, composite_score, config);
    (pop, kelly, size)
}
