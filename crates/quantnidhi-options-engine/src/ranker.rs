//! Strategy ranking.
//!
//! Folds probability, direction fit, risk/reward, IV fit, theta posture,
//! and liquidity into one composite score per candidate, applies the
//! admission and smile filters, and orders the survivors. Scoring never
//! mutates the candidate's legs or payoff; it only fills the score fields
//! and reasoning notes.

use tracing::debug;

use quantnidhi_models::{DirectionSignal, IvEnvironment};

use crate::archetype::{ThetaPosture, VegaPosture};
use crate::smile::{SmileModel, SmileRiskMetrics};
use crate::strategy::{ComponentScores, StrategyInstance};

/// Composite weights. Fixed by design; tunability lives in the tables the
/// factors read from, not in the blend.
const W_POP: f64 = 0.35;
const W_DIRECTION: f64 = 0.25;
const W_RISK_REWARD: f64 = 0.15;
const W_IV: f64 = 0.10;
const W_THETA: f64 = 0.10;
const W_LIQUIDITY: f64 = 0.05;

/// Open interest at which a leg counts as fully liquid.
const FULL_LIQUIDITY_OI: f64 = 1000.0;

/// External risk-admissibility check, consulted as a final hard filter.
pub trait RiskGate {
    /// Ok to admit, or the rejection reason.
    fn admit(&self, instance: &StrategyInstance) -> Result<(), String>;
}

/// Ranking context for one pass.
pub struct RankContext<'a> {
    /// Direction signal from the analyzer
    pub signal: &'a DirectionSignal,
    /// Smile model for admissibility checks, when calibrated data exists
    pub smile: Option<&'a SmileModel>,
    /// Smile risk metrics for the expiry under analysis
    pub smile_metrics: Option<&'a SmileRiskMetrics>,
    /// Drop smile-rejected candidates instead of halving their score
    pub hard_smile_filter: bool,
    /// External risk manager, consulted last
    pub risk_gate: Option<&'a dyn RiskGate>,
}

/// Score, filter, and order candidates, best first.
///
/// Single-leg premium-buying archetypes are rejected outright on weak
/// signals regardless of their composite score. Smile rejection is a soft
/// penalty (score halved) unless the caller requests hard exclusion. Ties
/// break toward higher probability of profit.
pub fn rank_strategies(
    candidates: Vec<StrategyInstance>,
    ctx: &RankContext<'_>,
) -> Vec<StrategyInstance> {
    let mut scored: Vec<StrategyInstance> = candidates
        .into_iter()
        .filter_map(|c| score_candidate(c, ctx))
        .collect();

    scored.sort_by(|a, b| match (a.total_score.is_nan(), b.total_score.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => b
            .total_score
            .total_cmp(&a.total_score)
            .then(b.probability_of_profit.total_cmp(&a.probability_of_profit)),
    });

    scored
}

fn score_candidate(
    mut instance: StrategyInstance,
    ctx: &RankContext<'_>,
) -> Option<StrategyInstance> {
    let archetype = instance.archetype;

    // Admission filter: premium-buying structures need a strong signal.
    if archetype.is_high_risk_premium_buy() {
        let confidence = ctx.signal.confidence;
        let strength = ctx.signal.signed_strength().abs();
        let pop = instance.probability_of_profit;
        if confidence < 0.70 || strength < 0.5 || pop < 0.5 {
            debug!(
                archetype = archetype.display_name(),
                confidence, strength, pop, "rejected by admission filter"
            );
            return None;
        }
    }

    let scores = ComponentScores {
        pop: instance.probability_of_profit.clamp(0.0, 1.0),
        direction_alignment: direction_score(&instance, ctx.signal),
        risk_reward: risk_reward_score(&instance),
        iv_compatibility: iv_score(&instance, ctx.signal.iv_environment),
        theta: theta_score(&instance),
        liquidity: liquidity_score(&instance),
    };

    let mut total = W_POP * scores.pop
        + W_DIRECTION * scores.direction_alignment
        + W_RISK_REWARD * scores.risk_reward
        + W_IV * scores.iv_compatibility
        + W_THETA * scores.theta
        + W_LIQUIDITY * scores.liquidity;

    total *= 1.0 + instance.metadata_bonus * 0.1;

    // Smile filter: soft penalty by default, hard exclusion on request.
    if let (Some(smile), Some(metrics)) = (ctx.smile, ctx.smile_metrics) {
        let verdict = smile.admits(archetype, metrics);
        if !verdict.admitted {
            if ctx.hard_smile_filter {
                debug!(
                    archetype = archetype.display_name(),
                    reason = %verdict.reason,
                    "excluded by smile filter"
                );
                return None;
            }
            total *= 0.5;
            instance
                .reasoning
                .push(format!("smile penalty: {}", verdict.reason));
        }
    }

    // External risk manager has the last word.
    if let Some(gate) = ctx.risk_gate {
        if let Err(reason) = gate.admit(&instance) {
            debug!(
                archetype = archetype.display_name(),
                %reason,
                "rejected by risk gate"
            );
            return None;
        }
    }

    instance.component_scores = scores;
    instance.total_score = total;
    Some(instance)
}

/// Direction fit: directional archetypes score with the signal, neutral
/// archetypes score against it.
fn direction_score(instance: &StrategyInstance, signal: &DirectionSignal) -> f64 {
    let bias = instance.archetype.direction_bias();
    let s = signal.signed_strength();
    if bias == 0.0 {
        1.0 - s.abs()
    } else {
        ((1.0 + bias * s) / 2.0).clamp(0.0, 1.0)
    }
}

/// Risk/reward: a step function of the profit/loss ratio for defined-risk
/// structures; a 0.5-0.6 band from the realistic-target ratio for
/// unbounded-profit structures, never the theoretical payout.
fn risk_reward_score(instance: &StrategyInstance) -> f64 {
    if instance.unbounded_profit {
        let b = (instance.probability_of_profit * 1.2).clamp(0.3, 0.6);
        return 0.5 + (b - 0.3) / 0.3 * 0.1;
    }
    if instance.max_loss <= 0.0 {
        return 0.1;
    }
    let ratio = instance.max_profit / instance.max_loss;
    if ratio >= 3.0 {
        1.0
    } else if ratio >= 2.0 {
        0.80
    } else if ratio >= 1.5 {
        0.65
    } else if ratio >= 1.0 {
        0.50
    } else if ratio >= 0.8 {
        0.40
    } else if ratio >= 0.5 {
        0.25
    } else {
        0.1
    }
}

/// IV fit: short vega wants a rich environment, long vega a cheap one.
fn iv_score(instance: &StrategyInstance, env: IvEnvironment) -> f64 {
    match (instance.archetype.vega_posture(), env) {
        (VegaPosture::Short, IvEnvironment::High | IvEnvironment::Extreme) => 1.0,
        (VegaPosture::Long, IvEnvironment::Low) => 1.0,
        (_, IvEnvironment::Normal) => 0.6,
        _ => 0.2,
    }
}

fn theta_score(instance: &StrategyInstance) -> f64 {
    match instance.archetype.theta_posture() {
        ThetaPosture::Positive => 1.0,
        ThetaPosture::Mixed => 0.5,
        ThetaPosture::Negative => 0.25,
    }
}

/// Liquidity: worst leg's open interest, normalized.
fn liquidity_score(instance: &StrategyInstance) -> f64 {
    (instance.min_leg_open_interest() as f64 / FULL_LIQUIDITY_OI).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quantnidhi_models::{MarketDirection, OptionType};

    use crate::archetype::{PayoffProfile, StrategyArchetype};
    use crate::greeks::Greeks;
    use crate::smile::{SmileConfig, SmileModel};
    use crate::strategy::{PositionSide, StrategyLeg};

    fn leg(option_type: OptionType, side: PositionSide, strike: f64) -> StrategyLeg {
        StrategyLeg {
            role: "leg".into(),
            option_type,
            side,
            strike,
            expiry: NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
            quantity: 1,
            premium: 10.0,
            greeks: Greeks {
                delta: 0.4,
                theta: -0.5,
                ..Default::default()
            },
            open_interest: 800,
        }
    }

    fn instance(archetype: StrategyArchetype, pop: f64) -> StrategyInstance {
        let legs = vec![
            leg(OptionType::Call, PositionSide::Long, 1000.0),
            leg(OptionType::Call, PositionSide::Short, 1040.0),
        ];
        let payoff = PayoffProfile {
            net_premium: 12.0,
            max_profit: Some(28.0),
            max_loss: Some(12.0),
            risk_capital: 12.0,
            breakeven_points: vec![1012.0],
        };
        let mut inst = StrategyInstance::from_legs(archetype, "NIFTY", legs, &payoff);
        inst.probability_of_profit = pop;
        inst.kelly_fraction = 0.05;
        inst
    }

    fn signal(direction: MarketDirection, confidence: f64, env: IvEnvironment) -> DirectionSignal {
        DirectionSignal {
            direction,
            confidence,
            iv_environment: env,
        }
    }

    fn ctx<'a>(signal: &'a DirectionSignal) -> RankContext<'a> {
        RankContext {
            signal,
            smile: None,
            smile_metrics: None,
            hard_smile_filter: false,
            risk_gate: None,
        }
    }

    #[test]
    fn test_admission_filter_rejects_weak_signal_premium_buys() {
        let s = signal(MarketDirection::Bullish, 0.6, IvEnvironment::Low);
        let out = rank_strategies(
            vec![
                instance(StrategyArchetype::LongCall, 0.6),
                instance(StrategyArchetype::IronCondor, 0.6),
            ],
            &ctx(&s),
        );
        // Long call dropped on confidence < 0.70; condor survives
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].archetype, StrategyArchetype::IronCondor);
    }

    #[test]
    fn test_admission_filter_rejects_low_pop() {
        let s = signal(MarketDirection::Bullish, 0.9, IvEnvironment::Low);
        let out = rank_strategies(vec![instance(StrategyArchetype::LongCall, 0.4)], &ctx(&s));
        assert!(out.is_empty());
    }

    #[test]
    fn test_direction_alignment_orders_spreads() {
        let s = signal(MarketDirection::Bullish, 0.8, IvEnvironment::Normal);
        let out = rank_strategies(
            vec![
                instance(StrategyArchetype::BearCallSpread, 0.6),
                instance(StrategyArchetype::BullCallSpread, 0.6),
            ],
            &ctx(&s),
        );
        assert_eq!(out[0].archetype, StrategyArchetype::BullCallSpread);
        assert!(out[0].component_scores.direction_alignment > 0.8);
        assert!(out[1].component_scores.direction_alignment < 0.2);
    }

    #[test]
    fn test_tie_breaks_on_pop() {
        let s = signal(MarketDirection::Neutral, 0.5, IvEnvironment::High);
        let mut a = instance(StrategyArchetype::IronCondor, 0.46);
        let mut b = instance(StrategyArchetype::IronCondor, 0.46);
        a.probability_of_profit = 0.46;
        b.probability_of_profit = 0.46;
        // Nudge b's PoP up without moving its composite inputs materially
        b.probability_of_profit = 0.460000001;
        let out = rank_strategies(vec![a, b], &ctx(&s));
        assert!(out[0].probability_of_profit >= out[1].probability_of_profit);
    }

    #[test]
    fn test_smile_soft_penalty_halves_score() {
        let smile = SmileModel::new(SmileConfig::default());
        let metrics = crate::smile::SmileRiskMetrics {
            risk_reversal: 0.0,
            butterfly: 8.0, // expensive wings reject condor-class
            smile_steepness: 0.2,
            atm_iv: 0.2,
        };
        let s = signal(MarketDirection::Neutral, 0.5, IvEnvironment::High);

        let soft = RankContext {
            signal: &s,
            smile: Some(&smile),
            smile_metrics: Some(&metrics),
            hard_smile_filter: false,
            risk_gate: None,
        };
        let no_smile = ctx(&s);

        let base = rank_strategies(vec![instance(StrategyArchetype::IronCondor, 0.6)], &no_smile);
        let penalized =
            rank_strategies(vec![instance(StrategyArchetype::IronCondor, 0.6)], &soft);
        assert!((penalized[0].total_score - base[0].total_score * 0.5).abs() < 1e-9);
        assert!(!penalized[0].reasoning.is_empty());

        let hard = RankContext {
            hard_smile_filter: true,
            ..soft
        };
        let dropped = rank_strategies(vec![instance(StrategyArchetype::IronCondor, 0.6)], &hard);
        assert!(dropped.is_empty());
    }

    #[test]
    fn test_risk_gate_is_final_filter() {
        struct DenyAll;
        impl RiskGate for DenyAll {
            fn admit(&self, _instance: &StrategyInstance) -> Result<(), String> {
                Err("portfolio delta limit".into())
            }
        }
        let s = signal(MarketDirection::Neutral, 0.5, IvEnvironment::High);
        let gated = RankContext {
            signal: &s,
            smile: None,
            smile_metrics: None,
            hard_smile_filter: false,
            risk_gate: Some(&DenyAll),
        };
        let out = rank_strategies(vec![instance(StrategyArchetype::IronCondor, 0.6)], &gated);
        assert!(out.is_empty());
    }

    #[test]
    fn test_unbounded_profit_risk_reward_band() {
        let mut inst = instance(StrategyArchetype::LongCall, 0.6);
        inst.unbounded_profit = true;
        let score = risk_reward_score(&inst);
        assert!((0.5..=0.6).contains(&score));
    }

    #[test]
    fn test_metadata_bonus_multiplier() {
        let s = signal(MarketDirection::Neutral, 0.5, IvEnvironment::High);
        let plain = rank_strategies(vec![instance(StrategyArchetype::IronCondor, 0.6)], &ctx(&s));
        let mut boosted_inst = instance(StrategyArchetype::IronCondor, 0.6);
        boosted_inst.metadata_bonus = 1.0;
        let boosted = rank_strategies(vec![boosted_inst], &ctx(&s));
        assert!(
            (boosted[0].total_score - plain[0].total_score * 1.1).abs() < 1e-9
        );
    }
}
