//! Strategy engine orchestration.
//!
//! Wires the pipeline for one analysis pass: chain snapshot + direction
//! signal + expected move -> smile calibration -> strike selection per
//! archetype -> payoff and probability -> ranking -> sizing of the
//! survivors. One archetype failing never aborts the pass; it is recorded
//! as skipped with its reason and the rest continue.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use quantnidhi_models::{ChainSnapshot, MarketContext};

use crate::archetype::StrategyArchetype;
use crate::config::EngineConfig;
use crate::probability::{kelly_fraction, probability_of_profit, size_position};
use crate::ranker::{rank_strategies, RankContext, RiskGate};
use crate::smile::SmileModel;
use crate::strategy::StrategyInstance;
use crate::strike_selector::{StrikeRequest, StrikeSelector};

/// An archetype that produced no strategy this pass, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedArchetype {
    pub archetype: StrategyArchetype,
    pub reason: String,
}

/// Output of one analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub symbol: String,
    /// Expiry analyzed, when one was tradable
    pub expiry: Option<NaiveDate>,
    /// Ranked, sized strategies above the score floor, best first
    pub strategies: Vec<StrategyInstance>,
    /// Archetypes skipped and why
    pub skipped: Vec<SkippedArchetype>,
    /// Reason the whole pass produced nothing, when that happened
    pub failure_reason: Option<String>,
}

impl AnalysisReport {
    /// Compact summary for report/UI layers.
    pub fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "symbol": self.symbol,
            "expiry": self.expiry.map(|e| e.to_string()),
            "strategies": self.strategies.iter().map(|s| serde_json::json!({
                "archetype": s.archetype.display_name(),
                "score": s.total_score,
                "pop": s.probability_of_profit,
                "kelly": s.kelly_fraction,
                "lots": s.position_size.as_ref().map(|p| p.lots),
            })).collect::<Vec<_>>(),
            "skipped": self.skipped.len(),
        })
    }
}

/// The options strategy engine for one underlying.
///
/// Owns the smile model (and with it the only shared mutable state, the
/// calibration store). Analysis itself is a pure function of the snapshot
/// and context, so independent symbols can run on independent tasks.
pub struct StrategyEngine {
    config: EngineConfig,
    smile: SmileModel,
}

impl StrategyEngine {
    pub fn new(config: EngineConfig) -> Self {
        let smile = SmileModel::new(config.smile.clone());
        Self { config, smile }
    }

    pub fn smile(&self) -> &SmileModel {
        &self.smile
    }

    /// Calibrate the smile for every expiry in the snapshot.
    pub fn calibrate_smile(&self, snapshot: &ChainSnapshot) -> usize {
        self.smile.calibrate_all(snapshot)
    }

    /// Expiry whose DTE is closest to the intended holding period.
    /// Expiries at 1 DTE or less are not tradable for new positions.
    pub fn select_expiry(&self, snapshot: &ChainSnapshot, ctx: &MarketContext) -> Option<NaiveDate> {
        let target = ctx.holding_period.target_days() as i64;
        let mut best: Option<(NaiveDate, i64)> = None;
        for expiry in snapshot.expiries() {
            let dte = snapshot.dte(expiry);
            if dte <= 1 {
                continue;
            }
            let dist = (dte - target).abs();
            match best {
                Some((_, d)) if d <= dist => {}
                _ => best = Some((expiry, dist)),
            }
        }
        best.map(|(e, _)| e)
    }

    /// Run one full analysis pass.
    pub fn analyze(
        &self,
        snapshot: &ChainSnapshot,
        ctx: &MarketContext,
        risk_gate: Option<&dyn RiskGate>,
    ) -> AnalysisReport {
        let Some(expiry) = self.select_expiry(snapshot, ctx) else {
            return AnalysisReport {
                symbol: snapshot.symbol.clone(),
                expiry: None,
                strategies: Vec::new(),
                skipped: Vec::new(),
                failure_reason: Some("no tradable expiry in snapshot".into()),
            };
        };

        // Calibration failure degrades to the default smile per key.
        if let Err(err) = self.smile.calibrate(snapshot, expiry) {
            debug!(%err, "analysis continues on default smile");
        }
        let metrics = self.smile.risk_metrics(snapshot, expiry);
        let selector = StrikeSelector::new(&self.smile, self.config.selector.clone());

        let mut candidates = Vec::new();
        let mut skipped = Vec::new();

        for archetype in StrategyArchetype::all() {
            let requests = StrikeRequest::for_archetype(archetype);
            let legs =
                match selector.select_multi_leg(archetype, &requests, snapshot, expiry, ctx) {
                    Ok(legs) => legs,
                    Err(err) => {
                        skipped.push(SkippedArchetype {
                            archetype,
                            reason: err.to_string(),
                        });
                        continue;
                    }
                };

            let payoff = archetype.analyze_payoff(&legs, snapshot.spot_price);
            if payoff.risk_capital <= 0.0 {
                skipped.push(SkippedArchetype {
                    archetype,
                    reason: "degenerate payoff: no capital at risk".into(),
                });
                continue;
            }

            let pop = probability_of_profit(archetype, &legs);
            let kelly = kelly_fraction(pop, &payoff);

            let mut instance =
                StrategyInstance::from_legs(archetype, &snapshot.symbol, legs, &payoff);
            instance.probability_of_profit = pop;
            instance.kelly_fraction = kelly;
            if instance.unbounded_profit {
                // Report the capped realistic target, never "unlimited".
                let loss = payoff.max_loss.unwrap_or(payoff.risk_capital);
                instance.max_profit = loss * (pop * 1.2).clamp(0.3, 0.6);
            }
            candidates.push(instance);
        }

        let rank_ctx = RankContext {
            signal: &ctx.signal,
            smile: Some(&self.smile),
            smile_metrics: Some(&metrics),
            hard_smile_filter: self.config.hard_smile_filter,
            risk_gate,
        };
        let mut ranked = rank_strategies(candidates, &rank_ctx);

        ranked.retain(|inst| {
            if inst.total_score >= self.config.min_strategy_score {
                true
            } else {
                skipped.push(SkippedArchetype {
                    archetype: inst.archetype,
                    reason: format!(
                        "score {:.2} below floor {:.2}",
                        inst.total_score, self.config.min_strategy_score
                    ),
                });
                false
            }
        });
        ranked.truncate(self.config.top_n);

        // Size the survivors using their final composite score.
        for instance in ranked.iter_mut() {
            let payoff = instance
                .archetype
                .analyze_payoff(&instance.legs, snapshot.spot_price);
            instance.position_size = Some(size_position(
                instance.archetype,
                &payoff,
                instance.probability_of_profit,
                instance.total_score,
                &self.config.sizing,
            ));
        }

        info!(
            symbol = %snapshot.symbol,
            %expiry,
            emitted = ranked.len(),
            skipped = skipped.len(),
            "analysis pass complete"
        );

        AnalysisReport {
            symbol: snapshot.symbol.clone(),
            expiry: Some(expiry),
            strategies: ranked,
            skipped,
            failure_reason: None,
        }
    }
}
