//! Strike selection.
//!
//! Converts strike requests into concrete strikes available in a chain
//! snapshot:
//! - Target price per request type (ATM, OTM/ITM, moneyness, delta,
//!   expected move)
//! - Constraint filtering (liquidity, moneyness band, distance)
//! - Weighted candidate scoring with deterministic tie-breaking
//! - One relaxation pass, then an emergency ladder fallback
//! - Multi-leg ordering validation with a one-shot repair
//!
//! Relaxation and repair are each bounded to a single pass, so selection
//! terminates in constant time for any input.

use chrono::NaiveDate;
use quantnidhi_models::{
    ChainSnapshot, EngineError, EngineResult, MarketContext, OptionContract, OptionType,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::archetype::StrategyArchetype;
use crate::config::SelectorConfig;
use crate::greeks::{self, Greeks, OptionParams};
use crate::smile::SmileModel;
use crate::strategy::{PositionSide, StrategyLeg};

/// Which side of the chain a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestSide {
    Call,
    Put,
    Both,
}

impl RequestSide {
    fn matches(&self, option_type: OptionType) -> bool {
        match self {
            RequestSide::Call => option_type == OptionType::Call,
            RequestSide::Put => option_type == OptionType::Put,
            RequestSide::Both => true,
        }
    }

    /// Ladder side for fallback and directional targets; `Both` behaves as
    /// the call side.
    fn primary_type(&self) -> OptionType {
        match self {
            RequestSide::Put => OptionType::Put,
            _ => OptionType::Call,
        }
    }
}

/// Strike target recipe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StrikeTarget {
    /// At the money
    Atm,
    /// Out of the money by a fraction of spot (direction by option type)
    Otm(f64),
    /// In the money by a fraction of spot (direction by option type)
    Itm(f64),
    /// spot * (1 + value)
    Moneyness(f64),
    /// Strike whose Black-Scholes delta magnitude is closest to the value
    Delta(f64),
    /// spot +/- expected_move * timeframe_multiplier * value
    ExpectedMove(f64),
}

/// How strictly the constraint is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMode {
    /// No relaxation, no fallback; fail when nothing qualifies
    Exact,
    /// Standard: relax once, then emergency fallback
    Nearest,
    /// Same recovery path as Nearest (kept distinct for callers that widen
    /// constraints up front)
    Flexible,
    /// Liquidity-weighted scoring, standard recovery path
    Liquidity,
}

/// Constraint set for one strike request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrikeConstraint {
    /// Lower moneyness bound (strike/spot)
    pub min_moneyness: f64,
    /// Upper moneyness bound
    pub max_moneyness: f64,
    /// Minimum open interest
    pub min_open_interest: u64,
    /// Maximum |strike - target| / target
    pub max_distance_fraction: f64,
    /// Selection mode
    pub mode: SelectionMode,
}

impl Default for StrikeConstraint {
    fn default() -> Self {
        Self {
            min_moneyness: 0.85,
            max_moneyness: 1.15,
            min_open_interest: 100,
            max_distance_fraction: 0.05,
            mode: SelectionMode::Nearest,
        }
    }
}

impl StrikeConstraint {
    /// The single relaxation pass: double the distance budget (capped),
    /// halve the liquidity floor, widen the moneyness band by 1.5x about
    /// parity.
    fn relaxed(&self, distance_cap: f64) -> Self {
        Self {
            min_moneyness: 1.0 - (1.0 - self.min_moneyness) * 1.5,
            max_moneyness: 1.0 + (self.max_moneyness - 1.0) * 1.5,
            min_open_interest: self.min_open_interest / 2,
            max_distance_fraction: (self.max_distance_fraction * 2.0).min(distance_cap),
            mode: self.mode,
        }
    }
}

/// One strike request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeRequest {
    /// Role name, echoed into the resolved leg
    pub name: String,
    /// Chain side
    pub side: RequestSide,
    /// Target recipe
    pub target: StrikeTarget,
    /// Constraint set
    pub constraint: StrikeConstraint,
}

impl StrikeRequest {
    /// Requests for an archetype's leg templates, with default constraints.
    pub fn for_archetype(archetype: StrategyArchetype) -> Vec<(StrikeRequest, PositionSide)> {
        archetype
            .leg_templates()
            .into_iter()
            .map(|t| {
                (
                    StrikeRequest {
                        name: t.role.to_string(),
                        side: match t.option_type {
                            OptionType::Call => RequestSide::Call,
                            OptionType::Put => RequestSide::Put,
                        },
                        target: t.target,
                        constraint: StrikeConstraint::default(),
                    },
                    t.side,
                )
            })
            .collect()
    }
}

/// A resolved strike with selection provenance.
#[derive(Debug, Clone)]
pub struct SelectedStrike {
    pub contract: OptionContract,
    pub target_price: f64,
    pub score: f64,
    /// Constraint relaxation was needed
    pub relaxed: bool,
    /// Emergency ladder fallback was needed
    pub fallback: bool,
}

/// The strike selector for one analysis pass.
pub struct StrikeSelector<'a> {
    smile: &'a SmileModel,
    config: SelectorConfig,
}

impl<'a> StrikeSelector<'a> {
    pub fn new(smile: &'a SmileModel, config: SelectorConfig) -> Self {
        Self { smile, config }
    }

    /// Target price for a request. Always within [0.5, 2.0] x spot.
    pub fn target_price(
        &self,
        request: &StrikeRequest,
        spot: f64,
        expiry: NaiveDate,
        dte: i64,
        ctx: &MarketContext,
    ) -> f64 {
        let call_side = request.side.primary_type().is_call();
        let raw = match request.target {
            StrikeTarget::Atm => spot,
            StrikeTarget::Otm(v) => {
                if call_side {
                    spot * (1.0 + v)
                } else {
                    spot * (1.0 - v)
                }
            }
            StrikeTarget::Itm(v) => {
                if call_side {
                    spot * (1.0 - v)
                } else {
                    spot * (1.0 + v)
                }
            }
            StrikeTarget::Moneyness(v) => spot * (1.0 + v),
            StrikeTarget::ExpectedMove(mult) => {
                let tf = self
                    .config
                    .timeframe_multipliers
                    .multiplier(ctx.holding_period);
                let offset = ctx.expected_move * tf * mult;
                if call_side {
                    spot + offset
                } else {
                    spot - offset
                }
            }
            StrikeTarget::Delta(d) => {
                self.strike_for_delta(d, spot, expiry, dte, request.side.primary_type())
            }
        };
        raw.clamp(0.5 * spot, 2.0 * spot)
    }

    /// Invert Black-Scholes delta to a strike, using the smile's ATM IV.
    fn strike_for_delta(
        &self,
        target_delta: f64,
        spot: f64,
        expiry: NaiveDate,
        dte: i64,
        option_type: OptionType,
    ) -> f64 {
        let t = (dte.max(1) as f64) / 365.0;
        let iv = self.smile.iv_at(spot, spot, expiry, option_type).max(0.01);
        let d1 = match option_type {
            OptionType::Call => greeks::norm_inverse_cdf(target_delta.abs()),
            OptionType::Put => greeks::norm_inverse_cdf(1.0 - target_delta.abs()),
        };
        let r = self.config.risk_free_rate;
        spot * ((r + 0.5 * iv * iv) * t - d1 * iv * t.sqrt()).exp()
    }

    /// Contracts passing the constraint filter, sorted by strike.
    fn candidates<'s>(
        &self,
        request: &StrikeRequest,
        constraint: &StrikeConstraint,
        target: f64,
        snapshot: &'s ChainSnapshot,
        expiry: NaiveDate,
    ) -> Vec<&'s OptionContract> {
        let spot = snapshot.spot_price;
        let mut out: Vec<&OptionContract> = snapshot
            .contracts
            .iter()
            .filter(|c| c.expiry == expiry && request.side.matches(c.option_type))
            .filter(|c| c.open_interest >= constraint.min_open_interest)
            .filter(|c| {
                let m = c.moneyness(spot);
                m >= constraint.min_moneyness && m <= constraint.max_moneyness
            })
            .filter(|c| (c.strike - target).abs() / target <= constraint.max_distance_fraction)
            .collect();
        // Sorted by strike so equal scores resolve to the lowest strike.
        out.sort_by(|a, b| a.strike.total_cmp(&b.strike));
        out
    }

    /// Weighted score over the candidate set; returns the argmax.
    fn best_candidate<'s>(
        &self,
        candidates: &[&'s OptionContract],
        target: f64,
        mode: SelectionMode,
    ) -> Option<(&'s OptionContract, f64)> {
        if candidates.is_empty() {
            return None;
        }

        let (w_dist, w_liq, w_spread, w_vol) = match mode {
            SelectionMode::Liquidity => (0.20, 0.50, 0.20, 0.10),
            _ => (0.40, 0.30, 0.20, 0.10),
        };

        let max_dist = candidates
            .iter()
            .map(|c| (c.strike - target).abs())
            .fold(0.0f64, f64::max);
        let max_oi = candidates.iter().map(|c| c.open_interest).max().unwrap_or(0);
        let max_spread = candidates
            .iter()
            .map(|c| c.relative_spread())
            .fold(0.0f64, f64::max);
        let max_vol = candidates.iter().map(|c| c.volume).max().unwrap_or(0);

        let mut best: Option<(&OptionContract, f64)> = None;
        for c in candidates {
            let distance_score = if max_dist > 0.0 {
                1.0 - (c.strike - target).abs() / max_dist
            } else {
                1.0
            };
            let liquidity_score = if max_oi > 0 {
                c.open_interest as f64 / max_oi as f64
            } else {
                0.0
            };
            let spread_score = if max_spread > 0.0 {
                1.0 - c.relative_spread() / max_spread
            } else {
                1.0
            };
            let volume_score = if max_vol > 0 {
                c.volume as f64 / max_vol as f64
            } else {
                0.0
            };

            let score = w_dist * distance_score
                + w_liq * liquidity_score
                + w_spread * spread_score
                + w_vol * volume_score;

            match best {
                Some((_, s)) if score <= s => {}
                _ => best = Some((c, score)),
            }
        }
        best
    }

    /// Emergency fallback: fixed rung offsets from the ATM strike on the
    /// available ladder. Deterministic and always terminates.
    fn emergency_fallback<'s>(
        &self,
        request: &StrikeRequest,
        target: f64,
        snapshot: &'s ChainSnapshot,
        expiry: NaiveDate,
    ) -> Option<&'s OptionContract> {
        let option_type = request.side.primary_type();
        let ladder = snapshot.strike_ladder(option_type, expiry);
        if ladder.is_empty() {
            return None;
        }
        let spot = snapshot.spot_price;
        let atm_idx = ladder
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - spot).abs().total_cmp(&(*b - spot).abs()))
            .map(|(i, _)| i)?;

        let rungs = |n: i64, away_from_money: bool| -> usize {
            // Calls move up-ladder for OTM, puts down-ladder; ITM reverses.
            let dir = match (option_type, away_from_money) {
                (OptionType::Call, true) | (OptionType::Put, false) => 1,
                _ => -1,
            };
            (atm_idx as i64 + dir * n).clamp(0, ladder.len() as i64 - 1) as usize
        };

        let idx = match request.target {
            StrikeTarget::Atm => atm_idx,
            StrikeTarget::Otm(_) | StrikeTarget::ExpectedMove(_) => {
                rungs(self.config.fallback_otm_rungs as i64, true)
            }
            StrikeTarget::Itm(_) => rungs(self.config.fallback_itm_rungs as i64, false),
            StrikeTarget::Moneyness(_) | StrikeTarget::Delta(_) => ladder
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
                .map(|(i, _)| i)?,
        };

        snapshot.find_contract(ladder[idx], option_type, expiry)
    }

    /// Resolve one request to a concrete strike.
    ///
    /// Path: filter + score; on an empty candidate set, one relaxation
    /// pass; then the emergency fallback. `Exact` mode skips both recovery
    /// steps.
    pub fn resolve(
        &self,
        request: &StrikeRequest,
        snapshot: &ChainSnapshot,
        expiry: NaiveDate,
        ctx: &MarketContext,
    ) -> EngineResult<SelectedStrike> {
        let spot = snapshot.spot_price;
        let dte = snapshot.dte(expiry);
        let target = self.target_price(request, spot, expiry, dte, ctx);

        let cands = self.candidates(request, &request.constraint, target, snapshot, expiry);
        if let Some((c, score)) = self.best_candidate(&cands, target, request.constraint.mode) {
            return Ok(SelectedStrike {
                contract: c.clone(),
                target_price: target,
                score,
                relaxed: false,
                fallback: false,
            });
        }

        if request.constraint.mode == SelectionMode::Exact {
            return Err(EngineError::InsufficientLiquidity {
                request: request.name.clone(),
                detail: format!("no strike within exact constraints of target {:.2}", target),
            });
        }

        let relaxed = request.constraint.relaxed(self.config.max_relaxed_distance);
        let cands = self.candidates(request, &relaxed, target, snapshot, expiry);
        if let Some((c, score)) = self.best_candidate(&cands, target, relaxed.mode) {
            debug!(
                request = %request.name,
                strike = c.strike,
                "strike resolved after constraint relaxation"
            );
            return Ok(SelectedStrike {
                contract: c.clone(),
                target_price: target,
                score,
                relaxed: true,
                fallback: false,
            });
        }

        match self.emergency_fallback(request, target, snapshot, expiry) {
            Some(c) => {
                warn!(
                    request = %request.name,
                    strike = c.strike,
                    "emergency ladder fallback used"
                );
                Ok(SelectedStrike {
                    contract: c.clone(),
                    target_price: target,
                    score: 0.0,
                    relaxed: true,
                    fallback: true,
                })
            }
            None => Err(EngineError::InsufficientLiquidity {
                request: request.name.clone(),
                detail: "no liquid strikes after relaxation".into(),
            }),
        }
    }

    /// Resolve every request for an archetype, then validate and (once)
    /// repair the strike ordering invariant.
    ///
    /// Two-leg archetypes get a single leg-swap repair; larger structures
    /// are rebuilt once via the emergency fallback. A violation after that
    /// is surfaced as `InvalidLegConfiguration` and the archetype is
    /// skipped for this symbol.
    pub fn select_multi_leg(
        &self,
        archetype: StrategyArchetype,
        requests: &[(StrikeRequest, PositionSide)],
        snapshot: &ChainSnapshot,
        expiry: NaiveDate,
        ctx: &MarketContext,
    ) -> EngineResult<Vec<StrategyLeg>> {
        let mut legs = Vec::with_capacity(requests.len());
        for (request, side) in requests {
            let selected = self.resolve(request, snapshot, expiry, ctx)?;
            legs.push(self.make_leg(request, *side, &selected.contract, snapshot));
        }

        if let Err(violation) = archetype.validate_legs(&legs) {
            debug!(
                archetype = archetype.display_name(),
                %violation,
                "leg ordering violated, attempting repair"
            );

            let same_type_pair =
                legs.len() == 2 && legs[0].option_type == legs[1].option_type;
            if same_type_pair {
                legs.swap(0, 1);
                // Roles and sides travel with the template slot, not the
                // strike.
                let roles: Vec<String> = requests.iter().map(|(r, _)| r.name.clone()).collect();
                let sides: Vec<PositionSide> = requests.iter().map(|(_, s)| *s).collect();
                for (i, leg) in legs.iter_mut().enumerate() {
                    leg.role = roles[i].clone();
                    leg.side = sides[i];
                }
            } else {
                let mut rebuilt = Vec::with_capacity(requests.len());
                for (request, side) in requests {
                    let spot = snapshot.spot_price;
                    let dte = snapshot.dte(expiry);
                    let target = self.target_price(request, spot, expiry, dte, ctx);
                    let contract = self
                        .emergency_fallback(request, target, snapshot, expiry)
                        .ok_or_else(|| EngineError::InsufficientLiquidity {
                            request: request.name.clone(),
                            detail: "empty ladder during repair".into(),
                        })?;
                    rebuilt.push(self.make_leg(request, *side, contract, snapshot));
                }
                legs = rebuilt;
            }

            if let Err(violation) = archetype.validate_legs(&legs) {
                return Err(EngineError::InvalidLegConfiguration {
                    archetype: archetype.display_name().into(),
                    detail: violation,
                });
            }
        }

        Ok(legs)
    }

    /// Build a leg from a selected contract, approximating greeks from the
    /// smile model when the feed supplied none.
    fn make_leg(
        &self,
        request: &StrikeRequest,
        side: PositionSide,
        contract: &OptionContract,
        snapshot: &ChainSnapshot,
    ) -> StrategyLeg {
        let spot = snapshot.spot_price;
        let dte = snapshot.dte(contract.expiry).max(1);
        let have_feed_greeks = contract.delta.is_some()
            && contract.gamma.is_some()
            && contract.theta.is_some()
            && contract.vega.is_some();

        let greeks = if have_feed_greeks {
            Greeks {
                delta: contract.delta.unwrap_or(0.0),
                gamma: contract.gamma.unwrap_or(0.0),
                theta: contract.theta.unwrap_or(0.0),
                vega: contract.vega.unwrap_or(0.0),
                price: contract.mid_price(),
                intrinsic: 0.0,
            }
        } else {
            let iv = contract.implied_volatility.unwrap_or_else(|| {
                self.smile
                    .iv_at(contract.strike, spot, contract.expiry, contract.option_type)
            });
            debug!(
                strike = contract.strike,
                "feed greeks missing, using model approximation"
            );
            let params = OptionParams::new(
                spot,
                contract.strike,
                dte as f64 / 365.0,
                self.config.risk_free_rate,
                iv,
                contract.option_type,
            );
            let mut g = Greeks::calculate(&params);
            // Overlay whatever the feed did supply.
            if let Some(d) = contract.delta {
                g.delta = d;
            }
            g
        };

        StrategyLeg {
            role: request.name.clone(),
            option_type: contract.option_type,
            side,
            strike: contract.strike,
            expiry: contract.expiry,
            quantity: 1,
            premium: contract.mid_price(),
            greeks,
            open_interest: contract.open_interest,
        }
    }
}
