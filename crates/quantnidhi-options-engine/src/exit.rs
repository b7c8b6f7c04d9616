//! Exit evaluation.
//!
//! A stateless decision function: (position snapshot, exit conditions) in,
//! one recommended action out. Four independent checks run on every call
//! (profit target, stop loss, time exit, adjustment); the result is
//! resolved through a fixed action-priority table. Expiry proximity is a
//! hard override, not a weighted vote, and stop-loss-originated actions
//! always carry high urgency.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::strategy::StrategyLeg;

/// Recommended action, ordered by the fixed priority table (lower wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitAction {
    CloseImmediately,
    Close,
    ScaleOut,
    RollPosition,
    Adjust,
    TightenStops,
    Monitor,
    Hold,
}

impl ExitAction {
    /// Position in the priority table; lower values win resolution.
    pub fn priority(&self) -> u8 {
        match self {
            ExitAction::CloseImmediately => 1,
            ExitAction::Close => 2,
            ExitAction::ScaleOut => 3,
            ExitAction::RollPosition => 4,
            ExitAction::Adjust => 5,
            ExitAction::TightenStops => 6,
            ExitAction::Monitor => 7,
            ExitAction::Hold => 8,
        }
    }
}

/// Urgency attached to the recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    High,
    Medium,
    Normal,
}

/// A scaling profit level: exit a fraction of the position at a trigger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScalingLevel {
    /// P&L percent that arms this level
    pub trigger_pct: f64,
    /// Fraction of the position to exit
    pub exit_fraction: f64,
}

/// Trailing-stop configuration. Activation is recorded as a detail only;
/// the trailing logic itself runs in the caller's order layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingStop {
    /// P&L percent at which the trail arms
    pub activation_pct: f64,
    /// Trail distance in percent
    pub trail_pct: f64,
}

/// Profit-target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitTargets {
    /// Primary target as a percent of max profit basis
    pub primary_pct: f64,
    /// Optional absolute primary target in currency
    pub primary_amount: Option<f64>,
    /// Optional scaling levels below the primary target
    pub scaling_levels: Vec<ScalingLevel>,
    /// Optional trailing stop
    pub trailing: Option<TrailingStop>,
}

/// Time stop: bail out of stagnant losers after a holding period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeStop {
    /// Days in trade after which the stop arms
    pub max_days_in_trade: u32,
    /// Arms only while P&L percent is at or below this level
    pub max_pnl_pct: f64,
}

/// Stop-loss configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLosses {
    /// Primary stop as a percent (of max loss, and of position basis)
    pub primary_pct: f64,
    /// Optional absolute loss floor in currency
    pub loss_amount: Option<f64>,
    /// Optional time stop
    pub time_stop: Option<TimeStop>,
}

/// Time-exit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeExits {
    /// Close when days to expiry falls to this level
    pub dte_threshold: i64,
    /// Optional daily theta burn (fraction of premium basis) that forces
    /// the time exit early
    pub theta_decay_threshold: Option<f64>,
}

/// Adjustment band: drawdowns worth repairing rather than closing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdjustmentCriteria {
    /// Lower P&L percent bound (exclusive)
    pub lower_pnl_pct: f64,
    /// Upper P&L percent bound (exclusive)
    pub upper_pnl_pct: f64,
}

/// Exit conditions created once when a strategy is selected; read-only
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConditionSet {
    pub profit_targets: ProfitTargets,
    pub stop_losses: StopLosses,
    pub time_exits: TimeExits,
    pub adjustment: AdjustmentCriteria,
    /// Max loss basis for the percentage stop, in currency
    pub max_loss: f64,
}

impl Default for ExitConditionSet {
    fn default() -> Self {
        Self {
            profit_targets: ProfitTargets {
                primary_pct: 50.0,
                primary_amount: None,
                scaling_levels: Vec::new(),
                trailing: None,
            },
            stop_losses: StopLosses {
                primary_pct: 50.0,
                loss_amount: None,
                time_stop: None,
            },
            time_exits: TimeExits {
                dte_threshold: 3,
                theta_decay_threshold: None,
            },
            adjustment: AdjustmentCriteria {
                lower_pnl_pct: -50.0,
                upper_pnl_pct: -25.0,
            },
            max_loss: 0.0,
        }
    }
}

/// Live view of a position, rebuilt each evaluation cycle from streaming
/// prices by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub strategy_id: Uuid,
    pub symbol: String,
    pub legs: Vec<StrategyLeg>,
    /// Total P&L in currency
    pub total_pnl: f64,
    /// Total P&L percent of position basis
    pub total_pnl_pct: f64,
    /// Days the position has been open
    pub days_in_trade: u32,
    /// Days to the nearest leg expiry
    pub actual_dte: i64,
    /// Expiry used for reporting
    pub expiry: NaiveDate,
}

/// Category of an individual check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckCategory {
    ProfitTarget,
    StopLoss,
    TimeExit,
    Adjustment,
}

/// Result of one check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub category: CheckCategory,
    pub triggered: bool,
    pub action: Option<ExitAction>,
    pub detail: String,
}

/// The evaluation output. Ephemeral: recomputed each cycle, never stored
/// as authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitEvaluation {
    pub strategy_id: Uuid,
    pub checks: Vec<CheckResult>,
    pub recommended_action: ExitAction,
    pub reason: String,
    pub urgency: Urgency,
}

/// Evaluate a position against its exit conditions.
///
/// All four checks always run; the triggered action with the lowest
/// priority value wins. With nothing triggered the result is `Monitor`.
pub fn evaluate_exit(snapshot: &PositionSnapshot, conditions: &ExitConditionSet) -> ExitEvaluation {
    let checks = vec![
        profit_target_check(snapshot, conditions),
        stop_loss_check(snapshot, conditions),
        time_exit_check(snapshot, conditions),
        adjustment_check(snapshot, conditions),
    ];

    // Expiry proximity overrides every other outcome.
    let expiry_override = snapshot.actual_dte <= 1;

    if expiry_override {
        debug!(
            strategy_id = %snapshot.strategy_id,
            dte = snapshot.actual_dte,
            "expiry proximity override"
        );
        return ExitEvaluation {
            strategy_id: snapshot.strategy_id,
            checks,
            recommended_action: ExitAction::CloseImmediately,
            reason: format!("expiry proximity: {} DTE", snapshot.actual_dte),
            urgency: Urgency::High,
        };
    }

    let mut winner: Option<(&CheckResult, ExitAction)> = None;
    for check in &checks {
        if let (true, Some(action)) = (check.triggered, check.action) {
            match winner {
                Some((_, best)) if best.priority() <= action.priority() => {}
                _ => winner = Some((check, action)),
            }
        }
    }

    match winner {
        Some((check, action)) => {
            let urgency = if check.category == CheckCategory::StopLoss {
                Urgency::High
            } else {
                match action {
                    ExitAction::CloseImmediately => Urgency::High,
                    ExitAction::Close | ExitAction::ScaleOut => Urgency::Medium,
                    _ => Urgency::Normal,
                }
            };
            ExitEvaluation {
                strategy_id: snapshot.strategy_id,
                reason: check.detail.clone(),
                recommended_action: action,
                urgency,
                checks,
            }
        }
        None => ExitEvaluation {
            strategy_id: snapshot.strategy_id,
            checks,
            recommended_action: ExitAction::Monitor,
            reason: "no exit conditions met".into(),
            urgency: Urgency::Normal,
        },
    }
}

fn profit_target_check(
    snapshot: &PositionSnapshot,
    conditions: &ExitConditionSet,
) -> CheckResult {
    let targets = &conditions.profit_targets;
    let mut detail = String::new();
    let mut action = None;

    let primary_hit = snapshot.total_pnl_pct >= targets.primary_pct
        || targets
            .primary_amount
            .is_some_and(|amount| snapshot.total_pnl >= amount);
    if primary_hit {
        action = Some(ExitAction::Close);
        detail = format!(
            "profit target hit: {:.1}% >= {:.1}%",
            snapshot.total_pnl_pct, targets.primary_pct
        );
    } else if let Some(level) = targets
        .scaling_levels
        .iter()
        .find(|l| snapshot.total_pnl_pct >= l.trigger_pct)
    {
        action = Some(ExitAction::ScaleOut);
        detail = format!(
            "scaling level hit: {:.1}% >= {:.1}%, exit {:.0}%",
            snapshot.total_pnl_pct,
            level.trigger_pct,
            level.exit_fraction * 100.0
        );
    }

    // Trailing activation is informational only.
    if let Some(trail) = &targets.trailing {
        if snapshot.total_pnl_pct >= trail.activation_pct {
            if !detail.is_empty() {
                detail.push_str("; ");
            }
            detail.push_str(&format!(
                "trailing stop armed at {:.1}%",
                trail.activation_pct
            ));
        }
    }

    CheckResult {
        category: CheckCategory::ProfitTarget,
        triggered: action.is_some(),
        action,
        detail,
    }
}

fn stop_loss_check(snapshot: &PositionSnapshot, conditions: &ExitConditionSet) -> CheckResult {
    let stops = &conditions.stop_losses;

    let loss_floor = -(conditions.max_loss * stops.primary_pct / 100.0);
    let primary_hit = (conditions.max_loss > 0.0 && snapshot.total_pnl <= loss_floor)
        || snapshot.total_pnl_pct <= -stops.primary_pct;
    let absolute_hit = stops
        .loss_amount
        .is_some_and(|amount| snapshot.total_pnl <= -amount);

    if primary_hit || absolute_hit {
        return CheckResult {
            category: CheckCategory::StopLoss,
            triggered: true,
            action: Some(ExitAction::CloseImmediately),
            detail: format!(
                "stop loss breached: pnl {:.0} ({:.1}%)",
                snapshot.total_pnl, snapshot.total_pnl_pct
            ),
        };
    }

    if let Some(ts) = &stops.time_stop {
        if snapshot.days_in_trade >= ts.max_days_in_trade
            && snapshot.total_pnl_pct <= ts.max_pnl_pct
        {
            return CheckResult {
                category: CheckCategory::StopLoss,
                triggered: true,
                action: Some(ExitAction::Close),
                detail: format!(
                    "time stop: {} days in trade at {:.1}%",
                    snapshot.days_in_trade, snapshot.total_pnl_pct
                ),
            };
        }
    }

    CheckResult {
        category: CheckCategory::StopLoss,
        triggered: false,
        action: None,
        detail: String::new(),
    }
}

fn time_exit_check(snapshot: &PositionSnapshot, conditions: &ExitConditionSet) -> CheckResult {
    let time = &conditions.time_exits;

    if snapshot.actual_dte <= 1 {
        return CheckResult {
            category: CheckCategory::TimeExit,
            triggered: true,
            action: Some(ExitAction::CloseImmediately),
            detail: format!("expiry proximity: {} DTE", snapshot.actual_dte),
        };
    }

    if snapshot.actual_dte <= time.dte_threshold {
        return CheckResult {
            category: CheckCategory::TimeExit,
            triggered: true,
            action: Some(ExitAction::Close),
            detail: format!(
                "DTE {} at or below threshold {}",
                snapshot.actual_dte, time.dte_threshold
            ),
        };
    }

    if let Some(threshold) = time.theta_decay_threshold {
        let basis: f64 = snapshot
            .legs
            .iter()
            .map(|l| (l.premium * l.quantity as f64).abs())
            .sum();
        let net_theta: f64 = snapshot.legs.iter().map(|l| l.signed_theta()).sum();
        if basis > 0.0 && net_theta < 0.0 && net_theta.abs() / basis >= threshold {
            return CheckResult {
                category: CheckCategory::TimeExit,
                triggered: true,
                action: Some(ExitAction::Close),
                detail: format!(
                    "theta burn {:.3}/day exceeds threshold {:.3}",
                    net_theta.abs() / basis,
                    threshold
                ),
            };
        }
    }

    CheckResult {
        category: CheckCategory::TimeExit,
        triggered: false,
        action: None,
        detail: String::new(),
    }
}

fn adjustment_check(snapshot: &PositionSnapshot, conditions: &ExitConditionSet) -> CheckResult {
    let band = &conditions.adjustment;
    let in_band = snapshot.total_pnl_pct > band.lower_pnl_pct
        && snapshot.total_pnl_pct < band.upper_pnl_pct;

    if in_band {
        CheckResult {
            category: CheckCategory::Adjustment,
            triggered: true,
            action: Some(ExitAction::Adjust),
            detail: format!(
                "drawdown {:.1}% in adjustment band ({:.0}%, {:.0}%)",
                snapshot.total_pnl_pct, band.lower_pnl_pct, band.upper_pnl_pct
            ),
        }
    } else {
        CheckResult {
            category: CheckCategory::Adjustment,
            triggered: false,
            action: None,
            detail: String::new(),
        }
    }
}
