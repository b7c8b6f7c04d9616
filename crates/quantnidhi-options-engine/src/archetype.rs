//! Strategy archetypes.
//!
//! A closed enum of the multi-leg structures this engine constructs. Each
//! archetype carries its leg templates, strike-ordering invariant, payoff
//! analytics, and smile/direction postures as associated data, so archetype
//! dispatch is exhaustiveness-checked at compile time instead of matched on
//! strings.

use serde::{Deserialize, Serialize};

use quantnidhi_models::OptionType;

use crate::strategy::{PositionSide, StrategyLeg};
use crate::strike_selector::StrikeTarget;

/// The strategy archetypes known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyArchetype {
    LongCall,
    LongPut,
    BullCallSpread,
    BearPutSpread,
    BullPutSpread,
    BearCallSpread,
    IronCondor,
    IronButterfly,
    LongStraddle,
    ShortStraddle,
    LongStrangle,
    ShortStrangle,
}

/// Vega posture of an archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VegaPosture {
    Long,
    Short,
}

/// Theta posture of an archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThetaPosture {
    Positive,
    Negative,
    Mixed,
}

/// Smile-admissibility class of an archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmileClass {
    /// Condor-like: short premium, defined risk, needs cheap wings
    NeutralDefinedRisk,
    /// Straddle-like: long premium, needs a smile with mispricing to buy
    LongVolatility,
    /// Directional credit vertical: needs skew that does not oppose it
    CreditSpread,
    Other,
}

/// One leg of an archetype template: the role name, the contract side, and
/// the recipe for where its strike should land.
#[derive(Debug, Clone)]
pub struct LegTemplate {
    pub role: &'static str,
    pub option_type: OptionType,
    pub side: PositionSide,
    pub target: StrikeTarget,
}

/// Payoff analytics for a resolved set of legs, per contract unit.
///
/// `None` for max profit or loss means the payoff is unbounded on that
/// side; `risk_capital` then carries the margin-style proxy used for
/// sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoffProfile {
    /// Net premium: positive = debit paid, negative = credit received
    pub net_premium: f64,
    /// Maximum profit, None when unbounded
    pub max_profit: Option<f64>,
    /// Maximum loss, None when unbounded
    pub max_loss: Option<f64>,
    /// Capital at risk: max loss when defined, margin proxy otherwise
    pub risk_capital: f64,
    /// Expiry breakeven points
    pub breakeven_points: Vec<f64>,
}

/// Margin proxy for unbounded-loss structures: credit received plus a
/// fraction of notional, the exchange-margin convention.
const SHORT_PREMIUM_MARGIN_FRACTION: f64 = 0.15;

impl StrategyArchetype {
    /// Every archetype, in scoring order.
    pub fn all() -> [StrategyArchetype; 12] {
        [
            StrategyArchetype::LongCall,
            StrategyArchetype::LongPut,
            StrategyArchetype::BullCallSpread,
            StrategyArchetype::BearPutSpread,
            StrategyArchetype::BullPutSpread,
            StrategyArchetype::BearCallSpread,
            StrategyArchetype::IronCondor,
            StrategyArchetype::IronButterfly,
            StrategyArchetype::LongStraddle,
            StrategyArchetype::ShortStraddle,
            StrategyArchetype::LongStrangle,
            StrategyArchetype::ShortStrangle,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StrategyArchetype::LongCall => "Long Call",
            StrategyArchetype::LongPut => "Long Put",
            StrategyArchetype::BullCallSpread => "Bull Call Spread",
            StrategyArchetype::BearPutSpread => "Bear Put Spread",
            StrategyArchetype::BullPutSpread => "Bull Put Spread",
            StrategyArchetype::BearCallSpread => "Bear Call Spread",
            StrategyArchetype::IronCondor => "Iron Condor",
            StrategyArchetype::IronButterfly => "Iron Butterfly",
            StrategyArchetype::LongStraddle => "Long Straddle",
            StrategyArchetype::ShortStraddle => "Short Straddle",
            StrategyArchetype::LongStrangle => "Long Strangle",
            StrategyArchetype::ShortStrangle => "Short Strangle",
        }
    }

    /// Directional bias: +1 bullish, -1 bearish, 0 neutral.
    pub fn direction_bias(&self) -> f64 {
        match self {
            StrategyArchetype::LongCall
            | StrategyArchetype::BullCallSpread
            | StrategyArchetype::BullPutSpread => 1.0,
            StrategyArchetype::LongPut
            | StrategyArchetype::BearPutSpread
            | StrategyArchetype::BearCallSpread => -1.0,
            _ => 0.0,
        }
    }

    pub fn vega_posture(&self) -> VegaPosture {
        match self {
            StrategyArchetype::LongCall
            | StrategyArchetype::LongPut
            | StrategyArchetype::BullCallSpread
            | StrategyArchetype::BearPutSpread
            | StrategyArchetype::LongStraddle
            | StrategyArchetype::LongStrangle => VegaPosture::Long,
            _ => VegaPosture::Short,
        }
    }

    pub fn theta_posture(&self) -> ThetaPosture {
        match self {
            StrategyArchetype::LongCall
            | StrategyArchetype::LongPut
            | StrategyArchetype::LongStraddle
            | StrategyArchetype::LongStrangle => ThetaPosture::Negative,
            StrategyArchetype::BullCallSpread | StrategyArchetype::BearPutSpread => {
                ThetaPosture::Mixed
            }
            _ => ThetaPosture::Positive,
        }
    }

    /// Premium-buying archetypes rejected outright by the ranker when the
    /// directional signal is weak.
    pub fn is_high_risk_premium_buy(&self) -> bool {
        matches!(
            self,
            StrategyArchetype::LongCall
                | StrategyArchetype::LongPut
                | StrategyArchetype::LongStraddle
                | StrategyArchetype::LongStrangle
        )
    }

    /// Whether both profit and loss are bounded at expiry.
    pub fn is_defined_risk(&self) -> bool {
        matches!(
            self,
            StrategyArchetype::BullCallSpread
                | StrategyArchetype::BearPutSpread
                | StrategyArchetype::BullPutSpread
                | StrategyArchetype::BearCallSpread
                | StrategyArchetype::IronCondor
                | StrategyArchetype::IronButterfly
        )
    }

    pub fn smile_class(&self) -> SmileClass {
        match self {
            StrategyArchetype::IronCondor | StrategyArchetype::IronButterfly => {
                SmileClass::NeutralDefinedRisk
            }
            StrategyArchetype::LongStraddle | StrategyArchetype::LongStrangle => {
                SmileClass::LongVolatility
            }
            StrategyArchetype::BullPutSpread | StrategyArchetype::BearCallSpread => {
                SmileClass::CreditSpread
            }
            _ => SmileClass::Other,
        }
    }

    /// Default lot limits (min, max) per archetype.
    pub fn default_lot_limits(&self) -> (u32, u32) {
        match self {
            StrategyArchetype::IronCondor | StrategyArchetype::IronButterfly => (2, 10),
            StrategyArchetype::LongCall | StrategyArchetype::LongPut => (1, 10),
            StrategyArchetype::BullCallSpread
            | StrategyArchetype::BearPutSpread
            | StrategyArchetype::BullPutSpread
            | StrategyArchetype::BearCallSpread => (1, 15),
            StrategyArchetype::LongStraddle
            | StrategyArchetype::ShortStraddle
            | StrategyArchetype::LongStrangle
            | StrategyArchetype::ShortStrangle => (1, 5),
        }
    }

    /// Ordered leg templates for this archetype. Leg construction and the
    /// ordering invariant both follow this order.
    pub fn leg_templates(&self) -> Vec<LegTemplate> {
        use OptionType::{Call, Put};
        use PositionSide::{Long, Short};

        let leg = |role, option_type, side, target| LegTemplate {
            role,
            option_type,
            side,
            target,
        };

        match self {
            StrategyArchetype::LongCall => vec![leg("long_call", Call, Long, StrikeTarget::Atm)],
            StrategyArchetype::LongPut => vec![leg("long_put", Put, Long, StrikeTarget::Atm)],
            StrategyArchetype::BullCallSpread => vec![
                leg("long_call", Call, Long, StrikeTarget::Atm),
                leg("short_call", Call, Short, StrikeTarget::ExpectedMove(1.0)),
            ],
            StrategyArchetype::BearPutSpread => vec![
                leg("long_put", Put, Long, StrikeTarget::Atm),
                leg("short_put", Put, Short, StrikeTarget::ExpectedMove(1.0)),
            ],
            StrategyArchetype::BullPutSpread => vec![
                leg("long_put", Put, Long, StrikeTarget::Otm(0.06)),
                leg("short_put", Put, Short, StrikeTarget::Otm(0.03)),
            ],
            StrategyArchetype::BearCallSpread => vec![
                leg("short_call", Call, Short, StrikeTarget::Otm(0.03)),
                leg("long_call", Call, Long, StrikeTarget::Otm(0.06)),
            ],
            StrategyArchetype::IronCondor => vec![
                leg("put_long", Put, Long, StrikeTarget::Otm(0.06)),
                leg("put_short", Put, Short, StrikeTarget::Otm(0.03)),
                leg("call_short", Call, Short, StrikeTarget::Otm(0.03)),
                leg("call_long", Call, Long, StrikeTarget::Otm(0.06)),
            ],
            StrategyArchetype::IronButterfly => vec![
                leg("put_long", Put, Long, StrikeTarget::Otm(0.04)),
                leg("put_short", Put, Short, StrikeTarget::Atm),
                leg("call_short", Call, Short, StrikeTarget::Atm),
                leg("call_long", Call, Long, StrikeTarget::Otm(0.04)),
            ],
            StrategyArchetype::LongStraddle => vec![
                leg("long_call", Call, Long, StrikeTarget::Atm),
                leg("long_put", Put, Long, StrikeTarget::Atm),
            ],
            StrategyArchetype::ShortStraddle => vec![
                leg("short_call", Call, Short, StrikeTarget::Atm),
                leg("short_put", Put, Short, StrikeTarget::Atm),
            ],
            StrategyArchetype::LongStrangle => vec![
                leg("long_put", Put, Long, StrikeTarget::Otm(0.03)),
                leg("long_call", Call, Long, StrikeTarget::Otm(0.03)),
            ],
            StrategyArchetype::ShortStrangle => vec![
                leg("short_put", Put, Short, StrikeTarget::Otm(0.03)),
                leg("short_call", Call, Short, StrikeTarget::Otm(0.03)),
            ],
        }
    }

    /// Validate the archetype's strike-ordering invariant over legs in
    /// template order. Returns the violated relation on failure.
    pub fn validate_legs(&self, legs: &[StrategyLeg]) -> Result<(), String> {
        let expected = self.leg_templates().len();
        if legs.len() != expected {
            return Err(format!(
                "expected {} legs, have {}",
                expected,
                legs.len()
            ));
        }
        let k = |i: usize| legs[i].strike;

        match self {
            StrategyArchetype::LongCall | StrategyArchetype::LongPut => Ok(()),
            StrategyArchetype::BullCallSpread => {
                if k(0) < k(1) {
                    Ok(())
                } else {
                    Err(format!("long_call {} !< short_call {}", k(0), k(1)))
                }
            }
            StrategyArchetype::BearPutSpread => {
                if k(0) > k(1) {
                    Ok(())
                } else {
                    Err(format!("long_put {} !> short_put {}", k(0), k(1)))
                }
            }
            StrategyArchetype::BullPutSpread => {
                if k(0) < k(1) {
                    Ok(())
                } else {
                    Err(format!("put_long {} !< put_short {}", k(0), k(1)))
                }
            }
            StrategyArchetype::BearCallSpread => {
                if k(0) < k(1) {
                    Ok(())
                } else {
                    Err(format!("call_short {} !< call_long {}", k(0), k(1)))
                }
            }
            StrategyArchetype::IronCondor => {
                if k(0) < k(1) && k(1) < k(2) && k(2) < k(3) {
                    Ok(())
                } else {
                    Err(format!(
                        "require put_long < put_short < call_short < call_long, have {} {} {} {}",
                        k(0),
                        k(1),
                        k(2),
                        k(3)
                    ))
                }
            }
            StrategyArchetype::IronButterfly => {
                if k(0) < k(1) && k(1) <= k(2) && k(2) < k(3) {
                    Ok(())
                } else {
                    Err(format!(
                        "require put_long < body <= body < call_long, have {} {} {} {}",
                        k(0),
                        k(1),
                        k(2),
                        k(3)
                    ))
                }
            }
            StrategyArchetype::LongStraddle | StrategyArchetype::ShortStraddle => {
                if (k(0) - k(1)).abs() < 1e-9 {
                    Ok(())
                } else {
                    Err(format!("straddle strikes differ: {} vs {}", k(0), k(1)))
                }
            }
            StrategyArchetype::LongStrangle | StrategyArchetype::ShortStrangle => {
                if k(0) < k(1) {
                    Ok(())
                } else {
                    Err(format!("strangle put {} !< call {}", k(0), k(1)))
                }
            }
        }
    }

    /// Payoff analytics for resolved legs, per contract unit. Legs must be
    /// in template order and already validated.
    pub fn analyze_payoff(&self, legs: &[StrategyLeg], spot: f64) -> PayoffProfile {
        let net_premium: f64 = legs.iter().map(|l| l.side.sign() * l.premium).sum();
        let debit = net_premium.max(0.0);
        let credit = (-net_premium).max(0.0);
        let k = |i: usize| legs[i].strike;

        match self {
            StrategyArchetype::LongCall => PayoffProfile {
                net_premium,
                max_profit: None,
                max_loss: Some(debit),
                risk_capital: debit,
                breakeven_points: vec![k(0) + debit],
            },
            StrategyArchetype::LongPut => PayoffProfile {
                net_premium,
                max_profit: None,
                max_loss: Some(debit),
                risk_capital: debit,
                breakeven_points: vec![k(0) - debit],
            },
            StrategyArchetype::BullCallSpread => {
                let width = k(1) - k(0);
                PayoffProfile {
                    net_premium,
                    max_profit: Some((width - debit).max(0.0)),
                    max_loss: Some(debit),
                    risk_capital: debit,
                    breakeven_points: vec![k(0) + debit],
                }
            }
            StrategyArchetype::BearPutSpread => {
                let width = k(0) - k(1);
                PayoffProfile {
                    net_premium,
                    max_profit: Some((width - debit).max(0.0)),
                    max_loss: Some(debit),
                    risk_capital: debit,
                    breakeven_points: vec![k(0) - debit],
                }
            }
            StrategyArchetype::BullPutSpread => {
                let width = k(1) - k(0);
                let max_loss = (width - credit).max(0.0);
                PayoffProfile {
                    net_premium,
                    max_profit: Some(credit),
                    max_loss: Some(max_loss),
                    risk_capital: max_loss,
                    breakeven_points: vec![k(1) - credit],
                }
            }
            StrategyArchetype::BearCallSpread => {
                let width = k(1) - k(0);
                let max_loss = (width - credit).max(0.0);
                PayoffProfile {
                    net_premium,
                    max_profit: Some(credit),
                    max_loss: Some(max_loss),
                    risk_capital: max_loss,
                    breakeven_points: vec![k(0) + credit],
                }
            }
            StrategyArchetype::IronCondor | StrategyArchetype::IronButterfly => {
                let put_width = k(1) - k(0);
                let call_width = k(3) - k(2);
                let max_loss = (put_width.max(call_width) - credit).max(0.0);
                PayoffProfile {
                    net_premium,
                    max_profit: Some(credit),
                    max_loss: Some(max_loss),
                    risk_capital: max_loss,
                    breakeven_points: vec![k(1) - credit, k(2) + credit],
                }
            }
            StrategyArchetype::LongStraddle => PayoffProfile {
                net_premium,
                max_profit: None,
                max_loss: Some(debit),
                risk_capital: debit,
                breakeven_points: vec![k(0) - debit, k(0) + debit],
            },
            StrategyArchetype::ShortStraddle => PayoffProfile {
                net_premium,
                max_profit: Some(credit),
                max_loss: None,
                risk_capital: credit + SHORT_PREMIUM_MARGIN_FRACTION * spot,
                breakeven_points: vec![k(0) - credit, k(0) + credit],
            },
            StrategyArchetype::LongStrangle => PayoffProfile {
                net_premium,
                max_profit: None,
                max_loss: Some(debit),
                risk_capital: debit,
                breakeven_points: vec![k(0) - debit, k(1) + debit],
            },
            StrategyArchetype::ShortStrangle => PayoffProfile {
                net_premium,
                max_profit: Some(credit),
                max_loss: None,
                risk_capital: credit + SHORT_PREMIUM_MARGIN_FRACTION * spot,
                breakeven_points: vec![k(0) - credit, k(1) + credit],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greeks::Greeks;
    use chrono::NaiveDate;

    fn leg(role: &str, option_type: OptionType, side: PositionSide, strike: f64, premium: f64) -> StrategyLeg {
        StrategyLeg {
            role: role.into(),
            option_type,
            side,
            strike,
            expiry: NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
            quantity: 1,
            premium,
            greeks: Greeks::default(),
            open_interest: 500,
        }
    }

    #[test]
    fn test_bull_call_ordering() {
        let good = vec![
            leg("long_call", OptionType::Call, PositionSide::Long, 1000.0, 20.0),
            leg("short_call", OptionType::Call, PositionSide::Short, 1040.0, 8.0),
        ];
        assert!(StrategyArchetype::BullCallSpread.validate_legs(&good).is_ok());

        let bad = vec![good[1].clone(), good[0].clone()];
        assert!(StrategyArchetype::BullCallSpread.validate_legs(&bad).is_err());
    }

    #[test]
    fn test_iron_condor_ordering() {
        let legs = vec![
            leg("put_long", OptionType::Put, PositionSide::Long, 940.0, 3.0),
            leg("put_short", OptionType::Put, PositionSide::Short, 970.0, 7.0),
            leg("call_short", OptionType::Call, PositionSide::Short, 1030.0, 7.0),
            leg("call_long", OptionType::Call, PositionSide::Long, 1060.0, 3.0),
        ];
        assert!(StrategyArchetype::IronCondor.validate_legs(&legs).is_ok());

        let mut crossed = legs.clone();
        crossed[1].strike = 1035.0;
        assert!(StrategyArchetype::IronCondor.validate_legs(&crossed).is_err());
    }

    #[test]
    fn test_ordering_over_random_ladders() {
        // Walk a family of valid ladders; every template-ordered construction
        // must satisfy its own invariant.
        for base in [500.0_f64, 1000.0, 20000.0] {
            for step in [5.0, 10.0, 25.0] {
                let legs = vec![
                    leg("put_long", OptionType::Put, PositionSide::Long, base - 2.0 * step, 2.0),
                    leg("put_short", OptionType::Put, PositionSide::Short, base - step, 5.0),
                    leg("call_short", OptionType::Call, PositionSide::Short, base + step, 5.0),
                    leg("call_long", OptionType::Call, PositionSide::Long, base + 2.0 * step, 2.0),
                ];
                assert!(StrategyArchetype::IronCondor.validate_legs(&legs).is_ok());
            }
        }
    }

    #[test]
    fn test_bull_call_payoff() {
        let legs = vec![
            leg("long_call", OptionType::Call, PositionSide::Long, 1000.0, 20.0),
            leg("short_call", OptionType::Call, PositionSide::Short, 1040.0, 8.0),
        ];
        let p = StrategyArchetype::BullCallSpread.analyze_payoff(&legs, 1000.0);
        assert!((p.net_premium - 12.0).abs() < 1e-9);
        assert_eq!(p.max_loss, Some(12.0));
        assert_eq!(p.max_profit, Some(28.0));
        assert_eq!(p.breakeven_points, vec![1012.0]);
    }

    #[test]
    fn test_iron_condor_payoff() {
        let legs = vec![
            leg("put_long", OptionType::Put, PositionSide::Long, 940.0, 3.0),
            leg("put_short", OptionType::Put, PositionSide::Short, 970.0, 7.0),
            leg("call_short", OptionType::Call, PositionSide::Short, 1030.0, 7.0),
            leg("call_long", OptionType::Call, PositionSide::Long, 1060.0, 3.0),
        ];
        let p = StrategyArchetype::IronCondor.analyze_payoff(&legs, 1000.0);
        // Credit 8, widths 30: max loss 22
        assert!((p.net_premium + 8.0).abs() < 1e-9);
        assert_eq!(p.max_profit, Some(8.0));
        assert_eq!(p.max_loss, Some(22.0));
        assert_eq!(p.breakeven_points, vec![962.0, 1038.0]);
    }

    #[test]
    fn test_short_straddle_risk_capital() {
        let legs = vec![
            leg("short_call", OptionType::Call, PositionSide::Short, 1000.0, 18.0),
            leg("short_put", OptionType::Put, PositionSide::Short, 1000.0, 16.0),
        ];
        let p = StrategyArchetype::ShortStraddle.analyze_payoff(&legs, 1000.0);
        assert_eq!(p.max_loss, None);
        assert!((p.risk_capital - (34.0 + 150.0)).abs() < 1e-9);
        assert_eq!(p.breakeven_points, vec![966.0, 1034.0]);
    }

    #[test]
    fn test_long_option_unbounded_profit() {
        let legs = vec![leg("long_call", OptionType::Call, PositionSide::Long, 1000.0, 20.0)];
        let p = StrategyArchetype::LongCall.analyze_payoff(&legs, 1000.0);
        assert_eq!(p.max_profit, None);
        assert_eq!(p.max_loss, Some(20.0));
    }
}
