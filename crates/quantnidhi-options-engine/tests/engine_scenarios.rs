//! End-to-end scenarios over a synthetic chain.
//!
//! Exercises the documented behaviors of the full pipeline: strike
//! targeting, probability and Kelly arithmetic, exit resolution, and the
//! determinism and clamping properties every component guarantees.

use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use quantnidhi_models::{
    ChainSnapshot, DirectionSignal, HoldingPeriod, IvEnvironment, MarketContext, MarketDirection,
    OptionContract, OptionType,
};
use quantnidhi_options_engine::archetype::{PayoffProfile, StrategyArchetype};
use quantnidhi_options_engine::config::EngineConfig;
use quantnidhi_options_engine::exit::{
    evaluate_exit, ExitAction, ExitConditionSet, PositionSnapshot, Urgency,
};
use quantnidhi_options_engine::probability::{kelly_fraction, probability_of_profit};
use quantnidhi_options_engine::smile::{SmileConfig, SmileModel};
use quantnidhi_options_engine::strategy::{PositionSide, StrategyLeg};
use quantnidhi_options_engine::strike_selector::{StrikeRequest, StrikeSelector};
use quantnidhi_options_engine::StrategyEngine;
use quantnidhi_options_engine::greeks::Greeks;

fn expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 25).unwrap()
}

fn contract(strike: f64, option_type: OptionType) -> OptionContract {
    OptionContract {
        strike,
        option_type,
        expiry: expiry(),
        bid: 9.5,
        ask: 10.5,
        last_price: 10.0,
        open_interest: 800,
        volume: 250,
        delta: Some(match option_type {
            OptionType::Call => 0.5,
            OptionType::Put => -0.5,
        }),
        gamma: Some(0.01),
        theta: Some(-1.0),
        vega: Some(3.0),
        implied_volatility: Some(0.22),
    }
}

fn ladder_snapshot(strikes: &[f64]) -> ChainSnapshot {
    let mut contracts = Vec::new();
    for &k in strikes {
        contracts.push(contract(k, OptionType::Call));
        contracts.push(contract(k, OptionType::Put));
    }
    ChainSnapshot {
        symbol: "NIFTY".into(),
        spot_price: 1000.0,
        contracts,
        snapshot_time: Utc.with_ymd_and_hms(2025, 9, 1, 9, 30, 0).unwrap(),
    }
}

fn market_context() -> MarketContext {
    MarketContext {
        signal: DirectionSignal {
            direction: MarketDirection::Bullish,
            confidence: 0.8,
            iv_environment: IvEnvironment::Normal,
        },
        expected_move: 50.0,
        holding_period: HoldingPeriod::Days11To20,
    }
}

fn leg(role: &str, option_type: OptionType, side: PositionSide, strike: f64, delta: f64) -> StrategyLeg {
    StrategyLeg {
        role: role.into(),
        option_type,
        side,
        strike,
        expiry: expiry(),
        quantity: 1,
        premium: 10.0,
        greeks: Greeks {
            delta,
            ..Default::default()
        },
        open_interest: 800,
    }
}

/// Scenario A: bull call spread strike targeting on the documented ladder.
#[test]
fn scenario_a_bull_call_spread_targets() {
    let smile = SmileModel::new(SmileConfig::default());
    let selector = StrikeSelector::new(&smile, EngineConfig::default().selector);
    let snap = ladder_snapshot(&[980.0, 1000.0, 1020.0, 1040.0, 1060.0]);
    let ctx = market_context();

    // Timeframe multiplier 0.75 for an 11-20 day hold, strategy
    // multiplier 1.0: short target = 1000 + 50 * 0.75 = 1037.5.
    let requests = StrikeRequest::for_archetype(StrategyArchetype::BullCallSpread);
    let (short_req, _) = &requests[1];
    let target = selector.target_price(short_req, 1000.0, expiry(), 24, &ctx);
    assert!((target - 1037.5).abs() < 1e-9);

    let legs = selector
        .select_multi_leg(
            StrategyArchetype::BullCallSpread,
            &requests,
            &snap,
            expiry(),
            &ctx,
        )
        .unwrap();
    assert_eq!(legs[0].strike, 1000.0);
    assert_eq!(legs[1].strike, 1040.0);
}

/// Scenario B: iron condor probability from 25-delta shorts.
#[test]
fn scenario_b_iron_condor_pop() {
    let legs = vec![
        leg("put_long", OptionType::Put, PositionSide::Long, 940.0, -0.10),
        leg("put_short", OptionType::Put, PositionSide::Short, 970.0, -0.25),
        leg("call_short", OptionType::Call, PositionSide::Short, 1030.0, 0.25),
        leg("call_long", OptionType::Call, PositionSide::Long, 1060.0, 0.10),
    ];
    let pop = probability_of_profit(StrategyArchetype::IronCondor, &legs);
    assert!((pop - 0.46875).abs() < 1e-9);
}

/// Scenario C: Kelly clamp at p=0.6, b=2.
#[test]
fn scenario_c_kelly_clamp() {
    let payoff = PayoffProfile {
        net_premium: 10.0,
        max_profit: Some(20.0),
        max_loss: Some(10.0),
        risk_capital: 10.0,
        breakeven_points: vec![],
    };
    let f = kelly_fraction(0.6, &payoff);
    assert!((f - 0.25).abs() < 1e-12);
}

/// Scenario D: percentage stop loss forces an immediate close.
#[test]
fn scenario_d_stop_loss_close_immediately() {
    let conditions = ExitConditionSet {
        max_loss: 10_000.0,
        ..Default::default()
    };
    let position = PositionSnapshot {
        strategy_id: Uuid::new_v4(),
        symbol: "NIFTY".into(),
        legs: Vec::new(),
        total_pnl: -5_500.0,
        total_pnl_pct: -55.0,
        days_in_trade: 4,
        actual_dte: 18,
        expiry: expiry(),
    };
    let eval = evaluate_exit(&position, &conditions);
    assert_eq!(eval.recommended_action, ExitAction::CloseImmediately);
    assert_eq!(eval.urgency, Urgency::High);
}

/// Scenario E: expiry proximity is a hard override.
#[test]
fn scenario_e_expiry_override() {
    let conditions = ExitConditionSet {
        max_loss: 10_000.0,
        ..Default::default()
    };
    let position = PositionSnapshot {
        strategy_id: Uuid::new_v4(),
        symbol: "NIFTY".into(),
        legs: Vec::new(),
        total_pnl: 10.0,
        total_pnl_pct: 0.1,
        days_in_trade: 10,
        actual_dte: 1,
        expiry: expiry(),
    };
    let eval = evaluate_exit(&position, &conditions);
    assert_eq!(eval.recommended_action, ExitAction::CloseImmediately);
    assert_eq!(eval.urgency, Urgency::High);
}

/// Full pipeline determinism: identical inputs produce identical strikes
/// and ordering.
#[test]
fn full_pass_is_deterministic() {
    let engine = StrategyEngine::new(EngineConfig::default());
    let snap = ladder_snapshot(&[
        880.0, 900.0, 920.0, 940.0, 960.0, 980.0, 1000.0, 1020.0, 1040.0, 1060.0, 1080.0, 1100.0,
        1120.0,
    ]);
    let ctx = market_context();

    let first = engine.analyze(&snap, &ctx, None);
    let second = engine.analyze(&snap, &ctx, None);

    assert_eq!(first.strategies.len(), second.strategies.len());
    for (a, b) in first.strategies.iter().zip(second.strategies.iter()) {
        assert_eq!(a.archetype, b.archetype);
        let strikes_a: Vec<f64> = a.legs.iter().map(|l| l.strike).collect();
        let strikes_b: Vec<f64> = b.legs.iter().map(|l| l.strike).collect();
        assert_eq!(strikes_a, strikes_b);
        assert!((a.total_score - b.total_score).abs() < 1e-12);
    }
}

/// Every emitted strategy honors its ordering invariant and clamped
/// numeric ranges, across direction/IV contexts.
#[test]
fn emitted_strategies_respect_invariants() {
    let engine = StrategyEngine::new(EngineConfig::default());
    let snap = ladder_snapshot(&[
        880.0, 900.0, 920.0, 940.0, 960.0, 980.0, 1000.0, 1020.0, 1040.0, 1060.0, 1080.0, 1100.0,
        1120.0,
    ]);

    for direction in [
        MarketDirection::Bullish,
        MarketDirection::Bearish,
        MarketDirection::Neutral,
    ] {
        for env in [IvEnvironment::Low, IvEnvironment::Normal, IvEnvironment::High] {
            let ctx = MarketContext {
                signal: DirectionSignal {
                    direction,
                    confidence: 0.8,
                    iv_environment: env,
                },
                expected_move: 50.0,
                holding_period: HoldingPeriod::Days21To30,
            };
            let report = engine.analyze(&snap, &ctx, None);
            for inst in &report.strategies {
                assert!(
                    inst.archetype.validate_legs(&inst.legs).is_ok(),
                    "{:?} violated ordering",
                    inst.archetype
                );
                assert!((0.0..=1.0).contains(&inst.probability_of_profit));
                assert!((0.01..=0.25).contains(&inst.kelly_fraction));
                assert!(inst.max_loss >= 0.0);
                if let Some(size) = &inst.position_size {
                    assert!(size.risk_percentage <= 5.0 + 1e-9);
                    assert!(size.lots >= 1);
                }
            }
        }
    }
}

/// Smile IV stays within the clamped ratio band on both the calibrated and
/// default paths.
#[test]
fn smile_ratio_clamp_property() {
    let model = SmileModel::new(SmileConfig::default());
    let snap = ladder_snapshot(&[900.0, 950.0, 1000.0, 1050.0, 1100.0]);
    // Calibrated path (flat IVs fit a flat curve)
    model.calibrate(&snap, expiry()).unwrap();
    for strike in [100.0, 600.0, 900.0, 1000.0, 1500.0, 3000.0] {
        for ot in [OptionType::Call, OptionType::Put] {
            let iv = model.iv_at(strike, 1000.0, expiry(), ot);
            let ratio = iv / 0.22;
            assert!(
                (0.5..=2.0).contains(&ratio),
                "calibrated ratio {} out of band",
                ratio
            );
        }
    }
}
