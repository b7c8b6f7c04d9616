//! Volatility smile model.
//!
//! Maps (strike, spot, expiry, option type) to an implied volatility that is
//! consistent with observed market skew, so multi-leg strategies price each
//! leg with leg-appropriate IV instead of one flat number:
//! - Calibration: per-side quadratic least squares on IV ratio vs moneyness
//! - Keyed parameter store, recalibrated wholesale, behind a RwLock
//! - Default band smile when calibration is unavailable
//! - Smile-shape risk metrics (risk reversal, butterfly, steepness)
//! - Archetype admissibility from smile shape

use chrono::{DateTime, NaiveDate, Utc};
use quantnidhi_models::{ChainSnapshot, EngineError, EngineResult, OptionType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::archetype::{SmileClass, StrategyArchetype};

/// Smile model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmileConfig {
    /// Contracts at or below this open interest are excluded from calibration
    pub min_open_interest: u64,
    /// Minimum usable points per side for a fit
    pub min_points_per_side: usize,
    /// Lower clamp for the IV ratio
    pub ratio_floor: f64,
    /// Upper clamp for the IV ratio
    pub ratio_cap: f64,
    /// Base ATM IV for the default smile when no calibration exists
    pub default_atm_iv: f64,
}

impl Default for SmileConfig {
    fn default() -> Self {
        Self {
            min_open_interest: 100,
            min_points_per_side: 3,
            ratio_floor: 0.5,
            ratio_cap: 2.0,
            default_atm_iv: 0.20,
        }
    }
}

/// Value-type cache key: spot quantized to two decimals plus expiry date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SmileKey {
    /// round(spot * 100)
    pub spot_mantissa: i64,
    /// Expiry date
    pub expiry: NaiveDate,
}

impl SmileKey {
    pub fn new(spot: f64, expiry: NaiveDate) -> Self {
        Self {
            spot_mantissa: (spot * 100.0).round() as i64,
            expiry,
        }
    }
}

impl std::fmt::Display for SmileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2}/{}",
            self.spot_mantissa as f64 / 100.0,
            self.expiry
        )
    }
}

/// Calibrated smile parameters for one (spot, expiry) key.
///
/// The ratio curve per side is `ratio = a*(m-1)^2 + b*(m-1) + 1` with
/// m = strike/spot. Parameters are recomputed and overwritten as a unit;
/// readers may observe the previous calibration during a write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SmileParameters {
    /// ATM implied volatility (mean IV of contracts nearest spot)
    pub atm_iv: f64,
    /// Put-side quadratic coefficients (a, b)
    pub put_coeffs: (f64, f64),
    /// Call-side quadratic coefficients (a, b)
    pub call_coeffs: (f64, f64),
    /// Calibration timestamp
    pub calibrated_at: DateTime<Utc>,
}

/// Smile-shape descriptors, in IV points (vol * 100).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SmileRiskMetrics {
    /// IV(110% call wing) - IV(90% put wing), IV points
    pub risk_reversal: f64,
    /// Mean wing IV minus ATM IV, IV points
    pub butterfly: f64,
    /// (|put slope| + |call slope|) * atm_iv, IV units per unit moneyness
    pub smile_steepness: f64,
    /// ATM IV used for the metrics
    pub atm_iv: f64,
}

/// Admissibility verdict for a strategy archetype given the smile shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmileVerdict {
    pub admitted: bool,
    pub reason: String,
}

impl SmileVerdict {
    fn admit() -> Self {
        Self {
            admitted: true,
            reason: String::new(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            admitted: false,
            reason: reason.into(),
        }
    }
}

/// The smile model: calibration, lookup, and admissibility.
///
/// Owns the keyed parameter store. Calibration writes a whole
/// `SmileParameters` value per key; lookups take the read lock only.
pub struct SmileModel {
    config: SmileConfig,
    store: RwLock<HashMap<SmileKey, SmileParameters>>,
}

impl SmileModel {
    pub fn new(config: SmileConfig) -> Self {
        Self {
            config,
            store: RwLock::new(HashMap::new()),
        }
    }

    /// Calibrate one (spot, expiry) key from a chain snapshot.
    ///
    /// Filters to open interest above the configured floor, requires at
    /// least `min_points_per_side` clean ratio points per side, and fits
    /// each side independently. On success the parameters are cached and
    /// returned; on failure the previous calibration (if any) is left in
    /// place and callers degrade to the default smile.
    pub fn calibrate(
        &self,
        snapshot: &ChainSnapshot,
        expiry: NaiveDate,
    ) -> EngineResult<SmileParameters> {
        let spot = snapshot.spot_price;
        let key = SmileKey::new(spot, expiry);

        let usable: Vec<(&quantnidhi_models::OptionContract, f64)> = snapshot
            .contracts
            .iter()
            .filter(|c| c.expiry == expiry && c.open_interest > self.config.min_open_interest)
            .filter_map(|c| c.implied_volatility.filter(|iv| *iv > 0.0).map(|iv| (c, iv)))
            .collect();

        if usable.is_empty() {
            return Err(EngineError::CalibrationUnavailable {
                key: key.to_string(),
                detail: "no liquid contracts with implied volatility".into(),
            });
        }

        // ATM IV: mean IV of the contracts at the strike nearest spot.
        let nearest = usable
            .iter()
            .map(|(c, _)| (c.strike - spot).abs())
            .fold(f64::MAX, f64::min);
        let atm_ivs: Vec<f64> = usable
            .iter()
            .filter(|(c, _)| ((c.strike - spot).abs() - nearest).abs() < 1e-9)
            .map(|(_, iv)| *iv)
            .collect();
        let atm_iv = atm_ivs.iter().sum::<f64>() / atm_ivs.len() as f64;
        if atm_iv <= 0.0 {
            return Err(EngineError::CalibrationUnavailable {
                key: key.to_string(),
                detail: "degenerate ATM IV".into(),
            });
        }

        // Normalized ratio points per side, clean ratios only.
        let mut puts: Vec<(f64, f64)> = Vec::new();
        let mut calls: Vec<(f64, f64)> = Vec::new();
        for (c, iv) in &usable {
            let ratio = iv / atm_iv;
            if ratio < self.config.ratio_floor || ratio > self.config.ratio_cap {
                continue;
            }
            let x = c.moneyness(spot) - 1.0;
            let y = ratio - 1.0;
            match c.option_type {
                OptionType::Put => puts.push((x, y)),
                OptionType::Call => calls.push((x, y)),
            }
        }

        if puts.len() < self.config.min_points_per_side
            || calls.len() < self.config.min_points_per_side
        {
            warn!(
                key = %key,
                puts = puts.len(),
                calls = calls.len(),
                "smile calibration skipped: too few clean points per side"
            );
            return Err(EngineError::CalibrationUnavailable {
                key: key.to_string(),
                detail: format!(
                    "need {} points per side, have {} puts / {} calls",
                    self.config.min_points_per_side,
                    puts.len(),
                    calls.len()
                ),
            });
        }

        let put_coeffs = fit_quadratic(&puts).ok_or_else(|| EngineError::CalibrationUnavailable {
            key: key.to_string(),
            detail: "singular put-side fit".into(),
        })?;
        let call_coeffs =
            fit_quadratic(&calls).ok_or_else(|| EngineError::CalibrationUnavailable {
                key: key.to_string(),
                detail: "singular call-side fit".into(),
            })?;

        let params = SmileParameters {
            atm_iv,
            put_coeffs,
            call_coeffs,
            calibrated_at: snapshot.snapshot_time,
        };

        debug!(
            key = %key,
            atm_iv,
            put_a = put_coeffs.0,
            put_b = put_coeffs.1,
            call_a = call_coeffs.0,
            call_b = call_coeffs.1,
            "smile calibrated"
        );

        self.store
            .write()
            .expect("smile store lock poisoned")
            .insert(key, params);
        Ok(params)
    }

    /// Calibrate every expiry in the snapshot. Returns the number of keys
    /// calibrated; failures degrade to the default smile per key.
    pub fn calibrate_all(&self, snapshot: &ChainSnapshot) -> usize {
        let mut calibrated = 0;
        for expiry in snapshot.expiries() {
            match self.calibrate(snapshot, expiry) {
                Ok(_) => calibrated += 1,
                Err(err) => debug!(%err, "falling back to default smile"),
            }
        }
        calibrated
    }

    /// Cached parameters for a key, if any.
    pub fn parameters(&self, spot: f64, expiry: NaiveDate) -> Option<SmileParameters> {
        self.store
            .read()
            .expect("smile store lock poisoned")
            .get(&SmileKey::new(spot, expiry))
            .copied()
    }

    /// Smile-consistent IV at a strike.
    ///
    /// Uses the calibrated quadratic when parameters exist for the
    /// (spot, expiry) key; otherwise the default band smile. The ratio is
    /// clamped to the configured bounds on both paths.
    pub fn iv_at(&self, strike: f64, spot: f64, expiry: NaiveDate, option_type: OptionType) -> f64 {
        let m = if spot > 0.0 { strike / spot } else { 1.0 };
        match self.parameters(spot, expiry) {
            Some(params) => {
                let (a, b) = match option_type {
                    OptionType::Put => params.put_coeffs,
                    OptionType::Call => params.call_coeffs,
                };
                let x = m - 1.0;
                let ratio =
                    (a * x * x + b * x + 1.0).clamp(self.config.ratio_floor, self.config.ratio_cap);
                ratio * params.atm_iv
            }
            None => {
                let ratio = (1.0 + default_bump(m, option_type))
                    .clamp(self.config.ratio_floor, self.config.ratio_cap);
                ratio * self.config.default_atm_iv
            }
        }
    }

    /// IV differential between the short and long strikes of a spread.
    /// Positive means the short leg is priced richer than the long leg.
    pub fn spread_iv_differential(
        &self,
        short_strike: f64,
        long_strike: f64,
        spot: f64,
        expiry: NaiveDate,
        option_type: OptionType,
    ) -> f64 {
        self.iv_at(short_strike, spot, expiry, option_type)
            - self.iv_at(long_strike, spot, expiry, option_type)
    }

    /// Smile-shape risk metrics at the 90/110 wings.
    pub fn risk_metrics(&self, snapshot: &ChainSnapshot, expiry: NaiveDate) -> SmileRiskMetrics {
        let spot = snapshot.spot_price;
        let call_wing = self.iv_at(spot * 1.10, spot, expiry, OptionType::Call);
        let put_wing = self.iv_at(spot * 0.90, spot, expiry, OptionType::Put);

        let (atm_iv, put_b, call_b) = match self.parameters(spot, expiry) {
            Some(p) => (p.atm_iv, p.put_coeffs.1, p.call_coeffs.1),
            // Default-band slopes near ATM: 15% ratio per 10% moneyness on
            // the put side, 8% on the call side.
            None => (self.config.default_atm_iv, -1.5, 0.8),
        };

        SmileRiskMetrics {
            risk_reversal: (call_wing - put_wing) * 100.0,
            butterfly: ((call_wing + put_wing) / 2.0 - atm_iv) * 100.0,
            smile_steepness: (put_b.abs() + call_b.abs()) * atm_iv,
            atm_iv,
        }
    }

    /// Whether the smile shape admits an archetype.
    ///
    /// Neutral defined-risk structures are rejected when the wings are
    /// expensive or the smile is lopsided; long-volatility structures are
    /// rejected when the smile is too flat to offer an edge; credit spreads
    /// are rejected when the risk reversal opposes their direction.
    pub fn admits(&self, archetype: StrategyArchetype, metrics: &SmileRiskMetrics) -> SmileVerdict {
        match archetype.smile_class() {
            SmileClass::NeutralDefinedRisk => {
                if metrics.butterfly > 5.0 {
                    SmileVerdict::reject(format!(
                        "wings too expensive: butterfly {:.1} pts > 5",
                        metrics.butterfly
                    ))
                } else if metrics.smile_steepness > 0.5 {
                    SmileVerdict::reject(format!(
                        "smile too steep: steepness {:.2} > 0.5",
                        metrics.smile_steepness
                    ))
                } else {
                    SmileVerdict::admit()
                }
            }
            SmileClass::LongVolatility => {
                if metrics.butterfly < 2.0 {
                    SmileVerdict::reject(format!(
                        "smile too flat for long volatility: butterfly {:.1} pts < 2",
                        metrics.butterfly
                    ))
                } else {
                    SmileVerdict::admit()
                }
            }
            SmileClass::CreditSpread => {
                let bias = archetype.direction_bias();
                if bias > 0.0 && metrics.risk_reversal < -5.0 {
                    SmileVerdict::reject(format!(
                        "risk reversal {:.1} pts opposes bullish credit",
                        metrics.risk_reversal
                    ))
                } else if bias < 0.0 && metrics.risk_reversal > 5.0 {
                    SmileVerdict::reject(format!(
                        "risk reversal {:.1} pts opposes bearish credit",
                        metrics.risk_reversal
                    ))
                } else {
                    SmileVerdict::admit()
                }
            }
            SmileClass::Other => SmileVerdict::admit(),
        }
    }
}

/// Least-squares fit of `y = a*x^2 + b*x` (intercept pinned at zero in
/// ratio-minus-one space). Returns None when the design is singular.
fn fit_quadratic(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let (mut s4, mut s3, mut s2, mut s2y, mut s1y) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for &(x, y) in points {
        let x2 = x * x;
        s4 += x2 * x2;
        s3 += x2 * x;
        s2 += x2;
        s2y += x2 * y;
        s1y += x * y;
    }
    let det = s4 * s2 - s3 * s3;
    if det.abs() < 1e-12 {
        return None;
    }
    let a = (s2y * s2 - s3 * s1y) / det;
    let b = (s4 * s1y - s3 * s2y) / det;
    Some((a, b))
}

/// Default smile bump (fractional IV ratio increase) at a given moneyness.
///
/// Puts: +15% at 90% moneyness, +25% at 80%, linear between, and each
/// further 10% band past 80% scales the outer bump by 1.5 (linear within a
/// partial band). Calls: +8% at 110%, +12% at 120%, symmetric beyond.
fn default_bump(moneyness: f64, option_type: OptionType) -> f64 {
    match option_type {
        OptionType::Put => {
            if moneyness >= 1.0 {
                0.0
            } else if moneyness >= 0.9 {
                0.15 * (1.0 - moneyness) / 0.1
            } else if moneyness >= 0.8 {
                0.15 + 0.10 * (0.9 - moneyness) / 0.1
            } else {
                banded_extrapolation(0.25, (0.8 - moneyness) / 0.1)
            }
        }
        OptionType::Call => {
            if moneyness <= 1.0 {
                0.0
            } else if moneyness <= 1.1 {
                0.08 * (moneyness - 1.0) / 0.1
            } else if moneyness <= 1.2 {
                0.08 + 0.04 * (moneyness - 1.1) / 0.1
            } else {
                banded_extrapolation(0.12, (moneyness - 1.2) / 0.1)
            }
        }
    }
}

/// Scale `outer_bump` by 1.5 per full band, linear within a partial band.
fn banded_extrapolation(outer_bump: f64, bands: f64) -> f64 {
    let whole = bands.floor();
    let frac = bands - whole;
    let base = outer_bump * 1.5f64.powi(whole as i32);
    base + (base * 1.5 - base) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use quantnidhi_models::OptionContract;

    fn contract(
        strike: f64,
        option_type: OptionType,
        iv: f64,
        open_interest: u64,
    ) -> OptionContract {
        OptionContract {
            strike,
            option_type,
            expiry: NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
            bid: 9.0,
            ask: 11.0,
            last_price: 10.0,
            open_interest,
            volume: 100,
            delta: Some(0.5),
            gamma: None,
            theta: None,
            vega: None,
            implied_volatility: Some(iv),
        }
    }

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 25).unwrap()
    }

    /// Chain whose IVs follow a known quadratic ratio curve.
    fn synthetic_snapshot(a_put: f64, b_put: f64, a_call: f64, b_call: f64) -> ChainSnapshot {
        let spot = 1000.0;
        let atm_iv = 0.20;
        let mut contracts = Vec::new();
        for pct in [-15, -10, -5, 0, 5, 10, 15] {
            let strike = spot * (1.0 + pct as f64 / 100.0);
            let x = strike / spot - 1.0;
            let put_iv = atm_iv * (a_put * x * x + b_put * x + 1.0);
            let call_iv = atm_iv * (a_call * x * x + b_call * x + 1.0);
            contracts.push(contract(strike, OptionType::Put, put_iv, 500));
            contracts.push(contract(strike, OptionType::Call, call_iv, 500));
        }
        ChainSnapshot {
            symbol: "NIFTY".into(),
            spot_price: spot,
            contracts,
            snapshot_time: Utc.with_ymd_and_hms(2025, 9, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_calibration_recovers_known_curve() {
        let model = SmileModel::new(SmileConfig::default());
        let snap = synthetic_snapshot(2.0, -0.8, 1.0, 0.4);
        let params = model.calibrate(&snap, expiry()).unwrap();

        assert_relative_eq!(params.atm_iv, 0.20, epsilon = 1e-9);
        assert_relative_eq!(params.put_coeffs.0, 2.0, epsilon = 1e-6);
        assert_relative_eq!(params.put_coeffs.1, -0.8, epsilon = 1e-6);
        assert_relative_eq!(params.call_coeffs.0, 1.0, epsilon = 1e-6);
        assert_relative_eq!(params.call_coeffs.1, 0.4, epsilon = 1e-6);
    }

    #[test]
    fn test_calibrated_iv_lookup() {
        let model = SmileModel::new(SmileConfig::default());
        let snap = synthetic_snapshot(2.0, -0.8, 1.0, 0.4);
        model.calibrate(&snap, expiry()).unwrap();

        // Put at 90% moneyness: ratio = 2*0.01 + (-0.8)*(-0.1) + 1 = 1.10
        let iv = model.iv_at(900.0, 1000.0, expiry(), OptionType::Put);
        assert_relative_eq!(iv, 0.20 * 1.10, epsilon = 1e-6);
    }

    #[test]
    fn test_too_few_points_is_unavailable() {
        let model = SmileModel::new(SmileConfig::default());
        let mut snap = synthetic_snapshot(2.0, -0.8, 1.0, 0.4);
        // Starve the put side of liquidity
        snap.contracts
            .retain(|c| c.option_type == OptionType::Call || c.strike >= 1000.0);
        snap.contracts
            .iter_mut()
            .filter(|c| c.option_type == OptionType::Put && c.strike > 1000.0)
            .for_each(|c| c.open_interest = 10);

        let err = model.calibrate(&snap, expiry()).unwrap_err();
        assert!(matches!(err, EngineError::CalibrationUnavailable { .. }));
        // Lookup still works via the default smile
        let iv = model.iv_at(900.0, 1000.0, expiry(), OptionType::Put);
        assert_relative_eq!(iv, 0.20 * 1.15, epsilon = 1e-9);
    }

    #[test]
    fn test_default_smile_bands() {
        let model = SmileModel::new(SmileConfig::default());
        let e = expiry();
        // Put wing at 90%: +15%
        assert_relative_eq!(
            model.iv_at(900.0, 1000.0, e, OptionType::Put),
            0.20 * 1.15,
            epsilon = 1e-9
        );
        // Put wing at 80%: +25%
        assert_relative_eq!(
            model.iv_at(800.0, 1000.0, e, OptionType::Put),
            0.20 * 1.25,
            epsilon = 1e-9
        );
        // Call wing at 110%: +8%
        assert_relative_eq!(
            model.iv_at(1100.0, 1000.0, e, OptionType::Call),
            0.20 * 1.08,
            epsilon = 1e-9
        );
        // 70% moneyness: one full band past 80%, bump 0.25 * 1.5
        assert_relative_eq!(
            model.iv_at(700.0, 1000.0, e, OptionType::Put),
            0.20 * 1.375,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_ratio_clamped_for_extreme_moneyness() {
        let model = SmileModel::new(SmileConfig::default());
        let e = expiry();
        for strike in [1.0, 100.0, 300.0, 500.0, 2500.0, 10_000.0] {
            for ot in [OptionType::Put, OptionType::Call] {
                let iv = model.iv_at(strike, 1000.0, e, ot);
                let ratio = iv / 0.20;
                assert!((0.5..=2.0).contains(&ratio), "ratio {} out of range", ratio);
            }
        }
    }

    #[test]
    fn test_spread_differential_sign() {
        let model = SmileModel::new(SmileConfig::default());
        let snap = synthetic_snapshot(2.0, -0.8, 1.0, 0.4);
        model.calibrate(&snap, expiry()).unwrap();
        // Put skew rises away from ATM: short 950 vs long 900 is negative
        let diff =
            model.spread_iv_differential(950.0, 900.0, 1000.0, expiry(), OptionType::Put);
        assert!(diff < 0.0);
    }

    #[test]
    fn test_admits_thresholds() {
        let model = SmileModel::new(SmileConfig::default());

        let flat = SmileRiskMetrics {
            risk_reversal: 0.0,
            butterfly: 1.0,
            smile_steepness: 0.2,
            atm_iv: 0.2,
        };
        assert!(model.admits(StrategyArchetype::IronCondor, &flat).admitted);
        assert!(!model.admits(StrategyArchetype::LongStraddle, &flat).admitted);

        let expensive_wings = SmileRiskMetrics {
            butterfly: 6.0,
            ..flat
        };
        assert!(
            !model
                .admits(StrategyArchetype::IronCondor, &expensive_wings)
                .admitted
        );
        assert!(
            model
                .admits(StrategyArchetype::LongStraddle, &expensive_wings)
                .admitted
        );

        let put_heavy = SmileRiskMetrics {
            risk_reversal: -7.0,
            ..flat
        };
        assert!(
            !model
                .admits(StrategyArchetype::BullPutSpread, &put_heavy)
                .admitted
        );
        assert!(
            model
                .admits(StrategyArchetype::BearCallSpread, &put_heavy)
                .admitted
        );
    }
}
