//! Black-Scholes greeks support.
//!
//! First-order greeks and theoretical price for a single contract. Used to
//! approximate missing feed greeks (moneyness-based delta fallback) and for
//! payoff arithmetic; higher-order greeks have no consumer in this engine.

use quantnidhi_models::OptionType;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;

/// Standard normal PDF.
fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Standard normal CDF.
fn norm_cdf(x: f64) -> f64 {
    Normal::new(0.0, 1.0).expect("unit normal").cdf(x)
}

/// Inverse standard normal CDF, clamped away from the tails.
pub fn norm_inverse_cdf(p: f64) -> f64 {
    let p = p.clamp(1e-6, 1.0 - 1e-6);
    Normal::new(0.0, 1.0).expect("unit normal").inverse_cdf(p)
}

/// Input parameters for a greeks calculation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OptionParams {
    /// Current spot price of underlying
    pub spot: f64,
    /// Strike price
    pub strike: f64,
    /// Time to expiry in years
    pub time_to_expiry: f64,
    /// Risk-free rate, annualized
    pub risk_free_rate: f64,
    /// Implied volatility, annualized
    pub iv: f64,
    /// Option type
    pub option_type: OptionType,
}

impl OptionParams {
    pub fn new(
        spot: f64,
        strike: f64,
        time_to_expiry: f64,
        risk_free_rate: f64,
        iv: f64,
        option_type: OptionType,
    ) -> Self {
        Self {
            spot,
            strike,
            time_to_expiry,
            risk_free_rate,
            iv,
            option_type,
        }
    }

    fn d1(&self) -> f64 {
        if self.time_to_expiry <= 0.0 || self.iv <= 0.0 {
            return 0.0;
        }
        let sqrt_t = self.time_to_expiry.sqrt();
        ((self.spot / self.strike).ln()
            + (self.risk_free_rate + 0.5 * self.iv * self.iv) * self.time_to_expiry)
            / (self.iv * sqrt_t)
    }

    fn d2(&self) -> f64 {
        self.d1() - self.iv * self.time_to_expiry.sqrt()
    }
}

/// First-order greeks plus price for one contract.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Greeks {
    /// Delta: sensitivity to underlying price
    pub delta: f64,
    /// Gamma: rate of change of delta
    pub gamma: f64,
    /// Theta: time decay per day
    pub theta: f64,
    /// Vega: sensitivity per 1% IV change
    pub vega: f64,
    /// Theoretical option price
    pub price: f64,
    /// Intrinsic value
    pub intrinsic: f64,
}

impl Greeks {
    /// Calculate greeks for the given parameters.
    pub fn calculate(params: &OptionParams) -> Self {
        let s = params.spot;
        let k = params.strike;
        let t = params.time_to_expiry;
        let r = params.risk_free_rate;
        let sigma = params.iv;

        if t <= 0.0 || sigma <= 0.0 {
            return Self::at_expiry(params);
        }

        let sqrt_t = t.sqrt();
        let d1 = params.d1();
        let d2 = params.d2();

        let nd1 = norm_cdf(d1);
        let nd2 = norm_cdf(d2);
        let pdf_d1 = norm_pdf(d1);
        let exp_rt = (-r * t).exp();

        let price = match params.option_type {
            OptionType::Call => s * nd1 - k * exp_rt * nd2,
            OptionType::Put => k * exp_rt * norm_cdf(-d2) - s * norm_cdf(-d1),
        };

        let delta = match params.option_type {
            OptionType::Call => nd1,
            OptionType::Put => nd1 - 1.0,
        };

        let gamma = pdf_d1 / (s * sigma * sqrt_t);

        let theta_annual = match params.option_type {
            OptionType::Call => -s * pdf_d1 * sigma / (2.0 * sqrt_t) - r * k * exp_rt * nd2,
            OptionType::Put => {
                -s * pdf_d1 * sigma / (2.0 * sqrt_t) + r * k * exp_rt * norm_cdf(-d2)
            }
        };
        let theta = theta_annual / 365.0;

        let vega = s * pdf_d1 * sqrt_t / 100.0;

        let intrinsic = match params.option_type {
            OptionType::Call => (s - k).max(0.0),
            OptionType::Put => (k - s).max(0.0),
        };

        Greeks {
            delta,
            gamma,
            theta,
            vega,
            price,
            intrinsic,
        }
    }

    /// Degenerate case: at or past expiry, or zero volatility.
    fn at_expiry(params: &OptionParams) -> Self {
        let intrinsic = match params.option_type {
            OptionType::Call => (params.spot - params.strike).max(0.0),
            OptionType::Put => (params.strike - params.spot).max(0.0),
        };
        let delta = match params.option_type {
            OptionType::Call => {
                if params.spot > params.strike {
                    1.0
                } else {
                    0.0
                }
            }
            OptionType::Put => {
                if params.spot < params.strike {
                    -1.0
                } else {
                    0.0
                }
            }
        };
        Greeks {
            delta,
            price: intrinsic,
            intrinsic,
            ..Default::default()
        }
    }
}

/// Moneyness-based delta approximation for contracts whose feed greeks are
/// absent. Uses Black-Scholes with the supplied (smile-adjusted) IV.
pub fn approximate_delta(
    spot: f64,
    strike: f64,
    dte_days: f64,
    iv: f64,
    risk_free_rate: f64,
    option_type: OptionType,
) -> f64 {
    let t = (dte_days / 365.0).max(1.0 / 365.0);
    let params = OptionParams::new(spot, strike, t, risk_free_rate, iv.max(0.01), option_type);
    Greeks::calculate(&params).delta
}
