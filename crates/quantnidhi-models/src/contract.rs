//! Option contracts and chain snapshots.
//!
//! A `ChainSnapshot` is the immutable unit of work for one analysis pass:
//! one symbol, one spot price, every quoted contract across expiries.
//! Contracts are never mutated after capture; a fresh snapshot replaces the
//! previous one wholesale.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Option type (Call or Put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn is_call(&self) -> bool {
        matches!(self, OptionType::Call)
    }

    pub fn is_put(&self) -> bool {
        matches!(self, OptionType::Put)
    }
}

/// A single quoted option contract within a chain snapshot.
///
/// Greeks and implied volatility come from the market-data feed and may be
/// absent for illiquid strikes; consumers fall back to model-derived
/// approximations rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionContract {
    /// Strike price
    pub strike: f64,
    /// Call or Put
    pub option_type: OptionType,
    /// Expiry date
    pub expiry: NaiveDate,
    /// Best bid
    pub bid: f64,
    /// Best ask
    pub ask: f64,
    /// Last traded price
    pub last_price: f64,
    /// Open interest in contracts
    pub open_interest: u64,
    /// Session volume in contracts
    pub volume: u64,
    /// Feed-supplied delta, if available
    pub delta: Option<f64>,
    /// Feed-supplied gamma, if available
    pub gamma: Option<f64>,
    /// Feed-supplied theta (per day), if available
    pub theta: Option<f64>,
    /// Feed-supplied vega (per 1% IV), if available
    pub vega: Option<f64>,
    /// Feed-supplied implied volatility (annualized), if available
    pub implied_volatility: Option<f64>,
}

impl OptionContract {
    /// Moneyness: strike / spot.
    pub fn moneyness(&self, spot: f64) -> f64 {
        if spot > 0.0 {
            self.strike / spot
        } else {
            0.0
        }
    }

    /// Mid price from bid/ask; falls back to last traded price when the
    /// book is one-sided or empty.
    pub fn mid_price(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.last_price
        }
    }

    /// Absolute bid/ask spread. Zero when the book is unusable.
    pub fn spread(&self) -> f64 {
        if self.ask > self.bid && self.bid > 0.0 {
            self.ask - self.bid
        } else {
            0.0
        }
    }

    /// Spread as a fraction of mid price, for cross-strike comparison.
    pub fn relative_spread(&self) -> f64 {
        let mid = self.mid_price();
        if mid > 0.0 {
            self.spread() / mid
        } else {
            0.0
        }
    }
}

/// Immutable snapshot of an option chain for one underlying.
///
/// Owned exclusively by one analysis pass; concurrent passes each get their
/// own snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Underlying symbol
    pub symbol: String,
    /// Spot price at capture time
    pub spot_price: f64,
    /// All quoted contracts, in feed order
    pub contracts: Vec<OptionContract>,
    /// Capture timestamp
    pub snapshot_time: DateTime<Utc>,
}

impl ChainSnapshot {
    /// Distinct expiries present in the chain, ascending.
    pub fn expiries(&self) -> Vec<NaiveDate> {
        let mut out: Vec<NaiveDate> = self.contracts.iter().map(|c| c.expiry).collect();
        out.sort();
        out.dedup();
        out
    }

    /// Days to expiry for a given expiry date, relative to the snapshot time.
    pub fn dte(&self, expiry: NaiveDate) -> i64 {
        (expiry - self.snapshot_time.date_naive()).num_days()
    }

    /// Contracts of one type for one expiry.
    pub fn contracts_for(
        &self,
        option_type: OptionType,
        expiry: NaiveDate,
    ) -> impl Iterator<Item = &OptionContract> {
        self.contracts
            .iter()
            .filter(move |c| c.option_type == option_type && c.expiry == expiry)
    }

    /// Sorted, deduplicated strike ladder for one type and expiry.
    pub fn strike_ladder(&self, option_type: OptionType, expiry: NaiveDate) -> Vec<f64> {
        let mut strikes: Vec<f64> = self
            .contracts_for(option_type, expiry)
            .map(|c| c.strike)
            .collect();
        strikes.sort_by(|a, b| a.total_cmp(b));
        strikes.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        strikes
    }

    /// Strike on the ladder nearest to spot.
    pub fn atm_strike(&self, option_type: OptionType, expiry: NaiveDate) -> Option<f64> {
        self.strike_ladder(option_type, expiry)
            .into_iter()
            .min_by(|a, b| {
                (a - self.spot_price)
                    .abs()
                    .total_cmp(&(b - self.spot_price).abs())
            })
    }

    /// Look up a contract by strike, type, and expiry.
    pub fn find_contract(
        &self,
        strike: f64,
        option_type: OptionType,
        expiry: NaiveDate,
    ) -> Option<&OptionContract> {
        self.contracts_for(option_type, expiry)
            .find(|c| (c.strike - strike).abs() < 1e-9)
    }
}
