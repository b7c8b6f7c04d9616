//! QuantNidhi Options Engine
//!
//! Decides which multi-leg options strategy to construct for an underlying,
//! at which strikes, at what size, and when to exit it:
//!
//! 1. **Smile Model** - per-(spot, expiry) implied-volatility curves fitted
//!    from the chain, with a band-based default when calibration fails
//! 2. **Strike Selector** - constraint-driven strike resolution with one
//!    relaxation pass, an emergency ladder fallback, and leg-ordering repair
//! 3. **Probability & Sizing** - archetype-specific probability of profit,
//!    Kelly fraction, and lot sizing
//! 4. **Strategy Ranker** - multi-factor composite scoring with admission
//!    and smile filters
//! 5. **Exit Evaluator** - stateless priority-table decision function over
//!    live position snapshots
//!
//! Every component is a pure function of its explicit inputs; the only
//! shared state is the smile-parameter store, which is read-mostly and
//! guarded by a reader-writer lock. All numeric outputs are clamped to
//! their documented ranges, and degraded inputs recover to documented
//! fallbacks rather than aborting an analysis pass.

pub mod archetype;
pub mod config;
pub mod engine;
pub mod exit;
pub mod greeks;
pub mod monitor;
pub mod probability;
pub mod ranker;
pub mod smile;
pub mod strategy;
pub mod strike_selector;

pub use archetype::{PayoffProfile, StrategyArchetype};
pub use config::EngineConfig;
pub use engine::{AnalysisReport, StrategyEngine};
pub use exit::{
    evaluate_exit, ExitAction, ExitConditionSet, ExitEvaluation, PositionSnapshot, Urgency,
};
pub use greeks::{Greeks, OptionParams};
pub use probability::{
    compute_probability_and_size, kelly_fraction, probability_of_profit, size_position,
    PositionSize,
};
pub use ranker::{rank_strategies, RankContext, RiskGate};
pub use smile::{SmileModel, SmileParameters, SmileRiskMetrics};
pub use strategy::{ComponentScores, StrategyInstance, StrategyLeg};
pub use strike_selector::{StrikeConstraint, StrikeRequest, StrikeSelector, StrikeTarget};
