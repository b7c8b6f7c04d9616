//! QuantNidhi Models - shared market-data and signal types
//!
//! Everything the strategy engine consumes from external collaborators lives
//! here: option-chain snapshots, market-direction signals, expected-move
//! estimates, and the engine error taxonomy. The engine never constructs
//! these inputs itself; the market-data and analyzer layers do.

pub mod contract;
pub mod error;
pub mod signal;

pub use contract::{ChainSnapshot, OptionContract, OptionType};
pub use error::{EngineError, EngineResult};
pub use signal::{
    DirectionSignal, HoldingPeriod, IvEnvironment, MarketContext, MarketDirection,
};
