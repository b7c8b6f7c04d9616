//! Engine error taxonomy.
//!
//! Every variant here is an expected degraded-input case with a documented
//! recovery, not a process failure. `InvalidLegConfiguration` is the only
//! one surfaced to callers as a structured failure; the rest degrade to
//! fallback values inside the component that raised them.

use thiserror::Error;

/// Errors raised by the strategy construction and risk engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// No strike satisfied the request's constraints, even after the single
    /// relaxation pass and the emergency ladder fallback.
    #[error("insufficient liquidity for {request}: {detail}")]
    InsufficientLiquidity { request: String, detail: String },

    /// Smile calibration could not produce parameters for this key; callers
    /// degrade to the default band smile.
    #[error("smile calibration unavailable for {key}: {detail}")]
    CalibrationUnavailable { key: String, detail: String },

    /// Multi-leg strike ordering still violated after the one-shot repair
    /// pass. The archetype is skipped for this symbol.
    #[error("invalid leg configuration for {archetype}: {detail}")]
    InvalidLegConfiguration { archetype: String, detail: String },

    /// Greeks absent from the feed; consumers fall back to moneyness-based
    /// approximations.
    #[error("missing risk data for strike {strike}: {detail}")]
    MissingRiskData { strike: f64, detail: String },
}

/// Convenience alias used across the engine crates.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Whether the error is recovered locally with a fallback value rather
    /// than surfaced to the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::InvalidLegConfiguration { .. })
    }
}
