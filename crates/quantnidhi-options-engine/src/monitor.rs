//! Exit monitoring loop.
//!
//! Drives the stateless exit evaluator from a stream of position
//! snapshots. Evaluation per position is throttled to a fixed interval so
//! CPU cost stays bounded under high tick rates, and a shutdown signal
//! stops scheduling new evaluations while letting one already in progress
//! finish (it is cheap and non-blocking).

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::exit::{evaluate_exit, ExitConditionSet, ExitEvaluation, PositionSnapshot};

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Minimum interval between evaluations of the same position
    pub min_eval_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_eval_interval: Duration::from_secs(5),
        }
    }
}

/// Throttled exit monitor. Holds the registered exit conditions and the
/// per-position throttle clock; the evaluator itself keeps no state
/// between calls.
pub struct ExitMonitor {
    config: MonitorConfig,
    conditions: HashMap<Uuid, ExitConditionSet>,
    last_eval: HashMap<Uuid, Instant>,
}

impl ExitMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            conditions: HashMap::new(),
            last_eval: HashMap::new(),
        }
    }

    /// Register a position's exit conditions. Conditions are created once
    /// at strategy selection and read-only afterwards.
    pub fn register(&mut self, strategy_id: Uuid, conditions: ExitConditionSet) {
        self.conditions.insert(strategy_id, conditions);
    }

    /// Remove a closed position.
    pub fn deregister(&mut self, strategy_id: &Uuid) {
        self.conditions.remove(strategy_id);
        self.last_eval.remove(strategy_id);
    }

    /// Evaluate a snapshot unless the position was evaluated within the
    /// throttle window. Unknown positions are ignored.
    pub fn evaluate_throttled(
        &mut self,
        snapshot: &PositionSnapshot,
        now: Instant,
    ) -> Option<ExitEvaluation> {
        let conditions = self.conditions.get(&snapshot.strategy_id)?;

        if let Some(last) = self.last_eval.get(&snapshot.strategy_id) {
            if now.duration_since(*last) < self.config.min_eval_interval {
                return None;
            }
        }

        self.last_eval.insert(snapshot.strategy_id, now);
        Some(evaluate_exit(snapshot, conditions))
    }

    /// Run the monitoring loop until the tick stream closes or the
    /// shutdown signal flips. An evaluation in progress when shutdown
    /// arrives completes and is delivered before the loop exits.
    pub async fn run(
        mut self,
        mut ticks: mpsc::Receiver<PositionSnapshot>,
        evaluations: mpsc::Sender<ExitEvaluation>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("exit monitor: shutdown signal, no further evaluations scheduled");
                        break;
                    }
                }
                maybe_snapshot = ticks.recv() => {
                    match maybe_snapshot {
                        Some(snapshot) => {
                            if let Some(evaluation) =
                                self.evaluate_throttled(&snapshot, Instant::now())
                            {
                                debug!(
                                    strategy_id = %evaluation.strategy_id,
                                    action = ?evaluation.recommended_action,
                                    "exit evaluation"
                                );
                                if evaluations.send(evaluation).await.is_err() {
                                    break;
                                }
                            }
                        }
                        None => {
                            info!("exit monitor: tick stream closed");
                            break;
                        }
                    }
                }
            }
        }
    }
}
