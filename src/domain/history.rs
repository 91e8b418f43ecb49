// ============================================================
// Layer 3 - Training History
// ============================================================
// One EpochMetrics row is produced at the end of every epoch.
// Callbacks read it to decide on learning-rate decay and
// checkpointing; the metrics logger writes it to CSV; the
// history plot draws the whole list at the end of training.

use serde::{Deserialize, Serialize};

/// Metrics for a single epoch. Training values are averaged over
/// the epoch's steps, validation values cover the whole block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    /// Learning rate the epoch was trained with
    pub learning_rate: f64,
    pub loss: f64,
    pub accuracy: f64,
    pub top_3_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub val_top_3_accuracy: f64,
}

/// Which metric a callback watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Monitor {
    ValLoss,
    ValAccuracy,
    ValTop3Accuracy,
}

impl Monitor {
    pub fn value(self, m: &EpochMetrics) -> f64 {
        match self {
            Monitor::ValLoss => m.val_loss,
            Monitor::ValAccuracy => m.val_accuracy,
            Monitor::ValTop3Accuracy => m.val_top_3_accuracy,
        }
    }

    /// Loss improves downwards, accuracies upwards.
    pub fn mode(self) -> MonitorMode {
        match self {
            Monitor::ValLoss => MonitorMode::Min,
            Monitor::ValAccuracy | Monitor::ValTop3Accuracy => MonitorMode::Max,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Monitor::ValLoss => "val_loss",
            Monitor::ValAccuracy => "val_accuracy",
            Monitor::ValTop3Accuracy => "val_top_3_accuracy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorMode {
    Min,
    Max,
}

impl MonitorMode {
    /// True when `current` beats `best` by more than `min_delta`.
    pub fn improved(self, current: f64, best: f64, min_delta: f64) -> bool {
        if !current.is_finite() {
            return false;
        }
        match self {
            MonitorMode::Max => current > best + min_delta,
            MonitorMode::Min => current < best - min_delta,
        }
    }

    /// Starting "best" value that any finite reading improves on.
    pub fn worst(self) -> f64 {
        match self {
            MonitorMode::Max => f64::NEG_INFINITY,
            MonitorMode::Min => f64::INFINITY,
        }
    }
}

/// Epoch metrics in training order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochMetrics>,
}

impl History {
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    pub fn best(&self, monitor: Monitor) -> Option<&EpochMetrics> {
        let mode = monitor.mode();
        self.epochs.iter().fold(None, |best: Option<&EpochMetrics>, m| match best {
            Some(b) if !mode.improved(monitor.value(m), monitor.value(b), 0.0) => Some(b),
            _ => Some(m),
        })
    }
}
