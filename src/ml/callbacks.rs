// ============================================================
// Layer 5 - Epoch Callbacks
// ============================================================
// Policies that run after validation at the end of each epoch:
//
//   ReduceLrOnPlateau -> multiplies the learning rate by `factor`
//                        after `patience` epochs without improvement
//   BestCheckpoint    -> saves weights whenever the monitored value
//                        reaches a new best
//
// Both watch a Monitor (val_top_3_accuracy in the training run).
// Non-finite values never count as an improvement.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::domain::history::{EpochMetrics, Monitor};
use crate::domain::traits::{EpochCallback, TrainingControl, WeightStore};

// ─── ReduceLrOnPlateau ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    monitor:   Monitor,
    factor:    f64,
    patience:  usize,
    min_delta: f64,
    min_lr:    f64,
    best:      f64,
    wait:      usize,
}

impl ReduceLrOnPlateau {
    pub fn new(
        monitor:   Monitor,
        factor:    f64,
        patience:  usize,
        min_delta: f64,
        min_lr:    f64,
    ) -> Result<Self> {
        if !(factor > 0.0 && factor < 1.0) {
            bail!("plateau factor must lie in (0, 1), got {factor}");
        }
        if min_delta < 0.0 || min_lr < 0.0 {
            bail!("min_delta and min_lr must not be negative");
        }
        Ok(Self {
            monitor,
            factor,
            patience,
            min_delta,
            min_lr,
            best: monitor.mode().worst(),
            wait: 0,
        })
    }

    /// New learning rate if this epoch triggers a reduction.
    pub fn update(&mut self, current: f64, learning_rate: f64) -> Option<f64> {
        if self.monitor.mode().improved(current, self.best, self.min_delta) {
            self.best = current;
            self.wait = 0;
            return None;
        }

        self.wait += 1;
        if self.wait < self.patience {
            return None;
        }
        self.wait = 0;
        if learning_rate > self.min_lr {
            Some((learning_rate * self.factor).max(self.min_lr))
        } else {
            None
        }
    }
}

impl EpochCallback for ReduceLrOnPlateau {
    fn on_epoch_end(
        &mut self,
        metrics:  &EpochMetrics,
        control:  &mut TrainingControl,
        _weights: &dyn WeightStore,
    ) -> Result<()> {
        let current = self.monitor.value(metrics);
        if let Some(lr) = self.update(current, control.learning_rate) {
            tracing::info!(
                "Epoch {}: {} plateaued at {:.4}, reducing learning rate {:.3e} -> {:.3e}",
                metrics.epoch, self.monitor.name(), self.best, control.learning_rate, lr,
            );
            control.learning_rate = lr;
        }
        Ok(())
    }
}

// ─── BestCheckpoint ───────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    path:    PathBuf,
    monitor: Monitor,
    best:    f64,
}

impl BestCheckpoint {
    pub fn new(path: impl Into<PathBuf>, monitor: Monitor) -> Self {
        Self { path: path.into(), monitor, best: monitor.mode().worst() }
    }
}

impl EpochCallback for BestCheckpoint {
    fn on_epoch_end(
        &mut self,
        metrics:  &EpochMetrics,
        _control: &mut TrainingControl,
        weights:  &dyn WeightStore,
    ) -> Result<()> {
        let current = self.monitor.value(metrics);
        if !self.monitor.mode().improved(current, self.best, 0.0) {
            tracing::debug!(
                "Epoch {}: {} = {:.4}, best stays {:.4}",
                metrics.epoch, self.monitor.name(), current, self.best,
            );
            return Ok(());
        }

        weights.save_weights(&self.path)?;
        tracing::info!(
            "Epoch {}: {} improved {:.4} -> {:.4}, saved '{}'",
            metrics.epoch, self.monitor.name(), self.best, current, self.path.display(),
        );
        self.best = current;
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;

    use super::*;

    #[derive(Default)]
    struct CountingStore {
        saves: RefCell<Vec<PathBuf>>,
    }

    impl WeightStore for CountingStore {
        fn save_weights(&self, path: &Path) -> Result<()> {
            self.saves.borrow_mut().push(path.to_path_buf());
            Ok(())
        }

        fn load_weights(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn epoch(n: usize, val_top3: f64) -> EpochMetrics {
        EpochMetrics {
            epoch: n,
            learning_rate: 0.0,
            loss: 1.0,
            accuracy: 0.5,
            top_3_accuracy: 0.7,
            val_loss: 1.0,
            val_accuracy: 0.5,
            val_top_3_accuracy: val_top3,
        }
    }

    fn plateau() -> ReduceLrOnPlateau {
        ReduceLrOnPlateau::new(Monitor::ValTop3Accuracy, 0.75, 3, 0.001, 1e-5).unwrap()
    }

    #[test]
    fn test_reduces_after_patience() {
        let mut cb = plateau();
        assert_eq!(cb.update(0.50, 0.002), None);
        // Gains below min_delta do not count
        assert_eq!(cb.update(0.5005, 0.002), None);
        assert_eq!(cb.update(0.50, 0.002), None);
        let lr = cb.update(0.49, 0.002).unwrap();
        assert!((lr - 0.0015).abs() < 1e-12);
        // Wait counter restarts after a reduction
        assert_eq!(cb.update(0.49, lr), None);
    }

    #[test]
    fn test_improvement_resets_wait() {
        let mut cb = plateau();
        cb.update(0.50, 0.002);
        cb.update(0.50, 0.002);
        cb.update(0.50, 0.002);
        // Two stale epochs, then an improvement restarts the count
        assert_eq!(cb.update(0.60, 0.002), None);
        assert_eq!(cb.update(0.60, 0.002), None);
        assert_eq!(cb.update(0.60, 0.002), None);
        assert!(cb.update(0.60, 0.002).is_some());
        assert_eq!(cb.best, 0.60);
    }

    #[test]
    fn test_respects_min_lr() {
        let mut cb = ReduceLrOnPlateau::new(Monitor::ValTop3Accuracy, 0.5, 1, 0.0, 1e-3).unwrap();
        cb.update(0.5, 0.0015);
        assert_eq!(cb.update(0.5, 0.0015), Some(1e-3));
        assert_eq!(cb.update(0.5, 1e-3), None);
    }

    #[test]
    fn test_nan_is_never_an_improvement() {
        let mut cb = ReduceLrOnPlateau::new(Monitor::ValTop3Accuracy, 0.5, 1, 0.0, 0.0).unwrap();
        assert_eq!(cb.update(f64::NAN, 1.0), Some(0.5));
    }

    #[test]
    fn test_rejects_bad_factor() {
        assert!(ReduceLrOnPlateau::new(Monitor::ValLoss, 1.5, 3, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_callback_updates_control() {
        let mut cb = ReduceLrOnPlateau::new(Monitor::ValTop3Accuracy, 0.5, 1, 0.0, 0.0).unwrap();
        let store = CountingStore::default();
        let mut control = TrainingControl { learning_rate: 0.01 };
        cb.on_epoch_end(&epoch(1, 0.4), &mut control, &store).unwrap();
        assert_eq!(control.learning_rate, 0.01);
        cb.on_epoch_end(&epoch(2, 0.3), &mut control, &store).unwrap();
        assert_eq!(control.learning_rate, 0.005);
    }

    #[test]
    fn test_best_checkpoint_saves_on_improvement_only() {
        let mut cb = BestCheckpoint::new("out/model.mpk", Monitor::ValTop3Accuracy);
        let store = CountingStore::default();
        let mut control = TrainingControl { learning_rate: 0.01 };

        for (n, v) in [(1, 0.3), (2, 0.5), (3, 0.5), (4, 0.4), (5, 0.6)] {
            cb.on_epoch_end(&epoch(n, v), &mut control, &store).unwrap();
        }
        assert_eq!(store.saves.borrow().len(), 3);
        assert_eq!(store.saves.borrow()[0], PathBuf::from("out/model.mpk"));
    }
}
