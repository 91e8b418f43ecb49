// ============================================================
// Layer 6 - Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Why log metrics to CSV?
//   - Easy to open in a spreadsheet or plot later
//   - Survives a crash halfway through a long run
//
// Columns follow EpochMetrics field order:
//   epoch,learning_rate,loss,accuracy,top_3_accuracy,val_loss,val_accuracy,val_top_3_accuracy
//
// The file is recreated at the start of each run and flushed
// after every row.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::domain::history::EpochMetrics;
use crate::domain::traits::{EpochCallback, TrainingControl, WeightStore};

const METRICS_FILE: &str = "metrics.csv";

/// Logs epoch metrics to `<dir>/metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
    writer:   csv::Writer<File>,
}

impl MetricsLogger {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(METRICS_FILE);
        let writer = csv::Writer::from_path(&csv_path)
            .with_context(|| format!("Cannot create metrics CSV '{}'", csv_path.display()))?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        Ok(Self { csv_path, writer })
    }

    /// Append one epoch's metrics as a new row.
    pub fn log(&mut self, m: &EpochMetrics) -> Result<()> {
        let path = &self.csv_path;
        self.writer
            .serialize(m)
            .with_context(|| format!("Cannot write metrics to '{}'", path.display()))?;
        self.writer.flush()?;
        tracing::debug!(
            "Logged epoch {} metrics: loss={:.4}, val_loss={:.4}",
            m.epoch, m.loss, m.val_loss,
        );
        Ok(())
    }
}

impl EpochCallback for MetricsLogger {
    fn on_epoch_end(
        &mut self,
        metrics:  &EpochMetrics,
        _control: &mut TrainingControl,
        _weights: &dyn WeightStore,
    ) -> Result<()> {
        self.log(metrics)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(epoch: usize) -> EpochMetrics {
        EpochMetrics {
            epoch,
            learning_rate: 0.002,
            loss: 2.5,
            accuracy: 0.25,
            top_3_accuracy: 0.5,
            val_loss: 2.0,
            val_accuracy: 0.3,
            val_top_3_accuracy: 0.55,
        }
    }

    #[test]
    fn test_writes_header_and_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::new(tmp.path()).unwrap();
        logger.log(&metrics(1)).unwrap();
        logger.log(&metrics(2)).unwrap();

        let text = fs::read_to_string(tmp.path().join(METRICS_FILE)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "epoch,learning_rate,loss,accuracy,top_3_accuracy,val_loss,val_accuracy,val_top_3_accuracy"
        );
        assert!(lines[2].starts_with("2,0.002,"));
    }

    #[test]
    fn test_new_run_replaces_old_log() {
        let tmp = tempfile::tempdir().unwrap();
        MetricsLogger::new(tmp.path()).unwrap().log(&metrics(1)).unwrap();
        let _logger = MetricsLogger::new(tmp.path()).unwrap();
        let text = fs::read_to_string(tmp.path().join(METRICS_FILE)).unwrap();
        assert!(text.is_empty());
    }
}
