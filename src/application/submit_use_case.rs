// ============================================================
// Layer 2 - SubmitUseCase
// ============================================================
// Re-creates a submission from a finished training run without
// training again:
//
//   Step 1: Read train_config.json from the run directory
//   Step 2: Rebuild the network and load the best weights
//   Step 3: Score the validation block with MAP@3
//   Step 4: Predict the test set and write the submission
//
// Because the weights are the best checkpoint rather than the
// final epoch, the score can differ from the one `train` printed.

use std::path::PathBuf;

use anyhow::Result;
use burn::tensor::backend::{AutodiffBackend, Backend};

use crate::application::train_use_case::{
    load_validation, validation_map3, write_test_submission, RunSummary,
};
use crate::data::loader::load_catalog;
use crate::domain::history::History;
use crate::domain::traits::WeightStore;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::trainer::{BurnClassifier, TrainBackend};

pub struct SubmitUseCase {
    run_dir:   PathBuf,
    /// Overrides the input directory recorded in the config
    input_dir: Option<String>,
}

impl SubmitUseCase {
    pub fn new(run_dir: impl Into<PathBuf>, input_dir: Option<String>) -> Self {
        Self { run_dir: run_dir.into(), input_dir }
    }

    pub fn execute(&self) -> Result<RunSummary> {
        let device: <TrainBackend as Backend>::Device = Default::default();
        tracing::info!("Using device: {:?}", device);
        self.execute_on::<TrainBackend>(device)
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<RunSummary> {
        // ── Step 1: Config of the run ────────────────────────────────────────
        let ckpt = CheckpointManager::new(&self.run_dir)?;
        let mut cfg = ckpt.load_config()?;
        cfg.output_dir = self.run_dir.to_string_lossy().into_owned();
        if let Some(input_dir) = &self.input_dir {
            cfg.input_dir = input_dir.clone();
        }
        let render = cfg.render_options()?;

        // ── Step 2: Same architecture, best weights ──────────────────────────
        let catalog = load_catalog(&cfg.categories_dir())?;
        let mut classifier = BurnClassifier::<B>::new(cfg.model_config(catalog.len()), device)?;
        classifier.load_weights(&ckpt.weights_path())?;

        // ── Step 3: Validation score ─────────────────────────────────────────
        let (x_valid, y_valid) = load_validation(&cfg, &render, catalog.len())?;
        let map3 = validation_map3(&classifier, &x_valid, &y_valid, cfg.predict_batch_size)?;
        println!("Map3: {map3:.3}");

        // ── Step 4: Submission ───────────────────────────────────────────────
        let submission = write_test_submission(&classifier, &cfg, &render, &catalog, map3)?;
        Ok(RunSummary { map3, submission, history: History::default() })
    }
}
