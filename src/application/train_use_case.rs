// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates the full training run in order:
//
//   Step 1: Save config                      (Layer 6 - infra)
//   Step 2: Discover the categories          (Layer 4 - data)
//   Step 3: Load the validation block        (Layer 4 - data)
//   Step 4: Build the batch generator        (Layer 4 - data)
//   Step 5: Save a sample grid of batch one  (Layer 6 - infra)
//   Step 6: Compile and fit the classifier   (Layer 5 - ml)
//   Step 7: Plot the history                 (Layer 6 - infra)
//   Step 8: Score validation with MAP@3      (Layer 3 - domain)
//   Step 9: Predict the test set and write
//           the submission                   (Layer 6 - infra)
//
// The last shard is held out for validation; all the others
// feed the generator.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};

use crate::data::{
    generator::{BatchGenerator, GeneratorConfig},
    loader::{load_catalog, load_fixed, DrawingTable},
    rasterizer::RenderOptions,
    shard::shard_path,
};
use crate::domain::{
    blocks::{ImageBlock, LabelBlock},
    catalog::CategoryCatalog,
    history::{History, Monitor},
    ranking::{mean_average_precision, top_k_accuracy},
    traits::{Classifier, CompileSettings, EpochCallback, FitPlan, Validation},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    figures::{plot_history, save_sample_grid, SAMPLE_GRID_SIDE},
    metrics::MetricsLogger,
    submission::{write_submission, SUBMISSION_TOP_K},
};
use crate::ml::{
    callbacks::{BestCheckpoint, ReduceLrOnPlateau},
    model::DoodleNetConfig,
    trainer::{BurnClassifier, TrainBackend},
};

/// Metric both the plateau schedule and the checkpoint follow.
const MONITOR: Monitor = Monitor::ValTop3Accuracy;

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for a training run.
// Serialisable so it can be saved next to the weights and reloaded
// by `submit` to rebuild the same model and rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Holds train_simplified/ and test_simplified.csv
    pub input_dir:          String,
    /// Holds train_k{N}.csv.gz
    pub shard_dir:          String,
    pub output_dir:         String,
    pub num_shards:         u32,
    pub image_size:         u32,
    pub batch_size:         usize,
    pub steps_per_epoch:    usize,
    pub epochs:             usize,
    pub lr:                 f64,
    pub line_width:         u32,
    pub time_color:         bool,
    /// Rows kept from the validation shard
    pub valid_rows:         usize,
    pub predict_batch_size: usize,
    pub seed:               u64,
    pub plateau_factor:     f64,
    pub plateau_patience:   usize,
    pub plateau_min_delta:  f64,
    pub min_lr:             f64,
    pub base_channels:      usize,
    pub dropout:            f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            input_dir:          "input/quickdraw-doodle-recognition".to_string(),
            shard_dir:          "input/shuffle-csvs".to_string(),
            output_dir:         "output".to_string(),
            num_shards:         100,
            image_size:         64,
            batch_size:         680,
            steps_per_epoch:    800,
            epochs:             16,
            lr:                 0.002,
            line_width:         6,
            time_color:         true,
            valid_rows:         34_000,
            predict_batch_size: 128,
            seed:               1987,
            plateau_factor:     0.75,
            plateau_patience:   3,
            plateau_min_delta:  0.001,
            min_lr:             1e-5,
            base_channels:      32,
            dropout:            0.2,
        }
    }
}

impl TrainConfig {
    pub fn render_options(&self) -> Result<RenderOptions> {
        RenderOptions::new(self.image_size, self.line_width, self.time_color)
    }

    pub fn model_config(&self, num_classes: usize) -> DoodleNetConfig {
        DoodleNetConfig::new(num_classes, self.image_size as usize, self.base_channels, self.dropout)
    }

    pub fn categories_dir(&self) -> PathBuf {
        Path::new(&self.input_dir).join("train_simplified")
    }

    pub fn test_csv(&self) -> PathBuf {
        Path::new(&self.input_dir).join("test_simplified.csv")
    }

    /// The last shard is held out for validation.
    pub fn validation_shard(&self) -> Result<u32> {
        if self.num_shards < 2 {
            bail!("need at least 2 shards (training + validation), got {}", self.num_shards);
        }
        Ok(self.num_shards - 1)
    }

    pub fn training_shards(&self) -> Result<Vec<u32>> {
        Ok((0..self.validation_shard()?).collect())
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub map3:       f64,
    pub submission: PathBuf,
    pub history:    History,
}

// ─── Shared steps ─────────────────────────────────────────────────────────────
// Also used by the submit workflow.

/// Rasterize the first `valid_rows` rows of the held-out shard.
pub fn load_validation(
    cfg:         &TrainConfig,
    render:      &RenderOptions,
    num_classes: usize,
) -> Result<(ImageBlock, LabelBlock)> {
    let path = shard_path(Path::new(&cfg.shard_dir), cfg.validation_shard()?);
    tracing::info!("Loading validation rows from '{}'", path.display());
    let table = DrawingTable::read_csv(&path, Some(cfg.valid_rows))?;
    let (images, labels) = load_fixed(&table, render, num_classes)?;
    let labels = labels.with_context(|| format!("Validation shard '{}' has no labels", path.display()))?;
    Ok((images, labels))
}

/// MAP@3 of the classifier's rankings on a labelled block.
pub fn validation_map3(
    classifier: &dyn Classifier,
    images:     &ImageBlock,
    labels:     &LabelBlock,
    batch_size: usize,
) -> Result<f64> {
    let probs = classifier.predict(images, batch_size)?;
    let top3 = probs.top_k(SUBMISSION_TOP_K);
    let map3 = mean_average_precision(&labels.as_actuals(), &top3, SUBMISSION_TOP_K);
    tracing::info!(
        "Validation on {} rows: top-1 accuracy {:.4}, top-3 accuracy {:.4}",
        labels.len(),
        top_k_accuracy(labels.ids(), probs.rows(), 1),
        top_k_accuracy(labels.ids(), probs.rows(), SUBMISSION_TOP_K),
    );
    Ok(map3)
}

/// Predict the test table and write the submission CSV.
pub fn write_test_submission(
    classifier: &dyn Classifier,
    cfg:        &TrainConfig,
    render:     &RenderOptions,
    catalog:    &CategoryCatalog,
    map3:       f64,
) -> Result<PathBuf> {
    let table = DrawingTable::read_csv(&cfg.test_csv(), None)?;
    let (images, _) = load_fixed(&table, render, catalog.len())?;
    let probs = classifier.predict(&images, cfg.predict_batch_size)?;
    let top3 = probs.top_k(SUBMISSION_TOP_K);
    write_submission(Path::new(&cfg.output_dir), map3, &table.key_ids, &top3, catalog)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full run on the default backend.
    pub fn execute(&self) -> Result<RunSummary> {
        let device: <TrainBackend as Backend>::Device = Default::default();
        tracing::info!("Using device: {:?}", device);
        self.execute_on::<TrainBackend>(device)
    }

    /// Execute the full run on an explicit backend and device.
    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<RunSummary> {
        let start = Instant::now();
        let cfg = &self.config;
        let render = cfg.render_options()?;

        // ── Step 1: Save config for `submit` ─────────────────────────────────
        let ckpt = CheckpointManager::new(&cfg.output_dir)?;
        ckpt.save_config(cfg)?;

        // ── Step 2: Categories from the per-category file names ──────────────
        let catalog = load_catalog(&cfg.categories_dir())?;

        // ── Step 3: Validation block (held-out shard) ────────────────────────
        let (x_valid, y_valid) = load_validation(cfg, &render, catalog.len())?;

        // ── Step 4: Endless training batches ─────────────────────────────────
        let mut generator = BatchGenerator::new(GeneratorConfig {
            shard_dir:   PathBuf::from(&cfg.shard_dir),
            shard_ids:   cfg.training_shards()?,
            batch_size:  cfg.batch_size,
            num_classes: catalog.len(),
            render,
            seed:        cfg.seed,
        })?;

        // ── Step 5: Look at what the model will see ──────────────────────────
        // The batch is consumed, as the first training step would have.
        let first = generator.next_batch()?;
        save_sample_grid(&first.images, SAMPLE_GRID_SIDE, &ckpt.dir().join("gs.png"))?;

        // ── Step 6: Compile and fit ──────────────────────────────────────────
        let mut classifier = BurnClassifier::<B>::new(cfg.model_config(catalog.len()), device)?;
        classifier.compile(CompileSettings::adam(cfg.lr))?;

        let mut callbacks: Vec<Box<dyn EpochCallback>> = vec![
            Box::new(ReduceLrOnPlateau::new(
                MONITOR,
                cfg.plateau_factor,
                cfg.plateau_patience,
                cfg.plateau_min_delta,
                cfg.min_lr,
            )?),
            Box::new(BestCheckpoint::new(ckpt.weights_path(), MONITOR)),
            Box::new(MetricsLogger::new(ckpt.dir())?),
        ];
        let plan = FitPlan {
            steps_per_epoch: cfg.steps_per_epoch,
            epochs:          cfg.epochs,
            eval_batch_size: cfg.predict_batch_size,
        };
        let history = classifier.fit(
            &mut generator,
            plan,
            Validation { images: &x_valid, labels: &y_valid },
            &mut callbacks,
        )?;
        if let Some(best) = history.best(MONITOR) {
            tracing::info!(
                "Best {} = {:.4} at epoch {}",
                MONITOR.name(), MONITOR.value(best), best.epoch,
            );
        }

        // ── Step 7: Learning curves ──────────────────────────────────────────
        plot_history(&history, &ckpt.dir().join("hist.png"))?;

        // ── Step 8: Validation MAP@3 of the final weights ────────────────────
        let map3 = validation_map3(&classifier, &x_valid, &y_valid, cfg.predict_batch_size)?;
        println!("Map3: {map3:.3}");

        // ── Step 9: Test predictions → submission ────────────────────────────
        let submission = write_test_submission(&classifier, cfg, &render, &catalog, map3)?;

        tracing::info!("Total time {}s", start.elapsed().as_secs());
        Ok(RunSummary { map3, submission, history })
    }
}
