// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The training driver never talks to Burn directly. It only
// sees the traits below:
//
//   BatchSource   -> anything that can hand out the next batch
//                    (the shard-streaming BatchGenerator, or a
//                    fixed list in tests)
//   Classifier    -> compile / fit / predict, the contract of a
//                    trainable model (BurnClassifier implements it)
//   WeightStore   -> save and restore learned parameters
//   EpochCallback -> policies run at every epoch boundary
//                    (plateau decay, best checkpoint, CSV log)
//
// Any backend that honours these contracts can replace the
// Burn implementation without touching the application layer.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::blocks::{Batch, ImageBlock, LabelBlock, ProbabilityMatrix};
use crate::domain::history::{EpochMetrics, History};

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// A pull-based, single-consumer supply of training batches.
pub trait BatchSource {
    fn next_batch(&mut self) -> Result<Batch>;
}

// ─── Compile settings ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossKind {
    /// Cross-entropy against one-hot targets
    CategoricalCrossEntropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    Accuracy,
    TopKAccuracy(usize),
}

/// Everything `compile` fixes before training starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileSettings {
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub loss: LossKind,
    pub metrics: Vec<MetricKind>,
}

impl CompileSettings {
    /// Adam with categorical cross-entropy, tracking accuracy and
    /// top-3 accuracy.
    pub fn adam(learning_rate: f64) -> Self {
        Self {
            optimizer: OptimizerKind::Adam,
            learning_rate,
            loss: LossKind::CategoricalCrossEntropy,
            metrics: vec![MetricKind::Accuracy, MetricKind::TopKAccuracy(3)],
        }
    }
}

// ─── Fit plan ─────────────────────────────────────────────────────────────────
/// Shape of a `fit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitPlan {
    pub steps_per_epoch: usize,
    pub epochs: usize,
    /// Rows per forward pass when scoring the validation block
    pub eval_batch_size: usize,
}

/// Held-out data scored once per epoch.
#[derive(Debug, Clone, Copy)]
pub struct Validation<'a> {
    pub images: &'a ImageBlock,
    pub labels: &'a LabelBlock,
}

// ─── Training control ─────────────────────────────────────────────────────────
/// Mutable knobs callbacks may turn between epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingControl {
    pub learning_rate: f64,
}

// ─── WeightStore ──────────────────────────────────────────────────────────────
pub trait WeightStore {
    fn save_weights(&self, path: &Path) -> Result<()>;
    fn load_weights(&mut self, path: &Path) -> Result<()>;
}

// ─── EpochCallback ────────────────────────────────────────────────────────────
/// Runs after validation at the end of every epoch, in the order
/// the callbacks were given to `fit`.
pub trait EpochCallback {
    fn on_epoch_end(
        &mut self,
        metrics: &EpochMetrics,
        control: &mut TrainingControl,
        weights: &dyn WeightStore,
    ) -> Result<()>;
}

// ─── Classifier ───────────────────────────────────────────────────────────────
pub trait Classifier: WeightStore {
    fn compile(&mut self, settings: CompileSettings) -> Result<()>;

    /// Train for `plan.epochs` epochs of `plan.steps_per_epoch` batches.
    /// Fails if `compile` has not been called.
    fn fit(
        &mut self,
        source: &mut dyn BatchSource,
        plan: FitPlan,
        validation: Validation<'_>,
        callbacks: &mut [Box<dyn EpochCallback>],
    ) -> Result<History>;

    /// Class probabilities for every image, `batch_size` rows at a time.
    fn predict(&self, images: &ImageBlock, batch_size: usize) -> Result<ProbabilityMatrix>;
}
