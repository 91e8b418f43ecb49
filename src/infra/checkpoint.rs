// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// What lives in the output directory:
//   1. model.mpk          - best weights so far (BestCheckpoint
//                           overwrites it on every improvement)
//   2. train_config.json  - the TrainConfig of the run
//
// The config is what lets `submit` rebuild the exact network
// (image size, class count, width) before loading the weights:
// loading fails if the architecture does not match the record.
//
// Burn's CompactRecorder:
//   - Serialises model parameters to MessagePack format
//   - Stores floats at half precision
//   - Sets the file extension itself
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::DoodleNet;

const WEIGHTS_FILE: &str = "model.mpk";
const CONFIG_FILE: &str = "train_config.json";

/// Write the parameters of `model` to `path`.
pub fn save_model<B: Backend>(model: &DoodleNet<B>, path: &Path) -> Result<()> {
    CompactRecorder::new()
        .record(model.clone().into_record(), path.to_path_buf())
        .with_context(|| format!("Failed to save weights to '{}'", path.display()))?;
    tracing::debug!("Saved weights to '{}'", path.display());
    Ok(())
}

/// Load the parameters at `path` into `model`, which must have the
/// same architecture as the saved one.
pub fn load_model<B: Backend>(
    model:  DoodleNet<B>,
    path:   &Path,
    device: &B::Device,
) -> Result<DoodleNet<B>> {
    let record = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .with_context(|| {
            format!("Cannot load weights '{}'. Have you trained the model first?", path.display())
        })?;
    tracing::info!("Loaded weights from '{}'", path.display());
    Ok(model.load_record(record))
}

/// Knows where a run keeps its weights and configuration.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where BestCheckpoint writes and `submit` reads the weights.
    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_FILE)
    }

    /// Save the training configuration to JSON.
    /// Must run before training so a later `submit` can rebuild the model.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'submit'.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }
}
