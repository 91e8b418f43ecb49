// ============================================================
// Layer 2 - PreviewUseCase
// ============================================================
// Renders one generated batch to a PNG grid so rendering options
// (size, line width, time colouring) can be checked by eye
// before committing to a long training run.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::data::{
    generator::{BatchGenerator, GeneratorConfig},
    loader::load_catalog,
    rasterizer::RenderOptions,
};
use crate::infra::figures::save_sample_grid;

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub input_dir: String,
    pub shard_dir: String,
    pub shard:     u32,
    pub render:    RenderOptions,
    pub grid:      usize,
    pub seed:      u64,
    pub output:    PathBuf,
}

pub struct PreviewUseCase {
    config: PreviewConfig,
}

impl PreviewUseCase {
    pub fn new(config: PreviewConfig) -> Self {
        Self { config }
    }

    /// Write the grid and return its path.
    pub fn execute(&self) -> Result<PathBuf> {
        let cfg = &self.config;
        let catalog = load_catalog(&Path::new(&cfg.input_dir).join("train_simplified"))?;

        let mut generator = BatchGenerator::new(GeneratorConfig {
            shard_dir:   PathBuf::from(&cfg.shard_dir),
            shard_ids:   vec![cfg.shard],
            batch_size:  cfg.grid * cfg.grid,
            num_classes: catalog.len(),
            render:      cfg.render,
            seed:        cfg.seed,
        })?;
        let batch = generator.next_batch()?;

        if let Some(parent) = cfg.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        save_sample_grid(&batch.images, cfg.grid, &cfg.output)?;

        // Row-major, same order as the tiles
        let names: Vec<&str> = batch
            .labels
            .ids()
            .iter()
            .map(|&id| catalog.name(id).unwrap_or("?"))
            .collect();
        tracing::info!("Preview categories: {}", names.join(", "));
        Ok(cfg.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::tests::tiny_run;

    #[test]
    fn test_preview_writes_grid() {
        let tmp = tempfile::tempdir().unwrap();
        let run = tiny_run(tmp.path());
        let output = tmp.path().join("preview").join("grid.png");

        let path = PreviewUseCase::new(PreviewConfig {
            input_dir: run.input_dir,
            shard_dir: run.shard_dir,
            shard:     0,
            render:    RenderOptions::new(16, 3, true).unwrap(),
            grid:      2,
            seed:      7,
            output:    output.clone(),
        })
        .execute()
        .unwrap();

        assert_eq!(path, output);
        let img = image::open(&path).unwrap();
        assert!(img.width() >= 32);
    }
}
