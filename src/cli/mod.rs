// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`   - full training run ending in a submission
//   2. `submit`  - submission from a saved checkpoint
//   3. `preview` - sample grid of one generated batch
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PreviewArgs, SubmitArgs, TrainArgs};

use crate::data::rasterizer::RenderOptions;

/// The main CLI struct. clap reads the fields and generates
/// argument parsing code via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "doodle-classifier",
    version,
    about = "Train a convolutional doodle classifier on stroke shards and write a MAP@3 submission."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Submit(args)  => run_submit(args),
            Commands::Preview(args) => run_preview(args),
        }
    }
}

/// Handles the `train` subcommand.
/// Converts CLI args into a TrainConfig and hands off to Layer 2.
fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on shards in: {}", args.shard_dir);
    let summary = TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Map3 {:.4}, submission '{}'", summary.map3, summary.submission.display());
    Ok(())
}

fn run_submit(args: SubmitArgs) -> Result<()> {
    use crate::application::submit_use_case::SubmitUseCase;

    let summary = SubmitUseCase::new(args.run_dir, args.input_dir).execute()?;
    println!("Submission written to '{}'", summary.submission.display());
    Ok(())
}

fn run_preview(args: PreviewArgs) -> Result<()> {
    use crate::application::preview_use_case::{PreviewConfig, PreviewUseCase};

    let config = PreviewConfig {
        input_dir: args.input_dir,
        shard_dir: args.shard_dir,
        shard:     args.shard,
        render:    RenderOptions::new(args.image_size, args.line_width, args.time_color)?,
        grid:      args.grid,
        seed:      args.seed,
        output:    args.output,
    };
    let path = PreviewUseCase::new(config).execute()?;
    println!("Preview saved to '{}'", path.display());
    Ok(())
}
