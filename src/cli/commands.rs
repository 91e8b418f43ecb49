// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `submit` and `preview`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{ArgAction, Args, Subcommand};

use crate::application::train_use_case::TrainConfig;

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train on the shards, then score validation and write a submission
    Train(TrainArgs),

    /// Write a submission from the best weights of a finished run
    Submit(SubmitArgs),

    /// Render one generated batch as a PNG grid
    Preview(PreviewArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding train_simplified/ and test_simplified.csv
    #[arg(long, default_value = "input/quickdraw-doodle-recognition")]
    pub input_dir: String,

    /// Directory holding the train_k{N}.csv.gz shards
    #[arg(long, default_value = "input/shuffle-csvs")]
    pub shard_dir: String,

    /// Where weights, logs, figures and the submission are written
    #[arg(long, default_value = "output")]
    pub output_dir: String,

    /// Number of shards; the last one is used for validation
    #[arg(long, default_value_t = 100)]
    pub num_shards: u32,

    /// Side of the square input images in pixels
    #[arg(long, default_value_t = 64)]
    pub image_size: u32,

    /// Drawings per training step
    #[arg(long, default_value_t = 680)]
    pub batch_size: usize,

    /// Training steps per epoch
    #[arg(long, default_value_t = 800)]
    pub steps_per_epoch: usize,

    #[arg(long, default_value_t = 16)]
    pub epochs: usize,

    /// Initial Adam learning rate
    #[arg(long, default_value_t = 0.002)]
    pub lr: f64,

    /// Stroke thickness on the 256x256 canvas
    #[arg(long, default_value_t = 6)]
    pub line_width: u32,

    /// Fade later strokes (`--time-color false` draws all at full intensity)
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub time_color: bool,

    /// Rows taken from the validation shard
    #[arg(long, default_value_t = 34_000)]
    pub valid_rows: usize,

    /// Rows per forward pass when predicting
    #[arg(long, default_value_t = 128)]
    pub predict_batch_size: usize,

    /// Seed for the shard shuffles
    #[arg(long, default_value_t = 1987)]
    pub seed: u64,

    /// Learning-rate multiplier on a validation plateau
    #[arg(long, default_value_t = 0.75)]
    pub plateau_factor: f64,

    /// Epochs without improvement before the rate drops
    #[arg(long, default_value_t = 3)]
    pub plateau_patience: usize,

    /// Smallest val_top_3_accuracy gain that counts as improvement
    #[arg(long, default_value_t = 0.001)]
    pub plateau_min_delta: f64,

    /// Floor for the learning rate
    #[arg(long, default_value_t = 1e-5)]
    pub min_lr: f64,

    /// Channels of the first conv block (doubled per block)
    #[arg(long, default_value_t = 32)]
    pub base_channels: usize,

    /// Dropout probability before the classification head
    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 -
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            input_dir:          a.input_dir,
            shard_dir:          a.shard_dir,
            output_dir:         a.output_dir,
            num_shards:         a.num_shards,
            image_size:         a.image_size,
            batch_size:         a.batch_size,
            steps_per_epoch:    a.steps_per_epoch,
            epochs:             a.epochs,
            lr:                 a.lr,
            line_width:         a.line_width,
            time_color:         a.time_color,
            valid_rows:         a.valid_rows,
            predict_batch_size: a.predict_batch_size,
            seed:               a.seed,
            plateau_factor:     a.plateau_factor,
            plateau_patience:   a.plateau_patience,
            plateau_min_delta:  a.plateau_min_delta,
            min_lr:             a.min_lr,
            base_channels:      a.base_channels,
            dropout:            a.dropout,
        }
    }
}

/// All arguments for the `submit` command
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Output directory of a finished `train` run
    #[arg(long, default_value = "output")]
    pub run_dir: PathBuf,

    /// Use this input directory instead of the one the run recorded
    #[arg(long)]
    pub input_dir: Option<String>,
}

/// All arguments for the `preview` command
#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[arg(long, default_value = "input/quickdraw-doodle-recognition")]
    pub input_dir: String,

    #[arg(long, default_value = "input/shuffle-csvs")]
    pub shard_dir: String,

    /// Shard to draw the batch from
    #[arg(long, default_value_t = 0)]
    pub shard: u32,

    #[arg(long, default_value_t = 64)]
    pub image_size: u32,

    #[arg(long, default_value_t = 6)]
    pub line_width: u32,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub time_color: bool,

    /// Tiles per side
    #[arg(long, default_value_t = 8)]
    pub grid: usize,

    #[arg(long, default_value_t = 1987)]
    pub seed: u64,

    #[arg(long, default_value = "gs.png")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let cli = TestCli::parse_from(["doodle-classifier", "train"]);
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = TrainConfig::from(args);
        let default = TrainConfig::default();

        assert_eq!(cfg.batch_size, default.batch_size);
        assert_eq!(cfg.lr, default.lr);
        assert_eq!(cfg.num_shards, default.num_shards);
        assert_eq!(cfg.seed, default.seed);
        assert_eq!(cfg.base_channels, default.base_channels);
        assert!(cfg.time_color);
    }

    #[test]
    fn test_time_color_can_be_switched_off() {
        let cli = TestCli::parse_from(["doodle-classifier", "train", "--time-color", "false", "--epochs", "2"]);
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        assert!(!args.time_color);
        assert_eq!(args.epochs, 2);
    }
}
