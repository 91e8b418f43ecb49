// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Everything that writes run artefacts to disk:
//
//   checkpoint.rs - Model weights (CompactRecorder) and the
//                   TrainConfig JSON that `submit` rebuilds
//                   the model from
//
//   metrics.rs    - Epoch metrics CSV, run as an epoch callback
//
//   figures.rs    - Sample grid PNG and the history plot
//
//   submission.rs - The key_id,word CSV with the top-3 names
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Sample grid and history plot
pub mod figures;

/// Submission CSV writer
pub mod submission;
