// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything between files on disk and normalised image blocks.
//
//   train_k{N}.csv.gz shards
//       │
//       ▼
//   ShardReader       → streams rows in fixed-size chunks
//       │
//       ▼
//   Drawing::from_str → decodes the stroke JSON
//       │
//       ▼
//   rasterize         → strokes to a size x size grayscale image
//       │
//       ▼
//   BatchGenerator    → endless, shard-shuffled training batches
//
// Validation and test tables skip the streaming part: the
// loader reads them whole and rasterizes them in one go.
//
// Nothing in this layer knows about Burn; it produces the plain
// blocks defined in the domain layer.

/// Stroke rendering and pixel normalisation
pub mod rasterizer;

/// Gzip CSV shard streaming
pub mod shard;

/// Infinite shard-shuffling batch generator
pub mod generator;

/// Eager table loading and category discovery
pub mod loader;
