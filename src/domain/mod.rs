// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust types and traits that describe the problem:
// drawings, categories, image/label blocks, ranking metrics,
// training history and the classifier contract.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain structs, enums, traits and pure functions
//
// Keeping it pure means every metric and invariant here can be
// unit tested without a tensor backend or a dataset on disk.

/// Stroke lists and their JSON text decoding
pub mod drawing;

/// Id <-> category name table
pub mod catalog;

/// Image, label and probability containers
pub mod blocks;

/// MAP@k, top-k ids and top-k accuracy
pub mod ranking;

/// Per-epoch metrics and monitors
pub mod history;

/// Classifier, batch source and callback contracts
pub mod traits;
