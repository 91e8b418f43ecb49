// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// This layer holds the Burn implementation of the Classifier
// trait. Apart from weight files in infra/checkpoint.rs, it is
// the only place that builds tensors.
//
// What's in this layer:
//
//   model.rs     - The convolutional doodle network
//                  • three conv3x3/relu/maxpool blocks
//                  • global average pooling
//                  • dropout + linear head over the categories
//                  • categorical cross-entropy on one-hot targets
//
//   batcher.rs   - ImageBlock / LabelBlock rows → Burn tensors
//
//   trainer.rs   - BurnClassifier: compile, fit (Adam steps,
//                  per-epoch validation, callbacks) and predict
//
//   callbacks.rs - Learning-rate plateau decay and best-weight
//                  checkpointing run at the end of each epoch
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Convolutional classifier architecture
pub mod model;

/// Tensor conversion of image and label blocks
pub mod batcher;

/// Burn implementation of the Classifier trait
pub mod trainer;

/// Plateau decay and best-checkpoint callbacks
pub mod callbacks;
