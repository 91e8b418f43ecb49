// ============================================================
// Layer 5 - Doodle Batcher
// ============================================================
// Converts the framework-neutral blocks from the data layer into
// Burn tensors on a given device.
//
//   ImageBlock rows [start, end)  →  images  [n, 1, size, size]
//   LabelBlock rows [start, end)  →  targets [n, num_classes]  (one-hot)
//
// Because an ImageBlock holds a single channel, its flat buffer
// is already in NCHW order and can be handed to TensorData as-is.
//
// B is the Burn Backend (Autodiff<Wgpu> for training, the inner
// backend for evaluation), so the same batcher serves both.

use burn::tensor::{backend::Backend, Tensor, TensorData};

use crate::domain::blocks::{ImageBlock, LabelBlock};

/// A slice of a batch, ready for the forward pass.
#[derive(Debug, Clone)]
pub struct DoodleBatch<B: Backend> {
    /// Shape: [n, 1, size, size]
    pub images: Tensor<B, 4>,
    /// Shape: [n, num_classes]
    pub targets: Tensor<B, 2>,
}

/// Holds the target device so tensors land on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct DoodleBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> DoodleBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Images `start..end` as an NCHW tensor.
    pub fn images(&self, block: &ImageBlock, start: usize, end: usize) -> Tensor<B, 4> {
        let size = block.size();
        let data = TensorData::new(block.rows(start, end).to_vec(), [end - start, 1, size, size]);
        Tensor::<B, 4>::from_data(data, &self.device)
    }

    /// One-hot targets for labels `start..end`.
    pub fn targets(&self, labels: &LabelBlock, start: usize, end: usize) -> Tensor<B, 2> {
        let data = TensorData::new(labels.one_hot(start, end), [end - start, labels.num_classes()]);
        Tensor::<B, 2>::from_data(data, &self.device)
    }

    pub fn batch(
        &self,
        images: &ImageBlock,
        labels: &LabelBlock,
        start: usize,
        end: usize,
    ) -> DoodleBatch<B> {
        DoodleBatch {
            images: self.images(images, start, end),
            targets: self.targets(labels, start, end),
        }
    }
}
