// ============================================================
// Layer 5 - Doodle Classifier Network
// ============================================================
// A small VGG-style convolutional network, trained from scratch
// (no pre-trained weights):
//
//   [n, 1, S, S]
//     → ConvBlock(1 → c)     conv3x3, relu, conv3x3, relu, maxpool2   S/2
//     → ConvBlock(c → 2c)                                             S/4
//     → ConvBlock(2c → 4c)                                            S/8
//     → global average pool  [n, 4c]
//     → dropout → linear     [n, num_classes]   (logits)
//
// Three 2x poolings need an input of at least 8x8.
//
// Reference: Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{log_softmax, relu},
};

/// Number of 2x downsampling blocks.
const NUM_BLOCKS: usize = 3;

/// Smallest input side the network accepts.
pub const MIN_INPUT_SIZE: usize = 1 << NUM_BLOCKS;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct DoodleNetConfig {
    pub num_classes:   usize,
    pub input_size:    usize,
    pub base_channels: usize,
    pub dropout:       f64,
}

impl DoodleNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DoodleNet<B> {
        let mut blocks = Vec::with_capacity(NUM_BLOCKS);
        let mut channels_in = 1;
        let mut channels_out = self.base_channels;
        for _ in 0..NUM_BLOCKS {
            blocks.push(ConvBlock::new(channels_in, channels_out, device));
            channels_in = channels_out;
            channels_out *= 2;
        }

        DoodleNet {
            blocks,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout:     DropoutConfig::new(self.dropout).init(),
            head:        LinearConfig::new(channels_in, self.num_classes).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv_a: Conv2d<B>,
    pub conv_b: Conv2d<B>,
    pub pool:   MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels_in: usize, channels_out: usize, device: &B::Device) -> Self {
        let conv = |c_in, c_out| {
            Conv2dConfig::new([c_in, c_out], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };
        Self {
            conv_a: conv(channels_in, channels_out),
            conv_b: conv(channels_out, channels_out),
            pool:   MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv_a.forward(x));
        let x = relu(self.conv_b.forward(x));
        self.pool.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct DoodleNet<B: Backend> {
    pub blocks:      Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub dropout:     Dropout,
    pub head:        Linear<B>,
}

impl<B: Backend> DoodleNet<B> {
    /// images: [n, 1, S, S] → logits: [n, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = images;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.global_pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);
        self.head.forward(self.dropout.forward(x))
    }

    /// Mean categorical cross-entropy plus the logits it was computed from.
    pub fn forward_loss(
        &self,
        images:  Tensor<B, 4>,
        targets: Tensor<B, 2>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(images);
        let loss = categorical_cross_entropy(logits.clone(), targets);
        (loss, logits)
    }
}

/// -mean(sum(targets * log_softmax(logits))) over the batch.
/// `targets` are one-hot (or any distribution) rows.
pub fn categorical_cross_entropy<B: Backend>(
    logits:  Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    (targets * log_probs).sum_dim(1).mean().neg()
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = DoodleNetConfig::new(7, 16, 4, 0.0).init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([3, 1, 16, 16], &device);
        assert_eq!(model.forward(images).dims(), [3, 7]);
    }

    #[test]
    fn test_smallest_input() {
        let device = Default::default();
        let model = DoodleNetConfig::new(2, MIN_INPUT_SIZE, 2, 0.0).init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::ones([1, 1, MIN_INPUT_SIZE, MIN_INPUT_SIZE], &device);
        assert_eq!(model.forward(images).dims(), [1, 2]);
    }

    #[test]
    fn test_cross_entropy_of_uniform_logits() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 4], &device);
        let targets = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0], [2, 4]),
            &device,
        );
        let loss: f32 = categorical_cross_entropy(logits, targets).into_scalar().elem();
        assert!((loss - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_cross_entropy_rewards_confident_hits() {
        let device = Default::default();
        let targets = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.0f32, 1.0], [1, 2]),
            &device,
        );
        let good = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![-3.0f32, 3.0], [1, 2]), &device);
        let bad = Tensor::<TestBackend, 2>::from_data(TensorData::new(vec![3.0f32, -3.0], [1, 2]), &device);
        let good: f32 = categorical_cross_entropy(good, targets.clone()).into_scalar().elem();
        let bad: f32 = categorical_cross_entropy(bad, targets).into_scalar().elem();
        assert!(good < bad);
    }
}
