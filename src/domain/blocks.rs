// ============================================================
// Layer 3 - Image, Label and Probability Blocks
// ============================================================
// Framework-neutral containers that travel between the data
// pipeline and the model layer. They hold plain Vec<f32> so
// the pipeline can be tested without a tensor backend; the
// ML layer turns them into Burn tensors at the last moment.
//
// Layout of an ImageBlock with `count` images of `size` x `size`:
//
//   data[(n * size + y) * size + x]
//
// A single channel makes NHWC and NCHW the same layout, so the
// model can view it as [count, 1, size, size] without copying.

use anyhow::{bail, Result};

/// Normalised single-channel images stacked row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    size: usize,
    data: Vec<f32>,
}

impl ImageBlock {
    pub fn new(size: usize, data: Vec<f32>) -> Result<Self> {
        if size == 0 {
            bail!("image size must be positive");
        }
        let per_image = size * size;
        if data.len() % per_image != 0 {
            bail!(
                "image data length {} is not a multiple of {}x{}",
                data.len(),
                size,
                size
            );
        }
        Ok(Self { size, data })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.data.len() / (self.size * self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Pixels of image `index`, or None when out of range.
    pub fn image(&self, index: usize) -> Option<&[f32]> {
        let per_image = self.size * self.size;
        let start = index.checked_mul(per_image)?;
        self.data.get(start..start + per_image)
    }

    /// Contiguous pixels of images `start..end`.
    pub fn rows(&self, start: usize, end: usize) -> &[f32] {
        let per_image = self.size * self.size;
        &self.data[start * per_image..end * per_image]
    }

    /// [count, height, width, channels], the shape reported in logs.
    pub fn shape(&self) -> [usize; 4] {
        [self.len(), self.size, self.size, 1]
    }

    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Class ids with their one-hot encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelBlock {
    num_classes: usize,
    ids: Vec<usize>,
}

impl LabelBlock {
    /// Fails when an id does not fit `num_classes`.
    pub fn new(ids: Vec<usize>, num_classes: usize) -> Result<Self> {
        if let Some(bad) = ids.iter().find(|&&id| id >= num_classes) {
            bail!("label {} is out of range for {} classes", bad, num_classes);
        }
        Ok(Self { num_classes, ids })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// One-hot rows for labels `start..end`, flattened.
    pub fn one_hot(&self, start: usize, end: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; (end - start) * self.num_classes];
        for (row, &id) in self.ids[start..end].iter().enumerate() {
            out[row * self.num_classes + id] = 1.0;
        }
        out
    }

    /// Labels as single-element "actual" sets for MAP@k.
    pub fn as_actuals(&self) -> Vec<[usize; 1]> {
        self.ids.iter().map(|&id| [id]).collect()
    }
}

/// One training step worth of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub images: ImageBlock,
    pub labels: LabelBlock,
}

impl Batch {
    pub fn new(images: ImageBlock, labels: LabelBlock) -> Result<Self> {
        if images.len() != labels.len() {
            bail!(
                "batch has {} images but {} labels",
                images.len(),
                labels.len()
            );
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Softmax outputs, one row of `num_classes` values per example.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMatrix {
    num_classes: usize,
    values: Vec<f32>,
}

impl ProbabilityMatrix {
    pub fn new(num_classes: usize, values: Vec<f32>) -> Result<Self> {
        if num_classes == 0 || values.len() % num_classes != 0 {
            bail!(
                "{} probabilities cannot be split into rows of {}",
                values.len(),
                num_classes
            );
        }
        Ok(Self { num_classes, values })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn len(&self) -> usize {
        self.values.len() / self.num_classes
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.values.chunks(self.num_classes)
    }

    /// Top-k category ids per row, best first.
    pub fn top_k(&self, k: usize) -> Vec<Vec<usize>> {
        self.rows()
            .map(|row| crate::domain::ranking::top_k_ids(row, k))
            .collect()
    }
}
