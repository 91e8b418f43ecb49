// ============================================================
// Layer 4 - Batch Generator
// ============================================================
// An endless supply of training batches streamed from shards.
//
//   pass 1:  shuffle [0..N) -> [3, 0, 2, 1]
//            shard 3: chunk, chunk, ..., short chunk
//            shard 0: chunk, chunk, ...
//            ...
//   pass 2:  reshuffle     -> [1, 3, 0, 2]
//            ...
//
// Within a shard, rows come out in file order in chunks of
// `batch_size`; the last chunk of a shard may be shorter. Every
// chunk is decoded, rasterized, normalised to [-1, 1] and its
// labels one-hot encoded against the fixed class count.
//
// The generator never ends on its own. It is driven by explicit
// `next_batch()` calls from a single consumer; starting over
// means building a new generator. Decoding or I/O failures are
// returned to the caller immediately (fail fast).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::rasterizer::{normalize_pixel, rasterize, RenderOptions};
use crate::data::shard::{shard_path, ShardReader, ShardRow};
use crate::domain::blocks::{Batch, ImageBlock, LabelBlock};
use crate::domain::drawing::Drawing;
use crate::domain::traits::BatchSource;

/// Static description of what the generator streams.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub shard_dir: PathBuf,
    pub shard_ids: Vec<u32>,
    pub batch_size: usize,
    pub num_classes: usize,
    pub render: RenderOptions,
    /// Seed for the shard-order shuffles
    pub seed: u64,
}

pub struct BatchGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    /// Shard visiting order of the current pass
    order: Vec<u32>,
    /// Index into `order` of the shard being read
    cursor: usize,
    reader: Option<ShardReader>,
    /// Rows yielded since the current pass started
    rows_this_pass: usize,
    passes: usize,
}

impl BatchGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        if config.shard_ids.is_empty() {
            bail!("batch generator needs at least one shard");
        }
        if config.batch_size == 0 {
            bail!("batch size must be positive");
        }
        if config.num_classes == 0 {
            bail!("class count must be positive");
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order = config.shard_ids.clone();
        order.shuffle(&mut rng);
        tracing::debug!("Pass 1 shard order: {:?}", order);

        Ok(Self {
            config,
            rng,
            order,
            cursor: 0,
            reader: None,
            rows_this_pass: 0,
            passes: 0,
        })
    }

    /// Number of full passes completed so far.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Pull the next batch, opening and reshuffling shards as needed.
    pub fn next_batch(&mut self) -> Result<Batch> {
        loop {
            if self.reader.is_none() {
                self.open_next_shard()?;
            }

            let Some(reader) = self.reader.as_mut() else {
                continue;
            };
            let first_row = reader.next_row();
            match reader.next_chunk(self.config.batch_size)? {
                Some(rows) => {
                    let path = reader.path().to_path_buf();
                    self.rows_this_pass += rows.len();
                    return rows_to_batch(&rows, first_row, &self.config.render, self.config.num_classes)
                        .with_context(|| format!("Cannot build batch from '{}'", path.display()));
                }
                None => {
                    self.reader = None;
                    self.cursor += 1;
                }
            }
        }
    }

    fn open_next_shard(&mut self) -> Result<()> {
        if self.cursor == self.order.len() {
            if self.rows_this_pass == 0 {
                bail!(
                    "no rows found in any of the {} shards under '{}'",
                    self.order.len(),
                    self.config.shard_dir.display()
                );
            }
            self.passes += 1;
            self.rows_this_pass = 0;
            self.cursor = 0;
            self.order.shuffle(&mut self.rng);
            tracing::debug!("Pass {} shard order: {:?}", self.passes + 1, self.order);
        }

        let k = self.order[self.cursor];
        let path = shard_path(&self.config.shard_dir, k);
        self.reader = Some(ShardReader::open(path)?);
        Ok(())
    }
}

impl BatchSource for BatchGenerator {
    fn next_batch(&mut self) -> Result<Batch> {
        BatchGenerator::next_batch(self)
    }
}

/// Never returns None; every item is the outcome of one pull.
impl Iterator for BatchGenerator {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// Decode, rasterize and normalise a chunk of rows; `first_row` is
/// the 1-based row number of `rows[0]` in its file.
pub fn rows_to_batch(
    rows: &[ShardRow],
    first_row: usize,
    render: &RenderOptions,
    num_classes: usize,
) -> Result<Batch> {
    let drawings: Vec<&str> = rows.iter().map(|r| r.drawing.as_str()).collect();
    let images = rasterize_block(&drawings, first_row, render)?;
    let labels = LabelBlock::new(rows.iter().map(|r| r.y).collect(), num_classes)?;
    Batch::new(images, labels)
}

/// Rasterize every JSON-encoded drawing into one normalised block.
/// Decode errors name the row as `first_row + index`.
pub fn rasterize_block<S: AsRef<str>>(
    drawings: &[S],
    first_row: usize,
    render: &RenderOptions,
) -> Result<ImageBlock> {
    let size = render.size as usize;
    let mut data = Vec::with_capacity(drawings.len() * size * size);

    for (i, text) in drawings.iter().enumerate() {
        let drawing: Drawing = text
            .as_ref()
            .parse()
            .with_context(|| format!("Cannot decode drawing in row {}", first_row + i))?;
        let img = rasterize(&drawing, render);
        data.extend(img.as_raw().iter().copied().map(normalize_pixel));
    }

    ImageBlock::new(size, data)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::data::shard::test_support::write_shard;

    const LINE: &str = "[[[0, 200], [0, 200]]]";

    fn config(dir: &std::path::Path, shard_ids: Vec<u32>, batch_size: usize) -> GeneratorConfig {
        GeneratorConfig {
            shard_dir: dir.to_path_buf(),
            shard_ids,
            batch_size,
            num_classes: 100,
            render: RenderOptions::new(8, 6, true).unwrap(),
            seed: 1987,
        }
    }

    /// Shard k holds rows labelled k*10 .. k*10 + len.
    fn write_shards(dir: &std::path::Path, lens: &[usize]) {
        for (k, &len) in lens.iter().enumerate() {
            let rows: Vec<(&str, usize)> = (0..len).map(|i| (LINE, k * 10 + i)).collect();
            write_shard(dir, k as u32, &rows);
        }
    }

    #[test]
    fn test_one_pass_yields_every_row_once() {
        let tmp = tempfile::tempdir().unwrap();
        let lens = [5, 3, 7];
        write_shards(tmp.path(), &lens);

        let mut gen = BatchGenerator::new(config(tmp.path(), vec![0, 1, 2], 2)).unwrap();
        let mut seen: HashMap<usize, usize> = HashMap::new();
        // ceil(5/2) + ceil(3/2) + ceil(7/2) chunks make one pass
        for _ in 0..(3 + 2 + 4) {
            let batch = gen.next_batch().unwrap();
            assert!(batch.len() <= 2);
            assert_eq!(batch.images.size(), 8);
            for &y in batch.labels.ids() {
                *seen.entry(y).or_default() += 1;
            }
        }
        assert_eq!(seen.values().sum::<usize>(), lens.iter().sum::<usize>());
        assert!(seen.values().all(|&n| n == 1));
        assert_eq!(gen.passes(), 0);

        // next pull wraps around
        gen.next_batch().unwrap();
        assert_eq!(gen.passes(), 1);
    }

    #[test]
    fn test_rows_within_shard_keep_file_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_shards(tmp.path(), &[4]);
        let mut gen = BatchGenerator::new(config(tmp.path(), vec![0], 3)).unwrap();
        assert_eq!(gen.next_batch().unwrap().labels.ids(), &[0, 1, 2]);
        assert_eq!(gen.next_batch().unwrap().labels.ids(), &[3]);
        assert_eq!(gen.next_batch().unwrap().labels.ids(), &[0, 1, 2]);
    }

    #[test]
    fn test_shard_order_reshuffles_between_passes() {
        let tmp = tempfile::tempdir().unwrap();
        let ids: Vec<u32> = (0..6).collect();
        write_shards(tmp.path(), &[1; 6]);

        let mut gen = BatchGenerator::new(config(tmp.path(), ids.clone(), 1)).unwrap();
        let mut orders = Vec::new();
        for _ in 0..4 {
            let mut order = Vec::new();
            for _ in 0..6 {
                let batch = gen.next_batch().unwrap();
                order.push(batch.labels.ids()[0] / 10);
            }
            let mut sorted = order.clone();
            sorted.sort();
            assert_eq!(sorted, vec![0, 1, 2, 3, 4, 5]);
            orders.push(order);
        }
        // 720 permutations: four identical passes in a row would be a bug
        assert!(orders.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_same_seed_same_stream() {
        let tmp = tempfile::tempdir().unwrap();
        write_shards(tmp.path(), &[2, 2, 2]);
        let take = |seed| {
            let mut cfg = config(tmp.path(), vec![0, 1, 2], 2);
            cfg.seed = seed;
            let mut gen = BatchGenerator::new(cfg).unwrap();
            (0..6)
                .map(|_| gen.next_batch().unwrap().labels.ids().to_vec())
                .collect::<Vec<_>>()
        };
        assert_eq!(take(7), take(7));
    }

    #[test]
    fn test_images_are_normalised() {
        let tmp = tempfile::tempdir().unwrap();
        write_shards(tmp.path(), &[2]);
        let mut gen = BatchGenerator::new(config(tmp.path(), vec![0], 2)).unwrap();
        let batch = gen.next_batch().unwrap();
        assert_eq!(batch.images.data().len(), 2 * 8 * 8);
        assert!(batch.images.data().iter().all(|v| (-1.0..=1.0).contains(v)));
        assert!(batch.images.data().iter().any(|&v| v > -1.0));
        assert_eq!(batch.labels.one_hot(0, 1)[0], 1.0);
    }

    #[test]
    fn test_missing_shard_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write_shards(tmp.path(), &[2]);
        let mut gen = BatchGenerator::new(config(tmp.path(), vec![0, 9], 4)).unwrap();
        let results: Vec<bool> = (0..2).map(|_| gen.next_batch().is_ok()).collect();
        assert!(results.contains(&false));
    }

    #[test]
    fn test_malformed_drawing_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write_shard(
            tmp.path(),
            0,
            &[(LINE, 0), (LINE, 1), (LINE, 2), ("[[[1, 2], [3]]]", 3), (LINE, 4)],
        );
        let mut gen = BatchGenerator::new(config(tmp.path(), vec![0], 2)).unwrap();
        assert!(gen.next_batch().is_ok());
        // Second chunk holds rows 3 and 4; the bad drawing is row 4
        let err = format!("{:#}", gen.next_batch().unwrap_err());
        assert!(err.contains("row 4"), "{err}");
        assert!(err.contains("train_k0.csv.gz"), "{err}");
    }

    #[test]
    fn test_label_outside_class_count_fails() {
        let tmp = tempfile::tempdir().unwrap();
        write_shard(tmp.path(), 0, &[(LINE, 100)]);
        let mut gen = BatchGenerator::new(config(tmp.path(), vec![0], 2)).unwrap();
        assert!(gen.next_batch().is_err());
    }

    #[test]
    fn test_all_empty_shards_error_instead_of_spinning() {
        let tmp = tempfile::tempdir().unwrap();
        write_shards(tmp.path(), &[0, 0]);
        let mut gen = BatchGenerator::new(config(tmp.path(), vec![0, 1], 2)).unwrap();
        assert!(gen.next_batch().is_err());
    }

    #[test]
    fn test_iterator_never_ends() {
        let tmp = tempfile::tempdir().unwrap();
        write_shards(tmp.path(), &[1]);
        let gen = BatchGenerator::new(config(tmp.path(), vec![0], 4)).unwrap();
        assert_eq!(gen.take(5).filter(|b| b.is_ok()).count(), 5);
    }
}
