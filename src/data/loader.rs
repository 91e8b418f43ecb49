// ============================================================
// Layer 4 - Fixed Table Loader
// ============================================================
// Validation and test data are small enough to live in memory.
// They are read once, eagerly, and rasterized into a single
// ImageBlock (no chunking):
//
//   validation: first N rows of the held-out shard  (drawing, y)
//   test:       test_simplified.csv                 (key_id, drawing)
//
// The caller decides how many rows to keep; the loader only
// logs the block size so memory use is visible in the output.
//
// The category catalog is also loaded here, from the directory
// of per-category source files.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::data::generator::rasterize_block;
use crate::data::rasterizer::RenderOptions;
use crate::data::shard::open_csv;
use crate::domain::blocks::{ImageBlock, LabelBlock};
use crate::domain::catalog::CategoryCatalog;

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    key_id: Option<String>,
    drawing: String,
    #[serde(default)]
    y: Option<usize>,
}

/// Rows of a CSV table kept as raw text until rasterized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawingTable {
    pub key_ids: Vec<String>,
    pub drawings: Vec<String>,
    /// Present only when every row carried a `y` column value
    pub labels: Option<Vec<usize>>,
}

impl DrawingTable {
    /// Read a plain or gzip CSV, keeping at most `row_cap` rows.
    pub fn read_csv(path: &Path, row_cap: Option<usize>) -> Result<Self> {
        let mut reader = open_csv(path)?;
        let mut table = DrawingTable::default();
        let mut labels = Vec::new();
        let mut all_labelled = true;

        for (i, row) in reader.deserialize::<TableRow>().enumerate() {
            if row_cap.is_some_and(|cap| i >= cap) {
                break;
            }
            let row = row.with_context(|| format!("Bad row {} in '{}'", i + 1, path.display()))?;
            table.key_ids.push(row.key_id.unwrap_or_default());
            table.drawings.push(row.drawing);
            match row.y {
                Some(y) => labels.push(y),
                None => all_labelled = false,
            }
        }

        if all_labelled && !table.drawings.is_empty() {
            table.labels = Some(labels);
        }

        tracing::info!("Read {} rows from '{}'", table.len(), path.display());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.drawings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawings.is_empty()
    }
}

/// Rasterize a whole table at once.
///
/// Returns the image block and, when the table is labelled, the
/// matching label block.
pub fn load_fixed(
    table: &DrawingTable,
    render: &RenderOptions,
    num_classes: usize,
) -> Result<(ImageBlock, Option<LabelBlock>)> {
    let images = rasterize_block(&table.drawings, 1, render)?;
    let labels = match &table.labels {
        Some(ids) => Some(LabelBlock::new(ids.clone(), num_classes)?),
        None => None,
    };

    tracing::info!(
        "Image block {:?}, labels {:?}, memory {:.2} GB",
        images.shape(),
        labels.as_ref().map(|l| [l.len(), l.num_classes()]),
        images.byte_size() as f64 / 1024f64.powi(3),
    );

    Ok((images, labels))
}

/// List the per-category source files and build the catalog.
pub fn load_catalog(dir: &Path) -> Result<CategoryCatalog> {
    let mut file_names = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read category directory '{}'", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            file_names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    let catalog = CategoryCatalog::from_file_names(file_names);
    if catalog.is_empty() {
        bail!("no category files found in '{}'", dir.display());
    }
    tracing::info!("Found {} categories in '{}'", catalog.len(), dir.display());
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::data::shard::test_support::write_shard;

    const LINE: &str = "[[[0, 100], [0, 100]]]";

    #[test]
    fn test_reads_labelled_shard_with_cap() {
        let tmp = tempfile::tempdir().unwrap();
        let rows: Vec<(&str, usize)> = (0..6).map(|y| (LINE, y)).collect();
        let path = write_shard(tmp.path(), 99, &rows);

        let table = DrawingTable::read_csv(&path, Some(4)).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.labels, Some(vec![0, 1, 2, 3]));
    }

    #[test]
    fn test_reads_unlabelled_test_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test_simplified.csv");
        fs::write(
            &path,
            format!("key_id,countrycode,drawing\n9000003627287624,DE,\"{0}\"\n9000010688666847,US,\"{0}\"\n",
                LINE),
        )
        .unwrap();

        let table = DrawingTable::read_csv(&path, None).unwrap();
        assert_eq!(table.key_ids, vec!["9000003627287624", "9000010688666847"]);
        assert!(table.labels.is_none());

        let opts = RenderOptions::new(16, 4, true).unwrap();
        let (images, labels) = load_fixed(&table, &opts, 3).unwrap();
        assert_eq!(images.shape(), [2, 16, 16, 1]);
        assert!(labels.is_none());
    }

    #[test]
    fn test_load_fixed_builds_labels() {
        let table = DrawingTable {
            key_ids: vec![String::new(); 2],
            drawings: vec![LINE.to_string(), LINE.to_string()],
            labels: Some(vec![1, 2]),
        };
        let opts = RenderOptions::new(8, 2, false).unwrap();
        let (images, labels) = load_fixed(&table, &opts, 3).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(labels.unwrap().ids(), &[1, 2]);
    }

    #[test]
    fn test_load_fixed_rejects_bad_drawing() {
        let table = DrawingTable {
            key_ids: vec![String::new()],
            drawings: vec!["not json".to_string()],
            labels: None,
        };
        assert!(load_fixed(&table, &RenderOptions::default(), 3).is_err());
    }

    #[test]
    fn test_load_catalog_from_directory() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["zebra.csv", "airplane.csv", "The Mona Lisa.csv"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        fs::create_dir(tmp.path().join("nested")).unwrap();

        let catalog = load_catalog(tmp.path()).unwrap();
        assert_eq!(catalog.names(), &["airplane", "The Mona Lisa", "zebra"]);
    }

    #[test]
    fn test_empty_catalog_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_catalog(tmp.path()).is_err());
    }
}
