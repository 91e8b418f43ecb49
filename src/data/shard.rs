// ============================================================
// Layer 4 - Shard Reader
// ============================================================
// Training data is pre-split into numbered CSV shards, each
// gzip-compressed:
//
//   shuffle-csvs/
//     train_k0.csv.gz
//     train_k1.csv.gz
//     ...
//     train_k99.csv.gz   <- last shard is held out for validation
//
// Each row carries the stroke JSON in a `drawing` column and the
// class id in `y`. Other columns (countrycode, key_id, word, ...)
// may be present and are ignored.
//
// A ShardReader streams one shard in file order and hands rows
// out in fixed-size chunks, like a chunked CSV reader: only one
// chunk of rows is in memory at a time.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use serde::Deserialize;

/// Path of shard `k` inside `dir`.
pub fn shard_path(dir: &Path, k: u32) -> PathBuf {
    dir.join(format!("train_k{k}.csv.gz"))
}

/// Open a CSV file, transparently decompressing `.gz`.
pub fn open_csv(path: &Path) -> Result<csv::Reader<Box<dyn Read>>> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;

    let is_gzip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));

    let reader: Box<dyn Read> = if is_gzip {
        Box::new(MultiGzDecoder::new(BufReader::with_capacity(128 * 1024, file)))
    } else {
        Box::new(BufReader::with_capacity(128 * 1024, file))
    };

    Ok(csv::ReaderBuilder::new().has_headers(true).from_reader(reader))
}

/// One labelled training row as stored in a shard.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShardRow {
    /// Stroke list in its JSON text form, decoded later
    pub drawing: String,
    /// Class id
    pub y: usize,
}

/// Chunked, in-order reader over a single shard.
pub struct ShardReader {
    path: PathBuf,
    rows: csv::DeserializeRecordsIntoIter<Box<dyn Read>, ShardRow>,
    /// 1-based data row number of the next row (header excluded)
    next_row: usize,
}

impl ShardReader {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows = open_csv(&path)?.into_deserialize();
        tracing::debug!("Opened shard '{}'", path.display());
        Ok(Self { path, rows, next_row: 1 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Row number (1-based, header excluded) of the first row the next
    /// chunk will contain.
    pub fn next_row(&self) -> usize {
        self.next_row
    }

    /// Up to `chunk_size` rows, or None once the shard is exhausted.
    pub fn next_chunk(&mut self, chunk_size: usize) -> Result<Option<Vec<ShardRow>>> {
        let mut chunk = Vec::with_capacity(chunk_size);
        while chunk.len() < chunk_size {
            match self.rows.next() {
                Some(row) => {
                    let row = row.with_context(|| {
                        format!("Bad row {} in '{}'", self.next_row, self.path.display())
                    })?;
                    chunk.push(row);
                    self.next_row += 1;
                }
                None => break,
            }
        }
        Ok(if chunk.is_empty() { None } else { Some(chunk) })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::write_shard;
    use super::*;

    const LINE: &str = "[[[0, 10], [0, 10]]]";

    #[test]
    fn test_shard_path_format() {
        assert_eq!(shard_path(Path::new("d"), 7), PathBuf::from("d/train_k7.csv.gz"));
    }

    #[test]
    fn test_reads_in_chunks_preserving_order() {
        let tmp = tempfile::tempdir().unwrap();
        let rows: Vec<(&str, usize)> = (0..5).map(|y| (LINE, y)).collect();
        let path = write_shard(tmp.path(), 0, &rows);

        let mut reader = ShardReader::open(&path).unwrap();
        let a = reader.next_chunk(2).unwrap().unwrap();
        let b = reader.next_chunk(2).unwrap().unwrap();
        let c = reader.next_chunk(2).unwrap().unwrap();
        assert!(reader.next_chunk(2).unwrap().is_none());

        let ys: Vec<usize> = a.iter().chain(&b).chain(&c).map(|r| r.y).collect();
        assert_eq!(ys, vec![0, 1, 2, 3, 4]);
        assert_eq!(c.len(), 1);
        assert_eq!(a[0].drawing, LINE);
    }

    #[test]
    fn test_missing_shard_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(ShardReader::open(shard_path(tmp.path(), 3)).is_err());
    }

    #[test]
    fn test_non_numeric_label_reports_row() {
        let tmp = tempfile::tempdir().unwrap();
        let path = shard_path(tmp.path(), 0);
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            std::io::Write::write_all(&mut gz, b"drawing,y\n\"[]\",1\n\"[]\",cat\n").unwrap();
            gz.finish().unwrap();
        }
        let mut reader = ShardReader::open(&path).unwrap();
        let err = reader.next_chunk(10).unwrap_err();
        assert!(format!("{err:#}").contains("Bad row 2"));
    }
}
