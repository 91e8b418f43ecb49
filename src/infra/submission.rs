// ============================================================
// Layer 6 - Submission Writer
// ============================================================
// Turns ranked category ids into the competition CSV:
//
//   key_id,word
//   9000003627287624,The_Eiffel_Tower airplane donut
//
// The file name carries the validation score so runs can be
// compared at a glance: gs_mn_submission_{floor(map3 * 10^4)}.csv

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::domain::catalog::CategoryCatalog;

/// Categories listed per submission row.
pub const SUBMISSION_TOP_K: usize = 3;

#[derive(Debug, Serialize)]
struct SubmissionRow<'a> {
    key_id: &'a str,
    word:   String,
}

/// File name for a run scoring `map3` on validation.
pub fn submission_file_name(map3: f64) -> String {
    let score = (map3 * 10_000.0).floor().max(0.0) as u64;
    format!("gs_mn_submission_{score}.csv")
}

/// Space-joined submission names for one ranked row.
pub fn row_words(ids: &[usize], catalog: &CategoryCatalog) -> Result<String> {
    let names = ids
        .iter()
        .map(|&id| {
            catalog
                .submission_name(id)
                .with_context(|| format!("category id {id} is not in the catalog"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(names.join(" "))
}

/// Write one row per test drawing and return the file path.
pub fn write_submission(
    output_dir: &Path,
    map3:       f64,
    key_ids:    &[String],
    top3:       &[Vec<usize>],
    catalog:    &CategoryCatalog,
) -> Result<PathBuf> {
    if key_ids.len() != top3.len() {
        bail!("{} key ids but {} predictions", key_ids.len(), top3.len());
    }

    let path = output_dir.join(submission_file_name(map3));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Cannot create submission '{}'", path.display()))?;

    for (row, (key_id, ids)) in key_ids.iter().zip(top3).enumerate() {
        if ids.len() != SUBMISSION_TOP_K {
            bail!("row {row} has {} ranked ids, expected {SUBMISSION_TOP_K}", ids.len());
        }
        let word = row_words(ids, catalog).with_context(|| format!("Bad prediction for row {row}"))?;
        writer.serialize(SubmissionRow { key_id, word })?;
    }
    writer.flush()?;

    tracing::info!("Wrote {} submission rows to '{}'", key_ids.len(), path.display());
    Ok(path)
}
