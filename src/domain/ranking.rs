// ============================================================
// Layer 3 - Ranking Metrics
// ============================================================
// Mean Average Precision at k (MAP@k) is the leaderboard metric:
// each example may list up to k guesses, and a correct guess
// earns more the earlier it appears.
//
//   AP@k = (1 / min(|actual|, k)) * sum over ranks i < k of
//          hits_so_far / (i + 1)   if predicted[i] is a new hit
//
// With a single true label this reduces to 1 / (rank + 1):
//   [5, 1, 2] for label 5 -> 1.0
//   [1, 5, 2] for label 5 -> 0.5
//   [1, 2, 5] for label 5 -> 0.333...

/// Average precision of one ranked prediction list.
///
/// Repeated predictions only count the first time. An empty
/// `actual` set scores 0.0.
pub fn average_precision_at_k(actual: &[usize], predicted: &[usize], k: usize) -> f64 {
    if actual.is_empty() || k == 0 {
        return 0.0;
    }

    let predicted = &predicted[..predicted.len().min(k)];
    let mut score = 0.0;
    let mut hits = 0.0;

    for (i, p) in predicted.iter().enumerate() {
        if actual.contains(p) && !predicted[..i].contains(p) {
            hits += 1.0;
            score += hits / (i as f64 + 1.0);
        }
    }

    score / actual.len().min(k) as f64
}

/// Mean of [`average_precision_at_k`] over paired examples.
/// No examples yields 0.0.
pub fn mean_average_precision<A, P>(actuals: &[A], predicteds: &[P], k: usize) -> f64
where
    A: AsRef<[usize]>,
    P: AsRef<[usize]>,
{
    let n = actuals.len().min(predicteds.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = actuals
        .iter()
        .zip(predicteds)
        .map(|(a, p)| average_precision_at_k(a.as_ref(), p.as_ref(), k))
        .sum();
    total / n as f64
}

/// Indices of the `k` largest probabilities in `row`, best first.
///
/// Equal probabilities rank the lower category id first and NaN
/// ranks below every number, so the result is fully deterministic.
pub fn top_k_ids(row: &[f32], k: usize) -> Vec<usize> {
    let key = |v: f32| if v.is_nan() { f32::NEG_INFINITY } else { v };
    let mut ids: Vec<usize> = (0..row.len()).collect();
    ids.sort_by(|&a, &b| key(row[b]).total_cmp(&key(row[a])).then(a.cmp(&b)));
    ids.truncate(k);
    ids
}

/// Number of rows whose label is among the top `k` predictions.
/// `rows` yields one probability row per label.
pub fn top_k_hits<'a, R>(labels: &[usize], rows: R, k: usize) -> usize
where
    R: IntoIterator<Item = &'a [f32]>,
{
    labels
        .iter()
        .zip(rows)
        .filter(|(label, row)| top_k_ids(row, k).contains(*label))
        .count()
}

/// Fraction of rows whose label is among the top `k` predictions.
pub fn top_k_accuracy<'a, R>(labels: &[usize], rows: R, k: usize) -> f64
where
    R: IntoIterator<Item = &'a [f32]>,
{
    if labels.is_empty() {
        return 0.0;
    }
    top_k_hits(labels, rows, k) as f64 / labels.len() as f64
}
