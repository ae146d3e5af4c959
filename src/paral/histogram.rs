//! Histogram with only the non-empty bins

use std::collections::BTreeMap;

/// Upper bound on the number of mesh points
const MAX_BINS: usize = 10_000;

/// Items grouped in bins of constant width.
///
/// Each bin holds the items whose key is greater than or equal to the bin
/// value and lower than the next bin value. Bins are sorted by value.
#[derive(Debug, Clone)]
pub struct SparseHistogram<T> {
    /// Lower edge of each non-empty bin, increasing
    pub binvals: Vec<f64>,
    /// Items of each bin, in input order
    pub values: Vec<Vec<T>>,
}

impl<T: Clone> SparseHistogram<T> {
    /// Build the histogram with bins of width `step` between the minimum and
    /// the maximum key
    pub fn with_step<F>(items: &[T], key: F, step: f64) -> Self
    where
        F: Fn(&T) -> f64,
    {
        if items.is_empty() {
            return Self {
                binvals: Vec::new(),
                values: Vec::new(),
            };
        }

        let keys: Vec<f64> = items.iter().map(&key).collect();
        let start = keys.iter().copied().fold(f64::INFINITY, f64::min);
        let stop = keys.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let span = (stop - start) / step;
        let num = if step > 0.0 && span.is_finite() {
            (span as usize).clamp(1, MAX_BINS)
        } else {
            1
        };
        let width = if num > 1 { (stop - start) / num as f64 } else { 0.0 };
        let mesh: Vec<f64> = (0..num).map(|i| start + i as f64 * width).collect();

        let mut bins: BTreeMap<usize, Vec<T>> = BTreeMap::new();
        for (item, value) in items.iter().zip(keys) {
            // Rightmost mesh point less than or equal to value.
            let pos = mesh.iter().rposition(|m| *m <= value).unwrap_or(0);
            bins.entry(pos).or_default().push(item.clone());
        }

        let binvals = bins.keys().map(|&pos| mesh[pos]).collect();
        let values = bins.into_values().collect();

        Self { binvals, values }
    }

    /// Number of non-empty bins
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
