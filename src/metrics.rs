//! Metric container (C3): a fixed-shape table of named per-sample
//! statistics produced by a kernel, scoped to one slice transform.
//!
//! Tables are single-owner, single-writer value types, per the design note
//! in spec.md §9 ("no shared ownership, no cyclic references"): a kernel
//! fills the table for its slice, and the driver immediately scatters the
//! values into caller-owned storage before the table is dropped.

/// A named metric column together with its unit. The literal unit string
/// `"SAME"` means "copy the data variable's units" when a metric sibling
/// variable is created.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub name: &'static str,
    pub unit: &'static str,
}

/// One kernel invocation's metric output: `metrics[m][k]` for `m` in
/// `0..names.len()` and `k` in `0..n_samples`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    pub specs: Vec<MetricSpec>,
    pub metrics: Vec<Vec<f64>>,
}

impl MetricTable {
    /// Allocate a fresh table. Mirrors `allocate_metric`: any value
    /// previously held by the caller's `Option<MetricTable>` slot should
    /// simply be replaced (Rust's ownership drops the old table for us,
    /// which is the `free_metric` step).
    pub fn allocate(specs: Vec<MetricSpec>, n_samples: usize) -> Self {
        let metrics = specs.iter().map(|_| vec![f64::NAN; n_samples]).collect();
        Self { specs, metrics }
    }

    pub fn n_metrics(&self) -> usize {
        self.specs.len()
    }

    pub fn n_samples(&self) -> usize {
        self.metrics.first().map_or(0, |row| row.len())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.iter().map(|s| s.name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }

    pub fn set(&mut self, metric_idx: usize, sample_idx: usize, value: f64) {
        self.metrics[metric_idx][sample_idx] = value;
    }
}
