//! Bin-geometry helper (C2): derive front/back edges and midpoints of a
//! 1-D coordinate axis from whichever combination of parameters is
//! supplied, following the resolution cascade in spec.md §4.2.

use thiserror::Error;

use crate::data_model::{Dimension, Variable};

#[derive(Debug, Error)]
pub enum BinGeometryError {
    #[error("dimension '{0}' has no bin-edge parameters and default edge estimation is disabled")]
    EstimatedBinsDisabled(String),
    #[error("coordinate vector for dimension '{0}' has length {1}, expected at least 2 to estimate edges")]
    TooFewPointsToEstimate(String, usize),
}

/// Per-call policy for bin-edge resolution. Modeled as a per-call flag
/// rather than the original's process-global `_use_default_edges` toggle
/// (see DESIGN.md Open Question 3).
#[derive(Debug, Clone, Copy)]
pub struct BinGeometryConfig {
    pub use_default_edges: bool,
    pub default_alignment: f64,
}

impl Default for BinGeometryConfig {
    fn default() -> Self {
        Self {
            use_default_edges: true,
            default_alignment: 0.5,
        }
    }
}

/// Resolved bin edges and midpoints for a 1-D coordinate axis.
#[derive(Debug, Clone, PartialEq)]
pub struct BinEdges {
    pub front: Vec<f64>,
    pub back: Vec<f64>,
    pub midpoint: Vec<f64>,
    /// True if the edges were inferred (resolution step 4) rather than
    /// taken from an explicit parameter. Callers must OR the matching
    /// `ESTIMATED_*_BIN` QC bit into every output sample for this
    /// dimension when this is set.
    pub estimated: bool,
}

fn get_boundary_vec(var: &Variable, dim: &Dimension, name: &str, n: usize) -> Option<Vec<f64>> {
    var.get_param_for_dim(dim, name).and_then(|v| {
        let vec = v.as_f64_vec()?;
        if vec.len() == n {
            Some(vec)
        } else if vec.len() == 1 {
            Some(vec![vec[0]; n])
        } else {
            None
        }
    })
}

fn get_scalar_or_vec(var: &Variable, dim: &Dimension, name: &str, n: usize) -> Option<Vec<f64>> {
    get_boundary_vec(var, dim, name, n)
}

/// Resolve `(front, back, mid)` for coordinate vector `coord` (length `n`)
/// belonging to `dim` on `var`, per the cascade in spec.md §4.2.
pub fn get_bin_edges(
    coord: &[f64],
    var: &Variable,
    dim: &Dimension,
    config: &BinGeometryConfig,
) -> Result<BinEdges, BinGeometryError> {
    let n = coord.len();

    // Step 1: explicit boundary_1/boundary_2, or legacy front_edge/back_edge.
    let boundary_1 = get_boundary_vec(var, dim, "boundary_1", n)
        .or_else(|| get_boundary_vec(var, dim, "front_edge", n));
    let boundary_2 = get_boundary_vec(var, dim, "boundary_2", n)
        .or_else(|| get_boundary_vec(var, dim, "back_edge", n));

    if let (Some(front), Some(back)) = (boundary_1, boundary_2) {
        let midpoint = midpoints(&front, &back);
        return Ok(BinEdges { front, back, midpoint, estimated: false });
    }

    // Step 2: width + alignment.
    let width = get_scalar_or_vec(var, dim, "width", n);
    let alignment = var
        .get_param_for_dim(dim, "alignment")
        .and_then(|v| v.as_f64())
        .unwrap_or(config.default_alignment);

    if let Some(width) = width {
        let mut front = vec![0.0; n];
        let mut back = vec![0.0; n];
        for i in 0..n {
            front[i] = coord[i] - alignment * width[i];
            back[i] = coord[i] + (1.0 - alignment) * width[i];
        }
        let midpoint = midpoints(&front, &back);
        return Ok(BinEdges { front, back, midpoint, estimated: false });
    }

    // Step 3: the time dimension defaults to zero-width bins.
    if dim.name == "time" {
        return Ok(BinEdges {
            front: coord.to_vec(),
            back: coord.to_vec(),
            midpoint: coord.to_vec(),
            estimated: false,
        });
    }

    // Step 4: infer from successive differences.
    if !config.use_default_edges {
        return Err(BinGeometryError::EstimatedBinsDisabled(dim.name.clone()));
    }
    if n < 2 {
        return Err(BinGeometryError::TooFewPointsToEstimate(dim.name.clone(), n));
    }

    let mut front = vec![0.0; n];
    let mut back = vec![0.0; n];
    front[0] = coord[0] - alignment * (coord[1] - coord[0]);
    for i in 0..n - 1 {
        back[i] = coord[i] + (1.0 - alignment) * (coord[i + 1] - coord[i]);
        front[i + 1] = back[i];
    }
    // Last bin's width copied from the penultimate.
    let last_width = back[n - 2] - front[n - 2];
    back[n - 1] = front[n - 1] + last_width;

    let midpoint = midpoints(&front, &back);
    Ok(BinEdges { front, back, midpoint, estimated: true })
}

fn midpoints(front: &[f64], back: &[f64]) -> Vec<f64> {
    front.iter().zip(back).map(|(f, b)| (f + b) / 2.0).collect()
}
