//! The shared `Kernel` trait and calling convention (C6), plus the four
//! built-in 1-D kernels.
//!
//! Grounded on `trans.h`'s `interface_s`/`core_s` structs and `TRANSfunc`
//! signature: a kernel call bundles input/output data and QC slices, the
//! missing values on each side, the variable handles (for parameter
//! lookup), the dimension indices being transformed, and a metric-table
//! slot. The trait shape follows `interpolation.rs`'s `InterpolationMethod`
//! pattern (one required method, default helper methods for the shared
//! bracket/monotonicity checks every 1-D kernel needs).

pub mod bin_average;
pub mod interpolate;
pub mod passthrough;
pub mod subsample;

use thiserror::Error;

use crate::data_model::{Dimension, Variable};
use crate::metrics::MetricTable;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no kernel registered under the name '{0}'")]
    UnknownTransform(String),
    #[error("need at least {needed} input samples, got {got}")]
    InsufficientInput { needed: usize, got: usize },
    #[error("input and output coordinates are not both monotonic in the same direction")]
    NonMonotonicAxis,
    #[error("output bin has zero width")]
    ZeroOutputBinWidth,
    #[error("parameter '{0}' has a type incompatible with what this kernel expects")]
    ParamTypeMismatch(String),
}

/// One kernel invocation's full set of inputs and outputs, per spec.md §6.
///
/// Buffers are owned rather than borrowed: the driver copies a slice into a
/// `KernelCall`, dispatches, and scatters the result back out, which keeps
/// the kernel ABI free of lifetime parameters and matches the "kernels may
/// not retain references past return" rule in spec.md §5 by construction.
pub struct KernelCall {
    pub input_data: Vec<f64>,
    pub input_qc: Vec<i32>,
    pub input_missing: f64,
    /// Input-axis bin geometry for dimension `d`, resolved by the driver via
    /// C2 before dispatch.
    pub input_mid: Vec<f64>,
    pub input_front: Vec<f64>,
    pub input_back: Vec<f64>,
    pub input_estimated: bool,

    pub output_data: Vec<f64>,
    pub output_qc: Vec<i32>,
    pub output_missing: f64,
    pub output_mid: Vec<f64>,
    pub output_front: Vec<f64>,
    pub output_back: Vec<f64>,
    pub output_estimated: bool,

    pub input_var: Variable,
    pub output_var: Variable,
    pub input_dim: Dimension,
    pub output_dim: Dimension,
    pub d: usize,
    pub od: usize,
    pub qc_mask: u32,
    pub met: Option<MetricTable>,

    /// Station lat/lon (length == `input_data.len()`) and output grid
    /// lat/lon (length == `output_data.len()`, row-major over lat then
    /// lon), populated by the driver only for the Caracena kernel. Empty
    /// for every 1-D kernel.
    pub station_lat: Vec<f64>,
    pub station_lon: Vec<f64>,
    pub grid_lat: Vec<f64>,
    pub grid_lon: Vec<f64>,
}

impl KernelCall {
    #[cfg(test)]
    pub fn new_for_test() -> Self {
        let input_var = Variable::new("in", vec!["x".to_string()], vec![3], vec![0.0, 1.0, 2.0]);
        let output_var = Variable::new("out", vec!["x".to_string()], vec![3], vec![0.0, 0.0, 0.0]);
        let input_dim = Dimension::new("x", 3);
        let output_dim = Dimension::new("x", 3);
        Self {
            input_data: vec![0.0, 1.0, 2.0],
            input_qc: vec![0, 0, 0],
            input_missing: crate::data_model::DEFAULT_MISSING_VALUE,
            input_mid: vec![0.0, 1.0, 2.0],
            input_front: vec![-0.5, 0.5, 1.5],
            input_back: vec![0.5, 1.5, 2.5],
            input_estimated: false,
            output_data: vec![0.0, 0.0, 0.0],
            output_qc: vec![0, 0, 0],
            output_missing: crate::data_model::DEFAULT_MISSING_VALUE,
            output_mid: vec![0.0, 1.0, 2.0],
            output_front: vec![-0.5, 0.5, 1.5],
            output_back: vec![0.5, 1.5, 2.5],
            output_estimated: false,
            input_var,
            output_var,
            input_dim,
            output_dim,
            d: 0,
            od: 0,
            qc_mask: 1,
            met: None,
            station_lat: Vec::new(),
            station_lon: Vec::new(),
            grid_lat: Vec::new(),
            grid_lon: Vec::new(),
        }
    }

    /// True if raw sample `i` on the input side is usable: finite, not the
    /// missing-value sentinel, and free of any QC bit in `qc_mask`.
    pub fn input_usable(&self, i: usize) -> bool {
        let v = self.input_data[i];
        v.is_finite()
            && v != self.input_missing
            && (self.input_qc[i] as u32) & self.qc_mask == 0
    }
}

/// The uniform calling convention every 1-D (and, for Caracena, scattered)
/// transform kernel implements.
pub trait Kernel: Send + Sync {
    fn call(&self, call: &mut KernelCall) -> Result<(), KernelError>;
}
