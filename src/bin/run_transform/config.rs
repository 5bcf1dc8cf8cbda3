//! The TOML run-description format this demonstration binary accepts, and
//! its conversion into a `trans_rs::data_model::Dataset`. Kept out of the
//! library crate: the core never reads a file, matching spec.md's
//! Non-goal on file-format I/O.

use std::collections::HashMap;

use serde::Deserialize;
use trans_rs::data_model::{Dataset, Dimension, ParamValue, Variable};

/// One parameter bag entry. TOML doesn't distinguish an int from a float
/// lexically the way our `ParamValue` does, so this is matched most- to
/// least-specific (ints before floats, scalars before vectors).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ParamToml {
    Str(String),
    Int(i64),
    Float(f64),
    IntVec(Vec<i64>),
    FloatVec(Vec<f64>),
}

impl From<&ParamToml> for ParamValue {
    fn from(p: &ParamToml) -> Self {
        match p {
            ParamToml::Str(s) => ParamValue::Char(s.clone()),
            ParamToml::Int(i) => ParamValue::Int(*i),
            ParamToml::Float(f) => ParamValue::Double(*f),
            ParamToml::IntVec(v) => ParamValue::IntVec(v.clone()),
            ParamToml::FloatVec(v) => ParamValue::DoubleVec(v.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DimDesc {
    pub name: String,
    pub length: usize,
    /// Coordinate values for this dimension; when given, a rank-1 variable
    /// named identically to the dimension is created (the convention
    /// `Dataset::coord_var` looks for).
    #[serde(default)]
    pub coord: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct VarDesc {
    pub name: String,
    pub dim_names: Vec<String>,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
    #[serde(default)]
    pub missing_value: Option<f64>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, ParamToml>,
}

#[derive(Debug, Deserialize)]
pub struct RunDescription {
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,
    #[serde(default)]
    pub dims: Vec<DimDesc>,
    pub vars: Vec<VarDesc>,
    pub input_var: String,
    #[serde(default)]
    pub input_qc_var: Option<String>,
    pub output_var: String,
    pub output_qc_var: String,
    /// Dump the final `cell_transform` string and any metric sibling
    /// tables to stdout as JSON after driving the transform.
    #[serde(default)]
    pub dump: bool,
}

fn default_dataset_name() -> String {
    "run_transform".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("variable '{name}' has shape {shape:?} (product {product}) but {data_len} data values")]
    ShapeDataMismatch { name: String, shape: Vec<usize>, product: usize, data_len: usize },
    #[error("variable '{name}' has {rank} dimension names but shape of rank {shape_rank}")]
    ShapeRankMismatch { name: String, rank: usize, shape_rank: usize },
}

/// Build a `Dataset` from the parsed run description, validating shapes up
/// front so a malformed run file produces a clean error instead of tripping
/// one of `Variable::new`'s internal invariant assertions.
pub fn build_dataset(desc: &RunDescription) -> Result<Dataset, BuildError> {
    let mut dataset = Dataset::new(desc.dataset_name.clone());

    for dim in &desc.dims {
        dataset.add_dim(Dimension::new(dim.name.clone(), dim.length));
        if let Some(coord) = &dim.coord {
            dataset.add_var(Variable::new(dim.name.clone(), vec![dim.name.clone()], vec![dim.length], coord.clone()));
        }
    }

    for v in &desc.vars {
        if v.dim_names.len() != v.shape.len() {
            return Err(BuildError::ShapeRankMismatch {
                name: v.name.clone(),
                rank: v.dim_names.len(),
                shape_rank: v.shape.len(),
            });
        }
        let product: usize = v.shape.iter().product();
        if product != v.data.len() {
            return Err(BuildError::ShapeDataMismatch {
                name: v.name.clone(),
                shape: v.shape.clone(),
                product,
                data_len: v.data.len(),
            });
        }

        let mut var = Variable::new(v.name.clone(), v.dim_names.clone(), v.shape.clone(), v.data.clone());
        if let Some(mv) = v.missing_value {
            var.missing_value = mv;
        }
        var.units = v.units.clone();
        for (key, value) in &v.params {
            var.params.set(key.clone(), ParamValue::from(value));
        }
        dataset.add_var(var);
    }

    Ok(dataset)
}
