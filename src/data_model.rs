//! The data model shared by every component.
//!
//! A [`Variable`] is a named, typed, N-dimensional array with an ordered
//! list of named dimensions, a parameter bag (attributes plus transform
//! parameters), and a mutable user-data tag bag. A [`Dataset`] is a named
//! group holding variables and dimensions and providing a
//! `cell_transform`-style attribute sink.
//!
//! Per the design note that buffers are a flat vector plus a stride plan
//! (not a generic tensor type), [`Variable::data`] is a flat, row-major
//! `Vec<f64>`; [`Variable::as_array`] hands back an [`ndarray::ArrayViewD`]
//! for callers that want N-D indexing, but nothing in this crate's core
//! keeps that view as its backing storage.

use indexmap::IndexMap;
use ndarray::ArrayViewD;

/// A transform-parameter or attribute value.
///
/// Supports the three scalar types the parameter bag's external interface
/// recognizes (char, int32, double) plus the vector forms that several
/// recognized parameter keys need (`qc_bad`, `boundary_1`, `weights`, …).
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Char(String),
    Int(i64),
    IntVec(Vec<i64>),
    Double(f64),
    DoubleVec(Vec<f64>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Char(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Double(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            ParamValue::DoubleVec(v) => Some(v.clone()),
            ParamValue::Double(v) => Some(vec![*v]),
            ParamValue::IntVec(v) => Some(v.iter().map(|x| *x as f64).collect()),
            ParamValue::Int(v) => Some(vec![*v as f64]),
            _ => None,
        }
    }

    pub fn as_i64_vec(&self) -> Option<Vec<i64>> {
        match self {
            ParamValue::IntVec(v) => Some(v.clone()),
            ParamValue::Int(v) => Some(vec![*v]),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Char(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Char(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Double(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(value: Vec<f64>) -> Self {
        ParamValue::DoubleVec(value)
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(value: Vec<i64>) -> Self {
        ParamValue::IntVec(value)
    }
}

/// An ordered, insertion-preserving bag of named parameter values.
///
/// Used for both "attributes" (units, missing_value, assessment flags) and
/// transform-specific parameters (range, width, alignment, …) - the spec
/// does not distinguish the two at the storage level, only at the cascade
/// level (see [`Variable::get_param_for_dim`]).
#[derive(Debug, Clone, Default)]
pub struct ParamBag {
    entries: IndexMap<String, ParamValue>,
}

impl ParamBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Names with the given prefix, in insertion order, along with the
    /// remainder of the name after the prefix. Used to scan for
    /// `bit_<N>_assessment`-style keys.
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a ParamValue)> {
        self.entries
            .iter()
            .filter_map(move |(k, v)| k.strip_prefix(prefix).map(|rest| (rest, v)))
    }
}

/// A mutable, arbitrary tag attached to a variable outside of its formal
/// parameter bag: estimated-boundary markers, sibling-metric pointers, etc.
#[derive(Debug, Clone, PartialEq)]
pub enum UserDataValue {
    Bool(bool),
    Text(String),
}

/// A named dimension belonging to a [`Dataset`].
#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    pub length: usize,
    /// Dimension-level parameters, the last rung of the cascade in
    /// [`Variable::get_param_for_dim`].
    pub params: ParamBag,
}

impl Dimension {
    pub fn new(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length,
            params: ParamBag::new(),
        }
    }
}

/// A named, typed, N-dimensional array.
///
/// `data` is always a flat row-major buffer; `shape` (parallel to
/// `dim_names`) gives the per-dimension lengths. A variable whose name
/// equals one of its dataset's dimension names and which has rank 1 is by
/// convention a coordinate variable for that dimension.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub dim_names: Vec<String>,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
    pub qc: Option<Vec<i32>>,
    pub missing_value: f64,
    pub units: Option<String>,
    pub params: ParamBag,
    pub user_data: IndexMap<String, UserDataValue>,
}

/// Default missing value applied when a caller leaves data/QC unset.
pub const DEFAULT_MISSING_VALUE: f64 = -9999.0;

impl Variable {
    pub fn new(name: impl Into<String>, dim_names: Vec<String>, shape: Vec<usize>, data: Vec<f64>) -> Self {
        assert_eq!(dim_names.len(), shape.len(), "dim_names and shape must have matching rank");
        assert_eq!(shape.iter().product::<usize>(), data.len(), "data length must match shape product");
        Self {
            name: name.into(),
            dim_names,
            shape,
            data,
            qc: None,
            missing_value: DEFAULT_MISSING_VALUE,
            units: None,
            params: ParamBag::new(),
            user_data: IndexMap::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dim_names.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major strides for this variable's current shape.
    pub fn strides(&self) -> Vec<usize> {
        strides_for(&self.shape)
    }

    pub fn as_array(&self) -> ArrayViewD<f64> {
        ArrayViewD::from_shape(self.shape.clone(), &self.data)
            .expect("Variable invariant: data length must match shape product")
    }

    /// Cascading parameter lookup (spec §3): `dim_name:param_name` on this
    /// variable, then `param_name` on this variable, then `param_name` on
    /// the dimension.
    pub fn get_param_for_dim<'a>(&'a self, dim: &'a Dimension, name: &str) -> Option<&'a ParamValue> {
        let composite = format!("{}:{}", dim.name, name);
        self.params
            .get(&composite)
            .or_else(|| self.params.get(name))
            .or_else(|| dim.params.get(name))
    }

    pub fn get_param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }
}

/// Row-major strides for a shape: `stride[R-1] = 1`, `stride[d] = stride[d+1] * shape[d+1]`.
pub fn strides_for(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// A named group holding variables and dimensions.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub name: String,
    pub dims: IndexMap<String, Dimension>,
    pub variables: IndexMap<String, Variable>,
    /// Dataset-level (global) attributes, used as the fallback scan target
    /// for `qc_bit_<N>_assessment` when a variable carries no
    /// `bit_<N>_assessment` attributes of its own.
    pub params: ParamBag,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_dim(&mut self, dim: Dimension) {
        self.dims.insert(dim.name.clone(), dim);
    }

    pub fn add_var(&mut self, var: Variable) {
        self.variables.insert(var.name.clone(), var);
    }

    pub fn dim(&self, name: &str) -> Option<&Dimension> {
        self.dims.get(name)
    }

    pub fn var(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn var_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.get_mut(name)
    }

    /// The coordinate variable for dimension index `d` of `var`, if one
    /// exists: a rank-1 variable whose name equals the dimension's name.
    pub fn coord_var(&self, var: &Variable, d: usize) -> Option<&Variable> {
        let dim_name = var.dim_names.get(d)?;
        self.variables
            .get(dim_name)
            .filter(|v| v.rank() == 1 && v.dim_names[0] == *dim_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_match_row_major_layout() {
        assert_eq!(strides_for(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(strides_for(&[5]), vec![1]);
        assert_eq!(strides_for(&[]), Vec::<usize>::new());
    }

    #[test]
    fn param_cascade_prefers_most_specific() {
        let mut dim = Dimension::new("time", 4);
        dim.params.set("range", 1.0);

        let mut var = Variable::new("temp", vec!["time".to_string()], vec![4], vec![0.0; 4]);
        var.params.set("range", 2.0);
        var.params.set("time:range", 3.0);

        assert_eq!(var.get_param_for_dim(&dim, "range").unwrap().as_f64(), Some(3.0));

        var.params = ParamBag::new();
        var.params.set("range", 2.0);
        assert_eq!(var.get_param_for_dim(&dim, "range").unwrap().as_f64(), Some(2.0));

        var.params = ParamBag::new();
        assert_eq!(var.get_param_for_dim(&dim, "range").unwrap().as_f64(), Some(1.0));
    }

    #[test]
    fn coord_var_must_match_name_and_rank() {
        let mut ds = Dataset::new("ds");
        ds.add_dim(Dimension::new("time", 3));
        ds.add_var(Variable::new("time", vec!["time".to_string()], vec![3], vec![0.0, 1.0, 2.0]));
        let data_var = Variable::new("temp", vec!["time".to_string()], vec![3], vec![10.0, 20.0, 30.0]);
        let coord = ds.coord_var(&data_var, 0).expect("coord var should be found");
        assert_eq!(coord.name, "time");
    }
}
