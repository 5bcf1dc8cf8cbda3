//! Serial-1D transform driver (C9): the outermost pipeline that walks a
//! variable's dimension groups in declaration order, dispatches each group
//! through a 1-D (or Caracena) kernel one slice at a time, and writes the
//! final buffer, QC, metric siblings, and `cell_transform` provenance back
//! into the dataset.
//!
//! Grounded on `cds_transform_driver.c`'s `cds_transform_driver` (stride-plan
//! construction, QC broadcast/lifting, per-group kernel auto-selection,
//! slice gather/dispatch/scatter, the `okshape` metric-eligibility backward
//! walk, and metric-sibling creation with `@`-splicing) and on
//! `trans_caracena.c`'s input-variable-scoped `qc_mask` resolution.
//!
//! The driver clones the input and output variable templates once up front
//! and performs the whole multi-group loop against plain owned buffers; all
//! dataset mutation (final data/QC writeback, metric-sibling insertion, the
//! `cell_transform` attribute) happens in one block at the very end. This
//! keeps every intermediate borrow of `dataset` immutable and short-lived,
//! which is the idiomatic Rust way to express what the source does with a
//! single long-lived `CDSGroup *` handle held across the whole call.

use std::collections::HashSet;

use log::warn;
use rayon::prelude::*;
use thiserror::Error;

use crate::bins::{get_bin_edges, BinEdges, BinGeometryConfig, BinGeometryError};
use crate::data_model::{strides_for, Dataset, Dimension, ParamValue, UserDataValue, Variable};
use crate::dimgroup::{parse_dim_grouping, DimGroup, DimGroupError};
use crate::kernels::{KernelCall, KernelError};
use crate::metrics::MetricTable;
use crate::params::ParamStore;
use crate::qc::{default_qc_mapping, resolve_qc_mask, QcCode, QcCodeTable, QcError, QcMappingFn};
use crate::registry::{
    KernelRegistry, TRANS_AUTO, TRANS_BIN_AVERAGE, TRANS_CARACENA, TRANS_INTERPOLATE, TRANS_PASSTHROUGH,
};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("multi-dimensional transform_type is not implemented")]
    NotImplemented,
    #[error("input QC variable '{qc_name}' has rank {qc_rank} but input variable '{var_name}' has rank {var_rank}")]
    QcShapeInvalid { qc_name: String, qc_rank: usize, var_name: String, var_rank: usize },
    #[error("no transform could be auto-selected for the group starting at input dim {input_offset} ({input_dims:?} -> {output_dims:?})")]
    NoTransform { input_offset: usize, input_dims: Vec<String>, output_dims: Vec<String> },
    #[error("coordinate variable '{0}' not found")]
    MissingCoordinateVar(String),
    #[error(transparent)]
    DimGroup(#[from] DimGroupError),
    #[error(transparent)]
    BinGeometry(#[from] BinGeometryError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Qc(#[from] QcError),
}

/// Recognized per-dimension transform parameter keys (spec.md §6), scanned
/// for provenance recording once a group's kernel has been selected.
const TRANSFORM_PARAM_KEYS: &[&str] = &[
    "range",
    "width",
    "alignment",
    "boundary_1",
    "boundary_2",
    "weights",
    "std_bad_max",
    "std_ind_max",
    "goodfrac_bad_min",
    "goodfrac_ind_min",
    "lat_field",
    "lon_field",
    "number_of_passes",
    "scale_factor",
    "min_stations",
];

/// The serial-1D driver. Cheaply constructible; holds a kernel registry, the
/// canonical QC-code table, bin-geometry policy, and an optional
/// process-wide QC-mapping-function override (spec.md §5).
pub struct Driver {
    pub registry: KernelRegistry,
    pub codes: QcCodeTable,
    pub bin_config: BinGeometryConfig,
    pub qc_mapping: Option<QcMappingFn>,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            registry: KernelRegistry::with_builtins(),
            codes: QcCodeTable::default(),
            bin_config: BinGeometryConfig::default(),
            qc_mapping: None,
        }
    }
}

impl Driver {
    pub fn new(registry: KernelRegistry) -> Self {
        Self { registry, ..Self::default() }
    }

    /// Drive a transform from `in_var_name` (with optional `in_qc_var_name`)
    /// into `out_var_name`/`out_qc_var_name`, all looked up on `dataset`.
    pub fn drive(
        &self,
        dataset: &mut Dataset,
        in_var_name: &str,
        in_qc_var_name: Option<&str>,
        out_var_name: &str,
        out_qc_var_name: &str,
    ) -> Result<(), DriverError> {
        let in_var = dataset.var(in_var_name).expect("input variable must exist").clone();
        let out_var = dataset.var(out_var_name).expect("output variable must exist").clone();

        let transform_type = in_var
            .get_param("transform_type")
            .and_then(|v| v.as_str())
            .or_else(|| out_var.get_param("transform_type").and_then(|v| v.as_str()));
        if transform_type == Some("Multi_Dimensional") {
            return Err(DriverError::NotImplemented);
        }

        let in_qc_var = in_qc_var_name.map(|n| dataset.var(n).expect("input QC variable must exist").clone());
        if let Some(qc_var) = &in_qc_var {
            if qc_var.rank() > in_var.rank() {
                return Err(DriverError::QcShapeInvalid {
                    qc_name: qc_var.name.clone(),
                    qc_rank: qc_var.rank(),
                    var_name: in_var.name.clone(),
                    var_rank: in_var.rank(),
                });
            }
        }

        let raw_qc = lift_qc(&in_var, in_qc_var.as_ref());
        let work_qc0 = if in_qc_var.is_some() { self.apply_qc_mapping(&in_var, &raw_qc) } else { raw_qc };

        let mut params = ParamStore::new();
        let dim_grouping_raw = in_var.get_param("dim_grouping").and_then(|v| v.as_str()).map(|s| s.to_string());
        if let Some(raw) = &dim_grouping_raw {
            params.append("dim_grouping", raw, "NODIM", out_var_name);
        }

        let groups = parse_dim_grouping(dim_grouping_raw.as_deref(), &in_var, &out_var)?;
        let g_count = groups.len();

        let mut order_of: Vec<usize> = (0..g_count).collect();
        order_of.sort_by_key(|&i| groups[i].order);

        let okshape = compute_okshape(&groups, &order_of, dataset);

        let qc_mask = resolve_qc_mask(&in_var, dataset, &self.codes)?;

        let mut cur_len: Vec<usize> = groups.iter().map(|g| g.input_length).collect();
        let mut transformed = vec![false; g_count];
        let mut work_data = in_var.data.clone();
        let mut work_qc = work_qc0;

        let mut pending_metric_vars: Vec<Variable> = Vec::new();
        let mut created_metric_siblings: HashSet<String> = HashSet::new();
        let mut out_metric_tags: Vec<(String, String)> = Vec::new();

        for (n_index, &g) in order_of.iter().enumerate() {
            let group = groups[g].clone();
            let odim_name = group.output_dim_names[0].clone();
            let idim_name = group.input_dim_names[0].clone();
            let out_dim = dim_or_default(dataset, &odim_name, group.output_length);
            let in_dim = dim_or_default(dataset, &idim_name, group.input_length);

            let kernel_name = self.select_kernel_name(&group, &in_var, &out_var, dataset, &out_dim)?;
            params.append("transform", &kernel_name, &odim_name, out_var_name);
            record_kernel_params(&mut params, &in_var, &in_dim, &out_var, &out_dim, out_var_name);

            let kernel = self.registry.lookup(&kernel_name)?;
            let is_caracena = kernel_name == TRANS_CARACENA;

            let (geom_in, geom_out) = if is_caracena {
                (None, None)
            } else {
                let in_coord = dataset.var(&idim_name).filter(|v| v.rank() == 1);
                let out_coord = dataset.var(&odim_name).filter(|v| v.rank() == 1);
                let gi = self.axis_geometry(&in_var, &in_dim, in_coord, group.input_length)?;
                let go = self.axis_geometry(&out_var, &out_dim, out_coord, group.output_length)?;
                (Some(gi), Some(go))
            };

            let (station_lat, station_lon, grid_lat, grid_lon) = if is_caracena {
                caracena_geometry(dataset, &out_var, &out_dim, &group)?
            } else {
                (Vec::new(), Vec::new(), Vec::new(), Vec::new())
            };

            let stride = strides_for(&cur_len);
            let mut next_len = cur_len.clone();
            next_len[g] = group.output_length;
            let next_stride = strides_for(&next_len);

            let offsets_in = slice_base_offsets(&cur_len, &stride, g);
            let offsets_out = slice_base_offsets(&next_len, &next_stride, g);
            let n_slices = offsets_in.len();
            let out_total: usize = next_len.iter().product();

            let slice_len = group.input_length;
            let out_len = group.output_length;

            let mut out_data = vec![out_var.missing_value; out_total];
            let mut out_qc = vec![0i32; out_total];
            let mut metric_specs: Option<Vec<crate::metrics::MetricSpec>> = None;
            let mut metric_buffers: Vec<Vec<f64>> = Vec::new();

            // Slice iteration order is unspecified (spec.md §5); slices are
            // disjoint, so dispatch runs across the thread pool and results
            // are scattered back in a cheap sequential pass afterward.
            let outcomes: Vec<SliceOutcome> = (0..n_slices)
                .into_par_iter()
                .map(|s| -> Result<SliceOutcome, KernelError> {
                    let in_off = offsets_in[s];
                    let mut call = KernelCall {
                        input_data: work_data[in_off..in_off + slice_len].to_vec(),
                        input_qc: work_qc[in_off..in_off + slice_len].to_vec(),
                        input_missing: in_var.missing_value,
                        input_mid: geom_in.as_ref().map(|g| g.midpoint.clone()).unwrap_or_default(),
                        input_front: geom_in.as_ref().map(|g| g.front.clone()).unwrap_or_default(),
                        input_back: geom_in.as_ref().map(|g| g.back.clone()).unwrap_or_default(),
                        input_estimated: geom_in.as_ref().map(|g| g.estimated).unwrap_or(false),
                        output_data: vec![out_var.missing_value; out_len],
                        output_qc: vec![0; out_len],
                        output_missing: out_var.missing_value,
                        output_mid: geom_out.as_ref().map(|g| g.midpoint.clone()).unwrap_or_default(),
                        output_front: geom_out.as_ref().map(|g| g.front.clone()).unwrap_or_default(),
                        output_back: geom_out.as_ref().map(|g| g.back.clone()).unwrap_or_default(),
                        output_estimated: geom_out.as_ref().map(|g| g.estimated).unwrap_or(false),
                        input_var: in_var.clone(),
                        output_var: out_var.clone(),
                        input_dim: in_dim.clone(),
                        output_dim: out_dim.clone(),
                        d: group.input_offset,
                        od: group.output_offset,
                        qc_mask,
                        met: None,
                        station_lat: station_lat.clone(),
                        station_lon: station_lon.clone(),
                        grid_lat: grid_lat.clone(),
                        grid_lon: grid_lon.clone(),
                    };

                    kernel.call(&mut call)?;

                    if call.input_estimated {
                        for q in call.output_qc.iter_mut() {
                            *q = self.codes.set(*q as u32, QcCode::EstimatedInputBin) as i32;
                        }
                    }
                    if call.output_estimated {
                        for q in call.output_qc.iter_mut() {
                            *q = self.codes.set(*q as u32, QcCode::EstimatedOutputBin) as i32;
                        }
                    }

                    Ok(SliceOutcome { output_data: call.output_data, output_qc: call.output_qc, met: call.met })
                })
                .collect::<Result<Vec<_>, KernelError>>()?;

            for (s, outcome) in outcomes.into_iter().enumerate() {
                let out_off = offsets_out[s];
                out_data[out_off..out_off + out_len].copy_from_slice(&outcome.output_data);
                out_qc[out_off..out_off + out_len].copy_from_slice(&outcome.output_qc);

                if let Some(met) = outcome.met {
                    if metric_specs.is_none() {
                        metric_specs = Some(met.specs.clone());
                        metric_buffers = met.specs.iter().map(|_| vec![f64::NAN; out_total]).collect();
                    }
                    for m in 0..met.n_metrics() {
                        metric_buffers[m][out_off..out_off + out_len].copy_from_slice(&met.metrics[m]);
                    }
                }
            }

            cur_len[g] = out_len;
            transformed[g] = true;
            work_data = out_data;
            work_qc = out_qc;

            if let Some(specs) = metric_specs {
                if okshape[n_index] {
                    let (dim_names, lens) = current_layout(&groups, &transformed, dataset);
                    for (m_idx, spec) in specs.iter().enumerate() {
                        let sibling_name = metric_sibling_name(out_var_name, spec.name);
                        if dataset.var(&sibling_name).is_some() || created_metric_siblings.contains(&sibling_name) {
                            warn!("metric sibling '{sibling_name}' already exists; user declaration wins");
                            continue;
                        }
                        let units = if spec.unit == "SAME" { out_var.units.clone() } else { Some(spec.unit.to_string()) };
                        let mut sibling =
                            Variable::new(sibling_name.clone(), dim_names.clone(), lens.clone(), metric_buffers[m_idx].clone());
                        sibling.missing_value = out_var.missing_value;
                        sibling.units = units;
                        sibling
                            .params
                            .set("long_name", format!("Metric {} for field {}", spec.name, out_var_name));
                        created_metric_siblings.insert(sibling_name.clone());
                        out_metric_tags.push((spec.name.to_string(), sibling_name.clone()));
                        pending_metric_vars.push(sibling);
                    }
                } else {
                    let dropped: Vec<&str> = specs.iter().map(|s| s.name).collect();
                    warn!("dropping metrics {dropped:?} for '{out_var_name}': a later group does not preserve shape");
                }
            }
        }

        let cell_transform = params.serialize(out_var_name);
        {
            let out_var_mut = dataset.var_mut(out_var_name).expect("output variable must exist");
            out_var_mut.data = work_data;
            out_var_mut.params.set("cell_transform", cell_transform);
            for (metric, sibling_name) in out_metric_tags {
                out_var_mut.user_data.insert(metric, UserDataValue::Text(sibling_name));
            }
        }
        if let Some(qc_var_mut) = dataset.var_mut(out_qc_var_name) {
            qc_var_mut.data = work_qc.iter().map(|q| *q as f64).collect();
        }
        for v in pending_metric_vars {
            dataset.add_var(v);
        }
        params.clear();

        Ok(())
    }

    fn apply_qc_mapping(&self, in_var: &Variable, raw_qc: &[i32]) -> Vec<i32> {
        if let Some(map_fn) = self.qc_mapping {
            return raw_qc.iter().zip(&in_var.data).map(|(&raw, &val)| map_fn(val, raw) as i32).collect();
        }
        if let Some(qc_bad) = in_var.get_param("qc_bad").and_then(|v| v.as_i64_vec()) {
            let mapping = default_qc_mapping(&qc_bad, &self.codes);
            return raw_qc.iter().zip(&in_var.data).map(|(&raw, &val)| mapping(val, raw) as i32).collect();
        }
        raw_qc.to_vec()
    }

    fn axis_geometry(
        &self,
        var: &Variable,
        dim: &Dimension,
        coord: Option<&Variable>,
        n: usize,
    ) -> Result<BinEdges, DriverError> {
        match coord {
            Some(c) => Ok(get_bin_edges(&c.data, var, dim, &self.bin_config)?),
            None => {
                let synthetic: Vec<f64> = (0..n).map(|i| i as f64).collect();
                Ok(BinEdges { front: synthetic.clone(), back: synthetic.clone(), midpoint: synthetic, estimated: false })
            }
        }
    }

    /// Kernel-selection cascade (spec.md §4.9): explicit `transform`
    /// parameter (unless `TRANS_AUTO`), else auto-select for a 1-to-1 group
    /// by comparing average input/output intervals, else `TRANS_PASSTHROUGH`
    /// when no coordinate variable exists but lengths match.
    fn select_kernel_name(
        &self,
        group: &DimGroup,
        in_var: &Variable,
        out_var: &Variable,
        dataset: &Dataset,
        out_dim: &Dimension,
    ) -> Result<String, DriverError> {
        if let Some(name) = out_var.get_param_for_dim(out_dim, "transform").and_then(|v| v.as_str()) {
            if name != TRANS_AUTO {
                return Ok(name.to_string());
            }
        }

        if group.input_dim_names.len() != 1 || group.output_dim_names.len() != 1 {
            return Err(DriverError::NoTransform {
                input_offset: group.input_offset,
                input_dims: group.input_dim_names.clone(),
                output_dims: group.output_dim_names.clone(),
            });
        }

        let idim_name = &group.input_dim_names[0];
        let odim_name = &group.output_dim_names[0];
        let in_coord = dataset.var(idim_name).filter(|v| v.rank() == 1);
        let out_coord = dataset.var(odim_name).filter(|v| v.rank() == 1);

        match (in_coord, out_coord) {
            (Some(ic), Some(oc)) => {
                let name = match (average_interval(&ic.data), average_interval(&oc.data)) {
                    (Some(ii), Some(oi)) if oi > ii => TRANS_BIN_AVERAGE,
                    _ => TRANS_INTERPOLATE,
                };
                Ok(name.to_string())
            }
            _ if group.input_length == group.output_length => Ok(TRANS_PASSTHROUGH.to_string()),
            _ => {
                let _ = in_var;
                Err(DriverError::NoTransform {
                    input_offset: group.input_offset,
                    input_dims: group.input_dim_names.clone(),
                    output_dims: group.output_dim_names.clone(),
                })
            }
        }
    }
}

/// One slice's kernel output, collected from the parallel dispatch pass
/// before being scattered into the group's output buffer.
struct SliceOutcome {
    output_data: Vec<f64>,
    output_qc: Vec<i32>,
    met: Option<MetricTable>,
}

fn dim_or_default(dataset: &Dataset, name: &str, length: usize) -> Dimension {
    dataset.dim(name).cloned().unwrap_or_else(|| Dimension::new(name, length))
}

/// Median of successive absolute differences; `None` for fewer than 2 points.
fn average_interval(coord: &[f64]) -> Option<f64> {
    if coord.len() < 2 {
        return None;
    }
    let mut diffs: Vec<f64> = coord.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    diffs.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = diffs.len() / 2;
    Some(if diffs.len() % 2 == 0 { (diffs[mid - 1] + diffs[mid]) / 2.0 } else { diffs[mid] })
}

fn format_param_value(v: &ParamValue) -> String {
    match v {
        ParamValue::Char(s) => s.clone(),
        ParamValue::Int(i) => i.to_string(),
        ParamValue::IntVec(vec) => vec.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(","),
        ParamValue::Double(d) => {
            if d.fract() == 0.0 {
                format!("{}", *d as i64)
            } else {
                format!("{d}")
            }
        }
        ParamValue::DoubleVec(vec) => {
            vec.iter().map(|x| format_param_value(&ParamValue::Double(*x))).collect::<Vec<_>>().join(",")
        }
    }
}

fn record_kernel_params(
    params: &mut ParamStore,
    in_var: &Variable,
    in_dim: &Dimension,
    out_var: &Variable,
    out_dim: &Dimension,
    out_var_name: &str,
) {
    for key in TRANSFORM_PARAM_KEYS {
        if let Some(v) = out_var.get_param_for_dim(out_dim, key).or_else(|| in_var.get_param_for_dim(in_dim, key)) {
            params.append(key, &format_param_value(v), &out_dim.name, out_var_name);
        }
    }
}

/// Broadcast or copy `qc_var`'s raw integer QC into a buffer the shape of
/// `in_var`: dimensions `qc_var` lacks (matched by name) are replicated.
fn lift_qc(in_var: &Variable, qc_var: Option<&Variable>) -> Vec<i32> {
    let n = in_var.len();
    match qc_var {
        None => vec![0; n],
        Some(qc) if qc.rank() == in_var.rank() => qc.data.iter().map(|v| *v as i32).collect(),
        Some(qc) => {
            let strides = in_var.strides();
            let qc_strides = qc.strides();
            let dim_map: Vec<Option<usize>> =
                in_var.dim_names.iter().map(|name| qc.dim_names.iter().position(|d| d == name)).collect();
            let mut out = vec![0i32; n];
            for k in 0..n {
                let mut rem = k;
                let mut qc_index = 0usize;
                for d in 0..in_var.shape.len() {
                    let idx = rem / strides[d];
                    rem %= strides[d];
                    if let Some(qd) = dim_map[d] {
                        qc_index += idx * qc_strides[qd];
                    }
                }
                out[k] = qc.data[qc_index] as i32;
            }
            out
        }
    }
}

/// Backward walk over the execution order: the last-executed group always
/// qualifies (by the time its own metrics are created every dimension in
/// `current_layout` already holds its true final length). An earlier group
/// at position `n` qualifies only if every group still pending at that point
/// (positions `n+1..=last`, including the truly last one) preserves
/// per-dimension shape, since those dimensions are still standing in with
/// their pre-transform length when this group's metric buffer is sized.
fn compute_okshape(groups: &[DimGroup], order_of: &[usize], dataset: &Dataset) -> Vec<bool> {
    let g_count = order_of.len();
    let mut okshape = vec![false; g_count];
    if g_count == 0 {
        return okshape;
    }
    let shape_preserved = |group: &DimGroup| {
        group.input_dim_names.len() == group.output_dim_names.len()
            && group.input_dim_names.iter().zip(&group.output_dim_names).all(|(iname, oname)| {
                let ilen = dataset.dim(iname).map(|d| d.length).unwrap_or(0);
                let olen = dataset.dim(oname).map(|d| d.length).unwrap_or(0);
                ilen == olen
            })
    };
    okshape[g_count - 1] = true;
    for n in (0..g_count - 1).rev() {
        let next_group = &groups[order_of[n + 1]];
        okshape[n] = shape_preserved(next_group) && okshape[n + 1];
    }
    okshape
}

/// Base flat offsets (in a group-indexed row-major buffer with lengths
/// `lens` and strides `stride`) for every slice that fixes every group
/// except `g`. Element `j` of slice `s` then sits at `offset[s] + j*stride[g]`.
fn slice_base_offsets(lens: &[usize], stride: &[usize], g: usize) -> Vec<usize> {
    let other_groups: Vec<usize> = (0..lens.len()).filter(|&gg| gg != g).collect();
    let other_lens: Vec<usize> = other_groups.iter().map(|&gg| lens[gg]).collect();
    let other_strides = strides_for(&other_lens);
    let n_slices: usize = other_lens.iter().product();
    (0..n_slices)
        .map(|s| {
            other_groups.iter().zip(&other_strides).fold(0usize, |acc, (&gg, &os)| {
                let digit = (s / os) % lens[gg];
                acc + digit * stride[gg]
            })
        })
        .collect()
}

/// The per-original-dimension name and length lists for the working buffer's
/// current layout: groups not yet transformed still contribute their input
/// dimension names/lengths, already-transformed groups contribute their
/// output ones. Dimension lengths come straight from the dataset since
/// individual dimensions never change size mid-pipeline, only which side of
/// a group they belong to.
fn current_layout(groups: &[DimGroup], transformed: &[bool], dataset: &Dataset) -> (Vec<String>, Vec<usize>) {
    let mut names = Vec::new();
    let mut lens = Vec::new();
    for (gg, done) in transformed.iter().enumerate() {
        let dnames = if *done { &groups[gg].output_dim_names } else { &groups[gg].input_dim_names };
        for dn in dnames {
            names.push(dn.clone());
            lens.push(dataset.dim(dn).map(|d| d.length).unwrap_or(1));
        }
    }
    (names, lens)
}

fn metric_sibling_name(out_var_name: &str, metric_name: &str) -> String {
    match out_var_name.find('@') {
        Some(at_pos) => format!("{}_{}{}", &out_var_name[..at_pos], metric_name, &out_var_name[at_pos..]),
        None => format!("{out_var_name}_{metric_name}"),
    }
}

fn caracena_geometry(
    dataset: &Dataset,
    out_var: &Variable,
    out_dim: &Dimension,
    group: &DimGroup,
) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>), DriverError> {
    let lat_field = out_var.get_param_for_dim(out_dim, "lat_field").and_then(|v| v.as_str()).unwrap_or("lat").to_string();
    let lon_field = out_var.get_param_for_dim(out_dim, "lon_field").and_then(|v| v.as_str()).unwrap_or("lon").to_string();

    let station_lat = dataset.var(&lat_field).ok_or_else(|| DriverError::MissingCoordinateVar(lat_field.clone()))?.data.clone();
    let station_lon = dataset.var(&lon_field).ok_or_else(|| DriverError::MissingCoordinateVar(lon_field.clone()))?.data.clone();

    if group.output_dim_names.len() != 2 {
        return Err(DriverError::NoTransform {
            input_offset: group.input_offset,
            input_dims: group.input_dim_names.clone(),
            output_dims: group.output_dim_names.clone(),
        });
    }
    let lat_dim_name = &group.output_dim_names[0];
    let lon_dim_name = &group.output_dim_names[1];
    let lat_coord = dataset.var(lat_dim_name).ok_or_else(|| DriverError::MissingCoordinateVar(lat_dim_name.clone()))?;
    let lon_coord = dataset.var(lon_dim_name).ok_or_else(|| DriverError::MissingCoordinateVar(lon_dim_name.clone()))?;

    let n_lat = lat_coord.data.len();
    let n_lon = lon_coord.data.len();
    let mut grid_lat = Vec::with_capacity(n_lat * n_lon);
    let mut grid_lon = Vec::with_capacity(n_lat * n_lon);
    for i in 0..n_lat {
        for j in 0..n_lon {
            grid_lat.push(lat_coord.data[i]);
            grid_lon.push(lon_coord.data[j]);
        }
    }
    Ok((station_lat, station_lon, grid_lat, grid_lon))
}
