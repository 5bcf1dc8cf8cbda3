//! Scattered-station-to-2-D-grid objective analysis (C7). Grounded on
//! `trans_caracena.c`'s `trans_caracena_interface`/`caracena`/`mdist`/
//! `M_invert`/`M_mult`.
//!
//! The driver gathers station values plus their `lat`/`lon` positions and
//! the output grid's flattened `lat`/`lon` into a [`KernelCall`]'s
//! `station_lat`/`station_lon`/`grid_lat`/`grid_lon` fields (§4.7 step 1 is
//! the driver's job: this kernel only sees already-filtered-by-shape
//! slices, same as the four 1-D kernels).

use nalgebra::DMatrix;
use thiserror::Error;

use crate::kernels::{Kernel, KernelCall, KernelError};
use crate::metrics::{MetricSpec, MetricTable};
use crate::qc::{QcCode, QcCodeTable};

const METRICS: [MetricSpec; 3] = [
    MetricSpec { name: "nstat", unit: "unitless" },
    MetricSpec { name: "deriv_lat", unit: "SAME" },
    MetricSpec { name: "deriv_lon", unit: "SAME" },
];

#[derive(Debug, Error)]
pub enum CaracenaError {
    #[error("station_lat/station_lon/input_data must all have the same length, got {ns_data} data, {ns_lat} lat, {ns_lon} lon")]
    MismatchedStationCounts { ns_data: usize, ns_lat: usize, ns_lon: usize },
    #[error("min_stations must be >= 1, got {0}")]
    NonPositiveMinStations(i64),
}

#[derive(Debug, Default)]
pub struct CaracenaKernel;

/// Great-circle-ish distance in metres between two lat/lon points, plus the
/// signed lat/lon components (first point relative to second). Identical
/// points within 0.001 degrees collapse to zero, matching the original's
/// "idiot proof" shortcut.
fn mdist(lat1: f64, lat2: f64, lon1: f64, lon2: f64) -> (f64, f64, f64) {
    if (lat1 - lat2).abs() < 0.001 && (lon1 - lon2).abs() < 0.001 {
        return (0.0, 0.0, 0.0);
    }
    let mlat = (lat1 + lat2) / 2.0;
    let cosm = (mlat * 0.017453292).cos();
    let dlat_m = (lat1 - lat2) * 111190.0;
    let dlon_m = (lon1 - lon2) * 111190.0 * cosm;
    let dist = (dlat_m * dlat_m + dlon_m * dlon_m).sqrt();
    (dist, dlat_m, dlon_m)
}

fn resolve_min_stations(call: &KernelCall) -> Result<usize, CaracenaError> {
    let n = call
        .output_var
        .get_param_for_dim(&call.output_dim, "min_stations")
        .and_then(|v| v.as_i64())
        .unwrap_or(15);
    if n <= 0 {
        return Err(CaracenaError::NonPositiveMinStations(n));
    }
    Ok(n as usize)
}

fn resolve_npass(call: &KernelCall) -> usize {
    call.output_var
        .get_param_for_dim(&call.output_dim, "number_of_passes")
        .and_then(|v| v.as_i64())
        .filter(|n| *n > 0)
        .unwrap_or(16) as usize
}

fn resolve_scale_factor(call: &KernelCall) -> f64 {
    call.output_var
        .get_param_for_dim(&call.output_dim, "scale_factor")
        .and_then(|v| v.as_f64())
        .unwrap_or(100.0)
}

/// Fill every output sample with `output_missing`, set `BAD` plus `extra`,
/// and zero out the three metrics.
fn fill_all_missing(call: &mut KernelCall, codes: &QcCodeTable, extra: QcCode) {
    let no = call.output_data.len();
    let missing = call.output_missing;
    for o in 0..no {
        call.output_data[o] = missing;
        call.output_qc[o] = codes.set(call.output_qc[o] as u32, extra) as i32;
        call.output_qc[o] = codes.set(call.output_qc[o] as u32, QcCode::Bad) as i32;
    }
    if let Some(met) = call.met.as_mut() {
        for m in 0..met.n_metrics() {
            for o in 0..no {
                met.set(m, o, missing);
            }
        }
    }
}

impl Kernel for CaracenaKernel {
    fn call(&self, call: &mut KernelCall) -> Result<(), KernelError> {
        let codes = QcCodeTable::default();
        let ni = call.input_data.len();
        let no = call.output_data.len();
        call.met = Some(MetricTable::allocate(METRICS.to_vec(), no));

        if call.station_lat.len() != ni || call.station_lon.len() != ni {
            return Err(KernelError::ParamTypeMismatch(
                CaracenaError::MismatchedStationCounts {
                    ns_data: ni,
                    ns_lat: call.station_lat.len(),
                    ns_lon: call.station_lon.len(),
                }
                .to_string(),
            ));
        }

        let min_stations = resolve_min_stations(call)
            .map_err(|e| KernelError::ParamTypeMismatch(e.to_string()))?;
        let npass = resolve_npass(call);
        let l2 = resolve_scale_factor(call).powi(2) * 1.0e6;

        // Filter stations: drop missing, sentinel, or QC-masked values.
        let mut kdata = Vec::with_capacity(ni);
        let mut klat = Vec::with_capacity(ni);
        let mut klon = Vec::with_capacity(ni);
        for i in 0..ni {
            let v = call.input_data[i];
            if v == call.input_missing || v >= f64::MAX - 1.0 || (call.input_qc[i] as u32 & call.qc_mask) != 0 {
                continue;
            }
            kdata.push(v);
            klat.push(call.station_lat[i]);
            klon.push(call.station_lon[i]);
        }
        let ns = kdata.len();

        for o in 0..no {
            call.output_qc[o] = 0;
        }

        if ns < min_stations {
            fill_all_missing(
                call,
                &codes,
                if ns == 0 { QcCode::AllBadInputs } else { QcCode::SomeBadInputs },
            );
            return Ok(());
        }

        // Weight matrix W[i,j] = exp(-d(i,j)^2 / L^2), row-normalized.
        let mut w = DMatrix::<f64>::zeros(ns, ns);
        for i in 0..ns {
            let mut row_sum = 0.0;
            for j in 0..ns {
                let (d, _, _) = mdist(klat[i], klat[j], klon[i], klon[j]);
                let value = (-d * d / l2).exp();
                w[(i, j)] = value;
                row_sum += value;
            }
            for j in 0..ns {
                w[(i, j)] /= row_sum;
            }
        }

        let identity = DMatrix::<f64>::identity(ns, ns);
        let i_minus_w = &identity - &w;

        let w_inv = match w.clone().try_inverse() {
            Some(inv) => inv,
            None => {
                fill_all_missing(call, &codes, QcCode::Bad);
                return Ok(());
            }
        };

        // (I - W)^p via repeated squaring plus a residual multiply-out: may
        // overshoot npass by a small constant when npass isn't a power of
        // two, matching the original's loop structure exactly rather than
        // computing an exact power.
        let mut mwork = i_minus_w.clone();
        let mut i = 2usize;
        while i <= npass {
            mwork = &mwork * &mwork;
            i *= 2;
        }
        for _ in 0..npass.saturating_sub(i / 2) {
            mwork = &mwork * &i_minus_w;
        }

        let correction_pre = &identity - &mwork;
        let c = &w_inv * &correction_pre;

        let f = DMatrix::from_row_slice(ns, 1, &kdata);
        let f_corrected = &c * &f;

        let lat_mean: f64 = call.grid_lat.iter().sum::<f64>() / no as f64;
        let lon_mean: f64 = call.grid_lon.iter().sum::<f64>() / no as f64;
        let rlat: Vec<f64> = klat.iter().zip(&klon).map(|(&la, &lo)| mdist(la, lat_mean, lo, lon_mean).1).collect();
        let rlon: Vec<f64> = klat.iter().zip(&klon).map(|(&la, &lo)| mdist(la, lat_mean, lo, lon_mean).2).collect();

        for o in 0..no {
            let mut n_r = 0.0;
            let mut w_r = vec![0.0; ns];
            for s in 0..ns {
                let (d, _, _) = mdist(klat[s], call.grid_lat[o], klon[s], call.grid_lon[o]);
                let value = (-d * d / l2).exp();
                w_r[s] = value;
                n_r += value;
            }

            let mut out = 0.0;
            for s in 0..ns {
                out += w_r[s] * f_corrected[(s, 0)] / n_r;
            }
            call.output_data[o] = out;

            let mut f_rlat = 0.0;
            let mut f_rlon = 0.0;
            let mut r_lat = 0.0;
            let mut r_lon = 0.0;
            for s in 0..ns {
                let weighted = w_r[s] * f_corrected[(s, 0)] / n_r;
                f_rlat += f_corrected[(s, 0)] * rlat[s] * weighted;
                f_rlon += f_corrected[(s, 0)] * rlon[s] * weighted;
                r_lat += rlat[s] * weighted;
                r_lon += rlon[s] * weighted;
            }
            let deriv_lat = 2.0 * (f_rlat - out * r_lat) / l2;
            let deriv_lon = 2.0 * (f_rlon - out * r_lon) / l2;

            let met = call.met.as_mut().unwrap();
            met.set(0, o, ns as f64);
            met.set(1, o, deriv_lat);
            met.set(2, o, deriv_lon);
        }

        if ns < ni {
            for o in 0..no {
                call.output_qc[o] = codes.set(call.output_qc[o] as u32, QcCode::SomeBadInputs) as i32;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn grid() -> (Vec<f64>, Vec<f64>) {
        let mut lat = Vec::new();
        let mut lon = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                lat.push(i as f64);
                lon.push(j as f64);
            }
        }
        (lat, lon)
    }

    fn call_for(data: Vec<f64>, lat: Vec<f64>, lon: Vec<f64>, min_stations: i64) -> KernelCall {
        let (grid_lat, grid_lon) = grid();
        let no = grid_lat.len();
        let mut call = KernelCall::new_for_test();
        let ni = data.len();
        call.input_data = data;
        call.input_qc = vec![0; ni];
        call.station_lat = lat;
        call.station_lon = lon;
        call.output_data = vec![0.0; no];
        call.output_qc = vec![0; no];
        call.grid_lat = grid_lat;
        call.grid_lon = grid_lon;
        call.output_dim.params.set("min_stations", min_stations);
        call.output_dim.params.set("number_of_passes", 4i64);
        call
    }

    #[test]
    fn invariant_7_equal_station_values_reproduce_everywhere_with_zero_gradient() {
        let lat: Vec<f64> = (0..20).map(|i| (i % 5) as f64).collect();
        let lon: Vec<f64> = (0..20).map(|i| (i / 5) as f64).collect();
        let data = vec![5.0; 20];
        let mut call = call_for(data, lat, lon, 15);
        CaracenaKernel.call(&mut call).unwrap();
        for v in &call.output_data {
            assert_abs_diff_eq!(*v, 5.0, epsilon = 1e-6);
        }
        let met = call.met.unwrap();
        for d in &met.metrics[1] {
            assert_abs_diff_eq!(*d, 0.0, epsilon = 1e-6);
        }
        for d in &met.metrics[2] {
            assert_abs_diff_eq!(*d, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn fewer_than_min_stations_is_all_missing_and_bad() {
        let lat = vec![0.0, 1.0, 2.0];
        let lon = vec![0.0, 1.0, 2.0];
        let data = vec![1.0, 2.0, 3.0];
        let mut call = call_for(data, lat, lon, 15);
        CaracenaKernel.call(&mut call).unwrap();
        let codes = QcCodeTable::default();
        assert!(call.output_data.iter().all(|v| *v == call.output_missing));
        assert!(call.output_qc.iter().all(|q| codes.test(*q as u32, QcCode::Bad)));
        assert!(call.output_qc.iter().all(|q| codes.test(*q as u32, QcCode::SomeBadInputs)));
    }

    #[test]
    fn zero_stations_sets_all_bad_inputs() {
        let mut call = call_for(Vec::new(), Vec::new(), Vec::new(), 15);
        CaracenaKernel.call(&mut call).unwrap();
        let codes = QcCodeTable::default();
        assert!(call.output_qc.iter().all(|q| codes.test(*q as u32, QcCode::AllBadInputs)));
    }

    #[test]
    fn mismatched_station_arrays_is_an_error() {
        let mut call = call_for(vec![1.0, 2.0], vec![0.0], vec![0.0], 15);
        let err = CaracenaKernel.call(&mut call).unwrap_err();
        assert!(matches!(err, KernelError::ParamTypeMismatch(_)));
    }
}
