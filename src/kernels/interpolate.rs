//! Bilinear interpolation kernel (§4.6.1). Grounded on
//! `trans_interpolate.c`'s `trans_interpolate_interface`/
//! `bilinear_interpolate`.

use crate::kernels::{Kernel, KernelCall, KernelError};
use crate::metrics::{MetricSpec, MetricTable};
use crate::qc::{QcCode, QcCodeTable};

const METRICS: [MetricSpec; 2] = [
    MetricSpec { name: "dist_1", unit: "SAME" },
    MetricSpec { name: "dist_2", unit: "SAME" },
];

pub struct Interpolate;

fn resolve_range(call: &KernelCall) -> f64 {
    call.input_var
        .get_param_for_dim(&call.input_dim, "range")
        .or_else(|| call.output_var.get_param_for_dim(&call.output_dim, "range"))
        .and_then(|v| v.as_f64())
        .unwrap_or(f64::MAX)
}

fn usable(array: &[f64], qc: &[i32], missing: f64, qc_mask: u32, i: usize) -> bool {
    (array[i] - missing).abs() > 1e-8 && (qc[i] as u32 & qc_mask) == 0 && array[i].is_finite()
}

/// Fill the whole output slice with missing + the given codes.
fn fill_all_missing(call: &mut KernelCall, codes: &QcCodeTable, extra: QcCode) {
    let nt = call.output_data.len();
    let missing = call.output_missing;
    for k in 0..nt {
        call.output_data[k] = missing;
        call.output_qc[k] = codes.set(call.output_qc[k] as u32, extra) as i32;
        call.output_qc[k] = codes.set(call.output_qc[k] as u32, QcCode::Bad) as i32;
    }
    if let Some(met) = call.met.as_mut() {
        for m in 0..met.n_metrics() {
            for k in 0..nt {
                met.set(m, k, missing);
            }
        }
    }
}

impl Kernel for Interpolate {
    fn call(&self, call: &mut KernelCall) -> Result<(), KernelError> {
        let codes = QcCodeTable::default();
        let ni = call.input_mid.len();
        let nt = call.output_mid.len();
        call.met = Some(MetricTable::allocate(METRICS.to_vec(), nt));

        if ni < 2 {
            fill_all_missing(call, &codes, QcCode::OutsideRange);
            return Ok(());
        }

        let index = call.input_mid.clone();
        let target = call.output_mid.clone();
        let array = call.input_data.clone();
        let qc_array = call.input_qc.clone();
        let qc_mask = call.qc_mask;
        let input_missing = call.input_missing;
        let output_missing = call.output_missing;
        let range = resolve_range(call);

        let sign: f64 = if nt > 1 {
            if index[0] < index[1] && target[0] < target[1] {
                1.0
            } else if index[0] > index[1] && target[0] > target[1] {
                -1.0
            } else {
                return Err(KernelError::NonMonotonicAxis);
            }
        } else {
            1.0
        };

        let mut i = 0usize;
        for j in 0..nt {
            call.output_qc[j] = 0;

            let lower = index[0] - (index[1] - index[0]) / 2.0;
            let upper = index[ni - 1] + (index[ni - 1] - index[ni - 2]) / 2.0;
            if sign * target[j] < sign * lower || sign * target[j] > sign * upper {
                call.output_data[j] = output_missing;
                set_metric(call, 0, j, output_missing);
                set_metric(call, 1, j, output_missing);
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::OutsideRange) as i32;
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Bad) as i32;
                continue;
            }

            while i < ni && sign * index[i] < sign * target[j] {
                i += 1;
            }

            if i < ni
                && (target[j] - index[i]).abs() < 1e-8
                && usable(&array, &qc_array, input_missing, qc_mask, i)
            {
                call.output_data[j] = array[i];
                set_metric(call, 0, j, 0.0);
                set_metric(call, 1, j, 0.0);
                continue;
            }

            let (mut n1, mut n2): (i64, i64) = if i == ni {
                (ni as i64 - 2, ni as i64 - 1)
            } else if i == 0 {
                (0, 1)
            } else {
                (i as i64 - 1, i as i64)
            };

            while n1 >= 0
                && (!usable(&array, &qc_array, input_missing, qc_mask, n1 as usize))
            {
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Interpolate) as i32;
                n1 -= 1;
            }
            while n1 < ni as i64
                && (n1 < 0
                    || n1 == n2
                    || !usable(&array, &qc_array, input_missing, qc_mask, n1 as usize))
            {
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Interpolate) as i32;
                n1 += 1;
            }

            if n1 >= ni as i64 {
                fill_all_missing(call, &codes, QcCode::AllBadInputs);
                return Ok(());
            }

            while n2 < ni as i64
                && (n2 == n1 || !usable(&array, &qc_array, input_missing, qc_mask, n2 as usize))
            {
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Interpolate) as i32;
                n2 += 1;
            }
            while n2 > 0
                && (n2 == n1
                    || n2 >= ni as i64
                    || !usable(&array, &qc_array, input_missing, qc_mask, n2 as usize))
            {
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Interpolate) as i32;
                n2 -= 1;
            }

            if n2 >= ni as i64 || n2 <= 0 || n2 == n1 {
                fill_all_missing(call, &codes, QcCode::AllBadInputs);
                return Ok(());
            }

            let (n1, n2) = (n1 as usize, n2 as usize);
            let x = target[j];
            let (x1, x2) = (index[n1], index[n2]);
            let (y1, y2) = (array[n1], array[n2]);

            if (x - x1).abs() > range || (x - x2).abs() > range {
                call.output_data[j] = output_missing;
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::OutsideRange) as i32;
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Bad) as i32;
                continue;
            }

            let u = (x - x1) / (x2 - x1);
            call.output_data[j] = u * y2 + (1.0 - u) * y1;
            set_metric(call, 0, j, x1 - x);
            set_metric(call, 1, j, x2 - x);

            if !(0.0..=1.0).contains(&u) {
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Extrapolate) as i32;
            }

            if (u - 1.0).abs() > 1e-5 && (qc_array[n1] as u32 & !qc_mask) != 0 {
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Indeterminate) as i32;
            }
            if u.abs() > 1e-5 && (qc_array[n2] as u32 & !qc_mask) != 0 {
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Indeterminate) as i32;
            }
        }

        Ok(())
    }
}

fn set_metric(call: &mut KernelCall, metric_idx: usize, sample_idx: usize, value: f64) {
    if let Some(met) = call.met.as_mut() {
        met.set(metric_idx, sample_idx, value);
    }
}
