//! Nearest-neighbor subsample kernel (§4.6.2). Grounded on
//! `trans_subsample.c`'s `trans_subsample_interface`/`subsample`, including
//! the "last-good-distance" heuristic (`smallest_d_last_good_value`) that
//! lets a later output prefer a farther-but-still-nearest-so-far good input
//! over a closer bad one within the same scan window (see DESIGN.md Open
//! Question 4).

use crate::kernels::{Kernel, KernelCall, KernelError};
use crate::metrics::{MetricSpec, MetricTable};
use crate::qc::{QcCode, QcCodeTable};

const METRICS: [MetricSpec; 1] = [MetricSpec { name: "dist", unit: "SAME" }];

pub struct Subsample;

fn resolve_range(call: &KernelCall) -> f64 {
    call.input_var
        .get_param_for_dim(&call.input_dim, "range")
        .or_else(|| call.output_var.get_param_for_dim(&call.output_dim, "range"))
        .and_then(|v| v.as_f64())
        .unwrap_or(f64::MAX)
}

fn is_usable(array: &[f64], qc: &[i32], missing: f64, qc_mask: u32, i: usize) -> bool {
    array[i] != missing && (qc[i] as u32 & qc_mask) == 0 && array[i].is_finite()
}

impl Kernel for Subsample {
    fn call(&self, call: &mut KernelCall) -> Result<(), KernelError> {
        let codes = QcCodeTable::default();
        let ni = call.input_mid.len();
        let nt = call.output_mid.len();
        call.met = Some(MetricTable::allocate(METRICS.to_vec(), nt));

        let index = call.input_mid.clone();
        let target = call.output_mid.clone();
        let array = call.input_data.clone();
        let qc_array = call.input_qc.clone();
        let qc_mask = call.qc_mask;
        let input_missing = call.input_missing;
        let output_missing = call.output_missing;
        let range = resolve_range(call);

        let mut iold = 0usize;
        let mut smallest_d_last_good_value = 0.0f64;

        let mut j = 0usize;
        'outer: while j < nt {
            call.output_qc[j] = 0;
            let mut i = iold;

            let mut dist = f64::INFINITY;
            let mut smallest_d = dist;
            let mut it: i64 = -1;

            while i < ni && index[i] < target[j] - range {
                i += 1;
            }

            if i == ni {
                while j < nt {
                    call.output_qc[j] = 0;
                    call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::OutsideRange) as i32;
                    call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Bad) as i32;
                    call.output_data[j] = output_missing;
                    call.met.as_mut().unwrap().set(0, j, output_missing);
                    j += 1;
                }
                break 'outer;
            }

            let mut first_iteration = true;
            while i < ni {
                let d = (index[i] - target[j]).abs();
                if d > range {
                    break;
                }
                if d < smallest_d {
                    smallest_d = d;
                }
                if j != 0 && first_iteration && index[i] > target[j] {
                    smallest_d = smallest_d_last_good_value;
                }
                if d < dist && is_usable(&array, &qc_array, input_missing, qc_mask, i) {
                    dist = d;
                    it = i as i64;
                }
                if d > dist && it > 0 {
                    break;
                }
                first_iteration = false;
                i += 1;
            }

            if it < 0 {
                call.output_data[j] = output_missing;
                call.met.as_mut().unwrap().set(0, j, output_missing);
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::AllBadInputs) as i32;
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Bad) as i32;

                if i == ni {
                    let mut j2 = j + 1;
                    while j2 < nt {
                        call.output_data[j2] = output_missing;
                        call.met.as_mut().unwrap().set(0, j2, output_missing);
                        call.output_qc[j2] = 0;
                        call.output_qc[j2] = codes.set(call.output_qc[j2] as u32, QcCode::Bad) as i32;
                        if target[j2] < index[ni - 1] + range {
                            call.output_qc[j2] =
                                codes.set(call.output_qc[j2] as u32, QcCode::AllBadInputs) as i32;
                        } else {
                            call.output_qc[j2] =
                                codes.set(call.output_qc[j2] as u32, QcCode::OutsideRange) as i32;
                        }
                        j2 += 1;
                    }
                    break 'outer;
                }

                iold = i;
                j += 1;
                continue;
            }

            let it = it as usize;
            call.output_data[j] = array[it];
            smallest_d_last_good_value = smallest_d;
            iold = it;
            call.met.as_mut().unwrap().set(0, j, index[it] - target[j]);

            if (qc_array[it] as u32 & !qc_mask) != 0 {
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Indeterminate) as i32;
            }
            if dist > smallest_d {
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::NotUsingClosest) as i32;
            }

            j += 1;
        }

        Ok(())
    }
}
