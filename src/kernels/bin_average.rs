//! Weighted overlap-averaging bin-average kernel (§4.6.3). Grounded on
//! `trans_bin_average.c`'s `trans_bin_average_interface`/`bin_average`.

use crate::kernels::{Kernel, KernelCall, KernelError};
use crate::metrics::{MetricSpec, MetricTable};
use crate::qc::{QcCode, QcCodeTable};

const METRICS: [MetricSpec; 2] = [
    MetricSpec { name: "std", unit: "SAME" },
    MetricSpec { name: "goodfraction", unit: "unitless" },
];

pub struct BinAverage;

fn resolve_weights(call: &KernelCall, ni: usize) -> Vec<f64> {
    call.input_var
        .get_param_for_dim(&call.input_dim, "weights")
        .and_then(|v| v.as_f64_vec())
        .filter(|w| w.len() == ni)
        .unwrap_or_else(|| vec![1.0; ni])
}

fn resolve_limit(call: &KernelCall, name: &str, default: f64) -> f64 {
    call.output_var
        .get_param_for_dim(&call.output_dim, name)
        .and_then(|v| v.as_f64())
        .unwrap_or(default)
}

impl Kernel for BinAverage {
    fn call(&self, call: &mut KernelCall) -> Result<(), KernelError> {
        let codes = QcCodeTable::default();
        let ni = call.input_front.len();
        let nt = call.output_front.len();
        call.met = Some(MetricTable::allocate(METRICS.to_vec(), nt));

        for j in 0..nt {
            if call.output_front[j] - call.output_back[j] == 0.0 {
                return Err(KernelError::ZeroOutputBinWidth);
            }
        }

        let index_start = call.input_front.clone();
        let index_end = call.input_back.clone();
        let target_start = call.output_front.clone();
        let target_end = call.output_back.clone();
        let array = call.input_data.clone();
        let qc_array = call.input_qc.clone();
        let qc_mask = call.qc_mask;
        let input_missing = call.input_missing;
        let output_missing = call.output_missing;
        let weights = resolve_weights(call, ni);

        let std_bad_max = resolve_limit(call, "std_bad_max", f64::MAX);
        let std_ind_max = resolve_limit(call, "std_ind_max", f64::MAX);
        let goodfrac_bad_min = resolve_limit(call, "goodfrac_bad_min", -1.0);
        let goodfrac_ind_min = resolve_limit(call, "goodfrac_ind_min", -1.0);

        let sign: f64 = if (ni == 1 || index_start[0] < index_start[1])
            && (nt == 1 || target_start[0] < target_start[1])
        {
            1.0
        } else if (ni == 1 || index_start[0] > index_start[1])
            && (nt == 1 || target_start[0] > target_start[1])
        {
            -1.0
        } else {
            return Err(KernelError::NonMonotonicAxis);
        };

        let mut i0 = 0usize;
        for j in 0..nt {
            let mut sum_array = 0.0;
            let mut sum_weight = 0.0;
            let mut max_weight = 0.0;
            let mut sum_array2 = 0.0;
            let mut total_span = 0.0;
            let mut good_span = 0.0;
            let mut raw_qco: u32 = 0;
            call.output_qc[j] = 0;

            let mut i = i0;
            while i < ni && sign * index_end[i] < sign * target_start[j] {
                i += 1;
            }
            i0 = i;

            while i < ni && sign * index_start[i] < sign * target_end[j] {
                if sign * index_end[i] < sign * target_start[j] {
                    i += 1;
                    continue;
                }

                let bin = index_end[i] - index_start[i];
                let mut w = 1.0;
                let (u, v);
                if bin == 0.0 {
                    u = 0.0;
                    v = 0.0;
                } else {
                    let uu = (target_start[j] - index_start[i]) / bin;
                    if uu > 0.0 {
                        w -= uu;
                    }
                    u = uu;
                    let vv = (index_end[i] - target_end[j]) / bin;
                    if vv > 0.0 {
                        w -= vv;
                    }
                    v = vv;
                }

                if u > 1.0 || v > 1.0 || u + v > 1.0 || w < 0.0 {
                    return Err(KernelError::ParamTypeMismatch(
                        "bin geometry produced an invalid overlap weight".to_string(),
                    ));
                }

                if bin.abs() > 0.0 {
                    total_span += w * sign * bin;
                } else {
                    total_span += 1.0;
                }

                if w > 0.0 && weights[i] > max_weight {
                    max_weight = weights[i];
                }

                let usable = array[i] != input_missing
                    && (qc_array[i] as u32 & qc_mask) == 0
                    && array[i].is_finite();

                if w > 0.0 && !usable {
                    call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::SomeBadInputs) as i32;
                    i += 1;
                    continue;
                }

                if bin.abs() > 0.0 {
                    good_span += w * sign * bin;
                } else {
                    good_span += 1.0;
                }

                let w = w * weights[i];
                sum_array += w * array[i];
                sum_weight += w;
                sum_array2 += w * array[i] * array[i];

                if w > 0.0 {
                    raw_qco |= qc_array[i] as u32;
                }

                i += 1;
            }

            let (value, std, goodfraction);
            if max_weight == 0.0 && i > i0 {
                value = 0.0;
                std = 0.0;
                goodfraction = 0.0;
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::ZeroWeight) as i32;
            } else if i == i0 {
                value = output_missing;
                std = output_missing;
                goodfraction = 0.0;
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::OutsideRange) as i32;
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Bad) as i32;
            } else if sum_weight == 0.0 {
                value = output_missing;
                std = output_missing;
                goodfraction = 0.0;
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::AllBadInputs) as i32;
                call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Bad) as i32;
            } else {
                value = sum_array / sum_weight;
                let mut s = (sum_weight * sum_array2 - sum_array * sum_array) / (sum_weight * sum_weight);
                if s.abs() < 1e-12 {
                    s = 0.0;
                } else if s < 0.0 {
                    s = output_missing;
                } else {
                    s = s.sqrt();
                }
                std = s;
                goodfraction = good_span / total_span;

                if (raw_qco & !qc_mask) != 0 {
                    call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::Indeterminate) as i32;
                }
            }

            call.output_data[j] = value;
            call.met.as_mut().unwrap().set(0, j, std);
            call.met.as_mut().unwrap().set(1, j, goodfraction);

            if std != output_missing {
                if std > std_bad_max {
                    call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::BadStd) as i32;
                } else if std > std_ind_max {
                    call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::IndeterminateStd) as i32;
                }
            }
            if goodfraction != output_missing {
                if goodfraction < goodfrac_bad_min {
                    call.output_qc[j] = codes.set(call.output_qc[j] as u32, QcCode::BadGoodfrac) as i32;
                } else if goodfraction < goodfrac_ind_min {
                    call.output_qc[j] =
                        codes.set(call.output_qc[j] as u32, QcCode::IndeterminateGoodfrac) as i32;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn call_for(
        front: Vec<f64>,
        back: Vec<f64>,
        data: Vec<f64>,
        qc: Vec<i32>,
        target_front: Vec<f64>,
        target_back: Vec<f64>,
    ) -> KernelCall {
        let mut call = KernelCall::new_for_test();
        let ni = front.len();
        let nt = target_front.len();
        call.input_mid = front.iter().zip(&back).map(|(f, b)| (f + b) / 2.0).collect();
        call.input_front = front;
        call.input_back = back;
        call.input_data = data;
        call.input_qc = qc;
        call.output_mid = target_front.iter().zip(&target_back).map(|(f, b)| (f + b) / 2.0).collect();
        call.output_front = target_front;
        call.output_back = target_back;
        call.output_data = vec![0.0; nt];
        call.output_qc = vec![0; nt];
        call.qc_mask = 1;
        let _ = ni;
        call
    }

    #[test]
    fn scenario_s3_bin_average_with_one_bad_input() {
        let mut call = call_for(
            vec![-0.5, 0.5, 1.5, 2.5],
            vec![0.5, 1.5, 2.5, 3.5],
            vec![10.0, 20.0, 99.0, 40.0],
            vec![0, 0, 1, 0],
            vec![-0.5, 1.5],
            vec![1.5, 3.5],
        );
        BinAverage.call(&mut call).unwrap();
        assert_abs_diff_eq!(call.output_data[0], 15.0);
        assert_abs_diff_eq!(call.output_data[1], 40.0);
        let codes = QcCodeTable::default();
        assert_eq!(call.output_qc[0], 0);
        assert!(codes.test(call.output_qc[1] as u32, QcCode::SomeBadInputs));
        let met = call.met.unwrap();
        assert_abs_diff_eq!(met.metrics[1][0], 1.0);
        assert_abs_diff_eq!(met.metrics[1][1], 0.5);
    }

    #[test]
    fn invariant_4_mean_of_contained_inputs_with_exact_tiling() {
        let mut call = call_for(
            vec![-0.5, 0.5, 1.5, 2.5],
            vec![0.5, 1.5, 2.5, 3.5],
            vec![2.0, 4.0, 6.0, 8.0],
            vec![0, 0, 0, 0],
            vec![-0.5],
            vec![3.5],
        );
        BinAverage.call(&mut call).unwrap();
        assert_abs_diff_eq!(call.output_data[0], 5.0);
        let met = call.met.unwrap();
        assert_abs_diff_eq!(met.metrics[1][0], 1.0);
    }

    #[test]
    fn zero_width_output_bin_is_fatal() {
        let mut call = call_for(vec![0.0], vec![1.0], vec![1.0], vec![0], vec![1.0], vec![1.0]);
        let err = BinAverage.call(&mut call).unwrap_err();
        assert!(matches!(err, KernelError::ZeroOutputBinWidth));
    }
}
