//! Trivial slice-for-slice passthrough kernel (§4.6.4), grounded on
//! `trans_passthrough.c`'s `trans_passthrough_interface` (length check,
//! `memcpy` of data and QC, metric buffer freed/unused).

use crate::kernels::{Kernel, KernelCall, KernelError};

pub struct Passthrough;

impl Kernel for Passthrough {
    fn call(&self, call: &mut KernelCall) -> Result<(), KernelError> {
        let ni = call.input_data.len();
        let nt = call.output_data.len();
        if ni != nt {
            return Err(KernelError::InsufficientInput { needed: nt, got: ni });
        }
        call.output_data.copy_from_slice(&call.input_data);
        call.output_qc.copy_from_slice(&call.input_qc);
        call.met = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_data_and_qc_verbatim() {
        let mut call = KernelCall::new_for_test();
        call.input_data = vec![1.0, 2.0, 3.0];
        call.input_qc = vec![0, 5, 0];
        call.output_data = vec![0.0; 3];
        call.output_qc = vec![0; 3];
        Passthrough.call(&mut call).unwrap();
        assert_eq!(call.output_data, vec![1.0, 2.0, 3.0]);
        assert_eq!(call.output_qc, vec![0, 5, 0]);
        assert!(call.met.is_none());
    }

    #[test]
    fn mismatched_lengths_fail() {
        let mut call = KernelCall::new_for_test();
        call.input_data = vec![1.0, 2.0];
        call.output_data = vec![0.0; 3];
        call.output_qc = vec![0; 3];
        let err = Passthrough.call(&mut call).unwrap_err();
        assert!(matches!(err, KernelError::InsufficientInput { .. }));
    }
}
