//! QC bit algebra (C1): set/clear/test operations on a 32-bit mask, and
//! resolution of a variable's QC mask and canonical mapping function.
//!
//! Bit positions are 1-based in parameter names (`bit_1_assessment`, …) but
//! stored as `1 << (b - 1)`. A code whose position is `0` is disabled: every
//! operation on it is a no-op, matching the original `qc_set`/`qc_check`/
//! `qc_clear` macros' `bit > 0` guard (this is how a site can silence a
//! canonical code it doesn't use, by setting its position to 0).

use strum::{Display, EnumIter};
use thiserror::Error;

use crate::data_model::{Dataset, Variable};

#[derive(Debug, Error)]
pub enum QcError {
    #[error("parameter '{0}' has a type incompatible with a QC mask (expected int)")]
    MaskTypeMismatch(String),
}

/// One of the canonical QC codes. The numeric value is the 1-based bit
/// position; `0` means "disabled" (all operations on it are no-ops).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum QcCode {
    Bad,
    Indeterminate,
    Interpolate,
    Extrapolate,
    NotUsingClosest,
    SomeBadInputs,
    ZeroWeight,
    OutsideRange,
    AllBadInputs,
    BadStd,
    IndeterminateStd,
    BadGoodfrac,
    IndeterminateGoodfrac,
    EstimatedInputBin,
    EstimatedOutputBin,
}

/// The table of bit positions, one per canonical code. `0` disables the
/// code. The default assigns every code a distinct bit, 1-based in
/// declaration order, matching spec.md's canonical set.
#[derive(Debug, Clone, Copy)]
pub struct QcCodeTable {
    positions: [u8; 15],
}

impl Default for QcCodeTable {
    fn default() -> Self {
        let mut positions = [0u8; 15];
        for (i, p) in positions.iter_mut().enumerate() {
            *p = (i + 1) as u8;
        }
        Self { positions }
    }
}

impl QcCodeTable {
    fn index(code: QcCode) -> usize {
        use QcCode::*;
        match code {
            Bad => 0,
            Indeterminate => 1,
            Interpolate => 2,
            Extrapolate => 3,
            NotUsingClosest => 4,
            SomeBadInputs => 5,
            ZeroWeight => 6,
            OutsideRange => 7,
            AllBadInputs => 8,
            BadStd => 9,
            IndeterminateStd => 10,
            BadGoodfrac => 11,
            IndeterminateGoodfrac => 12,
            EstimatedInputBin => 13,
            EstimatedOutputBin => 14,
        }
    }

    pub fn position(&self, code: QcCode) -> u8 {
        self.positions[Self::index(code)]
    }

    /// Disable a code: all subsequent operations on it become no-ops.
    pub fn disable(&mut self, code: QcCode) {
        self.positions[Self::index(code)] = 0;
    }

    fn bit_value(&self, code: QcCode) -> u32 {
        let pos = self.position(code);
        if pos > 0 {
            1u32 << (pos - 1)
        } else {
            0
        }
    }

    pub fn set(&self, state: u32, code: QcCode) -> u32 {
        state | self.bit_value(code)
    }

    pub fn clear(&self, state: u32, code: QcCode) -> u32 {
        state & !self.bit_value(code)
    }

    pub fn test(&self, state: u32, code: QcCode) -> bool {
        let bit = self.bit_value(code);
        bit != 0 && (state & bit) != 0
    }

    pub fn test_mask(&self, state: u32, mask: u32) -> bool {
        (state & mask) != 0
    }
}

/// Scan a variable's own attributes named `bit_<N>_assessment`; if none are
/// found, scan the parent dataset's attributes named `qc_bit_<N>_assessment`.
/// OR together the bit value for every `N` whose assessment reads "Bad". If
/// nothing is found at all, default to `1 << (BAD - 1)`.
pub fn qc_mask_for(var: &Variable, dataset: &Dataset, codes: &QcCodeTable) -> u32 {
    let own: Vec<_> = var.params.keys_with_prefix("bit_").collect();
    let scan_target: Vec<_> = if !own.is_empty() {
        own
    } else {
        dataset.params.keys_with_prefix("qc_bit_").collect()
    };

    let mut mask = 0u32;
    let mut found = false;
    for (rest, value) in scan_target {
        let Some(n_str) = rest.strip_suffix("_assessment") else {
            continue;
        };
        let Ok(n) = n_str.parse::<u8>() else {
            continue;
        };
        if n == 0 {
            continue;
        }
        if value.as_str() == Some("Bad") {
            mask |= 1u32 << (n - 1);
            found = true;
        }
    }

    if found {
        mask
    } else {
        codes.bit_value(QcCode::Bad)
    }
}

/// Resolve the effective QC mask for `var`: an explicit `qc_mask` parameter
/// (a literal mask value, not a bit position) takes priority; otherwise
/// fall back to scanning assessment attributes via [`qc_mask_for`].
pub fn resolve_qc_mask(var: &Variable, dataset: &Dataset, codes: &QcCodeTable) -> Result<u32, QcError> {
    if let Some(value) = var.get_param("qc_mask") {
        return value
            .as_i64()
            .map(|v| v as u32)
            .ok_or_else(|| QcError::MaskTypeMismatch("qc_mask".to_string()));
    }
    Ok(qc_mask_for(var, dataset, codes))
}

/// A site-specific-integer-to-canonical-QC mapping function. Installed
/// globally via the registry (spec §5: install-time-only mutability).
pub type QcMappingFn = fn(data_value: f64, raw_qc: i32) -> u32;

/// Built-in default mapping: values present in `qc_bad` become BAD, any
/// other nonzero raw value becomes INDETERMINATE.
pub fn default_qc_mapping(qc_bad: &[i64], codes: &QcCodeTable) -> impl Fn(f64, i32) -> u32 + '_ {
    move |_data_value, raw_qc| {
        if qc_bad.contains(&(raw_qc as i64)) {
            codes.bit_value(QcCode::Bad)
        } else if raw_qc != 0 {
            codes.bit_value(QcCode::Indeterminate)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample_var() -> Variable {
        Variable::new("temp", vec!["time".to_string()], vec![3], vec![0.0; 3])
    }

    #[rstest]
    #[case(QcCode::Bad)]
    #[case(QcCode::Indeterminate)]
    #[case(QcCode::Interpolate)]
    #[case(QcCode::Extrapolate)]
    #[case(QcCode::NotUsingClosest)]
    #[case(QcCode::SomeBadInputs)]
    #[case(QcCode::ZeroWeight)]
    #[case(QcCode::OutsideRange)]
    #[case(QcCode::AllBadInputs)]
    #[case(QcCode::BadStd)]
    #[case(QcCode::IndeterminateStd)]
    #[case(QcCode::BadGoodfrac)]
    #[case(QcCode::IndeterminateGoodfrac)]
    #[case(QcCode::EstimatedInputBin)]
    #[case(QcCode::EstimatedOutputBin)]
    fn set_clear_test_roundtrip(#[case] code: QcCode) {
        let codes = QcCodeTable::default();
        let other = if matches!(code, QcCode::Bad) { QcCode::Indeterminate } else { QcCode::Bad };
        let mut state = 0u32;
        state = codes.set(state, code);
        assert!(codes.test(state, code));
        assert!(!codes.test(state, other));
        state = codes.clear(state, code);
        assert!(!codes.test(state, code));
    }

    #[test]
    fn disabled_code_is_a_noop() {
        let mut codes = QcCodeTable::default();
        codes.disable(QcCode::Bad);
        let mut state = 0u32;
        state = codes.set(state, QcCode::Bad);
        assert_eq!(state, 0);
        assert!(!codes.test(state, QcCode::Bad));
    }

    #[test]
    fn mask_defaults_to_bad_bit_when_nothing_configured() {
        let codes = QcCodeTable::default();
        let var = sample_var();
        let dataset = Dataset::new("ds");
        let mask = qc_mask_for(&var, &dataset, &codes);
        assert_eq!(mask, codes.bit_value(QcCode::Bad));
    }

    #[test]
    fn mask_scans_variable_assessment_attributes_first() {
        let codes = QcCodeTable::default();
        let mut var = sample_var();
        var.params.set("bit_1_assessment", "Bad");
        var.params.set("bit_2_assessment", "Good");
        let mut dataset = Dataset::new("ds");
        dataset.params.set("qc_bit_3_assessment", "Bad");
        let mask = qc_mask_for(&var, &dataset, &codes);
        assert_eq!(mask, 1 << 0);
    }

    #[test]
    fn mask_falls_back_to_dataset_attributes() {
        let codes = QcCodeTable::default();
        let var = sample_var();
        let mut dataset = Dataset::new("ds");
        dataset.params.set("qc_bit_3_assessment", "Bad");
        let mask = qc_mask_for(&var, &dataset, &codes);
        assert_eq!(mask, 1 << 2);
    }

    #[test]
    fn default_mapping_marks_qc_bad_values_as_bad_and_others_indeterminate() {
        let codes = QcCodeTable::default();
        let qc_bad = vec![2, 9];
        let map_fn = default_qc_mapping(&qc_bad, &codes);
        assert_eq!(map_fn(0.0, 0), 0);
        assert_eq!(map_fn(0.0, 2), codes.bit_value(QcCode::Bad));
        assert_eq!(map_fn(0.0, 5), codes.bit_value(QcCode::Indeterminate));
    }
}
