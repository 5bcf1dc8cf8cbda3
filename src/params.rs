//! Parameter store (C4): `(name, value, dimension-tag, field-tag)` records
//! accumulated during a driver run, and the serializer that emits the
//! `cell_transform` provenance string.
//!
//! Grounded on `trans_param_atts.c`'s `trans_store_param`/
//! `trans_build_param_att`. Per the design note in spec.md §9, this is a
//! per-driver-call value (not a process-global linked list); callers create
//! one [`ParamStore`] per `drive(...)` invocation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("parameter '{0}' not found")]
    NotFound(String),
}

const NODIM: &str = "NODIM";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParamRecord {
    name: String,
    value: String,
    dim_tag: String,
    field_tag: String,
}

/// Accumulates transform-parameter provenance records for one driver call
/// and serializes them into the `cell_transform` attribute string.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    records: Vec<ParamRecord>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the tail unless the exact 4-tuple already exists.
    pub fn append(&mut self, name: &str, value: &str, dim_tag: &str, field_tag: &str) {
        let candidate = ParamRecord {
            name: name.to_string(),
            value: value.to_string(),
            dim_tag: dim_tag.to_string(),
            field_tag: field_tag.to_string(),
        };
        if self.records.iter().any(|r| *r == candidate) {
            return;
        }
        self.records.push(candidate);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Emit the `cell_transform` provenance string for `field_tag`: one
    /// `"<dim_tag>: <transform> (k1: v1 k2: v2 …)"` segment per distinct
    /// dimension tag in first-appearance order (missing transform name
    /// becomes the literal `TRANS_UNKNOWN`, an empty parameter list drops
    /// the parentheses), followed by ` <k>: <v>` for every `NODIM` record.
    pub fn serialize(&self, field_tag: &str) -> String {
        let mut dim_order: Vec<&str> = Vec::new();
        for r in &self.records {
            if r.dim_tag != NODIM && !dim_order.contains(&r.dim_tag.as_str()) {
                dim_order.push(&r.dim_tag);
            }
        }

        let mut out = String::new();

        for dim_tag in dim_order {
            let transform_name = self
                .records
                .iter()
                .find(|r| r.field_tag == field_tag && r.dim_tag == dim_tag && r.name == "transform")
                .map(|r| r.value.as_str())
                .unwrap_or("TRANS_UNKNOWN");

            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&format!("{dim_tag}: {transform_name} ("));

            let params: Vec<String> = self
                .records
                .iter()
                .filter(|r| r.field_tag == field_tag && r.dim_tag == dim_tag && r.name != "transform")
                .map(|r| format!("{}: {}", r.name, r.value))
                .collect();

            if params.is_empty() {
                // Drop the trailing " (" we just appended.
                out.truncate(out.len() - 2);
            } else {
                out.push_str(&params.join(" "));
                out.push(')');
            }
        }

        for r in &self.records {
            if r.field_tag == field_tag && r.dim_tag == NODIM {
                out.push_str(&format!(" {}: {}", r.name, r.value));
            }
        }

        out
    }
}
