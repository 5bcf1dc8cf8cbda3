//! Station-view post-processor (C10): merges `<field>@<station>` variables
//! scattered across several retrieved datasets into single
//! `field[..., station]` variables in one output dataset.
//!
//! Grounded on `dsproc_station_view_hook.c`'s `dsproc_station_view_hook`
//! (field/station discovery by `@`-splitting variable names plus the
//! `station_view_stations`/`station_view_fields` transform params, the
//! name-length-then-lexical station sort so `sgpE9` precedes `sgpE12`, and
//! the "missing field is a warning, missing station slice fills with
//! missing" recovery rule).
//!
//! The data model's `Variable` only carries `f64` payloads (no native string
//! type), so `station_name` is stored the way a netCDF `char` array is
//! stored under the hood: one `f64` per byte (ASCII code), shape
//! `[station, strlen]`, NUL-padded - the direct generalization of this
//! crate's existing float-only buffer convention to text data.

use std::collections::BTreeSet;

use log::warn;
use thiserror::Error;

use crate::data_model::{Dataset, Dimension, Variable, DEFAULT_MISSING_VALUE};

#[derive(Debug, Error)]
pub enum StationViewError {
    #[error("no '<field>@<station>' variables were found across the given datasets")]
    NoFieldsDiscovered,
    #[error("no stations were found across the given datasets")]
    NoStationsDiscovered,
    #[error("field '{field}' has shape {found:?} at station '{station}' but {expected:?} elsewhere")]
    InconsistentFieldShape { field: String, station: String, found: Vec<usize>, expected: Vec<usize> },
}

/// Merge `<field>@<station>` variables from `datasets` into one dataset with
/// a trailing `station` dimension per field. `fields`/`stations` pre-declare
/// the name sets (mirroring the `station_view_fields`/`station_view_stations`
/// parameters, read from each dataset's global parameter bag when not given
/// explicitly); any `@`-bearing variable name found in the datasets also
/// contributes to both sets.
pub fn merge_station_view(
    datasets: &[Dataset],
    fields: Option<&[String]>,
    stations: Option<&[String]>,
) -> Result<Dataset, StationViewError> {
    let mut field_set: BTreeSet<String> = fields.map(|f| f.iter().cloned().collect()).unwrap_or_default();
    let mut station_set: BTreeSet<String> = stations.map(|s| s.iter().cloned().collect()).unwrap_or_default();

    if field_set.is_empty() {
        for ds in datasets {
            field_set.extend(declared_name_list(ds, "station_view_fields"));
        }
    }
    if station_set.is_empty() {
        for ds in datasets {
            station_set.extend(declared_name_list(ds, "station_view_stations"));
        }
    }

    for ds in datasets {
        for name in ds.variables.keys() {
            if let Some((field, station)) = name.rsplit_once('@') {
                field_set.insert(field.to_string());
                station_set.insert(station.to_string());
            }
        }
    }

    if field_set.is_empty() {
        return Err(StationViewError::NoFieldsDiscovered);
    }
    if station_set.is_empty() {
        return Err(StationViewError::NoStationsDiscovered);
    }

    let mut stations: Vec<String> = station_set.into_iter().collect();
    stations.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    let n_stations = stations.len();

    let mut out = Dataset::new("station_view");
    out.add_dim(Dimension::new("station", n_stations));

    let strlen = stations.iter().map(|s| s.len()).max().unwrap_or(0) + 1;
    out.add_dim(Dimension::new("strlen", strlen));
    out.add_var(station_name_variable(&stations, strlen));

    for field in &field_set {
        let template = stations
            .iter()
            .find_map(|station| find_var(datasets, &format!("{field}@{station}")));
        let Some(template) = template else {
            warn!("station-view field '{field}' was declared but not found for any station");
            continue;
        };

        let field_shape = template.shape.clone();
        let field_dim_names = template.dim_names.clone();
        let missing_value = template.missing_value;
        let field_len: usize = field_shape.iter().product::<usize>().max(1);

        let mut out_dim_names = field_dim_names.clone();
        out_dim_names.push("station".to_string());
        let mut out_shape = field_shape.clone();
        out_shape.push(n_stations);

        let mut data = vec![missing_value; field_len * n_stations];
        let mut any_found = false;
        for (s, station) in stations.iter().enumerate() {
            let var_name = format!("{field}@{station}");
            match find_var(datasets, &var_name) {
                Some(v) => {
                    if v.shape != field_shape {
                        return Err(StationViewError::InconsistentFieldShape {
                            field: field.clone(),
                            station: station.clone(),
                            found: v.shape.clone(),
                            expected: field_shape.clone(),
                        });
                    }
                    any_found = true;
                    for i in 0..field_len {
                        data[i * n_stations + s] = v.data[i];
                    }
                }
                None => warn!("station-view field '{field}' has no slice for station '{station}'; filling with missing"),
            }
        }
        if !any_found {
            warn!("station-view field '{field}' was not found for any declared station");
        }

        let mut merged = Variable::new(field.clone(), out_dim_names, out_shape, data);
        merged.missing_value = missing_value;
        merged.units = template.units.clone();
        out.add_var(merged);
    }

    Ok(out)
}

fn declared_name_list(ds: &Dataset, key: &str) -> Vec<String> {
    ds.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.split([',', ';']).map(|n| n.trim().to_string()).filter(|n| !n.is_empty()).collect())
        .unwrap_or_default()
}

fn find_var<'a>(datasets: &'a [Dataset], name: &str) -> Option<&'a Variable> {
    datasets.iter().find_map(|ds| ds.var(name))
}

fn station_name_variable(stations: &[String], strlen: usize) -> Variable {
    let mut data = vec![0.0f64; stations.len() * strlen];
    for (s, name) in stations.iter().enumerate() {
        for (c, byte) in name.bytes().enumerate() {
            data[s * strlen + c] = byte as f64;
        }
    }
    let mut var = Variable::new(
        "station_name",
        vec!["station".to_string(), "strlen".to_string()],
        vec![stations.len(), strlen],
        data,
    );
    var.missing_value = DEFAULT_MISSING_VALUE;
    var
}
