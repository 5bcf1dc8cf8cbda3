//! Demonstration CLI: drives one transform end-to-end from a TOML run
//! description, with no netCDF dependency. Exercises C1-C9 (and C10
//! indirectly, since the driver is what C10 consumes) without giving the
//! core library any file-I/O responsibility - spec.md's Non-goal on
//! file-format I/O applies to the core crate, not this bin.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use error_stack::ResultExt;
use figment::providers::{Format, Toml};
use figment::Figment;
use serde::Serialize;
use trans_rs::driver::Driver;

mod config;
mod logging;

use config::{build_dataset, RunDescription};

fn main() -> ExitCode {
    let clargs = Cli::parse();
    trans_rs::logging::init_logging(clargs.verbosity.log_level_filter());
    logging::init_tracing(clargs.verbosity.log_level_filter());
    match run(clargs) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("An error occurred:\n{e:?}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, clap::Parser)]
struct Cli {
    /// Path to a TOML run-description file (dimensions, variables,
    /// parameter bag entries, and the input/output variable names to drive).
    run_file: PathBuf,

    /// Dump the final `cell_transform` string and any metric sibling
    /// tables to stdout as JSON. Overrides the run file's own `dump` key
    /// when set.
    #[clap(long)]
    dump: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to load the run description from {}", .0.display())]
    LoadConfig(PathBuf),
    #[error("failed to build the dataset described in the run file")]
    BuildDataset,
    #[error("the transform driver failed")]
    Drive,
}

#[derive(Debug, Serialize)]
struct DumpOutput {
    cell_transform: String,
    metrics: Vec<MetricDump>,
}

#[derive(Debug, Serialize)]
struct MetricDump {
    name: String,
    variable: String,
    values: Vec<f64>,
}

fn run(clargs: Cli) -> error_stack::Result<(), CliError> {
    let span = tracing::info_span!("run_transform", run_file = %clargs.run_file.display());
    let _enter = span.enter();

    tracing::info!("loading run description");
    let desc: RunDescription = Figment::new()
        .merge(Toml::file(&clargs.run_file))
        .extract()
        .change_context_lazy(|| CliError::LoadConfig(clargs.run_file.clone()))?;

    tracing::info!(
        input = %desc.input_var,
        output = %desc.output_var,
        "building in-memory dataset"
    );
    let mut dataset = build_dataset(&desc).change_context(CliError::BuildDataset)?;

    let driver = Driver::default();
    tracing::info!("driving transform");
    driver
        .drive(&mut dataset, &desc.input_var, desc.input_qc_var.as_deref(), &desc.output_var, &desc.output_qc_var)
        .change_context(CliError::Drive)?;

    if clargs.dump || desc.dump {
        let out_var = dataset.var(&desc.output_var).expect("output variable must exist");
        let cell_transform =
            out_var.params.get("cell_transform").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let metrics = out_var
            .user_data
            .iter()
            .filter_map(|(tag, value)| match value {
                trans_rs::data_model::UserDataValue::Text(sibling_name) => {
                    dataset.var(sibling_name).map(|v| MetricDump {
                        name: tag.clone(),
                        variable: sibling_name.clone(),
                        values: v.data.clone(),
                    })
                }
                trans_rs::data_model::UserDataValue::Bool(_) => None,
            })
            .collect();
        let dump = DumpOutput { cell_transform, metrics };
        println!("{}", serde_json::to_string_pretty(&dump).expect("metric dump must serialize"));
    }

    tracing::info!("done");
    Ok(())
}
