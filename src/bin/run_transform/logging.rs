use log::LevelFilter;
use tracing_subscriber::filter::LevelFilter as TracingLevelFilter;

/// Configure a `tracing` subscriber for the CLI's own per-step spans
/// (config load, dataset build, drive). The library itself logs through
/// `log`/`log4rs` (see `trans_rs::logging::init_logging`); the two
/// frameworks run side by side here rather than one forwarding to the
/// other, matching the split already present between the teacher's
/// `log4rs`-based binaries and `write_private_netcdf`'s `tracing`-based one.
pub(crate) fn init_tracing(level: LevelFilter) {
    let tracing_level = match level {
        LevelFilter::Off => TracingLevelFilter::OFF,
        LevelFilter::Error => TracingLevelFilter::ERROR,
        LevelFilter::Warn => TracingLevelFilter::WARN,
        LevelFilter::Info => TracingLevelFilter::INFO,
        LevelFilter::Debug => TracingLevelFilter::DEBUG,
        LevelFilter::Trace => TracingLevelFilter::TRACE,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_max_level(tracing_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("could not set tracing subscriber");
}
