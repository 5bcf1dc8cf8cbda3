/// Common error types, aggregating the per-component error enums.
pub mod error;
/// Process-wide logging setup.
pub mod logging;
/// The data model shared by every component: variables, dimensions, and
/// the parameter bag attached to them.
pub mod data_model;
/// QC bit algebra: canonical codes, set/clear/test, and mask resolution.
pub mod qc;
/// Bin-edge and midpoint resolution for a 1-D coordinate axis.
pub mod bins;
/// Fixed-shape per-slice metric tables produced by a kernel.
pub mod metrics;
/// Transform-parameter store and the provenance serializer.
pub mod params;
/// Kernel registry: name-based lookup with user overrides.
pub mod registry;
/// The four built-in 1-D kernels plus the shared `Kernel` trait.
pub mod kernels;
/// The Caracena scattered-station to 2-D-grid objective analysis kernel.
pub mod caracena;
/// Parser for the `dim_grouping` transform parameter.
pub mod dimgroup;
/// The serial 1-D transform driver: the outermost pipeline.
pub mod driver;
/// Station-view post-processing: merges `field@station` variables.
pub mod station_view;
