//! Common error types, one focused enum per component, aggregated here for
//! callers that want a single error type to match on.

use thiserror::Error;

pub use crate::bins::BinGeometryError;
pub use crate::dimgroup::DimGroupError;
pub use crate::driver::DriverError;
pub use crate::kernels::KernelError;
pub use crate::params::ParamError;
pub use crate::qc::QcError;
pub use crate::station_view::StationViewError;

/// Umbrella error for anything that can go wrong driving a transform.
///
/// Most call sites will want to match on one of the component errors
/// directly; this exists for callers (such as the CLI) that just want to
/// propagate whatever went wrong with `?`.
#[derive(Debug, Error)]
pub enum TransError {
    #[error(transparent)]
    Qc(#[from] QcError),

    #[error(transparent)]
    BinGeometry(#[from] BinGeometryError),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    DimGroup(#[from] DimGroupError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    StationView(#[from] StationViewError),
}
