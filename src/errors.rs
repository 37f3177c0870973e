/// Failure kinds surfaced by the toolkit.
///
/// Every fallible operation reports one of these named kinds; recovery
/// fallbacks (tolerance escalation, contact snapping, 3D degradation)
/// happen before an error reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Dimensional mismatch, tolerance violation or an unresolvable reference.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Collinear points, zero-length tangents, curvature queries on straight spans.
    #[error("geometric degeneracy: {0}")]
    GeometricDegeneracy(String),

    /// Wire, face, shell or solid construction failed.
    #[error("topology failure: {0}")]
    TopologyFailure(String),

    /// Parameters decrease where they must strictly increase.
    #[error("parameters are not monotonically increasing")]
    NonMonotonic,

    /// An offset was requested on a surface that is only C0.
    #[error("offset requires at least G1 continuity")]
    ContinuityTooLow,

    /// The arc-length bisection exhausted its iteration budget.
    #[error("arc-length trim did not converge")]
    TrimNonConverged,

    /// An underlying geometric computation returned nothing usable.
    #[error("kernel operation failed: {0}")]
    KernelFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;
