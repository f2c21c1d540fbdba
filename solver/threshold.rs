use crate::types::FitError;

/// The proximal operator of the L1 penalty: `sign(z) * max(|z| - gamma, 0)`.
///
/// Anything within `gamma` of zero maps to exactly `0.0`, which is what keeps
/// coefficients pinned at zero along a path.
pub fn soft_threshold(z: f64, gamma: f64) -> Result<f64, FitError> {
    if gamma.is_nan() || gamma <= 0.0 {
        return Err(FitError::InvalidArgument(format!(
            "soft-threshold gamma must be positive, got {gamma}"
        )));
    }
    Ok(shrink(z, gamma))
}

/// Unchecked form used inside sweeps, where gamma was validated once up front.
#[inline]
pub(crate) fn shrink(z: f64, gamma: f64) -> f64 {
    let magnitude = z.abs() - gamma;
    if magnitude > 0.0 {
        magnitude.copysign(z)
    } else {
        0.0
    }
}
