//! Radial-Tangential (RadTan) distortion.
//!
//! The model operates on normalized image coordinates `(x, y)` with
//! coefficients `[k1, k2, p1, p2]` or `[k1, k2, p1, p2, k3]`:
//!
//! ```text
//! r² = x² + y²
//! x_d = x (1 + k1 r² + k2 r⁴ + k3 r⁶) + 2 p1 x y + p2 (r² + 2 x²)
//! y_d = y (1 + k1 r² + k2 r⁴ + k3 r⁶) + p1 (r² + 2 y²) + 2 p2 x y
//! ```
//!
//! There is no closed-form inverse; [`undistort`] runs Newton's method with the
//! analytic Jacobian of the forward model.

use crate::camera::{CameraModelError, UNDISTORT_MAX_ITERATIONS, UNDISTORT_TOLERANCE};
use nalgebra::{Matrix2, Vector2};

#[derive(Debug, Clone, Copy)]
struct Coefficients {
    k1: f64,
    k2: f64,
    p1: f64,
    p2: f64,
    k3: f64,
}

impl Coefficients {
    fn from_slice(distortion: &[f64]) -> Self {
        let get = |i: usize| distortion.get(i).copied().unwrap_or(0.0);
        Coefficients {
            k1: get(0),
            k2: get(1),
            p1: get(2),
            p2: get(3),
            k3: get(4),
        }
    }

    fn apply(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (point.x, point.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        Vector2::new(
            x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Jacobian of [`Coefficients::apply`] with respect to `(x, y)`.
    fn jacobian(&self, point: &Vector2<f64>) -> Matrix2<f64> {
        let (x, y) = (point.x, point.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r4 * r2;
        // d(radial)/d(r²)
        let d_radial = self.k1 + 2.0 * self.k2 * r2 + 3.0 * self.k3 * r4;

        let j00 = radial + 2.0 * x * x * d_radial + 2.0 * self.p1 * y + 6.0 * self.p2 * x;
        let j01 = 2.0 * x * y * d_radial + 2.0 * self.p1 * x + 2.0 * self.p2 * y;
        let j10 = 2.0 * x * y * d_radial + 2.0 * self.p1 * x + 2.0 * self.p2 * y;
        let j11 = radial + 2.0 * y * y * d_radial + 6.0 * self.p1 * y + 2.0 * self.p2 * x;

        Matrix2::new(j00, j01, j10, j11)
    }
}

/// Applies the forward radial-tangential distortion to a normalized point.
pub fn distort(distortion: &[f64], point: &Vector2<f64>) -> Vector2<f64> {
    Coefficients::from_slice(distortion).apply(point)
}

/// Recovers the undistorted normalized point whose distortion is `target`.
///
/// # Errors
///
/// [`CameraModelError::ConvergenceFailure`] if the Jacobian becomes singular or
/// the residual stays above the tolerance after the iteration cap.
pub fn undistort(distortion: &[f64], target: &Vector2<f64>) -> Result<Vector2<f64>, CameraModelError> {
    let coefficients = Coefficients::from_slice(distortion);

    // Start from the distorted point itself
    let mut point = *target;
    let mut residual = f64::INFINITY;

    for iteration in 0..UNDISTORT_MAX_ITERATIONS {
        let error = coefficients.apply(&point) - target;
        residual = error.norm();
        if !residual.is_finite() {
            return Err(CameraModelError::ConvergenceFailure {
                iterations: iteration + 1,
                residual,
            });
        }
        if residual < UNDISTORT_TOLERANCE {
            return Ok(point);
        }

        let Some(inverse) = coefficients.jacobian(&point).try_inverse() else {
            return Err(CameraModelError::ConvergenceFailure {
                iterations: iteration + 1,
                residual,
            });
        };
        point -= inverse * error;
    }

    Err(CameraModelError::ConvergenceFailure {
        iterations: UNDISTORT_MAX_ITERATIONS,
        residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Values of a EuRoC-like calibration
    const EUROC: [f64; 5] = [-0.28340811, 0.07395907, 0.00019359, 1.76187114e-05, 0.0];

    #[test]
    fn test_radtan_distort_known_value() {
        let point = Vector2::new(0.2, 0.0);
        let distorted = distort(&[-0.3, 0.1, 0.0, 0.0], &point);
        // 0.2 * (1 - 0.3 * 0.04 + 0.1 * 0.0016)
        assert_relative_eq!(distorted.x, 0.2 * (1.0 - 0.012 + 0.00016), epsilon = 1e-15);
        assert_relative_eq!(distorted.y, 0.0);
    }

    #[test]
    fn test_radtan_tangential_terms() {
        let point = Vector2::new(0.1, 0.2);
        let distorted = distort(&[0.0, 0.0, 0.01, 0.02], &point);
        let r2 = 0.05;
        assert_relative_eq!(
            distorted.x,
            0.1 + 2.0 * 0.01 * 0.02 + 0.02 * (r2 + 0.02),
            epsilon = 1e-15
        );
        assert_relative_eq!(
            distorted.y,
            0.2 + 0.01 * (r2 + 0.08) + 2.0 * 0.02 * 0.02,
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_radtan_jacobian_matches_finite_difference() {
        let coefficients = Coefficients::from_slice(&EUROC);
        let point = Vector2::new(0.3, -0.25);
        let jacobian = coefficients.jacobian(&point);

        let h = 1e-7;
        for axis in 0..2 {
            let mut step = Vector2::zeros();
            step[axis] = h;
            let numeric =
                (coefficients.apply(&(point + step)) - coefficients.apply(&(point - step))) / (2.0 * h);
            assert_relative_eq!(jacobian[(0, axis)], numeric.x, epsilon = 1e-6);
            assert_relative_eq!(jacobian[(1, axis)], numeric.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_radtan_undistort_round_trip() {
        let test_points = vec![
            Vector2::new(0.0, 0.0),   // Center
            Vector2::new(0.5, 0.0),   // Right
            Vector2::new(-0.5, 0.0),  // Left
            Vector2::new(0.0, 0.5),   // Top
            Vector2::new(0.3, 0.4),   // Top-right
            Vector2::new(-0.3, -0.4), // Bottom-left
            Vector2::new(0.6, -0.45), // Corner
        ];

        for point in test_points {
            let distorted = distort(&EUROC, &point);
            let restored = undistort(&EUROC, &distorted).unwrap();
            assert_relative_eq!(restored, point, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_radtan_undistort_reports_failure() {
        let result = undistort(&EUROC, &Vector2::new(f64::NAN, 0.1));
        // Stops at the first non-finite residual
        assert!(matches!(
            result,
            Err(CameraModelError::ConvergenceFailure { iterations: 1, .. })
        ));
    }
}
