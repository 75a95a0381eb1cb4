//! Equidistant (Kannala-Brandt style) fisheye distortion.
//!
//! For a normalized point at radius `r`, the incidence angle is `θ = atan(r)`
//! and the distorted radius is the odd polynomial
//!
//! ```text
//! θ_d = θ (1 + k1 θ² + k2 θ⁴ + k3 θ⁶ + k4 θ⁸)
//! ```
//!
//! with the point scaled by `θ_d / r`. The inverse solves `θ_d(θ) = r_d` for
//! `θ` with a one-dimensional Newton iteration.

use crate::camera::{CameraModelError, UNDISTORT_MAX_ITERATIONS, UNDISTORT_TOLERANCE};
use nalgebra::Vector2;
use std::f64::consts::FRAC_PI_2;

fn theta_d(k: &[f64], theta: f64) -> f64 {
    let theta2 = theta * theta;
    let theta3 = theta2 * theta;
    let theta5 = theta3 * theta2;
    let theta7 = theta5 * theta2;
    let theta9 = theta7 * theta2;
    theta + k[0] * theta3 + k[1] * theta5 + k[2] * theta7 + k[3] * theta9
}

// 1 + 3k1θ² + 5k2θ⁴ + 7k3θ⁶ + 9k4θ⁸
fn d_theta_d(k: &[f64], theta: f64) -> f64 {
    let theta2 = theta * theta;
    let mut d = 9.0 * k[3] * theta2;
    d += 7.0 * k[2];
    d *= theta2;
    d += 5.0 * k[1];
    d *= theta2;
    d += 3.0 * k[0];
    d *= theta2;
    d + 1.0
}

fn coefficients(distortion: &[f64]) -> [f64; 4] {
    let mut k = [0.0; 4];
    for (dst, src) in k.iter_mut().zip(distortion) {
        *dst = *src;
    }
    k
}

/// Applies the forward equidistant distortion to a normalized point.
pub fn distort(distortion: &[f64], point: &Vector2<f64>) -> Vector2<f64> {
    let k = coefficients(distortion);
    let r = point.norm();
    if r < f64::EPSILON.sqrt() {
        return *point;
    }
    let theta = r.atan();
    point * (theta_d(&k, theta) / r)
}

/// Recovers the undistorted normalized point whose distortion is `target`.
///
/// # Errors
///
/// [`CameraModelError::ConvergenceFailure`] if Newton's method stalls, leaves
/// the forward hemisphere (`θ ≥ π/2`) or runs out of iterations.
pub fn undistort(distortion: &[f64], target: &Vector2<f64>) -> Result<Vector2<f64>, CameraModelError> {
    let k = coefficients(distortion);
    let r_d = target.norm();
    if !r_d.is_finite() {
        return Err(CameraModelError::ConvergenceFailure {
            iterations: 0,
            residual: f64::INFINITY,
        });
    }
    if r_d < f64::EPSILON.sqrt() {
        return Ok(*target);
    }

    let mut theta = r_d.min(FRAC_PI_2 - 1e-6);
    let mut residual = f64::INFINITY;

    for iteration in 0..UNDISTORT_MAX_ITERATIONS {
        let error = theta_d(&k, theta) - r_d;
        residual = error.abs();
        if residual < UNDISTORT_TOLERANCE {
            if !(0.0..FRAC_PI_2).contains(&theta) {
                return Err(CameraModelError::ConvergenceFailure {
                    iterations: iteration + 1,
                    residual,
                });
            }
            let r = theta.tan();
            return Ok(target * (r / r_d));
        }

        let slope = d_theta_d(&k, theta);
        if slope.abs() < f64::EPSILON {
            return Err(CameraModelError::ConvergenceFailure {
                iterations: iteration + 1,
                residual,
            });
        }
        theta -= error / slope;
        if !theta.is_finite() {
            return Err(CameraModelError::ConvergenceFailure {
                iterations: iteration + 1,
                residual,
            });
        }
    }

    Err(CameraModelError::ConvergenceFailure {
        iterations: UNDISTORT_MAX_ITERATIONS,
        residual,
    })
}
