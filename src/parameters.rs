//! Input/output camera model pairing.
//!
//! [`CameraParametersPair`] keeps the output camera model consistent with the
//! input model and the active [`OutputPolicy`]. Derived policies recompute the
//! output every time the input changes; external policies only accept an
//! output model supplied by the caller.

use crate::camera::{pinhole, CameraInfo, CameraModel, CameraModelError, Intrinsics, Resolution};
use crate::config::{OutputInfoSource, UndistortConfig};
use crate::error::{UndistortError, UndistortResult};
use crate::rectification;
use log::{debug, info};
use nalgebra::{IsometryMatrix3, Matrix3, Rotation3, Translation3, Vector2, Vector3};

/// Upper bound on the shrink steps of the auto-generated canvas verification.
const MAX_SHRINK_STEPS: u32 = 256;

/// Output synthesis policy and its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputPolicy {
    source: OutputInfoSource,
    scale: f64,
    rename_radtan_plumb_bob: bool,
}

impl OutputPolicy {
    pub fn new(
        source: OutputInfoSource,
        scale: f64,
        rename_radtan_plumb_bob: bool,
    ) -> UndistortResult<Self> {
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(UndistortError::InvalidConfig(format!(
                "scale must be positive, got {scale}"
            )));
        }
        Ok(OutputPolicy {
            source,
            scale,
            rename_radtan_plumb_bob,
        })
    }

    pub fn from_config(config: &UndistortConfig) -> UndistortResult<Self> {
        Self::new(
            config.output_camera_info_source,
            config.scale,
            config.rename_radtan_plumb_bob,
        )
    }

    pub fn source(&self) -> OutputInfoSource {
        self.source
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn rename_radtan_plumb_bob(&self) -> bool {
        self.rename_radtan_plumb_bob
    }
}

/// An input camera model together with the output model derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraParametersPair {
    policy: OutputPolicy,
    input: Option<CameraModel>,
    output: Option<CameraModel>,
}

impl CameraParametersPair {
    pub fn new(policy: OutputPolicy) -> Self {
        CameraParametersPair {
            policy,
            input: None,
            output: None,
        }
    }

    pub fn policy(&self) -> &OutputPolicy {
        &self.policy
    }

    pub fn input(&self) -> Option<&CameraModel> {
        self.input.as_ref()
    }

    pub fn output(&self) -> Option<&CameraModel> {
        self.output.as_ref()
    }

    /// Both models, once the pair is valid.
    pub fn models(&self) -> Option<(&CameraModel, &CameraModel)> {
        self.input.as_ref().zip(self.output.as_ref())
    }

    pub fn is_valid(&self) -> bool {
        self.input.is_some() && self.output.is_some()
    }

    /// Replaces the input model, recomputing the output under derived policies.
    ///
    /// Returns `false` when `model` equals the current input. On error the pair
    /// is left unchanged.
    pub fn set_input_model(&mut self, model: CameraModel) -> UndistortResult<bool> {
        if self.input.as_ref() == Some(&model) {
            return Ok(false);
        }

        if let Some(output) = synthesize_output(&model, &self.policy)? {
            info!(
                "Generated {} output camera: {:?}",
                self.policy.source, output
            );
            self.output = Some(output);
        }
        info!("Input camera updated: {:?}", model);
        self.input = Some(model);
        Ok(true)
    }

    /// Installs an externally supplied output model.
    ///
    /// # Errors
    ///
    /// [`UndistortError::PolicyMismatch`] under `auto_generated` and
    /// `match_input`, where the output is derived from the input.
    pub fn set_output_model(&mut self, model: CameraModel) -> UndistortResult<bool> {
        if self.policy.source.is_derived() {
            return Err(UndistortError::PolicyMismatch {
                policy: self.policy.source,
            });
        }
        if self.output.as_ref() == Some(&model) {
            return Ok(false);
        }
        info!("Output camera updated: {:?}", model);
        self.output = Some(model);
        Ok(true)
    }

    /// Rigid transform taking points in the output camera frame to the input
    /// camera frame.
    pub fn output_to_input_transform(&self) -> Option<IsometryMatrix3<f64>> {
        self.models()
            .map(|(input, output)| relative_transform(input, output))
    }

    /// Descriptor of the output model, honouring the `plumb_bob` label preference.
    pub fn output_camera_info(&self, frame_id: &str) -> Option<CameraInfo> {
        self.output.as_ref().map(|output| {
            CameraInfo::from_model(output, frame_id, self.policy.rename_radtan_plumb_bob)
        })
    }
}

/// Rigid transform from `output` camera coordinates to `input` camera coordinates.
///
/// Both models are placed in a shared reference frame (`X_cam = R X_ref + t`), so
/// `R_rel = R_in R_outᵀ` and `t_rel = t_in - R_rel t_out`.
pub fn relative_transform(input: &CameraModel, output: &CameraModel) -> IsometryMatrix3<f64> {
    let rotation: Matrix3<f64> = input.rotation() * output.rotation().transpose();
    let translation = input.translation() - rotation * output.translation();
    IsometryMatrix3::from_parts(
        Translation3::from(translation),
        Rotation3::from_matrix_unchecked(rotation),
    )
}

/// Derives the output model for `input` under `policy`.
///
/// Returns `None` for the policies whose output is supplied externally.
pub fn synthesize_output(
    input: &CameraModel,
    policy: &OutputPolicy,
) -> UndistortResult<Option<CameraModel>> {
    match policy.source {
        OutputInfoSource::MatchInput => Ok(Some(input.clone())),
        OutputInfoSource::AutoGenerated => auto_generate(input, policy.scale).map(Some),
        OutputInfoSource::RosParams | OutputInfoSource::CameraInfo => Ok(None),
    }
}

/// Innermost undistorted extent of each input image edge, in output
/// normalized coordinates.
#[derive(Debug, Clone, Copy)]
struct InnerBounds {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

fn inner_bounds(input: &CameraModel) -> Result<InnerBounds, CameraModelError> {
    let resolution = input.resolution();
    let (last_x, last_y) = (
        (resolution.width - 1) as f64,
        (resolution.height - 1) as f64,
    );
    // Output rotation is identity, so input rays are brought back with R_inᵀ
    let to_output = input.rotation().transpose();
    let intrinsics = input.intrinsics();

    let ideal = |u: f64, v: f64| -> Option<Vector2<f64>> {
        let normalized = pinhole::normalize(&intrinsics, &Vector2::new(u, v));
        let undistorted = input.undistort_normalized(&normalized).ok()?;
        let ray = to_output * Vector3::new(undistorted.x, undistorted.y, 1.0);
        (ray.z > f64::EPSILON).then(|| Vector2::new(ray.x / ray.z, ray.y / ray.z))
    };

    let mut bounds = InnerBounds {
        left: f64::NEG_INFINITY,
        right: f64::INFINITY,
        top: f64::NEG_INFINITY,
        bottom: f64::INFINITY,
    };
    for v in 0..resolution.height {
        if let Some(p) = ideal(0.0, v as f64) {
            bounds.left = bounds.left.max(p.x);
        }
        if let Some(p) = ideal(last_x, v as f64) {
            bounds.right = bounds.right.min(p.x);
        }
    }
    for u in 0..resolution.width {
        if let Some(p) = ideal(u as f64, 0.0) {
            bounds.top = bounds.top.max(p.y);
        }
        if let Some(p) = ideal(u as f64, last_y) {
            bounds.bottom = bounds.bottom.min(p.y);
        }
    }

    if [bounds.left, bounds.right, bounds.top, bounds.bottom]
        .iter()
        .any(|b| !b.is_finite())
    {
        return Err(CameraModelError::InvalidModel(
            "Input image border could not be undistorted".to_string(),
        ));
    }
    Ok(bounds)
}

fn centered_pinhole(
    width: u32,
    height: u32,
    focal_length: f64,
    translation: Vector3<f64>,
) -> Result<CameraModel, CameraModelError> {
    let resolution = Resolution { width, height };
    let intrinsics = Intrinsics {
        fx: focal_length,
        fy: focal_length,
        cx: width as f64 / 2.0,
        cy: height as f64 / 2.0,
    };
    CameraModel::pinhole(resolution, intrinsics)?.with_extrinsics(Matrix3::identity(), translation)
}

/// Every pixel on the border of `output` maps to a valid input pixel.
fn border_is_valid(input: &CameraModel, output: &CameraModel) -> bool {
    let rotation = *relative_transform(input, output).rotation.matrix();
    let resolution = output.resolution();
    let (last_u, last_v) = (resolution.width - 1, resolution.height - 1);
    let valid = |u: u32, v: u32| rectification::source_pixel(input, output, &rotation, u, v).is_some();

    (0..resolution.width).all(|u| valid(u, 0) && valid(u, last_v))
        && (0..resolution.height).all(|v| valid(0, v) && valid(last_u, v))
}

/// Builds the `auto_generated` output model.
///
/// The canvas is the largest one centered on the optical axis whose every pixel
/// sees the input image: the undistorted input border gives the half-extents
/// `a`, `b` of the usable region around the axis, the canvas is
/// `2⌊a f⌋ x 2⌊b f⌋`, and a final pass over the canvas border shrinks it two
/// pixels at a time until no border pixel falls outside the input.
///
/// Valid source pixels lie in `[0, w - 1]`, so even an undistorted input
/// yields a canvas up to two pixels smaller, e.g. 638x478 for 640x480.
fn auto_generate(input: &CameraModel, scale: f64) -> UndistortResult<CameraModel> {
    let intrinsics = input.intrinsics();
    let focal_length = scale * (intrinsics.fx + intrinsics.fy) / 2.0;
    let translation = Vector3::new(input.translation().x, 0.0, 0.0);

    let bounds = inner_bounds(input)?;
    let half_width = (-bounds.left).min(bounds.right);
    let half_height = (-bounds.top).min(bounds.bottom);
    debug!(
        "Undistorted input border: left {:.4} right {:.4} top {:.4} bottom {:.4}",
        bounds.left, bounds.right, bounds.top, bounds.bottom
    );

    let mut width = 2 * (half_width * focal_length).max(0.0).floor() as u32;
    let mut height = 2 * (half_height * focal_length).max(0.0).floor() as u32;

    for _ in 0..MAX_SHRINK_STEPS {
        if width == 0 || height == 0 {
            break;
        }
        let candidate = centered_pinhole(width, height, focal_length, translation)?;
        if border_is_valid(input, &candidate) {
            return Ok(candidate);
        }
        debug!("Auto-generated canvas {width}x{height} has empty pixels, shrinking");
        width = width.saturating_sub(2);
        height = height.saturating_sub(2);
    }

    Err(CameraModelError::InvalidModel(format!(
        "No output canvas without empty pixels exists for {input:?}"
    ))
    .into())
}
