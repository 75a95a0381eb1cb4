//! Error types for the undistortion pipeline.
//!
//! Camera-level failures are [`CameraModelError`]; everything raised while
//! pairing models, configuring the pipeline or processing frames is an
//! [`UndistortError`].

use crate::camera::CameraModelError;
use crate::config::OutputInfoSource;
use thiserror::Error;

/// Result type used throughout the crate.
pub type UndistortResult<T> = Result<T, UndistortError>;

#[derive(Debug, Error)]
pub enum UndistortError {
    /// Malformed intrinsics / distortion, or a failed inverse distortion
    #[error(transparent)]
    Camera(#[from] CameraModelError),

    /// An output model was supplied while the policy derives it from the input
    #[error("Output camera model cannot be set externally under the {policy} policy")]
    PolicyMismatch { policy: OutputInfoSource },

    /// Frame size does not match the input camera model
    #[error("Frame is {found_width}x{found_height} but the input camera is {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },

    /// Frame buffer is inconsistent with its declared layout
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Invalid option values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
