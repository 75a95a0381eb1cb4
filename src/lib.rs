//! Image Undistort Library
//!
//! Lens undistortion and camera re-projection for image streams. An input
//! camera model (pinhole with radial-tangential or equidistant distortion)
//! is paired with an output model chosen by a policy, a per-pixel
//! rectification map is built from the pair, and frames are remapped through
//! it:
//!
//! - [`camera`]: camera models, forward and inverse distortion, metadata
//! - [`parameters`]: input/output model pairing and output synthesis
//! - [`rectification`]: output-to-input lookup tables
//! - [`undistort`]: map caching and frame remapping
//! - [`gate`]: stream state machine, frame skipping and metadata ordering
//!
//! ```no_run
//! use image_undistort::{CameraInfo, FrameGate, UndistortConfig};
//! # fn run(info: CameraInfo, frames: Vec<image_undistort::Frame>) -> image_undistort::UndistortResult<()> {
//! let mut gate = FrameGate::new(UndistortConfig::default())?;
//! gate.update_camera_info(&info)?;
//! for frame in &frames {
//!     if let Some(output) = gate.process_frame(frame)? {
//!         println!("{}x{}", output.camera_info.width, output.camera_info.height);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod gate;
pub mod parameters;
pub mod rectification;
pub mod undistort;

// Re-export commonly used types
pub use camera::{
    CameraInfo, CameraModel, CameraModelError, DistortionModel, Intrinsics, Resolution,
};
pub use config::{OutputInfoSource, UndistortConfig};
pub use error::{UndistortError, UndistortResult};
pub use frame::{Frame, PixelFormat};
pub use gate::{FrameGate, FrameTransform, GateOutput, GateState};
pub use parameters::{CameraParametersPair, OutputPolicy};
pub use rectification::RectificationMap;
pub use undistort::{InterpolationMethod, UndistortionEngine};
