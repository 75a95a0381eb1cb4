//! Pipeline options.
//!
//! [`UndistortConfig`] holds every option of the undistortion pipeline with
//! its default value. It deserializes from YAML; missing keys keep their
//! defaults:
//!
//! ```yaml
//! output_camera_info_source: auto_generated
//! scale: 0.8
//! process_every_nth_frame: 2
//! output_image_type: mono8
//! ```

use crate::error::{UndistortError, UndistortResult};
use crate::frame::PixelFormat;
use crate::undistort::InterpolationMethod;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Where the output camera model comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputInfoSource {
    /// Derived from the input: averaged focal length times `scale`, centered
    /// principal point, identity rotation, x-translation only, and the largest
    /// canvas that contains no empty pixels.
    #[default]
    AutoGenerated,
    /// Output intrinsics equal the input ones.
    MatchInput,
    /// Supplied once by the caller, typically from a parameter file.
    RosParams,
    /// Supplied by the caller from an output camera-info stream.
    CameraInfo,
}

impl OutputInfoSource {
    /// Whether the output model is derived from the input model.
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            OutputInfoSource::AutoGenerated | OutputInfoSource::MatchInput
        )
    }
}

impl fmt::Display for OutputInfoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputInfoSource::AutoGenerated => "auto_generated",
            OutputInfoSource::MatchInput => "match_input",
            OutputInfoSource::RosParams => "ros_params",
            OutputInfoSource::CameraInfo => "camera_info",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for OutputInfoSource {
    type Err = UndistortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_generated" => Ok(OutputInfoSource::AutoGenerated),
            "match_input" => Ok(OutputInfoSource::MatchInput),
            "ros_params" => Ok(OutputInfoSource::RosParams),
            "camera_info" => Ok(OutputInfoSource::CameraInfo),
            other => Err(UndistortError::InvalidConfig(format!(
                "Unknown output camera info source '{other}'. Supported: auto_generated, match_input, ros_params, camera_info"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndistortConfig {
    /// Source of the output camera model.
    pub output_camera_info_source: OutputInfoSource,
    /// `false` to only generate output camera info; frames still drive the
    /// timing of the emitted metadata.
    pub process_image: bool,
    /// `false` to only modify the intrinsics and pass pixels through.
    pub undistort_image: bool,
    /// Frame-skip factor, values `<= 1` process every frame.
    pub process_every_nth_frame: u32,
    /// Target pixel encoding (`mono8`, `rgb8`, ...); empty keeps the input encoding.
    pub output_image_type: String,
    /// Multiplier of the auto-generated focal length, resizing the output.
    pub scale: f64,
    /// Emit the output-to-input transform with every output.
    pub publish_tf: bool,
    /// Frame name of the output camera.
    pub output_frame: String,
    /// Report radial-tangential distortion as `plumb_bob` instead of `radtan`.
    pub rename_radtan_plumb_bob: bool,
    pub interpolation: InterpolationMethod,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        UndistortConfig {
            output_camera_info_source: OutputInfoSource::AutoGenerated,
            process_image: true,
            undistort_image: true,
            process_every_nth_frame: 1,
            output_image_type: String::new(),
            scale: 1.0,
            publish_tf: true,
            output_frame: "output_camera".to_string(),
            rename_radtan_plumb_bob: false,
            interpolation: InterpolationMethod::Bilinear,
        }
    }
}

impl UndistortConfig {
    /// Parses a YAML document and validates it.
    pub fn from_yaml_str(contents: &str) -> UndistortResult<Self> {
        let config: UndistortConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a YAML file.
    pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> UndistortResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Target pixel format, `None` when the input format is kept.
    pub fn output_format(&self) -> UndistortResult<Option<PixelFormat>> {
        if self.output_image_type.trim().is_empty() {
            return Ok(None);
        }
        PixelFormat::from_encoding(&self.output_image_type)
            .map(Some)
            .ok_or_else(|| {
                UndistortError::InvalidConfig(format!(
                    "Unsupported output_image_type '{}'",
                    self.output_image_type
                ))
            })
    }

    pub fn validate(&self) -> UndistortResult<()> {
        if !(self.scale > 0.0 && self.scale.is_finite()) {
            return Err(UndistortError::InvalidConfig(format!(
                "scale must be positive, got {}",
                self.scale
            )));
        }
        if self.output_frame.is_empty() {
            return Err(UndistortError::InvalidConfig(
                "output_frame must not be empty".to_string(),
            ));
        }
        self.output_format()?;
        Ok(())
    }
}
