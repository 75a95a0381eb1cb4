//! Stream-level gating of frames and camera metadata.
//!
//! [`FrameGate`] is the single owner of the parameter pair and the
//! undistortion engine. Metadata updates and frames are applied in arrival
//! order on the caller's thread, so a frame is always processed with the
//! metadata that preceded it.
//!
//! ```text
//!                 metadata (valid pair)
//!  WaitingForInfo ─────────────────────▶ Ready ◀──────┐
//!                                          │          │ frame (map rebuilt)
//!                       changed metadata   ▼          │
//!                                        Stale ───────┘
//! ```

use crate::camera::{CameraInfo, CameraModel};
use crate::config::{OutputInfoSource, UndistortConfig};
use crate::error::{UndistortError, UndistortResult};
use crate::frame::{Frame, PixelFormat};
use crate::parameters::{CameraParametersPair, OutputPolicy};
use crate::undistort::UndistortionEngine;
use log::{debug, info, warn};
use nalgebra::IsometryMatrix3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No valid parameter pair yet, frames are dropped.
    WaitingForInfo,
    /// The cached map matches the current pair.
    Ready,
    /// The pair changed since the map was built.
    Stale,
}

/// Output-to-input camera transform tagged with its frame names.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTransform {
    /// Frame of the input camera, taken from its metadata.
    pub parent_frame: String,
    /// Configured output frame.
    pub child_frame: String,
    pub output_to_input: IsometryMatrix3<f64>,
}

/// Result of one processed frame.
#[derive(Debug, Clone)]
pub struct GateOutput {
    /// Rectified frame, `None` when image processing is disabled.
    pub frame: Option<Frame>,
    /// Output camera metadata.
    pub camera_info: CameraInfo,
    /// Set on the first output after the output metadata changed.
    pub camera_info_changed: bool,
    /// Present when transform publishing is enabled.
    pub transform: Option<FrameTransform>,
}

pub struct FrameGate {
    config: UndistortConfig,
    output_format: Option<PixelFormat>,
    pair: CameraParametersPair,
    engine: UndistortionEngine,
    state: GateState,
    frame_counter: u64,
    input_frame_id: String,
    camera_info_changed: bool,
}

impl FrameGate {
    /// Creates a gate waiting for its first input metadata.
    pub fn new(config: UndistortConfig) -> UndistortResult<Self> {
        config.validate()?;
        let output_format = config.output_format()?;
        let policy = OutputPolicy::from_config(&config)?;
        info!(
            "Frame gate configured: source {}, scale {}, every {} frame(s)",
            policy.source(),
            policy.scale(),
            config.process_every_nth_frame.max(1)
        );

        Ok(FrameGate {
            engine: UndistortionEngine::new(config.interpolation),
            pair: CameraParametersPair::new(policy),
            config,
            output_format,
            state: GateState::WaitingForInfo,
            frame_counter: 0,
            input_frame_id: String::new(),
            camera_info_changed: false,
        })
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn config(&self) -> &UndistortConfig {
        &self.config
    }

    /// Read-only view of the current parameter pair.
    pub fn parameters(&self) -> &CameraParametersPair {
        &self.pair
    }

    pub fn engine(&self) -> &UndistortionEngine {
        &self.engine
    }

    /// Number of frames seen so far, processed or dropped.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Output metadata for the current pair, if valid.
    pub fn output_camera_info(&self) -> Option<CameraInfo> {
        self.pair.output_camera_info(&self.config.output_frame)
    }

    /// Applies input camera metadata.
    ///
    /// Invalid metadata is rejected and the previous model is kept.
    pub fn update_camera_info(&mut self, camera_info: &CameraInfo) -> UndistortResult<()> {
        let model = camera_info.to_model().map_err(|e| {
            warn!("Rejected input camera info: {e}");
            UndistortError::from(e)
        })?;
        let changed = self.pair.set_input_model(model).map_err(|e| {
            warn!("Could not derive an output camera: {e}");
            e
        })?;
        self.input_frame_id = camera_info.frame_id.clone();
        self.on_parameters_updated(changed)
    }

    /// Applies output camera metadata under the `camera_info` policy.
    pub fn update_output_camera_info(&mut self, camera_info: &CameraInfo) -> UndistortResult<()> {
        if self.pair.policy().source() != OutputInfoSource::CameraInfo {
            return Err(UndistortError::PolicyMismatch {
                policy: self.pair.policy().source(),
            });
        }
        let model = camera_info.to_model()?;
        self.set_output_model(model)
    }

    /// Installs an externally supplied output model (`ros_params` or
    /// `camera_info` policy).
    pub fn set_output_model(&mut self, model: CameraModel) -> UndistortResult<()> {
        let changed = self.pair.set_output_model(model)?;
        self.on_parameters_updated(changed)
    }

    fn on_parameters_updated(&mut self, changed: bool) -> UndistortResult<()> {
        match self.state {
            GateState::WaitingForInfo if self.pair.is_valid() => {
                self.rebuild()?;
                self.camera_info_changed = true;
                info!("Camera parameters complete, processing frames");
            }
            GateState::WaitingForInfo => {
                debug!("Camera parameters incomplete, still waiting");
            }
            GateState::Ready | GateState::Stale if changed => {
                self.state = GateState::Stale;
                self.camera_info_changed = true;
                debug!("Camera parameters changed, map marked stale");
            }
            GateState::Ready | GateState::Stale => {}
        }
        Ok(())
    }

    fn rebuild(&mut self) -> UndistortResult<()> {
        if self.undistorts() && !UndistortionEngine::is_identity(&self.pair, true) {
            self.engine.prepare(&self.pair)?;
        } else {
            self.engine.invalidate();
        }
        self.state = GateState::Ready;
        Ok(())
    }

    fn undistorts(&self) -> bool {
        self.config.process_image && self.config.undistort_image
    }

    /// Whether the frame with index `index` passes the frame-skip filter.
    fn is_selected(&self, index: u64) -> bool {
        let n = u64::from(self.config.process_every_nth_frame);
        n <= 1 || index % n == 0
    }

    /// Processes a frame with the most recent metadata.
    ///
    /// Returns `Ok(None)` for frames dropped by the frame-skip filter or while
    /// waiting for metadata.
    pub fn process_frame(&mut self, frame: &Frame) -> UndistortResult<Option<GateOutput>> {
        let index = self.frame_counter;
        self.frame_counter += 1;

        if !self.is_selected(index) {
            debug!("Frame {index} skipped");
            return Ok(None);
        }

        match self.state {
            GateState::WaitingForInfo => {
                warn!("Frame {index} dropped, waiting for camera info");
                return Ok(None);
            }
            GateState::Stale => {
                self.rebuild()?;
                info!("Rectification state refreshed at frame {index}");
            }
            GateState::Ready => {}
        }

        let undistorted = if self.config.process_image {
            let result = self.engine.process(
                frame,
                &self.pair,
                self.config.undistort_image,
                self.output_format,
            );
            match result {
                Ok(undistorted) => Some(undistorted),
                Err(e) => {
                    warn!("Frame {index} dropped: {e}");
                    return Err(e);
                }
            }
        } else {
            None
        };

        let camera_info = self.output_camera_info().ok_or_else(|| {
            UndistortError::InvalidConfig("No output camera model".to_string())
        })?;
        let transform = if self.config.publish_tf {
            self.pair
                .output_to_input_transform()
                .map(|output_to_input| FrameTransform {
                    parent_frame: self.input_frame_id.clone(),
                    child_frame: self.config.output_frame.clone(),
                    output_to_input,
                })
        } else {
            None
        };

        Ok(Some(GateOutput {
            frame: undistorted,
            camera_info,
            camera_info_changed: std::mem::take(&mut self.camera_info_changed),
            transform,
        }))
    }

    /// Processes a frame together with its synchronized input metadata.
    ///
    /// The metadata is applied first. Invalid metadata is logged and the frame
    /// is processed with the previously accepted models; the error is only
    /// returned when no valid models exist yet, in which case the frame still
    /// counts toward the frame-skip filter.
    pub fn process_camera(
        &mut self,
        frame: &Frame,
        camera_info: &CameraInfo,
    ) -> UndistortResult<Option<GateOutput>> {
        if let Err(e) = self.update_camera_info(camera_info) {
            if self.state == GateState::WaitingForInfo {
                self.frame_counter += 1;
                return Err(e);
            }
            warn!("Processing frame with the previous camera parameters");
        }
        self.process_frame(frame)
    }
}
