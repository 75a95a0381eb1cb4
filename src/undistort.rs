//! Frame remapping through a cached [`RectificationMap`].
//!
//! [`UndistortionEngine`] owns the map of the current parameter pair and
//! rebuilds it only when the pair's models change. When the input and output
//! models are equal, or undistortion is disabled, frames bypass the map and are
//! only converted to the target pixel format.

use crate::camera::CameraModel;
use crate::error::{UndistortError, UndistortResult};
use crate::frame::{Frame, PixelFormat};
use crate::parameters::CameraParametersPair;
use crate::rectification::RectificationMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Sampling used when reading the input image at sub-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMethod {
    /// Nearest neighbor.
    Nearest,
    /// Bilinear; neighbors past the image border take the base sample value.
    #[default]
    Bilinear,
}

#[inline]
fn nearest(frame: &Frame, x: f32, y: f32, c: usize) -> f32 {
    let u = (x.round() as u32).min(frame.width() - 1);
    let v = (y.round() as u32).min(frame.height() - 1);
    frame.sample(u, v, c)
}

#[inline]
fn bilinear(frame: &Frame, x: f32, y: f32, c: usize) -> f32 {
    let (width, height) = (frame.width(), frame.height());
    let iu = x.trunc() as u32;
    let iv = y.trunc() as u32;
    let frac_u = x.fract();
    let frac_v = y.fract();

    let val00 = frame.sample(iu, iv, c);
    let val01 = if iu + 1 < width {
        frame.sample(iu + 1, iv, c)
    } else {
        val00
    };
    let val10 = if iv + 1 < height {
        frame.sample(iu, iv + 1, c)
    } else {
        val00
    };
    let val11 = if iu + 1 < width && iv + 1 < height {
        frame.sample(iu + 1, iv + 1, c)
    } else {
        val00
    };

    let frac_uu = 1.0 - frac_u;
    let frac_vv = 1.0 - frac_v;
    val00 * frac_uu * frac_vv
        + val01 * frac_u * frac_vv
        + val10 * frac_uu * frac_v
        + val11 * frac_u * frac_v
}

/// Applies `map` to `src`, producing a frame of the map's size and `src`'s format.
///
/// Output pixels marked invalid in the map are zero.
///
/// # Errors
///
/// [`UndistortError::DimensionMismatch`] when `src` does not have the size of
/// the map's input camera.
pub fn remap(
    src: &Frame,
    map: &RectificationMap,
    interpolation: InterpolationMethod,
) -> UndistortResult<Frame> {
    check_dimensions(src, map.input_model())?;

    let channels = src.format().channels();
    let mut dst = Frame::zeros(src.format(), map.width(), map.height());
    let row_len = map.width() as usize;
    let rows = map.map_x().chunks(row_len).zip(map.map_y().chunks(row_len));

    for (v, (row_x, row_y)) in rows.enumerate() {
        for (u, (&x, &y)) in row_x.iter().zip(row_y).enumerate() {
            if x < 0.0 || y < 0.0 {
                continue;
            }
            for c in 0..channels {
                let value = match interpolation {
                    InterpolationMethod::Nearest => nearest(src, x, y, c),
                    InterpolationMethod::Bilinear => bilinear(src, x, y, c),
                };
                dst.set_sample(u as u32, v as u32, c, value);
            }
        }
    }

    Ok(dst)
}

fn check_dimensions(frame: &Frame, model: &CameraModel) -> UndistortResult<()> {
    let expected = model.resolution();
    if frame.resolution() != expected {
        return Err(UndistortError::DimensionMismatch {
            expected_width: expected.width,
            expected_height: expected.height,
            found_width: frame.width(),
            found_height: frame.height(),
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct UndistortionEngine {
    interpolation: InterpolationMethod,
    map: Option<RectificationMap>,
    builds: u64,
}

impl UndistortionEngine {
    pub fn new(interpolation: InterpolationMethod) -> Self {
        UndistortionEngine {
            interpolation,
            map: None,
            builds: 0,
        }
    }

    pub fn interpolation(&self) -> InterpolationMethod {
        self.interpolation
    }

    /// Currently cached map, if any.
    pub fn map(&self) -> Option<&RectificationMap> {
        self.map.as_ref()
    }

    /// Number of maps built over the engine's lifetime.
    pub fn build_count(&self) -> u64 {
        self.builds
    }

    /// Drops the cached map.
    pub fn invalidate(&mut self) {
        if self.map.take().is_some() {
            debug!("Rectification map invalidated");
        }
    }

    /// Makes the cached map match `pair`, building it if needed.
    ///
    /// Returns `true` when a new map was built.
    pub fn prepare(&mut self, pair: &CameraParametersPair) -> UndistortResult<bool> {
        let (input, output) = pair.models().ok_or_else(|| {
            UndistortError::InvalidConfig(
                "Undistortion requires both input and output camera models".to_string(),
            )
        })?;

        if self
            .map
            .as_ref()
            .is_some_and(|map| map.matches(input, output))
        {
            return Ok(false);
        }

        // Release the stale map before allocating its replacement
        self.invalidate();
        let map = RectificationMap::build(pair)?;
        info!(
            "Rectification map rebuilt: {}x{} -> {}x{}",
            input.resolution().width,
            input.resolution().height,
            map.width(),
            map.height()
        );
        self.map = Some(map);
        self.builds += 1;
        Ok(true)
    }

    /// Whether frames for `pair` bypass the map.
    pub fn is_identity(pair: &CameraParametersPair, undistort_image: bool) -> bool {
        !undistort_image
            || pair
                .models()
                .is_some_and(|(input, output)| input == output)
    }

    /// Undistorts `frame` under `pair` and converts it to `target_format`.
    ///
    /// With `undistort_image` unset, or equal input and output models, the
    /// pixels are copied unchanged and only the format conversion happens.
    pub fn process(
        &mut self,
        frame: &Frame,
        pair: &CameraParametersPair,
        undistort_image: bool,
        target_format: Option<PixelFormat>,
    ) -> UndistortResult<Frame> {
        let input = pair.input().ok_or_else(|| {
            UndistortError::InvalidConfig("No input camera model".to_string())
        })?;
        check_dimensions(frame, input)?;
        let target_format = target_format.unwrap_or(frame.format());

        if Self::is_identity(pair, undistort_image) {
            debug!("Identity undistortion, converting {} to {}", frame.format(), target_format);
            return Ok(frame.convert_to(target_format));
        }

        self.prepare(pair)?;
        let map = self.map.as_ref().ok_or_else(|| {
            UndistortError::InvalidConfig("Rectification map unavailable".to_string())
        })?;
        let undistorted = remap(frame, map, self.interpolation)?;
        Ok(undistorted.convert_to(target_format))
    }
}
