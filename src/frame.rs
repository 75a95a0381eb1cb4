//! Raw frame buffers and pixel format conversion.
//!
//! A [`Frame`] is a row-major byte buffer with an explicit stride, as produced
//! by camera drivers. 16-bit formats store little-endian samples.

use crate::camera::Resolution;
use crate::error::{UndistortError, UndistortResult};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel encodings understood by the pipeline, named after their ROS encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Mono8,
    Mono16,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    /// Parses an encoding string such as `mono8` or `bgr8`.
    pub fn from_encoding(encoding: &str) -> Option<Self> {
        match encoding.trim().to_lowercase().as_str() {
            "mono8" | "8uc1" => Some(PixelFormat::Mono8),
            "mono16" | "16uc1" => Some(PixelFormat::Mono16),
            "rgb8" => Some(PixelFormat::Rgb8),
            "bgr8" | "8uc3" => Some(PixelFormat::Bgr8),
            "rgba8" => Some(PixelFormat::Rgba8),
            "bgra8" | "8uc4" => Some(PixelFormat::Bgra8),
            _ => None,
        }
    }

    pub fn encoding(&self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "mono8",
            PixelFormat::Mono16 => "mono16",
            PixelFormat::Rgb8 => "rgb8",
            PixelFormat::Bgr8 => "bgr8",
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Bgra8 => "bgra8",
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::Mono16 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    pub fn bytes_per_channel(&self) -> usize {
        match self {
            PixelFormat::Mono16 => 2,
            _ => 1,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.channels() * self.bytes_per_channel()
    }

    /// Largest sample value.
    pub fn max_value(&self) -> f32 {
        match self {
            PixelFormat::Mono16 => u16::MAX as f32,
            _ => u8::MAX as f32,
        }
    }

    /// Position of the red, green and blue samples inside a pixel, `None` for mono.
    fn rgb_order(&self) -> Option<[usize; 3]> {
        match self {
            PixelFormat::Mono8 | PixelFormat::Mono16 => None,
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => Some([0, 1, 2]),
            PixelFormat::Bgr8 | PixelFormat::Bgra8 => Some([2, 1, 0]),
        }
    }

    fn has_alpha(&self) -> bool {
        self.channels() == 4
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoding())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl Frame {
    /// Wraps a driver buffer.
    ///
    /// # Errors
    ///
    /// [`UndistortError::InvalidFrame`] if the size is empty, the stride is
    /// shorter than a row, or the buffer is shorter than `stride * height`.
    pub fn new(
        format: PixelFormat,
        width: u32,
        height: u32,
        stride: usize,
        data: Vec<u8>,
    ) -> UndistortResult<Self> {
        if width == 0 || height == 0 {
            return Err(UndistortError::InvalidFrame(format!(
                "Frame size must be non-zero, got {width}x{height}"
            )));
        }
        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride < row_bytes {
            return Err(UndistortError::InvalidFrame(format!(
                "Stride {stride} is shorter than a {format} row of {row_bytes} bytes"
            )));
        }
        if data.len() < stride * height as usize {
            return Err(UndistortError::InvalidFrame(format!(
                "Buffer holds {} bytes, expected at least {}",
                data.len(),
                stride * height as usize
            )));
        }
        Ok(Frame {
            format,
            width,
            height,
            stride,
            data,
        })
    }

    /// A black frame with tightly packed rows.
    pub fn zeros(format: PixelFormat, width: u32, height: u32) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Frame {
            format,
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    fn offset(&self, x: u32, y: u32, c: usize) -> usize {
        y as usize * self.stride
            + (x as usize * self.format.channels() + c) * self.format.bytes_per_channel()
    }

    /// Reads channel `c` of pixel `(x, y)` in native sample units.
    #[inline]
    pub fn sample(&self, x: u32, y: u32, c: usize) -> f32 {
        let i = self.offset(x, y, c);
        match self.format.bytes_per_channel() {
            2 => u16::from_le_bytes([self.data[i], self.data[i + 1]]) as f32,
            _ => self.data[i] as f32,
        }
    }

    /// Writes channel `c` of pixel `(x, y)`, rounding and saturating `value`.
    #[inline]
    pub fn set_sample(&mut self, x: u32, y: u32, c: usize, value: f32) {
        let i = self.offset(x, y, c);
        let value = value.round().clamp(0.0, self.format.max_value());
        match self.format.bytes_per_channel() {
            2 => self.data[i..i + 2].copy_from_slice(&(value as u16).to_le_bytes()),
            _ => self.data[i] = value as u8,
        }
    }

    /// Pixel `(x, y)` as normalized `[r, g, b, a]` in `0..=1`.
    fn rgba(&self, x: u32, y: u32) -> [f32; 4] {
        let max = self.format.max_value();
        let alpha = if self.format.has_alpha() {
            self.sample(x, y, 3) / max
        } else {
            1.0
        };
        match self.format.rgb_order() {
            None => {
                let v = self.sample(x, y, 0) / max;
                [v, v, v, alpha]
            }
            Some([r, g, b]) => [
                self.sample(x, y, r) / max,
                self.sample(x, y, g) / max,
                self.sample(x, y, b) / max,
                alpha,
            ],
        }
    }

    fn set_rgba(&mut self, x: u32, y: u32, rgba: [f32; 4]) {
        let max = self.format.max_value();
        match self.format.rgb_order() {
            None => {
                let gray = 0.299 * rgba[0] + 0.587 * rgba[1] + 0.114 * rgba[2];
                self.set_sample(x, y, 0, gray * max);
            }
            Some(order) => {
                for (channel, value) in order.into_iter().zip(rgba) {
                    self.set_sample(x, y, channel, value * max);
                }
            }
        }
        if self.format.has_alpha() {
            self.set_sample(x, y, 3, rgba[3] * max);
        }
    }

    /// Converts to `target`; the same format yields an exact copy.
    pub fn convert_to(&self, target: PixelFormat) -> Frame {
        if target == self.format {
            return self.clone();
        }
        let mut out = Frame::zeros(target, self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                out.set_rgba(x, y, self.rgba(x, y));
            }
        }
        out
    }

    /// Copies an [`image`] buffer into a frame; unsupported layouts go through RGB8.
    pub fn from_dynamic_image(image: &DynamicImage) -> Frame {
        let (format, width, height, data) = match image {
            DynamicImage::ImageLuma8(buffer) => (
                PixelFormat::Mono8,
                buffer.width(),
                buffer.height(),
                buffer.as_raw().clone(),
            ),
            DynamicImage::ImageLuma16(buffer) => (
                PixelFormat::Mono16,
                buffer.width(),
                buffer.height(),
                buffer.as_raw().iter().flat_map(|v| v.to_le_bytes()).collect(),
            ),
            DynamicImage::ImageRgba8(buffer) => (
                PixelFormat::Rgba8,
                buffer.width(),
                buffer.height(),
                buffer.as_raw().clone(),
            ),
            other => {
                let buffer = other.to_rgb8();
                (
                    PixelFormat::Rgb8,
                    buffer.width(),
                    buffer.height(),
                    buffer.into_raw(),
                )
            }
        };
        let stride = width as usize * format.bytes_per_pixel();
        Frame {
            format,
            width,
            height,
            stride,
            data,
        }
    }

    /// Copies the frame into an [`image`] buffer; BGR layouts are reordered to RGB.
    pub fn to_dynamic_image(&self) -> UndistortResult<DynamicImage> {
        let packed = |frame: &Frame| -> Vec<u8> {
            let row_bytes = frame.width as usize * frame.format.bytes_per_pixel();
            frame
                .data
                .chunks(frame.stride)
                .take(frame.height as usize)
                .flat_map(|row| row[..row_bytes].iter().copied())
                .collect()
        };
        let invalid = || UndistortError::InvalidFrame("Buffer does not fit image layout".to_string());

        let image = match self.format {
            PixelFormat::Mono8 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(self.width, self.height, packed(self)).ok_or_else(invalid)?,
            ),
            PixelFormat::Mono16 => {
                let samples: Vec<u16> = packed(self)
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();
                DynamicImage::ImageLuma16(
                    ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(self.width, self.height, samples)
                        .ok_or_else(invalid)?,
                )
            }
            PixelFormat::Rgb8 => DynamicImage::ImageRgb8(
                RgbImage::from_raw(self.width, self.height, packed(self)).ok_or_else(invalid)?,
            ),
            PixelFormat::Rgba8 => DynamicImage::ImageRgba8(
                RgbaImage::from_raw(self.width, self.height, packed(self)).ok_or_else(invalid)?,
            ),
            PixelFormat::Bgr8 => return self.convert_to(PixelFormat::Rgb8).to_dynamic_image(),
            PixelFormat::Bgra8 => return self.convert_to(PixelFormat::Rgba8).to_dynamic_image(),
        };
        Ok(image)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame [{}x{} {} stride: {}]",
            self.width, self.height, self.format, self.stride
        )
    }
}
