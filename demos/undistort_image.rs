//! Image Undistortion Example
//!
//! Undistorts a single image file with a camera description stored as YAML
//! and writes the rectified image, optionally with the output camera info.
//!
//! Usage:
//! ```bash
//! cargo run --example undistort_image -- \
//!   --image samples/frame.png \
//!   --camera-info samples/camera_info.yaml \
//!   --output undistorted.png \
//!   --scale 0.9
//! ```
//!
//! The camera info file has the layout of [`image_undistort::CameraInfo`]:
//!
//! ```yaml
//! frame_id: cam0
//! width: 752
//! height: 480
//! distortion_model: radtan
//! d: [-0.2834, 0.0739, 0.0002, 0.00002]
//! k: [458.654, 0.0, 367.215, 0.0, 457.296, 248.375, 0.0, 0.0, 1.0]
//! p: [458.654, 0.0, 367.215, 0.0, 0.0, 457.296, 248.375, 0.0, 0.0, 0.0, 1.0, 0.0]
//! ```

use clap::Parser;
use image_undistort::{
    CameraInfo, Frame, FrameGate, InterpolationMethod, OutputInfoSource, UndistortConfig,
};
use log::info;
use std::fs;
use std::path::PathBuf;

/// Lens undistortion tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Distorted input image
    #[arg(short = 'i', long)]
    image: PathBuf,

    /// YAML camera info of the input camera
    #[arg(short = 'c', long)]
    camera_info: PathBuf,

    /// Where to write the undistorted image
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Optional YAML pipeline configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output camera policy: auto_generated or match_input
    #[arg(short = 's', long)]
    source: Option<OutputInfoSource>,

    /// Focal length multiplier of the auto-generated output camera
    #[arg(long)]
    scale: Option<f64>,

    /// Use nearest-neighbor instead of bilinear sampling
    #[arg(long)]
    nearest: bool,

    /// Write the output camera info as YAML to this path
    #[arg(long)]
    output_camera_info: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => UndistortConfig::load_from_yaml(path)?,
        None => UndistortConfig::default(),
    };
    if let Some(source) = cli.source {
        config.output_camera_info_source = source;
    }
    if let Some(scale) = cli.scale {
        config.scale = scale;
    }
    if cli.nearest {
        config.interpolation = InterpolationMethod::Nearest;
    }

    let camera_info: CameraInfo = serde_yaml::from_str(&fs::read_to_string(&cli.camera_info)?)?;
    let image = image::open(&cli.image)?;
    let frame = Frame::from_dynamic_image(&image);
    info!("Loaded {:?} from {:?}", frame, cli.image);

    let mut gate = FrameGate::new(config)?;
    let output = gate
        .process_camera(&frame, &camera_info)?
        .ok_or("Frame was not processed")?;

    if let Some(undistorted) = output.frame {
        undistorted.to_dynamic_image()?.save(&cli.output)?;
        info!("Saved {:?} to {:?}", undistorted, cli.output);
    }

    println!(
        "Output camera: {}x{} fx={:.3} fy={:.3} cx={:.3} cy={:.3}",
        output.camera_info.width,
        output.camera_info.height,
        output.camera_info.k[0],
        output.camera_info.k[4],
        output.camera_info.k[2],
        output.camera_info.k[5]
    );

    if let Some(path) = &cli.output_camera_info {
        fs::write(path, serde_yaml::to_string(&output.camera_info)?)?;
        info!("Wrote output camera info to {:?}", path);
    }

    Ok(())
}
