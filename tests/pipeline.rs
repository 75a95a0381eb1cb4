use image_undistort::{
    CameraInfo, CameraModel, DistortionModel, Frame, FrameGate, GateState, Intrinsics,
    OutputInfoSource, PixelFormat, Resolution, UndistortConfig,
};
use nalgebra::Vector2;

fn radtan_camera() -> CameraModel {
    CameraModel::new(
        Resolution {
            width: 640,
            height: 480,
        },
        Intrinsics {
            fx: 500.0,
            fy: 500.0,
            cx: 320.0,
            cy: 240.0,
        },
        DistortionModel::RadTan,
        vec![-0.3, 0.1, 0.0, 0.0],
    )
    .unwrap()
}

/// Intensity as a linear ramp of the ideal normalized x coordinate.
fn ramp(x: f64) -> f64 {
    128.0 + 150.0 * x
}

/// A distorted frame of a scene whose brightness grows linearly from left to right.
fn distorted_ramp(camera: &CameraModel) -> Frame {
    let intrinsics = camera.intrinsics();
    let mut frame = Frame::zeros(PixelFormat::Mono8, 640, 480);
    for v in 0..480 {
        for u in 0..640 {
            let ideal = camera
                .undistort(&Vector2::new(u as f64, v as f64))
                .unwrap();
            let x = (ideal.x - intrinsics.cx) / intrinsics.fx;
            frame.set_sample(u, v, 0, ramp(x) as f32);
        }
    }
    frame
}

#[test]
fn test_radtan_stream_is_rectified() {
    let camera = radtan_camera();
    let info = CameraInfo::from_model(&camera, "cam0", true);
    let frame = distorted_ramp(&camera);

    let mut gate = FrameGate::new(UndistortConfig {
        process_every_nth_frame: 2,
        rename_radtan_plumb_bob: true,
        ..Default::default()
    })
    .unwrap();

    let mut outputs = Vec::new();
    for i in 0..6 {
        if let Some(output) = gate.process_camera(&frame, &info).unwrap() {
            outputs.push((i, output));
        }
    }
    assert_eq!(gate.state(), GateState::Ready);
    assert_eq!(
        outputs.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
        vec![0, 2, 4]
    );
    assert!(outputs[0].1.camera_info_changed);
    assert!(!outputs[1].1.camera_info_changed);
    assert!(!outputs[2].1.camera_info_changed);
    assert_eq!(gate.engine().build_count(), 1);

    let output = &outputs[0].1;
    let out_info = &output.camera_info;
    assert_eq!(out_info.distortion_model, "none");
    assert_eq!(out_info.k[0], 500.0);
    assert_eq!(out_info.frame_id, "output_camera");

    let rectified = output.frame.as_ref().unwrap();
    assert_eq!(rectified.width(), out_info.width);
    assert_eq!(rectified.height(), out_info.height);

    // Straight lines stay straight: brightness depends only on the output column
    let (fx, cx) = (out_info.k[0], out_info.k[2]);
    for v in [0, out_info.height / 3, out_info.height / 2, out_info.height - 1] {
        for u in (0..out_info.width).step_by(37) {
            let expected = ramp((u as f64 - cx) / fx);
            let actual = rectified.sample(u, v, 0) as f64;
            assert!(
                (actual - expected).abs() <= 3.0,
                "pixel ({u}, {v}): expected {expected:.1}, got {actual}"
            );
        }
    }

    // Every output pixel sees the input image
    let map = gate.engine().map().unwrap();
    assert_eq!(map.invalid_count(), 0);
}

#[test]
fn test_match_input_stream_is_exact_copy() {
    let camera = radtan_camera();
    let info = CameraInfo::from_model(&camera, "cam0", false);
    let frame = distorted_ramp(&camera);

    let mut gate = FrameGate::new(UndistortConfig {
        output_camera_info_source: OutputInfoSource::MatchInput,
        ..Default::default()
    })
    .unwrap();

    let output = gate.process_camera(&frame, &info).unwrap().unwrap();
    assert_eq!(output.frame, Some(frame));
    assert_eq!(output.camera_info.distortion_model, "radtan");
    assert_eq!(output.camera_info.d, vec![-0.3, 0.1, 0.0, 0.0]);
    assert!(gate.engine().map().is_none());
}

#[test]
fn test_changed_calibration_mid_stream() {
    let camera = radtan_camera();
    let mut gate = FrameGate::new(UndistortConfig::default()).unwrap();
    let frame = Frame::zeros(PixelFormat::Bgr8, 640, 480);

    let first = gate
        .process_camera(&frame, &CameraInfo::from_model(&camera, "cam0", false))
        .unwrap()
        .unwrap();

    let zoomed = CameraModel::new(
        camera.resolution(),
        Intrinsics {
            fx: 600.0,
            fy: 600.0,
            cx: 320.0,
            cy: 240.0,
        },
        DistortionModel::RadTan,
        vec![-0.3, 0.1, 0.0, 0.0],
    )
    .unwrap();
    let second = gate
        .process_camera(&frame, &CameraInfo::from_model(&zoomed, "cam0", false))
        .unwrap()
        .unwrap();

    assert!(second.camera_info_changed);
    assert_eq!(second.camera_info.k[0], 600.0);
    assert_ne!(first.camera_info, second.camera_info);
    assert_eq!(gate.engine().build_count(), 2);
    assert_eq!(
        second.frame.unwrap().resolution(),
        Resolution {
            width: second.camera_info.width,
            height: second.camera_info.height,
        }
    );
}
