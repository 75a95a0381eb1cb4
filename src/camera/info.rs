//! Camera metadata descriptor exchanged with the rest of the system.
//!
//! [`CameraInfo`] follows the layout of the ROS `sensor_msgs/CameraInfo`
//! message: a distortion label, the coefficient vector `d`, the camera matrix
//! `k`, the rectification rotation `r` and the projection matrix `p`, all
//! row-major.

use crate::camera::{CameraModel, CameraModelError, DistortionModel, Intrinsics, Resolution};
use nalgebra::{Matrix3, Matrix3x4, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Coordinate frame the described camera lives in.
    #[serde(default)]
    pub frame_id: String,
    pub width: u32,
    pub height: u32,
    pub distortion_model: String,
    #[serde(default)]
    pub d: Vec<f64>,
    pub k: [f64; 9],
    #[serde(default = "identity_rotation")]
    pub r: [f64; 9],
    pub p: [f64; 12],
}

fn identity_rotation() -> [f64; 9] {
    [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
}

impl CameraInfo {
    /// Describes `model`, labelling radial-tangential distortion as `plumb_bob`
    /// when `rename_radtan_plumb_bob` is set.
    ///
    /// The projection matrix is `p = K [I | t]`, which carries the translation
    /// of the model (e.g. a stereo baseline) the same way ROS does.
    pub fn from_model(model: &CameraModel, frame_id: &str, rename_radtan_plumb_bob: bool) -> Self {
        let k = model.intrinsics().matrix();
        let kt = k * model.translation();
        let mut p = Matrix3x4::zeros();
        p.fixed_view_mut::<3, 3>(0, 0).copy_from(&k);
        p.set_column(3, &kt);

        let resolution = model.resolution();
        CameraInfo {
            frame_id: frame_id.to_string(),
            width: resolution.width,
            height: resolution.height,
            distortion_model: model
                .distortion_model()
                .label(rename_radtan_plumb_bob)
                .to_string(),
            d: model.distortion().to_vec(),
            k: row_major_3x3(&k),
            r: row_major_3x3(model.rotation()),
            p: row_major_3x4(&p),
        }
    }

    /// Builds the [`CameraModel`] this descriptor describes.
    ///
    /// Trailing zero coefficients beyond what the distortion model accepts are
    /// dropped, so a ROS `plumb_bob` message with five coefficients and an
    /// all-zero `d` for a `none` model both load.
    pub fn to_model(&self) -> Result<CameraModel, CameraModelError> {
        let distortion_model = DistortionModel::from_label(&self.distortion_model)?;
        let d = trim_coefficients(distortion_model, &self.d);

        let k = Matrix3::from_row_slice(&self.k);
        let intrinsics = Intrinsics {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        };
        let resolution = Resolution {
            width: self.width,
            height: self.height,
        };
        let model = CameraModel::new(resolution, intrinsics, distortion_model, d)?;

        let rotation = Matrix3::from_row_slice(&self.r);
        let translation = self.translation(&k)?;

        model.with_extrinsics(rotation, translation)
    }

    /// Translation encoded in the last column of `p`.
    ///
    /// The left block of `p` is the projection matrix of the rectified camera,
    /// which may differ from `k`; `k` is only used when that block is empty or
    /// singular.
    fn translation(&self, k: &Matrix3<f64>) -> Result<Vector3<f64>, CameraModelError> {
        let p = Matrix3x4::from_row_slice(&self.p);
        let pt: Vector3<f64> = p.column(3).into_owned();
        let projection: Matrix3<f64> = p.fixed_view::<3, 3>(0, 0).into_owned();

        projection
            .try_inverse()
            .or_else(|| k.try_inverse())
            .map(|inverse| inverse * pt)
            .ok_or_else(|| CameraModelError::InvalidModel("Camera matrix is singular".to_string()))
    }
}

fn trim_coefficients(model: DistortionModel, d: &[f64]) -> Vec<f64> {
    let mut d = d.to_vec();
    while !model.accepts_coefficient_count(d.len()) && d.last() == Some(&0.0) {
        d.pop();
    }
    d
}

fn row_major_3x3(m: &Matrix3<f64>) -> [f64; 9] {
    let mut out = [0.0; 9];
    for (i, value) in m.transpose().iter().enumerate() {
        out[i] = *value;
    }
    out
}

fn row_major_3x4(m: &Matrix3x4<f64>) -> [f64; 12] {
    let mut out = [0.0; 12];
    for (i, value) in m.transpose().iter().enumerate() {
        out[i] = *value;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::test_models::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_camera_info_round_trip() {
        let model = radtan_vga()
            .with_extrinsics(
                Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0),
                Vector3::new(-0.11, 0.002, 0.0005),
            )
            .unwrap();

        let info = CameraInfo::from_model(&model, "cam0", false);
        assert_eq!(info.distortion_model, "radtan");
        assert_eq!(info.k, [500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0]);
        // Row-major: second row of R is (1, 0, 0)
        assert_eq!(&info.r[3..6], &[1.0, 0.0, 0.0]);
        assert_relative_eq!(info.p[3], 500.0 * -0.11 + 320.0 * 0.0005, epsilon = 1e-12);

        let restored = info.to_model().unwrap();
        assert_eq!(restored.intrinsics(), model.intrinsics());
        assert_eq!(restored.distortion(), model.distortion());
        assert_eq!(restored.rotation(), model.rotation());
        assert_relative_eq!(restored.translation(), model.translation(), epsilon = 1e-12);
    }

    #[test]
    fn test_translation_uses_rectified_projection() {
        // Right camera of a stereo pair: rectified focal length 450, baseline 0.1
        let mut info = CameraInfo::from_model(&radtan_vga(), "cam1", false);
        info.p = [
            450.0, 0.0, 300.0, -45.0, //
            0.0, 450.0, 230.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ];
        let model = info.to_model().unwrap();
        assert_eq!(model.intrinsics().fx, 500.0);
        assert_relative_eq!(model.translation(), &Vector3::new(-0.1, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_translation_falls_back_to_camera_matrix() {
        let mut info = CameraInfo::from_model(&radtan_vga(), "cam0", false);
        info.p = [0.0; 12];
        assert_eq!(info.to_model().unwrap().translation(), &Vector3::zeros());

        // Only the last column filled: the left block is singular
        info.p[3] = -50.0;
        assert_relative_eq!(
            info.to_model().unwrap().translation(),
            &Vector3::new(-0.1, 0.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_plumb_bob_label() {
        let info = CameraInfo::from_model(&radtan_vga(), "cam0", true);
        assert_eq!(info.distortion_model, "plumb_bob");
        assert_eq!(info.to_model().unwrap().distortion_model(), DistortionModel::RadTan);

        let info = CameraInfo::from_model(&equidistant_vga(), "cam0", true);
        assert_eq!(info.distortion_model, "equidistant");
    }

    #[test]
    fn test_ros_style_zero_padding_is_accepted() {
        let mut info = CameraInfo::from_model(
            &CameraModel::pinhole(vga(), vga_intrinsics()).unwrap(),
            "cam0",
            false,
        );
        info.d = vec![0.0; 5];
        assert_eq!(info.to_model().unwrap().distortion().len(), 0);

        info.distortion_model = "equidistant".to_string();
        info.d = vec![0.1, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(info.to_model().unwrap().distortion(), &[0.1, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_invalid_info_is_rejected() {
        let mut info = CameraInfo::from_model(&radtan_vga(), "cam0", false);
        info.d = vec![0.1, 0.2, 0.3];
        assert!(info.to_model().is_err());

        let mut info = CameraInfo::from_model(&radtan_vga(), "cam0", false);
        info.width = 0;
        assert!(info.to_model().is_err());

        let mut info = CameraInfo::from_model(&radtan_vga(), "cam0", false);
        info.distortion_model = "omni".to_string();
        assert!(info.to_model().is_err());
    }

    #[test]
    fn test_camera_info_serde() {
        let info = CameraInfo::from_model(&equidistant_vga(), "cam0", false);
        let yaml = serde_yaml::to_string(&info).unwrap();
        let parsed: CameraInfo = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, info);
    }
}
