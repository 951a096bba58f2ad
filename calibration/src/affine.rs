//! Affine transform between DMD and camera coordinates.
//!
//! The geometric calibration output is the affine map
//! ```text
//! camera_x = a * dmd_x + b * dmd_y + tx
//! camera_y = c * dmd_x + d * dmd_y + ty
//! ```
//! estimated by SVD least squares from marker correspondences.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::correspondence::CorrespondencePair;
use crate::error::FitError;

/// Affine transformation from DMD pixel coordinates to camera pixel
/// coordinates, with the fit quality that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffineTransform {
    /// x contribution to camera_x
    pub a: f64,
    /// y contribution to camera_x
    pub b: f64,
    /// x contribution to camera_y
    pub c: f64,
    /// y contribution to camera_y
    pub d: f64,
    /// Translation offset for camera_x
    pub tx: f64,
    /// Translation offset for camera_y
    pub ty: f64,
    /// Number of correspondences used in the fit
    pub num_points: usize,
    /// RMS residual error in camera pixels
    pub rms_error: f64,
    /// Largest single-point residual in camera pixels
    pub max_error: f64,
}

impl AffineTransform {
    /// Map DMD coordinates to camera coordinates.
    pub fn dmd_to_camera(&self, dmd_x: f64, dmd_y: f64) -> (f64, f64) {
        let camera_x = self.a * dmd_x + self.b * dmd_y + self.tx;
        let camera_y = self.c * dmd_x + self.d * dmd_y + self.ty;
        (camera_x, camera_y)
    }

    /// Scale factors (magnitude of column vectors).
    pub fn scale(&self) -> (f64, f64) {
        let scale_x = (self.a * self.a + self.c * self.c).sqrt();
        let scale_y = (self.b * self.b + self.d * self.d).sqrt();
        (scale_x, scale_y)
    }

    /// Rotation angle in radians.
    pub fn rotation(&self) -> f64 {
        self.c.atan2(self.a)
    }

    /// Rotation angle in degrees.
    pub fn rotation_degrees(&self) -> f64 {
        self.rotation().to_degrees()
    }

    /// Inverse map, camera coordinates back to DMD coordinates.
    ///
    /// Returns `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<AffineTransform> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let ia = self.d / det;
        let ib = -self.b / det;
        let ic = -self.c / det;
        let id = self.a / det;
        Some(AffineTransform {
            a: ia,
            b: ib,
            c: ic,
            d: id,
            tx: -(ia * self.tx + ib * self.ty),
            ty: -(ic * self.tx + id * self.ty),
            num_points: self.num_points,
            rms_error: self.rms_error,
            max_error: self.max_error,
        })
    }

    /// Row-major 2x3 matrix `[[a, b, tx], [c, d, ty]]` for interop with
    /// image-warping tools.
    pub fn matrix_2x3(&self) -> [[f64; 3]; 2] {
        [[self.a, self.b, self.tx], [self.c, self.d, self.ty]]
    }
}

/// Estimate the affine transform from marker correspondences by SVD least
/// squares.
///
/// Requires at least 3 correspondences; fails with [`FitError::Degenerate`]
/// when the source points do not span the plane (collinear or coincident
/// markers).
pub fn fit_affine_transform(pairs: &[CorrespondencePair]) -> Result<AffineTransform, FitError> {
    let n = pairs.len();
    if n < 3 {
        return Err(FitError::InsufficientPairs { needed: 3, got: n });
    }

    // Design matrix A: each row is [dmd_x, dmd_y, 1]
    let mut a_data = Vec::with_capacity(n * 3);
    let mut bx = Vec::with_capacity(n);
    let mut by = Vec::with_capacity(n);

    for p in pairs {
        a_data.push(f64::from(p.dmd.x));
        a_data.push(f64::from(p.dmd.y));
        a_data.push(1.0);
        bx.push(p.camera.0);
        by.push(p.camera.1);
    }

    let a_matrix = DMatrix::from_row_slice(n, 3, &a_data);
    let bx_vec = DVector::from_vec(bx);
    let by_vec = DVector::from_vec(by);

    let svd = a_matrix.svd(true, true);
    let rank = svd.rank(1e-8);
    if rank < 3 {
        return Err(FitError::Degenerate { rank });
    }

    let params_x = svd
        .solve(&bx_vec, 1e-10)
        .map_err(|_| FitError::Degenerate { rank })?;
    let params_y = svd
        .solve(&by_vec, 1e-10)
        .map_err(|_| FitError::Degenerate { rank })?;

    let mut transform = AffineTransform {
        a: params_x[0],
        b: params_x[1],
        c: params_y[0],
        d: params_y[1],
        tx: params_x[2],
        ty: params_y[2],
        num_points: n,
        rms_error: 0.0,
        max_error: 0.0,
    };

    let mut sum_sq_error = 0.0;
    let mut max_error: f64 = 0.0;
    for p in pairs {
        let (pred_x, pred_y) =
            transform.dmd_to_camera(f64::from(p.dmd.x), f64::from(p.dmd.y));
        let err_x = pred_x - p.camera.0;
        let err_y = pred_y - p.camera.1;
        let err = (err_x * err_x + err_y * err_y).sqrt();
        sum_sq_error += err * err;
        max_error = max_error.max(err);
    }
    transform.rms_error = (sum_sq_error / n as f64).sqrt();
    transform.max_error = max_error;

    Ok(transform)
}
