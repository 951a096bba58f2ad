//! Separable Gaussian blur.
//!
//! Used two ways by the calibration engine: a very wide blur (sigma on the
//! order of 100 px) to recover the coarse illuminated-region boundary from
//! averaged field exposures, and a narrow blur to suppress speckle before
//! binarizing marker images. Kernel taps falling outside the image are
//! dropped and the remaining taps renormalized, so border pixels keep the
//! local mean rather than darkening toward zero.

use ndarray::{Array2, ArrayView2};

/// Build a normalized 1D Gaussian kernel truncated at 3 sigma.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil().max(1.0) as usize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let d = i as f64 - radius as f64;
            (-d * d / denom).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for tap in &mut kernel {
        *tap /= sum;
    }
    kernel
}

/// Convolve rows of `src` with `kernel`, renormalizing at the borders.
fn convolve_rows(src: &Array2<f64>, kernel: &[f64]) -> Array2<f64> {
    let (rows, cols) = src.dim();
    let radius = kernel.len() / 2;
    let mut out = Array2::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            let mut weight = 0.0;
            for (k, &tap) in kernel.iter().enumerate() {
                let cc = c as isize + k as isize - radius as isize;
                if cc >= 0 && (cc as usize) < cols {
                    acc += tap * src[[r, cc as usize]];
                    weight += tap;
                }
            }
            out[[r, c]] = acc / weight;
        }
    }
    out
}

/// Blur `image` with an isotropic Gaussian of standard deviation `sigma`.
///
/// Sigma of zero (or below) returns the image unchanged.
pub fn gaussian_blur(image: ArrayView2<'_, f64>, sigma: f64) -> Array2<f64> {
    if sigma <= 0.0 {
        return image.to_owned();
    }
    let kernel = gaussian_kernel(sigma);
    let horizontal = convolve_rows(&image.to_owned(), &kernel);
    // Vertical pass: transpose, reuse the row convolution, transpose back.
    let transposed = horizontal.t().to_owned();
    convolve_rows(&transposed, &kernel).t().to_owned()
}
