//! Stack and masked statistics over image arrays.
//!
//! The field-level calibration works entirely in terms of pixelwise means and
//! variances over repeated exposures; these helpers keep that arithmetic in
//! one place.

use ndarray::{Array2, ArrayView2};

/// Pixelwise mean of a stack of equally shaped images.
///
/// # Panics
/// Panics if the stack is empty or shapes disagree; callers validate the
/// exposure counts before averaging.
pub fn stack_mean(stack: &[Array2<f64>]) -> Array2<f64> {
    assert!(!stack.is_empty(), "cannot average an empty image stack");
    let mut sum = stack[0].clone();
    for image in &stack[1..] {
        assert_eq!(image.dim(), sum.dim(), "image stack shapes disagree");
        sum += image;
    }
    sum / stack.len() as f64
}

/// Mean over all pixels of the per-pixel population variance across a stack.
///
/// This is the scalar "how repeatable are these exposures" number used by the
/// signal-separation validity check.
pub fn mean_stack_variance(stack: &[Array2<f64>]) -> f64 {
    let mean = stack_mean(stack);
    let n = stack.len() as f64;
    let mut acc = Array2::<f64>::zeros(mean.dim());
    for image in stack {
        let diff = image - &mean;
        acc += &(&diff * &diff);
    }
    frame_mean((acc / n).view())
}

/// Mean over all pixels of the per-pixel variance between two images.
///
/// Equivalent to stacking the two images and taking the mean population
/// variance: for each pixel the variance of {a, b} is (a - b)^2 / 4.
pub fn mean_pairwise_variance(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> f64 {
    assert_eq!(a.dim(), b.dim(), "image shapes disagree");
    let diff = &a - &b;
    frame_mean((&diff * &diff / 4.0).view())
}

/// Mean of all pixels in one image.
pub fn frame_mean(image: ArrayView2<'_, f64>) -> f64 {
    image.mean().unwrap_or(0.0)
}

/// Population variance of all pixels in one image (spatial unevenness).
pub fn frame_variance(image: ArrayView2<'_, f64>) -> f64 {
    let mean = frame_mean(image);
    let n = image.len();
    if n == 0 {
        return 0.0;
    }
    image.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n as f64
}

/// Mean of `image` restricted to pixels where `mask` is true.
///
/// Returns `None` for an empty mask.
pub fn masked_mean(image: ArrayView2<'_, f64>, mask: ArrayView2<'_, bool>) -> Option<f64> {
    assert_eq!(image.dim(), mask.dim(), "mask shape disagrees with image");
    let mut sum = 0.0;
    let mut count = 0usize;
    for (&value, &keep) in image.iter().zip(mask.iter()) {
        if keep {
            sum += value;
            count += 1;
        }
    }
    (count > 0).then(|| sum / count as f64)
}
