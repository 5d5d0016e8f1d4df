//! Pixel-error statistics: MSE, MAE, and threshold error counts.
//!
//! These capture gross intensity divergence, orthogonal to the perceptual
//! SSIM metrics. Absolute errors are truncated to integer precision to
//! match 8-bit pixel quantization; without that, float noise leaks into
//! the threshold counts.

use crate::image::{ImageF, Mask};
use crate::Error;

/// Fixed absolute-error thresholds for the margin counts.
pub const ERROR_MARGINS: [u32; 6] = [10, 20, 30, 50, 75, 100];

/// Scalar pixel-error statistics for one image pair.
///
/// Masked means over an empty mask are `f64::NAN` ("no data"), never an
/// error and never silently zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelErrorStats {
    /// Mean squared error over the whole image.
    pub mse: f64,
    /// Mean squared error over mask-true pixels (NaN if the mask is empty).
    pub mse_masked: f64,
    /// Mean absolute error (integer-truncated) over the whole image.
    pub mae: f64,
    /// Mean absolute error over mask-true pixels (NaN if the mask is empty).
    pub mae_masked: f64,
    /// Number of mask-true pixels.
    pub mask_size: u64,
    /// Number of pixels with non-zero truncated absolute error.
    pub pixel_errors: u64,
    /// Number of pixels with absolute error above each of
    /// [`ERROR_MARGINS`]; non-increasing across the array.
    pub margin_counts: [u64; 6],
}

impl PixelErrorStats {
    /// Computes the statistics for an aggregate channel against a
    /// reference channel within the given relevance mask.
    ///
    /// # Errors
    /// `ShapeMismatch` if the images or the mask differ in dimensions.
    pub fn compute(reference: &ImageF, aggregate: &ImageF, mask: &Mask) -> Result<Self, Error> {
        if !reference.same_size(aggregate) {
            return Err(Error::ShapeMismatch {
                w1: reference.width(),
                h1: reference.height(),
                w2: aggregate.width(),
                h2: aggregate.height(),
            });
        }
        if !mask.covers(reference) {
            return Err(Error::ShapeMismatch {
                w1: reference.width(),
                h1: reference.height(),
                w2: mask.width(),
                h2: mask.height(),
            });
        }

        let total = reference.data().len() as u64;
        let mut se_sum = 0.0f64;
        let mut se_masked_sum = 0.0f64;
        let mut ae_sum = 0u64;
        let mut ae_masked_sum = 0u64;
        let mut mask_size = 0u64;
        let mut pixel_errors = 0u64;
        let mut margin_counts = [0u64; 6];

        for ((&r, &a), &m) in reference
            .data()
            .iter()
            .zip(aggregate.data())
            .zip(mask.data())
        {
            let diff = f64::from(a) - f64::from(r);
            let se = diff * diff;
            let ae = diff.abs() as u64;

            se_sum += se;
            ae_sum += ae;
            if m {
                mask_size += 1;
                se_masked_sum += se;
                ae_masked_sum += ae;
            }
            if ae != 0 {
                pixel_errors += 1;
            }
            for (count, &margin) in margin_counts.iter_mut().zip(ERROR_MARGINS.iter()) {
                if ae > u64::from(margin) {
                    *count += 1;
                }
            }
        }

        let masked_mean = |sum: f64| {
            if mask_size == 0 {
                f64::NAN
            } else {
                sum / mask_size as f64
            }
        };

        Ok(Self {
            mse: se_sum / total as f64,
            mse_masked: masked_mean(se_masked_sum),
            mae: ae_sum as f64 / total as f64,
            mae_masked: masked_mean(ae_masked_sum as f64),
            mask_size,
            pixel_errors,
            margin_counts,
        })
    }
}
