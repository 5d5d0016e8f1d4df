//! Windowed structural-similarity maps and their masked summaries.
//!
//! Local means, variances, and covariance are computed with a separable
//! window filter (uniform or Gaussian), combined by the standard SSIM
//! formula, and reduced to global and mask-restricted means. The derived
//! dissimilarity `DSSIM = (1 - SSIM) / 2` maps onto `[0, 1]`.

use crate::filter::{gaussian_kernel, separable_filter, uniform_kernel};
use crate::image::{ImageF, Mask};
use crate::Error;

/// Default window size for local statistics.
pub const DEFAULT_WIN_SIZE: usize = 11;
/// Default sigma for the Gaussian-weighted window.
pub const DEFAULT_SIGMA: f32 = 1.5;
/// Default dynamic range of the channel values (8-bit images).
pub const DEFAULT_DATA_RANGE: f32 = 255.0;

// Stability constants of the SSIM formula: C1 = (K1*L)^2, C2 = (K2*L)^2.
const K1: f32 = 0.01;
const K2: f32 = 0.03;

/// SSIM computation parameters.
///
/// ```rust
/// use tsfidelity::SsimConfig;
///
/// let config = SsimConfig::new().with_gaussian_weights(true).with_sigma(1.5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SsimConfig {
    win_size: usize,
    gaussian_weights: bool,
    sigma: f32,
    data_range: f32,
}

impl Default for SsimConfig {
    fn default() -> Self {
        Self {
            win_size: DEFAULT_WIN_SIZE,
            gaussian_weights: false,
            sigma: DEFAULT_SIGMA,
            data_range: DEFAULT_DATA_RANGE,
        }
    }
}

impl SsimConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the window size (odd).
    #[must_use]
    pub fn with_win_size(mut self, win_size: usize) -> Self {
        self.win_size = win_size;
        self
    }

    /// Switches between the uniform window and a Gaussian-weighted window
    /// of radius `(win_size - 1) / 2`.
    #[must_use]
    pub fn with_gaussian_weights(mut self, gaussian_weights: bool) -> Self {
        self.gaussian_weights = gaussian_weights;
        self
    }

    /// Sets the Gaussian sigma (only used with Gaussian weights).
    #[must_use]
    pub fn with_sigma(mut self, sigma: f32) -> Self {
        self.sigma = sigma;
        self
    }

    /// Sets the dynamic range of the input values.
    #[must_use]
    pub fn with_data_range(mut self, data_range: f32) -> Self {
        self.data_range = data_range;
        self
    }

    /// Returns the window size.
    #[must_use]
    pub fn win_size(&self) -> usize {
        self.win_size
    }

    /// Returns whether Gaussian weighting is enabled.
    #[must_use]
    pub fn gaussian_weights(&self) -> bool {
        self.gaussian_weights
    }
}

/// Computes the per-pixel SSIM map between a reference channel and an
/// aggregate channel.
///
/// The map has the same shape as the inputs; comparing an image to itself
/// yields exactly 1.0 everywhere.
///
/// # Errors
/// `ShapeMismatch` if the images differ in dimensions; `InvalidParameter`
/// if the window size is zero or even, or sigma is not positive.
pub fn ssim_map(reference: &ImageF, aggregate: &ImageF, config: &SsimConfig) -> Result<ImageF, Error> {
    if !reference.same_size(aggregate) {
        return Err(Error::ShapeMismatch {
            w1: reference.width(),
            h1: reference.height(),
            w2: aggregate.width(),
            h2: aggregate.height(),
        });
    }
    if config.win_size == 0 || config.win_size % 2 == 0 {
        return Err(Error::InvalidParameter {
            what: format!("SSIM window size must be odd, got {}", config.win_size),
        });
    }
    if config.gaussian_weights && config.sigma <= 0.0 {
        return Err(Error::InvalidParameter {
            what: format!("SSIM sigma must be positive, got {}", config.sigma),
        });
    }

    let kernel = if config.gaussian_weights {
        gaussian_kernel(config.sigma, (config.win_size - 1) / 2)
    } else {
        uniform_kernel(config.win_size)
    };

    let ux = separable_filter(reference, &kernel);
    let uy = separable_filter(aggregate, &kernel);
    let uxx = separable_filter(&product(reference, reference), &kernel);
    let uyy = separable_filter(&product(aggregate, aggregate), &kernel);
    let uxy = separable_filter(&product(reference, aggregate), &kernel);

    // sample-covariance normalization over the n = win^2 window pixels
    let n = (config.win_size * config.win_size) as f32;
    let cov_norm = n / (n - 1.0);

    let c1 = (K1 * config.data_range) * (K1 * config.data_range);
    let c2 = (K2 * config.data_range) * (K2 * config.data_range);

    let mut map = ImageF::new(reference.width(), reference.height());
    for y in 0..reference.height() {
        let row_ux = ux.row(y);
        let row_uy = uy.row(y);
        let row_uxx = uxx.row(y);
        let row_uyy = uyy.row(y);
        let row_uxy = uxy.row(y);
        let row_out = map.row_mut(y);
        for x in 0..reference.width() {
            let mx = row_ux[x];
            let my = row_uy[x];
            let vx = cov_norm * (row_uxx[x] - mx * mx);
            let vy = cov_norm * (row_uyy[x] - my * my);
            let vxy = cov_norm * (row_uxy[x] - mx * my);

            row_out[x] = ((2.0 * mx * my + c1) * (2.0 * vxy + c2))
                / ((mx * mx + my * my + c1) * (vx + vy + c2));
        }
    }
    Ok(map)
}

fn product(a: &ImageF, b: &ImageF) -> ImageF {
    let data = a
        .data()
        .iter()
        .zip(b.data())
        .map(|(&x, &y)| x * y)
        .collect();
    ImageF::from_vec(data, a.width(), a.height())
}

/// Global and mask-restricted means of an SSIM map and its DSSIM
/// transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsimSummary {
    /// Mean SSIM over the whole map.
    pub ssim: f64,
    /// Mean SSIM over mask-true pixels (NaN if the mask is empty).
    pub ssim_masked: f64,
    /// Mean DSSIM over the whole map.
    pub dssim: f64,
    /// Mean DSSIM over mask-true pixels (NaN if the mask is empty).
    pub dssim_masked: f64,
}

impl SsimSummary {
    /// Reduces an SSIM map to its four scalar summaries.
    ///
    /// # Errors
    /// `ShapeMismatch` if the mask doesn't cover the map.
    pub fn compute(map: &ImageF, mask: &Mask) -> Result<Self, Error> {
        if !mask.covers(map) {
            return Err(Error::ShapeMismatch {
                w1: map.width(),
                h1: map.height(),
                w2: mask.width(),
                h2: mask.height(),
            });
        }

        let mut ssim_sum = 0.0f64;
        let mut dssim_sum = 0.0f64;
        let mut ssim_masked_sum = 0.0f64;
        let mut dssim_masked_sum = 0.0f64;
        let mut mask_size = 0u64;

        for (&s, &m) in map.data().iter().zip(mask.data()) {
            let s = f64::from(s);
            let d = (1.0 - s) / 2.0;
            ssim_sum += s;
            dssim_sum += d;
            if m {
                mask_size += 1;
                ssim_masked_sum += s;
                dssim_masked_sum += d;
            }
        }

        let total = map.data().len() as f64;
        let masked_mean = |sum: f64| {
            if mask_size == 0 {
                f64::NAN
            } else {
                sum / mask_size as f64
            }
        };

        Ok(Self {
            ssim: ssim_sum / total,
            ssim_masked: masked_mean(ssim_masked_sum),
            dssim: dssim_sum / total,
            dssim_masked: masked_mean(dssim_masked_sum),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> ImageF {
        let data = (0..width * height)
            .map(|i| ((i * 7) % 256) as f32)
            .collect();
        ImageF::from_vec(data, width, height)
    }

    fn full_mask(width: usize, height: usize) -> Mask {
        Mask::from_vec(vec![true; width * height], width, height)
    }

    #[test]
    fn identity_is_exactly_one() {
        let img = gradient(32, 24);
        for gaussian in [false, true] {
            let config = SsimConfig::new().with_gaussian_weights(gaussian);
            let map = ssim_map(&img, &img, &config).unwrap();
            assert!(map.data().iter().all(|&s| s == 1.0), "gaussian={gaussian}");

            let summary = SsimSummary::compute(&map, &full_mask(32, 24)).unwrap();
            assert_eq!(summary.ssim, 1.0);
            assert_eq!(summary.dssim, 0.0);
            assert_eq!(summary.ssim_masked, 1.0);
            assert_eq!(summary.dssim_masked, 0.0);
        }
    }

    #[test]
    fn different_images_score_below_one() {
        let a = gradient(32, 24);
        let mut b = a.clone();
        for y in 8..16 {
            for x in 8..24 {
                b.set(x, y, 255.0 - b.get(x, y));
            }
        }
        let map = ssim_map(&a, &b, &SsimConfig::default()).unwrap();
        let summary = SsimSummary::compute(&map, &full_mask(32, 24)).unwrap();
        assert!(summary.ssim < 1.0);
        assert!(summary.dssim > 0.0);
        // map values stay in the valid range
        assert!(map.data().iter().all(|&s| (-1.0..=1.0 + 1e-6).contains(&(s as f64))));
    }

    #[test]
    fn gaussian_and_uniform_windows_differ() {
        let a = gradient(32, 24);
        let mut b = a.clone();
        b.set(16, 12, 0.0);
        let uniform = ssim_map(&a, &b, &SsimConfig::default()).unwrap();
        let gaussian = ssim_map(&a, &b, &SsimConfig::new().with_gaussian_weights(true)).unwrap();
        assert_ne!(uniform, gaussian);
    }

    #[test]
    fn empty_mask_summaries_are_nan() {
        let img = gradient(16, 16);
        let map = ssim_map(&img, &img, &SsimConfig::default()).unwrap();
        let mask = Mask::from_vec(vec![false; 256], 16, 16);
        let summary = SsimSummary::compute(&map, &mask).unwrap();
        assert!(summary.ssim_masked.is_nan());
        assert!(summary.dssim_masked.is_nan());
        assert_eq!(summary.ssim, 1.0);
    }

    #[test]
    fn even_window_is_rejected() {
        let img = gradient(16, 16);
        let config = SsimConfig::new().with_win_size(8);
        assert!(matches!(
            ssim_map(&img, &img, &config),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let a = ImageF::new(16, 16);
        let b = ImageF::new(16, 17);
        assert!(matches!(
            ssim_map(&a, &b, &SsimConfig::default()),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
