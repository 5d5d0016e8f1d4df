//! Comparison orchestration: one rendered aggregate image against its
//! reference renders.
//!
//! For every aggregate image two references are consulted: the idealized
//! thin-line render at line width 1, and the render at the aggregate's
//! own line width. Each pairing gets an OR-convolution relevance mask,
//! SSIM/DSSIM summaries in both weighting modes, and (optionally) the
//! pixel-error block, all assembled into one [`MetricRow`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use imgref::{ImgRef, ImgVec};
use rgb::RGBA8;

use crate::image::{ImageF, Mask};
use crate::key::ImageKey;
use crate::mask::or_conv_mask;
use crate::pixel::{PixelErrorStats, ERROR_MARGINS};
use crate::ssim::{ssim_map, SsimConfig, SsimSummary};
use crate::Error;

/// Read-only mapping from image key to decoded reference image.
///
/// One snapshot is shared by every comparison of a batch run, so
/// implementations must be immutable from the caller's point of view;
/// interior read-through caching is fine (decode once per distinct path).
pub trait ReferenceImages {
    /// Returns the decoded image for `key`, or `None` if it is unknown.
    fn get(&self, key: &ImageKey) -> Option<Arc<ImgVec<RGBA8>>>;
}

/// In-memory reference mapping keyed by relative figure path.
#[derive(Default)]
pub struct InMemoryReferences {
    images: HashMap<PathBuf, Arc<ImgVec<RGBA8>>>,
}

impl InMemoryReferences {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a decoded image under its key.
    pub fn insert(&mut self, key: &ImageKey, image: ImgVec<RGBA8>) {
        self.images.insert(key.relative_path(), Arc::new(image));
    }

    /// Number of registered images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ReferenceImages for InMemoryReferences {
    fn get(&self, key: &ImageKey) -> Option<Arc<ImgVec<RGBA8>>> {
        self.images.get(&key.relative_path()).cloned()
    }
}

/// Comparison parameters.
///
/// One window size drives both the relevance mask and the SSIM windows.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareConfig {
    win_size: usize,
    sigma: f32,
    data_range: f32,
    pixel_metrics: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            win_size: crate::ssim::DEFAULT_WIN_SIZE,
            sigma: crate::ssim::DEFAULT_SIGMA,
            data_range: crate::ssim::DEFAULT_DATA_RANGE,
            pixel_metrics: true,
        }
    }
}

impl CompareConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mask and SSIM window size (odd).
    #[must_use]
    pub fn with_win_size(mut self, win_size: usize) -> Self {
        self.win_size = win_size;
        self
    }

    /// Sets the sigma of the Gaussian-weighted SSIM variant.
    #[must_use]
    pub fn with_sigma(mut self, sigma: f32) -> Self {
        self.sigma = sigma;
        self
    }

    /// Sets the dynamic range of the extracted ink channels.
    #[must_use]
    pub fn with_data_range(mut self, data_range: f32) -> Self {
        self.data_range = data_range;
        self
    }

    /// Enables or disables the MSE/MAE/pixel-error block.
    #[must_use]
    pub fn with_pixel_metrics(mut self, pixel_metrics: bool) -> Self {
        self.pixel_metrics = pixel_metrics;
        self
    }
}

/// One immutable result row: identifying fields plus named scalar
/// metrics in a stable order.
///
/// Masked means over an empty mask appear as `f64::NAN` ("no data").
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    /// Rendering toolkit directory name.
    pub toolkit: String,
    /// Aggregator name.
    pub aggregator: String,
    /// Dataset name.
    pub dataset: String,
    /// Input series length.
    pub n: u64,
    /// Aggregation output size.
    pub n_out: u64,
    /// Line shape token.
    pub line_shape: String,
    /// Line width token.
    pub line_width: String,
    /// Antialiasing marker.
    pub antialiased: bool,
    metrics: Vec<(String, f64)>,
}

impl MetricRow {
    fn from_key(key: &ImageKey) -> Self {
        Self {
            toolkit: key.toolkit.dir_name().to_string(),
            aggregator: key.aggregator.clone(),
            dataset: key.dataset.clone(),
            n: key.n,
            n_out: key.n_out,
            line_shape: key.line_shape.clone(),
            line_width: key.line_width.clone(),
            antialiased: key.antialiased,
            metrics: Vec::new(),
        }
    }

    fn push(&mut self, name: String, value: f64) {
        self.metrics.push((name, value));
    }

    /// The named metrics in computation order.
    #[must_use]
    pub fn metrics(&self) -> &[(String, f64)] {
        &self.metrics
    }

    /// Looks a metric up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }
}

/// Reference-render pairing a metric block was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefVariant {
    LineWidthOne,
    SameLineWidth,
}

impl RefVariant {
    fn suffix(self) -> &'static str {
        match self {
            Self::LineWidthOne => "ref_lw=1",
            Self::SameLineWidth => "same_lw",
        }
    }
}

/// Compares rendered aggregate images against a reference mapping.
pub struct Comparator<'a, R: ReferenceImages + ?Sized> {
    references: &'a R,
    config: CompareConfig,
}

impl<'a, R: ReferenceImages + ?Sized> Comparator<'a, R> {
    /// Creates a comparator with default configuration.
    pub fn new(references: &'a R) -> Self {
        Self::with_config(references, CompareConfig::default())
    }

    /// Creates a comparator with the given configuration.
    pub fn with_config(references: &'a R, config: CompareConfig) -> Self {
        Self { references, config }
    }

    /// Decodes the configuration of `path`, resolves both references,
    /// and assembles the metric row for the given decoded aggregate
    /// image.
    ///
    /// # Errors
    /// `MalformedKey`, `MissingReference`, `ShapeMismatch`, or
    /// `InvalidParameter` per the component contracts.
    pub fn compare(&self, path: &Path, aggregate: ImgRef<'_, RGBA8>) -> Result<MetricRow, Error> {
        let key = ImageKey::parse(path)?;
        self.compare_key(&key, aggregate)
    }

    /// Like [`Comparator::compare`] for an already-parsed key.
    ///
    /// # Errors
    /// See [`Comparator::compare`].
    pub fn compare_key(
        &self,
        key: &ImageKey,
        aggregate: ImgRef<'_, RGBA8>,
    ) -> Result<MetricRow, Error> {
        let toolkit = key.toolkit;
        let agg = toolkit.ink_channel(aggregate);

        let ref_lw1 = self.resolve(&key.reference("1"))?;
        let ref_same = self.resolve(&key.reference(&key.line_width))?;

        let pairings = [
            (RefVariant::LineWidthOne, &ref_lw1),
            (RefVariant::SameLineWidth, &ref_same),
        ];

        let mut masks: Vec<(RefVariant, &ImageF, Mask)> = Vec::with_capacity(2);
        for (variant, reference) in pairings {
            masks.push((variant, reference, or_conv_mask(&agg, reference, self.config.win_size)?));
        }

        let mut row = MetricRow::from_key(key);

        for (variant, reference, mask) in &masks {
            for gaussian in [false, true] {
                let ssim_config = SsimConfig::new()
                    .with_win_size(self.config.win_size)
                    .with_gaussian_weights(gaussian)
                    .with_sigma(self.config.sigma)
                    .with_data_range(self.config.data_range);
                let map = ssim_map(reference, &agg, &ssim_config)?;
                let summary = SsimSummary::compute(&map, mask)?;

                let infix = if gaussian { "_gaussian" } else { "" };
                let suffix = variant.suffix();
                row.push(format!("DSSIM{infix}_{suffix}"), summary.dssim);
                row.push(format!("DSSIM_masked{infix}_{suffix}"), summary.dssim_masked);
                row.push(format!("SSIM{infix}_{suffix}"), summary.ssim);
                row.push(format!("SSIM_masked{infix}_{suffix}"), summary.ssim_masked);
            }
        }

        if self.config.pixel_metrics {
            for (variant, reference, mask) in &masks {
                let stats = PixelErrorStats::compute(reference, &agg, mask)?;
                let suffix = variant.suffix();
                row.push(format!("MSE_{suffix}"), stats.mse);
                row.push(format!("MSE_masked_{suffix}"), stats.mse_masked);
                row.push(format!("MAE_{suffix}"), stats.mae);
                row.push(format!("MAE_masked_{suffix}"), stats.mae_masked);
                row.push(format!("conv_mask_size_{suffix}"), stats.mask_size as f64);
                row.push(format!("pixel_errors_{suffix}"), stats.pixel_errors as f64);
                for (count, margin) in stats.margin_counts.iter().zip(ERROR_MARGINS.iter()) {
                    row.push(
                        format!("pixel_errors_margin_{margin}_{suffix}"),
                        *count as f64,
                    );
                }
            }
        }

        Ok(row)
    }

    /// Fetches and channel-extracts one reference image. Missing
    /// references are always fatal (one strict policy; no permissive
    /// path).
    fn resolve(&self, key: &ImageKey) -> Result<ImageF, Error> {
        let image = self
            .references
            .get(key)
            .ok_or_else(|| Error::MissingReference {
                path: key.relative_path().display().to_string(),
            })?;
        Ok(key.toolkit.ink_channel((*image).as_ref()))
    }
}
