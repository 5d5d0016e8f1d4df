//! M4 extrema-selection downsampling.
//!
//! M4 reduces a series to at most `n_out` points by splitting the index
//! range into `n_out / 4` evenly spaced bins and keeping four points per
//! bin: the first, the minimum, the maximum, and the last. When `n_out` is
//! about 4x the target canvas pixel width, the reduced series renders
//! pixel-identical peaks and troughs.

use std::sync::Arc;

use crate::Error;

/// A single (index, value) sample of a time series.
///
/// The index must be strictly increasing across a series. Time-based
/// indices are converted through an integer epoch representation with
/// [`Point::from_timestamp`]; already-numeric indices pass through as-is.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Point {
    pub(crate) x: f64,
    pub(crate) y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Builds a point from an integer epoch timestamp (e.g. nanoseconds).
    pub fn from_timestamp(timestamp: i64, y: f64) -> Self {
        Self {
            x: timestamp as f64,
            y,
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }
}

/// Where gap-marker values are placed when gaps are detected.
///
/// Consumed by an external [`GapInterleaver`]; the detection algorithm
/// itself is not part of this crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum NanPosition {
    /// Replace the last point before a gap.
    Begin,
    /// Replace the first point after a gap.
    #[default]
    End,
    /// Replace both points around a gap.
    Both,
}

/// External gap/missing-value interleaving capability.
///
/// Applied strictly after extrema selection; bin selection never sees it.
pub trait GapInterleaver {
    /// Interleaves gap markers into an aggregated series.
    fn interleave(&self, points: Vec<Point>, nan_position: NanPosition) -> Vec<Point>;
}

/// Builder for a configured [`M4`] aggregator.
#[derive(Clone, Default)]
pub struct M4Builder {
    m4: M4,
}

impl M4Builder {
    /// Creates a new builder with default configuration (`n_out = 1000`,
    /// no gap interleaving).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output size. Must be a positive multiple of 4.
    pub fn n_out(mut self, n_out: usize) -> Self {
        self.m4.n_out = n_out;
        self
    }

    /// Sets whether gap markers are interleaved after selection.
    pub fn interleave_gaps(mut self, interleave_gaps: bool) -> Self {
        self.m4.interleave_gaps = interleave_gaps;
        self
    }

    /// Sets where gap markers are placed (only used when gap interleaving
    /// is enabled).
    pub fn nan_position(mut self, nan_position: NanPosition) -> Self {
        self.m4.nan_position = nan_position;
        self
    }

    /// Installs the external gap-interleaving capability.
    pub fn interleaver(mut self, interleaver: Arc<dyn GapInterleaver>) -> Self {
        self.m4.interleaver = Some(interleaver);
        self
    }

    /// Builds the aggregator.
    pub fn build(self) -> M4 {
        self.m4
    }
}

/// Configured M4 aggregator.
#[derive(Clone)]
pub struct M4 {
    n_out: usize,
    interleave_gaps: bool,
    nan_position: NanPosition,
    interleaver: Option<Arc<dyn GapInterleaver>>,
}

impl Default for M4 {
    fn default() -> Self {
        Self {
            n_out: 1000,
            interleave_gaps: false,
            nan_position: NanPosition::default(),
            interleaver: None,
        }
    }
}

impl std::fmt::Debug for M4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("M4")
            .field("n_out", &self.n_out)
            .field("interleave_gaps", &self.interleave_gaps)
            .field("nan_position", &self.nan_position)
            .field("interleaver", &self.interleaver.is_some())
            .finish()
    }
}

impl M4 {
    /// Aggregates `points` down to at most `n_out` points, then applies the
    /// configured gap-interleaving stage.
    ///
    /// # Errors
    /// `InvalidParameter` if `n_out` is not a positive multiple of 4, or if
    /// gap interleaving is requested without an installed interleaver;
    /// `EmptySeries` on empty input.
    pub fn aggregate(&self, points: &[Point]) -> Result<Vec<Point>, Error> {
        let selected = m4_aggregate(points, self.n_out)?;
        if !self.interleave_gaps {
            return Ok(selected);
        }
        let interleaver = self.interleaver.as_ref().ok_or_else(|| Error::InvalidParameter {
            what: "interleave_gaps requires an installed gap interleaver".into(),
        })?;
        Ok(interleaver.interleave(selected, self.nan_position))
    }
}

/// Computes ordered, deduplicated bin boundaries over the series index.
///
/// `n_out / 4 + 1` evenly spaced positions between the first and last index
/// value are each mapped to the leftmost insertion point that preserves
/// sort order; the final boundary is forced to the series length and
/// duplicate boundaries are removed in order. Sparse index regions collapse
/// their empty bins here, so fewer than `n_out / 4` bins may come back.
///
/// The returned boundaries are strictly increasing and the implied
/// half-open bins cover `[0, len)` without gaps or overlap.
pub fn bin_boundaries(points: &[Point], n_out: usize) -> Vec<usize> {
    debug_assert!(!points.is_empty());
    debug_assert!(n_out >= 4 && n_out % 4 == 0);

    let n_bins = n_out / 4;
    let first = points[0].x;
    let last = points[points.len() - 1].x;

    let mut bounds = Vec::with_capacity(n_bins + 1);
    for i in 0..=n_bins {
        let position = first + (last - first) * (i as f64 / n_bins as f64);
        bounds.push(points.partition_point(|p| p.x < position));
    }
    if let Some(end) = bounds.last_mut() {
        *end = points.len();
    }
    bounds.dedup();
    bounds
}

/// Reduces `points` to at most `n_out` points with the M4 scheme.
///
/// Per non-empty bin the first position, the position of the minimum value,
/// the position of the maximum value (first occurrence on ties for both),
/// and the last position are kept. Selected positions are sorted stably by
/// their index value and returned as value copies; positions that repeat in
/// bins smaller than 4 are retained, not deduplicated.
///
/// The result always contains the global first and last points.
///
/// # Errors
/// `InvalidParameter` if `n_out` is not a positive multiple of 4;
/// `EmptySeries` on empty input.
pub fn m4_aggregate(points: &[Point], n_out: usize) -> Result<Vec<Point>, Error> {
    if n_out == 0 || n_out % 4 != 0 {
        return Err(Error::InvalidParameter {
            what: format!("n_out must be a positive multiple of 4, got {n_out}"),
        });
    }
    if points.is_empty() {
        return Err(Error::EmptySeries);
    }

    let bounds = bin_boundaries(points, n_out);

    let mut selected: Vec<usize> = Vec::with_capacity(n_out);
    for bin in bounds.windows(2) {
        let (lower, upper) = (bin[0], bin[1]);
        let mut min_i = lower;
        let mut max_i = lower;
        for i in lower + 1..upper {
            if points[i].y < points[min_i].y {
                min_i = i;
            }
            if points[i].y > points[max_i].y {
                max_i = i;
            }
        }
        selected.push(lower);
        selected.push(min_i);
        selected.push(max_i);
        selected.push(upper - 1);
    }

    // stable, so positions sharing an index label keep selection order
    selected.sort_by(|&a, &b| points[a].x.total_cmp(&points[b].x));

    Ok(selected.into_iter().map(|i| points[i]).collect())
}
