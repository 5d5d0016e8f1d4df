//! # tsfidelity
//!
//! Quantifies how faithfully a reduced-point rendering of a time series
//! reproduces the visual appearance of its full-resolution rendering.
//!
//! Two engines do the real work:
//!
//! - **M4 aggregation** ([`m4_aggregate`], [`M4`]): reduces N points to at
//!   most `n_out` representative points by keeping the first, minimum,
//!   maximum, and last point of every bin. With `n_out` at roughly 4x the
//!   canvas pixel width this retains every visible peak and trough.
//! - **Image-difference metrics** ([`Comparator`]): compares a rendered
//!   aggregate image against its reference renders using masked structural
//!   similarity ([`ssim`]) and pixel-error statistics ([`pixel`]), restricted
//!   to visually relevant regions by an OR-convolution mask ([`or_conv_mask`]).
//!
//! Rendering itself is out of scope: images enter as decoded
//! [`ImgRef<RGBA8>`] pixel arrays and leave as a [`MetricRow`] of named
//! scalars for an external reporting layer.
//!
//! ## Example
//!
//! ```rust
//! use tsfidelity::{m4_aggregate, Point};
//!
//! let points: Vec<Point> = (0..1000)
//!     .map(|i| Point::new(f64::from(i), f64::from(i).sin()))
//!     .collect();
//!
//! let reduced = m4_aggregate(&points, 40).unwrap();
//!
//! assert!(reduced.len() <= 40);
//! assert_eq!(reduced.first(), points.first());
//! assert_eq!(reduced.last(), points.last());
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

pub mod aggregate;
pub mod compare;
pub(crate) mod filter;
pub mod image;
pub mod key;
pub mod mask;
pub mod pixel;
pub mod ssim;

pub use aggregate::{
    bin_boundaries, m4_aggregate, GapInterleaver, M4Builder, NanPosition, Point, M4,
};
pub use compare::{
    CompareConfig, Comparator, InMemoryReferences, MetricRow, ReferenceImages,
};
pub use image::{ImageF, Mask};
pub use key::{ImageKey, Toolkit};
pub use mask::or_conv_mask;
pub use pixel::PixelErrorStats;
pub use ssim::{ssim_map, SsimConfig, SsimSummary};

// Re-export imgref and rgb types for convenience
pub use imgref::{Img, ImgRef, ImgVec};
pub use rgb::{RGBA, RGBA8};

/// Error type for tsfidelity operations.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A parameter is outside its contract (e.g. `n_out` not a positive
    /// multiple of 4, an even mask window, or an unsupported aggregation
    /// configuration).
    InvalidParameter {
        /// Description of the offending parameter.
        what: String,
    },
    /// Zero-length input series passed to the aggregator.
    EmptySeries,
    /// An image key does not match the
    /// `<aggregator>_<dataset>_<n>_<n_out>_ls=<shape>_lw=<width>[_aa]`
    /// grammar under a known toolkit directory.
    MalformedKey {
        /// The offending key.
        key: String,
    },
    /// A required reference image is absent from the supplied mapping.
    MissingReference {
        /// Relative path of the missing reference.
        path: String,
    },
    /// Compared images differ in pixel dimensions.
    ShapeMismatch {
        /// First image width.
        w1: usize,
        /// First image height.
        h1: usize,
        /// Second image width.
        w2: usize,
        /// Second image height.
        h2: usize,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidParameter { what } => {
                write!(f, "invalid parameter: {what}")
            }
            Self::EmptySeries => write!(f, "cannot aggregate an empty series"),
            Self::MalformedKey { key } => {
                write!(f, "malformed image key: {key:?}")
            }
            Self::MissingReference { path } => {
                write!(f, "missing reference image: {path}")
            }
            Self::ShapeMismatch { w1, h1, w2, h2 } => {
                write!(f, "image dimensions don't match: {w1}x{h1} vs {w2}x{h2}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = Error::ShapeMismatch {
            w1: 800,
            h1: 400,
            w2: 800,
            h2: 399,
        };
        assert_eq!(e.to_string(), "image dimensions don't match: 800x400 vs 800x399");

        let e = Error::MalformedKey { key: "foo".into() };
        assert!(e.to_string().contains("\"foo\""));
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<Error>();
    }
}
