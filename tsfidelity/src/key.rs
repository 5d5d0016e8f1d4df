//! Rendered-image key grammar and per-toolkit channel extraction.
//!
//! Rendered figures live under a directory named after the rendering
//! toolkit, as
//! `<toolkit>/<aggregator>_<dataset>_<n>_<n_out>_ls=<shape>_lw=<width>[_aa].png`.
//! The trailing `aa` antialiasing marker only appears for the matplotlib
//! family. Reference renders use aggregator `reference` and omit the
//! `n_out` token, since the reference is the full-resolution series.

use std::path::{Path, PathBuf};

use imgref::ImgRef;
use rgb::RGBA8;

use crate::image::ImageF;
use crate::Error;

/// Aggregator name reserved for full-resolution reference renders.
pub const REFERENCE_AGGREGATOR: &str = "reference";

/// Rendering toolkit that produced an image.
///
/// Backends encode ink in different channels and value conventions, so
/// each variant carries its own extraction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Toolkit {
    Plotly,
    Bokeh,
    Matplotlib,
    MatplotlibCairo,
}

impl Toolkit {
    /// Resolves a toolkit from its figure-directory name.
    #[must_use]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name {
            "plotly" => Some(Self::Plotly),
            "bokeh" => Some(Self::Bokeh),
            "matplotlib" => Some(Self::Matplotlib),
            "matplotlib_cairo" => Some(Self::MatplotlibCairo),
            _ => None,
        }
    }

    /// Figure-directory name of the toolkit.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Plotly => "plotly",
            Self::Bokeh => "bokeh",
            Self::Matplotlib => "matplotlib",
            Self::MatplotlibCairo => "matplotlib_cairo",
        }
    }

    /// Whether filenames of this toolkit carry the antialiasing marker.
    #[must_use]
    pub fn carries_aa_marker(self) -> bool {
        matches!(self, Self::Matplotlib | Self::MatplotlibCairo)
    }

    /// Extracts the ink channel of a decoded image as f32 values in the
    /// 0-255 range.
    ///
    /// Plotly and bokeh render dark lines on a white canvas: ink is the
    /// inverted green channel. The matplotlib family renders onto a
    /// transparent canvas: ink is the alpha channel as-is.
    #[must_use]
    pub fn ink_channel(self, image: ImgRef<'_, RGBA8>) -> ImageF {
        let data: Vec<f32> = match self {
            Self::Plotly | Self::Bokeh => image
                .pixels()
                .map(|px| 255.0 - f32::from(px.g))
                .collect(),
            Self::Matplotlib | Self::MatplotlibCairo => {
                image.pixels().map(|px| f32::from(px.a)).collect()
            }
        };
        ImageF::from_vec(data, image.width(), image.height())
    }
}

/// Decoded configuration of one rendered-image filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    /// Rendering toolkit (the parent directory).
    pub toolkit: Toolkit,
    /// Aggregator name (`m4`, `lttb`, ..., or `reference`).
    pub aggregator: String,
    /// Dataset name.
    pub dataset: String,
    /// Input series length.
    pub n: u64,
    /// Aggregation output size.
    pub n_out: u64,
    /// Line shape token (e.g. `linear`).
    pub line_shape: String,
    /// Line width token, kept verbatim (widths may be fractional).
    pub line_width: String,
    /// Whether the antialiasing marker was present.
    pub antialiased: bool,
}

impl ImageKey {
    /// Parses an aggregate-image path: the file name against the token
    /// grammar, the parent directory against the known toolkits.
    ///
    /// # Errors
    /// `MalformedKey` on any deviation from the grammar.
    pub fn parse(path: &Path) -> Result<Self, Error> {
        let malformed = || Error::MalformedKey {
            key: path.display().to_string(),
        };

        let toolkit = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .and_then(Toolkit::from_dir_name)
            .ok_or_else(malformed)?;

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(malformed)?;

        let tokens: Vec<&str> = stem.split('_').collect();
        let antialiased = match tokens.len() {
            6 => false,
            7 if toolkit.carries_aa_marker() && tokens[6] == "aa" => true,
            _ => return Err(malformed()),
        };

        let aggregator = tokens[0];
        let dataset = tokens[1];
        if aggregator.is_empty() || dataset.is_empty() {
            return Err(malformed());
        }

        let n: u64 = tokens[2].parse().map_err(|_| malformed())?;
        let n_out: u64 = tokens[3].parse().map_err(|_| malformed())?;

        let line_shape = tokens[4].strip_prefix("ls=").ok_or_else(malformed)?;
        let line_width = tokens[5].strip_prefix("lw=").ok_or_else(malformed)?;
        if line_shape.is_empty() || line_width.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            toolkit,
            aggregator: aggregator.to_string(),
            dataset: dataset.to_string(),
            n,
            n_out,
            line_shape: line_shape.to_string(),
            line_width: line_width.to_string(),
            antialiased,
        })
    }

    /// Derives the reference key for this aggregate at the given line
    /// width: same toolkit/dataset/n/n_out, aggregator `reference`.
    #[must_use]
    pub fn reference(&self, line_width: &str) -> Self {
        Self {
            aggregator: REFERENCE_AGGREGATOR.to_string(),
            line_width: line_width.to_string(),
            ..self.clone()
        }
    }

    /// Renders the key's file name. Reference keys omit the `n_out`
    /// token.
    #[must_use]
    pub fn file_name(&self) -> String {
        let n_out = if self.aggregator == REFERENCE_AGGREGATOR {
            String::new()
        } else {
            format!("_{}", self.n_out)
        };
        let aa = if self.antialiased { "_aa" } else { "" };
        format!(
            "{}_{}_{}{}_ls={}_lw={}{}.png",
            self.aggregator, self.dataset, self.n, n_out, self.line_shape, self.line_width, aa
        )
    }

    /// Renders the key's path relative to the figure root.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.toolkit.dir_name()).join(self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgref::Img;

    #[test]
    fn parse_plotly_key() {
        let key = ImageKey::parse(Path::new(
            "figs/plotly/m4_power_1000000_2000_ls=linear_lw=2.png",
        ))
        .unwrap();
        assert_eq!(key.toolkit, Toolkit::Plotly);
        assert_eq!(key.aggregator, "m4");
        assert_eq!(key.dataset, "power");
        assert_eq!(key.n, 1_000_000);
        assert_eq!(key.n_out, 2000);
        assert_eq!(key.line_shape, "linear");
        assert_eq!(key.line_width, "2");
        assert!(!key.antialiased);
    }

    #[test]
    fn parse_matplotlib_aa_key() {
        let key = ImageKey::parse(Path::new(
            "figs/matplotlib/lttb_btc_100000_400_ls=linear_lw=1_aa.png",
        ))
        .unwrap();
        assert_eq!(key.toolkit, Toolkit::Matplotlib);
        assert!(key.antialiased);
    }

    #[test]
    fn aa_marker_is_rejected_outside_the_matplotlib_family() {
        let result = ImageKey::parse(Path::new(
            "figs/plotly/m4_power_1000_400_ls=linear_lw=1_aa.png",
        ));
        assert!(matches!(result, Err(Error::MalformedKey { .. })));
    }

    #[test]
    fn wrong_token_count_is_malformed() {
        for name in ["foo.png", "m4_power_1000_400_ls=linear.png"] {
            let path = PathBuf::from("figs/plotly").join(name);
            assert!(
                matches!(ImageKey::parse(&path), Err(Error::MalformedKey { .. })),
                "{name}"
            );
        }
    }

    #[test]
    fn non_numeric_n_is_malformed() {
        let result = ImageKey::parse(Path::new(
            "figs/plotly/m4_power_big_400_ls=linear_lw=1.png",
        ));
        assert!(matches!(result, Err(Error::MalformedKey { .. })));
    }

    #[test]
    fn unknown_toolkit_is_malformed() {
        let result = ImageKey::parse(Path::new(
            "figs/gnuplot/m4_power_1000_400_ls=linear_lw=1.png",
        ));
        assert!(matches!(result, Err(Error::MalformedKey { .. })));
    }

    #[test]
    fn reference_path_omits_n_out() {
        let key = ImageKey::parse(Path::new(
            "figs/plotly/m4_power_1000000_2000_ls=linear_lw=2.png",
        ))
        .unwrap();
        let reference = key.reference("1");
        assert_eq!(
            reference.relative_path(),
            PathBuf::from("plotly/reference_power_1000000_ls=linear_lw=1.png")
        );
        let same_lw = key.reference(&key.line_width);
        assert_eq!(
            same_lw.relative_path(),
            PathBuf::from("plotly/reference_power_1000000_ls=linear_lw=2.png")
        );
    }

    #[test]
    fn aggregate_file_name_round_trips() {
        let path = Path::new("bokeh/minmax_ball_50000_1000_ls=linear_lw=3.png");
        let key = ImageKey::parse(path).unwrap();
        assert_eq!(key.relative_path(), path);
    }

    #[test]
    fn ink_channel_follows_the_toolkit() {
        // one pixel: dark green ink, opaque alpha
        let px = RGBA8::new(10, 55, 10, 200);
        let img = Img::new(vec![px], 1, 1);

        let plotly = Toolkit::Plotly.ink_channel(img.as_ref());
        assert_eq!(plotly.get(0, 0), 200.0); // 255 - 55

        let matplotlib = Toolkit::Matplotlib.ink_channel(img.as_ref());
        assert_eq!(matplotlib.get(0, 0), 200.0); // alpha as-is

        let white = Img::new(vec![RGBA8::new(255, 255, 255, 0)], 1, 1);
        assert_eq!(Toolkit::Bokeh.ink_channel(white.as_ref()).get(0, 0), 0.0);
        assert_eq!(
            Toolkit::MatplotlibCairo.ink_channel(white.as_ref()).get(0, 0),
            0.0
        );
    }
}
