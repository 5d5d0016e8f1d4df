//! tsfidelity CLI - visual-fidelity metrics for downsampled time-series plots.
//!
//! Compares rendered aggregate figures against their reference renders and
//! emits one metric row per figure.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{ColorChoice, Parser, ValueEnum};
use colored::Colorize;
use imgref::{Img, ImgVec};
use rgb::RGBA8;
use serde::Serialize;
use tsfidelity::{CompareConfig, Comparator, ImageKey, MetricRow, ReferenceImages};

/// Visual-fidelity metrics for downsampled time-series plots
///
/// Figures are expected under a root directory with one subdirectory per
/// rendering toolkit (plotly, bokeh, matplotlib, matplotlib_cairo), named
///
///   <aggregator>_<dataset>_<n>_<n_out>_ls=<shape>_lw=<width>[_aa].png
///
/// Each aggregate figure is compared against the toolkit's reference
/// renders at line width 1 and at its own line width.
#[derive(Parser, Debug)]
#[command(name = "tsfidelity")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    Compare one aggregate figure:
        tsfidelity figs/plotly/m4_power_1000000_2000_ls=linear_lw=2.png

    Batch-compare a whole toolkit directory:
        tsfidelity figs/plotly/

    Machine-readable output for the reporting layer:
        tsfidelity --json figs/plotly/
        tsfidelity --format csv figs/plotly/ > metrics.csv

    Perceptual metrics only (skip the MSE/MAE block):
        tsfidelity --no-pixel-metrics figs/bokeh/

EXIT CODES:
    0 - All comparisons succeeded
    2 - Error (malformed key, missing reference, unreadable image, ...)")]
struct Cli {
    /// Aggregate figure file(s), or one toolkit directory for batch mode
    #[arg(value_name = "FIGURE", required = true)]
    targets: Vec<PathBuf>,

    /// Root directory holding the per-toolkit figure folders
    ///
    /// Defaults to the grandparent of the first figure (the parent of its
    /// toolkit directory). Reference renders are resolved against it.
    #[arg(long, value_name = "DIR")]
    figure_root: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Output JSON (shorthand for --format json)
    #[arg(long, conflicts_with = "format")]
    json: bool,

    /// Skip the MSE/MAE/pixel-error block (perceptual metrics only)
    #[arg(long)]
    no_pixel_metrics: bool,

    /// Mask and SSIM window size (odd)
    #[arg(long, default_value = "11", value_name = "PIXELS")]
    win_size: usize,

    /// Continue past failing figures in batch mode
    #[arg(long)]
    keep_going: bool,

    /// Quiet mode - suppress progress and summary chatter
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Control color output
    #[arg(long, value_enum, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Table with the headline DSSIM columns
    Text,
    /// JSON array with every metric
    Json,
    /// CSV with every metric, one row per figure
    Csv,
}

/// Read-through disk cache for reference images.
///
/// Decodes each distinct reference once per run; the decoded snapshot is
/// shared read-only across all comparisons.
struct DiskReferenceStore {
    root: PathBuf,
    cache: Mutex<HashMap<PathBuf, Arc<ImgVec<RGBA8>>>>,
}

impl DiskReferenceStore {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl ReferenceImages for DiskReferenceStore {
    fn get(&self, key: &ImageKey) -> Option<Arc<ImgVec<RGBA8>>> {
        let relative = key.relative_path();
        let mut cache = self.cache.lock().ok()?;
        if let Some(image) = cache.get(&relative) {
            return Some(image.clone());
        }
        let image = Arc::new(load_rgba(&self.root.join(&relative)).ok()?);
        cache.insert(relative, image.clone());
        Some(image)
    }
}

fn load_rgba(path: &Path) -> Result<ImgVec<RGBA8>, String> {
    let decoded = image::open(path)
        .map_err(|e| format!("failed to load '{}': {}", path.display(), e))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixels: Vec<RGBA8> = rgba
        .pixels()
        .map(|p| RGBA8::new(p.0[0], p.0[1], p.0[2], p.0[3]))
        .collect();
    Ok(Img::new(pixels, width as usize, height as usize))
}

struct ComparisonOutcome {
    figure: PathBuf,
    result: Result<MetricRow, String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_colors(&cli);

    let figures = match collect_figures(&cli.targets) {
        Ok(figures) => figures,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            return ExitCode::from(2);
        }
    };
    if figures.is_empty() {
        eprintln!("{}: no aggregate figures found", "warning".yellow().bold());
        return ExitCode::from(2);
    }

    let root = match figure_root(&cli, &figures[0]) {
        Ok(root) => root,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            return ExitCode::from(2);
        }
    };

    let store = DiskReferenceStore::new(root);
    let config = CompareConfig::new()
        .with_win_size(cli.win_size)
        .with_pixel_metrics(!cli.no_pixel_metrics);
    let comparator = Comparator::with_config(&store, config);

    let mut outcomes: Vec<ComparisonOutcome> = Vec::with_capacity(figures.len());
    let mut had_errors = false;

    for figure in figures {
        let result = compare_figure(&comparator, &figure);
        if let Err(ref e) = result {
            had_errors = true;
            if !cli.keep_going {
                eprintln!("{}: {}: {}", "error".red().bold(), figure.display(), e);
                return ExitCode::from(2);
            }
        }
        outcomes.push(ComparisonOutcome { figure, result });
    }

    if let Err(e) = output_results(&cli, &outcomes) {
        eprintln!("{}: {}", "error".red().bold(), e);
        return ExitCode::from(2);
    }

    if had_errors {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

fn setup_colors(cli: &Cli) {
    match cli.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {
            if !io::stdout().is_terminal() {
                colored::control::set_override(false);
            }
        }
    }
}

/// Expands directory targets into their aggregate PNGs; reference renders
/// are skipped since they are the comparison baseline, not its subject.
fn collect_figures(targets: &[PathBuf]) -> Result<Vec<PathBuf>, String> {
    let mut figures = Vec::new();
    for target in targets {
        if target.is_dir() {
            let entries = std::fs::read_dir(target)
                .map_err(|e| format!("failed to read directory '{}': {}", target.display(), e))?;
            let mut batch: Vec<PathBuf> = Vec::new();
            for entry in entries {
                let entry =
                    entry.map_err(|e| format!("failed to read directory entry: {e}"))?;
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_lowercase)
                    .unwrap_or_default();
                if ext != "png" {
                    continue;
                }
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                if stem.starts_with("reference_") {
                    continue;
                }
                batch.push(path);
            }
            batch.sort();
            figures.extend(batch);
        } else {
            figures.push(target.clone());
        }
    }
    Ok(figures)
}

fn figure_root(cli: &Cli, first_figure: &Path) -> Result<PathBuf, String> {
    if let Some(root) = &cli.figure_root {
        return Ok(root.clone());
    }
    // <root>/<toolkit>/<figure>.png
    first_figure
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            format!(
                "cannot derive the figure root from '{}'; pass --figure-root",
                first_figure.display()
            )
        })
}

fn compare_figure<R: ReferenceImages>(
    comparator: &Comparator<'_, R>,
    figure: &Path,
) -> Result<MetricRow, String> {
    let aggregate = load_rgba(figure)?;
    comparator
        .compare(figure, aggregate.as_ref())
        .map_err(|e| e.to_string())
}

#[derive(Serialize)]
struct JsonRow<'a> {
    figure: String,
    toolkit: &'a str,
    aggregator: &'a str,
    dataset: &'a str,
    n: u64,
    n_out: u64,
    line_shape: &'a str,
    line_width: &'a str,
    antialiased: bool,
    /// NaN masked means serialize as null ("no data").
    metrics: BTreeMap<&'a str, Option<f64>>,
}

fn json_row<'a>(figure: &Path, row: &'a MetricRow) -> JsonRow<'a> {
    JsonRow {
        figure: figure.display().to_string(),
        toolkit: &row.toolkit,
        aggregator: &row.aggregator,
        dataset: &row.dataset,
        n: row.n,
        n_out: row.n_out,
        line_shape: &row.line_shape,
        line_width: &row.line_width,
        antialiased: row.antialiased,
        metrics: row
            .metrics()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str(),
                    if value.is_nan() { None } else { Some(*value) },
                )
            })
            .collect(),
    }
}

fn output_results(cli: &Cli, outcomes: &[ComparisonOutcome]) -> Result<(), String> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        cli.format
    };
    match format {
        OutputFormat::Json => output_json(outcomes),
        OutputFormat::Csv => output_csv(outcomes),
        OutputFormat::Text => {
            output_text(cli, outcomes);
            Ok(())
        }
    }
}

fn output_json(outcomes: &[ComparisonOutcome]) -> Result<(), String> {
    let rows: Vec<JsonRow<'_>> = outcomes
        .iter()
        .filter_map(|outcome| {
            outcome
                .result
                .as_ref()
                .ok()
                .map(|row| json_row(&outcome.figure, row))
        })
        .collect();
    let json =
        serde_json::to_string_pretty(&rows).map_err(|e| format!("failed to serialize JSON: {e}"))?;
    println!("{json}");
    Ok(())
}

fn output_csv(outcomes: &[ComparisonOutcome]) -> Result<(), String> {
    let mut rows = outcomes.iter().filter_map(|outcome| {
        outcome
            .result
            .as_ref()
            .ok()
            .map(|row| (&outcome.figure, row))
    });
    let Some((first_figure, first_row)) = rows.next() else {
        return Ok(());
    };

    let mut out = String::new();
    out.push_str("figure,toolkit,aggregator,dataset,n,n_out,ls,lw,aa");
    for (name, _) in first_row.metrics() {
        out.push(',');
        out.push_str(name);
    }
    out.push('\n');

    for (figure, row) in std::iter::once((first_figure, first_row)).chain(rows) {
        push_csv_row(&mut out, figure, row);
    }

    io::stdout()
        .write_all(out.as_bytes())
        .map_err(|e| format!("failed to write CSV: {e}"))
}

fn push_csv_row(out: &mut String, figure: &Path, row: &MetricRow) {
    use std::fmt::Write as _;
    let _ = write!(
        out,
        "{},{},{},{},{},{},{},{},{}",
        figure.display(),
        row.toolkit,
        row.aggregator,
        row.dataset,
        row.n,
        row.n_out,
        row.line_shape,
        row.line_width,
        row.antialiased
    );
    for (_, value) in row.metrics() {
        if value.is_nan() {
            out.push(','); // empty cell = "no data"
        } else {
            let _ = write!(out, ",{value}");
        }
    }
    out.push('\n');
}

fn output_text(cli: &Cli, outcomes: &[ComparisonOutcome]) {
    let name_width = outcomes
        .iter()
        .map(|o| {
            o.figure
                .file_name()
                .map(|n| n.len())
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(20);

    let mut ok = 0usize;
    let mut failed = 0usize;

    for outcome in outcomes {
        let name = outcome
            .figure
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("?");
        match &outcome.result {
            Ok(row) => {
                ok += 1;
                let dssim_same = row.get("DSSIM_masked_same_lw").unwrap_or(f64::NAN);
                let dssim_lw1 = row.get("DSSIM_masked_ref_lw=1").unwrap_or(f64::NAN);
                println!(
                    "{:name_width$}  DSSIM(masked) same_lw={:<10} lw=1={:<10}  {}",
                    name,
                    format_scalar(dssim_same),
                    format_scalar(dssim_lw1),
                    "ok".green().bold(),
                );
            }
            Err(e) => {
                failed += 1;
                println!(
                    "{:name_width$}  {}",
                    name,
                    format!("ERROR: {e}").red(),
                );
            }
        }
    }

    if !cli.quiet && outcomes.len() > 1 {
        println!();
        println!(
            "{} {} compared, {} failed",
            "Summary:".bold(),
            ok,
            if failed > 0 {
                failed.to_string().red().to_string()
            } else {
                failed.to_string()
            }
        );
    }
}

fn format_scalar(value: f64) -> String {
    if value.is_nan() {
        "-".to_string()
    } else {
        format!("{value:.6}")
    }
}
