//! Integration tests for the tsfidelity CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn tsfidelity_bin() -> &'static str {
    env!("CARGO_BIN_EXE_tsfidelity")
}

/// Writes a white-canvas PNG with a dark horizontal line, the way the
/// plotly/bokeh backends render.
fn write_line_png(path: &Path, width: u32, height: u32, line_row: u32) {
    let mut img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
    for x in 0..width {
        img.put_pixel(x, line_row, image::Rgba([40, 40, 60, 255]));
    }
    img.save(path).expect("failed to write test png");
}

/// Builds a minimal figure tree under a fresh temp directory:
/// one aggregate figure plus its two references.
fn figure_tree(tag: &str, agg_row: u32, ref_row: u32) -> (PathBuf, PathBuf) {
    let root = std::env::temp_dir().join(format!("tsfidelity-cli-{}-{}", tag, std::process::id()));
    let toolkit_dir = root.join("plotly");
    fs::create_dir_all(&toolkit_dir).expect("failed to create temp figure tree");

    let agg = toolkit_dir.join("m4_power_10000_400_ls=linear_lw=2.png");
    write_line_png(&agg, 64, 48, agg_row);
    write_line_png(
        &toolkit_dir.join("reference_power_10000_ls=linear_lw=1.png"),
        64,
        48,
        ref_row,
    );
    write_line_png(
        &toolkit_dir.join("reference_power_10000_ls=linear_lw=2.png"),
        64,
        48,
        ref_row,
    );
    (root, agg)
}

#[test]
fn perfect_match_in_json_mode() {
    let (root, agg) = figure_tree("json", 24, 24);

    let output = Command::new(tsfidelity_bin())
        .arg("--json")
        .arg(&agg)
        .output()
        .expect("failed to run tsfidelity");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let rows: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("invalid JSON output");
    let row = &rows.as_array().expect("expected a JSON array")[0];
    assert_eq!(row["toolkit"], "plotly");
    assert_eq!(row["aggregator"], "m4");
    assert_eq!(row["dataset"], "power");
    assert_eq!(row["n"], 10000);
    assert_eq!(row["n_out"], 400);
    assert_eq!(row["metrics"]["SSIM_masked_same_lw"], 1.0);
    assert_eq!(row["metrics"]["DSSIM_masked_same_lw"], 0.0);
    assert_eq!(row["metrics"]["pixel_errors_same_lw"], 0.0);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn displaced_line_scores_worse_in_batch_csv_mode() {
    let (root, _) = figure_tree("csv", 30, 24);

    let output = Command::new(tsfidelity_bin())
        .arg("--format")
        .arg("csv")
        .arg(root.join("plotly"))
        .output()
        .expect("failed to run tsfidelity");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    let header = lines.next().expect("missing CSV header");
    let data = lines.next().expect("missing CSV data row");

    let columns: Vec<&str> = header.split(',').collect();
    let values: Vec<&str> = data.split(',').collect();
    assert_eq!(columns.len(), values.len());

    let dssim_idx = columns
        .iter()
        .position(|&c| c == "DSSIM_masked_same_lw")
        .expect("missing DSSIM column");
    let dssim: f64 = values[dssim_idx].parse().expect("non-numeric DSSIM");
    assert!(dssim > 0.0, "displaced line should have DSSIM > 0");

    // reference renders are the baseline, never compared themselves
    assert_eq!(lines.next(), None);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn malformed_key_fails_with_exit_code_2() {
    let root = std::env::temp_dir().join(format!("tsfidelity-cli-bad-{}", std::process::id()));
    let toolkit_dir = root.join("plotly");
    fs::create_dir_all(&toolkit_dir).expect("failed to create temp figure tree");
    let bad = toolkit_dir.join("foo.png");
    write_line_png(&bad, 16, 16, 8);

    let output = Command::new(tsfidelity_bin())
        .arg(&bad)
        .output()
        .expect("failed to run tsfidelity");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("malformed image key"), "stderr: {stderr}");

    let _ = fs::remove_dir_all(root);
}

#[test]
fn missing_reference_fails_with_exit_code_2() {
    let root = std::env::temp_dir().join(format!("tsfidelity-cli-noref-{}", std::process::id()));
    let toolkit_dir = root.join("plotly");
    fs::create_dir_all(&toolkit_dir).expect("failed to create temp figure tree");
    let agg = toolkit_dir.join("m4_power_10000_400_ls=linear_lw=2.png");
    write_line_png(&agg, 32, 32, 8);

    let output = Command::new(tsfidelity_bin())
        .arg(&agg)
        .output()
        .expect("failed to run tsfidelity");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing reference image"), "stderr: {stderr}");

    let _ = fs::remove_dir_all(root);
}
