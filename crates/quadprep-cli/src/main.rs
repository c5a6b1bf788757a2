// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// quadprep: quadrat photo preparation from the command line.
//
// Entry point. Initialises logging, parses the subcommand and reports
// failures as plain-English messages.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use image::DynamicImage;
use serde::Serialize;
use tracing::{error, info, warn};

use quadprep_core::config::AppConfig;
use quadprep_core::error::{QuadprepError, Result};
use quadprep_core::geometry::{Line, Point};
use quadprep_core::human_errors::humanize_error;
use quadprep_core::params::{CornerOrdering, DetectionParams};
use quadprep_core::types::{CameraParameters, Project};
use quadprep_export::{ExportEvent, spawn_export};
use quadprep_vision::{
    DetectionSource, QuadratDetectionResult, correct_perspective, detect_quadrat, load_image, save_image, undistort_photo,
};

#[derive(Parser)]
#[command(name = "quadprep")]
#[command(about = "Detect quadrat frames in survey photos and correct lens and perspective distortion")]
#[command(version)]
struct Cli {
    /// Directory holding `quadprep.json`.
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the quadrat corners in a photo and print them as JSON.
    Detect(DetectArgs),

    /// Remove lens distortion using a camera parameter file.
    Undistort {
        #[arg(long)]
        image: PathBuf,
        /// JSON file with `matrix` and `coefficients`.
        #[arg(long)]
        camera: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Warp the quad given by four corners onto a rectangle.
    Rectify(RectifyArgs),

    /// Export every photo of a project file.
    Export {
        #[arg(long)]
        project: PathBuf,
    },

    /// Write the default detection parameters as JSON.
    Params {
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderingArg {
    Angular,
    AxisSum,
}

impl From<OrderingArg> for CornerOrdering {
    fn from(arg: OrderingArg) -> Self {
        match arg {
            OrderingArg::Angular => CornerOrdering::Angular,
            OrderingArg::AxisSum => CornerOrdering::AxisSum,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    #[arg(long)]
    image: PathBuf,

    /// Parameter preset (JSON). Defaults to the parameters in `quadprep.json`.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Enable the Hough line path on top of the preset.
    #[arg(long)]
    hough: bool,

    /// Override the corner ordering.
    #[arg(long, value_enum)]
    ordering: Option<OrderingArg>,

    /// Write the debug overlay (lines, intersections, quad) here.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Write the working image the detectors ran on here.
    #[arg(long)]
    processed: Option<PathBuf>,

    /// Undistort with this camera parameter file before detecting, so the
    /// corners match what `rectify` and `export` warp.
    #[arg(long)]
    camera: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct RectifyArgs {
    #[arg(long)]
    image: PathBuf,

    /// Corner as `x,y` in image pixels, given four times in
    /// top-left, top-right, bottom-right, bottom-left order.
    #[arg(long = "corner", value_parser = parse_point, num_args = 1, required = true)]
    corners: Vec<Point>,

    /// Output width; defaults to the export settings in `quadprep.json`.
    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Undistort with this camera parameter file first.
    #[arg(long)]
    camera: Option<PathBuf>,

    #[arg(long)]
    out: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config_dir);

    let outcome = match cli.command {
        Commands::Detect(args) => run_detect(&args, &config),
        Commands::Undistort { image, camera, out } => run_undistort(&image, &camera, &out, &config),
        Commands::Rectify(args) => run_rectify(&args, &config),
        Commands::Export { project } => run_export(&project),
        Commands::Params { out } => run_params(out.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "quadprep failed");
            let human = humanize_error(&err);
            eprintln!("{}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}

// -- detect -------------------------------------------------------------------

#[derive(Serialize)]
struct DetectionSummary {
    corners: Option<[Point; 4]>,
    source: Option<DetectionSource>,
    scale: f64,
    lines: Vec<Line>,
    intersections: usize,
}

fn run_detect(args: &DetectArgs, config: &AppConfig) -> Result<()> {
    let result = detect_photo(args, config)?;
    if result.corners.is_none() {
        warn!("No quadrat found; place the corners manually or adjust the parameters");
    }

    if let Some(path) = &args.overlay {
        save_image(&DynamicImage::ImageRgb8(result.overlay.clone()), path, config.export.jpeg_quality)?;
    }
    if let Some(path) = &args.processed {
        save_image(&result.processed, path, config.export.jpeg_quality)?;
    }

    let summary = DetectionSummary {
        corners: result.corners,
        source: result.source,
        scale: result.scale,
        lines: result.lines,
        intersections: result.intersections.len(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Load, optionally undistort, and detect.
fn detect_photo(args: &DetectArgs, config: &AppConfig) -> Result<QuadratDetectionResult> {
    let mut params = match &args.params {
        Some(path) => DetectionParams::load(path)?,
        None => config.detection,
    };
    if args.hough {
        params.hough.enabled = true;
    }
    if let Some(ordering) = args.ordering {
        params.ordering = ordering.into();
    }

    let camera = args.camera.as_deref().map(load_camera).transpose()?;
    let image = load_image(&args.image)?;
    let corrected = undistort_photo(&image, camera.as_ref())?;
    detect_quadrat(&corrected, &params)
}

// -- undistort / rectify ------------------------------------------------------

fn load_camera(path: &Path) -> Result<CameraParameters> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn run_undistort(image: &Path, camera: &Path, out: &Path, config: &AppConfig) -> Result<()> {
    let camera = load_camera(camera)?;
    let image = load_image(image)?;
    let corrected = undistort_photo(&image, Some(&camera))?;
    save_image(&corrected, out, config.export.jpeg_quality)?;
    info!(out = %out.display(), "Undistorted image written");
    Ok(())
}

fn run_rectify(args: &RectifyArgs, config: &AppConfig) -> Result<()> {
    let corners: [Point; 4] = args.corners.as_slice().try_into().map_err(|_| {
        QuadprepError::InvalidCorners(format!("expected 4 corners, got {}", args.corners.len()))
    })?;
    let width = args.width.unwrap_or(config.export.target_width);
    let height = args.height.unwrap_or(config.export.target_height);

    let camera = args.camera.as_deref().map(load_camera).transpose()?;
    let image = load_image(&args.image)?;
    let corrected = undistort_photo(&image, camera.as_ref())?;
    let rectified = correct_perspective(&corrected, &corners, width, height)?;
    save_image(&rectified, &args.out, config.export.jpeg_quality)?;
    info!(out = %args.out.display(), width, height, "Rectified image written");
    Ok(())
}

// -- export -------------------------------------------------------------------

fn run_export(project_path: &Path) -> Result<()> {
    let project = Project::load(project_path)?;
    let base_dir = project_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async move {
        let mut handle = spawn_export(project, base_dir);
        loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    Some(ExportEvent::PhotoExported { index, total, output }) => {
                        info!(photo = index + 1, total, output = %output.display(), "Exported");
                    }
                    Some(ExportEvent::PhotoFailed { index, total, error }) => {
                        warn!(photo = index + 1, total, %error, "Photo skipped");
                    }
                    Some(_) => {}
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupt received; stopping after the current photo");
                    handle.cancel();
                }
            }
        }
        handle.join().await
    })?;

    if !report.is_complete() {
        warn!(failed = report.failed.len(), "Some photos were not exported");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// -- params -------------------------------------------------------------------

fn run_params(out: Option<&Path>) -> Result<()> {
    let params = DetectionParams::default();
    match out {
        Some(path) => {
            params.save(path)?;
            info!(path = %path.display(), "Default parameters written");
        }
        None => println!("{}", serde_json::to_string_pretty(&params)?),
    }
    Ok(())
}

/// Parse `x,y` into a point.
fn parse_point(s: &str) -> std::result::Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{s}`"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x in `{s}`: {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y in `{s}`: {e}"))?;
    Ok(Point::new(x, y))
}
