//! WSI Viewer - renders scripted views of Whole Slide Images.
//!
//! This binary drives the rendering core headlessly: it opens a slide, runs
//! frames until every visible tile is loaded, and writes the result to disk.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_viewer::{
    config::{Cli, Command, InfoConfig, RenderConfig, SlideArgs},
    AnimationMode, Canvas, FrameStats, ImagePyramid, LevelInfo, RendererStats, SlideError,
    SlideRenderer, SlideSource, SyntheticSlide, Vec2, Viewport,
};

/// Longest wait for a tile between two frames.
const FRAME_WAIT: Duration = Duration::from_millis(100);

/// Colour behind tiles that are not loaded yet.
const BACKGROUND: [u8; 4] = [24, 24, 24, 255];

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Render(config) => run_render(config),
        Command::Info(config) => run_info(config),
    }
}

// =============================================================================
// Render Command
// =============================================================================

#[derive(Serialize)]
struct RenderReport {
    output: PathBuf,
    frames: usize,
    elapsed_ms: u128,
    zoom: f64,
    last_frame: FrameStats,
    renderer: RendererStats,
}

fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let slide = match open_slide(&config.slide, config.tile_size) {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open slide: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some((slide_width, slide_height)) = slide.dimensions() else {
        error!("Slide has no levels");
        return ExitCode::FAILURE;
    };

    info!("Configuration:");
    info!("  Slide: {}x{}, {} levels", slide_width, slide_height, slide.level_count());
    info!("  Window: {}x{}", config.width, config.height);
    info!(
        "  Loader: {} workers, {}px tiles, {}MB cache",
        config.workers, config.tile_size, config.cache_mb
    );

    let mut renderer = match SlideRenderer::new(
        slide,
        Canvas::new(config.width, config.height),
        config.renderer_config(),
    ) {
        Ok(renderer) => renderer,
        Err(e) => {
            error!("Failed to create renderer: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = renderer.initialize() {
        error!("Failed to start tile loader: {}", e);
        return ExitCode::FAILURE;
    }

    // Scripted navigation: fit, zoom at the centre, then pan
    let mut viewport = Viewport::new(config.width, config.height, slide_width, slide_height);
    viewport.reset_view(AnimationMode::Instant);
    let centre = Vec2::new(
        f64::from(config.width) / 2.0,
        f64::from(config.height) / 2.0,
    );
    viewport.zoom_at_point(centre, config.zoom, AnimationMode::Instant);
    if let Some((dx, dy)) = config.pan {
        viewport.pan(Vec2::new(dx, dy), AnimationMode::Instant);
    }

    let started = Instant::now();
    let mut frames = 0;
    let mut last_frame = FrameStats::default();

    while frames < config.max_frames {
        renderer.presenter_mut().clear(BACKGROUND);
        last_frame = renderer.render(&viewport);
        frames += 1;

        if !renderer.has_pending_tiles() {
            break;
        }
        renderer.wait_ready(FRAME_WAIT);
    }

    if !last_frame.is_complete() {
        warn!(
            missing = last_frame.missing,
            fallbacks = last_frame.fallbacks,
            "Final frame is incomplete"
        );
    }

    if let Err(e) = renderer.presenter().save(&config.output) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    let report = RenderReport {
        output: config.output.clone(),
        frames,
        elapsed_ms: started.elapsed().as_millis(),
        zoom: viewport.zoom(),
        last_frame,
        renderer: renderer.stats(),
    };
    renderer.shutdown();

    if config.json {
        return print_json(&report);
    }

    println!("Wrote {}", report.output.display());
    println!(
        "  {} frames in {} ms at zoom {:.4} (level {})",
        report.frames, report.elapsed_ms, report.zoom, report.last_frame.level
    );
    println!(
        "  Last frame: {} tiles, {} hits, {} fallbacks, {} missing",
        report.last_frame.visible_tiles,
        report.last_frame.cache_hits,
        report.last_frame.fallbacks,
        report.last_frame.missing
    );
    println!(
        "  Cache: {} tiles, {:.1} MB, hit rate {:.1}%",
        report.renderer.cache.tile_count,
        report.renderer.cache.memory_usage as f64 / (1024.0 * 1024.0),
        report.renderer.cache.hit_rate * 100.0
    );

    ExitCode::SUCCESS
}

// =============================================================================
// Info Command
// =============================================================================

#[derive(Serialize)]
struct LevelReport {
    level: usize,
    #[serde(flatten)]
    info: LevelInfo,
    tiles_x: u64,
    tiles_y: u64,
}

fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let slide = match open_slide(&config.slide, config.tile_size) {
        Ok(slide) => slide,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let levels: Vec<LevelReport> = (0..slide.level_count())
        .filter_map(|level| {
            let info = slide.level_info(level)?;
            let (tiles_x, tiles_y) = info.tile_count(config.tile_size);
            Some(LevelReport {
                level,
                info,
                tiles_x,
                tiles_y,
            })
        })
        .collect();

    if config.json {
        return print_json(&levels);
    }

    println!("Level  Width       Height      Downsample  Tiles");
    println!("─────  ──────────  ──────────  ──────────  ───────────");
    for level in &levels {
        println!(
            "{:>5}  {:>10}  {:>10}  {:>10.3}  {}x{}",
            level.level,
            level.info.width,
            level.info.height,
            level.info.downsample,
            level.tiles_x,
            level.tiles_y
        );
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Helpers
// =============================================================================

fn open_slide(args: &SlideArgs, tile_size: u32) -> Result<Arc<dyn SlideSource>, SlideError> {
    if let Some((width, height)) = args.synthetic_size() {
        if width == 0 || height == 0 {
            return Err(SlideError::InvalidDimensions { width, height });
        }
        info!("Using synthetic {}x{} slide", width, height);
        return Ok(Arc::new(SyntheticSlide::new(width, height)));
    }

    match &args.path {
        Some(path) => {
            info!("Opening {}", path.display());
            Ok(Arc::new(ImagePyramid::open(path, tile_size)?))
        }
        None => Err(SlideError::Image("no slide given".to_string())),
    }
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the logging subscriber. Logs go to stderr so stdout stays
/// machine-readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_viewer=debug"
    } else {
        "wsi_viewer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
