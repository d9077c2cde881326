//! Command-line configuration for the `wsi-viewer` binary.
//!
//! Options can be given as flags or as environment variables with the `WSI_`
//! prefix:
//!
//! - `WSI_SLIDE` - Slide image file (default: synthetic slide)
//! - `WSI_CACHE_MB` - Tile cache budget in megabytes (default: 512)
//! - `WSI_WORKERS` - Decode worker threads (default: 4)
//! - `WSI_TILE_SIZE` - Tile edge length in pixels (default: 512)
//! - `WSI_WINDOW_WIDTH` / `WSI_WINDOW_HEIGHT` - Output size (default: 1280x800)
//! - `WSI_PREFETCH` - Prefetch ring width in tiles (default: 1)
//!
//! # Example
//!
//! ```
//! use clap::Parser;
//! use wsi_viewer::config::{Cli, Command};
//!
//! let cli = Cli::parse_from(["wsi-viewer", "render", "--synthetic", "20000x10000", "--zoom", "8"]);
//! let Command::Render(config) = cli.into_command() else {
//!     panic!("expected render");
//! };
//! assert_eq!(config.slide.synthetic, Some((20_000, 10_000)));
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::render::{RendererConfig, DEFAULT_PREFETCH_MARGIN};
use crate::tile::{DEFAULT_TILE_SIZE, DEFAULT_WORKER_THREADS};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile cache budget in megabytes.
pub const DEFAULT_CACHE_MEMORY_MB: usize = 512;

/// Default output window width.
pub const DEFAULT_WINDOW_WIDTH: u32 = 1280;

/// Default output window height.
pub const DEFAULT_WINDOW_HEIGHT: u32 = 800;

/// Default upper bound on rendered frames.
pub const DEFAULT_MAX_FRAMES: usize = 200;

/// Default size of the synthetic slide when no file is given.
pub const DEFAULT_SYNTHETIC_SIZE: (u64, u64) = (100_000, 60_000);

/// Accepted tile edge lengths.
pub const TILE_SIZE_RANGE: std::ops::RangeInclusive<u32> = 64..=4096;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Viewer - tiled rendering of gigapixel whole-slide images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-viewer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Render a scripted view of a slide to an image file.
    Render(RenderConfig),

    /// Print the pyramid level table of a slide.
    Info(InfoConfig),
}

/// Which slide to open.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SlideArgs {
    /// Slide image file (any raster format the `image` crate reads).
    #[arg(env = "WSI_SLIDE", conflicts_with = "synthetic")]
    pub path: Option<PathBuf>,

    /// Use a procedural checkerboard slide of the given size, e.g. 100000x60000.
    #[arg(long, value_name = "WxH", value_parser = parse_dimensions)]
    pub synthetic: Option<(u64, u64)>,
}

/// Options for `wsi-viewer render`.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub slide: SlideArgs,

    // =========================================================================
    // Output
    // =========================================================================
    /// File the final frame is written to.
    #[arg(short, long, default_value = "frame.png")]
    pub output: PathBuf,

    /// Output width in pixels.
    #[arg(long, default_value_t = DEFAULT_WINDOW_WIDTH, env = "WSI_WINDOW_WIDTH")]
    pub width: u32,

    /// Output height in pixels.
    #[arg(long, default_value_t = DEFAULT_WINDOW_HEIGHT, env = "WSI_WINDOW_HEIGHT")]
    pub height: u32,

    // =========================================================================
    // Navigation
    // =========================================================================
    /// Zoom factor applied at the window centre after fitting the slide.
    #[arg(long, default_value_t = 1.0)]
    pub zoom: f64,

    /// Pan by this many slide pixels after zooming, as DX,DY.
    #[arg(long, value_name = "DX,DY", value_parser = parse_offset, allow_hyphen_values = true)]
    pub pan: Option<(f64, f64)>,

    /// Stop after this many frames even if tiles are still loading.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAMES)]
    pub max_frames: usize,

    // =========================================================================
    // Loader and Cache
    // =========================================================================
    /// Tile cache budget in megabytes.
    #[arg(long, default_value_t = DEFAULT_CACHE_MEMORY_MB, env = "WSI_CACHE_MB")]
    pub cache_mb: usize,

    /// Number of decode worker threads.
    #[arg(long, default_value_t = DEFAULT_WORKER_THREADS, env = "WSI_WORKERS")]
    pub workers: usize,

    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILE_SIZE")]
    pub tile_size: u32,

    /// Rings of tiles to prefetch around the visible area (0 disables).
    #[arg(long, default_value_t = DEFAULT_PREFETCH_MARGIN, env = "WSI_PREFETCH")]
    pub prefetch: u32,

    /// Only search this many coarser levels for fallback tiles.
    #[arg(long)]
    pub fallback_depth: Option<usize>,

    // =========================================================================
    // Reporting
    // =========================================================================
    /// Print the final statistics as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.slide.validate()?;

        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }

        if !(self.zoom > 0.0 && self.zoom.is_finite()) {
            return Err("zoom must be a positive number".to_string());
        }

        if self.max_frames == 0 {
            return Err("max_frames must be greater than 0".to_string());
        }

        if self.cache_mb == 0 {
            return Err("cache_mb must be greater than 0".to_string());
        }

        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }

        if !TILE_SIZE_RANGE.contains(&self.tile_size) {
            return Err(format!(
                "tile_size must be between {} and {}",
                TILE_SIZE_RANGE.start(),
                TILE_SIZE_RANGE.end()
            ));
        }

        Ok(())
    }

    /// Cache budget in bytes.
    pub fn cache_bytes(&self) -> usize {
        self.cache_mb.saturating_mul(1024 * 1024)
    }

    /// Renderer settings derived from the command line.
    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig::default()
            .with_cache_memory(self.cache_bytes())
            .with_workers(self.workers)
            .with_tile_size(self.tile_size)
            .with_prefetch_margin(self.prefetch)
            .with_max_fallback_depth(self.fallback_depth)
    }
}

/// Options for `wsi-viewer info`.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    #[command(flatten)]
    pub slide: SlideArgs,

    /// Tile edge length used for the tile counts.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILE_SIZE")]
    pub tile_size: u32,

    /// Print the level table as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.slide.validate()?;

        if !TILE_SIZE_RANGE.contains(&self.tile_size) {
            return Err(format!(
                "tile_size must be between {} and {}",
                TILE_SIZE_RANGE.start(),
                TILE_SIZE_RANGE.end()
            ));
        }

        Ok(())
    }
}

impl SlideArgs {
    fn validate(&self) -> Result<(), String> {
        if let Some((width, height)) = self.synthetic {
            if width == 0 || height == 0 {
                return Err("synthetic slide dimensions must be greater than 0".to_string());
            }
        }
        Ok(())
    }

    /// Synthetic size to use: explicit, or the default when no file is given.
    pub fn synthetic_size(&self) -> Option<(u64, u64)> {
        match (&self.path, self.synthetic) {
            (_, Some(size)) => Some(size),
            (None, None) => Some(DEFAULT_SYNTHETIC_SIZE),
            (Some(_), None) => None,
        }
    }
}

// =============================================================================
// Value Parsers
// =============================================================================

/// Parse `WIDTHxHEIGHT`.
fn parse_dimensions(value: &str) -> Result<(u64, u64), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;

    let width = width
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid width '{}': {}", width, e))?;
    let height = height
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid height '{}': {}", height, e))?;

    Ok((width, height))
}

/// Parse `DX,DY`.
fn parse_offset(value: &str) -> Result<(f64, f64), String> {
    let (dx, dy) = value
        .split_once(',')
        .ok_or_else(|| format!("expected DX,DY, got '{}'", value))?;

    let dx = dx
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid DX '{}': {}", dx, e))?;
    let dy = dy
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid DY '{}': {}", dy, e))?;

    if !(dx.is_finite() && dy.is_finite()) {
        return Err("pan offset must be finite".to_string());
    }

    Ok((dx, dy))
}

// =============================================================================
// Tests
// =============================================================================
