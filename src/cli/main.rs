//! Virtual background CLI tool
//!
//! Segments the person in an image file and writes either the composited
//! result or the binary mask.

use super::config::CliConfigBuilder;
use crate::{
    cache::ModelCache,
    compositor::Canvas,
    config::SegmentationConfig,
    engine::SegmentationEngine,
    frame::FrameSource,
    processor::{DrawParams, SegmentationProcessor},
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Person segmentation and virtual background compositing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "vbg")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image file
    #[arg(value_name = "INPUT", required_unless_present_any = &["list_models", "clear_cache", "show_cache_dir"])]
    pub input: Option<PathBuf>,

    /// Output PNG [default: <INPUT>_vbg.png, or <INPUT>_mask.png with --mask-only]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Segmentation model URL or path (ONNX)
    #[arg(short, long, value_name = "URL")]
    pub model: Option<String>,

    /// Replacement background image
    #[arg(long, value_name = "IMAGE", conflicts_with_all = &["effect", "color"])]
    pub background: Option<PathBuf>,

    /// Background effect computed from the frame
    #[arg(long, value_enum, conflicts_with = "color")]
    pub effect: Option<CliEffect>,

    /// Blur radius for the bokeh effect
    #[arg(long, default_value_t = 12.0)]
    pub blur_radius: f32,

    /// Solid background colour as RRGGBB hex
    #[arg(long, value_name = "RRGGBB")]
    pub color: Option<String>,

    /// Person threshold in [0, 1]; scores strictly above it are person
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Composite with continuous alpha instead of a binary mask
    #[arg(long)]
    pub soft_edges: bool,

    /// Write the binary mask instead of the composite
    #[arg(long)]
    pub mask_only: bool,

    /// JSON segmentation config; command-line flags override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Do not read or write the model cache
    #[arg(long)]
    pub no_cache: bool,

    /// List cached models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Remove all cached models and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Show current cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliEffect {
    Bokeh,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    if cli.list_models {
        return list_cached_models(&cli);
    }
    if cli.clear_cache {
        return clear_cache_models(&cli);
    }
    if cli.show_cache_dir {
        return show_current_cache_dir(&cli);
    }

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let input = cli
        .input
        .as_deref()
        .context("An input image is required")?;
    let model_url = cli
        .model
        .as_deref()
        .context("A model is required: pass --model <URL or path>")?;

    let engine = Arc::new(create_engine(&config)?);
    engine
        .init(model_url)
        .await
        .with_context(|| format!("Failed to load model from {}", model_url))?;
    let processor = SegmentationProcessor::new(Arc::clone(&engine), config)?;

    let source = FrameSource::open(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    if cli.mask_only {
        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| generate_output_path(input, "mask"));
        let mask = processor.person_mask(&source, cli.threshold).await?;
        let stats = mask.statistics();
        mask.save_png(&output)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        info!(
            output = %output.display(),
            person = %format!("{:.1}%", stats.foreground_ratio * 100.0),
            "Mask written"
        );
        return Ok(());
    }

    let background = CliConfigBuilder::background(&cli)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| generate_output_path(input, "vbg"));
    let mut canvas = Canvas::default();
    let mut params = DrawParams::new(&source, &background, &mut canvas);
    params.threshold = cli.threshold;
    let timings = processor.draw(params).await?;
    debug!(timings = %timings.summary(), "Frame processed");

    canvas
        .into_rgba()
        .save_with_format(&output, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(output = %output.display(), total_ms = timings.total_ms, "Composite written");
    Ok(())
}

#[cfg(feature = "tract")]
fn create_engine(config: &SegmentationConfig) -> Result<SegmentationEngine> {
    Ok(SegmentationEngine::tract(config)?)
}

#[cfg(not(feature = "tract"))]
fn create_engine(_config: &SegmentationConfig) -> Result<SegmentationEngine> {
    anyhow::bail!("No inference backend enabled. Rebuild with --features tract")
}

fn open_cache(cli: &Cli) -> Result<ModelCache> {
    let cache = match &cli.cache_dir {
        Some(dir) => ModelCache::with_custom_cache_dir(dir)?,
        None => ModelCache::new()?,
    };
    Ok(cache)
}

fn list_cached_models(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;
    let models = cache.scan_cached_models()?;
    if models.is_empty() {
        println!("No cached models in {}", cache.get_current_cache_dir().display());
        return Ok(());
    }
    for model in models {
        #[allow(clippy::cast_precision_loss)]
        let size_mb = model.size_bytes as f64 / (1024.0 * 1024.0);
        println!("{}  {:>8.2} MB  {}", model.model_id, size_mb, model.path.display());
    }
    Ok(())
}

fn clear_cache_models(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;
    let removed = cache.clear_all_models()?;
    println!("Removed {} cached model(s)", removed);
    Ok(())
}

fn show_current_cache_dir(cli: &Cli) -> Result<()> {
    let cache = open_cache(cli)?;
    println!("{}", cache.get_current_cache_dir().display());
    Ok(())
}

/// `photo.jpg` + `vbg` -> `photo_vbg.png` next to the input
fn generate_output_path(input_path: &Path, suffix: &str) -> PathBuf {
    let stem = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input_path.with_file_name(format!("{}_{}.png", stem, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_output_path() {
        assert_eq!(
            generate_output_path(Path::new("/photos/me.jpg"), "vbg"),
            PathBuf::from("/photos/me_vbg.png")
        );
        assert_eq!(
            generate_output_path(Path::new("frame.png"), "mask"),
            PathBuf::from("frame_mask.png")
        );
    }

    #[test]
    fn test_parse_full_invocation() {
        let cli = Cli::try_parse_from([
            "vbg",
            "in.jpg",
            "--model",
            "https://example.com/selfie.onnx",
            "--effect",
            "bokeh",
            "--threshold",
            "0.6",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.input, Some(PathBuf::from("in.jpg")));
        assert_eq!(cli.effect, Some(CliEffect::Bokeh));
        assert_eq!(cli.threshold, Some(0.6));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_background_flags_conflict() {
        let result = Cli::try_parse_from(["vbg", "in.jpg", "--background", "bg.png", "--color", "00ff00"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_input_optional_for_cache_commands() {
        assert!(Cli::try_parse_from(["vbg", "--show-cache-dir"]).is_ok());
        assert!(Cli::try_parse_from(["vbg"]).is_err());
    }
}
