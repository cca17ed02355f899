//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliEffect};
use crate::{
    config::{validate_threshold, EdgeMode, SegmentationConfig},
    effects::{Background, Effect},
};
use anyhow::{Context, Result};

/// Convert CLI arguments to library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Config file (or defaults) with command-line overrides applied
    pub(crate) fn from_cli(cli: &Cli) -> Result<SegmentationConfig> {
        let mut config = match &cli.config {
            Some(path) => SegmentationConfig::from_json_file(path)
                .with_context(|| format!("Invalid config file {}", path.display()))?,
            None => SegmentationConfig::default(),
        };

        if let Some(threshold) = cli.threshold {
            validate_threshold(threshold).context("Invalid --threshold")?;
            config.segmentation_threshold = threshold;
        }
        if cli.soft_edges {
            config.edge_mode = EdgeMode::Soft;
        }
        if cli.no_cache {
            config.disable_cache = true;
        }
        if let Some(dir) = &cli.cache_dir {
            config.cache_dir = Some(dir.clone());
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Background selected by `--background`, `--color` or `--effect`;
    /// bokeh when none is given
    pub(crate) fn background(cli: &Cli) -> Result<Background> {
        if let Some(path) = &cli.background {
            let image = image::open(path)
                .with_context(|| format!("Failed to open background {}", path.display()))?;
            return Ok(Background::Image(image.to_rgba8()));
        }
        if let Some(color) = &cli.color {
            return Ok(Background::from_hex(color)?);
        }
        match cli.effect {
            Some(CliEffect::Bokeh) | None => Ok(Background::Effect(Effect::Bokeh {
                radius: cli.blur_radius,
            })),
        }
    }
}
