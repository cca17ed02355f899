//! Subscriber setup for applications
//!
//! The library only emits `tracing` events (and `log` records from the
//! model fetcher, bridged by `tracing-subscriber`); binaries call
//! [`TracingConfig::init`] once at startup.

use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Coloured single-line output for terminals
    #[default]
    Console,
    /// Same layout without ANSI colours, for CI logs and files
    Compact,
    /// One JSON object per event, including the span stack
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Which events reach the output, and how they are formatted
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Number of `-v` flags; 0 is info
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Filter directive that overrides both `RUST_LOG` and verbosity
    pub env_filter: Option<String>,
}

impl TracingConfig {
    /// Defaults for the `vbg` binary at the given verbosity
    #[must_use]
    pub fn for_cli(verbosity: u8) -> Self {
        Self {
            verbosity,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn env_filter<S: Into<String>>(mut self, directive: S) -> Self {
        self.env_filter = Some(directive.into());
        self
    }

    /// Most verbose level enabled by the `-v` count alone
    #[must_use]
    pub fn level(&self) -> Level {
        match self.verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Directive handed to [`EnvFilter`]: the explicit filter, else
    /// `RUST_LOG`, else the verbosity level
    #[must_use]
    pub fn filter_directive(&self) -> String {
        if let Some(directive) = &self.env_filter {
            return directive.clone();
        }
        std::env::var(EnvFilter::DEFAULT_ENV)
            .unwrap_or_else(|_| self.level().as_str().to_ascii_lowercase())
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        let filter = EnvFilter::try_new(self.filter_directive())?;

        let output: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            TracingFormat::Console => fmt::layer().with_target(false).compact().boxed(),
            TracingFormat::Compact => fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .compact()
                .boxed(),
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(output)
            .with(filter)
            .try_init()?;
        Ok(())
    }
}

/// Install the `vbg` subscriber for `-v` count `verbosity`
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<()> {
    TracingConfig::for_cli(verbosity).init()
}
