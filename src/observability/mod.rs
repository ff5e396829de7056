//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events and spans. Binaries and
//! tests that want them printed call [`init_subscriber`] once at startup.
//!
//! ```rust,ignore
//! use relaykit::observability::{init_subscriber, OutputFormat, SubscriberConfig};
//!
//! let _guard = init_subscriber(
//!     SubscriberConfig::builder()
//!         .log_level(tracing::Level::DEBUG)
//!         .output_format(OutputFormat::Json)
//!         .build(),
//! )?;
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::error::LlmError;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per event, with thread ids and names
    Json,
    /// JSON with event fields flattened into the top-level object
    JsonCompact,
}

impl std::str::FromStr for OutputFormat {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "json-compact" | "json_compact" => Ok(OutputFormat::JsonCompact),
            other => Err(LlmError::ConfigurationError(format!(
                "invalid log format '{other}': expected text, json or json-compact"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
    /// Write to stdout
    pub enable_console: bool,
    /// Also write to this file, through a non-blocking writer
    pub log_file: Option<PathBuf>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
            enable_console: true,
            log_file: None,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    pub fn debug() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
            ..Self::default()
        }
    }

    /// Warnings and above as JSON to `log_file` only
    pub fn production(log_file: PathBuf) -> Self {
        Self {
            log_level: tracing::Level::WARN,
            output_format: OutputFormat::Json,
            enable_console: false,
            log_file: Some(log_file),
        }
    }

    /// Read `RELAYKIT_LOG_LEVEL`, `RELAYKIT_LOG_FORMAT` and `RELAYKIT_LOG_FILE`
    /// through `lookup`. Unset variables keep their defaults.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<SubscriberConfig, LlmError> {
        let mut builder = SubscriberConfig::builder();
        if let Some(level) = lookup("RELAYKIT_LOG_LEVEL") {
            builder = builder.log_level_str(&level)?;
        }
        if let Some(format) = lookup("RELAYKIT_LOG_FORMAT") {
            builder = builder.output_format(format.parse()?);
        }
        if let Some(path) = lookup("RELAYKIT_LOG_FILE") {
            builder = builder.log_file(PathBuf::from(path));
        }
        Ok(builder.build())
    }
}

#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<tracing::Level>,
    output_format: Option<OutputFormat>,
    enable_console: Option<bool>,
    log_file: Option<PathBuf>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Set the level from `trace`, `debug`, `info`, `warn` or `error`
    pub fn log_level_str(mut self, level: &str) -> Result<Self, LlmError> {
        let level = level.parse::<tracing::Level>().map_err(|_| {
            LlmError::ConfigurationError(format!(
                "invalid log level '{level}': expected trace, debug, info, warn or error"
            ))
        })?;
        self.log_level = Some(level);
        Ok(self)
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn enable_console(mut self, enable: bool) -> Self {
        self.enable_console = Some(enable);
        self
    }

    pub fn log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(tracing::Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
            enable_console: self.enable_console.unwrap_or(true),
            log_file: self.log_file,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn format_layer<W>(format: OutputFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_target(true).with_writer(writer);
    match format {
        OutputFormat::Text => layer.with_ansi(ansi).boxed(),
        OutputFormat::Json => layer
            .json()
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed(),
        OutputFormat::JsonCompact => layer.json().flatten_event(true).boxed(),
    }
}

fn env_filter(level: tracing::Level) -> EnvFilter {
    let level = level.as_str().to_ascii_lowercase();
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("relaykit={level}")))
}

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG`, when set, replaces the level filter. The returned guard
/// flushes the file writer on drop and must be held for as long as logs
/// should reach the file. An already installed global subscriber is left in
/// place and `Ok(None)` is returned.
pub fn init_subscriber(config: SubscriberConfig) -> Result<Option<WorkerGuard>, LlmError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.enable_console {
        layers.push(format_layer(config.output_format, std::io::stdout, true));
    }

    let mut guard = None;
    if let Some(path) = &config.log_file {
        let file_name = path.file_name().ok_or_else(|| {
            LlmError::ConfigurationError(format!("log file '{}' has no file name", path.display()))
        })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(format_layer(config.output_format, writer, false));
        guard = Some(file_guard);
    }

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(config.log_level))
        .try_init();

    match installed {
        Ok(()) => Ok(guard),
        Err(err) => {
            tracing::debug!(error = %err, "tracing subscriber already installed");
            Ok(None)
        }
    }
}

/// [`init_subscriber`] with settings read from the process environment.
pub fn init_from_env() -> Result<Option<WorkerGuard>, LlmError> {
    init_subscriber(SubscriberConfig::from_lookup(|key| std::env::var(key).ok())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = SubscriberConfig::builder().build();
        assert_eq!(config.log_level, tracing::Level::INFO);
        assert_eq!(config.output_format, OutputFormat::Text);
        assert!(config.enable_console);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn parses_level_and_format() {
        let config = SubscriberConfig::builder()
            .log_level_str("DEBUG")
            .unwrap()
            .output_format("json-compact".parse().unwrap())
            .build();
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert_eq!(config.output_format, OutputFormat::JsonCompact);
    }

    #[test]
    fn rejects_unknown_level() {
        let err = SubscriberConfig::builder().log_level_str("loud").unwrap_err();
        assert!(matches!(err, LlmError::ConfigurationError(_)));
    }

    #[test]
    fn reads_settings_through_lookup() {
        let config = SubscriberConfig::from_lookup(|key| match key {
            "RELAYKIT_LOG_LEVEL" => Some("warn".into()),
            "RELAYKIT_LOG_FORMAT" => Some("json".into()),
            "RELAYKIT_LOG_FILE" => Some("/tmp/relaykit.log".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.log_level, tracing::Level::WARN);
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/relaykit.log")));
    }

    #[test]
    fn bad_format_is_a_configuration_error() {
        assert!(SubscriberConfig::from_lookup(|key| {
            (key == "RELAYKIT_LOG_FORMAT").then(|| "xml".to_string())
        })
        .is_err());
    }
}
