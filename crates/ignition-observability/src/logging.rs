//! Structured logging with pretty/JSON/compact output and an optional file

use std::io;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::{FileLoggingConfig, LogFormat, LoggingConfig, RotationStrategy};
use crate::error::{ObservabilityError, Result};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging with the given configuration
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// The file writer is synchronous. The agent usually ends by replacing its
/// own process image, which would discard anything still buffered.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(config);

    let file_layer = match &config.file {
        Some(file_config) => {
            let writer = create_file_writer(file_config)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_ansi(false)
                .json()
                .boxed();
            Some(layer)
        }
        None => None,
    };

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config)];
    layers.extend(file_layer);

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| ObservabilityError::LoggingInit(e.to_string()))?;

    Ok(())
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match &config.filter_directives {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new(config.level.as_str()),
    })
}

fn console_layer(config: &LoggingConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match config.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn create_file_writer(config: &FileLoggingConfig) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(&config.directory)?;

    let appender = match config.rotation {
        RotationStrategy::Daily => {
            tracing_appender::rolling::daily(&config.directory, &config.prefix)
        }
        RotationStrategy::Hourly => {
            tracing_appender::rolling::hourly(&config.directory, &config.prefix)
        }
        RotationStrategy::Never => {
            tracing_appender::rolling::never(&config.directory, &config.prefix)
        }
    };

    Ok(appender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileLoggingConfig {
            directory: dir.path().join("logs"),
            prefix: "ignition".to_string(),
            rotation: RotationStrategy::Never,
        };
        let mut writer = create_file_writer(&config).unwrap();
        assert!(dir.path().join("logs").is_dir());

        // Written straight through, no flush needed
        io::Write::write_all(&mut writer, b"line\n").unwrap();
        let content = std::fs::read_to_string(dir.path().join("logs/ignition")).unwrap();
        assert_eq!(content, "line\n");
    }

    #[test]
    fn test_filter_prefers_directives() {
        let config = LoggingConfig {
            level: LogLevel::Warn,
            filter_directives: Some("ignition_agent=trace".to_string()),
            ..Default::default()
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(build_filter(&config).to_string(), "ignition_agent=trace");
        }
    }
}
