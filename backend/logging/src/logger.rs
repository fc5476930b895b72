//! Structured Logger
//!
//! Wraps `tracing` to provide console output, optional JSON formatting, file
//! rotation (NDJSON), and environment-based level control.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Used when `RUST_LOG` is unset.
    pub level: String,
    /// Rolling `boxinstall.log.YYYY-MM-DD` files go here when set.
    pub dir: Option<PathBuf>,
    /// JSON instead of human-readable console lines.
    pub json: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}

/// Initialize the global structured logger.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_logger(options: &LogOptions) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&options.level));

    let console_layer = if options.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .with_target(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_ansi(true)
            .boxed()
    };

    let file_layer = match &options.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "boxinstall.log");
            Some(
                fmt::layer()
                    .json()
                    .with_writer(appender)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}
