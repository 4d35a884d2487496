// ═══════════════════════════════════════════════════════════════════════════════
// 📦 logging.rs - Structured Logging Setup
// ═══════════════════════════════════════════════════════════════════════════════
// Logs go to stderr (stdout carries the line protocol) or to a file when the
// terminal is owned by the viewer. RUST_LOG overrides the default level.
// ═══════════════════════════════════════════════════════════════════════════════

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use clap::ValueEnum;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format / صيغة السجل
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// One line per event
    #[default]
    Compact,
    /// Multi-line, human readable
    Pretty,
    /// One JSON object per event
    Json,
}

/// Filter from RUST_LOG, else `default_level`
fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber.
///
/// Without a file, events go to stderr. Calling twice is a no-op.
pub fn init_logging(format: LogFormat, default_level: &str, file: Option<&Path>) -> io::Result<()> {
    let (writer, ansi) = match file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(io::stderr), true),
    };

    let filter = build_filter(default_level);
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi).with_target(false);

    let result = match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(layer.pretty())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init(),
    };

    // Already initialized (tests, repeated calls)
    let _ = result;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_to_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.log");

        init_logging(LogFormat::Compact, "info", Some(&path)).unwrap();
        init_logging(LogFormat::Json, "debug", None).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_format_from_cli_value() {
        assert_eq!(LogFormat::from_str("json", true), Ok(LogFormat::Json));
        assert!(LogFormat::from_str("xml", true).is_err());
    }
}
