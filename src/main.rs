// ═══════════════════════════════════════════════════════════════════════════════
// 📦 main.rs - Application Entry Point
// ═══════════════════════════════════════════════════════════════════════════════
// Two subcommands:
// - run:  binary CSI frames → motion engine → line protocol + time-series store
// - view: terminal viewer for the line protocol on stdin
//
//   csi-motion run --input serial:auto --verbosity matrix | csi-motion view
// ═══════════════════════════════════════════════════════════════════════════════

mod app;
mod config;
mod csv_logger;
mod detectors;
mod error;
mod line_reader;
mod logging;
mod parser;
mod pipeline;
mod source;
mod state;
mod telemetry;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{error, info, warn};

use crate::app::App;
use crate::config::{Config, TimeSeriesTarget, Verbosity};
use crate::detectors::AggregatorKind;
use crate::error::ConfigError;
use crate::line_reader::LineReader;
use crate::logging::{init_logging, LogFormat};
use crate::pipeline::run_session;
use crate::state::create_shared_state;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Command Line / سطر الأوامر
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "csi-motion", version, about = "Wi-Fi CSI motion sensing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode CSI frames, detect motion and emit telemetry
    Run(RunArgs),
    /// Show the telemetry stream read from stdin
    View(ViewArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frame source: "-", a file path, tcp://host:port or serial:PATH[?baud=N] / serial:auto
    #[arg(short, long)]
    input: Option<String>,

    /// Subcarriers per antenna chain
    #[arg(long)]
    subcarriers: Option<usize>,

    /// Antenna chains per frame
    #[arg(long)]
    chains: Option<usize>,

    /// Keep only frames from this transmitter (aa:bb:cc:dd:ee:ff)
    #[arg(long)]
    mac: Option<String>,

    /// Sliding window length in frames
    #[arg(short, long)]
    window: Option<usize>,

    /// Activation threshold as a multiple of the baseline
    #[arg(long)]
    high: Option<f64>,

    /// Release threshold as a multiple of the baseline
    #[arg(long)]
    low: Option<f64>,

    /// Consecutive ticks above the high threshold to become ACTIVE
    #[arg(long)]
    confirm: Option<u32>,

    /// Consecutive ticks below the low threshold to return to IDLE
    #[arg(long)]
    hold: Option<u32>,

    /// Baseline smoothing horizon in ticks
    #[arg(long)]
    horizon: Option<u32>,

    /// Lower bound of the effective baseline
    #[arg(long)]
    min_baseline: Option<f64>,

    /// Cell aggregator: mean, max, p90, percentile:75
    #[arg(short, long)]
    aggregator: Option<AggregatorKind>,

    /// Record contents: score or matrix
    #[arg(long)]
    verbosity: Option<Verbosity>,

    /// Line protocol destination: "-", a file path or tcp://host:port
    #[arg(long)]
    visual: Option<String>,

    /// InfluxDB base URL (enables the time-series store)
    #[arg(long, requires_all = ["influx_org", "influx_bucket"], conflicts_with = "csv")]
    influx_url: Option<String>,

    #[arg(long)]
    influx_org: Option<String>,

    #[arg(long)]
    influx_bucket: Option<String>,

    /// API token; also read from INFLUX_TOKEN
    #[arg(long, env = "INFLUX_TOKEN", hide_env_values = true)]
    influx_token: Option<String>,

    /// Write points to a CSV file (timestamped name when no path is given)
    #[arg(long, num_args = 0..=1, default_missing_value = "auto")]
    csv: Option<String>,

    /// Extra point tag, key=value (repeatable)
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Default level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// Subcarriers per chain of the producing session (labels only)
    #[arg(long, default_value_t = 0)]
    subcarriers: usize,

    /// Write logs here; the viewer does not log otherwise
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

/// Parse a `key=value` tag / تحليل وسم
fn parse_tag(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", text)),
    }
}

impl RunArgs {
    /// Load the config file (if any) and apply flag overrides
    fn resolve(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(ref input) = self.input {
            config.source.input = input.clone();
        }
        if let Some(k) = self.subcarriers {
            config.source.subcarriers = k;
        }
        if let Some(c) = self.chains {
            config.source.antenna_chains = c;
        }
        if let Some(ref mac) = self.mac {
            config.source.mac_filter = Some(mac.clone());
        }

        let engine = &mut config.engine;
        if let Some(w) = self.window {
            engine.window_size = w;
        }
        if let Some(h) = self.high {
            engine.high_multiplier = h;
        }
        if let Some(l) = self.low {
            engine.low_multiplier = l;
        }
        if let Some(n) = self.confirm {
            engine.confirm_ticks = n;
        }
        if let Some(n) = self.hold {
            engine.hold_ticks = n;
        }
        if let Some(n) = self.horizon {
            engine.baseline_horizon = n;
        }
        if let Some(b) = self.min_baseline {
            engine.min_baseline = b;
        }
        if let Some(a) = self.aggregator {
            engine.aggregator = a;
        }
        if let Some(v) = self.verbosity {
            engine.verbosity = v;
        }

        if let Some(ref visual) = self.visual {
            config.sink.visual = visual.clone();
        }
        if let Some(ref url) = self.influx_url {
            config.sink.timeseries = Some(TimeSeriesTarget::Influx {
                url: url.clone(),
                org: self.influx_org.clone().unwrap_or_default(),
                bucket: self.influx_bucket.clone().unwrap_or_default(),
                token: self.influx_token.clone(),
            });
        } else if let Some(ref path) = self.csv {
            config.sink.timeseries = Some(TimeSeriesTarget::Csv { path: path.clone() });
        }
        for (key, value) in &self.tags {
            config.sink.tags.insert(key.clone(), value.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Entry Point / نقطة الدخول
// ═══════════════════════════════════════════════════════════════════════════════

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run_command(args),
        Command::View(args) => run_viewer(args),
    }
}

/// `run` subcommand: exits with status 1 on a fatal error
fn run_command(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.log_format, &args.log_level, None)?;

    let config = match args.resolve() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    match run_session(&config, stop) {
        Ok(summary) => {
            info!(reason = ?summary.reason, records = summary.records, "bye");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "capture session failed");
            std::process::exit(1);
        }
    }
}

/// `view` subcommand / أمر العارض
fn run_viewer(args: ViewArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(ref path) = args.log_file {
        init_logging(args.log_format, "info", Some(path))?;
    }

    let state = create_shared_state();
    if let Ok(mut guard) = state.lock() {
        guard.subcarriers_hint = args.subcarriers;
    }
    let reader = LineReader::spawn_stdin(state.clone());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut app = App::new(state, Some(reader));
    let result = app.run(&mut terminal);

    // Cleanup - important to do in correct order!
    // تنظيف - مهم بالترتيب الصحيح!
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // Clear any pending events
    // تنظيف الأحداث المعلقة
    while crossterm::event::poll(Duration::from_millis(10))? {
        let _ = crossterm::event::read();
    }

    if let Err(ref e) = result {
        error!(error = %e, "viewer failed");
    }
    result.map_err(|e| e.into())
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "csi-motion", "run", "--input", "capture.bin", "--subcarriers", "64", "--chains", "2",
            "--window", "20", "--aggregator", "p90", "--verbosity", "matrix", "--csv",
            "--tag", "room=lab",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.resolve().unwrap();

        assert_eq!(config.source.input, "capture.bin");
        assert_eq!(config.source.shape().cells(), 128);
        assert_eq!(config.engine.window_size, 20);
        assert_eq!(config.engine.aggregator, AggregatorKind::Percentile(90.0));
        assert_eq!(config.engine.verbosity, Verbosity::Matrix);
        assert_eq!(
            config.sink.timeseries,
            Some(TimeSeriesTarget::Csv { path: "auto".to_string() })
        );
        assert_eq!(config.sink.tags.get("room").map(String::as_str), Some("lab"));
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let cli = Cli::try_parse_from(["csi-motion", "run", "--low", "4", "--high", "2"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.resolve().is_err());

        assert!(parse_tag("novalue").is_err());
        assert!(Cli::try_parse_from(["csi-motion", "run", "--influx-url", "http://db"]).is_err());
    }
}
