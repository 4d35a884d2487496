// ═══════════════════════════════════════════════════════════════════════════════
// 📦 source.rs - Frame Source Transports
// ═══════════════════════════════════════════════════════════════════════════════
// This module opens the byte stream the decoder reads from.
// Supported inputs:
// - "-"                         stdin (piped capture utility)
// - tcp://host:port             raw-socket forwarder
// - serial:PATH[?baud=N]        radio streaming CSI over UART
// - serial:auto[?baud=N]        first USB serial device
// - anything else               recorded capture file
// ═══════════════════════════════════════════════════════════════════════════════

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::net::TcpStream;
use std::time::Duration;

use serialport::{available_ports, SerialPortType};
use tracing::info;

use crate::error::PipelineError;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Serial Configuration / إعدادات المنفذ التسلسلي
// ═══════════════════════════════════════════════════════════════════════════════

/// Default baud rate for CSI over UART / معدل البود الافتراضي
pub const DEFAULT_BAUD_RATE: u32 = 921_600;

/// Read timeout in milliseconds / مهلة القراءة بالميلي ثانية
pub const READ_TIMEOUT_MS: u64 = 100;

/// Automatically chooses the first available USB serial port.
pub fn auto_select_port() -> Option<String> {
    let ports = available_ports().ok()?;
    ports
        .into_iter()
        .find(|p| matches!(p.port_type, SerialPortType::UsbPort(_)))
        .map(|p| p.port_name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Source Specification / تحديد المصدر
// ═══════════════════════════════════════════════════════════════════════════════

/// Parsed form of the `--input` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Stdin,
    File(String),
    Tcp(String),
    /// Port name (None = auto-detect) and baud rate
    Serial { port: Option<String>, baud: u32 },
}

impl SourceSpec {
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty source".to_string());
        }
        if input == "-" {
            return Ok(SourceSpec::Stdin);
        }
        if let Some(address) = input.strip_prefix("tcp://") {
            if address.is_empty() {
                return Err("tcp source needs host:port".to_string());
            }
            return Ok(SourceSpec::Tcp(address.to_string()));
        }
        if let Some(rest) = input.strip_prefix("serial:") {
            return parse_serial(rest.trim_start_matches("//"));
        }
        Ok(SourceSpec::File(input.to_string()))
    }
}

fn parse_serial(rest: &str) -> Result<SourceSpec, String> {
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let mut baud = DEFAULT_BAUD_RATE;
    if let Some(query) = query {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("baud", value)) => {
                    baud = value
                        .parse()
                        .map_err(|_| format!("invalid baud rate '{}'", value))?;
                }
                _ => return Err(format!("unknown serial option '{}'", pair)),
            }
        }
    }

    let port = match path {
        "" | "auto" => None,
        p => Some(p.to_string()),
    };
    Ok(SourceSpec::Serial { port, baud })
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Stdin => f.write_str("stdin"),
            SourceSpec::File(path) => write!(f, "file {}", path),
            SourceSpec::Tcp(address) => write!(f, "tcp://{}", address),
            SourceSpec::Serial { port: Some(port), baud } => write!(f, "serial {} @ {}", port, baud),
            SourceSpec::Serial { port: None, baud } => write!(f, "serial auto @ {}", baud),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Opening / فتح المصدر
// ═══════════════════════════════════════════════════════════════════════════════

/// Open the byte stream for a source argument
/// فتح مصدر البايتات
pub fn open_source(input: &str) -> Result<Box<dyn Read + Send>, PipelineError> {
    let spec = SourceSpec::parse(input).map_err(|reason| source_err(input, reason))?;
    let fail = |e: io::Error| source_err(input, e.to_string());

    let reader: Box<dyn Read + Send> = match &spec {
        SourceSpec::Stdin => Box::new(io::stdin()),
        SourceSpec::File(path) => Box::new(BufReader::new(File::open(path).map_err(fail)?)),
        SourceSpec::Tcp(address) => {
            let stream = TcpStream::connect(address).map_err(fail)?;
            // A silent forwarder must not block shutdown
            stream
                .set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)))
                .map_err(fail)?;
            Box::new(stream)
        }
        SourceSpec::Serial { port, baud } => {
            let port_name = match port {
                Some(name) => name.clone(),
                None => auto_select_port()
                    .ok_or_else(|| source_err(input, "no USB serial port found".to_string()))?,
            };
            let port = serialport::new(&port_name, *baud)
                .timeout(Duration::from_millis(READ_TIMEOUT_MS))
                .open()
                .map_err(|e| source_err(&port_name, e.to_string()))?;
            info!(port = %port_name, baud, "serial port opened");
            Box::new(port)
        }
    };

    info!(source = %spec, "frame source opened");
    Ok(reader)
}

fn source_err(target: &str, reason: String) -> PipelineError {
    PipelineError::Source {
        target: target.to_string(),
        reason,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════
