// ═══════════════════════════════════════════════════════════════════════════════
// 📦 telemetry/influx.rs - InfluxDB v2 Writer
// ═══════════════════════════════════════════════════════════════════════════════
// Sends points to /api/v2/write in InfluxDB line protocol, millisecond precision
// ═══════════════════════════════════════════════════════════════════════════════

use std::fmt::Write as _;
use std::time::Duration;

use tracing::debug;

use super::timeseries::{Point, TimeSeriesWriter};
use crate::error::SinkError;

/// HTTP request timeout / مهلة طلب HTTP
pub const REQUEST_TIMEOUT_SECS: u64 = 5;

/// Escape measurement names (commas and spaces)
fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape tag keys, tag values and field keys
fn escape_key(value: &str) -> String {
    value
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Encode one point as an InfluxDB line
///
/// ```text
/// csi_motion,room=lab baseline=0.5,motion_score=2.5,state=1 1700000000123
/// ```
pub fn encode_point(point: &Point) -> String {
    let mut line = escape_measurement(&point.measurement);
    for (key, value) in &point.tags {
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }

    let mut separator = ' ';
    for (key, value) in point.fields.iter().filter(|(_, v)| v.is_finite()) {
        let _ = write!(line, "{}{}={}", separator, escape_key(key), value);
        separator = ',';
    }
    let _ = write!(line, " {}", point.timestamp);
    line
}

/// Writer for the InfluxDB v2 HTTP API
pub struct InfluxWriter {
    client: reqwest::blocking::Client,
    endpoint: String,
    org: String,
    bucket: String,
    token: Option<String>,
}

impl InfluxWriter {
    pub fn new(url: &str, org: &str, bucket: &str, token: Option<String>) -> Result<Self, SinkError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SinkError::TimeSeries(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/v2/write", url.trim_end_matches('/')),
            org: org.to_string(),
            bucket: bucket.to_string(),
            token,
        })
    }

    fn send(&self, body: String) -> Result<(), SinkError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ms"),
            ])
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body);

        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Token {}", token));
        }

        let response = request
            .send()
            .map_err(|e| SinkError::TimeSeries(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().unwrap_or_default();
            return Err(SinkError::TimeSeries(format!("HTTP {}: {}", status, detail.trim())));
        }
        Ok(())
    }
}

impl TimeSeriesWriter for InfluxWriter {
    /// One request per point; the worker batches through `write_batch`
    fn write(&mut self, point: &Point) -> Result<(), SinkError> {
        self.send(encode_point(point))
    }

    fn write_batch(&mut self, points: &[Point]) -> Result<(), SinkError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = points.iter().map(encode_point).collect::<Vec<_>>().join("\n");
        self.send(body)?;
        debug!(points = points.len(), "wrote batch to influx");
        Ok(())
    }

    /// Nothing is held back between requests
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
