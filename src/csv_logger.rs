// ═══════════════════════════════════════════════════════════════════════════════
// 📦 csv_logger.rs - CSV Time-Series Export
// ═══════════════════════════════════════════════════════════════════════════════
// This module writes telemetry points to a CSV file.
// Features:
// - One row per point: timestamp, measurement, tags, motion fields
// - Header written before the first row
// - Fields a point does not carry are left as empty cells
// - Flushes on exit
// ═══════════════════════════════════════════════════════════════════════════════

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::SinkError;
use crate::telemetry::{Point, TimeSeriesWriter};

/// Field columns, in output order / أعمدة الحقول
pub const FIELD_COLUMNS: [&str; 3] = ["motion_score", "baseline", "state"];

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 CSV Logger Structure / هيكل مسجل CSV
// ═══════════════════════════════════════════════════════════════════════════════

/// CSV logger for telemetry points
/// مسجل CSV لنقاط القياس
pub struct CsvLogger {
    /// CSV writer over the output file / كاتب CSV
    writer: csv::Writer<File>,

    path: PathBuf,

    /// Whether header has been written / هل تمت كتابة الترويسة
    header_written: bool,
}

impl CsvLogger {
    /// Create a new CSV logger, truncating any existing file
    /// إنشاء مسجل CSV جديد
    pub fn new(file_path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = file_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            writer: csv::Writer::from_writer(file),
            path,
            header_written: false,
        })
    }

    /// Create a new CSV logger with auto-generated filename
    /// إنشاء مسجل CSV جديد باسم ملف تلقائي
    pub fn new_with_timestamp() -> Result<Self, SinkError> {
        Self::new(default_file_name())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_header(&mut self) -> Result<(), SinkError> {
        let mut header = vec!["timestamp", "measurement", "tags"];
        header.extend_from_slice(&FIELD_COLUMNS);
        self.writer.write_record(&header)?;
        self.header_written = true;
        Ok(())
    }
}

/// csi_motion_YYYYmmdd_HHMMSS.csv in the working directory
fn default_file_name() -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("csi_motion_{}.csv", timestamp))
}

/// Tags as "key=value;key=value"
fn join_tags(point: &Point) -> String {
    point
        .tags
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(";")
}

impl TimeSeriesWriter for CsvLogger {
    /// Write a single data row / كتابة صف بيانات واحد
    fn write(&mut self, point: &Point) -> Result<(), SinkError> {
        if !self.header_written {
            self.write_header()?;
        }

        let mut row = vec![
            point.timestamp.to_string(),
            point.measurement.clone(),
            join_tags(point),
        ];
        // ملء الأعمدة المفقودة بقيم فارغة
        row.extend(
            FIELD_COLUMNS
                .iter()
                .map(|column| point.fields.get(*column).map(|v| v.to_string()).unwrap_or_default()),
        );

        self.writer.write_record(&row)?;
        Ok(())
    }

    /// Flush all buffered rows to disk
    /// تفريغ جميع البيانات المخزنة إلى القرص
    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use super::*;

    fn point(ts: i64, score: Option<f64>) -> Point {
        let mut fields = BTreeMap::new();
        if let Some(score) = score {
            fields.insert("motion_score".to_string(), score);
            fields.insert("baseline".to_string(), 0.01);
        }
        fields.insert("state".to_string(), 0.0);
        let mut tags = BTreeMap::new();
        tags.insert("host".to_string(), "pi".to_string());
        tags.insert("room".to_string(), "lab".to_string());

        Point {
            measurement: "csi_motion".to_string(),
            tags,
            fields,
            timestamp: ts,
        }
    }

    #[test]
    fn test_one_row_per_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");

        let mut logger = CsvLogger::new(&path).unwrap();
        assert_eq!(logger.path(), path.as_path());
        logger.write_batch(&[point(1, None), point(2, Some(2.5))]).unwrap();
        logger.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "timestamp,measurement,tags,motion_score,baseline,state",
                "1,csi_motion,host=pi;room=lab,,,0",
                "2,csi_motion,host=pi;room=lab,2.5,0.01,0",
            ]
        );
    }

    #[test]
    fn test_default_file_name() {
        let name = default_file_name();
        let name = name.to_string_lossy();
        assert!(name.starts_with("csi_motion_"));
        assert!(name.ends_with(".csv"));
    }
}
