// ═══════════════════════════════════════════════════════════════════════════════
// 📦 telemetry/line.rs - Visualization Line Protocol
// ═══════════════════════════════════════════════════════════════════════════════
// One record per line: timestamp_ms,score,state[,a0,a1,...]
// The score field is empty during warm-up; amplitudes are optional.
// ═══════════════════════════════════════════════════════════════════════════════

use std::fmt::Write as _;

use crate::error::LineError;
use crate::state::{MotionState, TelemetryRecord};

/// Encode a record as one line (without the trailing newline)
/// ترميز سجل في سطر واحد
pub fn format_line(record: &TelemetryRecord) -> String {
    let mut line = String::with_capacity(
        32 + record.amplitudes.as_ref().map_or(0, |a| a.len() * 8),
    );

    // Writing into a String cannot fail
    let _ = write!(line, "{},", record.timestamp);
    if let Some(score) = record.motion_score {
        let _ = write!(line, "{}", score);
    }
    let _ = write!(line, ",{}", record.state);

    if let Some(ref amplitudes) = record.amplitudes {
        for amplitude in amplitudes {
            let _ = write!(line, ",{:.3}", amplitude);
        }
    }
    line
}

/// Parse one line back into a record
/// تحليل سطر إلى سجل
///
/// Baseline and transition are not carried on the wire and come back as None.
pub fn parse_line(line: &str) -> Result<TelemetryRecord, LineError> {
    let mut fields = line.trim().split(',');
    let mut next = || fields.next().map(str::trim);

    let (Some(ts), Some(score), Some(state)) = (next(), next(), next()) else {
        let count = line.trim().split(',').filter(|f| !f.is_empty()).count();
        return Err(LineError::MissingFields(count));
    };

    let timestamp = ts
        .parse::<i64>()
        .map_err(|_| LineError::Timestamp(ts.to_string()))?;

    let motion_score = if score.is_empty() {
        None
    } else {
        Some(
            score
                .parse::<f64>()
                .map_err(|_| LineError::Score(score.to_string()))?,
        )
    };

    let state = state
        .parse::<MotionState>()
        .map_err(|_| LineError::State(state.to_string()))?;

    let amplitudes = fields
        .map(str::trim)
        .map(|a| a.parse::<f64>().map_err(|_| LineError::Amplitude(a.to_string())))
        .collect::<Result<Vec<f64>, LineError>>()?;

    Ok(TelemetryRecord {
        timestamp,
        motion_score,
        baseline: None,
        state,
        transition: None,
        amplitudes: if amplitudes.is_empty() { None } else { Some(amplitudes) },
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════
