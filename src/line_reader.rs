// ═══════════════════════════════════════════════════════════════════════════════
// 📦 line_reader.rs - Telemetry Line Reader
// ═══════════════════════════════════════════════════════════════════════════════
// This module feeds the viewer from the pipeline's line protocol.
// Features:
// - Runs in background thread
// - Parses one record per line
// - Pushes records into ViewerState
// - Counts malformed lines instead of stopping
// ═══════════════════════════════════════════════════════════════════════════════

use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::state::SharedState;
use crate::telemetry::parse_line;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Line Reader Structure / هيكل قارئ الأسطر
// ═══════════════════════════════════════════════════════════════════════════════

/// Background reader of telemetry lines
/// قارئ أسطر القياس في الخلفية
pub struct LineReader {
    /// Flag to stop the reader thread / علامة لإيقاف خيط القارئ
    stop_flag: Arc<AtomicBool>,

    /// Handle to the reader thread / مقبض خيط القارئ
    thread_handle: Option<JoinHandle<()>>,
}

impl LineReader {
    /// Start reading lines from stdin
    pub fn spawn_stdin(state: SharedState) -> Self {
        Self::spawn(BufReader::new(io::stdin()), state)
    }

    /// Start reading lines from any buffered source
    /// بدء القراءة من أي مصدر
    pub fn spawn<R: BufRead + Send + 'static>(input: R, state: SharedState) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop_flag);

        if let Ok(mut guard) = state.lock() {
            guard.receiver_active = true;
        }

        let handle = thread::spawn(move || run_line_reader(input, &state, &flag));

        Self {
            stop_flag,
            thread_handle: Some(handle),
        }
    }

    /// Ask the thread to stop after its current line.
    ///
    /// The thread is not joined: it may be blocked reading stdin, and it
    /// ends with the process.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }

    /// Wait for the thread to reach end of input
    #[cfg(test)]
    pub fn join(mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        self.stop();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Reader Thread Function / دالة خيط القارئ
// ═══════════════════════════════════════════════════════════════════════════════

fn run_line_reader<R: BufRead>(input: R, state: &SharedState, stop_flag: &AtomicBool) {
    for line in input.lines() {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "telemetry input failed");
                if let Ok(mut guard) = state.lock() {
                    guard.status_message = format!("⚠️ Read error: {}", e);
                }
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let parsed = parse_line(&line);
        let Ok(mut guard) = state.lock() else {
            break;
        };
        match parsed {
            Ok(record) => {
                guard.push_record(record);
                guard.status_message = format!("📥 Receiving: {} records", guard.lines_received);
            }
            Err(e) => {
                guard.parse_errors += 1;
                debug!(error = %e, line = %line, "skipping malformed line");
            }
        }
    }

    if let Ok(mut guard) = state.lock() {
        guard.receiver_active = false;
        guard.status_message = format!("⏹️ Input closed after {} records", guard.lines_received);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::state::{create_shared_state, MotionState};

    #[test]
    fn test_reads_until_end_of_input() {
        let input = "1,,IDLE\n2,0.5,IDLE\ngarbage\n\n3,9.0,ACTIVE,1.000,2.000\n";
        let state = create_shared_state();

        LineReader::spawn(Cursor::new(input.as_bytes().to_vec()), state.clone()).join();

        let guard = state.lock().unwrap();
        assert_eq!(guard.lines_received, 3);
        assert_eq!(guard.parse_errors, 1);
        assert_eq!(guard.current_state, MotionState::Active);
        assert_eq!(guard.activations, 1);
        assert_eq!(guard.max_cells, 2);
        assert!(!guard.receiver_active);
    }
}
