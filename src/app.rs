// ═══════════════════════════════════════════════════════════════════════════════
// 📦 app.rs - Viewer Application Logic
// ═══════════════════════════════════════════════════════════════════════════════
// This module contains the viewer's event handling and render loop.
// Features:
// - Event loop management
// - Keyboard input handling (quit, pause, clear)
// - Owns the line reader feeding the shared state
// ═══════════════════════════════════════════════════════════════════════════════

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{backend::Backend, Terminal};

use crate::line_reader::LineReader;
use crate::state::SharedState;
use crate::ui;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Application Configuration / إعدادات التطبيق
// ═══════════════════════════════════════════════════════════════════════════════

/// Tick rate for the event loop in milliseconds
/// معدل التحديث لحلقة الأحداث بالميلي ثانية
const TICK_RATE_MS: u64 = 50;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Application Structure / هيكل التطبيق
// ═══════════════════════════════════════════════════════════════════════════════

/// Viewer application
/// تطبيق العارض
pub struct App {
    /// Shared viewer state / حالة العارض المشتركة
    state: SharedState,

    /// Reader feeding the state / قارئ الأسطر
    reader: Option<LineReader>,
}

impl App {
    pub fn new(state: SharedState, reader: Option<LineReader>) -> Self {
        Self { state, reader }
    }

    /// Draw and handle input until the user quits
    /// حلقة الرسم والأحداث
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|frame| ui::render(frame, &self.state))?;
            if self.handle_events()? {
                break;
            }
        }
        Ok(())
    }

    /// Handle keyboard events
    /// معالجة لوحة المفاتيح
    ///
    /// Returns true if should quit / يرجع true إذا يجب الخروج
    pub fn handle_events(&mut self) -> io::Result<bool> {
        if event::poll(Duration::from_millis(TICK_RATE_MS))? {
            if let Event::Key(key) = event::read()? {
                // Only handle key press events / معالجة أحداث الضغط على المفاتيح فقط
                if key.kind == KeyEventKind::Press {
                    return Ok(self.handle_key(key.code));
                }
            }
        }
        Ok(self.should_quit())
    }

    fn should_quit(&self) -> bool {
        self.state.lock().map(|s| s.should_quit).unwrap_or(true)
    }

    /// Handle a single key press / معالجة ضغطة مفتاح واحدة
    pub fn handle_key(&mut self, key: KeyCode) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return true;
        };

        match key {
            // Q / Esc - Quit / الخروج
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                state.should_quit = true;
            }

            // Space - Pause/Resume / إيقاف مؤقت
            KeyCode::Char(' ') => {
                state.toggle_pause();
                state.status_message = if state.paused {
                    "⏸️ Paused (records still counted)".to_string()
                } else {
                    "▶️ Resumed".to_string()
                };
            }

            // C - Clear history / مسح السجل
            KeyCode::Char('c') | KeyCode::Char('C') => {
                state.clear();
                state.status_message = "🧹 History cleared".to_string();
            }

            _ => {}
        }

        state.should_quit
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(ref mut reader) = self.reader {
            reader.stop();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{create_shared_state, MotionState, TelemetryRecord};

    fn record(ts: i64) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: ts,
            motion_score: Some(1.0),
            baseline: None,
            state: MotionState::Idle,
            transition: None,
            amplitudes: None,
        }
    }

    #[test]
    fn test_keys() {
        let state = create_shared_state();
        let mut app = App::new(state.clone(), None);

        state.lock().unwrap().push_record(record(1));
        assert!(!app.handle_key(KeyCode::Char(' ')));
        assert!(state.lock().unwrap().paused);

        state.lock().unwrap().push_record(record(2));
        assert_eq!(state.lock().unwrap().records.len(), 1);

        assert!(!app.handle_key(KeyCode::Char('c')));
        assert!(state.lock().unwrap().records.is_empty());
        assert_eq!(state.lock().unwrap().lines_received, 2);

        assert!(!app.handle_key(KeyCode::Char('x')));
        assert!(app.handle_key(KeyCode::Esc));
    }
}
