// ═══════════════════════════════════════════════════════════════════════════════
// 📦 ui/mod.rs - Terminal User Interface Module
// ═══════════════════════════════════════════════════════════════════════════════
// This module implements the viewer TUI using Ratatui.
// Features:
// - Two-column layout (Status | Charts)
// - Rolling motion score chart with the IDLE / ACTIVE state
// - Amplitude heat-map
// - Keyboard controls display
// ═══════════════════════════════════════════════════════════════════════════════

mod charts;
mod controls;
mod helpers;
mod status_panel;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::state::SharedState;

pub use helpers::centered_rect;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Main Render Function / دالة الرسم الرئيسية
// ═══════════════════════════════════════════════════════════════════════════════

/// Render the entire UI
/// رسم واجهة المستخدم بالكامل
pub fn render(frame: &mut Frame, state: &SharedState) {
    let state_guard = match state.lock() {
        Ok(guard) => guard,
        Err(_) => return,
    };

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30), // Left panel - Status / اللوحة اليسرى - الحالة
            Constraint::Percentage(70), // Right panel - Charts / اللوحة اليمنى - الرسوم
        ])
        .split(frame.area());

    status_panel::render(frame, main_chunks[0], &state_guard);
    charts::render_chart_panel(frame, main_chunks[1], &state_guard);

    // Nothing received yet: overlay a hint / لم تصل بيانات بعد
    if state_guard.lines_received == 0 {
        let area = centered_rect(50, 20, frame.area());
        let popup = Paragraph::new(state_guard.status_message.as_str())
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .title("⏳ Waiting")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow)),
            );
        frame.render_widget(Clear, area);
        frame.render_widget(popup, area);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════
