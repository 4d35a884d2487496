// ═══════════════════════════════════════════════════════════════════════════════
// 📦 ui/status_panel.rs - Status Panel Components
// ═══════════════════════════════════════════════════════════════════════════════
// Contains: Receiver status, Motion state, Statistics, Controls
// ═══════════════════════════════════════════════════════════════════════════════

use chrono::{Local, TimeZone};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::controls;
use crate::detectors::bandwidth_label;
use crate::state::{MotionState, ViewerState};

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Main Status Panel / لوحة الحالة الرئيسية
// ═══════════════════════════════════════════════════════════════════════════════

/// Render the left status panel
/// رسم لوحة الحالة اليسرى
pub fn render(frame: &mut Frame, area: Rect, state: &ViewerState) {
    // Split into sections / التقسيم إلى أقسام
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Receiver status / حالة المستقبل
            Constraint::Length(7), // Motion / الحركة
            Constraint::Length(7), // Stats / الإحصائيات
            Constraint::Min(5),    // Controls / التحكم
        ])
        .split(area);

    render_receiver_status(frame, chunks[0], state);
    render_motion(frame, chunks[1], state);
    render_stats(frame, chunks[2], state);
    controls::render(frame, chunks[3], state);
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Receiver Status / حالة المستقبل
// ═══════════════════════════════════════════════════════════════════════════════

/// Render receiver status box
/// رسم مربع حالة المستقبل
fn render_receiver_status(frame: &mut Frame, area: Rect, state: &ViewerState) {
    let (status_text, status_color) = match (state.receiver_active, state.paused) {
        (true, true) => ("⏸ PAUSED", Color::Yellow),
        (true, false) => ("● RECEIVING", Color::Green),
        (false, _) => ("○ CLOSED", Color::Red),
    };

    let text = vec![
        Line::from(vec![
            Span::raw("Status: "),
            Span::styled(status_text, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
        ]),
        Line::from(Span::raw(state.status_message.as_str())),
    ];

    let block = Block::default()
        .title("📡 Receiver")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(text).block(block);
    frame.render_widget(paragraph, area);
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Motion State / حالة الحركة
// ═══════════════════════════════════════════════════════════════════════════════

/// Wall-clock time of a millisecond timestamp
fn format_time(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(dt) => dt.format("%H:%M:%S%.3f").to_string(),
        None => format!("{} ms", timestamp_ms),
    }
}

/// Render the motion state box
/// رسم مربع حالة الحركة
fn render_motion(frame: &mut Frame, area: Rect, state: &ViewerState) {
    let (label, color) = match state.current_state {
        MotionState::Active => ("🔴 ACTIVE", Color::Red),
        MotionState::Idle => ("🟢 IDLE", Color::Green),
    };

    let score = match state.latest().and_then(|r| r.motion_score) {
        Some(s) => format!("{:.4}", s),
        None => "warming up".to_string(),
    };
    let baseline = state
        .latest()
        .and_then(|r| r.baseline)
        .map(|b| format!("{:.4}", b))
        .unwrap_or_else(|| "-".to_string());
    let since = state
        .last_transition
        .map(format_time)
        .unwrap_or_else(|| "-".to_string());

    let text = vec![
        Line::from(Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD))),
        Line::from(vec![
            Span::raw("Score: "),
            Span::styled(score, Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::raw("Baseline: "),
            Span::styled(baseline, Style::default().fg(Color::Gray)),
        ]),
        Line::from(vec![
            Span::raw("Activations: "),
            Span::styled(format!("{}", state.activations), Style::default().fg(Color::Magenta)),
        ]),
        Line::from(vec![Span::raw("Since: "), Span::raw(since)]),
    ];

    let block = Block::default()
        .title("🔍 Motion")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));

    frame.render_widget(Paragraph::new(text).block(block), area);
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Statistics / الإحصائيات
// ═══════════════════════════════════════════════════════════════════════════════

/// Render statistics box
/// رسم مربع الإحصائيات
fn render_stats(frame: &mut Frame, area: Rect, state: &ViewerState) {
    let band = if state.subcarriers_hint > 0 {
        bandwidth_label(state.subcarriers_hint)
    } else {
        "-"
    };

    let text = vec![
        Line::from(vec![
            Span::raw("Records: "),
            Span::styled(format!("{}", state.lines_received), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::raw("Parse errors: "),
            Span::styled(
                format!("{}", state.parse_errors),
                Style::default().fg(if state.parse_errors > 0 { Color::Red } else { Color::Green }),
            ),
        ]),
        Line::from(vec![
            Span::raw("Cells: "),
            Span::styled(format!("{}", state.max_cells), Style::default().fg(Color::Magenta)),
        ]),
        Line::from(vec![
            Span::raw("Band: "),
            Span::styled(band, Style::default().fg(Color::Cyan)),
        ]),
    ];

    let block = Block::default()
        .title("📊 Statistics")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let paragraph = Paragraph::new(text).block(block);
    frame.render_widget(paragraph, area);
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        let text = format_time(1_700_000_000_123);
        assert!(text.ends_with(".123"));
        assert_eq!(text.len(), "HH:MM:SS.123".len());
    }
}
