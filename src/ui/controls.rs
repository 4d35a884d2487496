// ═══════════════════════════════════════════════════════════════════════════════
// 📦 ui/controls.rs - Keyboard Controls Display
// ═══════════════════════════════════════════════════════════════════════════════
// Displays available keyboard shortcuts
// ═══════════════════════════════════════════════════════════════════════════════

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::state::ViewerState;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Controls Help Box / مربع مساعدة التحكم
// ═══════════════════════════════════════════════════════════════════════════════

/// Render controls help box
/// رسم مربع مساعدة التحكم
pub fn render(frame: &mut Frame, area: Rect, state: &ViewerState) {
    let pause_label = if state.paused { " Resume" } else { " Pause" };

    let text = vec![
        Line::from(vec![
            Span::styled("Space", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::raw(pause_label),
        ]),
        Line::from(vec![
            Span::styled("C", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::raw(" Clear history"),
        ]),
        Line::from(vec![
            Span::styled("Q/Esc", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            Span::raw(" Quit"),
        ]),
    ];

    let block = Block::default()
        .title("⌨️ Controls")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let paragraph = Paragraph::new(text).block(block);
    frame.render_widget(paragraph, area);
}
