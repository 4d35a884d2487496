// ═══════════════════════════════════════════════════════════════════════════════
// 📦 ui/charts.rs - Chart Components
// ═══════════════════════════════════════════════════════════════════════════════
// Contains: Motion score chart, Amplitude heat-map (cells x time)
// ═══════════════════════════════════════════════════════════════════════════════

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

use crate::state::{MotionState, TelemetryRecord, ViewerState};

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Constants / الثوابت
// ═══════════════════════════════════════════════════════════════════════════════

/// Number of records to display in the score chart / عدد السجلات في الرسم البياني
const CHART_SAMPLES: usize = 100;

/// Grey -> green -> yellow -> orange -> red (256-colour indices)
const COLOR_RAMP: [u8; 5] = [240, 71, 184, 208, 196];

/// Density glyphs, dimmest first / رموز الكثافة
const GLYPHS: &[char] = &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Scale to this percentile so one hot cell does not wash out the rest
const SCALE_FRACTION: f64 = 0.95;

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Chart Panel / لوحة الرسم البياني
// ═══════════════════════════════════════════════════════════════════════════════

/// Render the right chart panel
/// رسم لوحة الرسم البياني اليمنى
pub fn render_chart_panel(frame: &mut Frame, area: Rect, state: &ViewerState) {
    // Split into two: score chart and heat-map
    // تقسيم إلى قسمين: رسم الدرجة وخريطة الحرارة
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45), // Score chart
            Constraint::Percentage(55), // Heat-map
        ])
        .split(area);

    render_score_chart(frame, chunks[0], state);
    render_heatmap(frame, chunks[1], state);
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Motion Score Chart / رسم بياني درجة الحركة
// ═══════════════════════════════════════════════════════════════════════════════

/// Upper y bound: 10% headroom over the largest score or baseline shown
fn y_upper(records: &[TelemetryRecord]) -> f64 {
    let peak = records
        .iter()
        .flat_map(|r| [r.motion_score, r.baseline])
        .flatten()
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    if peak <= 0.0 {
        1.0
    } else {
        peak * 1.1
    }
}

/// Render the rolling motion score chart
/// رسم بياني درجة الحركة
fn render_score_chart(frame: &mut Frame, area: Rect, state: &ViewerState) {
    let records = state.get_last_records(CHART_SAMPLES);

    let score_points: Vec<(f64, f64)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (i as f64, r.score_or_zero()))
        .collect();

    let baseline_points: Vec<(f64, f64)> = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.baseline.map(|b| (i as f64, b)))
        .collect();

    // Ticks spent in ACTIVE / النقاط في حالة النشاط
    let active_points: Vec<(f64, f64)> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.state == MotionState::Active)
        .map(|(i, r)| (i as f64, r.score_or_zero()))
        .collect();

    let datasets = vec![
        Dataset::default()
            .name("Score")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&score_points),
        Dataset::default()
            .name("Baseline")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::DarkGray))
            .data(&baseline_points),
        Dataset::default()
            .name("ACTIVE")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Red))
            .data(&active_points),
    ];

    let y_max = y_upper(records);
    let x_labels = vec![
        Span::raw("0"),
        Span::raw(format!("{}", CHART_SAMPLES / 2)),
        Span::raw(format!("{}", CHART_SAMPLES)),
    ];
    let y_labels = vec![
        Span::raw("0"),
        Span::raw(format!("{:.2}", y_max / 2.0)),
        Span::raw(format!("{:.2}", y_max)),
    ];

    let border_color = match state.current_state {
        MotionState::Active => Color::Red,
        MotionState::Idle => Color::Green,
    };

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(format!("📈 Motion Score [{}]", state.current_state))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color)),
        )
        .x_axis(
            Axis::default()
                .title("Record")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, CHART_SAMPLES as f64])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .title("Score")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, y_max])
                .labels(y_labels),
        );

    frame.render_widget(chart, area);
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Amplitude Heat-map / خريطة حرارة السعة
// ═══════════════════════════════════════════════════════════════════════════════

/// Downsample the amplitude history into a `rows x cols` grid.
///
/// Columns are the most recent records carrying amplitudes (oldest left),
/// rows are cell buckets (chain-major cells averaged together). Missing data
/// is 0.
pub fn heatmap_grid(records: &[TelemetryRecord], rows: usize, cols: usize) -> Vec<Vec<f64>> {
    let mut grid = vec![vec![0.0; cols]; rows];
    if rows == 0 || cols == 0 {
        return grid;
    }

    let with_amps: Vec<&Vec<f64>> = records.iter().filter_map(|r| r.amplitudes.as_ref()).collect();
    let recent = &with_amps[with_amps.len().saturating_sub(cols)..];
    let offset = cols - recent.len();

    for (c, amps) in recent.iter().enumerate() {
        if amps.is_empty() {
            continue;
        }
        for (r, row) in grid.iter_mut().enumerate() {
            let start = r * amps.len() / rows;
            let end = ((r + 1) * amps.len() / rows).max(start + 1).min(amps.len());
            if start >= end {
                continue;
            }
            let bucket = &amps[start..end];
            row[offset + c] = bucket.iter().sum::<f64>() / bucket.len() as f64;
        }
    }
    grid
}

/// 95th-percentile scale of the values; falls back to max(max, 1) when the
/// percentile is ~0
pub fn percentile_scale(values: &[f64]) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 1.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let idx = ((SCALE_FRACTION * sorted.len() as f64) as usize)
        .saturating_sub(1)
        .min(sorted.len() - 1);
    let q = sorted[idx];
    if q <= 1e-9 {
        sorted[sorted.len() - 1].max(1.0)
    } else {
        q
    }
}

/// Glyph for a normalized intensity in [0, 1]
pub fn glyph_for(u: f64) -> char {
    let u = if u.is_nan() { 0.0 } else { u.clamp(0.0, 1.0) };
    let idx = (u * (GLYPHS.len() - 1) as f64).round() as usize;
    GLYPHS[idx.min(GLYPHS.len() - 1)]
}

/// Colour for a normalized intensity in [0, 1]
pub fn color_for(u: f64) -> Color {
    if u.is_nan() || u <= 0.0 {
        return Color::Indexed(COLOR_RAMP[0]);
    }
    if u >= 1.0 {
        return Color::Indexed(COLOR_RAMP[COLOR_RAMP.len() - 1]);
    }
    let segments = COLOR_RAMP.len() - 1;
    let x = u * segments as f64;
    let i = x as usize;
    let t = x - i as f64;
    let next = (i + 1).min(segments);
    Color::Indexed(if t > 0.5 { COLOR_RAMP[next] } else { COLOR_RAMP[i] })
}

/// Render the amplitude heat-map
/// رسم خريطة حرارة السعة
fn render_heatmap(frame: &mut Frame, area: Rect, state: &ViewerState) {
    let title = if state.subcarriers_hint > 0 && state.max_cells > 0 {
        format!(
            "🌡️ Amplitude ({} cells, {} chain(s))",
            state.max_cells,
            state.max_cells.div_ceil(state.subcarriers_hint)
        )
    } else {
        format!("🌡️ Amplitude ({} cells)", state.max_cells)
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    if state.max_cells == 0 {
        let hint = Paragraph::new(Line::from(Span::styled(
            "No amplitudes (run the pipeline with --verbosity matrix)",
            Style::default().fg(Color::DarkGray),
        )))
        .block(block);
        frame.render_widget(hint, area);
        return;
    }

    let inner = block.inner(area);
    let rows = (inner.height as usize).min(state.max_cells);
    let grid = heatmap_grid(&state.records, rows, inner.width as usize);

    let flat: Vec<f64> = grid.iter().flatten().copied().collect();
    let scale = percentile_scale(&flat);

    let lines: Vec<Line> = grid
        .iter()
        .map(|row| {
            Line::from(
                row.iter()
                    .map(|&v| {
                        let u = (v / scale).min(1.0);
                        Span::styled(glyph_for(u).to_string(), Style::default().fg(color_for(u)))
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

// ═══════════════════════════════════════════════════════════════════════════════
// 🔹 Unit Tests / اختبارات الوحدة
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn record(amps: Option<Vec<f64>>) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: 0,
            motion_score: None,
            baseline: None,
            state: MotionState::Idle,
            transition: None,
            amplitudes: amps,
        }
    }

    #[test]
    fn test_grid_right_aligns_recent_records() {
        let records = vec![
            record(Some(vec![1.0, 3.0, 5.0, 7.0])),
            record(None),
            record(Some(vec![2.0, 2.0, 4.0, 4.0])),
        ];
        let grid = heatmap_grid(&records, 2, 3);

        assert_eq!(grid, vec![vec![0.0, 2.0, 2.0], vec![0.0, 6.0, 4.0]]);
    }

    #[test]
    fn test_grid_keeps_only_last_columns() {
        let records: Vec<_> = (0..5).map(|i| record(Some(vec![i as f64]))).collect();
        let grid = heatmap_grid(&records, 1, 2);
        assert_eq!(grid, vec![vec![3.0, 4.0]]);
    }

    #[test]
    fn test_percentile_scale() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile_scale(&values), 95.0);

        // Mostly zero: fall back to the max (at least 1)
        let mut sparse = vec![0.0; 99];
        sparse.push(40.0);
        assert_eq!(percentile_scale(&sparse), 40.0);
        assert_eq!(percentile_scale(&[0.0, 0.0]), 1.0);
        assert_eq!(percentile_scale(&[]), 1.0);
    }

    #[test]
    fn test_glyph_and_color_ramp() {
        assert_eq!(glyph_for(0.0), ' ');
        assert_eq!(glyph_for(1.0), '@');
        assert_eq!(glyph_for(7.0), '@');
        assert_eq!(glyph_for(-1.0), ' ');

        assert_eq!(color_for(0.0), Color::Indexed(240));
        assert_eq!(color_for(1.0), Color::Indexed(196));
        // 0.3 * 4 = 1.2 -> stays on segment start
        assert_eq!(color_for(0.3), Color::Indexed(71));
        // 0.45 * 4 = 1.8 -> rounds up to the next stop
        assert_eq!(color_for(0.45), Color::Indexed(184));
    }

    #[test]
    fn test_y_upper_has_headroom() {
        let mut r = record(None);
        assert_eq!(y_upper(std::slice::from_ref(&r)), 1.0);
        r.motion_score = Some(2.0);
        r.baseline = Some(0.5);
        assert!((y_upper(&[r]) - 2.2).abs() < 1e-12);
    }
}
