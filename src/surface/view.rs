//! Console table of the mirrored loops

use super::indicators::{ButtonStatus, BUTTONS};
use super::level::{amplitude_to_fill, METER_MAX_DB, METER_MIN_DB};
use crate::state::{LoopState, Snapshot};
use colored::{Color, Colorize};
use std::fmt::Write;

/// Rendering knobs
#[derive(Debug, Clone)]
pub struct ViewOptions {
    /// Characters per bar
    pub meter_width: usize,
    /// Append raw `state`/`next_state` codes
    pub state_debug: bool,
    pub color: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            meter_width: 16,
            state_debug: false,
            color: true,
        }
    }
}

fn paint(text: &str, color: Color, opts: &ViewOptions) -> String {
    if opts.color {
        text.color(color).to_string()
    } else {
        text.to_string()
    }
}

fn fill_color(fill: f32) -> Color {
    if fill < 0.7 {
        Color::Green
    } else if fill < 0.9 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn status_color(status: ButtonStatus) -> Color {
    match status {
        ButtonStatus::On => Color::Green,
        ButtonStatus::Off => Color::Red,
        ButtonStatus::PendingOn | ButtonStatus::PendingOff => Color::Yellow,
    }
}

/// Peak meter: rounds up so any signal shows at least one cell
pub fn meter_bar(fill: f32, opts: &ViewOptions) -> String {
    let width = opts.meter_width;
    let full = ((fill.clamp(0.0, 1.0) * width as f32).ceil() as usize).min(width);
    format!(
        "{}{}",
        paint(&"█".repeat(full), fill_color(fill), opts),
        "░".repeat(width - full)
    )
}

/// Level bar with a handle at the current position
pub fn level_bar(fill: f32, opts: &ViewOptions) -> String {
    let width = opts.meter_width;
    if width == 0 {
        return String::new();
    }
    let fill = fill.clamp(0.0, 1.0);
    let full = ((fill * width as f32).floor() as usize).min(width);
    let handle = ((fill * (width - 1) as f32).round() as usize).min(width - 1);

    let mut filled = String::new();
    let mut rest = String::new();
    for cell in 0..width {
        let glyph = if cell == handle {
            "│"
        } else if cell < full {
            "█"
        } else {
            "░"
        };
        if cell < full {
            filled.push_str(glyph);
        } else {
            rest.push_str(glyph);
        }
    }
    format!("{}{}", paint(&filled, fill_color(fill), opts), rest)
}

fn render_row(out: &mut String, index: usize, ls: &LoopState, opts: &ViewOptions) {
    let _ = write!(out, "{:>3} ", index + 1);

    for button in &BUTTONS {
        let status = button.status(ls.state, ls.next_state);
        let label = format!("{:<4}", button.label);
        let _ = write!(out, " {}", paint(&label, status_color(status), opts));
    }

    let fill = |v: f32| amplitude_to_fill(v, METER_MIN_DB, METER_MAX_DB);
    let _ = write!(
        out,
        " {:>7.2}  {}  {}  {}",
        ls.loop_pos,
        meter_bar(fill(ls.in_peak), opts),
        meter_bar(fill(ls.out_peak), opts),
        level_bar(fill(ls.gain), opts),
    );

    if opts.state_debug {
        let _ = write!(out, "  S:{} N:{}", ls.state, ls.next_state);
    }
    out.push('\n');
}

/// Render the whole table, one row per loop, header first
pub fn render_table(snapshot: &Snapshot, opts: &ViewOptions) -> String {
    let w = opts.meter_width;
    let mut out = String::new();
    let _ = write!(
        out,
        "{:>3}  {:<4} {:<4} {:<4} {:>7}  {:<w$}  {:<w$}  {:<w$}",
        "ID", "Rec", "Dub", "Mute", "Pos", "In", "Out", "Level",
        w = w
    );
    if opts.state_debug {
        out.push_str("  State");
    }
    out.push('\n');

    for (index, ls) in snapshot.loops.iter().enumerate() {
        render_row(&mut out, index, ls, opts);
    }
    out
}
