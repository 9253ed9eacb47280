//! Terminal colors for transcript output.

use std::fmt;

use crate::Message;

const RESET: &str = "\x1b[0m";

/// ANSI foreground colors used for participants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
    Purple,
    Cyan,
}

/// Participant colors, assigned cyclically by roster index.
pub const PALETTE: [Color; 6] = [
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Purple,
    Color::Cyan,
];

/// Color of the opening System message.
pub const SYSTEM_COLOR: Color = Color::Cyan;

impl Color {
    pub fn ansi_code(self) -> &'static str {
        match self {
            Color::Red => "\x1b[31m",
            Color::Green => "\x1b[32m",
            Color::Yellow => "\x1b[33m",
            Color::Blue => "\x1b[34m",
            Color::Purple => "\x1b[35m",
            Color::Cyan => "\x1b[36m",
        }
    }

    /// Wrap `text` in this color and a reset.
    pub fn paint(self, text: &str) -> String {
        format!("{}{text}{RESET}", self.ansi_code())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ansi_code())
    }
}

/// Color for the participant at roster position `index`.
pub fn color_for(index: usize) -> Color {
    PALETTE[index % PALETTE.len()]
}

/// `[HH:MM:SS] from: content` in `color`.
pub fn format_line(message: &Message, color: Color) -> String {
    color.paint(&format!(
        "[{}] {}: {}",
        message.timestamp.format("%H:%M:%S"),
        message.from,
        message.content
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn colors_cycle_through_palette() {
        assert_eq!(color_for(0), Color::Red);
        assert_eq!(color_for(5), Color::Cyan);
        assert_eq!(color_for(6), Color::Red);
        assert_eq!(color_for(13), Color::Green);
    }

    #[test]
    fn paint_wraps_with_reset() {
        assert_eq!(Color::Blue.paint("hi"), "\x1b[34mhi\x1b[0m");
    }

    #[test]
    fn line_has_time_sender_and_content() {
        let message = Message {
            from: "User 1 (gpt-4)".into(),
            content: "hello".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 9, 5, 3).unwrap(),
        };
        let line = format_line(&message, SYSTEM_COLOR);
        assert_eq!(line, "\x1b[36m[09:05:03] User 1 (gpt-4): hello\x1b[0m");
    }
}
