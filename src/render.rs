//! Terminal output for the chat.
//!
//! Colors are plain ANSI escapes; every write can be made colorless for piping.

use std::fmt;
use std::io::{self, Write};

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for green text (prompts and responses).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for yellow text (farewell).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for blue text (startup banner).
const ANSI_BLUE: &str = "\x1b[34m";

/// ANSI escape code for red text (errors).
const ANSI_RED: &str = "\x1b[31m";

/// Printed once memory has been loaded and before the first prompt.
pub const BANNER: &str = "\nMotorhead 🤘chat start\n";

/// Printed when the user ends the conversation.
pub const FAREWELL: &str = "\nI see you have chosen to end the conversation with me 💔. Good bye!";

/// The colors the chat uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Color {
    Green,
    Yellow,
    Blue,
    Red,
}

impl Color {
    fn escape(&self) -> &'static str {
        match self {
            Color::Green => ANSI_GREEN,
            Color::Yellow => ANSI_YELLOW,
            Color::Blue => ANSI_BLUE,
            Color::Red => ANSI_RED,
        }
    }
}

/// Wrap `text` in the escape codes for `color`, or return it untouched.
pub fn paint(text: &str, color: Color, use_color: bool) -> String {
    if use_color {
        format!("{}{text}{ANSI_RESET}", color.escape())
    } else {
        text.to_string()
    }
}

/// The line printed to stderr when the chat exits on an error.
pub fn error_line(err: &impl fmt::Display, use_color: bool) -> String {
    paint(&format!("Error: {err}"), Color::Red, use_color)
}

/// Writes the chat's own lines (banner, responses, farewell) to an output.
pub struct Printer<W: Write> {
    out: W,
    use_color: bool,
}

impl Printer<io::Stdout> {
    /// Creates a printer on stdout.
    pub fn stdout(use_color: bool) -> Self {
        Self::new(io::stdout(), use_color)
    }
}

impl<W: Write> Printer<W> {
    /// Creates a printer on any writer.
    pub fn new(out: W, use_color: bool) -> Self {
        Self { out, use_color }
    }

    /// Whether output carries ANSI escapes.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Write `text` followed by a newline.
    pub fn println(&mut self, text: &str, color: Color) -> io::Result<()> {
        writeln!(self.out, "{}", paint(text, color, self.use_color))?;
        self.out.flush()
    }

    pub fn banner(&mut self) -> io::Result<()> {
        self.println(BANNER, Color::Blue)
    }

    pub fn farewell(&mut self) -> io::Result<()> {
        self.println(FAREWELL, Color::Yellow)
    }

    /// Consumes the printer, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_with_and_without_color() {
        assert_eq!(paint("hi", Color::Green, false), "hi");
        assert_eq!(paint("hi", Color::Green, true), "\x1b[32mhi\x1b[0m");
    }

    #[test]
    fn error_line_honors_color() {
        let err = crate::Error::configuration("bad temperature");
        assert_eq!(
            error_line(&err, false),
            "Error: Configuration error: bad temperature"
        );
        assert!(error_line(&err, true).starts_with(ANSI_RED));
    }

    #[test]
    fn farewell_is_yellow() {
        let mut printer = Printer::new(Vec::new(), true);
        printer.farewell().unwrap();
        let out = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(out, format!("\x1b[33m{FAREWELL}\x1b[0m\n"));
    }

    #[test]
    fn banner_plain() {
        let mut printer = Printer::new(Vec::new(), false);
        printer.banner().unwrap();
        let out = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(out, "\nMotorhead 🤘chat start\n\n");
    }
}
