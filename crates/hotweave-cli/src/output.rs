//! Colored terminal output for the `hotweave` commands.
//!
//! Colors follow `NO_COLOR` first, then `--color`, then terminal detection.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Width of the label column in report rows
const LABEL_WIDTH: usize = 11;

/// Pick a `ColorChoice` from the `--color` value and the environment.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Writes command results to stdout and errors to stderr.
pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    fn paint(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut style = ColorSpec::new();
        style.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&style);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    // ── Fragments ────────────────────────────────────────────────────

    /// Green bold.
    pub fn success(&mut self, text: &str) {
        self.paint(text, Some(Color::Green), true);
    }

    /// Yellow bold.
    pub fn warning(&mut self, text: &str) {
        self.paint(text, Some(Color::Yellow), true);
    }

    /// Cyan.
    pub fn info(&mut self, text: &str) {
        self.paint(text, Some(Color::Cyan), false);
    }

    /// Gray.
    pub fn dim(&mut self, text: &str) {
        self.paint(text, Some(Color::White), false);
    }

    pub fn bold(&mut self, text: &str) {
        self.paint(text, None, true);
    }

    pub fn plain(&mut self, text: &str) {
        let _ = write!(self.stdout, "{}", text);
    }

    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    // ── Lines ────────────────────────────────────────────────────────

    /// `Verb detail`, verb in green
    pub fn status(&mut self, verb: &str, detail: &str) {
        self.success(verb);
        self.plain(" ");
        self.plain(detail);
        self.newline();
    }

    /// Indented `label   value` row of a report
    pub fn row(&mut self, label: &str, value: &str) {
        self.dim(&format!("  {:<width$}", label, width = LABEL_WIDTH));
        self.plain(value);
        self.newline();
    }

    /// Indented yellow `note: text`
    pub fn note(&mut self, text: &str) {
        self.warning("  note");
        self.plain(": ");
        self.plain(text);
        self.newline();
    }

    /// Red `Error:` prefix followed by the message, on stderr
    pub fn error(&mut self, message: &str) {
        let mut style = ColorSpec::new();
        style.set_fg(Some(Color::Red)).set_bold(true);
        let _ = self.stderr.set_color(&style);
        let _ = write!(self.stderr, "Error:");
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, " {}", message);
        let _ = self.stderr.flush();
    }
}
