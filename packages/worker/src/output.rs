//! Line-oriented operator output.

use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex, PoisonError};

use owo_colors::OwoColorize;

/// How an operator line is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Error,
    Emphasis,
    Plain,
}

/// Sink for operator-facing lines.
pub trait OperatorOutput: Send + Sync {
    fn line(&self, style: Style, text: &str);

    fn error(&self, text: &str) {
        self.line(Style::Error, text);
    }

    fn emphasis(&self, text: &str) {
        self.line(Style::Emphasis, text);
    }

    fn plain(&self, text: &str) {
        self.line(Style::Plain, text);
    }
}

/// Writes to stdout, coloured when stdout is a terminal.
#[derive(Debug, Clone)]
pub struct ConsoleOutput {
    color: bool,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self {
            color: std::io::stdout().is_terminal(),
        }
    }

    /// Force colours on or off.
    pub fn with_color(color: bool) -> Self {
        Self { color }
    }

    fn render(&self, style: Style, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        match style {
            Style::Error => text.red().bold().to_string(),
            Style::Emphasis => text.italic().to_string(),
            Style::Plain => text.to_string(),
        }
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorOutput for ConsoleOutput {
    fn line(&self, style: Style, text: &str) {
        let rendered = self.render(style, text);
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not take the worker down
        if let Err(e) = writeln!(stdout, "{rendered}") {
            tracing::debug!("Dropped operator line: {}", e);
        }
    }
}

/// Collects lines in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferedOutput {
    lines: Arc<Mutex<Vec<(Style, String)>>>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Style, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Line texts without styles.
    pub fn texts(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, text)| text).collect()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl OperatorOutput for BufferedOutput {
    fn line(&self, style: Style, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((style, text.to_string()));
    }
}
