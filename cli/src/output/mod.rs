//! Terminal output: banner, aligned tables, one-line results.

pub mod progress;
pub mod reporter;
pub mod styles;

use console::Term;
use owo_colors::OwoColorize as _;
pub use reporter::TerminalReporter;
pub use styles::Styles;

/// Styling and terminal state shared by every command.
#[derive(Clone)]
pub struct OutputContext {
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Suppress everything except errors.
    pub quiet: bool,
}

impl OutputContext {
    /// Create output context based on CLI flags and environment.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let use_colors = !no_color && is_tty && std::env::var("NO_COLOR").is_err();

        let mut styles = Styles::default();
        if use_colors {
            styles.colorize();
        }

        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Progress bars and live step lines need a terminal.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    /// Print a block of text surrounded by blank lines.
    pub fn notice(&self, text: &str) {
        if !self.quiet {
            println!("\n{text}\n");
        }
    }

    /// Print `title` followed by `rows` with their keys aligned.
    pub fn table(&self, title: &str, rows: &[(&str, String)]) {
        if self.quiet {
            return;
        }
        println!("  {}", title.style(self.styles.header));
        for (key, value) in align(rows) {
            println!("    {}  {value}", key.style(self.styles.dim));
        }
        println!();
    }

    /// Print a success message prefixed with `✓`. Suppressed when `quiet`.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "✓".style(self.styles.success));
        }
    }

    /// Print an error message prefixed with `✗` to stderr. Never suppressed.
    pub fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "✗".style(self.styles.error));
    }
}

/// Pad every key to the widest one.
#[must_use]
pub fn align<'a>(rows: &'a [(&'a str, String)]) -> Vec<(String, &'a str)> {
    let width = rows.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    rows.iter()
        .map(|(k, v)| (format!("{k:<width$}"), v.as_str()))
        .collect()
}
