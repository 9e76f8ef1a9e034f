//! `TerminalReporter` — Presentation-layer implementation of `ProgressReporter`.
//!
//! Owns a copy of the `OutputContext` so application services, including the
//! worker tasks, can emit progress events without depending on any
//! presentation type directly.

use indicatif::{MultiProgress, ProgressBar};
use owo_colors::OwoColorize as _;

use crate::application::ports::{ProgressReporter, TransferProgress};
use crate::output::{OutputContext, progress};

/// Terminal progress reporter.
///
/// - `step()` prints `"  → {message}"` (suppressed when `ctx.quiet`)
/// - `success()` prints `"  ✓ {message}"` (suppressed when `ctx.quiet`)
/// - `warn()` prints `"  ! {message}"` (suppressed when `ctx.quiet`)
///
/// Lines go through the shared `MultiProgress` while bars may be on screen,
/// so concurrent tasks never tear a bar.
pub struct TerminalReporter {
    ctx: OutputContext,
    multi: MultiProgress,
}

impl TerminalReporter {
    /// Create a new `TerminalReporter` from the given output context.
    #[must_use]
    pub fn new(ctx: &OutputContext) -> Self {
        Self {
            ctx: ctx.clone(),
            multi: MultiProgress::new(),
        }
    }

    fn emit(&self, line: &str) {
        if self.ctx.quiet {
            return;
        }
        // MultiProgress::println is a no-op on a hidden draw target.
        if !self.ctx.show_progress() || self.multi.println(line).is_err() {
            println!("{line}");
        }
    }
}

impl ProgressReporter for TerminalReporter {
    fn step(&self, message: &str) {
        self.emit(&format!("  {} {message}", "→".style(self.ctx.styles.step)));
    }

    fn success(&self, message: &str) {
        self.emit(&format!("  {} {message}", "✓".style(self.ctx.styles.success)));
    }

    fn warn(&self, message: &str) {
        self.emit(&format!("  {} {message}", "!".style(self.ctx.styles.warning)));
    }

    fn transfer(&self, label: &str) -> Box<dyn TransferProgress> {
        if !self.ctx.show_progress() {
            return Box::new(BarProgress {
                pb: ProgressBar::hidden(),
                label: label.to_owned(),
            });
        }
        let pb = self.multi.add(progress::bar(0, label));
        Box::new(BarProgress {
            pb,
            label: label.to_owned(),
        })
    }
}

/// One indicatif bar driven by a transfer.
struct BarProgress {
    pb: ProgressBar,
    label: String,
}

impl TransferProgress for BarProgress {
    fn begin(&self, total_bytes: u64) {
        self.pb.set_length(total_bytes);
        self.pb.set_position(0);
    }

    fn advance(&self, bytes: u64) {
        self.pb.inc(bytes);
    }

    fn finish(&self) {
        if self.pb.position() >= self.pb.length().unwrap_or(0) {
            progress::finish_success(&self.pb, &self.label);
        } else {
            self.pb.abandon();
        }
    }
}
