//! Terminal output for the feed unit.
//!
//! [`Reporter`] carries the colored styles and the debug flag used by every
//! engine operation; [`CommandProgress`] adds an animated spinner around a
//! dispatched command and prints the final operation report as JSON.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::dispatch::OperationReport;

/// Console reporter shared by every engine operation.
pub struct Reporter {
    debug: bool,
    red: Style,
    yellow: Style,
}

impl Reporter {
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn info(&self, msg: &str) {
        println!("MMU: {msg}");
    }

    /// Per-stage detail, only with the debug flag set.
    pub fn debug(&self, msg: &str) {
        if self.debug {
            println!("MMU: {msg}");
        }
    }

    /// Retry line, gated by the debug flag like the other per-attempt detail.
    pub fn retry(&self, attempt: u32, max: u32, reason: &str) {
        if self.debug {
            eprintln!("  {} Retry {attempt}/{max}: {reason}", self.yellow.apply_to("↻"));
        }
    }

    /// Blocking status line: pause, validation failure, terminal failure.
    pub fn blocking(&self, msg: &str) {
        println!("{} {msg}", self.red.apply_to("✗"));
    }
}

/// Spinner shown while a dispatched command runs.
pub struct CommandProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl CommandProgress {
    pub fn start(label: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(label.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Stop the spinner and print the command outcome.
    pub fn finish(&self, report: &OperationReport) {
        self.pb.finish_and_clear();
        if report.succeeded {
            println!(
                "  {} {} completed in {:.1}s",
                self.green.apply_to("✓"),
                report.command,
                report.duration_ms as f64 / 1000.0
            );
        } else {
            let reason = report.error.as_deref().unwrap_or("unknown failure");
            println!(
                "  {} {} failed: {reason}",
                self.red.apply_to("✗"),
                report.command
            );
        }
    }

    /// Print the full operation report as pretty JSON.
    pub fn print_report(&self, report: &OperationReport) {
        println!();
        println!("─── Operation Report ───");
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        );
    }
}
