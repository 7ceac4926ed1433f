use colored::Colorize;
use embedded::{PlanProgress, PlannedConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{}/{}]", num, total).blue().bold(), msg);
}

/// `1 feature`, `3 features`
pub fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{} {}", count, word)
    } else {
        format!("{} {}s", count, word)
    }
}

/// Create a spinner with a message
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Plan progress shown as one step line and a spinner per config.
pub struct SpinnerProgress {
    quiet: bool,
    current: Option<(ProgressBar, Instant)>,
}

impl SpinnerProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            current: None,
        }
    }
}

impl PlanProgress for SpinnerProgress {
    fn on_config_start(&mut self, index: usize, total: usize, config: &PlannedConfig) {
        if self.quiet {
            return;
        }
        step(index + 1, total, &config.label());
        let pb = spinner(&format!("Running {} in embedded {}", plural(config.operations.len(), "operation"), config.kind));
        self.current = Some((pb, Instant::now()));
    }

    fn on_config_complete(&mut self, config: &PlannedConfig, ok: bool) {
        let Some((pb, started)) = self.current.take() else {
            return;
        };
        pb.finish_and_clear();
        let elapsed = started.elapsed().as_secs_f64();
        if ok {
            success(&format!("{} ({:.1}s)", config.label(), elapsed));
        } else {
            error(&format!("{} failed after {:.1}s", config.label(), elapsed));
        }
    }
}
