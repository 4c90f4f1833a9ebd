//! Terminal rendering of processes and dashboard figures.
//!
//! Uses `console` styles the way the status dashboard colours its cards:
//! green for running, yellow for paused, red for errors and grey for
//! stopped or completed work.

use anyhow::Context;
use console::Style;
use serde::Serialize;

use crate::engine::ProcessStats;
use crate::state_machine::{Process, ProcessStatus};

const BAR_WIDTH: usize = 20;

/// Prints processes and stats to stdout.
pub struct ProcessView {
    green: Style,
    yellow: Style,
    red: Style,
    dim: Style,
    bold: Style,
}

impl Default for ProcessView {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            yellow: Style::new().yellow(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
            bold: Style::new().bold(),
        }
    }
}

impl ProcessView {
    fn status_style(&self, status: ProcessStatus) -> &Style {
        match status {
            ProcessStatus::Running => &self.green,
            ProcessStatus::Paused => &self.yellow,
            ProcessStatus::Error => &self.red,
            ProcessStatus::Stopped | ProcessStatus::Completed => &self.dim,
        }
    }

    pub fn print_table(&self, processes: &[Process]) {
        if processes.is_empty() {
            println!("{}", self.dim.apply_to("No processes found."));
            return;
        }
        println!(
            "{}",
            self.bold.apply_to(format!(
                "{:<36}  {:<24}  {:<10}  {:<10}  PROGRESS",
                "ID", "NAME", "TYPE", "STATUS"
            ))
        );
        for process in processes {
            println!(
                "{:<36}  {:<24}  {:<10}  {}  {} {:>5.1}%",
                process.id,
                truncate(&process.name, 24),
                process.process_type,
                self.status_style(process.status)
                    .apply_to(format!("{:<10}", process.status)),
                progress_bar(process.progress, BAR_WIDTH),
                process.progress
            );
        }
    }

    pub fn print_detail(&self, process: &Process) {
        let style = self.status_style(process.status);
        println!("{} {}", self.bold.apply_to(&process.name), self.dim.apply_to(&process.id));
        println!("  {}", process.description);
        println!("  type:      {}", process.process_type);
        println!("  status:    {}", style.apply_to(process.status));
        println!(
            "  progress:  {} {:.1}%",
            progress_bar(process.progress, BAR_WIDTH),
            process.progress
        );
        if let Some(minutes) = process.estimated_duration {
            println!("  estimate:  {minutes} min");
        }
        if let Some(minutes) = process.actual_duration {
            println!("  took:      {minutes} min");
        }
        if let Some(message) = &process.error_message {
            println!("  error:     {}", self.red.apply_to(message));
        }
        if let Some(at) = process.started_at {
            println!("  started:   {}", at.to_rfc3339());
        }
        if let Some(at) = process.completed_at {
            println!("  finished:  {}", at.to_rfc3339());
        }
        println!("  updated:   {}", process.updated_at.to_rfc3339());
    }

    pub fn print_stats(&self, stats: &ProcessStats) {
        println!("{}", self.bold.apply_to("─── Processes ───"));
        println!("  total:     {}", stats.total);
        println!("  running:   {}", self.green.apply_to(stats.running));
        println!("  paused:    {}", self.yellow.apply_to(stats.paused));
        println!("  errors:    {}", self.red.apply_to(stats.errors));
        println!("  stopped:   {} ({} completed)", stats.stopped, stats.completed);
        println!("  average:   {:.1}%", stats.average_progress);
        if !stats.by_type.is_empty() {
            println!("{}", self.bold.apply_to("─── By type ───"));
            for (kind, count) in &stats.by_type {
                println!("  {kind:<10} {count}");
            }
        }
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", to_json(value)?);
        Ok(())
    }

    pub fn print_message(&self, message: &str) {
        println!("  {} {message}", self.green.apply_to("✓"));
    }
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("failed to encode output as JSON")
}

/// Fixed-width text bar for a percentage in `[0, 100]`.
pub fn progress_bar(progress: f64, width: usize) -> String {
    let filled = ((progress.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0.0, 10), "[----------]");
        assert_eq!(progress_bar(50.0, 10), "[#####-----]");
        assert_eq!(progress_bar(100.0, 10), "[##########]");
        assert_eq!(progress_bar(180.0, 4), "[####]");
    }

    #[test]
    fn json_encoding_errors_are_reported() {
        let mut bad = std::collections::HashMap::new();
        bad.insert((1, 2), "tuple keys are not valid JSON object keys");
        assert!(to_json(&bad).is_err());
        assert_eq!(to_json(&vec![1, 2]).unwrap(), "[\n  1,\n  2\n]");
    }

    #[test]
    fn truncate_long_names() {
        assert_eq!(truncate("Compost A", 20), "Compost A");
        assert_eq!(truncate("An exceptionally long process name", 20), "An exceptionally ...");
    }
}
