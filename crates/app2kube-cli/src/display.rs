//! Display formatting for CLI output
//!
//! Blue-green messages are printed in the color they talk about: bright
//! blue for blue, green for green.

use app2kube_core::Color;
use app2kube_kube::{LogLine, OperationSummary, RolloutStatus};
use console::{StyledObject, style};

/// Style `text` after `color`
pub fn colorize<D>(color: Color, text: D) -> StyledObject<D> {
    match color {
        Color::Blue => style(text).blue().bright(),
        Color::Green => style(text).green(),
    }
}

/// `→ message`
pub fn step(message: impl std::fmt::Display) {
    println!("{} {}", style("→").blue().bold(), message);
}

/// `✓ message`
pub fn success(message: impl std::fmt::Display) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print every object of an apply or delete, then the totals
pub fn print_summary(action: &str, summary: &OperationSummary) {
    for name in &summary.succeeded {
        println!("  {} {} {}", style("✓").green(), name, style(action).dim());
    }
    for (name, reason) in &summary.skipped {
        println!("  {} {} ({})", style("○").yellow(), name, style(reason).dim());
    }
    for (name, error) in &summary.failed {
        println!("  {} {}: {}", style("✗").red(), name, error);
    }
}

/// Rollout progress line
pub fn rollout_ready(deployment: &str, status: &RolloutStatus) {
    success(format!(
        "Deployment {} is ready ({})",
        style(deployment).cyan(),
        status.progress()
    ));
}

/// One followed log line, prefixed by its pod and container
pub fn log_line(line: &LogLine) {
    println!(
        "{} {}",
        style(format!("[{}/{}]", line.pod, line.container)).dim(),
        line.line
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colorize_keeps_text() {
        console::set_colors_enabled(false);
        assert_eq!(colorize(Color::Blue, "web-blue").to_string(), "web-blue");
        assert_eq!(colorize(Color::Green, "green").to_string(), "green");
    }
}
