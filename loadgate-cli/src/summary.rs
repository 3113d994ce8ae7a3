//! Human-readable run summary

use colored::Colorize;
use loadgate_engine::report::{RunReport, SummaryValues};
use std::fmt::Write;

/// Render the report for the terminal
pub fn render(report: &RunReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\n{}", "=== Test Summary ===".bold());
    let _ = writeln!(out, "Run ID:            {}", report.run_id);
    let _ = writeln!(out, "Base URL:          {}", report.base_url);
    let _ = writeln!(out, "Decisions tested:  {}", report.targets);
    let _ = writeln!(out, "Duration:          {:.1}s", report.elapsed_secs);
    let _ = writeln!(
        out,
        "Iterations:        {} completed, {} aborted",
        report.iterations_completed,
        report.iterations_aborted()
    );
    if let Some(signal) = report.interrupted {
        let _ = writeln!(out, "{}", format!("Interrupted ({})", signal).yellow());
    }

    let _ = writeln!(out, "\n{}", "Metrics".bold());
    let width = report.metrics.keys().map(String::len).max().unwrap_or(0);
    for (name, summary) in &report.metrics {
        let _ = writeln!(out, "  {:<width$}  {}", name, values(&summary.values), width = width);
    }

    let _ = writeln!(out, "\n{}", "Thresholds".bold());
    if report.verdict.vacuous {
        let _ = writeln!(out, "  {}", "none configured".yellow());
    }
    for result in &report.verdict.results {
        let mark = if result.outcome.is_pass() {
            "✓".green()
        } else {
            "✗".red()
        };
        let observed = result
            .observed
            .map(|v| format!("{:.4}", v))
            .unwrap_or_else(|| "n/a".to_string());
        let reason = result
            .reason
            .as_deref()
            .map(|r| format!(" ({})", r))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {} {} {} observed={}{}",
            mark, result.selector, result.expression, observed, reason
        );
    }

    let verdict = if report.passed() {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    let _ = writeln!(out, "\nVerdict: {}", verdict);
    out
}

fn values(values: &SummaryValues) -> String {
    match values {
        SummaryValues::Trend {
            avg,
            min,
            med,
            max,
            p90,
            p95,
            count,
            ..
        } => format!(
            "avg={} min={} med={} max={} p(90)={} p(95)={} count={}",
            ms(*avg),
            ms(*min),
            ms(*med),
            ms(*max),
            ms(*p90),
            ms(*p95),
            count
        ),
        SummaryValues::Rate { passes, fails, value } => format!(
            "{} ✓ {} ✗ {}",
            value
                .map(|v| format!("{:.2}%", v * 100.0))
                .unwrap_or_else(|| "n/a".to_string()),
            passes,
            fails
        ),
        SummaryValues::Counter { count, rate } => format!("{} {:.2}/s", count, rate),
    }
}

fn ms(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}ms", v))
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_values_show_missing_statistics() {
        let rendered = values(&SummaryValues::Trend {
            avg: Some(12.5),
            min: None,
            med: None,
            max: None,
            p90: None,
            p95: None,
            p99: None,
            count: 0,
        });
        assert!(rendered.starts_with("avg=12.50ms min=-"));
        assert!(rendered.ends_with("count=0"));
    }

    #[test]
    fn test_rate_values_as_percentage() {
        let rendered = values(&SummaryValues::Rate {
            passes: 1,
            fails: 3,
            value: Some(0.25),
        });
        assert_eq!(rendered, "25.00% ✓ 1 ✗ 3");
    }
}
