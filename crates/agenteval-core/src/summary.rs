//! Aggregating results into a run summary and printing it.

use std::io::{self, Write};
use std::time::Duration;

use crate::domain::{EvalResult, Summary};

pub fn compute_summary(results: &[EvalResult]) -> Summary {
    let mut summary = Summary {
        total_evals: results.len(),
        ..Default::default()
    };

    for r in results {
        summary.total_cost += r.cost;
        if r.error.is_some() {
            summary.failed_evals += 1;
            continue;
        }

        if !r.size_expected.is_empty() {
            summary.sizes_total += 1;
            if r.size_expected == r.size {
                summary.sizes_passed += 1;
            }
        }

        summary.tools_total += r.tool_calls_expected;
        summary.tools_passed += r.tool_calls_score * r.tool_calls_expected;

        summary.handoffs_total += 1;
        if r.handoffs_match {
            summary.handoffs_passed += 1;
        }

        summary.relevance_total += r.relevance_expected;
        summary.relevance_passed += r.relevance_passed;
    }

    summary
}

/// Glyph for a pass ratio.
pub fn status_icon(ratio: f64) -> &'static str {
    if ratio > 0.75 {
        "✅"
    } else if ratio > 0.50 {
        "⚠️"
    } else {
        "❌"
    }
}

fn write_metric(out: &mut dyn Write, label: &str, passed: f64, total: f64) -> io::Result<()> {
    let ratio = if total > 0.0 { passed / total } else { 0.0 };
    writeln!(
        out,
        "{} {:>14}: {:.0}/{:.0} passed ({:.1}%)",
        status_icon(ratio),
        label,
        passed,
        total,
        ratio * 100.0
    )
}

/// Write the end-of-run report.
pub fn print_summary(out: &mut dyn Write, summary: &Summary, duration: Duration) -> io::Result<()> {
    writeln!(out)?;

    if summary.failed_evals > 0 {
        writeln!(
            out,
            "❌         Errors: {}/{} evaluations failed",
            summary.failed_evals, summary.total_evals
        )?;
    }

    write_metric(out, "Sizes", summary.sizes_passed as f64, summary.sizes_total as f64)?;
    write_metric(out, "Tool Calls", summary.tools_passed, summary.tools_total)?;
    write_metric(
        out,
        "Handoffs",
        summary.handoffs_passed as f64,
        summary.handoffs_total as f64,
    )?;
    write_metric(out, "Relevance", summary.relevance_passed, summary.relevance_total)?;

    writeln!(out, "\nTotal Cost: ${:.6}", summary.total_cost)?;
    writeln!(out, "Total Time: {}", format_duration(duration))
}

/// Format a duration rounded to whole seconds: `0s`, `45s`, `2m0s`, `1h0m5s`.
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    if duration.subsec_millis() >= 500 {
        secs += 1;
    }

    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result(cost: f64) -> EvalResult {
        EvalResult {
            cost,
            size_expected: "S".to_string(),
            size: "S".to_string(),
            tool_calls_expected: 1.0,
            tool_calls_score: 0.5,
            handoffs_match: true,
            relevance_expected: 2.0,
            relevance_passed: 1.0,
            ..Default::default()
        }
    }

    fn errored(cost: f64) -> EvalResult {
        EvalResult {
            cost,
            error: Some("boom".to_string()),
            size_expected: "S".to_string(),
            relevance_expected: 3.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(compute_summary(&[]), Summary::default());
    }

    #[test]
    fn test_errored_results_only_count_cost() {
        let summary = compute_summary(&[errored(0.25), errored(0.5)]);
        assert_eq!(summary.total_evals, 2);
        assert_eq!(summary.failed_evals, 2);
        assert_eq!(summary.total_cost, 0.75);
        assert_eq!(summary.sizes_total, 0);
        assert_eq!(summary.handoffs_total, 0);
        assert_eq!(summary.tools_total, 0.0);
        assert_eq!(summary.relevance_total, 0.0);
    }

    #[test]
    fn test_mixed_results() {
        let summary = compute_summary(&[ok_result(0.5), errored(0.25), ok_result(0.25)]);
        assert_eq!(summary.total_evals, 3);
        assert_eq!(summary.failed_evals, 1);
        assert_eq!(summary.total_cost, 1.0);
        assert_eq!((summary.sizes_passed, summary.sizes_total), (2, 2));
        assert_eq!((summary.tools_passed, summary.tools_total), (1.0, 2.0));
        assert_eq!((summary.handoffs_passed, summary.handoffs_total), (2, 2));
        assert_eq!((summary.relevance_passed, summary.relevance_total), (2.0, 4.0));
    }

    #[test]
    fn test_status_icon_thresholds() {
        assert_eq!(status_icon(1.0), "✅");
        assert_eq!(status_icon(0.76), "✅");
        assert_eq!(status_icon(0.75), "⚠️");
        assert_eq!(status_icon(0.51), "⚠️");
        assert_eq!(status_icon(0.5), "❌");
        assert_eq!(status_icon(0.0), "❌");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(29_600)), "30s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m0s");
        assert_eq!(format_duration(Duration::from_secs(3605)), "1h0m5s");
    }

    #[test]
    fn test_printed_report() {
        let summary = Summary {
            total_evals: 2,
            failed_evals: 1,
            total_cost: 0.75,
            sizes_passed: 1,
            sizes_total: 1,
            tools_passed: 1.0,
            tools_total: 2.0,
            handoffs_passed: 1,
            handoffs_total: 1,
            relevance_passed: 1.0,
            relevance_total: 2.0,
        };
        let mut out = Vec::new();
        print_summary(&mut out, &summary, Duration::from_secs(65)).unwrap();
        let text = String::from_utf8(out).unwrap();

        let expected = "\n\
            ❌         Errors: 1/2 evaluations failed\n\
            ✅          Sizes: 1/1 passed (100.0%)\n\
            ❌     Tool Calls: 1/2 passed (50.0%)\n\
            ✅       Handoffs: 1/1 passed (100.0%)\n\
            ❌      Relevance: 1/2 passed (50.0%)\n\
            \n\
            Total Cost: $0.750000\n\
            Total Time: 1m5s\n";
        assert_eq!(text, expected);
    }
}
