// THEORY:
// `report` turns an `AnalysisResult` into a short markdown summary for humans.
// It only reads the result; every number it prints is already in the structured
// output. Synthetic demonstrations are labelled in the first line so a summary
// can never be mistaken for an analysis of recorded data.

use crate::pipeline::{AnalysisResult, DataProvenance, TruncationReason};
use std::fmt::Write;

pub fn summarize(result: &AnalysisResult) -> String {
    let mut out = String::new();
    let stats = &result.statistics;

    // `write!` into a String cannot fail.
    let _ = writeln!(out, "# Detonation front analysis");
    match &result.provenance {
        DataProvenance::Synthetic { description } => {
            let _ = writeln!(out, "\n**SYNTHETIC DEMONSTRATION DATA**: {description}");
        }
        DataProvenance::Recorded { case_directory } => {
            let _ = writeln!(out, "\nCase: `{case_directory}` ({} domain)", result.domain);
        }
    }

    let _ = writeln!(
        out,
        "\nAnalysed {} of {} selected step(s).",
        result.steps_analyzed, result.steps_considered
    );
    if let Some(reason) = result.truncated {
        let why = match reason {
            TruncationReason::StepBudget => "the step budget was reached",
            TruncationReason::Deadline => "the wall-clock budget expired",
            TruncationReason::Cancelled => "the run was cancelled",
        };
        let _ = writeln!(out, "The run stopped early because {why}; results cover the completed prefix only.");
    }

    if stats.max_count == 0 {
        let _ = writeln!(out, "\nNo detonation fronts were detected in the analysed range.");
    } else {
        let _ = writeln!(out, "\n## Fronts");
        let _ = writeln!(
            out,
            "- Operating mode: **{}** (average {:.2} active front(s), range {} to {})",
            stats.pattern, stats.avg_count, stats.min_count, stats.max_count
        );
        let _ = writeln!(out, "- Average propagation speed: {:.1} m/s", stats.avg_speed);
        let _ = writeln!(out, "- Mean system frequency: {:.1} Hz", stats.mean_system_frequency);
        let _ = writeln!(
            out,
            "- Stability: {:.3} ({})",
            stats.stability,
            stability_verdict(stats.stability)
        );
        let _ = writeln!(out, "- Distinct fronts tracked: {}", result.fronts.len());

        let _ = writeln!(out, "\n## Heuristic estimates");
        let _ = writeln!(
            out,
            "These follow configured rules of thumb (peak pressure on the annular area, peak pressure times \
             temperature), not a physical balance."
        );
        let _ = writeln!(out, "- Thrust: {:.1} N", stats.performance.thrust);
        match stats.performance.specific_impulse {
            Some(isp) => {
                let _ = writeln!(out, "- Specific impulse: {isp:.1} s");
            }
            None => {
                let _ = writeln!(out, "- Specific impulse: not estimated (no mass flow rate configured)");
            }
        }
        let _ = writeln!(out, "- Mean front energy proxy: {:.3e}", stats.mean_total_energy);
    }

    let _ = writeln!(out, "\n## Collisions");
    if stats.collision_count == 0 {
        let _ = writeln!(out, "No collisions were detected.");
    } else {
        let kinds: Vec<String> =
            stats.collisions_by_kind.iter().map(|(kind, n)| format!("{n} {}", kind.label())).collect();
        let _ = writeln!(out, "{} collision(s): {}.", stats.collision_count, kinds.join(", "));
        let _ = writeln!(out, "Collision rate: {:.1} per second of simulated time.", stats.collision_frequency);
        let _ = writeln!(out, "Largest estimated pressure spike: {:.3e} Pa.", stats.peak_pressure_spike);
        let _ = writeln!(
            out,
            "Energy release and spike figures are heuristics (scaled peak values), not a physical balance."
        );
    }

    if !result.gaps.is_empty() {
        let _ = writeln!(out, "\n## Skipped steps");
        for gap in &result.gaps {
            let _ = writeln!(out, "- t = {} (`{}`): {}", gap.time, gap.label, gap.reason);
        }
    }

    out
}

fn stability_verdict(stability: f64) -> &'static str {
    if stability >= 0.9 {
        "steady front count"
    } else if stability >= 0.5 {
        "mostly steady"
    } else {
        "front count fluctuates strongly"
    }
}
