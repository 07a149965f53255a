use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{DashboardOverview, InternDashboard};

pub fn build_dashboard_report(dashboard: &InternDashboard, generated_on: NaiveDate) -> String {
    let mut output = String::new();
    let summary = &dashboard.summary;

    let _ = writeln!(output, "# Progress Report: {}", dashboard.intern_name);
    let _ = writeln!(output, "Generated on {}", generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(
        output,
        "- Verified {} of {} required ({}% complete)",
        summary.verified, summary.required, summary.completion_percentage
    );
    let _ = writeln!(output, "- Awaiting verification: {}", summary.pending);
    if summary.over_achieved > 0 {
        let _ = writeln!(
            output,
            "- Over-achieved by {} ({}%)",
            summary.over_achieved, summary.over_achievement_percentage
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rotations");

    if dashboard.rotations.is_empty() {
        let _ = writeln!(output, "No active rotations carry requirements.");
    } else {
        let _ = writeln!(output, "| Rotation | Required | Verified | Pending | Complete |");
        let _ = writeln!(output, "| --- | --- | --- | --- | --- |");
        for rotation in &dashboard.rotations {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {}% |",
                rotation.rotation_name,
                rotation.required,
                rotation.verified,
                rotation.pending,
                rotation.completion_percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Awaiting Verification");

    if dashboard.pending_verifications.is_empty() {
        let _ = writeln!(output, "Nothing awaiting verification.");
    } else {
        for pending in &dashboard.pending_verifications {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                pending.procedure_name, pending.rotation_name, pending.date, pending.count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Activity");

    if dashboard.recent_activity.is_empty() {
        let _ = writeln!(output, "No activity logged yet.");
    } else {
        for item in &dashboard.recent_activity {
            let _ = writeln!(
                output,
                "- {} on {}: {} ({})",
                item.procedure_name, item.date, item.count, item.status
            );
        }
    }

    output
}

pub fn build_overview_report(overview: &DashboardOverview, generated_on: NaiveDate) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Intern Progress Overview");
    let _ = writeln!(output, "Generated on {}", generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "- Interns: {}", overview.total_interns);
    let _ = writeln!(output, "- Pending verifications: {}", overview.pending_verifications);
    let _ = writeln!(output, "- Entries logged in the last 7 days: {}", overview.recent_activity_count);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Interns");

    if overview.interns.is_empty() {
        let _ = writeln!(output, "No interns registered.");
    } else {
        for intern in &overview.interns {
            let _ = writeln!(
                output,
                "- {}: {}% complete, {} verified, {} pending, {} over",
                intern.intern_name,
                intern.completion_percentage,
                intern.verified,
                intern.pending,
                intern.over_achieved
            );
        }
    }

    output
}
