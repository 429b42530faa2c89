use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{HeatmapDay, StudentRecord, Summary, SummarySource};
use crate::summary::window_start;

pub fn build_report(student: &StudentRecord, summary: &Summary, as_of: NaiveDate) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Summary");
    let _ = writeln!(
        output,
        "Generated for {} ({}) covering {} to {}",
        student.full_name,
        student.email,
        window_start(as_of),
        as_of
    );
    if summary.source == SummarySource::Estimated {
        let _ = writeln!(
            output,
            "Estimated from lifetime counters; no attendance events were recorded in this window."
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Overall attendance: {}%", summary.overall_percentage);
    let _ = writeln!(output, "- Classes held: {}", summary.total_classes);
    let _ = writeln!(
        output,
        "- Present {} / late {} / absent {}",
        summary.present, summary.late, summary.absent
    );
    if summary.skipped_records > 0 {
        let _ = writeln!(
            output,
            "- Skipped {} records with unrecognised status",
            summary.skipped_records
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Subject");
    if summary.subjects.is_empty() {
        let _ = writeln!(output, "No subjects recorded for this window.");
    } else {
        for subject in summary.subjects.iter() {
            let _ = writeln!(output, "- {}: {}%", subject.name, subject.percent);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Trend");
    if summary.monthly.is_empty() {
        let _ = writeln!(output, "No attendance recorded for this window.");
    } else {
        for month in summary.monthly.iter() {
            let _ = writeln!(output, "- {}: {}%", month.month, month.percent);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Heatmap");
    let _ = writeln!(output, "`{}`", heatmap_strip(&summary.heatmap));
    let _ = writeln!(output, "(# = present, + = late, . = absent or no record)");

    output
}

fn heatmap_strip(days: &[HeatmapDay]) -> String {
    days.iter()
        .map(|day| {
            if day.value >= 1.0 {
                '#'
            } else if day.value >= 0.5 {
                '+'
            } else {
                '.'
            }
        })
        .collect()
}
