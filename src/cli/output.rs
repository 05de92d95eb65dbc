//! Output formatting helpers for CLI commands

use crate::session::{SessionReport, StopReason};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

/// Colored one-line stop reason
pub fn stop_reason_label(reason: &StopReason) -> String {
    let text = reason.to_string();
    match reason {
        StopReason::EndOfStream | StopReason::MaxFrames { .. } => text.green().to_string(),
        StopReason::Cancelled => text.yellow().to_string(),
        _ => text.red().to_string(),
    }
}

/// Format the end-of-session report as a two-column table
pub fn format_report_table(report: &SessionReport) -> String {
    let kpi = &report.kpi;
    let cb = &report.resilience;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Metric", "Value"]);

    let rows: Vec<(&str, String)> = vec![
        ("Run", report.run_id.clone()),
        ("Stop reason", stop_reason_label(&report.stop_reason)),
        ("Elapsed", format!("{:.1}s", report.elapsed.as_secs_f64())),
        ("Frames fetched", kpi.frames_fetched.to_string()),
        ("Frames processed", kpi.frames_processed.to_string()),
        ("Frames skipped (degraded)", kpi.frames_skipped_degraded.to_string()),
        ("Duplicate frames", kpi.duplicate_frames.to_string()),
        ("Duplicate submits skipped", kpi.duplicate_submits_skipped.to_string()),
        ("Sent ok", kpi.send_ok.to_string()),
        ("Sent ok (fallback)", kpi.send_fallback_ok.to_string()),
        ("Send failures", kpi.send_fail.to_string()),
        ("Permanent rejects", kpi.send_permanent_reject.to_string()),
        ("Preflight rejected", kpi.preflight_rejected.to_string()),
        ("Payloads clipped", kpi.payload_clipped.to_string()),
        ("Stale results dropped", kpi.stale_results_dropped.to_string()),
        ("Fetch transient errors", kpi.fetch_transient_errors.to_string()),
        (
            "Timeouts (meta/image/submit)",
            format!(
                "{}/{}/{}",
                kpi.timeouts.frame_meta, kpi.timeouts.image, kpi.timeouts.submit
            ),
        ),
        (
            "Localization (gps/optical flow)",
            format!("{}/{}", kpi.mode_gps, kpi.mode_optical_flow),
        ),
        ("Breaker opened", cb.breaker_open_count.to_string()),
        ("Degraded entries", cb.degrade_entries.to_string()),
        ("Degraded frames", cb.degrade_frames.to_string()),
        ("Recoveries", cb.recovered_count.to_string()),
        (
            "Unhealthy wall time",
            format!("{:.1}s", cb.transient_wall_time_seconds),
        ),
    ];

    for (metric, value) in rows {
        table.add_row(vec![Cell::new(metric), Cell::new(value)]);
    }

    table.to_string()
}

/// Format the end-of-session report as JSON
pub fn format_report_json(report: &SessionReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
