use crate::models::{AttendanceRecord, Audience, NotificationMessage, PipelineStatus};
use crate::pipeline::RunOutcome;
use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::LazyLock;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));

/// Unweighted mean of the record percentages, `None` for no records.
pub fn average(records: &[AttendanceRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }

    let total: f64 = records.iter().map(|r| r.percentage).sum();
    Some(total / records.len() as f64)
}

/// Renders the student-facing report (Telegram HTML markup).
pub fn format_report(records: &[AttendanceRecord], checked_at: NaiveDateTime) -> String {
    let mut lines = vec!["📊 <b>Attendance Update</b>".to_string(), String::new()];

    for record in records {
        let tier = record.tier();
        lines.push(format!(
            "{} {}: <b>{:.2}%</b> ({})",
            tier.marker(),
            escape_html(&record.subject),
            record.percentage,
            tier.label()
        ));
    }

    if let Some(average) = average(records) {
        lines.push(String::new());
        lines.push(format!("Average: <b>{:.2}%</b>", average));
    }
    lines.push(format!(
        "Checked at: <code>{}</code>",
        checked_at.format(TIMESTAMP_FORMAT)
    ));

    lines.join("\n")
}

/// Renders the operator-facing failure notice.
pub fn format_diagnostic(
    status: PipelineStatus,
    detail: Option<&str>,
    checked_at: NaiveDateTime,
) -> String {
    let mut lines = vec![
        "⚠️ <b>Attendance check failed</b>".to_string(),
        String::new(),
        format!("Status: <b>{}</b>", status),
    ];
    if let Some(detail) = detail {
        lines.push(format!("Detail: <code>{}</code>", escape_html(detail)));
    }
    lines.push(format!(
        "Checked at: <code>{}</code>",
        checked_at.format(TIMESTAMP_FORMAT)
    ));

    lines.join("\n")
}

/// Only a successful run speaks to the student. Every failure is for the
/// operator, so a student never reads an error as if it were their attendance.
pub fn audience_for(status: PipelineStatus) -> Audience {
    match status {
        PipelineStatus::Ok => Audience::Primary,
        _ => Audience::Diagnostic,
    }
}

/// Builds the single message for a finished run.
pub fn compose_message(outcome: &RunOutcome, checked_at: NaiveDateTime) -> NotificationMessage {
    let records = outcome.extraction.records();

    match audience_for(outcome.status) {
        Audience::Primary if !records.is_empty() => NotificationMessage {
            body: format_report(records, checked_at),
            audience: Audience::Primary,
        },
        _ => NotificationMessage {
            body: format_diagnostic(outcome.status, outcome.detail.as_deref(), checked_at),
            audience: Audience::Diagnostic,
        },
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Strips the markup from a rendered message for transports without HTML.
pub fn plain_text(html: &str) -> String {
    TAG_REGEX
        .replace_all(html, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
