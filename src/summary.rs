//! Consolidated batch report handed to whoever notifies people.

use chrono::{DateTime, Local};
use html_escape::encode_text;

use crate::runner::{BatchSummary, TargetStatus};

fn css_class(status: &TargetStatus) -> &'static str {
    match status {
        TargetStatus::Failed { .. } => "failed",
        TargetStatus::Verified(r) if r.file_changed || r.spec_changed => "changed",
        TargetStatus::Verified(_) => "unchanged",
    }
}

fn message(status: &TargetStatus) -> String {
    match status {
        TargetStatus::Verified(report) => report.narrative.clone(),
        TargetStatus::Failed { message, .. } => format!("Verification failed: {}", message),
    }
}

pub fn render_summary(summary: &BatchSummary, generated_at: &DateTime<Local>) -> String {
    let mut body = String::new();
    body.push_str(
        r#"<!DOCTYPE html><html lang="en"><head><meta charset="UTF-8"><title>Monitoring report</title>
<style>
body { font-family: sans-serif; line-height: 1.6; color: #3e5055; }
.container { max-width: 800px; margin: 20px auto; padding: 20px; }
h1 { color: #00A335; }
ul { list-style-type: none; padding-left: 0; }
li { margin-bottom: 10px; padding: 10px; border-left: 4px solid #ccc; background-color: #EBEEEE; }
li.changed { border-left-color: #d72736; }
li.unchanged { border-left-color: #00A335; }
li.failed { border-left-color: #EAB42A; }
strong { display: block; font-size: 1.1em; }
</style>
</head><body><div class="container">
<h1>Monitoring report</h1>
"#,
    );
    body.push_str(&format!(
        "<p>All pages were checked on {}. Summary:</p><ul>\n",
        generated_at.format("%Y-%m-%d at %H:%M:%S")
    ));

    for result in &summary.results {
        body.push_str(&format!(
            "<li class=\"{}\"><strong>{}</strong>{}</li>\n",
            css_class(&result.status),
            encode_text(&result.target.name),
            encode_text(&message(&result.status)),
        ));
    }

    body.push_str("</ul></div></body></html>");
    body
}

/// Plain-text table for the terminal.
pub fn render_table(summary: &BatchSummary) -> String {
    let mut out = format!("{:<28} | {:<10} | {}\n", "Target", "Result", "Details");
    out.push_str(&"-".repeat(80));
    out.push('\n');
    for result in &summary.results {
        out.push_str(&format!(
            "{:<28} | {:<10} | {}\n",
            truncate(&result.target.name, 28),
            css_class(&result.status),
            message(&result.status)
        ));
    }
    out
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::compare::Outcome;
    use crate::config::Target;
    use crate::runner::TargetResult;
    use crate::verify::ChangeReport;

    fn verified(name: &str, outcome: Outcome) -> TargetResult {
        TargetResult {
            target: Target {
                name: name.into(),
                url: format!("https://vendor.test/{}", name),
            },
            status: TargetStatus::Verified(ChangeReport {
                outcome,
                file_changed: outcome.file_changed(),
                spec_changed: outcome.spec_changed(),
                diff_fragment: None,
                narrative: outcome.narrative(),
            }),
        }
    }

    fn sample() -> BatchSummary {
        BatchSummary {
            results: vec![
                verified("A&B", Outcome::FileChanged),
                verified("C", Outcome::Unchanged),
                TargetResult {
                    target: Target {
                        name: "D".into(),
                        url: "https://vendor.test/d".into(),
                    },
                    status: TargetStatus::Failed {
                        kind: "FetchError",
                        message: "HTTP 503".into(),
                    },
                },
            ],
        }
    }

    #[test]
    fn html_summary_classifies_targets() {
        let at = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let html = render_summary(&sample(), &at);
        assert!(html.contains("checked on 2026-01-02 at 03:04:05"));
        assert!(html.contains(r#"<li class="changed"><strong>A&amp;B</strong>Changes detected: The datasheet file changed.</li>"#));
        assert!(html.contains(r#"<li class="unchanged"><strong>C</strong>No changes detected.</li>"#));
        assert!(html.contains(r#"<li class="failed"><strong>D</strong>Verification failed: HTTP 503</li>"#));
    }

    #[test]
    fn markup_in_messages_is_escaped() {
        let failed = BatchSummary {
            results: vec![TargetResult {
                target: Target {
                    name: "RX \"9\" <beta>".into(),
                    url: "https://vendor.test/rx9".into(),
                },
                status: TargetStatus::Failed {
                    kind: "ParseError",
                    message: "bad <body> & more".into(),
                },
            }],
        };
        let at = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let html = render_summary(&failed, &at);
        assert!(html.contains("<strong>RX \"9\" &lt;beta&gt;</strong>"));
        assert!(html.contains("Verification failed: bad &lt;body&gt; &amp; more"));
    }

    #[test]
    fn table_keeps_order() {
        let table = render_table(&sample());
        let rows: Vec<&str> = table.lines().skip(2).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("A&B"));
        assert!(rows[2].contains("failed"));
    }

    #[test]
    fn truncate_long_names() {
        assert_eq!(truncate("abcdefgh", 6), "abc...");
        assert_eq!(truncate("abc", 6), "abc");
    }
}
