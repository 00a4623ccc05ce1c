//! Status index rendering
//!
//! Human-readable `index.html` and machine-readable `status.json`, both built
//! from the same [`StatusReport`].

use std::fmt::Write as _;

use serde::Serialize;

use super::Snapshot;
use crate::sync::{DownloadOutcome, Severity};

/// Aggregate counts over all modules of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub ok: usize,
    pub degraded: usize,
    pub failed: usize,
    /// Documents rejected while parsing the catalog
    pub rejected: usize,
}

/// One row of the status page
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub identifier: String,
    pub version: String,
    pub outcome: DownloadOutcome,
    pub severity: Severity,
    pub last_updated: Option<String>,
    pub download: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A catalog document that never became a module
#[derive(Debug, Clone, Serialize)]
pub struct RejectedEntry {
    pub source_path: String,
    pub reason: String,
}

/// Everything the status page shows
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub header: String,
    pub generated_at: String,
    pub counts: StatusCounts,
    pub modules: Vec<StatusEntry>,
    pub rejected: Vec<RejectedEntry>,
}

impl StatusReport {
    pub fn from_snapshot(snapshot: &Snapshot, header: &str) -> Self {
        let modules = snapshot
            .modules()
            .iter()
            .map(|m| StatusEntry {
                identifier: m.record.identifier.clone(),
                version: m.record.version.clone(),
                outcome: m.outcome,
                severity: m.outcome.severity(),
                last_updated: m.last_updated.clone(),
                download: m.record.download_url.clone(),
                error: m.error.clone(),
            })
            .collect();

        let rejected = snapshot
            .rejected()
            .iter()
            .map(|r| RejectedEntry {
                source_path: r.source_path.clone(),
                reason: r.reason.clone(),
            })
            .collect();

        Self {
            header: header.to_string(),
            generated_at: snapshot.generated_at().to_rfc3339(),
            counts: snapshot.counts(),
            modules,
            rejected,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Render the status page
    pub fn to_html(&self) -> String {
        let header = escape_html(&self.header);
        let counts = &self.counts;

        let mut html = String::with_capacity(4096 + self.modules.len() * 256);
        let _ = write!(
            html,
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{header}</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
table {{ border-collapse: collapse; }}
th, td {{ padding: 0.25em 0.75em; border-bottom: 1px solid #ddd; text-align: left; }}
tr.ok td.outcome {{ color: #2e7d32; }}
tr.degraded td.outcome {{ color: #ef8f00; }}
tr.failed td.outcome {{ color: #c62828; }}
</style>
</head>
<body>
<h1>{header}</h1>
<p>Generated {generated}</p>
<p class="summary">{ok} ok, {degraded} degraded, {failed} failed of {total} modules</p>
"#,
            generated = escape_html(&self.generated_at),
            ok = counts.ok,
            degraded = counts.degraded,
            failed = counts.failed,
            total = counts.total,
        );

        html.push_str(
            "<table>\n<tr><th>Identifier</th><th>Version</th><th>Status</th><th>Last updated</th></tr>\n",
        );
        for entry in &self.modules {
            let _ = writeln!(
                html,
                r#"<tr class="{class}"><td>{identifier}</td><td>{version}</td><td class="outcome">{outcome}</td><td>{updated}</td></tr>"#,
                class = entry.severity.as_str(),
                identifier = escape_html(&entry.identifier),
                version = escape_html(&entry.version),
                outcome = entry.outcome,
                updated = escape_html(entry.last_updated.as_deref().unwrap_or("-")),
            );
        }
        html.push_str("</table>\n");

        if !self.rejected.is_empty() {
            let _ = writeln!(
                html,
                "<h2>Rejected documents ({})</h2>\n<ul>",
                self.rejected.len()
            );
            for entry in &self.rejected {
                let _ = writeln!(
                    html,
                    "<li><code>{}</code>: {}</li>",
                    escape_html(&entry.source_path),
                    escape_html(&entry.reason)
                );
            }
            html.push_str("</ul>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
