//! Server-side HTML rendering for pages and htmx fragments.
//!
//! Every dynamic value goes through [`escape_html`]. Renderers return
//! `fmt::Error` on write failure so handlers can answer 500.

use chrono::NaiveDateTime;
use clopus_common::{Fix, FixStats, NamespaceStats, Run, RunStatus};
use std::fmt::{self, Write};

/// Timestamp format produced by SQLite's `datetime('now')`
const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

const LOG_POLL: &str = "every 5s";
const PANEL_POLL: &str = "every 10s";

/// Everything the full page needs
#[derive(Debug, Clone, Default)]
pub struct PageData {
    pub namespaces: Vec<NamespaceStats>,
    pub current_ns: String,
    pub runs: Vec<Run>,
    pub selected_run: Option<Run>,
    pub selected_fixes: Vec<Fix>,
    /// Only present when a namespace is selected
    pub stats: Option<NamespaceStats>,
    /// Completion time of the namespace's latest finished run
    pub last_run_time: String,
    pub fix_stats: FixStats,
    pub log: String,
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode a query parameter value
pub fn encode_query(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

pub fn status_class(status: &str) -> &'static str {
    match RunStatus::parse(status) {
        Some(RunStatus::Ok) => "status-ok",
        Some(RunStatus::Fixed) => "status-fixed",
        Some(RunStatus::Failed) => "status-failed",
        Some(RunStatus::IssuesFound) => "status-issues",
        Some(RunStatus::Running) => "status-running",
        None => "status-unknown",
    }
}

/// Human duration between two SQLite timestamps, `None` if either is missing
pub fn run_duration(started_at: &str, ended_at: &str) -> Option<String> {
    let start = NaiveDateTime::parse_from_str(started_at, SQLITE_TIMESTAMP).ok()?;
    let end = NaiveDateTime::parse_from_str(ended_at, SQLITE_TIMESTAMP).ok()?;
    let secs = (end - start).num_seconds().max(0);

    Some(match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{}s", s),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, m, s) => format!("{}h {}m {}s", h, m, s),
    })
}

/// Escaped log text with `<br>` line breaks
pub fn render_log(log: &str) -> String {
    escape_html(log).replace('\n', "<br>")
}

pub fn render_stats(stats: &NamespaceStats) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_stats(&mut out, stats)?;
    Ok(out)
}

/// Runs list fragment; `selected` keeps the highlight across htmx refreshes
pub fn render_runs_list(
    runs: &[Run],
    current_ns: &str,
    selected: Option<i64>,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_runs_list(&mut out, runs, current_ns, selected)?;
    Ok(out)
}

pub fn render_run_detail(run: &Run, fixes: &[Fix]) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_run_detail(&mut out, run, fixes)?;
    Ok(out)
}

pub fn render_index(page: &PageData) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let ns_query = encode_query(&page.current_ns);

    out.push_str(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Clopus Watcher</title>
<script src="https://unpkg.com/htmx.org@1.9.12"></script>
<style>
body { font-family: system-ui, sans-serif; margin: 0; background: #0f1115; color: #e6e6e6; }
header { padding: 12px 20px; border-bottom: 1px solid #2a2f3a; display: flex; justify-content: space-between; }
main { display: grid; grid-template-columns: 220px 340px 1fr; gap: 16px; padding: 16px; }
a { color: #7aa2f7; text-decoration: none; }
.panel { background: #161a22; border: 1px solid #2a2f3a; border-radius: 8px; padding: 12px; }
.ns-list li, .run-list li { list-style: none; padding: 6px 4px; border-bottom: 1px solid #222733; }
.ns-list, .run-list { padding: 0; margin: 0; }
.ns-list li.active, .run-list li.active { background: #1f2533; }
.stats { display: flex; gap: 8px; flex-wrap: wrap; }
.stat { background: #1f2533; border-radius: 6px; padding: 8px 12px; min-width: 70px; }
.stat .value { font-size: 1.4em; font-weight: 600; }
.badge { border-radius: 4px; padding: 1px 6px; font-size: 0.8em; }
.status-ok { background: #1e4620; } .status-fixed { background: #1d3b5c; }
.status-failed { background: #5c1d1d; } .status-issues { background: #5c4a1d; }
.status-running { background: #3b3b3b; } .status-unknown { background: #333; }
pre { white-space: pre-wrap; background: #0b0d11; padding: 8px; border-radius: 6px; }
table { width: 100%; border-collapse: collapse; } td, th { text-align: left; padding: 4px; border-bottom: 1px solid #222733; }
#live-log { font-family: monospace; font-size: 0.85em; max-height: 320px; overflow-y: auto; }
.muted { color: #8a8f98; }
</style>
</head>
<body>
"#,
    );

    let fs = &page.fix_stats;
    write!(
        out,
        r#"<header><strong>Clopus Watcher</strong><span class="muted">fixes: {} total · {} success · {} failed · {} pending</span></header>
<main>
<section class="panel"><h3>Namespaces</h3><ul class="ns-list">
"#,
        fs.total, fs.success, fs.failed, fs.pending
    )?;

    if page.namespaces.is_empty() {
        out.push_str("<li class=\"muted\">No runs recorded yet</li>\n");
    }
    for ns in &page.namespaces {
        let active = if ns.namespace == page.current_ns { " class=\"active\"" } else { "" };
        writeln!(
            out,
            r#"<li{}><a href="/?ns={}">{}</a> <span class="muted">{} runs · {} ok · {} fixed · {} failed</span></li>"#,
            active,
            encode_query(&ns.namespace),
            escape_html(&ns.namespace),
            ns.run_count,
            ns.ok_count,
            ns.fixed_count,
            ns.failed_count
        )?;
    }
    out.push_str("</ul></section>\n");

    out.push_str("<section class=\"panel\">\n");
    if let Some(stats) = &page.stats {
        write!(
            out,
            r#"<div id="stats" hx-get="/partials/stats?ns={}" hx-trigger="{}" hx-swap="innerHTML">"#,
            ns_query, PANEL_POLL
        )?;
        write_stats(&mut out, stats)?;
        out.push_str("</div>\n");
        let last = if page.last_run_time.is_empty() { "never" } else { page.last_run_time.as_str() };
        writeln!(out, r#"<p class="muted">Last completed run: {}</p>"#, escape_html(last))?;
    }
    let selected_id = page.selected_run.as_ref().map(|r| r.id);
    let run_query = selected_id.map(|id| format!("&amp;run={}", id)).unwrap_or_default();
    write!(
        out,
        r#"<h3>Runs</h3><div id="runs" hx-get="/partials/runs?ns={}{}" hx-trigger="{}" hx-swap="innerHTML">"#,
        ns_query, run_query, PANEL_POLL
    )?;
    write_runs_list(&mut out, &page.runs, &page.current_ns, selected_id)?;
    out.push_str("</div></section>\n");

    out.push_str("<section class=\"panel\">\n<div id=\"run-detail\">");
    match &page.selected_run {
        Some(run) => write_run_detail(&mut out, run, &page.selected_fixes)?,
        None => out.push_str("<p class=\"muted\">Select a run to see its details.</p>"),
    }
    out.push_str("</div>\n");

    write!(
        out,
        r#"<h3>Live log</h3><div id="live-log" hx-get="/partials/log" hx-trigger="{}" hx-swap="innerHTML">{}</div>
</section>
</main>
</body>
</html>
"#,
        LOG_POLL,
        render_log(&page.log)
    )?;

    Ok(out)
}

fn write_stats(out: &mut String, stats: &NamespaceStats) -> fmt::Result {
    write!(
        out,
        r#"<div class="stats">
<div class="stat"><div class="value">{}</div><div class="muted">Runs</div></div>
<div class="stat status-ok"><div class="value">{}</div><div>OK</div></div>
<div class="stat status-fixed"><div class="value">{}</div><div>Fixed</div></div>
<div class="stat status-failed"><div class="value">{}</div><div>Failed</div></div>
</div>"#,
        stats.run_count, stats.ok_count, stats.fixed_count, stats.failed_count
    )
}

fn write_runs_list(
    out: &mut String,
    runs: &[Run],
    current_ns: &str,
    selected: Option<i64>,
) -> fmt::Result {
    if runs.is_empty() {
        out.push_str("<p class=\"muted\">No runs for this namespace yet.</p>");
        return Ok(());
    }

    out.push_str("<ul class=\"run-list\">\n");
    for run in runs {
        let active = if selected == Some(run.id) { " class=\"active\"" } else { "" };
        writeln!(
            out,
            r#"<li{}><a href="/?ns={}&amp;run={}">#{}</a> <span class="badge {}">{}</span> <span class="muted">{}</span><br><span class="muted">{} pods · {} errors · {} fixes</span></li>"#,
            active,
            encode_query(current_ns),
            run.id,
            run.id,
            status_class(&run.status),
            escape_html(&run.status),
            escape_html(&run.started_at),
            run.pod_count,
            run.error_count,
            run.fix_count
        )?;
    }
    out.push_str("</ul>");
    Ok(())
}

fn write_run_detail(out: &mut String, run: &Run, fixes: &[Fix]) -> fmt::Result {
    writeln!(
        out,
        r#"<h3>Run #{} <span class="badge {}">{}</span></h3>"#,
        run.id,
        status_class(&run.status),
        escape_html(&run.status)
    )?;

    let ended = if run.ended_at.is_empty() { "in progress" } else { run.ended_at.as_str() };
    write!(
        out,
        r#"<p class="muted">{} · mode {} · started {} · ended {}"#,
        escape_html(&run.namespace),
        escape_html(&run.mode),
        escape_html(&run.started_at),
        escape_html(ended)
    )?;
    if let Some(duration) = run_duration(&run.started_at, &run.ended_at) {
        write!(out, " · took {}", duration)?;
    }
    out.push_str("</p>\n");

    writeln!(
        out,
        r#"<div class="stats"><div class="stat"><div class="value">{}</div><div class="muted">Pods</div></div><div class="stat"><div class="value">{}</div><div class="muted">Errors</div></div><div class="stat"><div class="value">{}</div><div class="muted">Fixes</div></div></div>"#,
        run.pod_count, run.error_count, run.fix_count
    )?;

    if !run.report.is_empty() {
        writeln!(out, "<h4>Report</h4><pre>{}</pre>", escape_html(&run.report))?;
    }
    if !run.log.is_empty() {
        writeln!(out, "<h4>Run log</h4><pre>{}</pre>", escape_html(&run.log))?;
    }

    out.push_str("<h4>Fixes</h4>\n");
    if fixes.is_empty() {
        out.push_str("<p class=\"muted\">No fixes recorded for this run.</p>");
        return Ok(());
    }

    out.push_str(
        "<table><thead><tr><th>Time</th><th>Pod</th><th>Error</th><th>Fix</th><th>Status</th></tr></thead><tbody>\n",
    );
    for fix in fixes {
        writeln!(
            out,
            r#"<tr><td>{}</td><td>{}</td><td><strong>{}</strong><br><span class="muted">{}</span></td><td>{}</td><td>{}</td></tr>"#,
            escape_html(&fix.timestamp),
            escape_html(&fix.pod_name),
            escape_html(&fix.error_type),
            escape_html(&fix.error_message),
            escape_html(&fix.fix_applied),
            escape_html(&fix.status)
        )?;
    }
    out.push_str("</tbody></table>");
    Ok(())
}
