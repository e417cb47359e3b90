use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ignition_agent::{check_dependencies, ProbeReport, EXIT_UNAVAILABLE};
use serde::Serialize;
use std::path::PathBuf;

use super::load_spec;

#[derive(Serialize)]
struct CheckOutput<'a> {
    checked_at: DateTime<Utc>,
    all_up: bool,
    probes: &'a [ProbeReport],
}

/// Probe every dependency of every spec once.
///
/// Exits 0 only if every probe succeeded, `EX_UNAVAILABLE` otherwise.
pub(crate) async fn check(spec_paths: &[PathBuf], json: bool) -> Result<i32> {
    let mut reports = Vec::new();
    for path in spec_paths {
        let spec = load_spec(path)?;
        reports.extend(check_dependencies(&spec).await);
    }

    let checked_at = Utc::now();
    let all_up = reports.iter().all(|r| r.up);

    if json {
        let output = CheckOutput {
            checked_at,
            all_up,
            probes: &reports,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize report")?
        );
    } else {
        print!("{}", render_table(&reports, checked_at));
    }

    Ok(if all_up { 0 } else { EXIT_UNAVAILABLE })
}

fn render_table(reports: &[ProbeReport], checked_at: DateTime<Utc>) -> String {
    let mut out = format!("Checked at {}\n", checked_at.to_rfc3339());
    if reports.is_empty() {
        out.push_str("No dependencies declared\n");
        return out;
    }

    let rows: Vec<[String; 6]> = reports
        .iter()
        .map(|r| {
            [
                r.service.clone(),
                r.dependency.clone(),
                r.kind.clone(),
                r.target.clone(),
                if r.up { "UP".to_string() } else { "DOWN".to_string() },
                format!("{}ms", r.elapsed_ms),
            ]
        })
        .collect();
    let header = ["SERVICE", "DEPENDENCY", "PROBE", "TARGET", "STATUS", "TIME"];

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: &[&str]| {
        let mut s = cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ");
        s.truncate(s.trim_end().len());
        s.push('\n');
        s
    };

    out.push_str(&line(&header));
    for (row, report) in rows.iter().zip(reports) {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&line(&cells));
        if let Some(detail) = &report.detail {
            out.push_str(&format!("  -> {}\n", detail));
        }
    }
    out
}
