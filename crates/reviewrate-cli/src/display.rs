//! Plain-text tables for run and status output.

use reviewrate_pipeline::{Backlog, PartitionReport};

// ── Public API ──

/// Per-partition before/after counts and rejection breakdown of a run.
pub fn print_run_report(partitions: &[PartitionReport]) {
    let rows: Vec<Vec<String>> = partitions
        .iter()
        .map(|p| {
            vec![
                p.partition.clone(),
                p.backlog.to_string(),
                p.initial_count.to_string(),
                p.final_count.to_string(),
                p.newly_processed().to_string(),
                p.deferred.to_string(),
                rejected_summary(p),
            ]
        })
        .collect();
    print_table(
        &["partition", "backlog", "before", "after", "new", "deferred", "rejected"],
        &rows,
    );
}

/// Sampled, done and remaining counts per partition.
pub fn print_backlogs(backlogs: &[Backlog]) {
    let rows: Vec<Vec<String>> = backlogs
        .iter()
        .map(|b| {
            vec![
                b.partition.clone(),
                b.sampled.to_string(),
                b.already_done.to_string(),
                b.len().to_string(),
            ]
        })
        .collect();
    print_table(&["partition", "sampled", "done", "backlog"], &rows);
}

// ── Formatting ──

fn rejected_summary(p: &PartitionReport) -> String {
    let rejected = p.rejected();
    if rejected.is_empty() {
        return "-".into();
    }
    rejected
        .iter()
        .map(|(kind, n)| format!("{kind}={n}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_table(header: &[&str], rows: &[Vec<String>]) {
    print!("{}", render_table(header, rows));
}

fn render_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&render_line(header.iter().copied(), &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in rows {
        out.push_str(&render_line(row.iter().map(String::as_str), &widths));
    }
    out
}

fn render_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(c, &w)| format!("{c:<w$}"))
        .collect();
    let mut line = padded.join("  ").trim_end().to_string();
    line.push('\n');
    line
}
