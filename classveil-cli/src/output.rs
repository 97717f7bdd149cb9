use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

use classveil::PipelineReport;

#[derive(Debug, Serialize)]
struct PassReport {
    pass: &'static str,
    changes: usize,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    source: &'a str,
    destination: &'a str,
    classes: usize,
    passes: Vec<PassReport>,
    time_ms: u128,
}

/// Print the pass report as JSON (if `json`) or as an aligned table.
pub fn print_report(
    report: &PipelineReport,
    source: &str,
    destination: &str,
    time_ms: u128,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let run = RunReport {
            source,
            destination,
            classes: report.classes,
            passes: report
                .passes
                .iter()
                .map(|&(pass, changes)| PassReport { pass, changes })
                .collect(),
            time_ms,
        };
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Pass", "Changes"]);
    if let Some(column) = table.column_mut(1) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    for (pass, changes) in &report.passes {
        table.add_row(vec![pass.to_string(), changes.to_string()]);
    }

    println!("{source} -> {destination}");
    for line in table.to_string().lines() {
        println!("  {}", line.trim_end());
    }
    println!("  {} classes written in {time_ms} ms", report.classes);
    Ok(())
}
