use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hermes_wire::ValueEnvelope;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One property as printed in a report.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyRow {
    pub index: Option<u8>,
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: &'static str,
    pub value: String,
}

impl PropertyRow {
    pub fn new(index: Option<u8>, envelope: &ValueEnvelope) -> Self {
        Self {
            index,
            name: envelope.name.clone(),
            value_type: envelope.value_type().name(),
            value: envelope.value.to_string(),
        }
    }
}

/// What one side of a session learned about a slave's properties.
#[derive(Debug, Clone, Serialize)]
pub struct SlaveReport {
    pub role: &'static str,
    pub serial: String,
    pub properties: Vec<PropertyRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<PropertyRow>,
}

pub fn print_report(report: &SlaveReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            println!("{} {}", report.role, report.serial);
            println!("{}", rows_table(&report.properties));
            if !report.updates.is_empty() {
                println!("updated");
                println!("{}", rows_table(&report.updates));
            }
        }
        OutputFormat::Pretty => {
            for row in &report.properties {
                println!("{}", pretty_line(&report.serial, row));
            }
            for row in &report.updates {
                println!("{} (updated)", pretty_line(&report.serial, row));
            }
        }
    }
}

fn rows_table(rows: &[PropertyRow]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["INDEX", "NAME", "TYPE", "VALUE"]);
    for row in rows {
        table.add_row(vec![
            index_label(row.index),
            row.name.clone(),
            row.value_type.to_string(),
            row.value.clone(),
        ]);
    }
    table
}

fn pretty_line(serial: &str, row: &PropertyRow) -> String {
    format!(
        "serial={} index={} name={} type={} value={}",
        serial,
        index_label(row.index),
        row.name,
        row.value_type,
        row.value
    )
}

fn index_label(index: Option<u8>) -> String {
    index.map_or_else(|| "-".to_string(), |index| index.to_string())
}
