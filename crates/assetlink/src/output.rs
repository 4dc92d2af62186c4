use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

/// Print a small result record in the selected format.
///
/// JSON emits one object per line; table and pretty render the same
/// key/value pairs for humans. Raw prints just the values.
pub fn print_report(fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let mut obj = Map::new();
            for (key, value) in fields {
                obj.insert((*key).to_string(), Value::String(value.clone()));
            }
            println!(
                "{}",
                serde_json::to_string(&Value::Object(obj)).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(fields.iter().map(|(key, _)| key.to_uppercase()));
            table.add_row(fields.iter().map(|(_, value)| value.clone()));
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = fields
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
        OutputFormat::Raw => {
            for (_, value) in fields {
                println!("{value}");
            }
        }
    }
}

