use std::io::{IsTerminal, Write};
use std::time::SystemTime;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use kwbus_hub::keywords;
use kwbus_transport::cache::unix_millis;
use serde::Serialize;

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

#[derive(Serialize)]
struct UpdateOutput<'a> {
    keyword: &'a str,
    well_known: bool,
    size: usize,
    payload: &'a str,
    /// Milliseconds since the Unix epoch at which the update was printed.
    timestamp: i64,
}

pub fn print_update(keyword: &str, payload: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = UpdateOutput {
                keyword,
                well_known: keywords::is_well_known(keyword),
                size: payload.len(),
                payload,
                timestamp: unix_millis(SystemTime::now()),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KEYWORD", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    keyword.to_string(),
                    payload.len().to_string(),
                    payload.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "keyword={} size={} payload={}",
                keyword,
                payload.len(),
                payload.escape_debug()
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

pub fn print_raw(payload: &str) {
    let mut out = std::io::stdout();
    let _ = out.write_all(payload.as_bytes());
    if !payload.ends_with('\n') {
        let _ = out.write_all(b"\n");
    }
    let _ = out.flush();
}
