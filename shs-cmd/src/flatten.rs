//! Flatten Statistical API responses into CSV rows.
//!
//! Each row is one statistic of one band of one output for one interval:
//! `interval_from,interval_to,output,band,statistic,value`. Percentiles are
//! written as `percentiles.<k>`. Histograms and failed intervals are skipped.

use log::{info, warn};
use serde_json::Value;
use std::path::Path;

const HEADERS: [&str; 6] = [
    "interval_from",
    "interval_to",
    "output",
    "band",
    "statistic",
    "value",
];

#[derive(Debug, PartialEq, Clone)]
pub struct StatRow {
    pub interval_from: String,
    pub interval_to: String,
    pub output: String,
    pub band: String,
    pub statistic: String,
    pub value: String,
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_stats(rows: &mut Vec<StatRow>, template: &StatRow, prefix: &str, stats: &serde_json::Map<String, Value>) {
    for (name, value) in stats {
        let statistic = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        match value {
            Value::Object(nested) => push_stats(rows, template, &statistic, nested),
            scalar => rows.push(StatRow {
                statistic,
                value: render(scalar),
                ..template.clone()
            }),
        }
    }
}

/// Flatten every successful interval of a Statistical API response.
pub fn flatten_response(response: &Value) -> Vec<StatRow> {
    let mut rows = Vec::new();
    let Some(entries) = response.get("data").and_then(Value::as_array) else {
        return rows;
    };

    for entry in entries {
        let interval_from = entry.pointer("/interval/from").map(render).unwrap_or_default();
        let interval_to = entry.pointer("/interval/to").map(render).unwrap_or_default();
        if let Some(error) = entry.get("error") {
            warn!("Skipping interval {} - {}: {}", interval_from, interval_to, error);
            continue;
        }
        let Some(outputs) = entry.get("outputs").and_then(Value::as_object) else {
            continue;
        };
        for (output, output_value) in outputs {
            let Some(bands) = output_value.get("bands").and_then(Value::as_object) else {
                continue;
            };
            for (band, band_value) in bands {
                let Some(stats) = band_value.get("stats").and_then(Value::as_object) else {
                    continue;
                };
                let template = StatRow {
                    interval_from: interval_from.clone(),
                    interval_to: interval_to.clone(),
                    output: output.clone(),
                    band: band.clone(),
                    statistic: String::new(),
                    value: String::new(),
                };
                push_stats(&mut rows, &template, "", stats);
            }
        }
    }
    rows
}

/// Write rows with a header line to `path`.
pub fn write_csv(rows: &[StatRow], path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.write_record([
            &row.interval_from,
            &row.interval_to,
            &row.output,
            &row.band,
            &row.statistic,
            &row.value,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a saved response JSON and write its statistics as CSV.
pub fn run_flatten(response_json: &Path, output_csv: &Path) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(response_json)?;
    let response: Value = serde_json::from_str(&contents)?;
    let rows = flatten_response(&response);
    write_csv(&rows, output_csv)?;
    info!("{} statistics written to {}", rows.len(), output_csv.display());
    Ok(())
}
