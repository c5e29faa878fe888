//! Output formatting for CLI commands.

use clap::ValueEnum;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use serde_json::{json, Map, Value};
use tablestore_core::{
    metadata_to_json, Column, ColumnValues, CompactionStats, MetadataMap, Storage, StorageState,
};

/// Output format shared by all commands.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Text of a JSON value without quotes around strings.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn at<T: serde::Serialize>(values: &[T], row: usize) -> Value {
    values
        .get(row)
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

/// JSON form of one cell.
pub fn cell(values: &ColumnValues, row: usize) -> Value {
    match values {
        ColumnValues::Long(v) => at(v, row),
        ColumnValues::Double(v) => at(v, row),
        ColumnValues::Bool(v) => at(v, row),
        ColumnValues::String(v) => at(v, row),
        ColumnValues::LongArray(v) => at(v, row),
        ColumnValues::FloatArray(v) => at(v, row),
        ColumnValues::DoubleArray(v) => at(v, row),
        ColumnValues::Mask(m) => m.row(row).map_or(Value::Null, |r| {
            json!({
                "image_id": r.image_id,
                "the_z": r.the_z,
                "the_t": r.the_t,
                "x": r.x,
                "y": r.y,
                "w": r.w,
                "h": r.h,
                "bytes": r.bytes,
            })
        }),
    }
}

/// Prints file-level facts: state, version, size and, once initialized,
/// the row and column counts.
pub fn print_info(storage: &Storage, size: u64, format: OutputFormat) -> anyhow::Result<()> {
    let state = storage.state();
    let mut info = Map::new();
    info.insert("path".into(), json!(storage.path().display().to_string()));
    info.insert("state".into(), json!(format!("{state:?}")));
    info.insert(
        "version".into(),
        storage.version().map_or(Value::Null, |v| json!(v.as_u32())),
    );
    info.insert("bytes".into(), json!(size));
    if state == StorageState::Ready {
        info.insert("rows".into(), json!(storage.row_count()?));
        info.insert("columns".into(), json!(storage.headers()?.len()));
    }

    match format {
        OutputFormat::Json => print_json(&Value::Object(info)),
        OutputFormat::Table => {
            for (key, value) in &info {
                println!("{key:<8} {}", plain(value));
            }
        }
    }
    Ok(())
}

/// Prints the schema, one line per column.
pub fn print_headers(headers: &[Column], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let columns: Vec<Value> = headers
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    json!({
                        "index": i,
                        "name": c.name(),
                        "kind": c.kind().type_name(),
                        "size": c.size(),
                        "description": c.description(),
                    })
                })
                .collect();
            print_json(&Value::Array(columns));
        }
        OutputFormat::Table => {
            let mut table = new_table(&["#", "name", "kind", "size", "description"]);
            for (i, c) in headers.iter().enumerate() {
                table.add_row(vec![
                    i.to_string(),
                    c.name().to_string(),
                    c.kind().type_name().to_string(),
                    c.size().to_string(),
                    c.description().to_string(),
                ]);
            }
            println!("{table}");
        }
    }
}

/// Prints the metadata map, reserved keys included.
pub fn print_metadata(map: &MetadataMap, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&metadata_to_json(map)),
        OutputFormat::Table => {
            let mut table = new_table(&["key", "type", "value"]);
            for (key, value) in map {
                table.add_row(vec![
                    key.clone(),
                    value.type_name().to_string(),
                    value.to_string(),
                ]);
            }
            println!("{table}");
        }
    }
}

/// Prints column values row by row, labelled with `rows`.
pub fn print_rows(columns: &[Column], rows: &[u64], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let objects: Vec<Value> = rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let mut object = Map::new();
                    object.insert("row".into(), json!(row));
                    for column in columns {
                        object.insert(column.name().to_string(), cell(column.values(), i));
                    }
                    Value::Object(object)
                })
                .collect();
            print_json(&Value::Array(objects));
        }
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("No rows.");
                return;
            }
            let mut header = vec!["row"];
            header.extend(columns.iter().map(Column::name));
            let mut table = new_table(&header);
            for (i, row) in rows.iter().enumerate() {
                let mut line = vec![row.to_string()];
                line.extend(columns.iter().map(|c| plain(&cell(c.values(), i))));
                table.add_row(line);
            }
            println!("{table}");
        }
    }
}

/// Prints matching row indices.
pub fn print_row_numbers(rows: &[u64], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!(rows)),
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("No rows.");
            } else {
                let text: Vec<String> = rows.iter().map(u64::to_string).collect();
                println!("{}", text.join(" "));
            }
        }
    }
}

/// Prints the outcome of a compaction.
pub fn print_compaction(stats: &CompactionStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!({
            "bytes_before": stats.bytes_before,
            "bytes_after": stats.bytes_after,
            "reclaimed": stats.reclaimed(),
        })),
        OutputFormat::Table => {
            println!(
                "Compacted {} -> {} bytes ({} reclaimed)",
                stats.bytes_before,
                stats.bytes_after,
                stats.reclaimed()
            );
        }
    }
}
