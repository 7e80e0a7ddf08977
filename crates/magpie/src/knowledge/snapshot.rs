//! Delimited snapshot of the documentation workspace.
//!
//! One row per record, fully rewritten on each extractor run. Row order is
//! the upstream API order, so an unchanged upstream produces byte-identical
//! output.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const SNAPSHOT_HEADER: [&str; 5] = [
    "container_id",
    "container_title",
    "record_id",
    "record_title",
    "summary",
];

/// One documentation record; container_id + record_id form the natural key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub container_id: String,
    pub container_title: String,
    pub record_id: String,
    pub record_title: String,
    pub summary: String,
}

impl KnowledgeRecord {
    fn fields(&self) -> [&str; 5] {
        [
            &self.container_id,
            &self.container_title,
            &self.record_id,
            &self.record_title,
            &self.summary,
        ]
    }
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_row(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Truncate and rewrite the snapshot file
pub fn write_snapshot(path: &Path, records: &[KnowledgeRecord]) -> Result<()> {
    let mut out = String::new();
    out.push_str(&format_row(&SNAPSHOT_HEADER));
    out.push('\n');
    for record in records {
        out.push_str(&format_row(&record.fields()));
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(())
}

/// Parse quoted delimited content into rows of fields
fn parse_rows(input: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => row.push(std::mem::take(&mut field)),
                '\n' => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                '\r' => {}
                _ => field.push(c),
            }
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

/// Read the snapshot back into records, validating the header
pub fn read_snapshot(path: &Path) -> Result<Vec<KnowledgeRecord>> {
    let content = fs::read_to_string(path)?;
    let mut rows = parse_rows(&content).into_iter();

    let header = rows
        .next()
        .ok_or_else(|| anyhow!("Snapshot file is empty: {}", path.display()))?;
    if header != SNAPSHOT_HEADER {
        return Err(anyhow!("Unexpected snapshot header: {:?}", header));
    }

    let mut records = Vec::new();
    for (i, row) in rows.enumerate() {
        let [container_id, container_title, record_id, record_title, summary]: [String; 5] = row
            .try_into()
            .map_err(|row: Vec<String>| {
                anyhow!("Row {} has {} fields, expected 5", i + 2, row.len())
            })?;
        records.push(KnowledgeRecord {
            container_id,
            container_title,
            record_id,
            record_title,
            summary,
        });
    }
    Ok(records)
}
