//! Output formatting for the rowq CLI.
//!
//! [`OutputWriter`] renders command results either as a human-readable table or as
//! pretty-printed JSON.

use serde::Serialize;
use tabled::{Table, Tabled};

pub enum OutputWriter {
    /// Display results in a human-readable table
    Table(TableOutputWriter),
    /// Display results as JSON
    Json(JsonOutputWriter),
}

impl OutputWriter {
    /// Pick a writer from the `--format` flag. Anything but `json` renders a table.
    pub fn from_format(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => OutputWriter::Json(JsonOutputWriter),
            _ => OutputWriter::Table(TableOutputWriter),
        }
    }

    /// Write a list of items using the configured output format.
    pub fn write_list<T: Serialize + Tabled>(
        &self,
        items: &[T],
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        match self {
            OutputWriter::Table(writer) => writer.write_list(items, out),
            OutputWriter::Json(writer) => writer.write_list(items, out),
        }
    }

    /// Write a single item using the configured output format.
    pub fn write_item<T: Serialize + Tabled>(
        &self,
        item: &T,
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        match self {
            OutputWriter::Table(writer) => writer.write_item(item, out),
            OutputWriter::Json(writer) => writer.write_item(item, out),
        }
    }
}

/// Writer for formatting output as human-readable tables
pub struct TableOutputWriter;
impl TableOutputWriter {
    pub fn write_list<T: Serialize + Tabled>(
        &self,
        items: &[T],
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        let table = Table::new(items);
        writeln!(out, "{}", table)?;
        Ok(())
    }

    pub fn write_item<T: Serialize + Tabled>(
        &self,
        item: &T,
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        self.write_list(std::slice::from_ref(item), out)
    }
}

/// Writer for formatting output as JSON
pub struct JsonOutputWriter;
impl JsonOutputWriter {
    pub fn write_list<T: Serialize>(
        &self,
        items: &[T],
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(items)?;
        writeln!(out, "{}", json)?;
        Ok(())
    }

    pub fn write_item<T: Serialize>(
        &self,
        item: &T,
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(item)?;
        writeln!(out, "{}", json)?;
        Ok(())
    }
}
