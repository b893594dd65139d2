use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{EngineError, EngineResult};

/// A flat table of string cells: the shape every input arrives in and every
/// output leaves in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// A required input column and the alternative header names exports use for it.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

impl ColumnSpec {
    pub const fn new(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases }
    }

    fn matches(&self, header: &str) -> bool {
        header == self.name || self.aliases.contains(&header)
    }
}

/// Column positions resolved against a table, in the order they were requested.
#[derive(Debug, Clone)]
pub struct Columns {
    indices: Vec<usize>,
}

impl Columns {
    /// Trimmed cell for the `position`-th requested column. Short rows read as blank.
    pub fn cell<'a>(&self, row: &'a [String], position: usize) -> &'a str {
        self.indices
            .get(position)
            .and_then(|&index| row.get(index))
            .map(|cell| cell.trim())
            .unwrap_or("")
    }
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_rows<I, S>(headers: I, rows: Vec<Vec<String>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(headers);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row, padding short rows with blanks. Rows wider than the
    /// header are kept whole so normalization can exclude them.
    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cells: Vec<String> = row.into_iter().map(Into::into).collect();
        if cells.len() < self.headers.len() {
            cells.resize(self.headers.len(), String::new());
        } else if cells.len() > self.headers.len() {
            log::warn!(
                "row {} has {} cells for {} columns",
                self.rows.len() + 1,
                cells.len(),
                self.headers.len()
            );
        }
        self.rows.push(cells);
    }

    /// Resolves required columns by name, case-insensitively, failing with the
    /// full list of missing names.
    pub fn columns(&self, dataset: &str, specs: &[ColumnSpec]) -> EngineResult<Columns> {
        let normalized: Vec<String> = self
            .headers
            .iter()
            .map(|header| header.trim_start_matches('\u{feff}').trim().to_lowercase())
            .collect();

        let mut indices = Vec::with_capacity(specs.len());
        let mut missing = Vec::new();
        for spec in specs {
            match normalized.iter().position(|header| spec.matches(header)) {
                Some(index) => indices.push(index),
                None => missing.push(spec.name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(EngineError::MissingColumns {
                dataset: dataset.to_string(),
                missing,
            });
        }
        Ok(Columns { indices })
    }

    /// Resolves a column that may be absent from some exports.
    pub fn optional_column(&self, spec: &ColumnSpec) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| spec.matches(&header.trim_start_matches('\u{feff}').trim().to_lowercase()))
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let mut table = Self::new(headers);
        for record in reader.records() {
            let record = record?;
            table.push_row(record.iter());
        }
        Ok(table)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, csv::Error> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, csv::Error> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
