use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::geocode::Coordinates;

pub const LAT_COLUMN: &str = "lat";
pub const LNG_COLUMN: &str = "lng";
pub const ACCURACY_COLUMN: &str = "geocode_accuracy";

const GEOCODE_COLUMNS: [&str; 3] = [LAT_COLUMN, LNG_COLUMN, ACCURACY_COLUMN];

/// One record of the table, keyed by column name in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == column)
            .map(|(_, value)| value.as_str())
    }

    /// Overwrites `column` in place, appending it when the row lacks it.
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| key == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, value)| value.as_str())
    }

    pub fn has_coordinates(&self) -> bool {
        is_present(self.get(LAT_COLUMN)) && is_present(self.get(LNG_COLUMN))
    }

    pub fn apply_coordinates(&mut self, coordinates: &Coordinates) {
        self.set(LAT_COLUMN, coordinates.lat.to_string());
        self.set(LNG_COLUMN, coordinates.lng.to_string());
        self.set(ACCURACY_COLUMN, coordinates.accuracy.clone());
    }
}

fn is_present(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        Some(text) => !text.is_empty() && !text.eq_ignore_ascii_case("null"),
        None => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut Row> {
        self.rows.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends `lat`, `lng` and `geocode_accuracy` to the header and to every
    /// row that lacks them, so successful rows never outgrow the header.
    pub fn ensure_geocode_columns(&mut self) {
        for column in GEOCODE_COLUMNS {
            if self.columns.iter().any(|existing| existing == column) {
                continue;
            }
            self.columns.push(column.to_string());
            for row in &mut self.rows {
                if row.get(column).is_none() {
                    row.set(column, "");
                }
            }
        }
    }
}

pub fn load_table(path: &Path) -> AppResult<Table> {
    let file = File::open(path)?;
    let table = read_table(file)?;
    debug!(path = %path.display(), rows = table.len(), "loaded table");
    Ok(table)
}

pub fn read_table<R: Read>(reader: R) -> AppResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut seen = HashSet::new();
    for column in &columns {
        if !seen.insert(column.as_str()) {
            return Err(AppError::Config(format!(
                "duplicate column `{column}` in table header"
            )));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(Row::from_pairs(
            columns.iter().map(String::as_str).zip(record.iter()),
        ));
    }
    Ok(Table::new(columns, rows))
}

/// Replaces `path` with the serialized table. The bytes land in a sibling
/// `.partial` file first and are renamed into place once synced.
pub fn write_checkpoint(table: &Table, path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let staging = staging_path(path);
    if let Err(err) = write_staging(table, &staging) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    fs::rename(&staging, path)?;
    debug!(path = %path.display(), rows = table.len(), "checkpoint written");
    Ok(())
}

/// Serializes the table with a header taken from the first row's keys and
/// hands the writer back.
pub fn write_table<W: Write>(table: &Table, writer: W) -> AppResult<W> {
    let header: Vec<&str> = match table.rows.first() {
        Some(first) => first.keys().collect(),
        None => table.columns.iter().map(String::as_str).collect(),
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    csv_writer.write_record(&header)?;

    for (index, row) in table.rows.iter().enumerate() {
        if !row.keys().eq(header.iter().copied()) {
            return Err(AppError::RowShape {
                row: index + 1,
                detail: format!(
                    "expected columns [{}], found [{}]",
                    header.join(", "),
                    row.keys().collect::<Vec<_>>().join(", ")
                ),
            });
        }
        csv_writer.write_record(row.values())?;
    }

    csv_writer
        .into_inner()
        .map_err(|err| AppError::Io(err.into_error()))
}

fn write_staging(table: &Table, staging: &Path) -> AppResult<()> {
    let file = File::create(staging)?;
    let mut file = write_table(table, file)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "checkpoint".into());
    name.push(".partial");
    path.with_file_name(name)
}
