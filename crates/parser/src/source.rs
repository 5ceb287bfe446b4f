//! CSV reader over telemetry exports

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::{ReaderBuilder, StringRecord, Trim};

use gpufleet_model::GpuMetric;

use crate::labels::parse_labels;
use crate::{ParserError, Result};

/// Columns that must be present in the header row
const REQUIRED_COLUMNS: [&str; 3] = ["uuid", "metric_name", "value"];

/// Streaming CSV source for telemetry records.
///
/// Reads one row per [`CsvSource::read_next`] call so a slow collect tick
/// does not buffer the whole file. [`CsvSource::reset`] reopens the file
/// for loop mode.
pub struct CsvSource {
    path: PathBuf,
    reader: csv::Reader<File>,
    columns: HashMap<String, usize>,
}

impl CsvSource {
    /// Open a CSV file and index its header row
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (reader, columns) = open_reader(&path)?;
        Ok(Self {
            path,
            reader,
            columns,
        })
    }

    /// Read and parse the next row. Returns `None` at end of file.
    pub fn read_next(&mut self) -> Result<Option<GpuMetric>> {
        let mut row = StringRecord::new();
        if !self.reader.read_record(&mut row)? {
            return Ok(None);
        }
        self.parse_row(&row).map(Some)
    }

    /// Read up to `n` rows, stopping early at end of file
    pub fn read_batch(&mut self, n: usize) -> Result<Vec<GpuMetric>> {
        let mut metrics = Vec::with_capacity(n);
        for _ in 0..n {
            match self.read_next()? {
                Some(metric) => metrics.push(metric),
                None => break,
            }
        }
        Ok(metrics)
    }

    /// Reopen the file from the beginning (loop mode)
    pub fn reset(&mut self) -> Result<()> {
        let (reader, columns) = open_reader(&self.path)?;
        self.reader = reader;
        self.columns = columns;
        Ok(())
    }

    fn field<'a>(&self, row: &'a StringRecord, name: &str) -> &'a str {
        self.columns
            .get(name)
            .and_then(|&idx| row.get(idx))
            .unwrap_or("")
            .trim()
    }

    fn parse_row(&self, row: &StringRecord) -> Result<GpuMetric> {
        let mut metric = GpuMetric::new(
            self.field(row, "metric_name"),
            self.field(row, "uuid"),
            self.field(row, "value").parse().unwrap_or(0.0),
        );

        // Processing time, not the row's own timestamp column.
        metric.timestamp = Utc::now();
        metric.gpu_id = self.field(row, "gpu_id").parse().unwrap_or(0);
        metric.device = self.field(row, "device").to_owned();
        metric.model_name = self.field(row, "modelname").to_owned();
        metric.hostname = self.field(row, "hostname").to_owned();
        metric.container = self.field(row, "container").to_owned();
        metric.pod = self.field(row, "pod").to_owned();
        metric.namespace = self.field(row, "namespace").to_owned();

        let labels_raw = self.field(row, "labels_raw");
        if !labels_raw.is_empty() {
            metric.labels = parse_labels(labels_raw);
        }

        metric.validate()?;
        Ok(metric)
    }
}

/// Open a reader and build the case-insensitive header index
fn open_reader(path: &Path) -> Result<(csv::Reader<File>, HashMap<String, usize>)> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let columns = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_ascii_lowercase(), idx))
        .collect();

    Ok((reader, columns))
}

/// Check that a CSV file has the required columns and at least one
/// parseable record.
pub fn validate_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut source = CsvSource::open(path)?;

    for column in REQUIRED_COLUMNS {
        if !source.columns.contains_key(column) {
            return Err(ParserError::MissingColumn(column));
        }
    }

    match source.read_next()? {
        Some(_) => Ok(()),
        None => Err(ParserError::Empty),
    }
}

/// Count data rows without parsing them into records
pub fn count_records<P: AsRef<Path>>(path: P) -> Result<usize> {
    let file = File::open(path.as_ref())?;
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(file);

    let mut count = 0;
    let mut row = StringRecord::new();
    while reader.read_record(&mut row)? {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
#[path = "source_test.rs"]
mod tests;
