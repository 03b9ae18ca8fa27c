//! External merge sort for delimited files.
//!
//! Sorts files larger than memory by spilling sorted chunks to disk and
//! merging them back.
//!
//! # Algorithm
//!
//! 1. **Split**: stream rows into a chunk until its approximate in-memory
//!    size crosses `max_size_bytes`, then sort the chunk and spill it
//! 2. **Merge**: merge spill files `nway` at a time into a new spill file,
//!    deleting the inputs, until one file remains
//! 3. **Finalize**: write the header (if any) and the merged rows to a
//!    staged file next to the output, which defaults to the input path, and
//!    rename it into place once every row is written
//!
//! Rows compare by the natural key of each selected column in turn (see
//! [`natural`]); equal keys keep their input order. Spill files live in a
//! temporary directory that is removed when the sort returns, whether it
//! succeeded or not.

mod columns;
pub mod natural;
mod spill;

pub use columns::{resolve_columns, ColumnSelector};
pub use natural::{natural_compare, NaturalKey};

use crate::config::SortConfig;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::{debug, info, log, Level};
use spill::{merge_spills, Chunk, SpillReader, SpillRow};
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};
use thiserror::Error;

/// Errors that can occur while sorting.
#[derive(Error, Debug)]
pub enum SortError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column resolution error: {0}")]
    ColumnResolution(String),

    #[error("Malformed row {row} in {}: {record:?}", .file.display())]
    MalformedRow {
        file: PathBuf,
        row: u64,
        record: Vec<String>,
    },

    #[error("Field of {len} bytes at row {row} exceeds the field size limit ({limit})")]
    FieldTooLarge { row: u64, len: usize, limit: usize },

    #[error("Corrupt spill file {}: {message}", .file.display())]
    CorruptSpill { file: PathBuf, message: String },

    #[error("Invalid sort configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SortError>;

/// Statistics from one sort.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SortStats {
    pub rows: u64,
    pub spill_files: usize,
    pub merge_rounds: usize,
}

impl fmt::Display for SortStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rows: {}, Spill files: {}, Merge rounds: {}",
            self.rows, self.spill_files, self.merge_rounds
        )
    }
}

/// Disk-backed sorter for delimited files.
#[derive(Debug, Clone, Default)]
pub struct ExternalSorter {
    config: SortConfig,
}

impl ExternalSorter {
    pub fn new(config: SortConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Sort `input` on `columns`, writing to `output` or back over `input`.
    pub fn sort<P: AsRef<Path>>(
        &self,
        input: P,
        columns: &[ColumnSelector],
        output: Option<&Path>,
    ) -> Result<SortStats> {
        let input = input.as_ref();
        let output = output.unwrap_or(input);
        self.validate()?;

        let spill_dir = self.create_spill_dir()?;
        let mut stats = SortStats::default();

        let mut reader = ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(input)?;

        let mut header = None;
        if self.config.has_header {
            let mut record = StringRecord::new();
            if reader.read_record(&mut record)? {
                header = Some(record);
            }
        }

        let columns = resolve_columns(columns, header.as_ref())?;
        debug!("Sorting {} on columns {:?}", input.display(), columns);

        // Split phase
        let mut spills: Vec<PathBuf> = Vec::new();
        let mut chunk = Chunk::default();

        for result in reader.records() {
            let record = result?;
            let row = record.position().map_or(stats.rows + 1, |p| p.line());
            self.check_field_sizes(&record, row)?;

            let key = natural::row_key(&record, &columns).ok_or_else(|| {
                SortError::MalformedRow {
                    file: input.to_path_buf(),
                    row,
                    record: record.iter().map(str::to_string).collect(),
                }
            })?;
            chunk.push(SpillRow {
                key,
                seq: stats.rows,
                record,
            });
            stats.rows += 1;

            if chunk.approx_bytes() > self.config.max_size_bytes {
                let path = spill_dir
                    .path()
                    .join(format!("split_{:04}.csv", spills.len()));
                let n = chunk.spill(&path, self.config.threads)?;
                debug!("Spilled {} rows to {}", n, path.display());
                spills.push(path);
            }
        }
        drop(reader);

        if spills.is_empty() {
            debug!("All {} rows fit in memory", stats.rows);
            let rows = chunk.take_sorted(self.config.threads);
            self.write_output(
                output,
                header.as_ref(),
                rows.into_iter().map(|row| Ok(row.record)),
            )?;
            return Ok(stats);
        }

        if !chunk.is_empty() {
            let path = spill_dir
                .path()
                .join(format!("split_{:04}.csv", spills.len()));
            chunk.spill(&path, self.config.threads)?;
            spills.push(path);
        }
        stats.spill_files = spills.len();

        let level = if self.config.show_progress {
            Level::Info
        } else {
            Level::Debug
        };
        log!(level, "Merging {} splits", spills.len());

        // Merge phase
        let mut queue: VecDeque<PathBuf> = spills.into();
        while queue.len() > 1 {
            let take = self.config.nway.min(queue.len());
            let inputs: Vec<PathBuf> = queue.drain(..take).collect();
            let merged = spill_dir
                .path()
                .join(format!("merge_{:04}.csv", stats.merge_rounds));
            let n = merge_spills(&inputs, &merged, &columns)?;
            for path in &inputs {
                fs::remove_file(path)?;
            }
            stats.merge_rounds += 1;
            log!(
                level,
                "Merge round {}: {} files, {} rows",
                stats.merge_rounds,
                inputs.len(),
                n
            );
            queue.push_back(merged);
        }

        // Finalize
        if let Some(sorted) = queue.pop_front() {
            let mut reader = SpillReader::open(&sorted, &columns)?;
            let rows = std::iter::from_fn(|| reader.next_row().transpose());
            self.write_output(output, header.as_ref(), rows.map(|r| r.map(|row| row.record)))?;
            fs::remove_file(&sorted)?;
        }

        info!("Sorted {}: {}", input.display(), stats);
        Ok(stats)
    }

    fn validate(&self) -> Result<()> {
        if self.config.nway < 2 {
            return Err(SortError::InvalidConfig(format!(
                "nway must be at least 2, got {}",
                self.config.nway
            )));
        }
        Ok(())
    }

    fn create_spill_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("csvsort");
        let dir = match &self.config.temp_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    fn check_field_sizes(&self, record: &StringRecord, row: u64) -> Result<()> {
        let limit = self.config.field_size_limit;
        match record.iter().map(str::len).find(|&len| len > limit) {
            Some(len) => Err(SortError::FieldTooLarge { row, len, limit }),
            None => Ok(()),
        }
    }

    /// Write rows to a staged file in the output's directory and rename it
    /// over `output` only after every row is written. On error `output` is
    /// left as it was and the staged file is removed.
    fn write_output<I>(&self, output: &Path, header: Option<&StringRecord>, rows: I) -> Result<()>
    where
        I: Iterator<Item = Result<StringRecord>>,
    {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(dir)?;

        {
            let mut writer = WriterBuilder::new()
                .delimiter(self.config.delimiter)
                .quote_style(self.config.quote_style)
                .flexible(true)
                .from_writer(&mut staged);

            if let Some(header) = header {
                writer.write_record(header)?;
            }
            for row in rows {
                writer.write_record(&row?)?;
            }
            writer.flush()?;
        }

        staged.persist(output).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Sort a delimited file on disk. See [`ExternalSorter::sort`].
///
/// # Example
///
/// ```no_run
/// use ccle_depmap::config::SortConfig;
/// use ccle_depmap::sort::{csvsort, ColumnSelector};
///
/// let config = SortConfig::default().has_header(false);
/// csvsort("alldata.csv", &[ColumnSelector::Index(0)], None, &config).unwrap();
/// ```
pub fn csvsort<P: AsRef<Path>>(
    input: P,
    columns: &[ColumnSelector],
    output: Option<&Path>,
    config: &SortConfig,
) -> Result<SortStats> {
    ExternalSorter::new(config.clone()).sort(input, columns, output)
}
