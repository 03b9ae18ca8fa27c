//! Mutation-call loader: rows to merged, HGVS-keyed variant records.
//!
//! Pipeline:
//! 1. [`MafReader`] streams rows; rows without a chromosome are skipped
//! 2. [`map_row`] computes the HGVS id and the cleaned field map
//! 3. mapped records are spilled to an intermediate CSV and ordered by id
//!    with the external sorter (or sorted in memory on request)
//! 4. [`MergeDuplicates`] folds consecutive records sharing an id
//!
//! Steps 1-3 run when the load starts; step 4 runs lazily as the returned
//! [`VariantRecords`] is consumed.

use crate::config::SortConfig;
use crate::error::{LoadError, Result};
use crate::hgvs::hgvs_id;
use crate::maf::{MafReader, MafRow, INPUT_FILE_NAME};
use crate::record::{MergeDuplicates, VariantRecord};
use crate::sort::{ColumnSelector, ExternalSorter, NaturalKey};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::{debug, info};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// How mapped records are ordered by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortStrategy {
    /// Spill to disk and use the external merge sorter
    #[default]
    External,
    /// Hold every mapped record in memory and sort there
    InMemory,
}

/// Loader options.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub strategy: SortStrategy,
    /// Sorter settings for the intermediate file
    pub sort: SortConfig,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            strategy: SortStrategy::External,
            sort: SortConfig::default().has_header(false),
        }
    }
}

/// Counters from the mapping pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub records_mapped: u64,
}

impl fmt::Display for LoadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rows: {}, Skipped (no chromosome): {}, Mapped: {}",
            self.rows_read, self.rows_skipped, self.records_mapped
        )
    }
}

/// Map one row to a record. Rows with an empty chromosome map to `None`.
///
/// A `-` alternate allele marks a deletion and a `-` reference allele an
/// insertion; both are re-anchored one base to the left on an `N`.
pub fn map_row(row: &MafRow) -> Result<Option<VariantRecord>> {
    let chromosome = row.chromosome();
    if chromosome.is_empty() {
        return Ok(None);
    }
    let chrom = if chromosome == "M" { "MT" } else { chromosome };

    let invalid_position = || LoadError::InvalidPosition {
        line: row.line,
        value: row.start_position().to_string(),
    };
    let start: u64 = row
        .start_position()
        .parse()
        .map_err(|_| invalid_position())?;

    let reference = row.reference_allele();
    let alternate = row.tumor_seq_allele1();

    let id = if alternate == "-" || reference == "-" {
        let anchor = start.checked_sub(1).ok_or_else(invalid_position)?;
        if alternate == "-" {
            hgvs_id(chrom, anchor, &format!("N{reference}"), "N")?
        } else {
            hgvs_id(chrom, anchor, "N", &format!("N{alternate}"))?
        }
    } else {
        hgvs_id(chrom, start, reference, alternate)?
    };

    Ok(Some(VariantRecord::from_raw_fields(id, row.fields())))
}

/// Lazy, single-pass sequence of merged records.
///
/// Owns the intermediate files; dropping it removes them.
pub struct VariantRecords {
    records: MergeDuplicates<Box<dyn Iterator<Item = Result<VariantRecord>>>>,
    stats: LoadStats,
    _spill_dir: Option<TempDir>,
}

impl VariantRecords {
    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }
}

impl Iterator for VariantRecords {
    type Item = Result<VariantRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }
}

impl fmt::Debug for VariantRecords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantRecords")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Records read back from the sorted intermediate file.
struct SpilledRecords {
    reader: csv::Reader<File>,
    buffer: StringRecord,
}

impl Iterator for SpilledRecords {
    type Item = Result<VariantRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_record(&mut self.buffer) {
            Ok(false) => None,
            Ok(true) => Some(VariantRecord::from_spill_row(&self.buffer)),
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Mutation-call loader.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    options: LoadOptions,
}

impl Loader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load [`INPUT_FILE_NAME`] from `data_folder`.
    pub fn load<P: AsRef<Path>>(&self, data_folder: P) -> Result<VariantRecords> {
        self.load_file(input_path(data_folder))
    }

    /// Load an explicit file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<VariantRecords> {
        let path = path.as_ref();
        info!("Loading {}", path.display());
        self.load_reader(File::open(path)?)
    }

    /// Load from any readable source.
    pub fn load_reader<R: Read>(&self, reader: R) -> Result<VariantRecords> {
        let reader = MafReader::new(reader)?;
        match self.options.strategy {
            SortStrategy::External => self.load_external(reader),
            SortStrategy::InMemory => self.load_in_memory(reader),
        }
    }

    fn load_external<R: Read>(&self, reader: MafReader<R>) -> Result<VariantRecords> {
        let spill_dir = self.create_spill_dir()?;
        let unsorted = spill_dir.path().join("alldata.csv");
        let sorted = spill_dir.path().join("alldata.sorted.csv");

        let mut writer = WriterBuilder::new().from_path(&unsorted)?;
        let stats = map_rows(reader, |record| {
            writer.write_record(&record.to_spill_row()?)?;
            Ok(())
        })?;
        writer.flush()?;
        drop(writer);
        info!("Mapped rows: {}", stats);

        let sort_stats = ExternalSorter::new(self.options.sort.clone()).sort(
            &unsorted,
            &[ColumnSelector::Index(0)],
            Some(sorted.as_path()),
        )?;
        debug!("Intermediate sort: {}", sort_stats);

        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&sorted)?;
        let records: Box<dyn Iterator<Item = Result<VariantRecord>>> = Box::new(SpilledRecords {
            reader,
            buffer: StringRecord::new(),
        });

        Ok(VariantRecords {
            records: MergeDuplicates::new(records),
            stats,
            _spill_dir: Some(spill_dir),
        })
    }

    fn load_in_memory<R: Read>(&self, reader: MafReader<R>) -> Result<VariantRecords> {
        let mut mapped = Vec::new();
        let stats = map_rows(reader, |record| {
            mapped.push(record);
            Ok(())
        })?;
        info!("Mapped rows: {}", stats);

        // Stable: duplicates keep input order
        mapped.sort_by_cached_key(|record| NaturalKey::new(&record.id));

        let records: Box<dyn Iterator<Item = Result<VariantRecord>>> =
            Box::new(mapped.into_iter().map(Ok));

        Ok(VariantRecords {
            records: MergeDuplicates::new(records),
            stats,
            _spill_dir: None,
        })
    }

    fn create_spill_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ccle-depmap");
        let dir = match &self.options.sort.temp_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

fn map_rows<R, F>(reader: MafReader<R>, mut sink: F) -> Result<LoadStats>
where
    R: Read,
    F: FnMut(VariantRecord) -> Result<()>,
{
    let mut stats = LoadStats::default();
    for row in reader.rows() {
        let row = row?;
        stats.rows_read += 1;
        match map_row(&row)? {
            Some(record) => {
                stats.records_mapped += 1;
                sink(record)?;
            }
            None => stats.rows_skipped += 1,
        }
    }
    Ok(stats)
}

/// Load the DepMap release file from `data_folder` with default options.
///
/// # Example
///
/// ```no_run
/// use ccle_depmap::loader::load_data;
///
/// for record in load_data("data/ccle").unwrap() {
///     let record = record.unwrap();
///     println!("{}", record.id);
/// }
/// ```
pub fn load_data<P: AsRef<Path>>(data_folder: P) -> Result<VariantRecords> {
    Loader::default().load(data_folder)
}

/// Path of the release file inside `data_folder`.
pub fn input_path<P: AsRef<Path>>(data_folder: P) -> PathBuf {
    data_folder.as_ref().join(INPUT_FILE_NAME)
}
