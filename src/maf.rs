//! Streaming reader for the CCLE DepMap mutation-call file.
//!
//! The file is tab-delimited with a fixed 33-column header. Header names are
//! normalized (lowercase, `/` and `-` to `_`, parentheses and `#` removed)
//! before the recognized fields are looked up.

use crate::error::{LoadError, Result};
use csv::{ReaderBuilder, StringRecord};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Source file name inside the data folder.
pub const INPUT_FILE_NAME: &str = "CCLE_DepMap_18q3_maf_20180718.txt";

/// Number of columns the header must carry.
pub const VALID_COLUMN_NO: usize = 33;

/// Recognized fields, in source order.
pub const FIELD_NAMES: [&str; VALID_COLUMN_NO] = [
    "hugo_symbol",
    "entrez_gene_id",
    "ncbi_build",
    "chromosome",
    "start_position",
    "end_position",
    "strand",
    "variant_classification",
    "variant_type",
    "reference_allele",
    "tumor_seq_allele1",
    "dbsnp_rs",
    "dbsnp_val_status",
    "genome_change",
    "annotation_transcript",
    "tumor_sample_barcode",
    "cdna_change",
    "codon_change",
    "protein_change",
    "isdeleterious",
    "istcgahotspot",
    "tcgahscnt",
    "iscosmichotspot",
    "cosmichscnt",
    "exac_af",
    "wes_ac",
    "sangerwes_ac",
    "sangerrecalibwes_ac",
    "rnaseq_ac",
    "hc_ac",
    "rd_ac",
    "wgs_ac",
    "broad_id",
];

const CHROMOSOME: usize = 3;
const START_POSITION: usize = 4;
const REFERENCE_ALLELE: usize = 9;
const TUMOR_SEQ_ALLELE1: usize = 10;

/// Normalize a raw header name into a field key.
///
/// ```
/// use ccle_depmap::maf::clean_column_name;
///
/// assert_eq!(clean_column_name("Hugo_Symbol"), "hugo_symbol");
/// assert_eq!(clean_column_name("ExAC_AF"), "exac_af");
/// assert_eq!(clean_column_name("Tumor-Sample/Barcode (#1)"), "tumor_sample_barcode 1");
/// ```
pub fn clean_column_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter_map(|c| match c {
            '/' | '-' => Some('_'),
            '(' | ')' | '#' => None,
            c => Some(c),
        })
        .collect()
}

/// Normalized header of a mutation-call file.
#[derive(Debug, Clone)]
pub struct MafHeader {
    names: Vec<String>,
    /// Column of each entry of [`FIELD_NAMES`]
    field_columns: Vec<usize>,
}

impl MafHeader {
    /// Validate the raw header row and locate every recognized field.
    pub fn from_record(record: &StringRecord) -> Result<Self> {
        if record.len() != VALID_COLUMN_NO {
            return Err(LoadError::SchemaMismatch {
                expected: VALID_COLUMN_NO,
                found: record.len(),
            });
        }

        let names: Vec<String> = record.iter().map(clean_column_name).collect();
        let mut index: FxHashMap<&str, usize> = FxHashMap::default();
        for (i, name) in names.iter().enumerate() {
            // First occurrence wins
            index.entry(name.as_str()).or_insert(i);
        }

        let field_columns = FIELD_NAMES
            .iter()
            .map(|field| {
                index
                    .get(field)
                    .copied()
                    .ok_or_else(|| LoadError::MissingColumn(field.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            names,
            field_columns,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One data row, with values in [`FIELD_NAMES`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MafRow {
    /// 1-based line number in the source file
    pub line: u64,
    values: Vec<String>,
}

impl MafRow {
    /// Value of a recognized field.
    pub fn get(&self, field: &str) -> Option<&str> {
        FIELD_NAMES
            .iter()
            .position(|name| *name == field)
            .map(|i| self.values[i].as_str())
    }

    #[inline]
    pub fn chromosome(&self) -> &str {
        &self.values[CHROMOSOME]
    }

    #[inline]
    pub fn start_position(&self) -> &str {
        &self.values[START_POSITION]
    }

    #[inline]
    pub fn reference_allele(&self) -> &str {
        &self.values[REFERENCE_ALLELE]
    }

    #[inline]
    pub fn tumor_seq_allele1(&self) -> &str {
        &self.values[TUMOR_SEQ_ALLELE1]
    }

    /// All recognized `(field, value)` pairs.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        FIELD_NAMES
            .iter()
            .copied()
            .zip(self.values.iter().map(String::as_str))
    }
}

/// A streaming mutation-call reader.
pub struct MafReader<R: Read> {
    reader: csv::Reader<R>,
    header: MafHeader,
    buffer: StringRecord,
}

impl MafReader<File> {
    /// Open a mutation-call file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file)
    }
}

impl<R: Read> MafReader<R> {
    /// Create a reader and validate the header row.
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut raw = StringRecord::new();
        if !reader.read_record(&mut raw)? {
            return Err(LoadError::SchemaMismatch {
                expected: VALID_COLUMN_NO,
                found: 0,
            });
        }
        let header = MafHeader::from_record(&raw)?;

        Ok(Self {
            reader,
            header,
            buffer: StringRecord::new(),
        })
    }

    pub fn header(&self) -> &MafHeader {
        &self.header
    }

    /// Read the next data row.
    pub fn read_row(&mut self) -> Result<Option<MafRow>> {
        if !self.reader.read_record(&mut self.buffer)? {
            return Ok(None);
        }

        let line = self.buffer.position().map_or(0, |p| p.line());
        if self.buffer.len() < self.header.len() {
            return Err(LoadError::MalformedRow {
                line,
                expected: self.header.len(),
                found: self.buffer.len(),
            });
        }

        let values = self
            .header
            .field_columns
            .iter()
            .map(|&column| self.buffer[column].to_string())
            .collect();

        Ok(Some(MafRow { line, values }))
    }

    /// Get an iterator over all rows.
    pub fn rows(self) -> MafRowIter<R> {
        MafRowIter { reader: self }
    }
}

/// Iterator over mutation-call rows.
pub struct MafRowIter<R: Read> {
    reader: MafReader<R>,
}

impl<R: Read> Iterator for MafRowIter<R> {
    type Item = Result<MafRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_row().transpose()
    }
}
