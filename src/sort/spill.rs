//! Spill files: sorted in-memory chunks, their on-disk form, and the k-way merge.
//!
//! A spill row is the original record prefixed by its input sequence number.
//! Rows order by `(natural key, sequence)`, which is a total order, so every
//! merge round is stable no matter how the rounds are grouped.

use super::natural::{row_key, RowKey};
use super::{Result, SortError};
use csv::{ReaderBuilder, StringRecord, Writer, WriterBuilder};
use rayon::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Fixed cost charged per buffered row.
const ROW_OVERHEAD: usize = 56;

/// Cost charged per field of a buffered row.
const FIELD_OVERHEAD: usize = 8;

/// Approximate in-memory size of a row. Not the serialized size.
#[inline]
pub(crate) fn estimate_row_size(record: &StringRecord) -> usize {
    ROW_OVERHEAD + FIELD_OVERHEAD * record.len() + record.as_slice().len()
}

#[derive(Debug, Clone)]
pub(crate) struct SpillRow {
    pub key: RowKey,
    pub seq: u64,
    pub record: StringRecord,
}

impl PartialEq for SpillRow {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.key == other.key
    }
}

impl Eq for SpillRow {}

impl Ord for SpillRow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for SpillRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Rows buffered in memory until the size threshold is crossed.
#[derive(Debug, Default)]
pub(crate) struct Chunk {
    rows: Vec<SpillRow>,
    approx_bytes: usize,
}

impl Chunk {
    pub fn push(&mut self, row: SpillRow) {
        self.approx_bytes += estimate_row_size(&row.record);
        self.rows.push(row);
    }

    pub fn approx_bytes(&self) -> usize {
        self.approx_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sort the buffered rows and hand them out, leaving the chunk empty.
    pub fn take_sorted(&mut self, threads: usize) -> Vec<SpillRow> {
        let mut rows = std::mem::take(&mut self.rows);
        self.approx_bytes = 0;
        // Keys are unique through the sequence number, so unstable is fine
        if threads > 1 {
            rows.par_sort_unstable();
        } else {
            rows.sort_unstable();
        }
        rows
    }

    /// Sort the buffered rows and write them to a new spill file.
    pub fn spill(&mut self, path: &Path, threads: usize) -> Result<usize> {
        let rows = self.take_sorted(threads);
        let mut writer = spill_writer(path)?;
        for row in &rows {
            write_spill_row(&mut writer, row)?;
        }
        writer.flush()?;
        Ok(rows.len())
    }
}

fn spill_writer(path: &Path) -> Result<Writer<File>> {
    Ok(WriterBuilder::new().flexible(true).from_path(path)?)
}

fn write_spill_row(writer: &mut Writer<File>, row: &SpillRow) -> Result<()> {
    let seq = row.seq.to_string();
    writer.write_record(std::iter::once(seq.as_str()).chain(row.record.iter()))?;
    Ok(())
}

/// Streaming reader over one spill file.
pub(crate) struct SpillReader {
    path: PathBuf,
    reader: csv::Reader<File>,
    buffer: StringRecord,
    columns: Vec<usize>,
    rows_read: u64,
}

impl SpillReader {
    pub fn open(path: &Path, columns: &[usize]) -> Result<Self> {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            buffer: StringRecord::new(),
            columns: columns.to_vec(),
            rows_read: 0,
        })
    }

    pub fn next_row(&mut self) -> Result<Option<SpillRow>> {
        if !self.reader.read_record(&mut self.buffer)? {
            return Ok(None);
        }
        self.rows_read += 1;

        let seq = self
            .buffer
            .get(0)
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| SortError::CorruptSpill {
                file: self.path.clone(),
                message: format!("missing sequence number at row {}", self.rows_read),
            })?;
        let record: StringRecord = self.buffer.iter().skip(1).collect();
        let key = row_key(&record, &self.columns).ok_or_else(|| SortError::MalformedRow {
            file: self.path.clone(),
            row: self.rows_read,
            record: record.iter().map(str::to_string).collect(),
        })?;

        Ok(Some(SpillRow { key, seq, record }))
    }
}

struct HeapEntry {
    row: SpillRow,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.row
            .cmp(&other.row)
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// K-way merge of sorted spill files into a new spill file.
///
/// Holds at most one buffered row per input. Returns the number of rows written.
pub(crate) fn merge_spills(inputs: &[PathBuf], output: &Path, columns: &[usize]) -> Result<u64> {
    let mut readers: Vec<SpillReader> = inputs
        .iter()
        .map(|path| SpillReader::open(path, columns))
        .collect::<Result<_>>()?;

    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(readers.len());
    for (source, reader) in readers.iter_mut().enumerate() {
        if let Some(row) = reader.next_row()? {
            heap.push(Reverse(HeapEntry { row, source }));
        }
    }

    let mut writer = spill_writer(output)?;
    let mut written = 0u64;

    while let Some(Reverse(entry)) = heap.pop() {
        write_spill_row(&mut writer, &entry.row)?;
        written += 1;

        if let Some(row) = readers[entry.source].next_row()? {
            heap.push(Reverse(HeapEntry {
                row,
                source: entry.source,
            }));
        }
    }

    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(value: &str, seq: u64) -> SpillRow {
        let record = StringRecord::from(vec![value, "payload"]);
        SpillRow {
            key: row_key(&record, &[0]).unwrap(),
            seq,
            record,
        }
    }

    fn read_all(path: &Path) -> Vec<(u64, String)> {
        let mut reader = SpillReader::open(path, &[0]).unwrap();
        let mut rows = Vec::new();
        while let Some(row) = reader.next_row().unwrap() {
            rows.push((row.seq, row.record[0].to_string()));
        }
        rows
    }

    #[test]
    fn test_estimate_row_size() {
        let record = StringRecord::from(vec!["abc", "de"]);
        assert_eq!(estimate_row_size(&record), ROW_OVERHEAD + 2 * FIELD_OVERHEAD + 5);
    }

    #[test]
    fn test_chunk_spill_is_sorted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("split_0000.csv");

        let mut chunk = Chunk::default();
        chunk.push(row("row10", 0));
        chunk.push(row("row2", 1));
        chunk.push(row("row2", 2));
        assert!(chunk.approx_bytes() > 0);

        assert_eq!(chunk.spill(&path, 1).unwrap(), 3);
        assert!(chunk.is_empty());
        assert_eq!(chunk.approx_bytes(), 0);

        assert_eq!(
            read_all(&path),
            vec![
                (1, "row2".to_string()),
                (2, "row2".to_string()),
                (0, "row10".to_string()),
            ]
        );
    }

    #[test]
    fn test_merge_keeps_input_order_for_ties() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        let merged = dir.path().join("merged.csv");

        let mut chunk = Chunk::default();
        chunk.push(row("k1", 0));
        chunk.push(row("k3", 2));
        chunk.spill(&a, 1).unwrap();

        chunk.push(row("k1", 1));
        chunk.push(row("k2", 3));
        chunk.spill(&b, 1).unwrap();

        // Later file first: ties still resolve by sequence
        let written = merge_spills(&[b.clone(), a.clone()], &merged, &[0]).unwrap();
        assert_eq!(written, 4);
        assert_eq!(
            read_all(&merged),
            vec![
                (0, "k1".to_string()),
                (1, "k1".to_string()),
                (3, "k2".to_string()),
                (2, "k3".to_string()),
            ]
        );
    }

    #[test]
    fn test_corrupt_spill_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "notanumber,k1\n").unwrap();

        let mut reader = SpillReader::open(&path, &[0]).unwrap();
        let err = reader.next_row().unwrap_err();
        assert!(matches!(err, SortError::CorruptSpill { .. }));
    }

    #[test]
    fn test_spill_row_missing_key_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.csv");
        std::fs::write(&path, "0,only\n").unwrap();

        let mut reader = SpillReader::open(&path, &[3]).unwrap();
        let err = reader.next_row().unwrap_err();
        assert!(matches!(err, SortError::MalformedRow { row: 1, .. }));
    }
}
