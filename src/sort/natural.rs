//! Natural ("human") ordering for cell values.
//!
//! A value is split into alternating runs of text and ASCII digits, always
//! starting and ending with a (possibly empty) text run:
//!
//! ```text
//! "chr1:g.100A>T"  ->  ["chr", 1, ":g.", 100, "A>T"]
//! "10"             ->  ["", 10, ""]
//! ```
//!
//! Digit runs compare by numeric value with no width limit, so `row2` sorts
//! before `row10`. Runs of equal value differ only in leading zeros; the one
//! with fewer zeros sorts first (`7` < `007` < `8`), so the order stays total
//! and equal strings are always adjacent. Text runs compare bytewise. When
//! one key is a prefix of another, the shorter one sorts first.

use csv::StringRecord;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    /// Raw digit run, leading zeros included.
    Number(String),
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            (Segment::Number(a), Segment::Number(b)) => {
                let (x, y) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
                x.len()
                    .cmp(&y.len())
                    .then_with(|| x.cmp(y))
                    .then_with(|| a.len().cmp(&b.len()))
            }
            // Unreachable for aligned keys, which alternate text/number
            (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
            (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pre-computed natural sort key for one cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalKey(Vec<Segment>);

impl NaturalKey {
    pub fn new(value: &str) -> Self {
        let bytes = value.as_bytes();
        let mut segments = Vec::new();
        let mut text_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i].is_ascii_digit() {
                segments.push(Segment::Text(value[text_start..i].to_string()));
                let run_start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                segments.push(Segment::Number(value[run_start..i].to_string()));
                text_start = i;
            } else {
                i += 1;
            }
        }
        segments.push(Segment::Text(value[text_start..].to_string()));

        Self(segments)
    }
}

/// Composite key over the selected columns of a row, compared left to right.
pub type RowKey = Vec<NaturalKey>;

/// Build the composite key for `record`, or `None` when a column is missing.
pub fn row_key(record: &StringRecord, columns: &[usize]) -> Option<RowKey> {
    columns
        .iter()
        .map(|&column| record.get(column).map(NaturalKey::new))
        .collect()
}

/// Natural comparison of two strings.
pub fn natural_compare(a: &str, b: &str) -> Ordering {
    NaturalKey::new(a).cmp(&NaturalKey::new(b))
}
