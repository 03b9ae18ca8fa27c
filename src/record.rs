//! Variant records: value cleaning, duplicate merging and spill encoding.

use crate::error::{LoadError, Result};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Namespace key the fields are published under.
pub const SOURCE_KEY: &str = "ccle";

/// Raw values treated as "no data" and dropped from a mapped row.
pub const EMPTY_SENTINELS: &[&str] = &["", " ", ".", "-", "NA", "none", "unknown", "Not Available"];

/// Tag of the intermediate spill encoding.
pub const SPILL_FORMAT_VERSION: &str = "v1";

pub type Fields = Map<String, Value>;

/// One variant keyed by its HGVS identifier.
///
/// Serializes as `{"_id": "<hgvs>", "ccle": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "ccle")]
    pub fields: Fields,
}

#[inline]
pub fn is_empty_sentinel(value: &str) -> bool {
    EMPTY_SENTINELS.contains(&value)
}

/// Convert a raw value to an integer or finite float when it parses as one.
pub fn convert_to_number(value: &str) -> Value {
    if let Ok(n) = value.parse::<i64>() {
        return Value::Number(n.into());
    }
    match value.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(value.to_string()),
    }
}

impl VariantRecord {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a record from raw row values, dropping sentinels and
    /// converting numeric text.
    pub fn from_raw_fields<'n, 'v, I>(id: impl Into<String>, raw: I) -> Self
    where
        I: IntoIterator<Item = (&'n str, &'v str)>,
    {
        let fields = raw
            .into_iter()
            .filter(|(_, value)| !is_empty_sentinel(value))
            .map(|(name, value)| (name.to_string(), convert_to_number(value)))
            .collect();
        Self::new(id, fields)
    }

    /// Fold another record with the same identifier into this one.
    ///
    /// Missing or null fields are filled in; differing values collect into
    /// a list without repeats.
    pub fn merge(&mut self, other: VariantRecord) {
        debug_assert_eq!(self.id, other.id);

        for (name, incoming) in other.fields {
            if incoming.is_null() {
                continue;
            }
            match self.fields.get_mut(&name) {
                None => {
                    self.fields.insert(name, incoming);
                }
                Some(existing) if existing.is_null() => *existing = incoming,
                Some(existing) if *existing == incoming => {}
                Some(Value::Array(values)) => {
                    if !values.contains(&incoming) {
                        values.push(incoming);
                    }
                }
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, incoming]);
                }
            }
        }
    }

    /// Drop null fields and unwrap single-element lists.
    pub fn clean(mut self) -> Self {
        self.fields = std::mem::take(&mut self.fields)
            .into_iter()
            .filter_map(|(name, value)| clean_value(value).map(|value| (name, value)))
            .collect();
        self
    }

    /// Encode as an `id, tag, payload` spill row.
    pub fn to_spill_row(&self) -> Result<[String; 3]> {
        Ok([
            self.id.clone(),
            SPILL_FORMAT_VERSION.to_string(),
            serde_json::to_string(&self.fields)?,
        ])
    }

    /// Decode a spill row written by [`VariantRecord::to_spill_row`].
    pub fn from_spill_row(row: &StringRecord) -> Result<Self> {
        let id = row.get(0).unwrap_or_default().to_string();
        let spill_error = |message: String| LoadError::SpillFormat {
            id: id.clone(),
            message,
        };

        if row.len() != 3 {
            return Err(spill_error(format!("expected 3 columns, got {}", row.len())));
        }
        if &row[1] != SPILL_FORMAT_VERSION {
            return Err(spill_error(format!("unsupported format tag '{}'", &row[1])));
        }
        let fields: Fields = serde_json::from_str(&row[2])
            .map_err(|e| spill_error(format!("undecodable payload: {}", e)))?;

        Ok(Self::new(id.clone(), fields))
    }
}

fn clean_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(values) => {
            let mut values: Vec<Value> = values.into_iter().filter_map(clean_value).collect();
            match values.len() {
                0 => None,
                1 => values.pop(),
                _ => Some(Value::Array(values)),
            }
        }
        other => Some(other),
    }
}

/// Merge a group of records sharing one identifier, in order.
pub fn merge_duplicates<I>(group: I) -> Option<VariantRecord>
where
    I: IntoIterator<Item = VariantRecord>,
{
    let mut group = group.into_iter();
    let mut merged = group.next()?;
    for record in group {
        merged.merge(record);
    }
    Some(merged)
}

/// Iterator adapter merging runs of consecutive records with equal ids.
///
/// Emits cleaned records. The first error ends the sequence.
pub struct MergeDuplicates<I> {
    iter: I,
    pending: Option<VariantRecord>,
    failed: bool,
}

impl<I> MergeDuplicates<I>
where
    I: Iterator<Item = Result<VariantRecord>>,
{
    pub fn new(iter: I) -> Self {
        Self {
            iter,
            pending: None,
            failed: false,
        }
    }

    fn fail(&mut self, err: LoadError) -> Option<Result<VariantRecord>> {
        self.failed = true;
        self.pending = None;
        Some(Err(err))
    }
}

impl<I> Iterator for MergeDuplicates<I>
where
    I: Iterator<Item = Result<VariantRecord>>,
{
    type Item = Result<VariantRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let mut current = match self.pending.take() {
            Some(record) => record,
            None => match self.iter.next()? {
                Ok(record) => record,
                Err(e) => return self.fail(e),
            },
        };

        loop {
            match self.iter.next() {
                None => return Some(Ok(current.clean())),
                Some(Err(e)) => return self.fail(e),
                Some(Ok(next)) if next.id == current.id => current.merge(next),
                Some(Ok(next)) => {
                    self.pending = Some(next);
                    return Some(Ok(current.clean()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, fields: Value) -> VariantRecord {
        match fields {
            Value::Object(map) => VariantRecord::new(id, map),
            _ => panic!("fields must be an object"),
        }
    }

    #[test]
    fn test_convert_to_number() {
        assert_eq!(convert_to_number("42"), json!(42));
        assert_eq!(convert_to_number("-7"), json!(-7));
        assert_eq!(convert_to_number("0.25"), json!(0.25));
        assert_eq!(convert_to_number("1e3"), json!(1000.0));
        assert_eq!(convert_to_number("TP53"), json!("TP53"));
        assert_eq!(convert_to_number("nan"), json!("nan"));
        assert_eq!(convert_to_number("inf"), json!("inf"));
        assert_eq!(convert_to_number("p.R175H"), json!("p.R175H"));
    }

    #[test]
    fn test_from_raw_fields_sweeps_sentinels() {
        let rec = VariantRecord::from_raw_fields(
            "chr1:g.100A>T",
            vec![
                ("hugo_symbol", "TP53"),
                ("dbsnp_rs", ""),
                ("reference_allele", "-"),
                ("exac_af", "NA"),
                ("start_position", "100"),
                ("strand", "+"),
            ],
        );
        assert_eq!(
            serde_json::to_value(&rec).unwrap(),
            json!({
                "_id": "chr1:g.100A>T",
                "ccle": {"hugo_symbol": "TP53", "start_position": 100, "strand": "+"}
            })
        );
    }

    fn build_from_owned_values(values: Vec<String>) -> VariantRecord {
        const NAMES: [&str; 2] = ["hugo_symbol", "exac_af"];
        let raw = NAMES.iter().copied().zip(values.iter().map(String::as_str));
        VariantRecord::from_raw_fields("chr1:g.5A>T", raw)
    }

    #[test]
    fn test_from_raw_fields_static_names_borrowed_values() {
        let rec = build_from_owned_values(vec!["BRAF".to_string(), "0.5".to_string()]);
        assert_eq!(
            Value::Object(rec.fields),
            json!({"hugo_symbol": "BRAF", "exac_af": 0.5})
        );
    }

    #[test]
    fn test_spill_row_keeps_float_digits() {
        let values = [
            "0.009288670983029261",
            "1.0000000000000002",
            "8.98846567431158e307",
            "-2.2250738585072014e-308",
        ];
        for raw in values {
            let rec = VariantRecord::from_raw_fields("v", vec![("exac_af", raw)]);
            let row = StringRecord::from(rec.to_spill_row().unwrap().to_vec());
            let back = VariantRecord::from_spill_row(&row).unwrap();
            assert_eq!(back, rec, "{} changed through the spill", raw);
            assert_eq!(
                back.fields["exac_af"].as_f64(),
                raw.parse::<f64>().ok(),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_merge_unions_disjoint_fields() {
        let mut a = record("v", json!({"hugo_symbol": "KRAS"}));
        let b = record("v", json!({"broad_id": "ACH-000001"}));
        a.merge(b);
        assert_eq!(
            Value::Object(a.fields),
            json!({"hugo_symbol": "KRAS", "broad_id": "ACH-000001"})
        );
    }

    #[test]
    fn test_merge_collects_differing_values() {
        let group = vec![
            record("v", json!({"broad_id": "ACH-1", "hugo_symbol": "KRAS"})),
            record("v", json!({"broad_id": "ACH-2", "hugo_symbol": "KRAS"})),
            record("v", json!({"broad_id": "ACH-1", "hugo_symbol": "KRAS"})),
            record("v", json!({"broad_id": "ACH-3"})),
        ];
        let merged = merge_duplicates(group).unwrap();
        assert_eq!(
            Value::Object(merged.fields),
            json!({"broad_id": ["ACH-1", "ACH-2", "ACH-3"], "hugo_symbol": "KRAS"})
        );
    }

    #[test]
    fn test_merge_fills_nulls() {
        let mut a = record("v", json!({"exac_af": null, "wes_ac": "1:2"}));
        a.merge(record("v", json!({"exac_af": 0.5, "wes_ac": null})));
        assert_eq!(Value::Object(a.fields), json!({"exac_af": 0.5, "wes_ac": "1:2"}));
    }

    #[test]
    fn test_clean() {
        let rec = record(
            "v",
            json!({"a": null, "b": ["x"], "c": [null, 1, null, 2], "d": [], "e": "keep"}),
        )
        .clean();
        assert_eq!(
            Value::Object(rec.fields),
            json!({"b": "x", "c": [1, 2], "e": "keep"})
        );
    }

    #[test]
    fn test_merge_duplicates_empty_group() {
        assert!(merge_duplicates(Vec::new()).is_none());
    }

    #[test]
    fn test_spill_row_round_trip() {
        let rec = record("chr1:g.5del", json!({"hugo_symbol": "A,B \"q\"", "tcgahscnt": 3}));
        let row = StringRecord::from(rec.to_spill_row().unwrap().to_vec());
        assert_eq!(&row[1], "v1");
        assert_eq!(VariantRecord::from_spill_row(&row).unwrap(), rec);
    }

    #[test]
    fn test_spill_row_rejects_unknown_tag() {
        let row = StringRecord::from(vec!["chr1:g.5del", "v0", "{}"]);
        let err = VariantRecord::from_spill_row(&row).unwrap_err();
        assert!(matches!(err, LoadError::SpillFormat { ref id, .. } if id == "chr1:g.5del"));

        let row = StringRecord::from(vec!["chr1:g.5del", "v1", "{'a': 1}"]);
        assert!(VariantRecord::from_spill_row(&row).is_err());

        let row = StringRecord::from(vec!["chr1:g.5del", "v1"]);
        assert!(VariantRecord::from_spill_row(&row).is_err());
    }

    #[test]
    fn test_merge_duplicates_adapter() {
        let input = vec![
            Ok(record("a", json!({"x": 1}))),
            Ok(record("a", json!({"y": 2}))),
            Ok(record("b", json!({"x": ["only"]}))),
            Ok(record("c", json!({"x": 3}))),
            Ok(record("c", json!({"x": 4}))),
        ];
        let out: Vec<VariantRecord> = MergeDuplicates::new(input.into_iter())
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(Value::Object(out[0].fields.clone()), json!({"x": 1, "y": 2}));
        assert_eq!(Value::Object(out[1].fields.clone()), json!({"x": "only"}));
        assert_eq!(Value::Object(out[2].fields.clone()), json!({"x": [3, 4]}));
    }

    #[test]
    fn test_merge_duplicates_stops_after_error() {
        let input = vec![
            Ok(record("a", json!({"x": 1}))),
            Err(LoadError::MissingColumn("x".to_string())),
            Ok(record("b", json!({"x": 2}))),
        ];
        let mut iter = MergeDuplicates::new(input.into_iter());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}
