//! Sort column selection.

use super::{Result, SortError};
use csv::StringRecord;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A sort column given either by zero-based position or by header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    Index(usize),
    Name(String),
}

impl From<usize> for ColumnSelector {
    fn from(index: usize) -> Self {
        ColumnSelector::Index(index)
    }
}

impl From<&str> for ColumnSelector {
    fn from(name: &str) -> Self {
        ColumnSelector::Name(name.to_string())
    }
}

impl From<String> for ColumnSelector {
    fn from(name: String) -> Self {
        ColumnSelector::Name(name)
    }
}

/// Numeric text is a position, anything else a header name.
impl FromStr for ColumnSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.parse::<usize>() {
            Ok(index) => ColumnSelector::Index(index),
            Err(_) => ColumnSelector::Name(s.to_string()),
        })
    }
}

impl fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Index(index) => write!(f, "{}", index),
            ColumnSelector::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Resolve selectors to column indices against an optional header row.
///
/// Positions are only range-checked when a header is present; without one
/// a short row is caught later as a malformed row.
pub fn resolve_columns(
    selectors: &[ColumnSelector],
    header: Option<&StringRecord>,
) -> Result<Vec<usize>> {
    if selectors.is_empty() {
        return Err(SortError::ColumnResolution(
            "At least one sort column is required".to_string(),
        ));
    }

    selectors
        .iter()
        .map(|selector| match (selector, header) {
            (ColumnSelector::Index(index), Some(header)) if *index >= header.len() => Err(
                SortError::ColumnResolution(format!("Column index is out of range: \"{}\"", index)),
            ),
            (ColumnSelector::Index(index), _) => Ok(*index),
            (ColumnSelector::Name(name), None) => Err(SortError::ColumnResolution(format!(
                "CSV needs a header to find index of this column name: \"{}\"",
                name
            ))),
            (ColumnSelector::Name(name), Some(header)) => header
                .iter()
                .position(|field| field == name)
                .ok_or_else(|| {
                    SortError::ColumnResolution(format!(
                        "Column name is not in header: \"{}\"",
                        name
                    ))
                }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> StringRecord {
        StringRecord::from(vec!["id", "name", "score"])
    }

    #[test]
    fn test_resolve_names_and_indices() {
        let selectors = vec![ColumnSelector::from("score"), ColumnSelector::Index(0)];
        assert_eq!(resolve_columns(&selectors, Some(&header())).unwrap(), vec![2, 0]);
    }

    #[test]
    fn test_index_without_header_is_unchecked() {
        let selectors = vec![ColumnSelector::Index(7)];
        assert_eq!(resolve_columns(&selectors, None).unwrap(), vec![7]);
    }

    #[test]
    fn test_index_out_of_range() {
        let err = resolve_columns(&[ColumnSelector::Index(3)], Some(&header())).unwrap_err();
        assert!(matches!(err, SortError::ColumnResolution(_)));
    }

    #[test]
    fn test_name_requires_header() {
        let err = resolve_columns(&[ColumnSelector::from("id")], None).unwrap_err();
        assert!(err.to_string().contains("needs a header"));
    }

    #[test]
    fn test_unknown_name() {
        let err = resolve_columns(&[ColumnSelector::from("missing")], Some(&header())).unwrap_err();
        assert!(err.to_string().contains("not in header"));
    }

    #[test]
    fn test_empty_selection() {
        assert!(resolve_columns(&[], Some(&header())).is_err());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("3".parse::<ColumnSelector>().unwrap(), ColumnSelector::Index(3));
        assert_eq!(
            "broad_id".parse::<ColumnSelector>().unwrap(),
            ColumnSelector::Name("broad_id".to_string())
        );
    }
}
