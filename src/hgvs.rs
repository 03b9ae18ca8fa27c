//! VCF-style variant to HGVS genomic notation.
//!
//! Converts `(chrom, pos, ref, alt)` tuples into `chr<chrom>:g.<expr>`
//! identifiers. Positions are 1-based and indels are expected to carry one
//! anchor base on the left, as in VCF.
//!
//! Classification:
//! - `A>T` single base change: `snp`
//! - anchored loss of bases: `del`
//! - anchored gain of bases: `ins`
//! - anything else: `delins`
//!
//! Multi-base alleles sharing a leading base are left-trimmed one base at a
//! time (advancing the position) until one of the simpler shapes applies.

use std::fmt;
use thiserror::Error;

/// Errors raised while building an HGVS identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HgvsError {
    #[error("Cannot convert ({chrom}, {pos}, {reference}, {alternate}) into HGVS id")]
    InvalidAllele {
        chrom: String,
        pos: u64,
        reference: String,
        alternate: String,
    },
}

pub type Result<T> = std::result::Result<T, HgvsError>;

/// Kind of genomic change described by an HGVS identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantType {
    Snp,
    Del,
    Ins,
    Delins,
}

impl VariantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantType::Snp => "snp",
            VariantType::Del => "del",
            VariantType::Ins => "ins",
            VariantType::Delins => "delins",
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[inline]
fn is_ref_allele(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'N'))
}

#[inline]
fn is_alt_allele(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'N' | b'*'))
}

/// Build the HGVS genomic identifier and variant type for a VCF-style variant.
///
/// # Example
///
/// ```
/// use ccle_depmap::hgvs::{normalize, VariantType};
///
/// let (id, kind) = normalize("1", 100, "ATG", "A").unwrap();
/// assert_eq!(id, "chr1:g.101_102del");
/// assert_eq!(kind, VariantType::Del);
/// ```
pub fn normalize(
    chrom: &str,
    pos: u64,
    reference: &str,
    alternate: &str,
) -> Result<(String, VariantType)> {
    let invalid = || HgvsError::InvalidAllele {
        chrom: chrom.to_string(),
        pos,
        reference: reference.to_string(),
        alternate: alternate.to_string(),
    };

    if !is_ref_allele(reference) || !is_alt_allele(alternate) {
        return Err(invalid());
    }

    // Both alleles are ASCII past this point, so byte slicing is char-safe.
    let mut pos = pos;
    let mut r = reference;
    let mut a = alternate;

    loop {
        let (ref_len, alt_len) = (r.len(), a.len());
        let end = pos.checked_add(ref_len as u64 - 1).ok_or_else(invalid)?;

        let result = match (ref_len, alt_len) {
            (1, 1) => (format!("chr{chrom}:g.{pos}{r}>{a}"), VariantType::Snp),
            (n, 1) if n > 1 => {
                if r.as_bytes()[0] == a.as_bytes()[0] {
                    // end >= pos + 1 here, so this cannot overflow
                    let start = pos + 1;
                    let id = if start == end {
                        format!("chr{chrom}:g.{start}del")
                    } else {
                        format!("chr{chrom}:g.{start}_{end}del")
                    };
                    (id, VariantType::Del)
                } else {
                    (
                        format!("chr{chrom}:g.{pos}_{end}delins{a}"),
                        VariantType::Delins,
                    )
                }
            }
            (1, m) if m > 1 => {
                if a.as_bytes()[0] == r.as_bytes()[0] {
                    let next = pos.checked_add(1).ok_or_else(invalid)?;
                    (
                        format!("chr{chrom}:g.{pos}_{next}ins{}", &a[1..]),
                        VariantType::Ins,
                    )
                } else {
                    (format!("chr{chrom}:g.{pos}delins{a}"), VariantType::Delins)
                }
            }
            (n, m) if n > 1 && m > 1 => {
                if r.as_bytes()[0] == a.as_bytes()[0] {
                    pos += 1;
                    r = &r[1..];
                    a = &a[1..];
                    continue;
                }
                (
                    format!("chr{chrom}:g.{pos}_{end}delins{a}"),
                    VariantType::Delins,
                )
            }
            _ => return Err(invalid()),
        };

        return Ok(result);
    }
}

/// Build only the HGVS identifier, dropping the variant type.
pub fn hgvs_id(chrom: &str, pos: u64, reference: &str, alternate: &str) -> Result<String> {
    normalize(chrom, pos, reference, alternate).map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snp() {
        let (id, kind) = normalize("1", 100, "A", "T").unwrap();
        assert_eq!(id, "chr1:g.100A>T");
        assert_eq!(kind, VariantType::Snp);

        let (id, _) = normalize("X", 5, "N", "*").unwrap();
        assert_eq!(id, "chrX:g.5N>*");
    }

    #[test]
    fn test_range_deletion() {
        let (id, kind) = normalize("1", 100, "ATG", "A").unwrap();
        assert_eq!(id, "chr1:g.101_102del");
        assert_eq!(kind, VariantType::Del);
    }

    #[test]
    fn test_single_base_deletion() {
        let (id, kind) = normalize("1", 100, "AT", "A").unwrap();
        assert_eq!(id, "chr1:g.101del");
        assert_eq!(kind, VariantType::Del);
    }

    #[test]
    fn test_deletion_without_anchor_is_delins() {
        let (id, kind) = normalize("2", 100, "ATG", "C").unwrap();
        assert_eq!(id, "chr2:g.100_102delinsC");
        assert_eq!(kind, VariantType::Delins);
    }

    #[test]
    fn test_insertion() {
        let (id, kind) = normalize("1", 100, "A", "ATT").unwrap();
        assert_eq!(id, "chr1:g.100_101insTT");
        assert_eq!(kind, VariantType::Ins);
    }

    #[test]
    fn test_insertion_without_anchor_is_delins() {
        let (id, kind) = normalize("1", 100, "A", "GTT").unwrap();
        assert_eq!(id, "chr1:g.100delinsGTT");
        assert_eq!(kind, VariantType::Delins);
    }

    #[test]
    fn test_shared_prefix_is_trimmed() {
        // ATG -> ATC reduces to G -> C two bases to the right
        let (id, kind) = normalize("3", 100, "ATG", "ATC").unwrap();
        assert_eq!(id, "chr3:g.102G>C");
        assert_eq!(kind, VariantType::Snp);

        // AGT -> AC trims to GT -> C, a delins
        let (id, kind) = normalize("3", 100, "AGT", "AC").unwrap();
        assert_eq!(id, "chr3:g.101_102delinsC");
        assert_eq!(kind, VariantType::Delins);

        // ATG -> AT trims to TG -> T, a deletion of the last base
        let (id, kind) = normalize("3", 100, "ATG", "AT").unwrap();
        assert_eq!(id, "chr3:g.102del");
        assert_eq!(kind, VariantType::Del);
    }

    #[test]
    fn test_multi_base_delins() {
        let (id, kind) = normalize("7", 10, "GTA", "CC").unwrap();
        assert_eq!(id, "chr7:g.10_12delinsCC");
        assert_eq!(kind, VariantType::Delins);
    }

    #[test]
    fn test_anchored_indels_from_maf_sentinels() {
        // Deletion of "AT" reported at 100 becomes N-anchored at 99
        assert_eq!(hgvs_id("MT", 99, "NAT", "N").unwrap(), "chrMT:g.100_101del");
        // Insertion of "TT" after 100
        assert_eq!(hgvs_id("1", 99, "N", "NTT").unwrap(), "chr1:g.99_100insTT");
    }

    #[test]
    fn test_invalid_allele() {
        let err = normalize("1", 100, "X", "A").unwrap_err();
        assert_eq!(
            err,
            HgvsError::InvalidAllele {
                chrom: "1".to_string(),
                pos: 100,
                reference: "X".to_string(),
                alternate: "A".to_string(),
            }
        );
        assert!(normalize("1", 100, "A", "").is_err());
        assert!(normalize("1", 100, "", "A").is_err());
        assert!(normalize("1", 100, "a", "T").is_err());
        assert!(normalize("1", 100, "*", "T").is_err());
    }

    #[test]
    fn test_position_overflow_is_rejected() {
        let max = u64::MAX;
        assert!(matches!(
            normalize("1", max, "AT", "A"),
            Err(HgvsError::InvalidAllele { pos, .. }) if pos == max
        ));
        assert!(normalize("1", max, "A", "AT").is_err());
        assert!(normalize("1", max - 1, "ATG", "AC").is_err());

        // Still representable at the top of the range
        assert_eq!(hgvs_id("1", max, "A", "T").unwrap(), format!("chr1:g.{}A>T", max));
        assert_eq!(
            hgvs_id("1", max - 1, "AT", "A").unwrap(),
            format!("chr1:g.{}del", max)
        );
    }

    #[test]
    fn test_variant_type_display() {
        assert_eq!(VariantType::Delins.to_string(), "delins");
        assert_eq!(VariantType::Snp.as_str(), "snp");
    }
}
