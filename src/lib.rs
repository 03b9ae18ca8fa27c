//! ccle-depmap: CCLE DepMap mutation-call loader
//!
//! Turns the DepMap 18q3 mutation-call release into one document per
//! distinct variant, keyed by its HGVS genomic identifier.
//!
//! # Features
//!
//! - **HGVS normalization**: VCF-style alleles to `chr<c>:g.<expr>` ids
//! - **External sorting**: disk-backed natural-order CSV sort with bounded memory
//! - **Duplicate merging**: rows of the same variant fold into one document
//!
//! # Example
//!
//! ```rust,no_run
//! use ccle_depmap::loader::load_data;
//!
//! for record in load_data("data/ccle").unwrap() {
//!     let record = record.unwrap();
//!     println!("{}", serde_json::to_string(&record).unwrap());
//! }
//! ```

pub mod config;
pub mod error;
pub mod hgvs;
pub mod loader;
pub mod maf;
pub mod record;
pub mod sort;

// Re-export commonly used types
pub use error::{LoadError, Result};
pub use loader::{load_data, LoadOptions, Loader, SortStrategy, VariantRecords};
pub use record::VariantRecord;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::SortConfig;
    pub use crate::error::{LoadError, Result};
    pub use crate::hgvs::{hgvs_id, normalize, VariantType};
    pub use crate::loader::{load_data, map_row, LoadOptions, Loader, SortStrategy};
    pub use crate::maf::{MafReader, MafRow};
    pub use crate::record::VariantRecord;
    pub use crate::sort::{csvsort, ColumnSelector, ExternalSorter};
}
