//! Runtime configuration for the external CSV sorter.
//!
//! Every knob is an explicit value on [`SortConfig`]; nothing here is
//! process-wide mutable state. The only derived default is the maximum
//! field size, which is probed once and cached.

use csv::QuoteStyle;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Default spill threshold in megabytes.
pub const DEFAULT_MAX_SIZE_MB: usize = 100;

/// Default merge fan-in (pairwise merge).
pub const DEFAULT_NWAY: usize = 2;

/// Largest field size limit the platform can represent.
///
/// Starts from the signed 64-bit maximum and drops by powers of ten until
/// the value fits in `usize`.
pub fn probe_field_size_limit() -> usize {
    let mut limit = i64::MAX as u64;
    loop {
        match usize::try_from(limit) {
            Ok(limit) => return limit,
            Err(_) => limit /= 10,
        }
    }
}

/// Cached result of [`probe_field_size_limit`].
pub fn default_field_size_limit() -> usize {
    static LIMIT: OnceLock<usize> = OnceLock::new();
    *LIMIT.get_or_init(probe_field_size_limit)
}

/// Sort configuration.
///
/// # Example
///
/// ```
/// use ccle_depmap::config::SortConfig;
///
/// let config = SortConfig::default()
///     .max_size_mb(16)
///     .delimiter(b'\t')
///     .has_header(false);
/// assert_eq!(config.max_size_bytes, 16 * 1024 * 1024);
/// assert_eq!(config.nway, 2);
/// ```
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Approximate in-memory bytes of rows held before spilling to disk
    pub max_size_bytes: usize,
    /// Number of spill files merged per round (at least 2)
    pub nway: usize,
    /// Delimiter of the input and final output
    pub delimiter: u8,
    /// First row is a header kept out of the sort
    pub has_header: bool,
    /// Quoting used when writing the final output
    pub quote_style: QuoteStyle,
    /// Longest field accepted, in bytes
    pub field_size_limit: usize,
    /// Log merge progress at info level instead of debug
    pub show_progress: bool,
    /// Parent directory for spill files (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,
    /// Threads used to sort each in-memory chunk
    pub threads: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_MB * 1024 * 1024,
            nway: DEFAULT_NWAY,
            delimiter: b',',
            has_header: true,
            quote_style: QuoteStyle::Necessary,
            field_size_limit: default_field_size_limit(),
            show_progress: false,
            temp_dir: None,
            threads: 1,
        }
    }
}

impl SortConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the spill threshold in megabytes.
    pub fn max_size_mb(mut self, mb: usize) -> Self {
        self.max_size_bytes = mb * 1024 * 1024;
        self
    }

    /// Set the spill threshold in bytes.
    pub fn max_size_bytes(mut self, bytes: usize) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn nway(mut self, nway: usize) -> Self {
        self.nway = nway;
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn quote_style(mut self, quote_style: QuoteStyle) -> Self {
        self.quote_style = quote_style;
        self
    }

    pub fn field_size_limit(mut self, limit: usize) -> Self {
        self.field_size_limit = limit;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn temp_dir(mut self, path: PathBuf) -> Self {
        self.temp_dir = Some(path);
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}
