//! ccle-depmap: CCLE DepMap mutation-call loader
//!
//! Usage: ccle-depmap <COMMAND> [OPTIONS]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use ccle_depmap::config::{SortConfig, DEFAULT_MAX_SIZE_MB, DEFAULT_NWAY};
use ccle_depmap::hgvs;
use ccle_depmap::loader::{input_path, LoadOptions, Loader, SortStrategy};
use ccle_depmap::sort::{ColumnSelector, ExternalSorter};

#[derive(Parser)]
#[command(name = "ccle-depmap")]
#[command(version)]
#[command(about = "Load CCLE DepMap mutation calls as HGVS-keyed variant documents", long_about = None)]
struct Cli {
    /// Number of threads used for in-memory chunk sorting (default: 1)
    #[arg(long, short = 't', global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the mutation-call file and write one JSON document per line
    Load {
        /// Folder holding the DepMap release file
        data_folder: Option<PathBuf>,

        /// Explicit mutation-call file (overrides the data folder)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sort mapped records in memory instead of on disk
        #[arg(long)]
        in_memory: bool,

        /// Chunk size in MB for the on-disk sort
        #[arg(long, default_value_t = DEFAULT_MAX_SIZE_MB)]
        max_size: usize,

        /// Directory for intermediate files
        #[arg(long)]
        tmp_dir: Option<PathBuf>,

        /// Print load statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Sort a delimited file on one or more columns in natural order
    Sort {
        /// Input file
        #[arg(short, long)]
        input: PathBuf,

        /// Columns to sort on, by 0-based index or header name
        #[arg(short, long, num_args = 1.., required = true)]
        columns: Vec<ColumnSelector>,

        /// Output file (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Chunk size in MB
        #[arg(long, default_value_t = DEFAULT_MAX_SIZE_MB)]
        max_size: usize,

        /// Number of files merged per round
        #[arg(long, default_value_t = DEFAULT_NWAY)]
        nway: usize,

        /// Field delimiter
        #[arg(short, long, default_value_t = ',')]
        delimiter: char,

        /// Treat the first row as data
        #[arg(long)]
        no_header: bool,

        /// Directory for intermediate files
        #[arg(long)]
        tmp_dir: Option<PathBuf>,

        /// Print sort statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Print the HGVS identifier and variant type of a VCF-style variant
    Hgvs {
        chrom: String,
        pos: u64,
        reference: String,
        alternate: String,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let threads = cli.threads.unwrap_or(1).max(1);
    if threads > 1 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            error!("Failed to initialize thread pool: {}", e);
            process::exit(1);
        }
    }

    let result = match cli.command {
        Commands::Load {
            data_folder,
            file,
            output,
            in_memory,
            max_size,
            tmp_dir,
            stats,
        } => run_load(
            data_folder,
            file,
            output,
            in_memory,
            max_size,
            tmp_dir,
            threads,
            stats,
        ),

        Commands::Sort {
            input,
            columns,
            output,
            max_size,
            nway,
            delimiter,
            no_header,
            tmp_dir,
            stats,
        } => {
            let config = SortConfig::new()
                .max_size_mb(max_size)
                .nway(nway)
                .has_header(!no_header)
                .threads(threads);
            run_sort(
                input, columns, output, config, delimiter, tmp_dir, stats,
            )
        }

        Commands::Hgvs {
            chrom,
            pos,
            reference,
            alternate,
        } => run_hgvs(&chrom, pos, &reference, &alternate),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn run_load(
    data_folder: Option<PathBuf>,
    file: Option<PathBuf>,
    output: Option<PathBuf>,
    in_memory: bool,
    max_size: usize,
    tmp_dir: Option<PathBuf>,
    threads: usize,
    stats: bool,
) -> Result<()> {
    let path = match (file, data_folder) {
        (Some(file), _) => file,
        (None, Some(folder)) => input_path(folder),
        (None, None) => bail!("either a data folder or --file is required"),
    };

    let mut sort = SortConfig::new()
        .has_header(false)
        .max_size_mb(max_size)
        .threads(threads);
    if let Some(dir) = tmp_dir {
        sort = sort.temp_dir(dir);
    }
    let options = LoadOptions {
        strategy: if in_memory {
            SortStrategy::InMemory
        } else {
            SortStrategy::External
        },
        sort,
    };

    let records = Loader::new(options)
        .load_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let load_stats = records.stats().clone();

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(&path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut written = 0u64;
    for record in records {
        serde_json::to_writer(&mut out, &record?)?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;

    info!("Wrote {} variant documents", written);
    if stats {
        eprintln!("Load stats: {}, Documents: {}", load_stats, written);
    }
    Ok(())
}

fn run_sort(
    input: PathBuf,
    columns: Vec<ColumnSelector>,
    output: Option<PathBuf>,
    config: SortConfig,
    delimiter: char,
    tmp_dir: Option<PathBuf>,
    stats: bool,
) -> Result<()> {
    if !delimiter.is_ascii() {
        bail!("delimiter must be a single ASCII character, got '{}'", delimiter);
    }
    let mut config = config.delimiter(delimiter as u8);
    if let Some(dir) = tmp_dir {
        config = config.temp_dir(dir);
    }

    let result = ExternalSorter::new(config).sort(&input, &columns, output.as_deref())?;
    if stats {
        eprintln!("Sort stats: {}", result);
    }
    Ok(())
}

fn run_hgvs(chrom: &str, pos: u64, reference: &str, alternate: &str) -> Result<()> {
    let (id, kind) = hgvs::normalize(chrom, pos, reference, alternate)?;
    println!("{}\t{}", id, kind);
    Ok(())
}
