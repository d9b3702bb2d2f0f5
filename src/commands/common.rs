//! Options shared across commands.
//!
//! Each group is a clap `Args` struct composed into commands with
//! `#[command(flatten)]`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use bamidx_lib::index::IndexerConfig;
use clap::Args;

/// Input BAM option.
#[derive(Debug, Clone, Args)]
pub struct InputOptions {
    /// Input BAM file (coordinate sorted for indexing)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

impl InputOptions {
    /// Fails if the input does not exist.
    pub fn validate(&self) -> Result<()> {
        validate_file_exists(&self.input, "Input BAM")
    }
}

/// Decompression thread count.
#[derive(Debug, Clone, Args)]
pub struct ThreadingOptions {
    /// Number of decompression threads.
    ///
    /// Above 1, full spill buffers are also sorted in parallel.
    #[arg(short = 't', long = "threads", default_value_t = 1)]
    pub threads: usize,
}

impl Default for ThreadingOptions {
    fn default() -> Self {
        Self { threads: 1 }
    }
}

impl ThreadingOptions {
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            bail!("--threads must be at least 1");
        }
        Ok(())
    }

    /// Indexer configuration with this thread count applied.
    pub fn config(&self) -> IndexerConfig {
        IndexerConfig::new().threads(self.threads)
    }
}

/// Memory and temp-file controls for the external sort of index entries.
#[derive(Debug, Clone, Args)]
pub struct SpillOptions {
    /// Index entries held in memory per kind before spilling to disk
    #[arg(long = "spill-records", default_value_t = 1_000_000)]
    pub spill_records: usize,

    /// Maximum number of spill fragments merged in one pass
    #[arg(long = "merge-fan-in", default_value_t = 64)]
    pub merge_fan_in: usize,

    /// Directory for spill files (defaults to the system temp directory)
    #[arg(long = "tmp-dir")]
    pub tmp_dir: Option<PathBuf>,
}

impl Default for SpillOptions {
    fn default() -> Self {
        Self { spill_records: 1_000_000, merge_fan_in: 64, tmp_dir: None }
    }
}

impl SpillOptions {
    pub fn validate(&self) -> Result<()> {
        if self.spill_records == 0 {
            bail!("--spill-records must be at least 1");
        }
        if self.merge_fan_in < 2 {
            bail!("--merge-fan-in must be at least 2, got {}", self.merge_fan_in);
        }
        if let Some(dir) = &self.tmp_dir {
            if !dir.is_dir() {
                bail!("--tmp-dir {} is not a directory", dir.display());
            }
        }
        Ok(())
    }

    /// Apply these options on top of `config`.
    pub fn apply(&self, config: IndexerConfig) -> IndexerConfig {
        let config = config.spill_capacity(self.spill_records).merge_fan_in(self.merge_fan_in);
        match &self.tmp_dir {
            Some(dir) => config.temp_dir(dir),
            None => config,
        }
    }
}

/// `<input>.bai`, the conventional index location.
pub fn default_index_path(input: &Path) -> PathBuf {
    let mut path = OsString::from(input.as_os_str());
    path.push(".bai");
    PathBuf::from(path)
}

/// Fails with a message naming `description` if `path` does not exist.
pub fn validate_file_exists(path: &Path, description: &str) -> Result<()> {
    if !path.exists() {
        bail!("{description} does not exist: {}", path.display());
    }
    Ok(())
}
