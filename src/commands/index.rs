//! Build a BAI index for a coordinate-sorted BAM file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use bamidx_lib::logging::format_count;
use bamidx_lib::pipeline::index_bam;
use clap::Parser;
use log::{info, warn};

use crate::commands::command::Command;
use crate::commands::common::{InputOptions, SpillOptions, ThreadingOptions, default_index_path};

/// Build a `.bai` index.
#[derive(Debug, Parser)]
#[command(
    name = "index",
    about = "\x1b[38;5;72m[INDEXING]\x1b[0m       \x1b[36mBuild a BAI index for a coordinate-sorted BAM\x1b[0m",
    long_about = r#"
Build a BAI index for a coordinate-sorted BAM file.

Every record is structurally validated while the index is built; the first
invalid or out-of-order record aborts the run. Index entries are spilled to
temporary files once --spill-records are held in memory, so memory use does
not grow with the size of the input.

Example usage:
  bamidx index -i sorted.bam
  bamidx index -i sorted.bam -o sorted.bai --threads 8 --tmp-dir /scratch
"#
)]
pub struct Index {
    #[command(flatten)]
    pub input: InputOptions,

    /// Output index file (defaults to <input>.bai)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub threading: ThreadingOptions,

    #[command(flatten)]
    pub spill: SpillOptions,
}

impl Index {
    fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| default_index_path(&self.input.input))
    }
}

impl Command for Index {
    fn execute(&self, command_line: &str) -> Result<()> {
        self.input.validate()?;
        self.threading.validate()?;
        self.spill.validate()?;

        let output = self.output_path();
        info!("Command: {command_line}");
        info!("Input: {}", self.input.input.display());
        info!("Output: {}", output.display());
        info!("Threads: {}", self.threading.threads);

        let config = self.spill.apply(self.threading.config());
        let file = File::create(&output)
            .with_context(|| format!("Failed to create index file {}", output.display()))?;
        let mut out = BufWriter::new(file);

        let result = index_bam(&self.input.input, &mut out, &config)
            .map_err(anyhow::Error::from)
            .and_then(|report| out.flush().map(|()| report).map_err(anyhow::Error::from));
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                drop(out);
                if let Err(rm) = std::fs::remove_file(&output) {
                    warn!("Could not remove partial index {}: {rm}", output.display());
                }
                return Err(e).with_context(|| format!("Failed to index {}", self.input.input.display()));
            }
        };

        info!(
            "Wrote index for {} records in {} BGZF blocks to {}",
            format_count(report.records),
            format_count(report.pipeline.blocks),
            output.display()
        );
        Ok(())
    }
}
