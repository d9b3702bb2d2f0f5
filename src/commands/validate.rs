//! Structural validation of every record in a BAM file.

use anyhow::{Context, Result, bail};
use bamidx_lib::logging::format_count;
use bamidx_lib::pipeline::validate_bam;
use clap::Parser;
use log::info;

use crate::commands::command::Command;
use crate::commands::common::{InputOptions, ThreadingOptions};

/// Validate BAM record structure.
#[derive(Debug, Parser)]
#[command(
    name = "validate",
    about = "\x1b[38;5;72m[INDEXING]\x1b[0m       \x1b[36mCheck the structure of every BAM record\x1b[0m",
    long_about = r#"
Check the structure of every record in a BAM file without building an index.

Each record is checked on its own (field lengths, CIGAR operations, sequence
and quality encoding, auxiliary fields) and against the header's reference
list. Sort order is not checked. Invalid records are reported with their
virtual offset, and a count per problem is logged at the end. The command
fails if any record is invalid.

Example usage:
  bamidx validate -i reads.bam
  bamidx validate -i reads.bam --max-errors 0 --threads 4
"#
)]
pub struct Validate {
    #[command(flatten)]
    pub input: InputOptions,

    #[command(flatten)]
    pub threading: ThreadingOptions,

    /// Maximum number of invalid records to report individually
    #[arg(long = "max-errors", default_value_t = 100)]
    pub max_errors: usize,
}

impl Command for Validate {
    fn execute(&self, command_line: &str) -> Result<()> {
        self.input.validate()?;
        self.threading.validate()?;

        info!("Command: {command_line}");
        info!("Input: {}", self.input.input.display());

        let report = validate_bam(&self.input.input, &self.threading.config(), self.max_errors)
            .with_context(|| format!("Failed to read {}", self.input.input.display()))?;

        let invalid = report.invalid();
        if invalid > 0 {
            bail!(
                "{} of {} records in {} are invalid",
                format_count(invalid),
                format_count(report.records),
                self.input.input.display()
            );
        }
        info!("All {} records are valid", format_count(report.records));
        Ok(())
    }
}
