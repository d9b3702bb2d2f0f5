//! Per-reference read counts taken from an index.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bamidx_lib::header::{ReferenceTable, read_header};
use bamidx_lib::index::Index;
use clap::Parser;

use crate::commands::command::Command;
use crate::commands::common::{InputOptions, default_index_path, validate_file_exists};

/// Print mapped and unmapped counts per reference.
#[derive(Debug, Parser)]
#[command(
    name = "idxstats",
    about = "\x1b[38;5;72m[INDEXING]\x1b[0m       \x1b[36mReport per-reference counts from a BAI index\x1b[0m",
    long_about = r#"
Report per-reference counts from a BAI index.

Prints one tab-separated line per reference: name, length, mapped records
and unmapped records, followed by a "*" line with the number of records
that have no reference. Only the header and the index are read.

Example usage:
  bamidx idxstats -i sorted.bam
  bamidx idxstats -i sorted.bam --index other/sorted.bai
"#
)]
pub struct IdxStats {
    #[command(flatten)]
    pub input: InputOptions,

    /// Index file (defaults to <input>.bai)
    #[arg(long = "index")]
    pub index: Option<PathBuf>,
}

impl Command for IdxStats {
    fn execute(&self, _command_line: &str) -> Result<()> {
        self.input.validate()?;
        let index_path = self.index.clone().unwrap_or_else(|| default_index_path(&self.input.input));
        validate_file_exists(&index_path, "Index")?;

        let header = read_header(&self.input.input)
            .with_context(|| format!("Failed to read header of {}", self.input.input.display()))?;
        let index = Index::from_path(&index_path)
            .with_context(|| format!("Failed to read index {}", index_path.display()))?;

        let mut out = BufWriter::new(io::stdout().lock());
        write_idxstats(&mut out, &header.references, &index)?;
        out.flush()?;
        Ok(())
    }
}

/// Write the idxstats table for `references` using counts from `index`.
fn write_idxstats<W: Write>(out: &mut W, references: &ReferenceTable, index: &Index) -> Result<()> {
    if index.references().len() != references.len() {
        bail!(
            "Index has {} reference(s) but the header lists {}",
            index.references().len(),
            references.len()
        );
    }
    for (reference, entry) in references.iter().zip(index.references()) {
        let (mapped, unmapped) = entry.metadata.map_or((0, 0), |m| (m.mapped, m.unmapped));
        writeln!(out, "{}\t{}\t{mapped}\t{unmapped}", reference.name, reference.length)?;
    }
    writeln!(out, "*\t0\t0\t{}", index.unplaced_unmapped().unwrap_or(0))?;
    Ok(())
}
