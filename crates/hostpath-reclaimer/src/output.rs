//! Rendering of reclaim reports.
//!
//! Table output is column-aligned for humans; JSON output is the serialized
//! [`ReclaimReport`] for tooling.

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};

use crate::candidate::LeafOutcome;
use crate::report::ReclaimReport;

/// A single row in a table output.
pub type OutputRow = Vec<String>;

/// Rows of cells; the first row is usually a header.
pub type OutputTable = Vec<OutputRow>;

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable column-aligned table output.
    #[default]
    Table,
    /// Machine-readable JSON output.
    Json,
}

/// Writes reports and errors in the selected format.
pub struct Printer<W: Write = Box<dyn Write>> {
    out: W,
    format: OutputFormat,
}

impl Printer<Box<dyn Write>> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self {
            out: Box::new(io::stdout()),
            format,
        }
    }
}

impl<W: Write> Printer<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            out: writer,
            format,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn print_error(&mut self, err: &str) -> io::Result<()> {
        match self.format {
            OutputFormat::Table => writeln!(self.out, "Error: {}", err),
            OutputFormat::Json => {
                self.print_json(&serde_json::json!({ "error": err }))
            }
        }
    }

    /// Print a whole run: summary, per-identity counts and every leaf that
    /// passed all gates. Skipped leaves only appear in JSON output.
    pub fn print_report(&mut self, report: &ReclaimReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Json => self.print_json(report),
            OutputFormat::Table => {
                self.print_table(&summary_table(report))?;

                let mut identities = table_with_header(&[
                    "IDENTITY", "ALLOCATIONS", "DELETED", "WOULD_DELETE", "SKIPPED", "FAILED",
                ]);
                for id in report.identities.iter().filter(|id| {
                    id.deleted + id.would_delete + id.skipped + id.failed > 0
                }) {
                    identities.push(vec![
                        id.identity.clone(),
                        id.allocations.to_string(),
                        id.deleted.to_string(),
                        id.would_delete.to_string(),
                        id.skipped.to_string(),
                        id.failed.to_string(),
                    ]);
                }
                if identities.len() > 1 {
                    writeln!(self.out)?;
                    self.print_table(&identities)?;
                }

                let mut leaves = table_with_header(&["OUTCOME", "PATH"]);
                for decision in report
                    .decisions
                    .iter()
                    .filter(|d| !matches!(d.outcome, LeafOutcome::Skipped { .. }))
                {
                    leaves.push(vec![
                        decision.outcome.to_string(),
                        decision.path.display().to_string(),
                    ]);
                }
                if leaves.len() > 1 {
                    writeln!(self.out)?;
                    self.print_table(&leaves)?;
                }
                Ok(())
            }
        }
    }

    fn print_json<T: Serialize + ?Sized>(&mut self, value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        writeln!(self.out, "{}", json)
    }

    /// Column-aligned output, two spaces between columns.
    fn print_table(&mut self, table: &OutputTable) -> io::Result<()> {
        const SEPARATOR: &str = "  ";

        let mut widths: Vec<usize> = Vec::new();
        for row in table {
            if widths.len() < row.len() {
                widths.resize(row.len(), 0);
            }
            for (col, cell) in row.iter().enumerate() {
                widths[col] = widths[col].max(cell.len() + SEPARATOR.len());
            }
        }

        for row in table {
            let mut line = String::new();
            for (col, cell) in row.iter().enumerate() {
                line.push_str(cell);
                if col + 1 < row.len() {
                    let padding = widths[col].saturating_sub(cell.len());
                    line.extend(std::iter::repeat(' ').take(padding));
                }
            }
            writeln!(self.out, "{}", line)?;
        }
        Ok(())
    }
}

impl<W: Write> fmt::Debug for Printer<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Printer")
            .field("format", &self.format)
            .finish()
    }
}

fn summary_table(report: &ReclaimReport) -> OutputTable {
    let mut table = vec![
        kv_row("base_dir", report.base_dir.display()),
        kv_row("dry_run", report.dry_run),
        kv_row("threshold", report.threshold),
        kv_row("age_days", report.age_days),
        kv_row("total_before", report.total_before),
        kv_row("total_after", report.total_after),
    ];
    if report.gated {
        table.push(kv_row("gated", "below threshold, nothing evaluated"));
        return table;
    }
    table.extend([
        kv_row("deleted", report.deleted()),
        kv_row("would_delete", report.would_delete()),
        kv_row("skipped", report.skipped()),
        kv_row("failed", report.failed()),
    ]);
    for (reason, n) in report.skip_reasons() {
        table.push(kv_row(&format!("skipped.{}", reason), n));
    }
    table.extend([
        kv_row(
            "parents_removed",
            format!("{}/{}", report.parents_removed, report.parents_attempted),
        ),
        kv_row(
            "identity_dirs_removed",
            format!(
                "{}/{}",
                report.identity_dirs_removed, report.identity_dirs_attempted
            ),
        ),
    ]);
    table
}

/// Header row for a table.
pub fn table_with_header(headers: &[&str]) -> OutputTable {
    vec![headers.iter().map(|h| h.to_string()).collect()]
}

/// A two-column key/value row.
pub fn kv_row(key: &str, value: impl fmt::Display) -> OutputRow {
    vec![key.to_string(), value.to_string()]
}
