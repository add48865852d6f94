//! Markdown audit trail of a pipeline run
//!
//! The report is a single file: a fixed header, then one section per step
//! with the step title, a timestamp line and the raw text in a fenced block.
//! Entries are only ever appended; [`Report::reset`] truncates the file at
//! the start of a run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::{Error, Result};

/// Header written by [`Report::reset`]
pub const REPORT_HEADER: &str = "# AI Agent Collaboration Report\n\n";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One logged step
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub title: String,
    pub timestamp: DateTime<Local>,
    /// What the step was given, when worth recording separately
    pub input: Option<String>,
    /// What the step produced
    pub body: String,
}

impl ReportEntry {
    /// Render the entry as a markdown section
    pub fn render(&self) -> String {
        let mut out = format!(
            "## {}\n\n**Time:** {}\n\n",
            self.title,
            self.timestamp.format(TIMESTAMP_FORMAT)
        );
        if let Some(ref input) = self.input {
            out.push_str("**Input:**\n\n");
            out.push_str(&fenced(input));
            out.push_str("\n\n");
        }
        out.push_str(&fenced(&self.body));
        out.push_str("\n\n---\n\n");
        out
    }
}

/// Wrap `text` in a code fence that nothing inside it can close
fn fenced(text: &str) -> String {
    let fence = "`".repeat(longest_backtick_run(text).max(2) + 1);
    format!("{fence}\n{text}\n{fence}")
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Append-only report file
///
/// Appending takes `&mut self`, so concurrent writers must go through a
/// single owner and entries can never interleave.
#[derive(Debug)]
pub struct Report {
    path: PathBuf,
    entries: Vec<ReportEntry>,
}

impl Report {
    /// Create a report handle; nothing is written until [`Report::reset`] or an append
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Location of the report file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries appended since the last reset
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Truncate the report and write the header
    ///
    /// Any previous report content is destroyed.
    pub fn reset(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(Error::Io)?;
            }
        }
        std::fs::write(&self.path, REPORT_HEADER).map_err(Error::Io)?;
        self.entries.clear();
        debug!(path = %self.path.display(), "Report reset");
        Ok(())
    }

    /// Append an entry with a fresh timestamp
    pub fn append(&mut self, title: impl Into<String>, body: impl Into<String>) -> Result<()> {
        self.push(ReportEntry {
            title: title.into(),
            timestamp: Local::now(),
            input: None,
            body: body.into(),
        })
    }

    /// Append an entry recording both the step's input and its output
    pub fn append_with_input(
        &mut self,
        title: impl Into<String>,
        input: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<()> {
        self.push(ReportEntry {
            title: title.into(),
            timestamp: Local::now(),
            input: Some(input.into()),
            body: body.into(),
        })
    }

    fn push(&mut self, entry: ReportEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(Error::Io)?;
        file.write_all(entry.render().as_bytes())
            .map_err(Error::Io)?;
        file.flush().map_err(Error::Io)?;

        debug!(title = %entry.title, "Report entry appended");
        self.entries.push(entry);
        Ok(())
    }
}
