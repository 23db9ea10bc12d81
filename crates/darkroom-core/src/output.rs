//! Report output as JSON or JSON Lines.
//!
//! JSON writes each value as one document. JSON Lines flattens batch
//! reports into one line per item followed by a summary line, so a
//! collection-wide apply can be piped into line-oriented tools.

use serde::Serialize;
use std::io::{self, Write};

use crate::orchestrator::BatchReport;

/// Report format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// One JSON document per value
    #[default]
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
}

impl ReportFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct BatchSummaryLine {
    collection_id: i64,
    processed: usize,
    skipped: usize,
    failed: usize,
}

/// Serializes operation results to a writer.
pub struct ReportWriter<W: Write> {
    writer: W,
    format: ReportFormat,
    pretty: bool,
    lines_written: usize,
}

impl<W: Write> ReportWriter<W> {
    /// `pretty` only affects [`ReportFormat::Json`].
    pub fn new(writer: W, format: ReportFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            lines_written: 0,
        }
    }

    /// Write a single value.
    pub fn write<T: Serialize + ?Sized>(&mut self, item: &T) -> io::Result<()> {
        if self.pretty && self.format == ReportFormat::Json {
            serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?;
        } else {
            // JSONL is never pretty-printed (one object per line)
            serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?;
        }
        writeln!(self.writer)?;
        self.lines_written += 1;
        Ok(())
    }

    /// Write a list: one array in JSON, one line per element in JSONL.
    pub fn write_list<T: Serialize>(&mut self, items: &[T]) -> io::Result<()> {
        match self.format {
            ReportFormat::Json => self.write(items),
            ReportFormat::JsonLines => items.iter().try_for_each(|item| self.write(item)),
        }
    }

    /// Write a batch report. JSONL emits the items, then a summary line.
    pub fn write_batch(&mut self, report: &BatchReport) -> io::Result<()> {
        match self.format {
            ReportFormat::Json => self.write(report),
            ReportFormat::JsonLines => {
                self.write_list(&report.items)?;
                self.write(&BatchSummaryLine {
                    collection_id: report.collection_id,
                    processed: report.processed,
                    skipped: report.skipped,
                    failed: report.failed,
                })
            }
        }
    }

    /// Number of documents (JSON) or lines (JSONL) written so far.
    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{FailureKind, ItemError, ItemResult, ItemStatus};

    fn report() -> BatchReport {
        BatchReport {
            collection_id: 3,
            processed: 1,
            skipped: 0,
            failed: 1,
            items: vec![
                ItemResult {
                    source_image_id: 10,
                    file_name: "a.png".into(),
                    status: ItemStatus::Ok,
                    artifact: None,
                    error: None,
                },
                ItemResult {
                    source_image_id: 11,
                    file_name: "b.png".into(),
                    status: ItemStatus::Failed,
                    artifact: None,
                    error: Some(ItemError {
                        kind: FailureKind::StorageRead,
                        message: "Blob not found: k".into(),
                    }),
                },
            ],
        }
    }

    #[test]
    fn test_batch_as_json_document() {
        let mut writer = ReportWriter::new(Vec::new(), ReportFormat::Json, false);
        writer.write_batch(&report()).unwrap();
        let output = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("\"processed\":1"));
        assert!(output.contains("\"status\":\"failed\""));
        assert!(output.contains("\"kind\":\"storage_read\""));
    }

    #[test]
    fn test_batch_as_jsonl() {
        let mut writer = ReportWriter::new(Vec::new(), ReportFormat::JsonLines, true);
        writer.write_batch(&report()).unwrap();
        assert_eq!(writer.lines_written(), 3);

        let output = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = output.trim().split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"source_image_id\":10"));
        assert!(lines[2].starts_with("{\"collection_id\":3"));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ReportFormat::parse("json"), Some(ReportFormat::Json));
        assert_eq!(ReportFormat::parse("NDJSON"), Some(ReportFormat::JsonLines));
        assert_eq!(ReportFormat::parse("xml"), None);
    }
}
