use std::io::{self, Write};

use crate::MessageRecord;

/// Renders one transcript line per attachment, or a single line for plain messages.
pub fn render_record(record: &MessageRecord) -> String {
    if record.attachments.is_empty() {
        return format!("user: {}, text: {}", record.author, record.text);
    }
    record
        .attachments
        .iter()
        .map(|attachment| {
            format!(
                "user: {}, text: {}, filename: {}, filelink: {}",
                record.author, record.text, attachment.name, attachment.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Writes rendered records to an output sink.
pub struct TranscriptPrinter<W> {
    out: W,
    records_written: usize,
}

impl<W: Write> TranscriptPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            records_written: 0,
        }
    }

    pub fn print(&mut self, record: &MessageRecord) -> io::Result<()> {
        writeln!(self.out, "{}", render_record(record))?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
