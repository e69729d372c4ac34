use std::io::{self, Write};

use crate::core::events::{ReportEvent, ReportStatus};
use crate::reports::DownloadSummary;

/// Renders download events as one status line per report. In-flight
/// progress rewrites the current line with `\r`.
pub struct ProgressPrinter<W: Write> {
    out: W,
    line_open: bool,
}

impl ProgressPrinter<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line_open: false,
        }
    }

    pub fn render(&mut self, event: &ReportEvent) -> io::Result<()> {
        match &event.status {
            ReportStatus::Pending => Ok(()),
            ReportStatus::Downloading { progress, bytes } => {
                let percent = (progress * 100.0).round() as u32;
                if *progress > 0.0 {
                    write!(self.out, "\r{}: {:>3}%", event.name, percent)?;
                } else {
                    write!(self.out, "\r{}: {} bytes", event.name, bytes)?;
                }
                self.line_open = true;
                self.out.flush()
            }
            ReportStatus::Downloaded { path, bytes } => self.finish_line(&format!(
                "{}: saved {} bytes to {}",
                event.name,
                bytes,
                path.display()
            )),
            ReportStatus::Skipped => {
                self.finish_line(&format!("{}: skipped (downloaded earlier)", event.name))
            }
            ReportStatus::Error { message } => {
                self.finish_line(&format!("{}: failed: {}", event.name, message))
            }
        }
    }

    pub fn summary(&mut self, summary: &DownloadSummary) -> io::Result<()> {
        self.finish_line(&format!("Done: {summary}"))
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn finish_line(&mut self, text: &str) -> io::Result<()> {
        if self.line_open {
            // clear whatever the progress line left behind
            write!(self.out, "\r\x1b[2K")?;
            self.line_open = false;
        }
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }
}
