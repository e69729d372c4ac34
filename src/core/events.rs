use std::path::PathBuf;

use crossbeam_channel::Sender;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum ReportStatus {
    Pending,
    Downloading { progress: f32, bytes: u64 },
    Downloaded { path: PathBuf, bytes: u64 },
    Skipped,
    Error { message: String },
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportStatus::Downloaded { .. } | ReportStatus::Skipped | ReportStatus::Error { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportEvent {
    pub name: String,
    pub status: ReportStatus,
}

/// Receives status changes from the download worker.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ReportEvent);
}

pub struct ChannelSink {
    sender: Sender<ReportEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<ReportEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ReportEvent) {
        // receiver gone means nobody is rendering anymore
        let _ = self.sender.send(event);
    }
}

pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ReportEvent) {}
}

pub fn emit_status(sink: &dyn EventSink, name: &str, status: ReportStatus) {
    sink.emit(ReportEvent {
        name: name.to_string(),
        status,
    });
}
