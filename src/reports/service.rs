use std::{
    collections::HashSet,
    sync::Arc,
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use time::Date;

use crate::core::events::{emit_status, EventSink, ReportStatus};

use super::{
    download::{download_with_progress, plan_for, progress_fraction, BlobFetcher},
    DownloadLedger, ReportDescriptor,
};

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub report: ReportDescriptor,
    /// Download even when an earlier day already has this report.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DownloadSummary {
    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }
}

impl std::fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} downloaded, {} skipped, {} failed",
            self.downloaded, self.skipped, self.failed
        )
    }
}

/// Sequential download worker. Jobs run one at a time in queue order on a
/// dedicated thread; status changes go to the event sink.
pub struct DownloadService {
    sender: Option<Sender<DownloadJob>>,
    worker: Option<JoinHandle<DownloadSummary>>,
}

impl DownloadService {
    pub fn new(
        fetcher: Arc<dyn BlobFetcher>,
        ledger: Arc<Mutex<DownloadLedger>>,
        day: Date,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let previous = ledger
            .lock()
            .previously_downloaded(day)
            .context("scan earlier downloads")?;
        let worker = thread::Builder::new()
            .name("report-downloads".into())
            .spawn(move || worker_loop(receiver, fetcher, ledger, day, previous, sink))
            .context("spawn download worker")?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn queue(&self, job: DownloadJob) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("download queue already closed"))?;
        sender.send(job).context("send download job to worker")
    }

    /// Stops accepting jobs; the worker exits once the queue drains.
    pub fn close(&mut self) {
        self.sender.take();
    }

    pub fn join(mut self) -> Result<DownloadSummary> {
        self.close();
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("download worker already joined"))?;
        worker
            .join()
            .map_err(|_| anyhow!("download worker panicked"))
    }
}

fn worker_loop(
    receiver: Receiver<DownloadJob>,
    fetcher: Arc<dyn BlobFetcher>,
    ledger: Arc<Mutex<DownloadLedger>>,
    day: Date,
    previous: HashSet<String>,
    sink: Arc<dyn EventSink>,
) -> DownloadSummary {
    let mut summary = DownloadSummary::default();
    for job in receiver.iter() {
        let name = job.report.name.clone();
        emit_status(sink.as_ref(), &name, ReportStatus::Pending);

        if !job.force && previous.contains(&name) {
            tracing::info!("skipping {name}: downloaded on an earlier day");
            emit_status(sink.as_ref(), &name, ReportStatus::Skipped);
            summary.skipped += 1;
            continue;
        }

        match run_job(&job, fetcher.as_ref(), &ledger, day, sink.as_ref()) {
            Ok(status) => {
                emit_status(sink.as_ref(), &name, status);
                summary.downloaded += 1;
            }
            Err(error) => {
                tracing::warn!("failed to download {name}: {error:#}");
                emit_status(
                    sink.as_ref(),
                    &name,
                    ReportStatus::Error {
                        message: format!("{error:#}"),
                    },
                );
                summary.failed += 1;
            }
        }
    }
    tracing::info!("downloads finished: {summary}");
    summary
}

fn run_job(
    job: &DownloadJob,
    fetcher: &dyn BlobFetcher,
    ledger: &Arc<Mutex<DownloadLedger>>,
    day: Date,
    sink: &dyn EventSink,
) -> Result<ReportStatus> {
    let dir = ledger.lock().ensure_day_dir(day)?;
    let plan = plan_for(&job.report, &dir)?;
    tracing::info!("downloading {} to {}", plan.name, plan.destination.display());

    let mut last_percent = None;
    let outcome = download_with_progress(&plan, fetcher, |downloaded, expected| {
        let progress = progress_fraction(downloaded, expected);
        let percent = (progress * 100.0) as u32;
        // unknown sizes report every chunk so byte counts still move
        if expected.is_some() && last_percent == Some(percent) {
            return;
        }
        last_percent = Some(percent);
        emit_status(
            sink,
            &plan.name,
            ReportStatus::Downloading {
                progress,
                bytes: downloaded,
            },
        );
    })?;

    if let Err(error) = ledger.lock().record(&job.report, day, &outcome) {
        tracing::warn!("failed to record {} in manifest: {error:#}", plan.name);
    }
    tracing::info!(
        checksum = %outcome.checksum,
        "saved {} ({} bytes)",
        outcome.final_path.display(),
        outcome.bytes_downloaded
    );
    Ok(ReportStatus::Downloaded {
        path: outcome.final_path,
        bytes: outcome.bytes_downloaded,
    })
}
