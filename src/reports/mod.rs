mod catalog;
mod download;
mod ledger;
mod metadata;
mod service;

pub use catalog::{
    extract_date, filter_by_range, find_by_name, format_date, parse_date, CatalogError,
    DateRange, PortalReport, ReportDescriptor, DEFAULT_RANGE_DAYS,
};
pub use download::{
    download, download_with_progress, plan_for, progress_fraction, BlobFetcher,
    DownloadOutcome, DownloadPlan,
};
pub use ledger::{default_root, DownloadLedger, LedgerEntry, REPORTS_DIR_NAME};
pub use metadata::HashingWriter;
pub use service::{DownloadJob, DownloadService, DownloadSummary};
