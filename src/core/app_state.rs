use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use time::{Date, OffsetDateTime};

use crate::gateway::{Credentials, GatewayClient, GatewaySession};
use crate::reports::{
    default_root, filter_by_range, DateRange, DownloadJob, DownloadLedger, DownloadService,
    DownloadSummary, ReportDescriptor,
};

use super::events::EventSink;
use super::settings::{Settings, SettingsManager};

/// Everything one invocation needs: configuration, the resolved credential
/// set, and the download history.
pub struct AppState {
    settings: Arc<SettingsManager>,
    overrides: Credentials,
    base_url: Option<String>,
    output_dir: Option<PathBuf>,
}

impl AppState {
    /// `overrides` holds values given on the command line; empty fields fall
    /// back to the environment, then to stored settings.
    pub fn new(settings: SettingsManager, overrides: Credentials) -> Self {
        Self {
            settings: Arc::new(settings),
            overrides,
            base_url: None,
            output_dir: None,
        }
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn with_base_url(mut self, url: Option<String>) -> Self {
        self.base_url = url.filter(|url| !url.trim().is_empty());
        self
    }

    pub fn settings_manager(&self) -> Arc<SettingsManager> {
        self.settings.clone()
    }

    pub fn settings(&self) -> Settings {
        self.settings.read()
    }

    /// `--base-url`, then `LCE_BASE_URL`, then the stored value.
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.settings.read().effective_base_url())
    }

    pub fn credentials(&self) -> Credentials {
        self.overrides
            .clone()
            .or(Credentials::from_env())
            .or(self.settings.read().stored_credentials())
    }

    pub fn today() -> Date {
        OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .date()
    }

    pub fn date_range(&self, from: Option<Date>, to: Option<Date>) -> Result<DateRange> {
        let days = self.settings.read().default_range_days;
        DateRange::resolve(from, to, days, Self::today()).map_err(Into::into)
    }

    pub fn connect(&self) -> Result<GatewaySession> {
        let settings = self.settings.read();
        let credentials = self.credentials();
        tracing::debug!("credentials in use: {}", credentials.masked_summary());
        let mut config = settings.client_config();
        config.base_url = self.base_url();
        let client = GatewayClient::new(&config, credentials)?;
        tracing::info!("connecting to {}", config.base_url);
        let session = client.connect()?;
        Ok(session)
    }

    /// Lists the portal's reports that fall inside `range`.
    pub fn load_reports(
        &self,
        session: &GatewaySession,
        range: &DateRange,
    ) -> Result<Vec<ReportDescriptor>> {
        let all = session.list_reports()?;
        let total = all.len();
        let reports = filter_by_range(all, range);
        tracing::info!("{} of {} reports fall in {range}", reports.len(), total);
        Ok(reports)
    }

    pub fn ledger_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.output_dir {
            return Ok(dir.clone());
        }
        match self.settings.read().output_dir {
            Some(dir) => Ok(dir),
            None => default_root(),
        }
    }

    pub fn open_ledger(&self) -> Result<DownloadLedger> {
        let root = self.ledger_root()?;
        DownloadLedger::open(&root)
            .with_context(|| format!("open reports directory {}", root.display()))
    }

    /// Queues `reports` on a fresh worker. The caller drains events from its
    /// sink and then joins the returned service.
    pub fn start_downloads(
        &self,
        session: GatewaySession,
        reports: Vec<ReportDescriptor>,
        force: bool,
        sink: Arc<dyn EventSink>,
    ) -> Result<DownloadService> {
        let ledger = Arc::new(Mutex::new(self.open_ledger()?));
        let mut service = DownloadService::new(Arc::new(session), ledger, Self::today(), sink)?;
        for report in reports {
            service.queue(DownloadJob { report, force })?;
        }
        service.close();
        Ok(service)
    }

    /// Runs every download to completion, reporting through `sink`.
    pub fn download(
        &self,
        session: GatewaySession,
        reports: Vec<ReportDescriptor>,
        force: bool,
        sink: Arc<dyn EventSink>,
    ) -> Result<DownloadSummary> {
        self.start_downloads(session, reports, force, sink)?.join()
    }
}
