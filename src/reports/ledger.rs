use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use super::catalog::{format_date, parse_date};
use super::download::DownloadOutcome;
use super::ReportDescriptor;

pub const REPORTS_DIR_NAME: &str = "LC Reports";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub name: String,
    pub blob_uri: String,
    pub day: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
    #[serde(with = "time::serde::rfc3339")]
    pub downloaded_at: OffsetDateTime,
}

/// Download history rooted at the reports directory. Each calendar day gets
/// its own sub-directory; `manifest.json` at the root records completed
/// downloads.
pub struct DownloadLedger {
    root: PathBuf,
    manifest: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl DownloadLedger {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create reports directory {}", root.display()))?;
        let manifest = root.join(MANIFEST_FILE);
        let mut ledger = Self {
            root,
            manifest,
            entries: vec![],
        };
        ledger.load_manifest()?;
        Ok(ledger)
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn day_dir(&self, day: Date) -> PathBuf {
        self.root.join(format_date(day))
    }

    pub fn ensure_day_dir(&self, day: Date) -> Result<PathBuf> {
        let dir = self.day_dir(day);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create day directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Names already fetched on a day other than `day`, whether found in a
    /// dated folder or only in the manifest. Same-day files are re-downloaded.
    pub fn previously_downloaded(&self, day: Date) -> Result<HashSet<String>> {
        let today = format_date(day);
        let mut names: HashSet<String> = self
            .entries
            .iter()
            .filter(|entry| entry.day != today)
            .map(|entry| entry.name.clone())
            .collect();

        for day_seen in self.days()? {
            if day_seen == day {
                continue;
            }
            let path = self.day_dir(day_seen);
            let Ok(files) = fs::read_dir(&path) else {
                tracing::warn!("unable to read {}", path.display());
                continue;
            };
            for file in files.flatten() {
                let is_file = file.file_type().map(|kind| kind.is_file()).unwrap_or(false);
                if !is_file {
                    continue;
                }
                if let Some(name) = file.file_name().to_str() {
                    if !name.ends_with(".part") {
                        names.insert(name.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    pub fn record(
        &mut self,
        report: &ReportDescriptor,
        day: Date,
        outcome: &DownloadOutcome,
    ) -> Result<LedgerEntry> {
        let entry = LedgerEntry {
            name: report.name.clone(),
            blob_uri: report.blob_uri.clone(),
            day: format_date(day),
            path: outcome.final_path.clone(),
            size_bytes: outcome.bytes_downloaded,
            checksum: outcome.checksum.clone(),
            downloaded_at: OffsetDateTime::now_utc(),
        };
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|current| current.name == entry.name && current.day == entry.day)
        {
            *existing = entry.clone();
        } else {
            self.entries.push(entry.clone());
        }
        self.save()?;
        Ok(entry)
    }

    /// Days that have a directory under the root, oldest first.
    pub fn days(&self) -> Result<Vec<Date>> {
        let mut days: Vec<Date> = fs::read_dir(&self.root)
            .with_context(|| format!("list reports directory {}", self.root.display()))?
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().and_then(|n| parse_date(n).ok()))
            .collect();
        days.sort();
        Ok(days)
    }

    pub fn save(&self) -> Result<()> {
        let manifest = File::create(&self.manifest).context("create download manifest")?;
        serde_json::to_writer_pretty(manifest, &self.entries)
            .context("write download manifest")?;
        Ok(())
    }

    fn load_manifest(&mut self) -> Result<()> {
        if self.manifest.exists() {
            let manifest = File::open(&self.manifest).context("open download manifest")?;
            self.entries =
                serde_json::from_reader(manifest).context("parse download manifest")?;
        }
        Ok(())
    }
}

/// `<Downloads>/LC Reports`, falling back to `~/Downloads` when the platform
/// has no registered download folder.
pub fn default_root() -> Result<PathBuf> {
    let dirs = UserDirs::new().context("missing user directories")?;
    let downloads = dirs
        .download_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dirs.home_dir().join("Downloads"));
    Ok(downloads.join(REPORTS_DIR_NAME))
}
