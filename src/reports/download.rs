use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Component, Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::{catalog::ReportDescriptor, metadata::HashingWriter};
use crate::gateway::{BlobStats, GatewaySession};

/// Source of report bytes. The portal session is the real one; tests plug
/// in fakes.
pub trait BlobFetcher: Send + Sync {
    fn fetch_blob(
        &self,
        uri: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<BlobStats>;
}

impl BlobFetcher for GatewaySession {
    fn fetch_blob(
        &self,
        uri: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<BlobStats> {
        GatewaySession::fetch_blob(self, uri, sink, progress).map_err(Into::into)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPlan {
    pub name: String,
    pub uri: String,
    pub destination: PathBuf,
}

impl DownloadPlan {
    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        let mut path = self.destination.clone().into_os_string();
        path.push(".part");
        PathBuf::from(path)
    }
}

/// Plans the download of `report` into `dir`. The portal-supplied name must
/// be a bare file name.
pub fn plan_for(report: &ReportDescriptor, dir: &Path) -> Result<DownloadPlan> {
    let file_name = safe_file_name(&report.name)
        .ok_or_else(|| anyhow!("refusing unsafe report name {:?}", report.name))?;
    Ok(DownloadPlan {
        name: report.name.clone(),
        uri: report.blob_uri.clone(),
        destination: dir.join(file_name),
    })
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub final_path: PathBuf,
    pub bytes_downloaded: u64,
    pub checksum: String,
}

pub fn download(plan: &DownloadPlan, fetcher: &dyn BlobFetcher) -> Result<DownloadOutcome> {
    download_with_progress(plan, fetcher, |_, _| {})
}

pub fn download_with_progress<F>(
    plan: &DownloadPlan,
    fetcher: &dyn BlobFetcher,
    mut progress: F,
) -> Result<DownloadOutcome>
where
    F: FnMut(u64, Option<u64>),
{
    let staging = plan.staging_path();
    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create download directory {}", parent.display()))?;
    }

    let result = stage(plan, &staging, fetcher, &mut progress)
        .and_then(|staged| finalize(plan, &staging).map(|()| staged));
    match result {
        Ok((bytes_downloaded, checksum)) => Ok(DownloadOutcome {
            final_path: plan.destination.clone(),
            bytes_downloaded,
            checksum,
        }),
        Err(error) => {
            let _ = fs::remove_file(&staging);
            Err(error)
        }
    }
}

/// Moves the staged file over the destination, replacing an earlier copy.
fn finalize(plan: &DownloadPlan, staging: &Path) -> Result<()> {
    if plan.destination.exists() {
        fs::remove_file(&plan.destination)
            .with_context(|| format!("replace existing {}", plan.destination.display()))?;
    }
    fs::rename(staging, &plan.destination).with_context(|| {
        format!(
            "move {} to {}",
            staging.display(),
            plan.destination.display()
        )
    })
}

fn stage<F>(
    plan: &DownloadPlan,
    staging: &Path,
    fetcher: &dyn BlobFetcher,
    progress: &mut F,
) -> Result<(u64, String)>
where
    F: FnMut(u64, Option<u64>),
{
    let file = File::create(staging)
        .with_context(|| format!("create staging file {}", staging.display()))?;
    let mut writer = HashingWriter::new(BufWriter::new(file));
    let stats = fetcher
        .fetch_blob(&plan.uri, &mut writer, &mut |done, total| progress(done, total))
        .with_context(|| format!("download {}", plan.name))?;

    if let Some(expected) = stats.content_length {
        if stats.bytes_written != expected {
            return Err(anyhow!(
                "size mismatch for {}: expected {} bytes, got {}",
                plan.name,
                expected,
                stats.bytes_written
            ));
        }
    }

    let written = writer.written();
    let (mut inner, checksum) = writer.finish();
    inner.flush().context("flush staging file")?;
    Ok((written, checksum))
}

pub fn progress_fraction(downloaded: u64, expected: Option<u64>) -> f32 {
    if let Some(total) = expected {
        if total > 0 {
            return ((downloaded as f64 / total as f64).clamp(0.0, 1.0)) as f32;
        }
    }
    0.0
}

/// Separators plus the characters Windows refuses in file names.
const FORBIDDEN_NAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

fn safe_file_name(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(FORBIDDEN_NAME_CHARS) {
        return None;
    }
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(trimmed),
        _ => None,
    }
}
