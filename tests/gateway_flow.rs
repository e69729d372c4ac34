mod common;

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use common::{dated_name, sample_reports, Portal, HMAC_KEY, HMAC_USER, PASSWORD, USERNAME};
use lce_reports::core::app_state::AppState;
use lce_reports::core::events::NullSink;
use lce_reports::core::settings::SettingsManager;
use lce_reports::gateway::{ClientConfig, Credentials, GatewayClient, GatewayError};
use lce_reports::reports::{format_date, DateRange, DownloadSummary, ReportDescriptor};

fn credentials() -> Credentials {
    Credentials::new(USERNAME, PASSWORD, HMAC_USER, HMAC_KEY)
}

fn client(portal: &Portal, credentials: Credentials) -> GatewayClient {
    let config = ClientConfig {
        base_url: portal.base_url().to_string(),
        ..ClientConfig::default()
    };
    GatewayClient::new(&config, credentials).unwrap()
}

fn app_state(portal: &Portal, tmp: &TempDir) -> AppState {
    let manager = SettingsManager::at(tmp.path().join("config.json")).unwrap();
    AppState::new(manager, credentials())
        .with_base_url(Some(portal.base_url().to_string()))
        .with_output_dir(Some(tmp.path().join("reports")))
}

#[test]
fn lists_double_encoded_reports_with_dates() {
    let portal = Portal::start(sample_reports());
    let session = client(&portal, credentials()).connect().unwrap();
    assert_eq!(session.expires_in(), Some(3600));

    let reports = session.list_reports().unwrap();
    assert_eq!(portal.list_hits(), 1);
    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&dated_name("Daily", 2).as_str()));
    assert!(reports.iter().all(|r| r.date.is_some()));
    assert!(reports[0].blob_uri.starts_with(portal.base_url()));
}

#[test]
fn wrong_password_is_an_auth_failure() {
    let portal = Portal::start(sample_reports());
    let creds = Credentials::new(USERNAME, "nope", HMAC_USER, HMAC_KEY);
    let error = client(&portal, creds).connect().err().unwrap();
    assert!(matches!(error, GatewayError::Unauthorized { .. }));
    assert!(error.is_auth_failure());
    assert_eq!(error.status(), Some(401));
}

#[test]
fn wrong_hmac_key_is_forbidden() {
    let portal = Portal::start(sample_reports());
    // valid base64, different key material
    let creds = Credentials::new(USERNAME, PASSWORD, HMAC_USER, "b3RoZXIta2V5");
    let session = client(&portal, creds).connect().unwrap();
    let error = session.list_reports().err().unwrap();
    assert!(matches!(error, GatewayError::Forbidden { .. }));
    assert!(error.is_auth_failure());
}

#[test]
fn range_filter_drops_old_reports() {
    let portal = Portal::start(sample_reports());
    let tmp = TempDir::new().unwrap();
    let state = app_state(&portal, &tmp);
    let session = state.connect().unwrap();
    let range = state.date_range(None, None).unwrap();
    let reports = state.load_reports(&session, &range).unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| !r.name.starts_with("Archive")));
}

#[test]
fn downloads_into_todays_folder_and_records_manifest() {
    let portal = Portal::start(sample_reports());
    let tmp = TempDir::new().unwrap();
    let state = app_state(&portal, &tmp);
    let session = state.connect().unwrap();
    let range = DateRange::last_days(15, AppState::today());
    let reports = state.load_reports(&session, &range).unwrap();

    let summary = state
        .download(session, reports, false, Arc::new(NullSink))
        .unwrap();
    assert_eq!(
        summary,
        DownloadSummary {
            downloaded: 2,
            skipped: 0,
            failed: 0,
        }
    );

    let day_dir = tmp
        .path()
        .join("reports")
        .join(format_date(AppState::today()));
    let daily = fs::read(day_dir.join(dated_name("Daily", 2))).unwrap();
    assert_eq!(daily, b"id,amount\n1,10\n");
    assert!(!day_dir.join(format!("{}.part", dated_name("Daily", 2))).exists());

    let ledger = state.open_ledger().unwrap();
    assert_eq!(ledger.entries().len(), 2);
    assert!(ledger.entries().iter().all(|entry| entry.checksum.len() == 64));
}

#[test]
fn earlier_days_are_skipped_unless_forced() {
    let portal = Portal::start(sample_reports());
    let tmp = TempDir::new().unwrap();
    let earlier = tmp.path().join("reports").join("2020-01-01");
    fs::create_dir_all(&earlier).unwrap();
    fs::write(earlier.join(dated_name("Daily", 2)), "old copy").unwrap();

    let state = app_state(&portal, &tmp);
    let session = state.connect().unwrap();
    let range = state.date_range(None, None).unwrap();
    let reports = state.load_reports(&session, &range).unwrap();

    let summary = state
        .download(session.clone(), reports.clone(), false, Arc::new(NullSink))
        .unwrap();
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(portal.blob_hits(), 1);

    let summary = state
        .download(session, reports, true, Arc::new(NullSink))
        .unwrap();
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.skipped, 0);
}

#[test]
fn one_failed_blob_does_not_stop_the_rest() {
    let portal = Portal::start(sample_reports());
    let tmp = TempDir::new().unwrap();
    let state = app_state(&portal, &tmp);
    let session = state.connect().unwrap();

    let missing = ReportDescriptor::new(
        dated_name("Missing", 1),
        portal.blob_uri("not-there.csv"),
    );
    let daily = dated_name("Daily", 2);
    let present = ReportDescriptor::new(daily.clone(), portal.blob_uri(&daily));
    let summary = state
        .download(session, vec![missing, present], false, Arc::new(NullSink))
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.total(), 2);
}
