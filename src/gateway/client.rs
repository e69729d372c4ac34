use std::io::{Read, Write};
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use super::credentials::{Credentials, Secret};
use super::errors::GatewayError;
use super::signing::{RequestSigner, HMAC_HEADER};
use crate::reports::{PortalReport, ReportDescriptor};

pub const DEFAULT_BASE_URL: &str = "https://portalapi.lcegateway.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const TOKEN_PATH: &str = "Token";
const REPORTS_PATH: &str = "GetReportBlobs";
/// The portal only understands this literal for "every report".
const ALL_REPORTS: &str = "all";
const CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token: String,
    pub reports: String,
}

impl Endpoints {
    pub fn from_base(base_url: &str) -> Self {
        let base = base_url.trim().trim_end_matches('/');
        Self {
            token: format!("{base}/{TOKEN_PATH}"),
            reports: format!("{base}/{REPORTS_PATH}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobStats {
    pub bytes_written: u64,
    pub content_length: Option<u64>,
}

#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    endpoints: Endpoints,
    credentials: Credentials,
    signer: RequestSigner,
}

impl GatewayClient {
    pub fn new(config: &ClientConfig, credentials: Credentials) -> Result<Self, GatewayError> {
        credentials.validate()?;
        let signer = RequestSigner::new(&credentials.hmac_user, credentials.hmac_key.expose())?;
        let endpoints = Endpoints::from_base(&config.base_url);
        Url::parse(&endpoints.token).map_err(|err| GatewayError::InvalidUrl {
            url: config.base_url.clone(),
            reason: err.to_string(),
        })?;
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("lce-reports/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| GatewayError::transport(&config.base_url, err))?;
        Ok(Self {
            http,
            endpoints,
            credentials,
            signer,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Exchanges username/password for a bearer token.
    pub fn connect(&self) -> Result<GatewaySession, GatewayError> {
        let url = &self.endpoints.token;
        tracing::debug!("requesting token from {url}");
        let form = [
            ("grant_type", "password"),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.expose().as_str()),
        ];
        let response = self
            .http
            .post(url)
            .form(&form)
            .send()
            .map_err(|err| GatewayError::transport(url, err))?;
        let response = ensure_success(url, response)?;
        let token: TokenResponse = response.json().map_err(|err| GatewayError::InvalidResponse {
            url: url.clone(),
            reason: format!("token response: {err}"),
        })?;
        if token.access_token.trim().is_empty() {
            return Err(GatewayError::InvalidResponse {
                url: url.clone(),
                reason: "empty access_token".into(),
            });
        }
        let expires_in = token.expires_in;
        let token = Secret::new(token.access_token);
        tracing::debug!(expires_in = ?expires_in, "token acquired: {}", token.masked());
        Ok(GatewaySession {
            client: self.clone(),
            token,
            expires_in,
        })
    }

    /// URL of the report listing for the configured user, exactly as sent
    /// (and therefore as signed).
    pub fn list_url(&self) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.endpoints.reports).map_err(|err| GatewayError::InvalidUrl {
            url: self.endpoints.reports.clone(),
            reason: err.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("userName", &self.credentials.username)
            .append_pair("fileName", ALL_REPORTS);
        Ok(url)
    }

    fn signed_get(&self, url: &Url, token: &Secret<String>) -> RequestBuilder {
        let header = self.signer.header("GET", url.as_str());
        tracing::debug!("signed GET {url}");
        self.http
            .get(url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token.expose()))
            .header(HMAC_HEADER, header)
    }
}

/// A client holding a bearer token; every request is signed.
#[derive(Clone)]
pub struct GatewaySession {
    client: GatewayClient,
    token: Secret<String>,
    expires_in: Option<u64>,
}

impl GatewaySession {
    pub fn client(&self) -> &GatewayClient {
        &self.client
    }

    /// Token lifetime in seconds, when the portal reports one.
    pub fn expires_in(&self) -> Option<u64> {
        self.expires_in
    }

    pub fn list_reports(&self) -> Result<Vec<ReportDescriptor>, GatewayError> {
        let url = self.client.list_url()?;
        tracing::info!("requesting report list from {url}");
        let response = self
            .client
            .signed_get(&url, &self.token)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .map_err(|err| GatewayError::transport(url.as_str(), err))?;
        let response = ensure_success(url.as_str(), response)?;
        let body = response
            .text()
            .map_err(|err| GatewayError::transport(url.as_str(), err))?;
        let reports = parse_report_list(&body).map_err(|reason| GatewayError::InvalidResponse {
            url: url.to_string(),
            reason,
        })?;
        tracing::info!("portal lists {} reports", reports.len());
        Ok(reports)
    }

    /// Streams the blob at `uri` into `sink`, calling `progress` with the
    /// running byte count and the announced length.
    pub fn fetch_blob(
        &self,
        uri: &str,
        sink: &mut dyn Write,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<BlobStats, GatewayError> {
        let url = Url::parse(uri).map_err(|err| GatewayError::InvalidUrl {
            url: uri.to_string(),
            reason: err.to_string(),
        })?;
        let response = self
            .client
            .signed_get(&url, &self.token)
            .send()
            .map_err(|err| GatewayError::transport(uri, err))?;
        let mut response = ensure_success(uri, response)?;
        let content_length = response.content_length();

        let mut written = 0u64;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|source| GatewayError::Interrupted {
                    url: uri.to_string(),
                    source,
                })?;
            if read == 0 {
                break;
            }
            sink.write_all(&buffer[..read])
                .map_err(|source| GatewayError::Io {
                    path: uri.to_string(),
                    source,
                })?;
            written += read as u64;
            progress(written, content_length);
        }
        Ok(BlobStats {
            bytes_written: written,
            content_length,
        })
    }
}

fn ensure_success(url: &str, response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    tracing::warn!("{url} answered {status}");
    Err(GatewayError::from_status(url, status, &body))
}

/// The listing is a JSON string whose content is the JSON array of reports.
/// A plain array is accepted as well.
pub fn parse_report_list(body: &str) -> Result<Vec<ReportDescriptor>, String> {
    let outer: Value =
        serde_json::from_str(body).map_err(|err| format!("body is not JSON: {err}"))?;
    let list = match outer {
        Value::String(inner) => serde_json::from_str::<Value>(&inner)
            .map_err(|err| format!("embedded report list is not JSON: {err}"))?,
        other => other,
    };
    if !list.is_array() {
        return Err(format!("expected a list of reports, got {}", json_kind(&list)));
    }
    let raw: Vec<PortalReport> =
        serde_json::from_value(list).map_err(|err| format!("malformed report entry: {err}"))?;
    let total = raw.len();
    let reports: Vec<ReportDescriptor> = raw
        .into_iter()
        .filter_map(PortalReport::into_descriptor)
        .collect();
    if reports.len() < total {
        tracing::debug!("dropped {} entries without name or uri", total - reports.len());
    }
    Ok(reports)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn client(base: &str) -> GatewayClient {
        let config = ClientConfig {
            base_url: base.into(),
            ..ClientConfig::default()
        };
        let creds = Credentials::new("j doe&co", "pw", "hmac-user", "a2V5");
        GatewayClient::new(&config, creds).unwrap()
    }

    #[test]
    fn endpoints_ignore_trailing_slash() {
        let endpoints = Endpoints::from_base("https://portal.example/api/");
        assert_eq!(endpoints.token, "https://portal.example/api/Token");
        assert_eq!(endpoints.reports, "https://portal.example/api/GetReportBlobs");
    }

    #[test]
    fn list_url_escapes_username() {
        let url = client(DEFAULT_BASE_URL).list_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://portalapi.lcegateway.com/GetReportBlobs?userName=j+doe%26co&fileName=all"
        );
    }

    #[test]
    fn new_rejects_incomplete_credentials() {
        let creds = Credentials::new("jdoe", "", "hmac-user", "a2V5");
        let err = GatewayClient::new(&ClientConfig::default(), creds).err().unwrap();
        assert!(matches!(err, GatewayError::MissingCredential("password")));
    }

    #[test]
    fn new_rejects_bad_base_url() {
        let config = ClientConfig {
            base_url: "not a url".into(),
            ..ClientConfig::default()
        };
        let creds = Credentials::new("jdoe", "pw", "hmac-user", "a2V5");
        assert!(matches!(
            GatewayClient::new(&config, creds),
            Err(GatewayError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn truncated_body_is_an_interrupted_transfer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            while !request.ends_with(b"\r\n\r\n") {
                if stream.read(&mut byte).unwrap() == 0 {
                    break;
                }
                request.push(byte[0]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789")
                .unwrap();
        });

        let base = format!("http://{addr}");
        let session = GatewaySession {
            client: client(&base),
            token: Secret::new("token".to_string()),
            expires_in: None,
        };
        let mut sink = Vec::new();
        let err = session
            .fetch_blob(&format!("{base}/blob.csv"), &mut sink, &mut |_, _| {})
            .unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, GatewayError::Interrupted { .. }), "{err}");
        assert!(err.to_string().contains("broke off"), "{err}");
    }

    #[test]
    fn parses_double_encoded_list() {
        let inner = r#"[{"ReportName":"A_2024-03-02.csv","ReportBlobUri":"https://blob/a"},{"ReportName":"B.csv"}]"#;
        let body = serde_json::to_string(inner).unwrap();
        let reports = parse_report_list(&body).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].blob_uri, "https://blob/a");
    }

    #[test]
    fn parses_plain_list() {
        let body = r#"[{"ReportName":"A.csv","ReportBlobUri":"https://blob/a"}]"#;
        assert_eq!(parse_report_list(body).unwrap().len(), 1);
    }

    #[test]
    fn rejects_non_list() {
        let err = parse_report_list(r#"{"Message":"nope"}"#).unwrap_err();
        assert!(err.contains("an object"), "{err}");
        let err = parse_report_list("\"not json inside\"").unwrap_err();
        assert!(err.contains("embedded"), "{err}");
        assert!(parse_report_list("<html>").is_err());
    }
}
