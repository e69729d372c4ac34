use reqwest::StatusCode;
use thiserror::Error;

/// Portal error bodies can be whole HTML pages; keep messages readable.
const MAX_BODY_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("HMAC key is not valid base64: {0}")]
    InvalidHmacKey(String),
    #[error("bad request (400) from {url}: {body}")]
    BadRequest { url: String, body: String },
    #[error("authentication failed (401) at {url}; check username and password: {body}")]
    Unauthorized { url: String, body: String },
    #[error("access denied (403) at {url}; check HMAC user and key: {body}")]
    Forbidden { url: String, body: String },
    #[error("portal server error ({status}) at {url}: {body}")]
    Server {
        url: String,
        status: u16,
        body: String,
    },
    #[error("unexpected status {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("transfer from {url} broke off: {source}")]
    Interrupted {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl GatewayError {
    /// Maps a non-success HTTP status to the matching variant.
    pub fn from_status(url: &str, status: StatusCode, body: &str) -> Self {
        let url = url.to_string();
        let body = truncate(body);
        match status.as_u16() {
            400 => GatewayError::BadRequest { url, body },
            401 => GatewayError::Unauthorized { url, body },
            403 => GatewayError::Forbidden { url, body },
            code @ 500..=599 => GatewayError::Server {
                url,
                status: code,
                body,
            },
            code => GatewayError::Status {
                url,
                status: code,
                body,
            },
        }
    }

    pub fn transport(url: &str, source: reqwest::Error) -> Self {
        GatewayError::Transport {
            url: url.to_string(),
            source,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::BadRequest { .. } => Some(400),
            GatewayError::Unauthorized { .. } => Some(401),
            GatewayError::Forbidden { .. } => Some(403),
            GatewayError::Server { status, .. } | GatewayError::Status { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// True when re-entering credentials is the likely fix.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Unauthorized { .. }
                | GatewayError::Forbidden { .. }
                | GatewayError::MissingCredential(_)
                | GatewayError::InvalidHmacKey(_)
        )
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_BODY_CHARS).collect();
    cut.push_str("...");
    cut
}
