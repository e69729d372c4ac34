use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;
use time::OffsetDateTime;
use uuid::Uuid;

use super::errors::GatewayError;

type HmacSha256 = Hmac<Sha256>;

pub const HMAC_HEADER: &str = "HMacAuthorizationHeader";
pub const HMAC_SCHEME: &str = "amx";

/// Everything except RFC 3986 unreserved characters gets escaped.
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes the full URL (separators included) and lowercases the
/// result, which is the canonical form the portal signs over.
pub fn encode_url(url: &str) -> String {
    utf8_percent_encode(url, URL_ENCODE_SET)
        .to_string()
        .to_lowercase()
}

/// Signs portal requests with the HMAC user/key pair.
#[derive(Clone)]
pub struct RequestSigner {
    user: String,
    mac: HmacSha256,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("user", &self.user)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl RequestSigner {
    pub fn new(user: &str, key_b64: &str) -> Result<Self, GatewayError> {
        if user.trim().is_empty() {
            return Err(GatewayError::MissingCredential("HMAC user"));
        }
        let key = BASE64_STANDARD
            .decode(key_b64.trim())
            .map_err(|err| GatewayError::InvalidHmacKey(err.to_string()))?;
        if key.is_empty() {
            return Err(GatewayError::MissingCredential("HMAC key"));
        }
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|err| GatewayError::InvalidHmacKey(err.to_string()))?;
        Ok(Self {
            user: user.to_string(),
            mac,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn signature(&self, method: &str, url: &str, timestamp: &str, nonce: &str) -> String {
        let raw = format!(
            "{}{}{}{}{}",
            self.user,
            method.to_uppercase(),
            encode_url(url),
            timestamp,
            nonce
        );
        let mut mac = self.mac.clone();
        mac.update(raw.as_bytes());
        BASE64_STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Builds the header value for `method url` with a fresh nonce and the
    /// current UNIX time.
    pub fn header(&self, method: &str, url: &str) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        self.header_with(method, url, &timestamp, &nonce)
    }

    pub fn header_with(&self, method: &str, url: &str, timestamp: &str, nonce: &str) -> String {
        let signature = self.signature(method, url, timestamp, nonce);
        format!(
            "{HMAC_SCHEME} {}:{}:{}:{}",
            self.user, signature, nonce, timestamp
        )
    }

    /// Checks a header produced by [`RequestSigner::header`] against `method url`.
    pub fn verify(&self, method: &str, url: &str, header: &str) -> bool {
        match parse_header(header) {
            Some(parts) => {
                parts.user == self.user
                    && parts.signature
                        == self.signature(method, url, &parts.timestamp, &parts.nonce)
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeader {
    pub user: String,
    pub signature: String,
    pub nonce: String,
    pub timestamp: String,
}

pub fn parse_header(value: &str) -> Option<SignedHeader> {
    let rest = value.strip_prefix(HMAC_SCHEME)?.strip_prefix(' ')?;
    let mut parts = rest.split(':');
    let user = parts.next()?;
    let signature = parts.next()?;
    let nonce = parts.next()?;
    let timestamp = parts.next()?;
    if parts.next().is_some() || user.is_empty() || signature.is_empty() {
        return None;
    }
    Some(SignedHeader {
        user: user.to_string(),
        signature: signature.to_string(),
        nonce: nonce.to_string(),
        timestamp: timestamp.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "c3VwZXItc2VjcmV0LWtleS1tYXRlcmlhbA==";
    const LIST_URL: &str =
        "https://portalapi.lcegateway.com/GetReportBlobs?userName=jdoe&fileName=all";

    #[test]
    fn encodes_everything_but_unreserved_and_lowercases() {
        assert_eq!(encode_url("a b~c_d.e-f/g"), "a%20b~c_d.e-f%2fg");
        assert_eq!(
            encode_url(LIST_URL),
            "https%3a%2f%2fportalapi.lcegateway.com%2fgetreportblobs%3fusername%3djdoe%26filename%3dall"
        );
    }

    #[test]
    fn signature_matches_known_vector() {
        let signer = RequestSigner::new("hmac-user", KEY).unwrap();
        let signature = signer.signature(
            "GET",
            LIST_URL,
            "1700000000",
            "0123456789abcdef0123456789abcdef",
        );
        assert_eq!(signature, "XWEH4hQIR+tQXls4C8W4stwX3+1xIHpj7mfqOzw+GPQ=");
    }

    #[test]
    fn header_round_trips_and_verifies() {
        let signer = RequestSigner::new("hmac-user", KEY).unwrap();
        let header = signer.header("GET", LIST_URL);
        let parts = parse_header(&header).unwrap();
        assert_eq!(parts.user, "hmac-user");
        assert_eq!(parts.nonce.len(), 32);
        assert!(parts.nonce.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(parts.timestamp.parse::<i64>().is_ok());
        assert!(signer.verify("GET", LIST_URL, &header));
        assert!(!signer.verify("POST", LIST_URL, &header));
        assert!(!signer.verify("GET", "https://elsewhere.example/", &header));
    }

    #[test]
    fn rejects_bad_key() {
        let err = RequestSigner::new("hmac-user", "not base64!!").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidHmacKey(_)));
        let err = RequestSigner::new("", KEY).unwrap_err();
        assert!(matches!(err, GatewayError::MissingCredential(_)));
    }

    #[test]
    fn debug_hides_key() {
        let signer = RequestSigner::new("hmac-user", KEY).unwrap();
        let rendered = format!("{signer:?}");
        assert!(!rendered.contains("super"));
        assert!(rendered.contains("hmac-user"));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_header("Bearer abc").is_none());
        assert!(parse_header("amx user:sig:nonce").is_none());
        assert!(parse_header("amx user:sig:nonce:1:extra").is_none());
    }
}
