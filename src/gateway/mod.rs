//! Portal access: credentials, request signing and the HTTP client.

mod client;
mod credentials;
mod errors;
pub mod signing;

pub use client::{
    parse_report_list, BlobStats, ClientConfig, Endpoints, GatewayClient, GatewaySession,
    DEFAULT_BASE_URL, DEFAULT_TIMEOUT,
};
pub use credentials::{
    mask, Credentials, Secret, ENV_HMAC_KEY, ENV_HMAC_USER, ENV_PASSWORD, ENV_USERNAME,
};
pub use errors::GatewayError;
pub use signing::{encode_url, RequestSigner, HMAC_HEADER};
