//! HTTP client construction shared by the OpenAI and GitHub backends.

use std::time::Duration;

pub const USER_AGENT: &str = concat!("repoqa/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 10;

/// Connect and whole-request timeouts applied to every outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: Duration::from_secs(120),
        }
    }
}

impl HttpTimeouts {
    #[must_use]
    pub fn from_secs(connect: u64, request: u64) -> Self {
        Self {
            connect: Duration::from_secs(connect),
            request: Duration::from_secs(request),
        }
    }
}

/// Build a rustls-backed client with the repoqa user agent.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_client(timeouts: HttpTimeouts) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
}

/// Client with [`HttpTimeouts::default`].
///
/// # Panics
///
/// Panics if the TLS backend cannot be initialized.
#[must_use]
pub fn default_client() -> reqwest::Client {
    build_client(HttpTimeouts::default()).expect("default HTTP client construction must not fail")
}
