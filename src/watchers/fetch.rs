use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{bail, Context, Result};

/// Default request timeout (seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Retrieves a source document. Must be free of side effects so a failed
/// tick can simply be retried on the next one.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Plain HTTP GET
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(concat!("butler/", env!("CARGO_PKG_VERSION")))
            .build()
            .wrap_err("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .wrap_err_with(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("GET {} returned HTTP {}", url, status);
        }

        resp.text()
            .await
            .wrap_err_with(|| format!("failed to read body of {}", url))
    }
}
