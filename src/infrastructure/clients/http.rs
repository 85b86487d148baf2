use crate::domain::Fetcher;
use crate::error::{RepoError, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

/// `Fetcher` over HTTP. Update jobs run on plain worker threads, so the
/// client carries its own runtime and blocks the calling thread per request.
pub struct HttpFetcher {
    client: Client,
    runtime: Runtime,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("http-fetch")
            .enable_all()
            .build()?;
        Ok(Self { client, runtime })
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gamerepo/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::new(client)
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RepoError::Other(format!("GET {} returned {}", url, status)));
        }
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);
        let bytes = self.runtime.block_on(self.get(url))?;
        info!("Fetched {} ({} bytes)", url, bytes.len());
        Ok(bytes)
    }
}
