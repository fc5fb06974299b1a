use std::future::Future;

use reqwest::Url;

use crate::*;

/// Reports the network's last irreversible block (LIB).
pub trait LibTracker: Send + Sync + 'static {
    /// Fetch the current LIB number.
    ///
    /// Callers bound this with a timeout, implementations don't need their own.
    fn fetch_lib(&self) -> impl Future<Output = Result<u64>> + Send;
}

/// Queries an HTTP endpoint answering with `{"lib_num": <number>}`.
#[derive(Clone)]
pub struct HttpLibTracker {
    client: reqwest::Client,
    url: Url,
}

impl HttpLibTracker {
    pub fn new(url: Url) -> Result<Self> {
        let client = reqwest::ClientBuilder::new().build()?;
        Ok(HttpLibTracker { client, url })
    }
}

#[derive(serde::Deserialize)]
struct LibResponse {
    lib_num: u64,
}

impl LibTracker for HttpLibTracker {
    async fn fetch_lib(&self) -> Result<u64> {
        let res = self.client.get(self.url.clone()).send().await?;
        let res = res
            .error_for_status()
            .with_context(|| format!("LIB request to {} failed", self.url))?;
        let LibResponse { lib_num } = res.json().await?;
        Ok(lib_num)
    }
}

/// A tracker with no LIB source. Every fetch fails, so merging relies on block age alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoLibTracker;

impl LibTracker for NoLibTracker {
    async fn fetch_lib(&self) -> Result<u64> {
        Err(anyhow::anyhow!("No LIB source configured"))
    }
}
