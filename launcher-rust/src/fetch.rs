use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};

use crate::{
    config::RetrySettings,
    error::{fs_err, LauncherError, Result},
};

/// Failure reported by a [`Transport`]. `transient` failures are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub message: String,
    pub transient: bool,
}

impl TransportError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

/// One HTTP GET, without retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, TransportError>;

    /// Streams the body into `dest`, returning the byte count.
    async fn get_to_file(
        &self,
        url: &str,
        timeout: Duration,
        dest: &mut tokio::fs::File,
    ) -> Result<u64, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, TransportError> {
        (**self).get_text(url, timeout).await
    }

    async fn get_to_file(
        &self,
        url: &str,
        timeout: Duration,
        dest: &mut tokio::fs::File,
    ) -> Result<u64, TransportError> {
        (**self).get_to_file(url, timeout, dest).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("shoe-launcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LauncherError::Config(format!("build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response, TransportError> {
        self.client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    let transient = err.is_timeout()
        || err.is_connect()
        || err
            .status()
            .map(|s| s.is_server_error() || s.as_u16() == 429)
            .unwrap_or(false);
    TransportError {
        message: err.to_string(),
        transient,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, TransportError> {
        let resp = self.get(url, timeout).await?;
        resp.text().await.map_err(classify)
    }

    async fn get_to_file(
        &self,
        url: &str,
        timeout: Duration,
        dest: &mut tokio::fs::File,
    ) -> Result<u64, TransportError> {
        let mut resp = self.get(url, timeout).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await.map_err(classify)? {
            dest.write_all(&chunk)
                .await
                .map_err(|e| TransportError::fatal(format!("write archive: {e}")))?;
            written += chunk.len() as u64;
        }
        dest.flush()
            .await
            .map_err(|e| TransportError::fatal(format!("flush archive: {e}")))?;
        Ok(written)
    }
}

/// Exponential backoff between attempts of a transient failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            attempts: s.attempts.max(1),
            initial_delay: Duration::from_millis(s.initial_delay_ms),
            max_delay: Duration::from_millis(s.max_delay_ms),
        }
    }
}

/// Retrying, cancellable front end over a [`Transport`].
#[derive(Debug, Clone)]
pub struct Downloader<T> {
    transport: T,
    policy: RetryPolicy,
    text_timeout: Duration,
}

impl<T: Transport> Downloader<T> {
    pub fn new(transport: T, policy: RetryPolicy, text_timeout: Duration) -> Self {
        Self {
            transport,
            policy,
            text_timeout,
        }
    }

    pub async fn fetch_text(&self, url: &str, cancel: &CancellationToken) -> Result<String> {
        let timeout = self.text_timeout;
        self.with_retry(url, cancel, || async move {
            self.transport.get_text(url, timeout).await
        })
        .await
    }

    /// Downloads `url` into a temp file created in `dir`.
    ///
    /// The returned file is removed when dropped. A failed attempt discards
    /// its partial file before the next one starts.
    pub async fn fetch_binary(
        &self,
        url: &str,
        timeout: Duration,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<NamedTempFile> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| fs_err(dir, e))?;
        self.with_retry(url, cancel, || async move {
            let tmp = tempfile::Builder::new()
                .prefix(".download-")
                .suffix(".zip")
                .tempfile_in(dir)
                .map_err(|e| TransportError::fatal(format!("create temp file: {e}")))?;
            let std_file = tmp
                .reopen()
                .map_err(|e| TransportError::fatal(format!("open temp file: {e}")))?;
            let mut file = tokio::fs::File::from_std(std_file);
            let bytes = self.transport.get_to_file(url, timeout, &mut file).await?;
            tracing::debug!(url, bytes, "download finished");
            Ok(tmp)
        })
        .await
    }

    async fn with_retry<F, Fut, R>(
        &self,
        url: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<R>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<R, TransportError>>,
    {
        let mut delay = self.policy.initial_delay;
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
                res = op() => res,
            };
            match outcome {
                Ok(v) => return Ok(v),
                Err(err) if err.transient && attempt < attempts => {
                    tracing::warn!(url, attempt, error = %err.message, "transient fetch failure, retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = std::cmp::min(delay * 2, self.policy.max_delay);
                }
                Err(err) => {
                    return Err(LauncherError::Network {
                        url: url.to_string(),
                        cause: err.message,
                    })
                }
            }
        }
        Err(LauncherError::Network {
            url: url.to_string(),
            cause: "no attempts made".to_string(),
        })
    }
}
