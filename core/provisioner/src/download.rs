//! HTTP fetching for the manifest and release artifacts.
//!
//! Both operations share one redirect-following request primitive:
//!
//! - at most [`MAX_REDIRECTS`] hops, relative `Location` values resolved
//!   against the URL that produced them
//! - a redirect from an `https` URL to an `http` URL is refused
//! - any final status outside `2xx` is an error
//! - one socket timeout covers connection setup and every silent period
//!   while a body is streaming
//!
//! File downloads stream into `<dest>.partial` and are renamed over `dest`
//! only after the last byte has been written. On failure the partial file is
//! removed and `dest` is left untouched.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::LOCATION;
use reqwest::{Response, Url};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::errors::{ProvisionError, Result};

/// Maximum number of redirects followed for a single request.
pub const MAX_REDIRECTS: usize = 5;

/// Default socket timeout.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(15);

/// Suffix of in-progress download files.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// User-Agent header for HTTP requests.
const USER_AGENT: &str = concat!("infs-provisioner/", env!("CARGO_PKG_VERSION"));

/// Progress observer for file downloads: cumulative bytes received and the
/// `Content-Length`, when the server declared one.
pub type DownloadProgress<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// HTTP client for manifest and artifact downloads.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    socket_timeout: Duration,
}

impl Downloader {
    /// Creates a downloader whose connection and no-data timeouts are both
    /// `socket_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Network`] if the HTTP client cannot be built.
    pub fn new(socket_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(socket_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProvisionError::network_with_source("failed to create HTTP client", e))?;
        Ok(Self {
            client,
            socket_timeout,
        })
    }

    /// Returns the configured socket timeout.
    #[must_use]
    pub fn socket_timeout(&self) -> Duration {
        self.socket_timeout
    }

    /// Fetches `url` and parses the whole body as JSON.
    ///
    /// The parsed value is returned as-is; shape validation is up to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns network/protocol errors from the request and
    /// [`ProvisionError::Manifest`] naming `url` if the body is not JSON.
    pub async fn fetch_json(&self, url: &str) -> Result<Value> {
        let response = self.open(url).await?;
        let mut stream = std::pin::pin!(response.bytes_stream());
        let mut body = Vec::new();

        while let Some(chunk) = self.next_chunk(&mut stream, url).await? {
            body.extend_from_slice(&chunk);
        }

        serde_json::from_slice(&body)
            .map_err(|e| ProvisionError::manifest(format!("Failed to parse JSON from {url}: {e}")))
    }

    /// Streams `url` into `dest`.
    ///
    /// `on_progress` is called after every received chunk with the
    /// cumulative byte count and the declared `Content-Length`. An existing
    /// file at `dest` is replaced only when the download completes.
    ///
    /// # Errors
    ///
    /// Returns network/protocol errors from the request or stream,
    /// [`ProvisionError::Protocol`] if the body overruns its declared length,
    /// and [`ProvisionError::Io`] if the partial file cannot be written or
    /// renamed.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        on_progress: Option<DownloadProgress<'_>>,
    ) -> Result<()> {
        let response = self.open(url).await?;
        let total = response.content_length();
        let partial = partial_path(dest);

        info!(url, dest = %dest.display(), ?total, "downloading");

        if let Err(e) = self
            .stream_to_file(response, url, &partial, total, on_progress)
            .await
        {
            remove_partial(&partial).await;
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&partial, dest).await {
            remove_partial(&partial).await;
            return Err(ProvisionError::io(
                format!("Failed to save download to {}", dest.display()),
                e,
            ));
        }

        Ok(())
    }

    async fn stream_to_file(
        &self,
        response: Response,
        url: &str,
        partial: &Path,
        total: Option<u64>,
        on_progress: Option<DownloadProgress<'_>>,
    ) -> Result<()> {
        let mut file = tokio::fs::File::create(partial).await.map_err(|e| {
            ProvisionError::io(format!("Failed to create file: {}", partial.display()), e)
        })?;

        let mut stream = std::pin::pin!(response.bytes_stream());
        let mut received: u64 = 0;

        while let Some(chunk) = self.next_chunk(&mut stream, url).await? {
            received += chunk.len() as u64;
            if let Some(total) = total
                && received > total
            {
                return Err(ProvisionError::protocol(format!(
                    "{url} sent more than its declared Content-Length of {total} bytes"
                )));
            }

            file.write_all(&chunk).await.map_err(|e| {
                ProvisionError::io(format!("Failed to write download: {}", partial.display()), e)
            })?;

            if let Some(on_progress) = on_progress {
                on_progress(received, total);
            }
        }

        file.flush()
            .await
            .map_err(|e| ProvisionError::io(format!("Failed to flush {}", partial.display()), e))?;

        debug!(url, received, "download stream finished");
        Ok(())
    }

    /// Reads the next body chunk, failing if the socket stays silent for
    /// longer than the socket timeout.
    async fn next_chunk<S, B>(&self, stream: &mut S, url: &str) -> Result<Option<B>>
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
    {
        match tokio::time::timeout(self.socket_timeout, stream.next()).await {
            Err(_) => Err(ProvisionError::network(format!(
                "Download timed out for {url}"
            ))),
            Ok(None) => Ok(None),
            Ok(Some(Ok(chunk))) => Ok(Some(chunk)),
            Ok(Some(Err(e))) => Err(ProvisionError::network_with_source(
                format!("Error reading response from {url}"),
                e,
            )),
        }
    }

    /// Issues a GET for `url`, following redirects.
    async fn open(&self, url: &str) -> Result<Response> {
        let mut current =
            Url::parse(url).map_err(|e| ProvisionError::protocol(format!("Invalid URL {url}: {e}")))?;
        ensure_supported_scheme(&current)?;
        let mut redirects = 0;

        loop {
            let response =
                tokio::time::timeout(self.socket_timeout, self.client.get(current.clone()).send())
                    .await
                    .map_err(|_| {
                        ProvisionError::network(format!("Connection timed out for {current}"))
                    })?
                    .map_err(|e| {
                        ProvisionError::network_with_source(
                            format!("Network error fetching {current}"),
                            e,
                        )
                    })?;

            let status = response.status();
            if status.is_redirection()
                && let Some(location) = response.headers().get(LOCATION)
            {
                if redirects >= MAX_REDIRECTS {
                    return Err(ProvisionError::protocol(format!(
                        "Too many redirects fetching {current}"
                    )));
                }
                let location = location.to_str().map_err(|_| {
                    ProvisionError::protocol(format!(
                        "Redirect from {current} has a non-ASCII Location header"
                    ))
                })?;
                let target = redirect_target(&current, location)?;
                debug!(from = %current, to = %target, "following redirect");
                current = target;
                redirects += 1;
                continue;
            }

            if !status.is_success() {
                return Err(ProvisionError::protocol(format!(
                    "HTTP {} fetching {current}",
                    status.as_u16()
                )));
            }

            return Ok(response);
        }
    }
}

/// Resolves a `Location` header against the URL that returned it.
///
/// # Errors
///
/// Returns [`ProvisionError::Protocol`] for unparseable locations,
/// non-HTTP targets, and `https` to `http` downgrades.
pub fn redirect_target(current: &Url, location: &str) -> Result<Url> {
    let target = current.join(location).map_err(|e| {
        ProvisionError::protocol(format!(
            "Invalid redirect location {location:?} from {current}: {e}"
        ))
    })?;
    ensure_supported_scheme(&target)?;
    if current.scheme() == "https" && target.scheme() == "http" {
        return Err(ProvisionError::protocol(format!(
            "Refusing HTTPS-to-HTTP redirect: {current} -> {target}"
        )));
    }
    Ok(target)
}

fn ensure_supported_scheme(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ProvisionError::protocol(format!(
            "Unsupported URL scheme {other:?} in {url}"
        ))),
    }
}

/// Returns `<dest>.partial`.
#[must_use]
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %partial.display(), error = %e, "could not remove partial download"),
    }
}
