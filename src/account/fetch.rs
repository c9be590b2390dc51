//! Resumable HTTP downloads of account data files.
//!
//! Data file links point at pre-signed storage URLs, which support ranged
//! requests. Downloads continue from the written offset whenever a stream
//! ends early, so large files survive flaky connections.
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode, Url};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::transfer::{self, Outcome};
use crate::types::UtilResult;

/// Timeout applied to each individual download request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Fetches the advertised `Content-Length` of a URL using a HEAD request.
///
/// Unsuccessful responses carry the length of their error body, so they
/// report no size at all.
pub async fn remote_size(http: &Client, url: &str) -> UtilResult<Option<u64>> {
    let response = http.head(url).send().await?;

    if !response.status().is_success() {
        debug!("HEAD of {} answered {}", url, response.status());
        return Ok(None);
    }

    Ok(response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok()))
}

/// Downloads a URL to a path, unless a complete copy is already present.
///
/// An existing file is kept only when its size matches the remote size;
/// otherwise (or when forced) it is removed and downloaded again.
pub async fn sync_url(
    http: &Client,
    url: &str,
    dest: &Path,
    force: bool,
    dry: bool,
) -> UtilResult<Outcome> {
    if let Ok(meta) = tokio::fs::metadata(dest).await {
        if meta.is_dir() {
            warn!("Can't download into directory {}", dest.display());
            return Ok(Outcome::Skipped);
        }

        if !force {
            let remote = remote_size(http, url).await?;
            if transfer::should_skip(Some(meta.len()), remote, force) {
                debug!("File {} exists, skip downloading", dest.display());
                return Ok(Outcome::Skipped);
            }
        }

        if !dry {
            tokio::fs::remove_file(dest).await?;
        }
    }

    if dry {
        info!("Would download {} to {}", url, dest.display());
        return Ok(Outcome::Skipped);
    }

    debug!("Downloading {} into file {}", url, dest.display());

    download(http, url, dest, &RetryPolicy::default())
        .await
        .map(Outcome::Transferred)
}

/// Downloads a URL into a path, resuming with ranged requests.
///
/// Without a known (non-zero) size a single plain request is made. With a
/// size, requests are repeated from the written offset until the file is
/// complete; an attempt which makes no progress counts against the
/// provided `RetryPolicy`.
pub async fn download(
    http: &Client,
    url: &str,
    dest: &Path,
    policy: &RetryPolicy,
) -> UtilResult<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let size = remote_size(http, url).await?.filter(|size| *size > 0);

    let mut file = File::create(dest).await?;
    let mut written = 0;
    let mut attempt = 1;

    loop {
        let before = written;
        let result = fetch_range(http, url, dest, size, &mut file, &mut written).await;

        let complete = match size {
            Some(size) => written >= size,
            None => result.is_ok(),
        };

        if complete {
            file.flush().await?;
            return Ok(written);
        }

        // a plain request can't be resumed, so only ranged ones continue
        let err = match result {
            Err(err) if size.is_none() => return Err(err),
            Err(err) => err,
            Ok(()) => format!("Stream of {} ended at {} bytes", url, written).into(),
        };

        if written > before {
            attempt = 1;
            debug!("Resuming {} at {} bytes: {}", url, written, err);
            continue;
        }

        match policy.delay(attempt) {
            None => return Err(err),
            Some(delay) => {
                warn!(
                    "Download of {} stalled at {} bytes: {}, retrying in {}",
                    url,
                    written,
                    err,
                    humantime::format_duration(delay)
                );
                tokio::time::delay_for(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Makes a single request from the current offset, appending to the file.
async fn fetch_range(
    http: &Client,
    url: &str,
    dest: &Path,
    size: Option<u64>,
    file: &mut File,
    written: &mut u64,
) -> UtilResult<()> {
    let mut request = http.get(url).timeout(REQUEST_TIMEOUT);

    if let Some(range) = range_header(*written, size) {
        request = request.header(RANGE, range);
    }

    let mut response = request.send().await?;
    let status = response.status();

    // treat everything 2xx as okay
    if !status.is_success() {
        return Err(format!("Couldn't download file {}, status code {}", url, status).into());
    }

    // a full answer to a ranged request starts the file over
    if status == StatusCode::OK && *written > 0 {
        debug!("Range ignored for {}, restarting", url);
        file.flush().await?;
        *file = File::create(dest).await?;
        *written = 0;
    }

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        *written += chunk.len() as u64;
    }

    Ok(())
}

/// Builds the `Range` header value for the next request, if any.
pub fn range_header(written: u64, size: Option<u64>) -> Option<String> {
    match size {
        Some(size) if size > 0 => Some(format!("bytes={}-{}", written, size - 1)),
        _ => None,
    }
}

/// Derives a local filename from the last segment of a URL path.
///
/// Query strings (such as pre-signed signatures) are not part of the name.
pub fn url_filename(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let name = parsed.path_segments()?.last()?;

    if name.is_empty() {
        return None;
    }

    Some(name.to_string())
}
