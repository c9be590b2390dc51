//! Downloading of S3 objects into local files.
use futures::stream::StreamExt;
use rusoto_s3::*;
use tokio::io::AsyncWriteExt;

use std::path::Path;

use super::Outcome;
use crate::retry::RetryPolicy;
use crate::types::{UtilError, UtilResult};

/// Downloads an object to a path, unless a file of the same size is there.
///
/// The remote size is taken from the listing when known, and looked up
/// using `HeadObject` otherwise (only when a local file exists at all).
pub async fn sync_object(
    s3: &S3Client,
    bucket: &str,
    key: &str,
    size: Option<u64>,
    dest: &Path,
    force: bool,
    dry: bool,
) -> UtilResult<Outcome> {
    if !force {
        if let Ok(meta) = tokio::fs::metadata(dest).await {
            let remote = match size {
                Some(size) => Some(size),
                None => super::upload::remote_size(s3, bucket, key).await?,
            };

            if super::should_skip(Some(meta.len()), remote, force) {
                debug!("File {} exists, skip downloading", dest.display());
                return Ok(Outcome::Skipped);
            }
        }
    }

    if dry {
        info!("Would download {} to {}", key, dest.display());
        return Ok(Outcome::Skipped);
    }

    RetryPolicy::default()
        .run(key, || get_object(s3, bucket, key, dest))
        .await
        .map(Outcome::Transferred)
}

/// Downloads an object into the destination path, returning the bytes written.
///
/// Parent directories are created as needed. If the written size doesn't
/// match the advertised `Content-Length`, the partial file is removed.
pub async fn get_object(s3: &S3Client, bucket: &str, key: &str, dest: &Path) -> UtilResult<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let request = GetObjectRequest {
        bucket: bucket.to_string(),
        key: key.to_string(),
        ..GetObjectRequest::default()
    };

    let output = s3.get_object(request).await?;
    let expected = output.content_length.map(|length| length as u64);
    let mut body = output.body.ok_or("object should have a body")?;

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0;

    let streamed = async {
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok::<_, UtilError>(())
    }
    .await;

    let result = match (streamed, expected) {
        (Err(err), _) => Err(err),
        (Ok(()), Some(expected)) if expected != written => Err(format!(
            "Size mismatch for {}: expected {} bytes, got {}",
            key, expected, written
        )
        .into()),
        (Ok(()), _) => Ok(written),
    };

    if result.is_err() {
        drop(file);
        let _ = tokio::fs::remove_file(dest).await;
    }

    result
}
