//! Uploading of local files into S3.
//!
//! Small files are sent with a single `PutObject` call; anything larger
//! than the configured part size goes through a multipart upload, which is
//! aborted again if any part fails so no dangling parts are left behind.
use rusoto_core::RusotoError;
use rusoto_s3::*;
use tokio::io::{AsyncRead, AsyncReadExt};

use std::io;
use std::path::Path;

use super::Outcome;
use crate::retry::RetryPolicy;
use crate::types::UtilResult;

/// Default size of each part in a multipart upload (16MiB).
pub const DEFAULT_PART_SIZE: u64 = 16 * 1024 * 1024;

/// Smallest part size accepted by S3 (5MiB).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Largest amount of parts accepted in a single multipart upload.
const MAX_PARTS: u64 = 10_000;

/// Options applied to every object written by an upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Storage class to write objects with, such as `DEEP_ARCHIVE`.
    pub storage_class: Option<String>,
    /// Whether to set a `Content-Type` based on the file extension.
    pub guess_type: bool,
    /// Size of each part once a file is too large for a single request.
    pub part_size: u64,
    /// Uploads even if an object of the same size exists.
    pub force: bool,
    /// Only logs what would be uploaded.
    pub dry: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            storage_class: None,
            guess_type: false,
            part_size: DEFAULT_PART_SIZE,
            force: false,
            dry: false,
        }
    }
}

/// Uploads a file to a key, unless an object of the same size is there.
///
/// Failed uploads are retried using the default `RetryPolicy`.
pub async fn sync_file(
    s3: &S3Client,
    bucket: &str,
    key: &str,
    path: &Path,
    options: &UploadOptions,
) -> UtilResult<Outcome> {
    let local = tokio::fs::metadata(path).await?.len();
    let remote = remote_size(s3, bucket, key).await?;

    if super::should_skip(Some(local), remote, options.force) {
        info!("Object with key {} exists, skipping...", key);
        return Ok(Outcome::Skipped);
    }

    if options.dry {
        info!("Would upload {} to {}", path.display(), key);
        return Ok(Outcome::Skipped);
    }

    RetryPolicy::default()
        .run(key, || put_file(s3, bucket, key, path, options))
        .await
        .map(Outcome::Transferred)
}

/// Retrieves the size of a remote object, or `None` if it doesn't exist.
pub async fn remote_size(s3: &S3Client, bucket: &str, key: &str) -> UtilResult<Option<u64>> {
    let request = HeadObjectRequest {
        bucket: bucket.to_string(),
        key: key.to_string(),
        ..HeadObjectRequest::default()
    };

    match s3.head_object(request).await {
        Ok(output) => Ok(Some(output.content_length.unwrap_or(0) as u64)),
        Err(ref err) if is_missing(err) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Determines whether a `HeadObject` failure means there's no such object.
///
/// HEAD responses have no body, so a missing key usually arrives as a
/// bare 404 rather than the modeled `NoSuchKey` error.
fn is_missing(err: &RusotoError<HeadObjectError>) -> bool {
    match err {
        RusotoError::Service(HeadObjectError::NoSuchKey(_)) => true,
        RusotoError::Unknown(response) => response.status.as_u16() == 404,
        _ => false,
    }
}

/// Uploads a file to the provided key, returning the bytes written.
pub async fn put_file(
    s3: &S3Client,
    bucket: &str,
    key: &str,
    path: &Path,
    options: &UploadOptions,
) -> UtilResult<u64> {
    let size = tokio::fs::metadata(path).await?.len();
    let (content_type, content_disposition) = content_headers(path, options.guess_type);

    if content_disposition.is_some() {
        info!("Set Content-Disposition: inline for {}", path.display());
    }

    if size > options.part_size {
        let creation = CreateMultipartUploadRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type,
            content_disposition,
            storage_class: options.storage_class.clone(),
            ..CreateMultipartUploadRequest::default()
        };
        let part_size = part_size(size, options.part_size);
        return put_multipart(s3, creation, path, part_size).await;
    }

    let body = tokio::fs::read(path).await?;
    let length = body.len() as u64;

    let request = PutObjectRequest {
        bucket: bucket.to_string(),
        key: key.to_string(),
        content_length: Some(length as i64),
        body: Some(body.into()),
        content_type,
        content_disposition,
        storage_class: options.storage_class.clone(),
        ..PutObjectRequest::default()
    };

    s3.put_object(request).await?;

    Ok(length)
}

/// Grows the configured part size until a file fits in `MAX_PARTS` parts.
fn part_size(size: u64, configured: u64) -> u64 {
    let required = size / MAX_PARTS + if size % MAX_PARTS == 0 { 0 } else { 1 };
    configured.max(required)
}

/// Uploads a file in parts, completing or aborting the upload.
async fn put_multipart(
    s3: &S3Client,
    creation: CreateMultipartUploadRequest,
    path: &Path,
    part_size: u64,
) -> UtilResult<u64> {
    let bucket = creation.bucket.clone();
    let key = creation.key.clone();

    // init the request against AWS, and retrieve the identifier
    let created = s3.create_multipart_upload(creation).await?;
    let upload_id = created.upload_id.ok_or("upload id should exist")?;

    debug!("Started multipart upload {} for {}", upload_id, key);

    let (parts, length) = match upload_parts(s3, &bucket, &key, &upload_id, path, part_size).await {
        Ok(uploaded) => uploaded,
        Err(err) => {
            abort_request(s3, &bucket, &key, &upload_id).await;
            return Err(err);
        }
    };

    // create our multipart completion request
    let complete = CompleteMultipartUploadRequest {
        bucket: bucket.to_string(),
        key: key.to_string(),
        upload_id: upload_id.to_string(),
        multipart_upload: Some(CompletedMultipartUpload { parts: Some(parts) }),
        ..CompleteMultipartUploadRequest::default()
    };

    if let Err(err) = s3.complete_multipart_upload(complete).await {
        abort_request(s3, &bucket, &key, &upload_id).await;
        return Err(err.into());
    }

    Ok(length)
}

/// Uploads every part of a file against an existing multipart upload.
async fn upload_parts(
    s3: &S3Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    path: &Path,
    part_size: u64,
) -> UtilResult<(Vec<CompletedPart>, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut parts = Vec::new();
    let mut length = 0;
    let mut part_number = 1;

    loop {
        let buffer = read_part(&mut file, part_size as usize).await?;
        let read = buffer.len() as u64;

        // exact multiples of the part size end on an empty read
        if read == 0 {
            break;
        }

        let request = UploadPartRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            part_number,
            content_length: Some(read as i64),
            body: Some(buffer.into()),
            ..UploadPartRequest::default()
        };

        let output = s3.upload_part(request).await?;

        debug!("Uploaded part {} of {} ({} bytes)", part_number, key, read);

        parts.push(CompletedPart {
            e_tag: output.e_tag,
            part_number: Some(part_number),
        });

        length += read;
        part_number += 1;

        if read < part_size {
            break;
        }
    }

    Ok((parts, length))
}

/// Reads up to `size` bytes from a reader, stopping early only at EOF.
async fn read_part<R>(reader: &mut R, size: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0; size];
    let mut filled = 0;

    while filled < size {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    buffer.truncate(filled);
    Ok(buffer)
}

/// Aborts a multipart request in S3 by upload_id.
///
/// This can be used to abort a failed upload request, due to either the inability
/// to upload a part, or the inability to complete the multi request.
async fn abort_request(s3: &S3Client, bucket: &str, key: &str, upload_id: &str) {
    // print that it's being aborted
    error!("Aborting {}...", upload_id);

    // create the main abort request
    let abort = AbortMultipartUploadRequest {
        key: key.to_string(),
        bucket: bucket.to_string(),
        upload_id: upload_id.to_string(),
        ..AbortMultipartUploadRequest::default()
    };

    // attempt to abort each request, log on fail (can't short circut)
    if s3.abort_multipart_upload(abort).await.is_err() {
        error!("Unable to abort: {}", upload_id);
    }
}

/// Determines the `Content-Type` and `Content-Disposition` for a file.
///
/// HTML files are additionally marked as inline, so they render in the
/// browser rather than being downloaded.
pub fn content_headers(path: &Path, guess: bool) -> (Option<String>, Option<String>) {
    if !guess {
        return (None, None);
    }

    match mime_guess::from_path(path).first() {
        None => (None, None),
        Some(mime) => {
            let essence = mime.essence_str().to_string();
            let disposition = if essence == "text/html" {
                Some("inline".to_string())
            } else {
                None
            };
            (Some(essence), disposition)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_PART_SIZE, MAX_PARTS};
    use reqwest::StatusCode;
    use rusoto_core::request::BufferedHttpResponse;
    use rusoto_core::RusotoError;
    use rusoto_s3::HeadObjectError;
    use std::path::Path;

    #[test]
    fn keeping_configured_part_sizes() {
        let largest = DEFAULT_PART_SIZE * MAX_PARTS;

        assert_eq!(super::part_size(1024 * 1024 * 1024, DEFAULT_PART_SIZE), DEFAULT_PART_SIZE);
        assert_eq!(super::part_size(largest, DEFAULT_PART_SIZE), DEFAULT_PART_SIZE);
    }

    #[test]
    fn growing_part_sizes_for_huge_files() {
        let size = DEFAULT_PART_SIZE * MAX_PARTS + 1;
        let part_size = super::part_size(size, DEFAULT_PART_SIZE);

        assert_eq!(part_size, DEFAULT_PART_SIZE + 1);
        assert!((size + part_size - 1) / part_size <= MAX_PARTS);
    }

    #[test]
    fn detecting_missing_objects() {
        let response = |status| BufferedHttpResponse {
            status,
            body: Default::default(),
            headers: Default::default(),
        };

        let not_found = RusotoError::Unknown(response(StatusCode::NOT_FOUND));
        let forbidden = RusotoError::Unknown(response(StatusCode::FORBIDDEN));
        let no_such_key = RusotoError::Service(HeadObjectError::NoSuchKey("key".into()));

        assert!(super::is_missing(&not_found));
        assert!(super::is_missing(&no_such_key));
        assert!(!super::is_missing(&forbidden));
    }

    #[test]
    fn guessing_content_headers() {
        let html = super::content_headers(Path::new("viewer/index.html"), true);
        let json = super::content_headers(Path::new("meta/info.json"), true);
        let unknown = super::content_headers(Path::new("points/cloud.unknownext"), true);

        assert_eq!(html, (Some("text/html".into()), Some("inline".into())));
        assert_eq!(json, (Some("application/json".into()), None));
        assert_eq!(unknown, (None, None));
    }

    #[test]
    fn skipping_content_headers_without_guessing() {
        let html = super::content_headers(Path::new("viewer/index.html"), false);

        assert_eq!(html, (None, None));
    }

    #[tokio::test]
    async fn reading_full_parts() {
        let data = b"0123456789".to_vec();
        let mut reader = &data[..];

        let first = super::read_part(&mut reader, 4).await.unwrap();
        let second = super::read_part(&mut reader, 4).await.unwrap();
        let third = super::read_part(&mut reader, 4).await.unwrap();
        let fourth = super::read_part(&mut reader, 4).await.unwrap();

        assert_eq!(first, b"0123");
        assert_eq!(second, b"4567");
        assert_eq!(third, b"89");
        assert!(fourth.is_empty());
    }
}
