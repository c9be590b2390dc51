//! Upload a folder into S3, compressing each subfolder into an archive.
//!
//! Every top-level directory is packed into a single 7z archive inside a
//! temporary directory, uploaded, and removed again. Top-level files are
//! uploaded as they are. Archives whose key already exists are skipped
//! before compressing, as compression is by far the slowest step.
use clap::{App, Arg, ArgMatches, SubCommand};
use rusoto_s3::S3Client;
use tokio::process::Command;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cli;
use crate::local;
use crate::transfer::upload::{self, UploadOptions};
use crate::transfer::{self, Describe, Outcome};
use crate::types::UtilResult;

/// Storage class used for archives unless told otherwise.
const DEFAULT_STORAGE_CLASS: &str = "DEEP_ARCHIVE";

/// Generates an appropriate `SubCommand` for this module.
pub fn cmd<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("archive")
        .about("Upload a local folder into S3, compressing each subfolder first")
        .args(&cli::global_args())
        .args(&cli::s3_args())
        .args(&[
            Arg::with_name("folder")
                .help("A local folder to upload from")
                .index(1)
                .required(true),
            cli::bucket_arg(2),
            Arg::with_name("tmp_dir")
                .help("Directory to store temporary archives in")
                .long("tmp-dir")
                .takes_value(true)
                .required(true),
            Arg::with_name("subpath")
                .help("Only process entries of this path inside the folder")
                .long("subpath")
                .takes_value(true),
            Arg::with_name("archiver")
                .help("Archiver binary compatible with 7z arguments")
                .long("archiver")
                .takes_value(true)
                .default_value("7z"),
            cli::concurrency_arg("2"),
            Arg::with_name("force")
                .help("Upload files even if they already exist")
                .short("f")
                .long("force"),
        ])
        .args(&crate::upload::object_args())
}

/// A top-level entry of the folder being archived.
enum ArchiveEntry {
    /// Directory to compress before uploading.
    Directory { path: PathBuf, archive: PathBuf, key: String },
    /// Plain file to upload directly.
    File { path: PathBuf, key: String },
}

impl Describe for ArchiveEntry {
    fn describe(&self) -> String {
        match self {
            ArchiveEntry::Directory { path, .. } | ArchiveEntry::File { path, .. } => {
                path.display().to_string()
            }
        }
    }
}

/// Executes this subcommand and returns a `UtilResult` to indicate success.
pub async fn exec(s3: S3Client, args: &ArgMatches<'_>) -> UtilResult<()> {
    let (bucket, prefix) = cli::get_bucket_pair(args);
    let folder = Path::new(args.value_of("folder").unwrap_or_default());
    let tmp_dir = Path::new(args.value_of("tmp_dir").unwrap_or_default());
    let archiver = args.value_of("archiver").unwrap_or("7z");
    let concurrency = cli::get_concurrency(args)?;

    let mut options = crate::upload::object_options(args)?;
    if options.storage_class.is_none() {
        options.storage_class = Some(DEFAULT_STORAGE_CLASS.to_string());
    }

    let source = match args.value_of("subpath") {
        Some(subpath) => folder.join(subpath),
        None => folder.to_path_buf(),
    };

    info!(
        "Archiving {} to s3://{}/{}",
        source.display(),
        bucket,
        prefix.as_deref().unwrap_or_default()
    );

    if !options.dry {
        std::fs::create_dir_all(tmp_dir)?;
    }

    let entries = collect_entries(folder, &source, tmp_dir, prefix.as_deref())?;
    let total = entries.len();

    let started = Instant::now();
    let stats = transfer::run_all(entries, concurrency, |entry, position| {
        let (s3, bucket, options) = (&s3, &bucket, &options);
        async move {
            let result = match entry {
                ArchiveEntry::Directory { path, archive, key } => {
                    sync_directory(s3, bucket, &key, &path, &archive, archiver, options).await
                }
                ArchiveEntry::File { path, key } => {
                    info!("Uploading file {} with key {}", path.display(), key);
                    upload::sync_file(s3, bucket, &key, &path, options).await
                }
            };
            if let Ok(Outcome::Transferred(_)) = result {
                info!("Uploaded ({}/{})", position, total);
            }
            result
        }
    })
    .await;

    stats.log_summary("Uploaded", started);
    stats.into_result()
}

/// Compresses a directory and uploads the archive, unless the key exists.
///
/// The temporary archive is removed after the upload, successful or not.
async fn sync_directory(
    s3: &S3Client,
    bucket: &str,
    key: &str,
    dir: &Path,
    archive: &Path,
    archiver: &str,
    options: &UploadOptions,
) -> UtilResult<Outcome> {
    if !options.force && upload::remote_size(s3, bucket, key).await?.is_some() {
        info!("Object with key {} exists, skipping...", key);
        return Ok(Outcome::Skipped);
    }

    if options.dry {
        info!("Would compress {} to {} with key {}", dir.display(), archive.display(), key);
        return Ok(Outcome::Skipped);
    }

    if archive.is_file() {
        warn!("Tmp file exists {}, will remove it!", archive.display());
        tokio::fs::remove_file(archive).await?;
    }

    compress(archiver, dir, archive).await?;

    info!("Uploading file {} with key {}", archive.display(), key);

    let forced = UploadOptions {
        force: true,
        ..options.clone()
    };
    let result = upload::sync_file(s3, bucket, key, archive, &forced).await;

    if let Err(err) = tokio::fs::remove_file(archive).await {
        warn!("Unable to remove {}: {}", archive.display(), err);
    }

    result
}

/// Runs the archiver to compress a directory into an archive.
async fn compress(archiver: &str, dir: &Path, archive: &Path) -> UtilResult<()> {
    let args = compress_args(dir, archive);

    info!("Running {} {:?}", archiver, args);

    let status = Command::new(archiver).args(&args).status().await.map_err(|err| {
        format!("Failed to run {} for folder {}: {}", archiver, dir.display(), err)
    })?;

    if !status.success() {
        return Err(format!("Failed to compress folder {} ({})", dir.display(), status).into());
    }

    Ok(())
}

/// Builds the archiver arguments to compress a directory.
///
/// LZMA2 at maximum compression with a solid archive, recursing fully.
fn compress_args(dir: &Path, archive: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["a".into(), "-t7z".into(), archive.into()];
    args.extend(
        ["-m0=lzma2", "-mx=9", "-mfb=64", "-md=32m", "-ms=on", "-r"]
            .iter()
            .map(|arg| OsString::from(*arg)),
    );
    args.push(dir.into());
    args
}

/// Determines the archive name for a directory.
///
/// Any extension of the directory name is replaced by `.7z`, and the
/// result is cleaned up to a safe filename.
fn archive_name(dir: &Path) -> String {
    let name = dir.with_extension("7z");
    let name = name
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    local::valid_filename(&name)
}

/// Collects the top-level entries of the source directory.
///
/// Directories are keyed by their archive name; files by their path
/// relative to the root folder.
fn collect_entries(
    folder: &Path,
    source: &Path,
    tmp_dir: &Path,
    prefix: Option<&str>,
) -> UtilResult<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();

    for path in local::children(source)? {
        if path.is_dir() {
            let name = archive_name(&path);
            entries.push(ArchiveEntry::Directory {
                key: local::object_key(prefix, Path::new(&name)),
                archive: tmp_dir.join(&name),
                path,
            });
        } else if path.is_file() {
            let key = local::object_key(prefix, path.strip_prefix(folder)?);
            entries.push(ArchiveEntry::File { path, key });
        } else {
            error!("File does not exist {}", path.display());
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::ArchiveEntry;
    use std::ffi::OsString;
    use std::fs;
    use std::path::{Path, PathBuf};

    #[test]
    fn naming_archives() {
        assert_eq!(super::archive_name(Path::new("/data/Bridge Survey")), "Bridge_Survey.7z");
        assert_eq!(super::archive_name(Path::new("/data/flight.v2")), "flight.7z");
        assert_eq!(super::archive_name(Path::new("/data/john's scan")), "johns_scan.7z");
    }

    #[test]
    fn building_compress_arguments() {
        let args = super::compress_args(Path::new("/data/p1"), Path::new("/tmp/p1.7z"));
        let expected: Vec<OsString> = vec![
            "a",
            "-t7z",
            "/tmp/p1.7z",
            "-m0=lzma2",
            "-mx=9",
            "-mfb=64",
            "-md=32m",
            "-ms=on",
            "-r",
            "/data/p1",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        assert_eq!(args, expected);
    }

    #[test]
    fn collecting_archive_entries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("projects/Site A/points")).unwrap();
        fs::write(root.join("projects/Site A/points/cloud.las"), b"las").unwrap();
        fs::write(root.join("projects/notes.txt"), b"notes").unwrap();

        let entries = super::collect_entries(
            root,
            &root.join("projects"),
            Path::new("/tmp/archives"),
            Some("cold"),
        )
        .unwrap();

        assert_eq!(entries.len(), 2);

        match &entries[0] {
            ArchiveEntry::Directory { path, archive, key } => {
                assert_eq!(path, &root.join("projects/Site A"));
                assert_eq!(archive, &PathBuf::from("/tmp/archives/Site_A.7z"));
                assert_eq!(key, "cold/Site_A.7z");
            }
            ArchiveEntry::File { .. } => panic!("expected a directory first"),
        }

        match &entries[1] {
            ArchiveEntry::File { path, key } => {
                assert_eq!(path, &root.join("projects/notes.txt"));
                assert_eq!(key, "cold/projects/notes.txt");
            }
            ArchiveEntry::Directory { .. } => panic!("expected a file second"),
        }
    }
}
