//! Upload a local folder into S3, recursively.
//!
//! Each file is stored under its path relative to the folder, below the
//! provided bucket prefix. Objects which already exist with the same size
//! are skipped, so an interrupted upload can be started again as is.
use clap::{App, Arg, ArgMatches, SubCommand};
use rusoto_s3::S3Client;

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cli;
use crate::local::{self, Filter};
use crate::transfer::upload::{self, UploadOptions};
use crate::transfer::{self, Describe, TransferStats};
use crate::types::UtilResult;

/// Generates an appropriate `SubCommand` for this module.
pub fn cmd<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("upload")
        .about("Upload all files of a local folder into S3")
        .args(&cli::global_args())
        .args(&cli::s3_args())
        .args(&[
            Arg::with_name("folder")
                .help("A local folder to upload from")
                .index(1)
                .required(true),
            cli::bucket_arg(2),
            Arg::with_name("files_from")
                .help("Only upload the paths listed in this file")
                .long("files-from")
                .takes_value(true),
            cli::exclude_arg(),
            cli::concurrency_arg("16"),
            Arg::with_name("force")
                .help("Upload files even if they already exist")
                .short("f")
                .long("force"),
        ])
        .args(&object_args())
}

/// Fetches the arguments controlling how objects are written.
pub fn object_args<'a, 'b>() -> [Arg<'a, 'b>; 3] {
    [
        Arg::with_name("guess_type")
            .help("Guess the Content-Type of each file")
            .long("guess-type"),
        Arg::with_name("storage_class")
            .help("Storage class to write objects with")
            .long("storage-class")
            .takes_value(true),
        Arg::with_name("part_size")
            .help("Part size in bytes for multipart uploads")
            .long("part-size")
            .takes_value(true),
    ]
}

/// Builds the `UploadOptions` from the parsed object arguments.
pub fn object_options(args: &ArgMatches<'_>) -> UtilResult<UploadOptions> {
    let part_size = cli::get_number(args, "part_size")?.unwrap_or(upload::DEFAULT_PART_SIZE);

    if part_size < upload::MIN_PART_SIZE {
        return Err(format!(
            "Part size must be at least {} bytes",
            upload::MIN_PART_SIZE
        )
        .into());
    }

    Ok(UploadOptions {
        storage_class: args.value_of("storage_class").map(str::to_string),
        guess_type: args.is_present("guess_type"),
        part_size,
        force: args.is_present("force"),
        dry: cli::is_dry_run(args),
    })
}

/// A local file along with the key to upload it to.
pub struct UploadEntry {
    pub path: PathBuf,
    pub key: String,
}

impl Describe for UploadEntry {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Executes this subcommand and returns a `UtilResult` to indicate success.
pub async fn exec(s3: S3Client, args: &ArgMatches<'_>) -> UtilResult<()> {
    let (bucket, prefix) = cli::get_bucket_pair(args);
    let folder = Path::new(args.value_of("folder").unwrap_or_default());
    let filter = Filter::new(&cli::get_values(args, "exclude"))?;
    let options = object_options(args)?;
    let concurrency = cli::get_concurrency(args)?;

    info!(
        "Uploading {} to s3://{}/{}",
        folder.display(),
        bucket,
        prefix.as_deref().unwrap_or_default()
    );

    let files = match args.value_of("files_from") {
        Some(list) => local::read_list(Path::new(list))?
            .into_iter()
            .map(PathBuf::from)
            .collect(),
        None => local::walk(folder)?,
    };

    let (entries, mut stats) = collect_entries(folder, prefix.as_deref(), files, &filter);
    let total = entries.len();

    info!("Found {} files", total);

    let started = Instant::now();
    stats += transfer::run_all(entries, concurrency, |entry, position| {
        let (s3, bucket, options) = (&s3, &bucket, &options);
        async move {
            info!("Uploading file {} with key {}", entry.path.display(), entry.key);
            let result = upload::sync_file(s3, bucket, &entry.key, &entry.path, options).await;
            if result.is_ok() {
                info!("Uploaded ({}/{}) {}", position, total, entry.path.display());
            }
            result
        }
    })
    .await;

    stats.log_summary("Uploaded", started);
    stats.into_result()
}

/// Maps local files to upload entries, dropping excluded files.
///
/// Files outside of the folder can't be given a key; they are logged and
/// counted as failures in the returned stats, so the command fails once
/// the remaining entries are done.
pub fn collect_entries(
    folder: &Path,
    prefix: Option<&str>,
    files: Vec<PathBuf>,
    filter: &Filter,
) -> (Vec<UploadEntry>, TransferStats) {
    let mut entries = Vec::with_capacity(files.len());
    let mut rejected = TransferStats::default();

    for path in files {
        if filter.excludes(&path) {
            info!("Skipping path {}", path.display());
            continue;
        }

        let relative = match path.strip_prefix(folder) {
            Ok(relative) => relative,
            Err(_) => {
                error!("Path {} is not inside {}", path.display(), folder.display());
                rejected.failed += 1;
                continue;
            }
        };

        let key = local::object_key(prefix, relative);
        entries.push(UploadEntry { path, key });
    }

    (entries, rejected)
}

#[cfg(test)]
mod tests {
    use crate::local::Filter;
    use std::path::{Path, PathBuf};

    #[test]
    fn collecting_upload_entries() {
        let filter = Filter::new(&["data_directories.*out"]).unwrap();
        let files = vec![
            PathBuf::from("/mnt/storage/p1/cloud.las"),
            PathBuf::from("/mnt/storage/p1/data_directories/d1/out/img.jpg"),
            PathBuf::from("/mnt/storage/p1/data_directories/d1/img.jpg"),
            PathBuf::from("/elsewhere/file.txt"),
        ];

        let folder = Path::new("/mnt/storage");
        let (entries, rejected) = super::collect_entries(folder, Some("backup"), files, &filter);
        let keys = entries.iter().map(|entry| entry.key.as_str()).collect::<Vec<_>>();

        assert_eq!(
            keys,
            vec!["backup/p1/cloud.las", "backup/p1/data_directories/d1/img.jpg"]
        );
        assert_eq!(rejected.failed, 1);
        assert_eq!(rejected.into_result().unwrap_err().to_string(), "1 of 1 files failed");
    }

    #[test]
    fn validating_part_sizes() {
        let matches = crate::cli::build()
            .get_matches_from_safe(vec![
                "lidar-s3-utils",
                "upload",
                "/data",
                "s3://bucket",
                "--part-size",
                "1024",
            ])
            .unwrap();

        let (_, subargs) = matches.subcommand();

        assert!(super::object_options(subargs.unwrap()).is_err());
    }

    #[test]
    fn parsing_object_options() {
        let matches = crate::cli::build()
            .get_matches_from_safe(vec![
                "lidar-s3-utils",
                "upload",
                "/data",
                "s3://bucket",
                "--guess-type",
                "--storage-class",
                "GLACIER",
                "--force",
            ])
            .unwrap();

        let (_, subargs) = matches.subcommand();
        let options = super::object_options(subargs.unwrap()).unwrap();

        assert!(options.guess_type);
        assert!(options.force);
        assert!(!options.dry);
        assert_eq!(options.storage_class.as_deref(), Some("GLACIER"));
        assert_eq!(options.part_size, crate::transfer::upload::DEFAULT_PART_SIZE);
    }
}
