//! Download the contents of an S3 bucket into a local folder.
//!
//! Objects are selected either by listing a prefix, or from an explicit
//! list of keys. Each object is written to `<destination>/<key>`.
use clap::{App, Arg, ArgMatches, SubCommand};
use rusoto_s3::S3Client;

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cli;
use crate::local;
use crate::transfer::{self, download, Describe};
use crate::types::UtilResult;
use crate::walker::ObjectWalker;

/// Generates an appropriate `SubCommand` for this module.
pub fn cmd<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("download")
        .about("Download the contents of an S3 bucket prefix")
        .args(&cli::global_args())
        .args(&cli::s3_args())
        .args(&[
            cli::bucket_arg(1),
            Arg::with_name("destination")
                .help("A local folder to download into")
                .index(2)
                .required(true),
            Arg::with_name("keys_from")
                .help("Only download the keys listed in this file")
                .long("keys-from")
                .takes_value(true),
            cli::concurrency_arg("24"),
            Arg::with_name("force")
                .help("Download objects even if they already exist locally")
                .short("f")
                .long("force"),
        ])
}

/// An object to download, along with its local path.
struct DownloadEntry {
    key: String,
    size: Option<u64>,
    path: PathBuf,
}

impl Describe for DownloadEntry {
    fn describe(&self) -> String {
        self.key.clone()
    }
}

/// Executes this subcommand and returns a `UtilResult` to indicate success.
pub async fn exec(s3: S3Client, args: &ArgMatches<'_>) -> UtilResult<()> {
    let dry = cli::is_dry_run(args);
    let force = args.is_present("force");
    let (bucket, prefix) = cli::get_bucket_pair(args);
    let destination = Path::new(args.value_of("destination").unwrap_or_default());
    let concurrency = cli::get_concurrency(args)?;

    // explicit keys come without sizes, listed keys carry them along
    let objects: Vec<(String, Option<u64>)> = match args.value_of("keys_from") {
        Some(list) => local::read_list(Path::new(list))?
            .into_iter()
            .map(|key| (key, None))
            .collect(),
        None => ObjectWalker::new(&s3, bucket.clone(), prefix)
            .collect()
            .await?
            .into_iter()
            .filter_map(|object| {
                let size = object.size.map(|size| size as u64);
                object.key.map(|key| (key, size))
            })
            .collect(),
    };

    let (dirs, entries) = partition(destination, objects);

    for dir in dirs {
        if !dir.exists() {
            info!("Create empty folder {}", dir.display());
            if !dry {
                std::fs::create_dir_all(&dir)?;
            }
        }
    }

    let total = entries.len();
    info!("Found {} objects in s3://{}", total, bucket);

    let started = Instant::now();
    let stats = transfer::run_all(entries, concurrency, |entry, position| {
        let (s3, bucket) = (&s3, &bucket);
        async move {
            debug!("Download file {} ({}/{})", entry.key, position, total);
            let result =
                download::sync_object(s3, bucket, &entry.key, entry.size, &entry.path, force, dry)
                    .await;
            if result.is_ok() {
                info!("Downloaded {}/{} {}", position, total, entry.path.display());
            }
            result
        }
    })
    .await;

    stats.log_summary("Downloaded", started);
    stats.into_result()
}

/// Separates directory markers from objects which need downloading.
///
/// Keys ending in `/` are directory placeholders and only produce the
/// directory itself locally.
fn partition(
    destination: &Path,
    objects: Vec<(String, Option<u64>)>,
) -> (Vec<PathBuf>, Vec<DownloadEntry>) {
    let mut dirs = Vec::new();
    let mut entries = Vec::new();

    for (key, size) in objects {
        let path = local::key_path(destination, &key);
        if key.ends_with('/') {
            dirs.push(path);
        } else {
            entries.push(DownloadEntry { key, size, path });
        }
    }

    (dirs, entries)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    #[test]
    fn partitioning_directory_markers() {
        let objects = vec![
            ("projects/".to_string(), Some(0)),
            ("projects/p1/cloud.las".to_string(), Some(2048)),
            ("projects/p1/meta.json".to_string(), None),
        ];

        let (dirs, entries) = super::partition(Path::new("/restore"), objects);

        assert_eq!(dirs, vec![PathBuf::from("/restore/projects")]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, PathBuf::from("/restore/projects/p1/cloud.las"));
        assert_eq!(entries[0].size, Some(2048));
        assert_eq!(entries[1].key, "projects/p1/meta.json");
        assert_eq!(entries[1].size, None);
    }
}
