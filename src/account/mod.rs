//! Download every data file of a LiDARMill account.
//!
//! Walks the account from the user down through projects and artifacts,
//! mirroring the hierarchy into `<destination>/<project>/<artifact>/`.
//! Existing files are only downloaded again when their size differs from
//! the remote copy, so interrupted runs can simply be started again.
use clap::{App, Arg, ArgMatches, SubCommand};
use reqwest::Client;

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cli;
use crate::transfer::{self, Describe, TransferStats};
use crate::types::UtilResult;

pub mod api;
pub mod fetch;

use self::api::{Artifact, MillClient};

/// Generates an appropriate `SubCommand` for this module.
pub fn cmd<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("account")
        .about("Download all data files of a LiDARMill account")
        .args(&cli::global_args())
        .args(&[
            Arg::with_name("username")
                .help("LiDARMill username (email)")
                .short("u")
                .long("username")
                .env("LIDARMILL_USERNAME")
                .takes_value(true)
                .required(true),
            Arg::with_name("password")
                .help("LiDARMill password")
                .short("p")
                .long("password")
                .env("LIDARMILL_PASSWORD")
                .hide_env_values(true)
                .takes_value(true)
                .required(true),
            Arg::with_name("destination")
                .help("Destination folder for all downloaded data")
                .short("o")
                .long("destination")
                .takes_value(true)
                .default_value("."),
            Arg::with_name("host")
                .help("Base URL of the LiDARMill API")
                .long("host")
                .env("LIDARMILL_HOST")
                .takes_value(true)
                .default_value(api::DEFAULT_HOST),
            Arg::with_name("skip_cam")
                .help("Skip camera data artifacts")
                .long("skip-cam"),
            Arg::with_name("disable_threads")
                .help("Download files one at a time")
                .long("disable-threads"),
            Arg::with_name("force")
                .help("Download files even if they already exist")
                .short("f")
                .long("force-download"),
            cli::concurrency_arg("12"),
        ])
}

/// A single file to download, with the path to download it into.
struct FileEntry {
    url: String,
    path: PathBuf,
}

impl Describe for FileEntry {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Executes this subcommand and returns a `UtilResult` to indicate success.
pub async fn exec(args: &ArgMatches<'_>) -> UtilResult<()> {
    let dry = cli::is_dry_run(args);
    let force = args.is_present("force");
    let skip_cam = args.is_present("skip_cam");
    let concurrency = if args.is_present("disable_threads") {
        1
    } else {
        cli::get_concurrency(args)?
    };

    let destination = Path::new(args.value_of("destination").unwrap_or("."));
    let username = args.value_of("username").unwrap_or_default();
    let password = args.value_of("password").unwrap_or_default();
    let host = args.value_of("host").unwrap_or(api::DEFAULT_HOST);

    debug!(
        "destination {} skip_cam {} force {} concurrency {}",
        destination.display(),
        skip_cam,
        force,
        concurrency
    );

    std::fs::create_dir_all(destination)?;

    let http = Client::new();
    let mut client = MillClient::new(http.clone(), host);

    info!("Trying to log in.");
    let user = client.login(username, password).await?;
    info!("Got login.");

    info!("Fetching user's projects.");
    let projects = client.projects(&user.id).await?;
    info!("Found {} projects.", projects.len());

    let started = Instant::now();
    let mut stats = TransferStats::default();

    for (idx, project) in projects.iter().enumerate() {
        let project_path = destination.join(dir_name(&project.name, &project.id));

        info!(
            "Started downloading project: {} ({}/{}), into {}",
            project.name,
            idx + 1,
            projects.len(),
            project_path.display()
        );

        let artifacts = client
            .artifacts(&project.id)
            .await?
            .into_iter()
            .filter(|artifact| artifact.is_wanted(skip_cam))
            .collect::<Vec<_>>();

        info!("Found {} artifacts", artifacts.len());

        for (idx, artifact) in artifacts.iter().enumerate() {
            let artifact_path = project_path.join(dir_name(&artifact.name, &artifact.id));

            info!(
                "Started downloading artifact: {} ({}/{}), into {}",
                artifact.name,
                idx + 1,
                artifacts.len(),
                artifact_path.display()
            );

            if !dry {
                std::fs::create_dir_all(&artifact_path)?;
            }

            let entries = artifact_files(&client, artifact, &artifact_path).await?;
            stats += transfer::run_all(entries, concurrency, |entry, _| {
                let http = &http;
                async move { fetch::sync_url(http, &entry.url, &entry.path, force, dry).await }
            })
            .await;
        }
    }

    stats.log_summary("Downloaded", started);
    stats.into_result()
}

/// Resolves every file of an artifact to a download entry.
///
/// Camera data lives in data directories, named after the URL of each file;
/// all other artifacts list their data files (and names) directly.
async fn artifact_files(
    client: &MillClient,
    artifact: &Artifact,
    root: &Path,
) -> UtilResult<Vec<FileEntry>> {
    let mut entries = Vec::new();

    if artifact.is_camera_data() {
        for directory in client.data_directories(&artifact.id).await? {
            let detail = client.data_directory(&directory.id).await?;
            for url in detail.file_index {
                match fetch::url_filename(&url) {
                    Some(name) => entries.push(FileEntry {
                        path: root.join(file_name(&name)),
                        url,
                    }),
                    None => warn!("Unable to derive a file name from {}", url),
                }
            }
        }
        return Ok(entries);
    }

    for data_file in client.data_files(&artifact.id).await? {
        entries.push(FileEntry {
            path: root.join(file_name(&data_file.file_name)),
            url: data_file.s3_link,
        });
    }

    Ok(entries)
}

/// Turns a project or artifact name into a single directory name.
///
/// Names are used as they are, except for path separators; an empty
/// name falls back to the identifier.
fn dir_name(name: &str, id: &str) -> String {
    let name = name.trim().replace(|c: char| c == '/' || c == '\\', "_");
    match name.as_str() {
        "" | "." | ".." => id.to_string(),
        _ => name,
    }
}

/// Strips any directory components from a remote file name.
fn file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir_name(name, "unnamed"))
}
