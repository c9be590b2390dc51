//! CLI bindings for all internal commands and modules.
//!
//! This module focuses on the common CLI bindings required to provide easy
//! APIs and consistency across all other modules. This is where the parent
//! CLI can be found, as well as utilities for fetching common switches and
//! values.
use clap::{App, AppSettings, Arg, ArgMatches};

use crate::types::UtilResult;

/// Constructs a new CLI application using Clap.
///
/// This will register all subcommand modules and embed all metadata. All
/// metadata is fetched dynamically from Cargo and shouldn't require to
/// be updated (ever).
pub fn build<'a, 'b>() -> App<'a, 'b> {
    App::new("")
        .name(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .subcommand(crate::account::cmd())
        .subcommand(crate::archive::cmd())
        .subcommand(crate::download::cmd())
        .subcommand(crate::index::cmd())
        .subcommand(crate::list::cmd())
        .subcommand(crate::relocate::cmd())
        .subcommand(crate::upload::cmd())
        .settings(&[
            AppSettings::ArgRequiredElseHelp,
            AppSettings::DisableHelpSubcommand,
            AppSettings::SubcommandRequiredElseHelp,
            AppSettings::VersionlessSubcommands,
        ])
}

/// Executes a subcommand based on the parsed arguments from the CLI.
///
/// Only the commands talking to S3 construct a client, as the account
/// and filesystem commands have no use for one.
pub async fn exec(args: &ArgMatches<'_>) -> UtilResult<()> {
    match args.subcommand() {
        ("account", Some(subargs)) => crate::account::exec(subargs).await,
        ("archive", Some(subargs)) => {
            crate::archive::exec(crate::client::s3(subargs)?, subargs).await
        }
        ("download", Some(subargs)) => {
            crate::download::exec(crate::client::s3(subargs)?, subargs).await
        }
        ("index", Some(subargs)) => crate::index::exec(subargs),
        ("list", Some(subargs)) => crate::list::exec(crate::client::s3(subargs)?, subargs).await,
        ("move", Some(subargs)) => crate::relocate::exec(subargs),
        ("upload", Some(subargs)) => {
            crate::upload::exec(crate::client::s3(subargs)?, subargs).await
        }
        _ => {
            build().print_help()?;
            Ok(())
        }
    }
}

/// Fetches a bucket/prefix pair from the common argument set.
pub fn get_bucket_pair(args: &ArgMatches<'_>) -> (String, Option<String>) {
    parse_bucket_pair(args.value_of("bucket").unwrap_or_default())
}

/// Splits an `s3://bucket/prefix` style target into a bucket/prefix pair.
pub fn parse_bucket_pair(target: &str) -> (String, Option<String>) {
    let mut splitn = target.trim_start_matches("s3://").splitn(2, '/');

    // bucket is required, prefix is optional after `/`
    let bucket = splitn.next().unwrap_or_default().to_string();
    let prefix = splitn
        .next()
        .map(|s| s.trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty());

    (bucket, prefix)
}

/// Fetches the set of global arguments which should be attached on each command.
pub fn global_args<'a, 'b>() -> [Arg<'a, 'b>; 5] {
    [
        Arg::with_name("dry")
            .help("Only print out the calculated writes")
            .short("d")
            .long("dry-run"),
        Arg::with_name("quiet")
            .help("Only prints errors during execution")
            .short("q")
            .long("quiet"),
        Arg::with_name("verbose")
            .help("Prints debug output during execution")
            .short("v")
            .long("verbose")
            .conflicts_with("quiet"),
        Arg::with_name("log_file")
            .help("Appends all log output to the given file")
            .long("log-file")
            .takes_value(true),
        Arg::with_name("error_log")
            .help("Appends all errors to the given file")
            .long("error-log")
            .takes_value(true),
    ]
}

/// Fetches the arguments required to connect to an S3 compatible store.
pub fn s3_args<'a, 'b>() -> [Arg<'a, 'b>; 4] {
    [
        Arg::with_name("endpoint")
            .help("A custom S3 endpoint, such as a MinIO host")
            .long("endpoint")
            .env("S3_ENDPOINT")
            .takes_value(true),
        Arg::with_name("region")
            .help("The region to sign requests for")
            .long("region")
            .env("S3_REGION")
            .takes_value(true),
        Arg::with_name("access_key")
            .help("Access key identifier for static credentials")
            .long("access-key")
            .env("S3_ACCESS_KEY")
            .takes_value(true)
            .requires("secret_key"),
        Arg::with_name("secret_key")
            .help("Secret access key for static credentials")
            .long("secret-key")
            .env("S3_SECRET_KEY")
            .hide_env_values(true)
            .takes_value(true)
            .requires("access_key"),
    ]
}

/// Constructs the positional bucket argument at the provided index.
pub fn bucket_arg<'a, 'b>(index: u64) -> Arg<'a, 'b> {
    Arg::with_name("bucket")
        .help("An S3 bucket prefix to work within")
        .index(index)
        .required(true)
}

/// Constructs the concurrency argument with a command specific default.
pub fn concurrency_arg<'a, 'b>(default: &'a str) -> Arg<'a, 'b> {
    Arg::with_name("concurrency")
        .help("Number of transfers to run at the same time")
        .short("c")
        .long("concurrency")
        .takes_value(true)
        .default_value(default)
}

/// Constructs the repeatable exclusion pattern argument.
pub fn exclude_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("exclude")
        .help("Skip local paths matching this pattern")
        .short("e")
        .long("exclude")
        .takes_value(true)
        .multiple(true)
        .number_of_values(1)
}

/// Determines if the dry-run switch was provided in this execution.
pub fn is_dry_run(args: &ArgMatches<'_>) -> bool {
    args.is_present("dry")
}

/// Fetches the concurrency level, never dropping below a single worker.
pub fn get_concurrency(args: &ArgMatches<'_>) -> UtilResult<usize> {
    match args.value_of("concurrency") {
        Some(value) => Ok(value.parse::<usize>()?.max(1)),
        None => Ok(1),
    }
}

/// Fetches an optional numeric argument.
pub fn get_number(args: &ArgMatches<'_>, name: &str) -> UtilResult<Option<u64>> {
    match args.value_of(name) {
        Some(value) => Ok(Some(value.parse::<u64>()?)),
        None => Ok(None),
    }
}

/// Fetches all values of a repeatable argument.
pub fn get_values(args: &ArgMatches<'_>, name: &str) -> Vec<String> {
    args.values_of(name)
        .map(|values| values.map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::parse_bucket_pair;

    #[test]
    fn parsing_bucket_pairs() {
        assert_eq!(parse_bucket_pair("s3://archive"), ("archive".into(), None));
        assert_eq!(parse_bucket_pair("archive/"), ("archive".into(), None));
        assert_eq!(
            parse_bucket_pair("s3://archive/projects/2020/"),
            ("archive".into(), Some("projects/2020".into()))
        );
    }

    #[test]
    fn parsing_cli_switches() {
        let matches = super::build()
            .get_matches_from_safe(vec![
                "lidar-s3-utils",
                "download",
                "s3://archive/projects",
                "/tmp/out",
                "-c",
                "0",
                "--dry-run",
            ])
            .unwrap();

        let (name, subargs) = matches.subcommand();
        let subargs = subargs.unwrap();

        assert_eq!(name, "download");
        assert!(super::is_dry_run(subargs));
        assert_eq!(super::get_concurrency(subargs).unwrap(), 1);
        assert_eq!(
            super::get_bucket_pair(subargs),
            ("archive".into(), Some("projects".into()))
        );
    }
}
