//! List the contents of an S3 bucket prefix.
//!
//! Besides printing, the listed keys can be written to a file, which can be
//! fed back into `download --keys-from` after being trimmed down.
use clap::{App, Arg, ArgMatches, SubCommand};
use rusoto_s3::*;

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::cli;
use crate::types::UtilResult;
use crate::util;
use crate::walker::ObjectWalker;

/// Generates an appropriate `SubCommand` for this module.
pub fn cmd<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("list")
        .about("List the contents of an S3 bucket prefix")
        .args(&cli::global_args())
        .args(&cli::s3_args())
        .args(&[
            cli::bucket_arg(1),
            Arg::with_name("output")
                .help("Writes all listed keys to this file")
                .short("o")
                .long("output")
                .takes_value(true),
        ])
}

/// Executes this subcommand and returns a `UtilResult` to indicate success.
pub async fn exec(s3: S3Client, args: &ArgMatches<'_>) -> UtilResult<()> {
    let (bucket, prefix) = cli::get_bucket_pair(args);

    let mut output = match args.value_of("output") {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    let mut walker = ObjectWalker::new(&s3, bucket, prefix);
    let mut count = 0;
    let mut space = 0;

    // walk and print all objects
    while let Some(object) = walker.next().await? {
        let size = object.size.unwrap_or(0) as u64;
        let key = match object.key {
            Some(key) => key,
            None => continue,
        };

        println!("{}", format_line(&key, size, object.last_modified.as_deref()));

        if let Some(output) = &mut output {
            writeln!(output, "{}", key)?;
        }

        count += 1;
        space += size;
    }

    if let Some(mut output) = output {
        output.flush()?;
    }

    println!("Total: {} objects, {}", count, util::convert_bytes(space));

    Ok(())
}

/// Formats a single listing line for an object.
fn format_line(key: &str, size: u64, modified: Option<&str>) -> String {
    format!(
        "{:>10}  {:<24}  {}",
        util::convert_bytes(size),
        modified.unwrap_or("-"),
        key
    )
}
