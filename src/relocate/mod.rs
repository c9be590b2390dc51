//! Move project directories matching a set of name patterns.
//!
//! Used to pull a selection of projects (typically by identifier) out of a
//! storage tree before uploading or archiving them separately.
use clap::{App, Arg, ArgMatches, SubCommand};
use regex::{Regex, RegexBuilder};
use walkdir::WalkDir;

use std::fs;
use std::io;
use std::path::Path;

use crate::cli;
use crate::local;
use crate::types::UtilResult;

/// Generates an appropriate `SubCommand` for this module.
pub fn cmd<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("move")
        .about("Move local project directories matching name patterns")
        .args(&cli::global_args())
        .args(&[
            Arg::with_name("input")
                .help("The folder to move entries out of")
                .index(1)
                .required(true),
            Arg::with_name("output")
                .help("The folder to move entries into")
                .index(2)
                .required(true),
            Arg::with_name("pattern")
                .help("A pattern to match entry names against")
                .short("p")
                .long("pattern")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .required_unless("patterns_from"),
            Arg::with_name("patterns_from")
                .help("A file containing one pattern per line")
                .long("patterns-from")
                .takes_value(true),
        ])
}

/// Executes this subcommand and returns a `UtilResult` to indicate success.
pub fn exec(args: &ArgMatches<'_>) -> UtilResult<()> {
    let dry = cli::is_dry_run(args);
    let input = Path::new(args.value_of("input").unwrap_or_default());
    let output = Path::new(args.value_of("output").unwrap_or_default());

    let mut patterns = cli::get_values(args, "pattern");
    if let Some(list) = args.value_of("patterns_from") {
        patterns.extend(local::read_list(Path::new(list))?);
    }

    let matcher = build_matcher(&patterns)?;

    info!("From {} to {}", input.display(), output.display());

    if !dry {
        fs::create_dir_all(output)?;
    }

    let mut moved = 0;

    for path in local::children(input)? {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };

        if !matcher.is_match(&name) {
            info!("Skipping {}", path.display());
            continue;
        }

        let target = output.join(&name);

        if target.exists() {
            warn!("Target {} already exists, skipping", target.display());
            continue;
        }

        info!("Moving {} to {}", name, target.display());

        if dry {
            continue;
        }

        match move_path(&path, &target) {
            Ok(()) => {
                info!("Moved");
                moved += 1;
            }
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => info!("file not found"),
            Err(err) => return Err(err.into()),
        }
    }

    info!("Moved {} entries", moved);

    Ok(())
}

/// Combines patterns into a single case insensitive alternation.
fn build_matcher(patterns: &[String]) -> UtilResult<Regex> {
    let patterns = patterns
        .iter()
        .map(|pattern| pattern.trim())
        .filter(|pattern| !pattern.is_empty())
        .collect::<Vec<_>>();

    if patterns.is_empty() {
        return Err("At least one pattern is required".into());
    }

    Ok(RegexBuilder::new(&format!("({})", patterns.join("|")))
        .case_insensitive(true)
        .build()?)
}

/// Moves a file or directory, falling back to copying across filesystems.
fn move_path(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(err),
        Err(err) => {
            debug!("Rename of {} failed ({}), copying instead", source.display(), err);
            copy_path(source, target)?;
            if fs::symlink_metadata(source)?.is_dir() {
                fs::remove_dir_all(source)
            } else {
                fs::remove_file(source)
            }
        }
    }
}

/// Recursively copies a file or directory, recreating symbolic links.
fn copy_path(source: &Path, target: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let destination = if relative.as_os_str().is_empty() {
            target.to_path_buf()
        } else {
            target.join(relative)
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&destination)?;
        } else if file_type.is_symlink() {
            copy_link(entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_link(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(source)?, target)
}

#[cfg(not(unix))]
fn copy_link(source: &Path, _target: &Path) -> io::Result<()> {
    warn!("Skipping symbolic link {}", source.display());
    Ok(())
}
