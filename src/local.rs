//! Local filesystem helpers shared by the transfer commands.
//!
//! This covers walking directory trees, filtering paths by pattern and
//! mapping local paths to object keys (and back).
use regex::Regex;
use walkdir::WalkDir;

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::types::UtilResult;

/// Recursively collects all regular files below `root`, sorted by path.
///
/// Symbolic links are never followed, so linked directories can't cause
/// a tree to be walked more than once.
pub fn walk(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Lists the direct children of a directory, sorted by path.
pub fn children(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<io::Result<Vec<_>>>()?;

    entries.sort();
    Ok(entries)
}

/// Set of exclusion patterns to apply against local paths.
pub struct Filter {
    patterns: Vec<Regex>,
}

impl Filter {
    /// Compiles a new `Filter` from a set of patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> UtilResult<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| Regex::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Determines whether a path matches any of the exclusion patterns.
    pub fn excludes(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.patterns.iter().any(|pattern| pattern.is_match(&path))
    }
}

/// Builds an object key from an optional prefix and a relative path.
///
/// Keys always use `/` as a separator, regardless of the platform.
pub fn object_key(prefix: Option<&str>, relative: &Path) -> String {
    let relative = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, relative),
        _ => relative,
    }
}

/// Maps an object key to a path below the provided root directory.
///
/// Any component which could escape the root (such as `..`) is dropped.
pub fn key_path(root: &Path, key: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in key.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            continue;
        }
        path.push(part);
    }
    path
}

/// Converts a string into something safe to use as a filename.
///
/// Leading and trailing whitespace is removed, inner spaces become
/// underscores, and anything that isn't alphanumeric, a dash, an
/// underscore or a dot is dropped. Non-ASCII runs become underscores.
pub fn valid_filename(name: &str) -> String {
    let name = name.trim().replace(' ', "_");
    let name = invalid_chars().replace_all(&name, "");
    non_ascii_runs().replace_all(&name, "_").into_owned()
}

/// Returns the pattern matching characters invalid in a filename.
fn invalid_chars() -> Regex {
    Regex::new(r"[^-\w.]").expect("filename pattern should compile")
}

/// Returns the pattern matching runs of non-ASCII characters.
fn non_ascii_runs() -> Regex {
    Regex::new(r"[^\x00-\x7F]+").expect("ASCII pattern should compile")
}

/// Reads a newline separated list from a file, skipping blank lines.
pub fn read_list(path: &Path) -> io::Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
