//! Write an index of all files inside a local folder.
//!
//! The index is a plain list of paths, one per line, which can be edited
//! and passed back into `upload --files-from`.
use clap::{App, Arg, ArgMatches, SubCommand};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::cli;
use crate::local::{self, Filter};
use crate::types::UtilResult;

/// Generates an appropriate `SubCommand` for this module.
pub fn cmd<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("index")
        .about("Write the paths of all files inside a local folder")
        .args(&cli::global_args())
        .args(&[
            Arg::with_name("folder")
                .help("A local folder to index")
                .index(1)
                .required(true),
            Arg::with_name("output")
                .help("The file to write the index into")
                .short("o")
                .long("output")
                .takes_value(true)
                .default_value("all_files.txt"),
            cli::exclude_arg(),
        ])
}

/// Executes this subcommand and returns a `UtilResult` to indicate success.
pub fn exec(args: &ArgMatches<'_>) -> UtilResult<()> {
    let folder = Path::new(args.value_of("folder").unwrap_or_default());
    let output = args.value_of("output").unwrap_or("all_files.txt");
    let filter = Filter::new(&cli::get_values(args, "exclude"))?;

    let files = index(folder, &filter)?;

    info!("Found {} files in {}", files.len(), folder.display());

    if cli::is_dry_run(args) {
        for file in &files {
            info!("{}", file.display());
        }
        return Ok(());
    }

    let mut writer = BufWriter::new(File::create(output)?);
    for file in &files {
        writeln!(writer, "{}", file.display())?;
    }
    writer.flush()?;

    info!("Wrote index to {}", output);

    Ok(())
}

/// Collects all files below a folder which aren't excluded.
fn index(folder: &Path, filter: &Filter) -> UtilResult<Vec<PathBuf>> {
    Ok(local::walk(folder)?
        .into_iter()
        .filter(|path| !filter.excludes(path))
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::local::Filter;
    use std::fs;

    #[test]
    fn indexing_with_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("p1/data_directories/d1/out")).unwrap();
        fs::write(root.join("p1/data_directories/d1/out/tile.jpg"), b"t").unwrap();
        fs::write(root.join("p1/data_directories/d1/img.jpg"), b"i").unwrap();
        fs::write(root.join("p1/cloud.las"), b"c").unwrap();

        let filter = Filter::new(&["data_directories.*/out/"]).unwrap();
        let files = super::index(root, &filter).unwrap();

        assert_eq!(
            files,
            vec![
                root.join("p1/cloud.las"),
                root.join("p1/data_directories/d1/img.jpg"),
            ]
        );
    }
}
