//! Logging module for terminal based output control.
//!
//! Contains a custom logging implementation to disable/redirect output
//! based on command line switches baked into the application level. The
//! same records can be mirrored into log files, as long running transfers
//! are typically left unattended and checked afterwards.
use clap::ArgMatches;
use logger::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::SystemTime;

/// Basic logger instance to allow quiet-aware logging.
struct BasicLogger {
    quiet: bool,
    level: Level,
    file: Option<Mutex<File>>,
    errors: Option<Mutex<File>>,
}

// Basic logging implementation.
impl Log for BasicLogger {
    /// Returns enabled only for lidar-s3-utils modules.
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with("lidar_s3_utils") && metadata.level() <= self.level
    }

    /// Logs out a `Record` when logging is enabled.
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = record.metadata().level();

        if level == Level::Error {
            eprintln!("{}", record.args());
        } else if !self.quiet {
            println!("{}", record.args());
        }

        if let Some(file) = &self.file {
            append(file, record);
        }

        if level == Level::Error {
            if let Some(errors) = &self.errors {
                append(errors, record);
            }
        }
    }

    /// Flushes this logger.
    fn flush(&self) {
        for file in self.file.iter().chain(self.errors.iter()) {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Formats a record in the line format used inside log files.
fn format_line(record: &Record) -> String {
    format!(
        "{} - {} - {} - {}",
        humantime::format_rfc3339_seconds(SystemTime::now()),
        record.target(),
        record.level(),
        record.args()
    )
}

/// Appends a record to a shared log file, ignoring write failures.
fn append(file: &Mutex<File>, record: &Record) {
    if let Ok(mut file) = file.lock() {
        let _ = writeln!(file, "{}", format_line(record));
    }
}

/// Opens a log file in append mode, creating it when necessary.
fn open(path: Option<&str>) -> io::Result<Option<Mutex<File>>> {
    match path {
        None => Ok(None),
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(Some(Mutex::new(file)))
        }
    }
}

/// Initializes the logger based on the provided arguments.
///
/// If the `-q` flag was provided, this short circuits to cull all logging
/// to the terminal except errors; log files still receive everything.
pub fn init(args: &ArgMatches) -> Result<(), SetLoggerError> {
    let level = if args.is_present("verbose") {
        Level::Debug
    } else {
        Level::Info
    };

    // log files which can't be opened are reported, but never fatal
    let file = open(args.value_of("log_file")).unwrap_or_else(|err| {
        eprintln!("Unable to open log file: {}", err);
        None
    });
    let errors = open(args.value_of("error_log")).unwrap_or_else(|err| {
        eprintln!("Unable to open error log: {}", err);
        None
    });

    let logger = Box::new(BasicLogger {
        quiet: args.is_present("quiet"),
        level,
        file,
        errors,
    });

    let filter = match level {
        Level::Debug => LevelFilter::Debug,
        _ => LevelFilter::Info,
    };

    log::set_boxed_logger(logger).map(|_| log::set_max_level(filter))
}

#[cfg(test)]
mod tests {
    use logger::{Level, Record};

    #[test]
    fn formatting_file_lines() {
        let line = super::format_line(
            &Record::builder()
                .args(format_args!("Uploaded (1/2) a.las"))
                .level(Level::Info)
                .target("lidar_s3_utils::upload")
                .build(),
        );

        assert!(line.ends_with(" - lidar_s3_utils::upload - INFO - Uploaded (1/2) a.las"));
        assert!(line.contains('T'));
    }
}
