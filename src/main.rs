//! Utilities to migrate LiDARMill data between the API, disk and S3.
//!
//! This tool should be used from a command line and can be used in many
//! different ways; please see the main documentation in the repository.
//!
//! Unless static keys are provided, credentials must be provided via the
//! guidelines in the [AWS Documentation]
//! (https://docs.aws.amazon.com/cli/latest/userguide/cli-environment.html).
#[macro_use]
extern crate log as logger;

mod cli;
mod client;
mod local;
mod log;
mod retry;
mod transfer;
mod types;
mod util;
mod walker;

mod account;
mod archive;
mod download;
mod index;
mod list;
mod relocate;
mod upload;

#[tokio::main]
async fn main() -> types::UtilResult<()> {
    // build the CLI and grab all arguments
    let args = cli::build().get_matches();

    // initialize logging from the subcommand switches
    let (_, subargs) = args.subcommand();
    log::init(subargs.unwrap_or(&args))?;

    // delegate to the cli mod
    cli::exec(&args).await
}
