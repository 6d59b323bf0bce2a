mod commands;
#[cfg(test)]
mod tests;

use std::process;

use ems_utils::{
    cli::{CliArgs, Command},
    clap::Parser,
    errors::prelude::*,
    logging::configure_logger,
};

pub fn main() {
    let opts = CliArgs::parse();
    // the service still runs without a log file
    let _ = configure_logger(opts.log_level).to_stderr();

    let result = match &opts.command {
        Command::Server(server) => commands::start_server(server),
        Command::Client(client) => commands::run_client(client),
        Command::Batch(batch) => commands::run_batch(batch),
    };
    if let Err(e) = result.to_log() {
        eprintln!("Error: {:?}", e);
        process::exit(1);
    }
}
