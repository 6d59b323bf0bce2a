use crate::consts::{
    DEFAULT_MAX_JOBS, DEFAULT_MAX_THREADS, DEFAULT_POLL_INTERVAL_MS, ENV_DELAY_US, ENV_LOG_LEVEL,
    ENV_MAX_JOBS, ENV_MAX_SESSIONS, ENV_MAX_THREADS, ENV_POLL_INTERVAL_MS, MAX_SESSION_COUNT,
    STATE_ACCESS_DELAY_US,
};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(version, name = "ems")]
pub struct CliArgs {
    /// Most verbose level written to the log file
    #[clap(long, default_value = "info", env = ENV_LOG_LEVEL)]
    pub log_level: LevelFilter,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve clients announcing themselves on a named pipe
    #[clap(name = "server")]
    Server(ServerCli),

    /// Run a job file through a running server
    #[clap(name = "client")]
    Client(ClientCli),

    /// Run every job file of a directory against a local store
    #[clap(name = "batch")]
    Batch(BatchCli),
}

#[derive(Debug, Args, Clone)]
pub struct ServerCli {
    /// Path of the control pipe to create and listen on
    #[clap(parse(from_os_str))]
    pub control_pipe: PathBuf,

    /// Delay, in microseconds, applied to every seat access
    #[clap(long, default_value_t = STATE_ACCESS_DELAY_US, env = ENV_DELAY_US)]
    pub delay_us: u64,

    /// Number of sessions served at the same time
    #[clap(long, default_value_t = MAX_SESSION_COUNT, env = ENV_MAX_SESSIONS)]
    pub max_sessions: usize,

    /// How often, in milliseconds, the server checks for a pending dump or shutdown while idle
    #[clap(long, default_value_t = DEFAULT_POLL_INTERVAL_MS, env = ENV_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Args, Clone)]
pub struct ClientCli {
    /// Pipe the server reads this client's requests from
    #[clap(parse(from_os_str))]
    pub request_pipe: PathBuf,

    /// Pipe the server writes responses to
    #[clap(parse(from_os_str))]
    pub response_pipe: PathBuf,

    /// Control pipe of the server
    #[clap(parse(from_os_str))]
    pub control_pipe: PathBuf,

    /// Job file to run; output goes next to it with an `.out` extension
    #[clap(parse(from_os_str))]
    pub jobs_file: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct BatchCli {
    /// Directory scanned for `.jobs` files
    #[clap(parse(from_os_str))]
    pub jobs_dir: PathBuf,

    /// Job files run at the same time
    #[clap(long, default_value_t = DEFAULT_MAX_JOBS, env = ENV_MAX_JOBS)]
    pub max_jobs: usize,

    /// Threads sharing each job file, lines dealt out between them round-robin
    #[clap(long, default_value_t = DEFAULT_MAX_THREADS, env = ENV_MAX_THREADS)]
    pub max_threads: usize,

    /// Delay, in microseconds, applied to every seat access
    #[clap(long, default_value_t = STATE_ACCESS_DELAY_US, env = ENV_DELAY_US)]
    pub delay_us: u64,
}
