//! EMS program-wide constants.

use lazy_static::lazy_static;
use nix::unistd::Uid;
use std::path::PathBuf;

/// Number of workers in the server pool, and so the number of sessions that can be served at once.
pub const MAX_SESSION_COUNT: usize = 8;
/// Fixed width of a pipe path inside a connect frame, NUL padding included.
pub const MAX_PIPE_PATH_SIZE: usize = 40;
/// Largest number of seats a single reserve request may carry.
pub const MAX_RESERVATION_SIZE: usize = 256;
/// Upper bound on `rows * cols` for a single event.
pub const MAX_EVENT_SEATS: usize = 1 << 20;
/// Upper bound on the length of an event list a client is willing to decode.
pub const MAX_EVENT_COUNT: usize = 1 << 20;
/// Default delay, in microseconds, applied to every seat access in the store.
pub const STATE_ACCESS_DELAY_US: u64 = 0;
/// How long the admission loop waits for a connect frame before looking at its flags again.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Job files the batch front end runs at the same time unless told otherwise.
pub const DEFAULT_MAX_JOBS: usize = 4;
/// Threads sharing each job file in a batch run unless told otherwise.
pub const DEFAULT_MAX_THREADS: usize = 1;

pub const FIFO_PERMISSIONS: u32 = 0o600;

pub const JOBS_EXTENSION: &str = "jobs";
pub const OUTPUT_EXTENSION: &str = "out";

pub const LOG_FILE_NAME: &str = "ems.log";
pub const LOG_MAX_BYTES: u64 = 8 * 1024 * 1024;
pub const LOG_ROLLED_FILES: u32 = 3;

pub const ENV_MAX_SESSIONS: &str = "EMS_MAX_SESSIONS";
pub const ENV_DELAY_US: &str = "EMS_DELAY_US";
pub const ENV_POLL_INTERVAL_MS: &str = "EMS_POLL_INTERVAL_MS";
pub const ENV_MAX_JOBS: &str = "EMS_MAX_JOBS";
pub const ENV_MAX_THREADS: &str = "EMS_MAX_THREADS";
pub const ENV_LOG_LEVEL: &str = "EMS_LOG_LEVEL";

lazy_static! {
    static ref UID: Uid = Uid::current();
    pub static ref EMS_TMP_DIR: PathBuf = std::env::temp_dir().join(format!("ems-{}", *UID));
    pub static ref EMS_TMP_LOG_DIR: PathBuf = EMS_TMP_DIR.join("log");
    pub static ref EMS_TMP_LOG_FILE: PathBuf = EMS_TMP_LOG_DIR.join(LOG_FILE_NAME);
}
