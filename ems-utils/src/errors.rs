//! Error types shared by the EMS client, server and front end, plus a few helpers to decide
//! whether a failure is logged and tolerated or brings the process down.
//!
//! Library code returns typed errors ([`EmsError`], [`DecodeError`](crate::ipc::DecodeError));
//! everything above that propagates [`anyhow::Result`] with context attached at each layer.

use std::path::PathBuf;
use thiserror::Error;

/// Re-exports of common error-handling code.
pub mod prelude {
    pub use super::EmsError;
    pub use super::FatalError;
    pub use super::LoggableError;
    pub use anyhow::anyhow;
    pub use anyhow::bail;
    pub use anyhow::Context;
    pub use anyhow::Error as anyError;
    pub use anyhow::Result;
}

/// Logs an error without consuming it.
///
/// The result is handed back untouched so the call can sit in the middle of a chain.
pub trait LoggableError<T>: Sized {
    /// Formats the error, if any, and gives it to `fun`.
    #[track_caller]
    fn print_error<F: Fn(&str)>(self, fun: F) -> Self;

    /// Logs the error at `error` level, attributed to the caller's file and line.
    #[track_caller]
    fn to_log(self) -> Self {
        let caller = std::panic::Location::caller();
        self.print_error(|msg| {
            log::logger().log(
                &log::Record::builder()
                    .level(log::Level::Error)
                    .args(format_args!("{}", msg))
                    .file(Some(caller.file()))
                    .line(Some(caller.line()))
                    .module_path(None)
                    .build(),
            );
        })
    }

    /// Prints the error to stderr.
    fn to_stderr(self) -> Self {
        self.print_error(|msg| eprintln!("{}", msg))
    }
}

impl<T> LoggableError<T> for anyhow::Result<T> {
    fn print_error<F: Fn(&str)>(self, fun: F) -> Self {
        if let Err(ref err) = self {
            fun(&format!("{:?}", err));
        }
        self
    }
}

/// Marks a failed result as tolerable: it is logged and the caller carries on.
pub trait FatalError<T> {
    /// Logs the error, if any, and discards the result.
    #[track_caller]
    fn non_fatal(self);
}

fn discard_result<T>(_arg: anyhow::Result<T>) {}

impl<T> FatalError<T> for anyhow::Result<T> {
    fn non_fatal(self) {
        if self.is_err() {
            discard_result(
                anyhow::Context::context(self, "a non-fatal error occurred").to_log(),
            );
        }
    }
}

#[derive(Debug, Error)]
pub enum EmsError {
    #[error("pipe path '{}' is longer than {max} bytes", .path.display())]
    PipePathTooLong { path: PathBuf, max: usize },

    #[error("pipe path '{}' is not a valid pipe name", .path.display())]
    InvalidPipePath { path: PathBuf },

    #[error("the server rejected the {operation} request")]
    RequestRejected { operation: &'static str },

    #[error("the server closed the session")]
    SessionClosed,

    #[error("{} is not a .jobs file", .path.display())]
    NotAJobsFile { path: PathBuf },

    #[error("reservation of {count} seats is outside 1..={max}")]
    InvalidReservationSize { count: usize, max: usize },
}
