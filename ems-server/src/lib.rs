pub mod handoff;
pub mod session;
pub mod signals;
pub mod store;

mod worker;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ems_utils::cli::ServerCli;
use ems_utils::consts::{DEFAULT_POLL_INTERVAL_MS, MAX_SESSION_COUNT, STATE_ACCESS_DELAY_US};
use ems_utils::errors::prelude::*;
use ems_utils::ipc::{ConnectRequest, DecodeError, IpcReceiver};
use ems_utils::shared::{make_fifo, remove_fifo};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use crate::handoff::SessionQueue;
use crate::signals::{AdminDump, Shutdown};
use crate::store::EventStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub control_pipe: PathBuf,
    pub max_sessions: usize,
    pub access_delay: Duration,
    pub poll_interval: Duration,
}

impl ServerOptions {
    pub fn new(control_pipe: impl Into<PathBuf>) -> Self {
        ServerOptions {
            control_pipe: control_pipe.into(),
            max_sessions: MAX_SESSION_COUNT,
            access_delay: Duration::from_micros(STATE_ACCESS_DELAY_US),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl From<&ServerCli> for ServerOptions {
    fn from(cli: &ServerCli) -> Self {
        ServerOptions {
            control_pipe: cli.control_pipe.clone(),
            max_sessions: cli.max_sessions,
            access_delay: Duration::from_micros(cli.delay_us),
            poll_interval: Duration::from_millis(cli.poll_interval_ms),
        }
    }
}

/// A bound server: the control pipe exists and the workers are waiting for sessions.
pub struct Server {
    control_pipe: PathBuf,
    poll_interval: Duration,
    // read straight from the pipe so `poll` sees every frame that was not consumed yet
    control: IpcReceiver<File>,
    queue: Arc<SessionQueue>,
    store: Arc<dyn EventStore>,
    dump: AdminDump,
    shutdown: Shutdown,
    dump_sink: Box<dyn Write + Send>,
    _workers: Vec<JoinHandle<()>>,
}

impl Server {
    /// Creates the control pipe and starts `options.max_sessions` workers.
    pub fn bind(options: &ServerOptions, store: Arc<dyn EventStore>) -> Result<Self> {
        let err_context = || {
            format!(
                "failed to start server on {}",
                options.control_pipe.display()
            )
        };

        if options.max_sessions == 0 {
            return Err(anyhow!("the server needs at least one worker")).with_context(err_context);
        }
        make_fifo(&options.control_pipe).with_context(err_context)?;
        // holding a writer ourselves keeps reads from hitting end-of-file between clients
        let control = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&options.control_pipe)
            .with_context(err_context)?;

        let queue = Arc::new(SessionQueue::new(options.max_sessions));
        let workers = worker::spawn_workers(options.max_sessions, &queue, &store)
            .with_context(err_context)?;
        info!(
            "listening on {} with {} workers",
            options.control_pipe.display(),
            options.max_sessions
        );

        Ok(Server {
            control_pipe: options.control_pipe.clone(),
            poll_interval: options.poll_interval,
            control: IpcReceiver::new(control),
            queue,
            store,
            dump: AdminDump::new(),
            shutdown: Shutdown::new(),
            dump_sink: Box::new(io::stdout()),
            _workers: workers,
        })
    }

    /// Sends dumps somewhere other than stdout.
    pub fn with_dump_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.dump_sink = sink;
        self
    }

    pub fn control_pipe(&self) -> &Path {
        &self.control_pipe
    }

    pub fn dump_handle(&self) -> AdminDump {
        self.dump.clone()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Routes `SIGUSR1` to the dump flag and `SIGINT`/`SIGTERM` to the shutdown flag.
    pub fn register_signal_handlers(&self) -> Result<()> {
        let err_context = || "failed to register signal handlers".to_string();
        self.dump.register().with_context(err_context)?;
        self.shutdown.register().with_context(err_context)?;
        Ok(())
    }

    /// Admits clients until shutdown is requested, then removes the control pipe.
    pub fn run(mut self) -> Result<()> {
        let result = self.admit();
        info!("shutting down, removing {}", self.control_pipe.display());
        remove_fifo(&self.control_pipe)
            .with_context(|| format!("failed to remove {}", self.control_pipe.display()))
            .non_fatal();
        result
    }

    fn admit(&mut self) -> Result<()> {
        let err_context = || "admission loop failed".to_string();
        let timeout = self.poll_interval.as_millis().min(i32::MAX as u128) as i32;

        loop {
            self.service_dump();
            if self.shutdown.is_requested() {
                return Ok(());
            }

            let mut fds = [PollFd::new(
                self.control.get_ref().as_raw_fd(),
                PollFlags::POLLIN,
            )];
            match poll(&mut fds, timeout) {
                Ok(0) => continue,
                Ok(_) => {},
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e).with_context(err_context),
            }

            match self.control.recv_connect() {
                Ok(Some(connect)) => {
                    info!(
                        "client announced {} and {}",
                        connect.request_pipe().display(),
                        connect.response_pipe().display()
                    );
                    if !self.hand_off(connect) {
                        return Ok(());
                    }
                },
                Ok(None) => continue,
                Err(DecodeError::Io(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(DecodeError::Io(e)) => return Err(e).with_context(err_context),
                Err(e) => warn!("discarding connect frame: {}", e),
            }
        }
    }

    fn service_dump(&mut self) {
        if let Ok(true) = self
            .dump
            .service(&*self.store, &mut *self.dump_sink)
            .to_log()
        {
            info!("dumped all events");
        }
    }

    /// Queues a connection for the workers. While every worker is busy the wait is cut into
    /// poll intervals, between which dumps are served and shutdown is noticed. Returns `false`
    /// if shutdown came first and the connection was dropped.
    fn hand_off(&mut self, mut connect: ConnectRequest) -> bool {
        loop {
            self.service_dump();
            if self.shutdown.is_requested() {
                warn!(
                    "dropping {} before a worker took it",
                    connect.request_pipe().display()
                );
                return false;
            }
            match self.queue.push_timeout(connect, self.poll_interval) {
                Ok(()) => return true,
                Err(waiting) => {
                    debug!(
                        "every worker is busy, {} keeps waiting",
                        waiting.request_pipe().display()
                    );
                    connect = waiting;
                },
            }
        }
    }
}

#[cfg(test)]
#[path = "./unit/server_tests.rs"]
mod server_tests;
