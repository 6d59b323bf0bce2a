//! Flags raised by signal handlers and serviced later on the admission thread.
//!
//! The handlers only store into an atomic; everything else happens on the thread that checks
//! the flag.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ems_utils::errors::prelude::*;
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::SigId;

use crate::store::EventStore;

/// A pending request to print every event, raised by `SIGUSR1`.
#[derive(Debug, Clone, Default)]
pub struct AdminDump {
    requested: Arc<AtomicBool>,
}

impl AdminDump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> io::Result<SigId> {
        signal_hook::flag::register(SIGUSR1, self.requested.clone())
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Dumps `store` to `sink` if a dump was requested since the last one.
    ///
    /// Requests raised while the dump is being written are folded into it.
    pub fn service(&self, store: &dyn EventStore, sink: &mut dyn Write) -> Result<bool> {
        if !self.is_requested() {
            return Ok(false);
        }
        let result = store.dump_all(sink).context("failed to dump events");
        self.requested.store(false, Ordering::SeqCst);
        result.map(|_| true)
    }
}

/// Set once the process was asked to stop, by `SIGINT` or `SIGTERM`.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> io::Result<Vec<SigId>> {
        [SIGINT, SIGTERM]
            .iter()
            .map(|signal| signal_hook::flag::register(*signal, self.requested.clone()))
            .collect()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "./unit/signals_tests.rs"]
mod signals_tests;
