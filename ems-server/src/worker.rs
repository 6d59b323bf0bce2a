//! The fixed pool of threads serving sessions.
//!
//! Worker `i` hands out session id `i + 1` to every client it serves, so ids are only unique
//! among sessions being served at the same time.

use std::fs::{File, OpenOptions};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ems_utils::data::SessionId;
use ems_utils::errors::prelude::*;
use ems_utils::ipc::ConnectRequest;
use log::info;

use crate::handoff::SessionQueue;
use crate::session::Session;
use crate::store::EventStore;

pub(crate) fn spawn_workers(
    count: usize,
    queue: &Arc<SessionQueue>,
    store: &Arc<dyn EventStore>,
) -> Result<Vec<JoinHandle<()>>> {
    (0..count)
        .map(|slot| {
            let session_id = slot as SessionId + 1;
            let queue = queue.clone();
            let store = store.clone();
            thread::Builder::new()
                .name(format!("session_{}", session_id))
                .spawn(move || worker_main(session_id, &queue, &*store))
                .with_context(|| format!("failed to spawn worker for session {}", session_id))
        })
        .collect()
}

fn worker_main(session_id: SessionId, queue: &SessionQueue, store: &dyn EventStore) {
    loop {
        let connect = queue.pop();
        serve(session_id, &connect, store).non_fatal();
    }
}

fn serve(session_id: SessionId, connect: &ConnectRequest, store: &dyn EventStore) -> Result<()> {
    let err_context = || {
        format!(
            "failed to serve session {} on {}",
            session_id,
            connect.request_pipe().display()
        )
    };

    let requests = File::open(connect.request_pipe()).with_context(err_context)?;
    let responses = OpenOptions::new()
        .write(true)
        .open(connect.response_pipe())
        .with_context(err_context)?;

    let mut session = Session::new(session_id, requests, responses);
    session.handshake().with_context(err_context)?;
    info!(
        "session {} started for {}",
        session_id,
        connect.request_pipe().display()
    );
    let end = session.run(store).with_context(err_context)?;
    info!("session {} ended: {:?}", session_id, end);
    Ok(())
}
