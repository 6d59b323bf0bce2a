//! Client side of an EMS session.
//!
//! A client owns a pair of named pipes it creates next to each other, announces them on the
//! server's control pipe and then waits until a worker picks the session up. Requests are
//! answered strictly in order, so each call blocks until its response is back.

use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ems_utils::consts::MAX_RESERVATION_SIZE;
use ems_utils::data::{EventId, Seat, SeatGrid, SessionId};
use ems_utils::errors::prelude::*;
use ems_utils::ipc::{
    ClientToServerMsg, ConnectRequest, DecodeError, IpcReceiver, IpcSender, Request,
    ServerToClientMsg,
};
use ems_utils::jobs::JobTarget;
use ems_utils::shared::{make_fifo, remove_fifo};
use log::{debug, info};

pub struct EmsClient {
    session_id: SessionId,
    request_pipe: PathBuf,
    response_pipe: PathBuf,
    sender: IpcSender<File>,
    receiver: IpcReceiver<BufReader<File>>,
    disconnected: bool,
}

impl EmsClient {
    /// Creates both session pipes, announces them on `control_pipe` and waits for a session id.
    ///
    /// Blocks while every worker of the server is busy.
    pub fn connect(
        request_pipe: impl AsRef<Path>,
        response_pipe: impl AsRef<Path>,
        control_pipe: impl AsRef<Path>,
    ) -> Result<Self> {
        let request_pipe = request_pipe.as_ref();
        let response_pipe = response_pipe.as_ref();
        let control_pipe = control_pipe.as_ref();
        let err_context = || format!("failed to connect to {}", control_pipe.display());

        let connect = ConnectRequest::new(request_pipe, response_pipe).with_context(err_context)?;
        make_fifo(request_pipe).with_context(err_context)?;
        if let Err(e) = make_fifo(response_pipe) {
            remove_fifo(request_pipe).ok();
            return Err(e).with_context(err_context);
        }

        let result = Self::handshake(&connect, control_pipe);
        if result.is_err() {
            remove_fifo(request_pipe).ok();
            remove_fifo(response_pipe).ok();
        }
        result.with_context(err_context)
    }

    fn handshake(connect: &ConnectRequest, control_pipe: &Path) -> Result<Self> {
        let control = OpenOptions::new()
            .write(true)
            .open(control_pipe)
            .context("failed to open control pipe")?;
        IpcSender::new(control)
            .send_connect(connect)
            .context("failed to announce session")?;

        // same order as the worker opening them, or both ends wait on each other
        let requests = OpenOptions::new()
            .write(true)
            .open(connect.request_pipe())
            .context("failed to open request pipe")?;
        let responses =
            File::open(connect.response_pipe()).context("failed to open response pipe")?;

        let mut receiver = IpcReceiver::new(BufReader::new(responses));
        let session_id = receiver
            .recv_session_id()
            .context("failed to receive session id")?;
        info!("connected as session {}", session_id);

        Ok(EmsClient {
            session_id,
            request_pipe: connect.request_pipe().to_path_buf(),
            response_pipe: connect.response_pipe().to_path_buf(),
            sender: IpcSender::new(requests),
            receiver,
            disconnected: false,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn create(&mut self, event_id: EventId, rows: usize, cols: usize) -> Result<()> {
        self.call(ClientToServerMsg::Create {
            event_id,
            rows,
            cols,
        })
        .map(|_| ())
    }

    /// Reserves every seat in `seats` or none of them.
    pub fn reserve(&mut self, event_id: EventId, seats: &[Seat]) -> Result<()> {
        if seats.is_empty() || seats.len() > MAX_RESERVATION_SIZE {
            return Err(EmsError::InvalidReservationSize {
                count: seats.len(),
                max: MAX_RESERVATION_SIZE,
            }
            .into());
        }
        self.call(ClientToServerMsg::Reserve {
            event_id,
            seats: seats.to_vec(),
        })
        .map(|_| ())
    }

    pub fn show(&mut self, event_id: EventId) -> Result<SeatGrid> {
        match self.call(ClientToServerMsg::Show { event_id })? {
            ServerToClientMsg::Seats(grid) => Ok(grid),
            other => Err(anyhow!("unexpected answer to show: {:?}", other)),
        }
    }

    pub fn list_events(&mut self) -> Result<Vec<EventId>> {
        match self.call(ClientToServerMsg::ListEvents)? {
            ServerToClientMsg::Events(events) => Ok(events),
            other => Err(anyhow!("unexpected answer to list: {:?}", other)),
        }
    }

    /// Ends the session. The server does not answer, so this never blocks on the response pipe.
    pub fn disconnect(mut self) -> Result<()> {
        self.disconnected = true;
        self.sender
            .send_request(&Request {
                session_id: self.session_id,
                msg: ClientToServerMsg::Disconnect,
            })
            .with_context(|| format!("failed to disconnect session {}", self.session_id))
    }

    fn call(&mut self, msg: ClientToServerMsg) -> Result<ServerToClientMsg> {
        let op_code = msg.op_code();
        let session_id = self.session_id;
        let err_context = || format!("{} request of session {} failed", op_code, session_id);

        debug!("session {}: sending {:?}", session_id, msg);
        self.sender
            .send_request(&Request { session_id, msg })
            .with_context(err_context)?;

        match self.receiver.recv_response(op_code) {
            Ok(ServerToClientMsg::Error) => Err(EmsError::RequestRejected {
                operation: op_code.name(),
            })
            .with_context(err_context),
            Ok(response) => Ok(response),
            Err(DecodeError::Truncated { field: "status" }) => {
                Err(EmsError::SessionClosed).with_context(err_context)
            },
            Err(e) => Err(e).with_context(err_context),
        }
    }
}

impl Drop for EmsClient {
    fn drop(&mut self) {
        if !self.disconnected {
            let _ = self.sender.send_request(&Request {
                session_id: self.session_id,
                msg: ClientToServerMsg::Disconnect,
            });
        }
        remove_fifo(&self.request_pipe).ok();
        remove_fifo(&self.response_pipe).ok();
    }
}

impl JobTarget for EmsClient {
    fn create(&mut self, event_id: EventId, rows: usize, cols: usize) -> Result<()> {
        EmsClient::create(self, event_id, rows, cols)
    }

    fn reserve(&mut self, event_id: EventId, seats: &[Seat]) -> Result<()> {
        EmsClient::reserve(self, event_id, seats)
    }

    fn show(&mut self, event_id: EventId) -> Result<SeatGrid> {
        EmsClient::show(self, event_id)
    }

    fn list_events(&mut self) -> Result<Vec<EventId>> {
        EmsClient::list_events(self)
    }
}

#[cfg(test)]
#[path = "./unit/client_tests.rs"]
mod client_tests;
