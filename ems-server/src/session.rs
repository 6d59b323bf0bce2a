//! The request loop of one accepted client.

use std::io::{Read, Write};

use ems_utils::data::SessionId;
use ems_utils::errors::prelude::*;
use ems_utils::ipc::{
    ClientToServerMsg, DecodeError, IpcReceiver, IpcSender, Request, ServerToClientMsg,
};
use log::{debug, warn};

use crate::store::EventStore;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client asked to disconnect.
    Disconnected,
    /// The client closed its request pipe.
    Closed,
    /// The client sent something the server refuses to go on with.
    ProtocolError,
}

pub struct Session<R: Read, W: Write> {
    id: SessionId,
    receiver: IpcReceiver<R>,
    sender: IpcSender<W>,
}

impl<R: Read, W: Write> Session<R, W> {
    pub fn new(id: SessionId, requests: R, responses: W) -> Self {
        Session {
            id,
            receiver: IpcReceiver::new(requests),
            sender: IpcSender::new(responses),
        }
    }

    /// Tells the client which session id to put on its requests.
    pub fn handshake(&mut self) -> Result<()> {
        let id = self.id;
        self.sender
            .send_session_id(id)
            .with_context(|| format!("failed to send id to session {}", id))
    }

    /// Serves requests in order until the client leaves or breaks the protocol.
    ///
    /// Only I/O failures on the pipes are returned as errors.
    pub fn run(&mut self, store: &dyn EventStore) -> Result<SessionEnd> {
        let id = self.id;
        let err_context = || format!("session {} failed", id);

        loop {
            let request = match self.receiver.recv_request() {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(SessionEnd::Closed),
                Err(DecodeError::Io(e)) => return Err(e).with_context(err_context),
                Err(e) => {
                    warn!("session {}: {}", self.id, e);
                    if e.is_answerable() {
                        self.respond(&ServerToClientMsg::Error)
                            .with_context(err_context)?;
                    }
                    return Ok(SessionEnd::ProtocolError);
                },
            };

            if request.session_id != self.id {
                warn!(
                    "session {}: request carries session id {}",
                    self.id, request.session_id
                );
                self.respond(&ServerToClientMsg::Error)
                    .with_context(err_context)?;
                return Ok(SessionEnd::ProtocolError);
            }
            if request.msg == ClientToServerMsg::Disconnect {
                return Ok(SessionEnd::Disconnected);
            }

            let response = self.dispatch(store, request);
            self.respond(&response).with_context(err_context)?;
        }
    }

    fn dispatch(&self, store: &dyn EventStore, request: Request) -> ServerToClientMsg {
        let op_code = request.msg.op_code();
        debug!("session {}: {:?}", self.id, request.msg);

        let result = match request.msg {
            ClientToServerMsg::Create {
                event_id,
                rows,
                cols,
            } => store
                .create(event_id, rows, cols)
                .map(|_| ServerToClientMsg::Ok),
            ClientToServerMsg::Reserve { event_id, seats } => store
                .reserve(event_id, &seats)
                .map(|_| ServerToClientMsg::Ok),
            ClientToServerMsg::Show { event_id } => store.show(event_id).map(ServerToClientMsg::Seats),
            ClientToServerMsg::ListEvents => Ok(ServerToClientMsg::Events(store.list_events())),
            ClientToServerMsg::Disconnect => Ok(ServerToClientMsg::Ok),
        };
        result.unwrap_or_else(|e| {
            warn!("session {}: {} failed: {}", self.id, op_code, e);
            ServerToClientMsg::Error
        })
    }

    fn respond(&mut self, response: &ServerToClientMsg) -> Result<()> {
        self.sender
            .send_response(response)
            .context("failed to write response")
    }
}

#[cfg(test)]
#[path = "./unit/session_tests.rs"]
mod session_tests;
