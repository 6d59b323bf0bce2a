//! The fixed-layout binary protocol spoken between clients and the server over named pipes.
//!
//! Three channels carry it:
//!
//! - the well-known *control* pipe, on which a client announces itself with a connect frame:
//!   `{op}{request pipe path}{response pipe path}`, both paths NUL-padded to
//!   [`MAX_PIPE_PATH_SIZE`] bytes, so a path keeps at least one terminating NUL;
//! - the per-session *request* pipe, carrying `{op}{session id}{payload}` frames;
//! - the per-session *response* pipe, carrying the assigned session id once, then one
//!   `{status}{payload}` frame per request other than disconnect.
//!
//! All integers are fixed width in native byte order; the pipes never leave the host. Every
//! field is read with a single complete transfer, so a peer closing mid-frame surfaces as
//! [`DecodeError::Truncated`] instead of a zeroed value.

use crate::consts::{MAX_EVENT_COUNT, MAX_EVENT_SEATS, MAX_PIPE_PATH_SIZE, MAX_RESERVATION_SIZE};
use crate::data::{EventId, Seat, SeatGrid, SeatState, SessionId};
use crate::errors::EmsError;

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::{
    convert::TryFrom,
    ffi::OsStr,
    fmt::{self, Display, Formatter},
    io::{self, Read, Write},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const STATUS_OK: u32 = 0;
pub const STATUS_ERROR: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Connect = b'1',
    Disconnect = b'2',
    Create = b'3',
    Reserve = b'4',
    Show = b'5',
    List = b'6',
}

impl OpCode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::Connect => "connect",
            OpCode::Disconnect => "disconnect",
            OpCode::Create => "create",
            OpCode::Reserve => "reserve",
            OpCode::Show => "show",
            OpCode::List => "list",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'1' => Ok(OpCode::Connect),
            b'2' => Ok(OpCode::Disconnect),
            b'3' => Ok(OpCode::Create),
            b'4' => Ok(OpCode::Reserve),
            b'5' => Ok(OpCode::Show),
            b'6' => Ok(OpCode::List),
            other => Err(DecodeError::UnknownOpCode(other)),
        }
    }
}

impl Display for OpCode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message truncated while reading {field}")]
    Truncated { field: &'static str },

    #[error("unknown op code {0:#04x}")]
    UnknownOpCode(u8),

    #[error("op code '{0}' is not valid on this channel")]
    UnexpectedOpCode(OpCode),

    #[error("reservation of {requested} seats exceeds the maximum of {max}")]
    ReservationTooLarge { requested: u64, max: usize },

    #[error("grid of {rows}x{cols} seats exceeds the maximum of {max}")]
    GridTooLarge { rows: usize, cols: usize, max: usize },

    #[error("event list of {count} entries exceeds the maximum of {max}")]
    ListTooLong { count: usize, max: usize },

    #[error("{field} value {value} does not fit in a usize")]
    SizeOverflow { field: &'static str, value: u64 },

    #[error("connect frame carries an empty or malformed pipe path")]
    InvalidPipePath,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// Whether the request that failed to decode was identified well enough to answer it.
    pub fn is_answerable(&self) -> bool {
        matches!(self, DecodeError::ReservationTooLarge { .. })
    }
}

/// A client announcing itself on the control pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    request_pipe: PathBuf,
    response_pipe: PathBuf,
}

impl ConnectRequest {
    pub fn new(
        request_pipe: impl Into<PathBuf>,
        response_pipe: impl Into<PathBuf>,
    ) -> Result<Self, EmsError> {
        let request_pipe = request_pipe.into();
        let response_pipe = response_pipe.into();
        validate_pipe_path(&request_pipe)?;
        validate_pipe_path(&response_pipe)?;
        Ok(ConnectRequest {
            request_pipe,
            response_pipe,
        })
    }

    pub fn request_pipe(&self) -> &Path {
        &self.request_pipe
    }

    pub fn response_pipe(&self) -> &Path {
        &self.response_pipe
    }
}

fn validate_pipe_path(path: &Path) -> Result<(), EmsError> {
    let bytes = path.as_os_str().as_bytes();
    if bytes.is_empty() || bytes.contains(&0) {
        return Err(EmsError::InvalidPipePath {
            path: path.to_path_buf(),
        });
    }
    if bytes.len() >= MAX_PIPE_PATH_SIZE {
        return Err(EmsError::PipePathTooLong {
            path: path.to_path_buf(),
            max: MAX_PIPE_PATH_SIZE - 1,
        });
    }
    Ok(())
}

fn pad_pipe_path(path: &Path) -> [u8; MAX_PIPE_PATH_SIZE] {
    let bytes = path.as_os_str().as_bytes();
    let mut padded = [0u8; MAX_PIPE_PATH_SIZE];
    let len = bytes.len().min(MAX_PIPE_PATH_SIZE);
    padded[..len].copy_from_slice(&bytes[..len]);
    padded
}

fn unpad_pipe_path(padded: &[u8]) -> Result<PathBuf, DecodeError> {
    // an unterminated field would not be a valid C string on the other end
    let len = match padded.iter().position(|b| *b == 0) {
        Some(0) | None => return Err(DecodeError::InvalidPipePath),
        Some(len) => len,
    };
    Ok(PathBuf::from(OsStr::from_bytes(&padded[..len])))
}

/// Operations a client can ask for on its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientToServerMsg {
    Disconnect,
    Create {
        event_id: EventId,
        rows: usize,
        cols: usize,
    },
    Reserve {
        event_id: EventId,
        seats: Vec<Seat>,
    },
    Show {
        event_id: EventId,
    },
    ListEvents,
}

impl ClientToServerMsg {
    pub fn op_code(&self) -> OpCode {
        match self {
            ClientToServerMsg::Disconnect => OpCode::Disconnect,
            ClientToServerMsg::Create { .. } => OpCode::Create,
            ClientToServerMsg::Reserve { .. } => OpCode::Reserve,
            ClientToServerMsg::Show { .. } => OpCode::Show,
            ClientToServerMsg::ListEvents => OpCode::List,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub session_id: SessionId,
    pub msg: ClientToServerMsg,
}

/// Answers to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerToClientMsg {
    Ok,
    Error,
    Seats(SeatGrid),
    Events(Vec<EventId>),
}

impl ServerToClientMsg {
    pub fn status(&self) -> u32 {
        match self {
            ServerToClientMsg::Error => STATUS_ERROR,
            _ => STATUS_OK,
        }
    }
}

fn read_field<T>(result: io::Result<T>, field: &'static str) -> Result<T, DecodeError> {
    result.map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => DecodeError::Truncated { field },
        _ => DecodeError::Io(e),
    })
}

/// Reads frames from one end of a pipe.
pub struct IpcReceiver<R> {
    receiver: R,
}

impl<R: Read> IpcReceiver<R> {
    pub fn new(receiver: R) -> Self {
        Self { receiver }
    }

    pub fn get_ref(&self) -> &R {
        &self.receiver
    }

    /// Reads the leading op byte of a frame. `None` means the writer closed cleanly before a
    /// new frame started.
    fn recv_op_code(&mut self) -> Result<Option<OpCode>, DecodeError> {
        let mut byte = [0u8; 1];
        loop {
            match self.receiver.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return OpCode::try_from(byte[0]).map(Some),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }
    }

    fn recv_size(&mut self, field: &'static str) -> Result<usize, DecodeError> {
        let value = read_field(self.receiver.read_u64::<NativeEndian>(), field)?;
        usize::try_from(value).map_err(|_| DecodeError::SizeOverflow { field, value })
    }

    fn recv_event_id(&mut self) -> Result<EventId, DecodeError> {
        read_field(self.receiver.read_u32::<NativeEndian>(), "event id")
    }

    /// Reads one connect frame from the control pipe.
    pub fn recv_connect(&mut self) -> Result<Option<ConnectRequest>, DecodeError> {
        match self.recv_op_code()? {
            None => Ok(None),
            Some(OpCode::Connect) => {
                let mut request_pipe = [0u8; MAX_PIPE_PATH_SIZE];
                read_field(
                    self.receiver.read_exact(&mut request_pipe),
                    "request pipe path",
                )?;
                let mut response_pipe = [0u8; MAX_PIPE_PATH_SIZE];
                read_field(
                    self.receiver.read_exact(&mut response_pipe),
                    "response pipe path",
                )?;
                Ok(Some(ConnectRequest {
                    request_pipe: unpad_pipe_path(&request_pipe)?,
                    response_pipe: unpad_pipe_path(&response_pipe)?,
                }))
            },
            Some(other) => Err(DecodeError::UnexpectedOpCode(other)),
        }
    }

    /// Reads one request frame from a session's request pipe.
    pub fn recv_request(&mut self) -> Result<Option<Request>, DecodeError> {
        let op_code = match self.recv_op_code()? {
            Some(op_code) => op_code,
            None => return Ok(None),
        };
        let session_id = read_field(self.receiver.read_i32::<NativeEndian>(), "session id")?;
        let msg = match op_code {
            OpCode::Connect => return Err(DecodeError::UnexpectedOpCode(op_code)),
            OpCode::Disconnect => ClientToServerMsg::Disconnect,
            OpCode::Create => {
                let event_id = self.recv_event_id()?;
                let rows = self.recv_size("row count")?;
                let cols = self.recv_size("column count")?;
                ClientToServerMsg::Create {
                    event_id,
                    rows,
                    cols,
                }
            },
            OpCode::Reserve => {
                let event_id = self.recv_event_id()?;
                let count = read_field(self.receiver.read_u64::<NativeEndian>(), "seat count")?;
                if count > MAX_RESERVATION_SIZE as u64 {
                    return Err(DecodeError::ReservationTooLarge {
                        requested: count,
                        max: MAX_RESERVATION_SIZE,
                    });
                }
                let count = count as usize;
                let rows = (0..count)
                    .map(|_| self.recv_size("seat row"))
                    .collect::<Result<Vec<_>, _>>()?;
                let cols = (0..count)
                    .map(|_| self.recv_size("seat column"))
                    .collect::<Result<Vec<_>, _>>()?;
                ClientToServerMsg::Reserve {
                    event_id,
                    seats: rows
                        .into_iter()
                        .zip(cols)
                        .map(|(row, col)| Seat::new(row, col))
                        .collect(),
                }
            },
            OpCode::Show => ClientToServerMsg::Show {
                event_id: self.recv_event_id()?,
            },
            OpCode::List => ClientToServerMsg::ListEvents,
        };
        Ok(Some(Request { session_id, msg }))
    }

    /// Reads the session id the server writes first on a response pipe.
    pub fn recv_session_id(&mut self) -> Result<SessionId, DecodeError> {
        read_field(self.receiver.read_i32::<NativeEndian>(), "session id")
    }

    /// Reads the response to a request of kind `op_code`. The payload is only read when the
    /// status reports success.
    pub fn recv_response(&mut self, op_code: OpCode) -> Result<ServerToClientMsg, DecodeError> {
        let status = read_field(self.receiver.read_u32::<NativeEndian>(), "status")?;
        if status != STATUS_OK {
            return Ok(ServerToClientMsg::Error);
        }
        match op_code {
            OpCode::Show => self.recv_seat_grid().map(ServerToClientMsg::Seats),
            OpCode::List => self.recv_event_list().map(ServerToClientMsg::Events),
            _ => Ok(ServerToClientMsg::Ok),
        }
    }

    fn recv_seat_grid(&mut self) -> Result<SeatGrid, DecodeError> {
        let rows = self.recv_size("row count")?;
        let cols = self.recv_size("column count")?;
        let len = rows
            .checked_mul(cols)
            .filter(|len| *len <= MAX_EVENT_SEATS)
            .ok_or(DecodeError::GridTooLarge {
                rows,
                cols,
                max: MAX_EVENT_SEATS,
            })?;
        let mut seats: Vec<SeatState> = vec![0; len];
        read_field(
            self.receiver.read_u32_into::<NativeEndian>(&mut seats),
            "seats",
        )?;
        Ok(SeatGrid::new(rows, cols, seats))
    }

    fn recv_event_list(&mut self) -> Result<Vec<EventId>, DecodeError> {
        let count = self.recv_size("event count")?;
        if count > MAX_EVENT_COUNT {
            return Err(DecodeError::ListTooLong {
                count,
                max: MAX_EVENT_COUNT,
            });
        }
        let mut events: Vec<EventId> = vec![0; count];
        read_field(
            self.receiver.read_u32_into::<NativeEndian>(&mut events),
            "event ids",
        )?;
        Ok(events)
    }
}

/// Writes frames to one end of a pipe. Every frame is flushed as a whole.
pub struct IpcSender<W: Write> {
    sender: io::BufWriter<W>,
}

impl<W: Write> IpcSender<W> {
    pub fn new(sender: W) -> Self {
        Self {
            sender: io::BufWriter::new(sender),
        }
    }

    pub fn get_ref(&self) -> &W {
        self.sender.get_ref()
    }

    pub fn send_connect(&mut self, connect: &ConnectRequest) -> io::Result<()> {
        self.sender.write_u8(OpCode::Connect.as_byte())?;
        self.sender.write_all(&pad_pipe_path(&connect.request_pipe))?;
        self.sender.write_all(&pad_pipe_path(&connect.response_pipe))?;
        self.sender.flush()
    }

    pub fn send_request(&mut self, request: &Request) -> io::Result<()> {
        self.sender.write_u8(request.msg.op_code().as_byte())?;
        self.sender.write_i32::<NativeEndian>(request.session_id)?;
        match &request.msg {
            ClientToServerMsg::Disconnect | ClientToServerMsg::ListEvents => {},
            ClientToServerMsg::Create {
                event_id,
                rows,
                cols,
            } => {
                self.sender.write_u32::<NativeEndian>(*event_id)?;
                self.sender.write_u64::<NativeEndian>(*rows as u64)?;
                self.sender.write_u64::<NativeEndian>(*cols as u64)?;
            },
            ClientToServerMsg::Reserve { event_id, seats } => {
                self.sender.write_u32::<NativeEndian>(*event_id)?;
                self.sender.write_u64::<NativeEndian>(seats.len() as u64)?;
                for seat in seats {
                    self.sender.write_u64::<NativeEndian>(seat.row as u64)?;
                }
                for seat in seats {
                    self.sender.write_u64::<NativeEndian>(seat.col as u64)?;
                }
            },
            ClientToServerMsg::Show { event_id } => {
                self.sender.write_u32::<NativeEndian>(*event_id)?;
            },
        }
        self.sender.flush()
    }

    pub fn send_session_id(&mut self, session_id: SessionId) -> io::Result<()> {
        self.sender.write_i32::<NativeEndian>(session_id)?;
        self.sender.flush()
    }

    pub fn send_response(&mut self, response: &ServerToClientMsg) -> io::Result<()> {
        self.sender.write_u32::<NativeEndian>(response.status())?;
        match response {
            ServerToClientMsg::Ok | ServerToClientMsg::Error => {},
            ServerToClientMsg::Seats(grid) => {
                self.sender.write_u64::<NativeEndian>(grid.rows as u64)?;
                self.sender.write_u64::<NativeEndian>(grid.cols as u64)?;
                for seat in &grid.seats {
                    self.sender.write_u32::<NativeEndian>(*seat)?;
                }
            },
            ServerToClientMsg::Events(events) => {
                self.sender.write_u64::<NativeEndian>(events.len() as u64)?;
                for event_id in events {
                    self.sender.write_u32::<NativeEndian>(*event_id)?;
                }
            },
        }
        self.sender.flush()
    }
}

#[cfg(test)]
#[path = "./unit/ipc_tests.rs"]
mod ipc_tests;
