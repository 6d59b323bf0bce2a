use super::*;
use std::io::Cursor;

fn frame(op: u8, session_id: i32) -> Vec<u8> {
    let mut bytes = vec![op];
    bytes.extend_from_slice(&session_id.to_ne_bytes());
    bytes
}

fn receiver(bytes: Vec<u8>) -> IpcReceiver<Cursor<Vec<u8>>> {
    IpcReceiver::new(Cursor::new(bytes))
}

#[test]
fn decodes_create_request() {
    let mut bytes = frame(b'3', 1);
    bytes.extend_from_slice(&10u32.to_ne_bytes());
    bytes.extend_from_slice(&2u64.to_ne_bytes());
    bytes.extend_from_slice(&3u64.to_ne_bytes());

    let request = receiver(bytes).recv_request().unwrap();
    assert_eq!(
        request,
        Some(Request {
            session_id: 1,
            msg: ClientToServerMsg::Create {
                event_id: 10,
                rows: 2,
                cols: 3
            },
        })
    );
}

#[test]
fn decodes_reserve_request_with_split_coordinates() {
    let mut bytes = frame(b'4', 2);
    bytes.extend_from_slice(&10u32.to_ne_bytes());
    bytes.extend_from_slice(&2u64.to_ne_bytes());
    for x in [1u64, 1] {
        bytes.extend_from_slice(&x.to_ne_bytes());
    }
    for y in [1u64, 2] {
        bytes.extend_from_slice(&y.to_ne_bytes());
    }

    let request = receiver(bytes).recv_request().unwrap().unwrap();
    assert_eq!(
        request.msg,
        ClientToServerMsg::Reserve {
            event_id: 10,
            seats: vec![Seat::new(1, 1), Seat::new(1, 2)],
        }
    );
}

#[test]
fn oversized_reservation_is_rejected_without_reading_coordinates() {
    let mut bytes = frame(b'4', 1);
    bytes.extend_from_slice(&10u32.to_ne_bytes());
    bytes.extend_from_slice(&(MAX_RESERVATION_SIZE as u64 + 1).to_ne_bytes());
    let header_len = bytes.len();
    bytes.extend_from_slice(&[0xAB; 64]);

    let mut receiver = receiver(bytes);
    let err = receiver.recv_request().unwrap_err();
    assert!(
        matches!(
            err,
            DecodeError::ReservationTooLarge { requested, max }
                if requested == MAX_RESERVATION_SIZE as u64 + 1 && max == MAX_RESERVATION_SIZE
        ),
        "got {:?}",
        err
    );
    assert!(err.is_answerable());
    assert_eq!(receiver.get_ref().position() as usize, header_len);
}

#[test]
fn huge_declared_count_does_not_allocate() {
    let mut bytes = frame(b'4', 1);
    bytes.extend_from_slice(&1u32.to_ne_bytes());
    bytes.extend_from_slice(&u64::MAX.to_ne_bytes());

    let err = receiver(bytes).recv_request().unwrap_err();
    assert!(matches!(err, DecodeError::ReservationTooLarge { .. }));
}

#[test]
fn truncated_create_reports_missing_field() {
    let mut bytes = frame(b'3', 1);
    bytes.extend_from_slice(&10u32.to_ne_bytes());
    bytes.extend_from_slice(&2u64.to_ne_bytes());
    bytes.extend_from_slice(&[0u8; 3]);

    let err = receiver(bytes).recv_request().unwrap_err();
    assert!(
        matches!(err, DecodeError::Truncated { field: "column count" }),
        "got {:?}",
        err
    );
}

#[test]
fn truncated_reserve_coordinates_are_reported() {
    let mut bytes = frame(b'4', 1);
    bytes.extend_from_slice(&10u32.to_ne_bytes());
    bytes.extend_from_slice(&2u64.to_ne_bytes());
    bytes.extend_from_slice(&1u64.to_ne_bytes());

    let err = receiver(bytes).recv_request().unwrap_err();
    assert!(matches!(err, DecodeError::Truncated { field: "seat row" }));
    assert!(!err.is_answerable());
}

#[test]
fn empty_stream_is_end_of_stream() {
    assert_eq!(receiver(vec![]).recv_request().unwrap(), None);
    assert_eq!(receiver(vec![]).recv_connect().unwrap(), None);
}

#[test]
fn unknown_op_code_is_an_error() {
    let err = receiver(vec![b'9', 0, 0, 0, 0]).recv_request().unwrap_err();
    assert!(matches!(err, DecodeError::UnknownOpCode(b'9')));
}

#[test]
fn connect_is_not_a_session_request() {
    let err = receiver(frame(b'1', 1)).recv_request().unwrap_err();
    assert!(matches!(
        err,
        DecodeError::UnexpectedOpCode(OpCode::Connect)
    ));
}

#[test]
fn session_requests_are_not_accepted_on_the_control_pipe() {
    let err = receiver(frame(b'6', 1)).recv_connect().unwrap_err();
    assert!(matches!(err, DecodeError::UnexpectedOpCode(OpCode::List)));
}

#[test]
fn connect_frame_has_fixed_layout() {
    let connect = ConnectRequest::new("/tmp/a.req", "/tmp/a.resp").unwrap();
    let mut sender = IpcSender::new(Vec::new());
    sender.send_connect(&connect).unwrap();
    let bytes = sender.get_ref().clone();

    assert_eq!(bytes.len(), 1 + 2 * MAX_PIPE_PATH_SIZE);
    assert_eq!(bytes[0], b'1');
    assert_eq!(&bytes[1..11], b"/tmp/a.req");
    assert!(bytes[11..1 + MAX_PIPE_PATH_SIZE].iter().all(|b| *b == 0));
    assert_eq!(
        &bytes[1 + MAX_PIPE_PATH_SIZE..1 + MAX_PIPE_PATH_SIZE + 11],
        b"/tmp/a.resp"
    );

    let decoded = receiver(bytes).recv_connect().unwrap().unwrap();
    assert_eq!(decoded.request_pipe(), Path::new("/tmp/a.req"));
    assert_eq!(decoded.response_pipe(), Path::new("/tmp/a.resp"));
}

#[test]
fn connect_frame_with_empty_path_is_rejected() {
    let mut bytes = vec![b'1'];
    bytes.extend_from_slice(&[0u8; MAX_PIPE_PATH_SIZE]);
    bytes.extend_from_slice(&pad_pipe_path(Path::new("/tmp/a.resp")));

    let err = receiver(bytes).recv_connect().unwrap_err();
    assert!(matches!(err, DecodeError::InvalidPipePath));
}

#[test]
fn pipe_paths_must_fit_the_frame() {
    let long_path = format!("/tmp/{}", "x".repeat(MAX_PIPE_PATH_SIZE));
    let err = ConnectRequest::new(long_path, "/tmp/a.resp").unwrap_err();
    assert!(matches!(err, EmsError::PipePathTooLong { .. }));
    assert!(ConnectRequest::new("", "/tmp/a.resp").is_err());
}

#[test]
fn pipe_paths_keep_room_for_the_terminator() {
    let fits = format!("/tmp/{}", "x".repeat(MAX_PIPE_PATH_SIZE - 6));
    assert_eq!(fits.len(), MAX_PIPE_PATH_SIZE - 1);
    let connect = ConnectRequest::new(&fits, "/tmp/a.resp").unwrap();
    assert_eq!(pad_pipe_path(connect.request_pipe())[MAX_PIPE_PATH_SIZE - 1], 0);

    let full = format!("/tmp/{}", "x".repeat(MAX_PIPE_PATH_SIZE - 5));
    assert_eq!(full.len(), MAX_PIPE_PATH_SIZE);
    let err = ConnectRequest::new(&full, "/tmp/a.resp").unwrap_err();
    assert!(matches!(
        err,
        EmsError::PipePathTooLong { max, .. } if max == MAX_PIPE_PATH_SIZE - 1
    ));
}

#[test]
fn connect_frame_with_unterminated_path_is_rejected() {
    let mut bytes = vec![b'1'];
    bytes.extend_from_slice(&[b'x'; MAX_PIPE_PATH_SIZE]);
    bytes.extend_from_slice(&pad_pipe_path(Path::new("/tmp/a.resp")));

    let err = receiver(bytes).recv_connect().unwrap_err();
    assert!(matches!(err, DecodeError::InvalidPipePath));
}

#[test]
fn show_response_layout() {
    let grid = SeatGrid::new(2, 3, vec![1, 1, 0, 0, 0, 0]);
    let mut sender = IpcSender::new(Vec::new());
    sender
        .send_response(&ServerToClientMsg::Seats(grid.clone()))
        .unwrap();
    let bytes = sender.get_ref().clone();

    assert_eq!(bytes.len(), 4 + 8 + 8 + 6 * 4);
    assert_eq!(&bytes[0..4], &STATUS_OK.to_ne_bytes());
    assert_eq!(&bytes[4..12], &2u64.to_ne_bytes());
    assert_eq!(&bytes[12..20], &3u64.to_ne_bytes());

    let decoded = receiver(bytes).recv_response(OpCode::Show).unwrap();
    assert_eq!(decoded, ServerToClientMsg::Seats(grid));
}

#[test]
fn error_status_carries_no_payload() {
    let mut sender = IpcSender::new(Vec::new());
    sender.send_response(&ServerToClientMsg::Error).unwrap();
    assert_eq!(sender.get_ref().as_slice(), &STATUS_ERROR.to_ne_bytes());

    let mut bytes = STATUS_ERROR.to_ne_bytes().to_vec();
    bytes.extend_from_slice(&[0xFF; 8]);
    let mut receiver = receiver(bytes);
    assert_eq!(
        receiver.recv_response(OpCode::Show).unwrap(),
        ServerToClientMsg::Error
    );
    assert_eq!(receiver.get_ref().position(), 4);
}

#[test]
fn oversized_grid_is_rejected_by_the_client() {
    let mut bytes = STATUS_OK.to_ne_bytes().to_vec();
    bytes.extend_from_slice(&(1u64 << 32).to_ne_bytes());
    bytes.extend_from_slice(&(1u64 << 32).to_ne_bytes());

    let err = receiver(bytes).recv_response(OpCode::Show).unwrap_err();
    assert!(matches!(err, DecodeError::GridTooLarge { .. }));
}

#[test]
fn list_response_layout() {
    let mut sender = IpcSender::new(Vec::new());
    sender
        .send_response(&ServerToClientMsg::Events(vec![4, 7]))
        .unwrap();
    let bytes = sender.get_ref().clone();
    assert_eq!(bytes.len(), 4 + 8 + 2 * 4);

    let decoded = receiver(bytes).recv_response(OpCode::List).unwrap();
    assert_eq!(decoded, ServerToClientMsg::Events(vec![4, 7]));
}

#[test]
fn disconnect_request_has_no_payload() {
    let mut sender = IpcSender::new(Vec::new());
    sender
        .send_request(&Request {
            session_id: 3,
            msg: ClientToServerMsg::Disconnect,
        })
        .unwrap();
    assert_eq!(sender.get_ref().as_slice(), frame(b'2', 3).as_slice());
}
