use super::*;
use std::sync::Arc;
use std::thread;

fn seats(coordinates: &[(usize, usize)]) -> Vec<Seat> {
    coordinates
        .iter()
        .map(|(row, col)| Seat::new(*row, *col))
        .collect()
}

#[test]
fn first_reservation_is_visible_in_the_grid() {
    let store = MemoryEventStore::new();
    store.create(10, 2, 3).unwrap();
    assert_eq!(store.reserve(10, &seats(&[(1, 1), (1, 2)])), Ok(1));

    let grid = store.show(10).unwrap();
    assert_eq!(grid.seats, vec![1, 1, 0, 0, 0, 0]);
    assert_eq!(grid.get(1, 2), Some(1));
    assert_eq!(grid.get(2, 1), Some(0));
}

#[test]
fn reservation_ids_grow_per_event() {
    let store = MemoryEventStore::new();
    store.create(1, 1, 3).unwrap();
    store.create(2, 1, 3).unwrap();
    assert_eq!(store.reserve(1, &seats(&[(1, 1)])), Ok(1));
    assert_eq!(store.reserve(1, &seats(&[(1, 3)])), Ok(2));
    assert_eq!(store.reserve(2, &seats(&[(1, 2)])), Ok(1));
    assert_eq!(store.show(1).unwrap().seats, vec![1, 0, 2]);
}

#[test]
fn create_rejects_duplicates_and_bad_dimensions() {
    let store = MemoryEventStore::new();
    store.create(1, 2, 2).unwrap();
    assert_eq!(store.create(1, 3, 3), Err(StoreError::AlreadyExists(1)));
    assert!(matches!(
        store.create(2, 0, 4),
        Err(StoreError::InvalidDimensions { .. })
    ));
    assert!(matches!(
        store.create(3, usize::MAX, 2),
        Err(StoreError::InvalidDimensions { .. })
    ));
    assert!(matches!(
        store.create(4, MAX_EVENT_SEATS, 2),
        Err(StoreError::InvalidDimensions { .. })
    ));
    assert_eq!(store.list_events(), vec![1]);
}

#[test]
fn reservation_is_all_or_nothing() {
    let store = MemoryEventStore::new();
    store.create(1, 2, 2).unwrap();
    store.reserve(1, &seats(&[(2, 2)])).unwrap();

    assert_eq!(
        store.reserve(1, &seats(&[(1, 1), (1, 2), (2, 2)])),
        Err(StoreError::SeatTaken {
            event_id: 1,
            seat: Seat::new(2, 2)
        })
    );
    assert!(matches!(
        store.reserve(1, &seats(&[(1, 1), (3, 1)])),
        Err(StoreError::OutOfBounds { .. })
    ));
    assert!(matches!(
        store.reserve(1, &seats(&[(1, 1), (1, 1)])),
        Err(StoreError::SeatTaken { .. })
    ));
    assert_eq!(store.show(1).unwrap().seats, vec![0, 0, 0, 1]);

    // failed attempts do not use up reservation ids
    assert_eq!(store.reserve(1, &seats(&[(1, 1)])), Ok(2));
}

#[test]
fn seats_are_one_based() {
    let store = MemoryEventStore::new();
    store.create(1, 2, 2).unwrap();
    assert!(matches!(
        store.reserve(1, &seats(&[(0, 1)])),
        Err(StoreError::OutOfBounds { .. })
    ));
    assert!(matches!(
        store.reserve(1, &seats(&[(1, 0)])),
        Err(StoreError::OutOfBounds { .. })
    ));
}

#[test]
fn missing_events_and_empty_reservations_fail() {
    let store = MemoryEventStore::new();
    assert_eq!(store.show(7), Err(StoreError::NotFound(7)));
    assert_eq!(
        store.reserve(7, &seats(&[(1, 1)])),
        Err(StoreError::NotFound(7))
    );
    store.create(7, 1, 1).unwrap();
    assert_eq!(store.reserve(7, &[]), Err(StoreError::NoSeats));
}

#[test]
fn events_are_listed_in_creation_order() {
    let store = MemoryEventStore::new();
    for event_id in [5, 1, 3] {
        store.create(event_id, 1, 1).unwrap();
    }
    assert_eq!(store.list_events(), vec![5, 1, 3]);
}

#[test]
fn dump_writes_every_event() {
    let store = MemoryEventStore::new();
    store.create(2, 2, 2).unwrap();
    store.create(1, 1, 3).unwrap();
    store.reserve(2, &seats(&[(2, 1)])).unwrap();

    let mut sink = Vec::new();
    store.dump_all(&mut sink).unwrap();
    insta::assert_snapshot!(String::from_utf8(sink).unwrap(), @r###"
    Event: 2
    0 0
    1 0
    Event: 1
    0 0 0
    "###);
}

#[test]
fn dump_of_an_empty_store() {
    let mut sink = Vec::new();
    MemoryEventStore::new().dump_all(&mut sink).unwrap();
    assert_eq!(sink, b"No events\n");
}

#[test]
fn concurrent_reservations_never_share_a_seat() {
    let store = Arc::new(MemoryEventStore::new());
    store.create(1, 1, 64).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                (1..=64)
                    .filter(|col| store.reserve(1, &[Seat::new(1, *col)]).is_ok())
                    .count()
            })
        })
        .collect();
    let won: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(won, 64);
    let grid = store.show(1).unwrap();
    let mut ids = grid.seats.clone();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 64);
    assert!(!ids.contains(&FREE_SEAT));
}

#[test]
fn runs_job_scripts_locally() {
    use ems_utils::jobs::run_jobs;
    use std::io::Cursor;

    let store = MemoryEventStore::new();
    let mut output = Vec::new();
    let script = "CREATE 1 1 2\nRESERVE 1 [(1,2)]\nSHOW 1\nSHOW 2\n";
    let summary = run_jobs(
        &mut StoreTarget::new(&store),
        Cursor::new(script),
        &mut output,
    )
    .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(String::from_utf8(output).unwrap(), "0 1\n");
}

/// A store that remembers how long job scripts asked it to wait instead of sleeping.
#[derive(Default)]
struct PausingStore {
    events: MemoryEventStore,
    pauses: Mutex<Vec<Duration>>,
}

impl EventStore for PausingStore {
    fn create(&self, event_id: EventId, rows: usize, cols: usize) -> Result<(), StoreError> {
        self.events.create(event_id, rows, cols)
    }

    fn reserve(&self, event_id: EventId, seats: &[Seat]) -> Result<ReservationId, StoreError> {
        self.events.reserve(event_id, seats)
    }

    fn show(&self, event_id: EventId) -> Result<SeatGrid, StoreError> {
        self.events.show(event_id)
    }

    fn list_events(&self) -> Vec<EventId> {
        self.events.list_events()
    }

    fn wait(&self, delay: Duration) {
        self.pauses.lock().unwrap().push(delay);
    }
}

#[test]
fn job_waits_are_handed_to_the_store() {
    use ems_utils::jobs::run_jobs;
    use std::io::Cursor;

    let store = PausingStore::default();
    let script = "CREATE 1 1 1\nWAIT 40\nWAIT 0\nWAIT 15 1\nSHOW 1\n";
    let mut output = Vec::new();
    run_jobs(
        &mut StoreTarget::new(&store),
        Cursor::new(script),
        &mut output,
    )
    .unwrap();

    assert_eq!(
        *store.pauses.lock().unwrap(),
        vec![Duration::from_millis(40), Duration::from_millis(15)]
    );
    assert_eq!(String::from_utf8(output).unwrap(), "0\n");
}
