//! The event store every session operates on.
//!
//! Sessions share a single store and call into it concurrently; the store does its own locking.
//! The table of events sits behind a read-write lock that is only taken for writing by
//! `create`, and every event carries its own mutex, so requests on different events never wait
//! on each other.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use ems_utils::consts::MAX_EVENT_SEATS;
use ems_utils::data::{
    seat_index, EventId, EventList, ReservationId, Seat, SeatGrid, SeatState, FREE_SEAT,
};
use ems_utils::jobs::JobTarget;
use log::debug;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("event {0} already exists")]
    AlreadyExists(EventId),

    #[error("an event of {rows}x{cols} seats cannot be created")]
    InvalidDimensions { rows: usize, cols: usize },

    #[error("event {0} does not exist")]
    NotFound(EventId),

    #[error("seat ({}, {}) of event {event_id} is already taken", .seat.row, .seat.col)]
    SeatTaken { event_id: EventId, seat: Seat },

    #[error("seat ({}, {}) lies outside event {event_id}", .seat.row, .seat.col)]
    OutOfBounds { event_id: EventId, seat: Seat },

    #[error("a reservation needs at least one seat")]
    NoSeats,
}

/// Operations the server runs on behalf of its clients.
pub trait EventStore: Send + Sync {
    fn create(&self, event_id: EventId, rows: usize, cols: usize) -> Result<(), StoreError>;

    /// Takes every seat in `seats` or none of them.
    fn reserve(&self, event_id: EventId, seats: &[Seat]) -> Result<ReservationId, StoreError>;

    fn show(&self, event_id: EventId) -> Result<SeatGrid, StoreError>;

    /// Event ids in creation order.
    fn list_events(&self) -> Vec<EventId>;

    /// Writes every event and its grid to `sink`.
    fn dump_all(&self, sink: &mut dyn Write) -> io::Result<()> {
        let events = self.list_events();
        if events.is_empty() {
            return writeln!(sink, "{}", EventList(events)).and_then(|_| sink.flush());
        }
        for event_id in events {
            // events are never removed, so a listed event always has a grid
            if let Ok(grid) = self.show(event_id) {
                write!(sink, "Event: {}\n{}", event_id, grid)?;
            }
        }
        sink.flush()
    }

    fn wait(&self, delay: Duration) {
        thread::sleep(delay);
    }
}

#[derive(Debug)]
struct Event {
    rows: usize,
    cols: usize,
    reservations: ReservationId,
    seats: Vec<SeatState>,
}

#[derive(Debug, Default)]
struct EventTable {
    by_id: HashMap<EventId, Arc<Mutex<Event>>>,
    order: Vec<EventId>,
}

/// An [`EventStore`] kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<EventTable>,
    access_delay: Duration,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that sleeps for `access_delay` on every seat it reads or writes.
    pub fn with_access_delay(access_delay: Duration) -> Self {
        MemoryEventStore {
            events: RwLock::default(),
            access_delay,
        }
    }

    fn event(&self, event_id: EventId) -> Result<Arc<Mutex<Event>>, StoreError> {
        let table = self.events.read().unwrap_or_else(PoisonError::into_inner);
        table
            .by_id
            .get(&event_id)
            .cloned()
            .ok_or(StoreError::NotFound(event_id))
    }

    fn touch_seat(&self) {
        if !self.access_delay.is_zero() {
            thread::sleep(self.access_delay);
        }
    }
}

impl EventStore for MemoryEventStore {
    fn create(&self, event_id: EventId, rows: usize, cols: usize) -> Result<(), StoreError> {
        let len = rows
            .checked_mul(cols)
            .filter(|len| *len > 0 && *len <= MAX_EVENT_SEATS)
            .ok_or(StoreError::InvalidDimensions { rows, cols })?;

        let mut table = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if table.by_id.contains_key(&event_id) {
            return Err(StoreError::AlreadyExists(event_id));
        }
        let event = Event {
            rows,
            cols,
            reservations: 0,
            seats: vec![FREE_SEAT; len],
        };
        table.by_id.insert(event_id, Arc::new(Mutex::new(event)));
        table.order.push(event_id);
        debug!("created event {} with {}x{} seats", event_id, rows, cols);
        Ok(())
    }

    fn reserve(&self, event_id: EventId, seats: &[Seat]) -> Result<ReservationId, StoreError> {
        if seats.is_empty() {
            return Err(StoreError::NoSeats);
        }
        let event = self.event(event_id)?;
        let mut event = event.lock().unwrap_or_else(PoisonError::into_inner);
        let reservation_id = event.reservations + 1;

        let mut taken: Vec<usize> = Vec::with_capacity(seats.len());
        let mut failure = None;
        for seat in seats {
            let index = match seat_index(event.rows, event.cols, seat.row, seat.col) {
                Some(index) => index,
                None => {
                    failure = Some(StoreError::OutOfBounds {
                        event_id,
                        seat: *seat,
                    });
                    break;
                },
            };
            self.touch_seat();
            if event.seats[index] != FREE_SEAT {
                failure = Some(StoreError::SeatTaken {
                    event_id,
                    seat: *seat,
                });
                break;
            }
            event.seats[index] = reservation_id;
            taken.push(index);
        }

        if let Some(e) = failure {
            for index in taken {
                event.seats[index] = FREE_SEAT;
            }
            return Err(e);
        }
        event.reservations = reservation_id;
        Ok(reservation_id)
    }

    fn show(&self, event_id: EventId) -> Result<SeatGrid, StoreError> {
        let event = self.event(event_id)?;
        let event = event.lock().unwrap_or_else(PoisonError::into_inner);
        let seats = event
            .seats
            .iter()
            .map(|seat| {
                self.touch_seat();
                *seat
            })
            .collect();
        Ok(SeatGrid::new(event.rows, event.cols, seats))
    }

    fn list_events(&self) -> Vec<EventId> {
        let table = self.events.read().unwrap_or_else(PoisonError::into_inner);
        table.order.clone()
    }
}

/// Lets job scripts run straight against a store, without a server in between.
///
/// The handle is `Copy`, so every thread of a batch run can drive the same store through its own.
#[derive(Clone, Copy)]
pub struct StoreTarget<'a> {
    store: &'a dyn EventStore,
}

impl<'a> StoreTarget<'a> {
    pub fn new(store: &'a dyn EventStore) -> Self {
        StoreTarget { store }
    }
}

impl JobTarget for StoreTarget<'_> {
    fn create(&mut self, event_id: EventId, rows: usize, cols: usize) -> Result<()> {
        self.store.create(event_id, rows, cols)?;
        Ok(())
    }

    fn reserve(&mut self, event_id: EventId, seats: &[Seat]) -> Result<()> {
        self.store.reserve(event_id, seats)?;
        Ok(())
    }

    fn show(&mut self, event_id: EventId) -> Result<SeatGrid> {
        Ok(self.store.show(event_id)?)
    }

    fn list_events(&mut self) -> Result<Vec<EventId>> {
        Ok(self.store.list_events())
    }

    fn wait(&mut self, delay: Duration) {
        self.store.wait(delay);
    }
}

#[cfg(test)]
#[path = "./unit/store_tests.rs"]
mod store_tests;
