use std::fmt::{self, Display, Formatter};

pub type EventId = u32;
pub type SessionId = i32;
pub type ReservationId = u32;

/// A seat state as stored and sent over the wire: `0` is free, anything else is the id of the
/// reservation holding the seat.
pub type SeatState = u32;

pub const FREE_SEAT: SeatState = 0;

/// A 1-based seat coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Seat {
    pub row: usize,
    pub col: usize,
}

impl Seat {
    pub fn new(row: usize, col: usize) -> Self {
        Seat { row, col }
    }
}

/// Full contents of one event's seating grid, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatGrid {
    pub rows: usize,
    pub cols: usize,
    pub seats: Vec<SeatState>,
}

impl SeatGrid {
    pub fn new(rows: usize, cols: usize, seats: Vec<SeatState>) -> Self {
        debug_assert_eq!(seats.len(), rows * cols);
        SeatGrid { rows, cols, seats }
    }

    /// The seat at `(row, col)`, 1-based. `None` when outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<SeatState> {
        seat_index(self.rows, self.cols, row, col).map(|index| self.seats[index])
    }
}

/// Index of the 1-based `(row, col)` seat in a row-major grid, if it lies inside it.
pub fn seat_index(rows: usize, cols: usize, row: usize, col: usize) -> Option<usize> {
    if row == 0 || col == 0 || row > rows || col > cols {
        None
    } else {
        Some((row - 1) * cols + (col - 1))
    }
}

impl Display for SeatGrid {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for row in self.seats.chunks(self.cols.max(1)) {
            let line = row
                .iter()
                .map(|seat| seat.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// The event ids returned by a list request, printed one `Event: <id>` line each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventList(pub Vec<EventId>);

impl Display for EventList {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No events");
        }
        for event_id in &self.0 {
            writeln!(f, "Event: {}", event_id)?;
        }
        Ok(())
    }
}
