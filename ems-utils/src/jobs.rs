//! The `.jobs` command script language and a runner executing it against any [`JobTarget`].
//!
//! ```text
//! CREATE <event_id> <num_rows> <num_columns>
//! RESERVE <event_id> [(<x1>,<y1>) (<x2>,<y2>) ...]
//! SHOW <event_id>
//! LIST
//! WAIT <delay_ms> [thread_id]
//! BARRIER
//! HELP
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. A script can be shared between several
//! threads with [`run_jobs_threaded`]; `BARRIER` and the thread id of `WAIT` only matter there.

use std::{
    io::{self, BufRead, Write},
    ops::AddAssign,
    str::FromStr,
    sync::{Mutex, PoisonError},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use thiserror::Error;

use crate::consts::MAX_RESERVATION_SIZE;
use crate::data::{EventId, EventList, Seat, SeatGrid};
use crate::errors::EmsError;

pub const HELP_TEXT: &str = "Available commands:
  CREATE <event_id> <num_rows> <num_columns>
  RESERVE <event_id> [(<x1>,<y1>) (<x2>,<y2>) ...]
  SHOW <event_id>
  LIST
  WAIT <delay_ms> [thread_id]
  BARRIER
  HELP
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
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
    List,
    Wait {
        delay: Duration,
        thread_id: Option<u32>,
    },
    Barrier,
    Help,
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("missing {0}")]
    MissingArgument(&'static str),

    #[error("'{value}' is not a valid {what}")]
    InvalidNumber { what: &'static str, value: String },

    #[error("'{0}' is not a seat of the form (<x>,<y>)")]
    InvalidSeat(String),

    #[error("seat list must be enclosed in brackets")]
    MissingBrackets,

    #[error("a reservation needs between 1 and {max} seats, got {count}")]
    InvalidSeatCount { count: usize, max: usize },

    #[error("unexpected trailing input '{0}'")]
    TrailingInput(String),
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        parse_line(line)
    }
}

fn parse_number<T: FromStr>(token: Option<&str>, what: &'static str) -> Result<T, ParseError> {
    let token = token.ok_or(ParseError::MissingArgument(what))?;
    token.parse().map_err(|_| ParseError::InvalidNumber {
        what,
        value: token.to_string(),
    })
}

fn expect_end<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<(), ParseError> {
    match tokens.next() {
        Some(extra) => Err(ParseError::TrailingInput(extra.to_string())),
        None => Ok(()),
    }
}

fn parse_seat(token: &str) -> Result<Seat, ParseError> {
    let invalid = || ParseError::InvalidSeat(token.to_string());
    let inner = token
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(invalid)?;
    let (x, y) = inner.split_once(',').ok_or_else(invalid)?;
    let row = x.trim().parse().map_err(|_| invalid())?;
    let col = y.trim().parse().map_err(|_| invalid())?;
    Ok(Seat::new(row, col))
}

fn parse_seats(list: &str) -> Result<Vec<Seat>, ParseError> {
    let inner = list
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or(ParseError::MissingBrackets)?;
    let seats = inner
        .split_whitespace()
        .map(parse_seat)
        .collect::<Result<Vec<_>, _>>()?;
    if seats.is_empty() || seats.len() > MAX_RESERVATION_SIZE {
        return Err(ParseError::InvalidSeatCount {
            count: seats.len(),
            max: MAX_RESERVATION_SIZE,
        });
    }
    Ok(seats)
}

/// Parses a single line of a job script.
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Command::Empty);
    }
    let (keyword, rest) = line
        .split_once(char::is_whitespace)
        .map(|(keyword, rest)| (keyword, rest.trim()))
        .unwrap_or((line, ""));
    let mut tokens = rest.split_whitespace();

    let command = match keyword {
        "CREATE" => {
            let event_id = parse_number(tokens.next(), "event id")?;
            let rows = parse_number(tokens.next(), "row count")?;
            let cols = parse_number(tokens.next(), "column count")?;
            expect_end(tokens)?;
            Command::Create {
                event_id,
                rows,
                cols,
            }
        },
        "RESERVE" => {
            let (event_id, seats) = rest
                .split_once(char::is_whitespace)
                .unwrap_or((rest, ""));
            let event_id = parse_number(Some(event_id).filter(|s| !s.is_empty()), "event id")?;
            if seats.trim().is_empty() {
                return Err(ParseError::MissingArgument("seat list"));
            }
            Command::Reserve {
                event_id,
                seats: parse_seats(seats)?,
            }
        },
        "SHOW" => {
            let event_id = parse_number(tokens.next(), "event id")?;
            expect_end(tokens)?;
            Command::Show { event_id }
        },
        "LIST" => {
            expect_end(tokens)?;
            Command::List
        },
        "WAIT" => {
            let delay_ms: u64 = parse_number(tokens.next(), "delay")?;
            let thread_id = match tokens.next() {
                Some(token) => Some(parse_number(Some(token), "thread id")?),
                None => None,
            };
            expect_end(tokens)?;
            Command::Wait {
                delay: Duration::from_millis(delay_ms),
                thread_id,
            }
        },
        "BARRIER" => {
            expect_end(tokens)?;
            Command::Barrier
        },
        "HELP" => {
            expect_end(tokens)?;
            Command::Help
        },
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

/// Something job commands can be executed against: a server session or a local store.
pub trait JobTarget {
    fn create(&mut self, event_id: EventId, rows: usize, cols: usize) -> Result<()>;
    fn reserve(&mut self, event_id: EventId, seats: &[Seat]) -> Result<()>;
    fn show(&mut self, event_id: EventId) -> Result<SeatGrid>;
    fn list_events(&mut self) -> Result<Vec<EventId>>;

    fn wait(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

/// What happened while running one job script.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub executed: usize,
    pub invalid: usize,
    pub failed: usize,
}

/// One of the threads sharing a job script.
///
/// Threads are numbered from 1. Every thread reads every line, but a line is only executed by the
/// thread whose number matches the line index modulo the thread count. `WAIT` is the exception:
/// it pauses each thread it names, or all of them when it names none (or thread 0).
#[derive(Debug, Clone, Copy)]
struct Runner {
    thread_num: usize,
    threads: usize,
}

impl Runner {
    fn owns(&self, index: usize) -> bool {
        index % self.threads == self.thread_num % self.threads
    }

    fn pauses_for(&self, thread_id: Option<u32>) -> bool {
        match thread_id {
            None | Some(0) => true,
            Some(id) => usize::try_from(id).map_or(false, |id| id == self.thread_num),
        }
    }

    /// Runs the lines of one barrier-delimited round. `first` is the index of `lines[0]` within
    /// the whole script.
    fn run_round<T, W>(
        &self,
        target: &mut T,
        first: usize,
        lines: &[String],
        output: &Mutex<W>,
    ) -> Result<JobSummary>
    where
        T: JobTarget + ?Sized,
        W: Write,
    {
        let mut summary = JobSummary::default();
        for (offset, line) in lines.iter().enumerate() {
            self.run_line(target, first + offset, line, output, &mut summary)?;
        }
        Ok(summary)
    }

    fn run_line<T, W>(
        &self,
        target: &mut T,
        index: usize,
        line: &str,
        output: &Mutex<W>,
        summary: &mut JobSummary,
    ) -> Result<()>
    where
        T: JobTarget + ?Sized,
        W: Write,
    {
        let line_number = index + 1;
        let owned = self.owns(index);
        let command = match parse_line(line) {
            Ok(Command::Empty) => return Ok(()),
            Ok(command) => command,
            Err(e) => {
                if owned {
                    warn!("line {}: {}", line_number, e);
                    eprintln!("Invalid command. See HELP for usage");
                    summary.invalid += 1;
                }
                return Ok(());
            },
        };

        if let Command::Wait { delay, thread_id } = command {
            if owned {
                summary.executed += 1;
            }
            if self.pauses_for(thread_id) && !delay.is_zero() {
                debug!("thread {} waits {:?} on line {}", self.thread_num, delay, line_number);
                println!("Waiting...");
                target.wait(delay);
            }
            return Ok(());
        }
        if !owned {
            return Ok(());
        }
        debug!("thread {} line {}: {:?}", self.thread_num, line_number, command);
        summary.executed += 1;

        let (result, failure) = match command {
            Command::Create {
                event_id,
                rows,
                cols,
            } => (
                target.create(event_id, rows, cols),
                "Failed to create event",
            ),
            Command::Reserve { event_id, seats } => {
                (target.reserve(event_id, &seats), "Failed to reserve seats")
            },
            Command::Show { event_id } => (
                target
                    .show(event_id)
                    .and_then(|grid| write_locked(output, &grid.to_string())),
                "Failed to show event",
            ),
            Command::List => (
                target
                    .list_events()
                    .and_then(|events| write_locked(output, &EventList(events).to_string())),
                "Failed to list events",
            ),
            Command::Help => (
                io::stdout()
                    .write_all(HELP_TEXT.as_bytes())
                    .map_err(Into::into),
                "Failed to print help",
            ),
            Command::Wait { .. } | Command::Barrier | Command::Empty => (Ok(()), ""),
        };

        if let Err(e) = result {
            let lost_target = e.downcast_ref::<io::Error>().is_some()
                || matches!(e.downcast_ref::<EmsError>(), Some(EmsError::SessionClosed));
            if lost_target {
                return Err(e).with_context(|| format!("job line {} aborted the run", line_number));
            }
            warn!("line {}: {:?}", line_number, e);
            eprintln!("{}", failure);
            summary.failed += 1;
        }
        Ok(())
    }
}

/// Writes a whole rendered result at once, so results of different threads never interleave.
fn write_locked<W: Write>(output: &Mutex<W>, rendered: &str) -> Result<()> {
    let mut output = output.lock().unwrap_or_else(PoisonError::into_inner);
    output.write_all(rendered.as_bytes())?;
    Ok(())
}

impl AddAssign for JobSummary {
    fn add_assign(&mut self, other: Self) {
        self.executed += other.executed;
        self.invalid += other.invalid;
        self.failed += other.failed;
    }
}

/// Runs every command of `input` against `target`, writing SHOW and LIST results to `output`.
///
/// Invalid lines and failed operations are reported on stderr and skipped. I/O errors abort the
/// run, and so does a target that closed the session.
pub fn run_jobs<T, R, W>(target: &mut T, input: R, output: &mut W) -> Result<JobSummary>
where
    T: JobTarget + ?Sized,
    R: BufRead,
    W: Write,
{
    let runner = Runner {
        thread_num: 1,
        threads: 1,
    };
    let output = Mutex::new(output);
    let mut summary = JobSummary::default();
    for (index, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read job line {}", index + 1))?;
        runner.run_line(target, index, &line, &output, &mut summary)?;
    }
    let output = output.into_inner().unwrap_or_else(PoisonError::into_inner);
    output.flush().context("failed to flush job output")?;
    Ok(summary)
}

/// Runs `input` on one thread per target, the lines dealt out round-robin between them.
///
/// `BARRIER` splits the script into rounds: every thread finishes its share of a round before
/// any of them starts on the next one. A thread that loses its target stops the run once the
/// current round is over.
pub fn run_jobs_threaded<T, R, W>(targets: Vec<T>, input: R, output: &mut W) -> Result<JobSummary>
where
    T: JobTarget + Send,
    R: BufRead,
    W: Write + Send,
{
    let threads = targets.len();
    if threads == 0 {
        return Err(anyhow!("a job script needs at least one thread"));
    }
    let lines = input
        .lines()
        .collect::<io::Result<Vec<_>>>()
        .context("failed to read job script")?;
    let output = Mutex::new(output);
    let mut targets = targets;
    let mut summary = JobSummary::default();

    let mut first = 0;
    while first < lines.len() {
        let end = lines[first..]
            .iter()
            .position(|line| parse_line(line) == Ok(Command::Barrier))
            .map_or(lines.len(), |barrier| first + barrier + 1);
        let round = &lines[first..end];
        debug!("running lines {} to {} on {} threads", first + 1, end, threads);

        let results = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(threads);
            for (index, target) in targets.iter_mut().enumerate() {
                let runner = Runner {
                    thread_num: index + 1,
                    threads,
                };
                let output = &output;
                let handle = thread::Builder::new()
                    .name(format!("jobs_{}", runner.thread_num))
                    .spawn_scoped(scope, move || runner.run_round(target, first, round, output))
                    .with_context(|| format!("failed to spawn job thread {}", runner.thread_num))?;
                handles.push(handle);
            }
            Ok::<_, anyhow::Error>(
                handles
                    .into_iter()
                    .map(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|_| Err(anyhow!("a job thread panicked")))
                    })
                    .collect::<Vec<_>>(),
            )
        })?;
        for result in results {
            summary += result?;
        }
        first = end;
    }

    let output = output.into_inner().unwrap_or_else(PoisonError::into_inner);
    output.flush().context("failed to flush job output")?;
    Ok(summary)
}

#[cfg(test)]
#[path = "./unit/jobs_tests.rs"]
mod jobs_tests;
