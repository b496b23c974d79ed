//! Request sequencing.
//!
//! Searches are debounced while the user types, and every issued search or
//! remote operation gets a ticket from a monotonically increasing counter. Only
//! the response carrying the latest ticket is applied; anything older is dropped
//! on arrival, whatever order the responses come back in.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
pub struct Sequencer {
    issued: u64,
}

impl Sequencer {
    pub fn issue(&mut self) -> Ticket {
        self.issued += 1;
        Ticket(self.issued)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.issued
    }

    /// Invalidate every outstanding ticket.
    pub fn invalidate(&mut self) {
        self.issued += 1;
    }
}

/// Quiet-period timer for search input. Each keystroke pushes the deadline out.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<(Instant, String)>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule(&mut self, query: String, now: Instant) {
        self.pending = Some((now + self.delay, query));
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at)
    }

    /// Take the pending query once its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((at, _)) if *at <= now => self.pending.take().map(|(_, q)| q),
            _ => None,
        }
    }
}
