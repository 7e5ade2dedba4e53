//! Generation counter for cooperative cancellation
//!
//! Every new operation advances the generation and keeps the returned
//! [`Ticket`]. Before each side effect it asks whether its ticket is still
//! current; a mismatch means a newer operation took over and the stale one
//! must abort without touching shared state.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

/// Monotonic generation counter
#[derive(Debug, Default)]
pub struct Generation {
    current: AtomicU64,
}

/// Identity of one operation, captured when it started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// Raw request id
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl Generation {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
        }
    }

    /// Start a new operation, invalidating every outstanding ticket
    pub fn advance(&self) -> Ticket {
        Ticket(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Invalidate every outstanding ticket without starting anything
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    /// Id of the most recent operation
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.current() == ticket.0
    }

    /// `Ok(())` while `ticket` is current, [`Error::Superseded`] otherwise
    ///
    /// # Errors
    ///
    /// Returns `Superseded` once a newer operation has started
    pub fn check(&self, ticket: Ticket) -> Result<()> {
        if self.is_current(ticket) {
            Ok(())
        } else {
            Err(Error::Superseded(ticket.0))
        }
    }
}
