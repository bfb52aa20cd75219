//! Request generations for superseding in-progress computations.
//!
//! Every new heatmap request takes a fresh [`GenerationTicket`]. Long
//! running work checks [`GenerationTicket::is_current`] at its yield points
//! and stops once a newer ticket has been issued, and results are only
//! installed when their ticket is still current.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared monotonically increasing request counter.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

impl Generation {
    /// Creates a counter starting at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a ticket for a new request, superseding all earlier tickets.
    #[must_use]
    pub fn next_ticket(&self) -> GenerationTicket {
        let id = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationTicket {
            id,
            current: Arc::clone(&self.current),
        }
    }

    /// Supersedes every outstanding ticket without starting new work.
    pub fn cancel_all(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    /// The newest generation issued so far.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Proof that a request was started in a particular generation.
#[derive(Debug, Clone)]
pub struct GenerationTicket {
    id: u64,
    current: Arc<AtomicU64>,
}

impl GenerationTicket {
    /// A ticket that is never superseded, for one-shot computations.
    #[must_use]
    pub fn standalone() -> Self {
        Generation::new().next_ticket()
    }

    /// The generation this ticket was issued for.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// The newest generation of the issuing counter.
    #[must_use]
    pub fn latest(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Whether no newer ticket has been issued.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.latest() == self.id
    }
}
