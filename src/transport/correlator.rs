//! Request/response correlation.
//!
//! Owns the table of outstanding actions. Each entry holds a single-use
//! completion slot that the inbound handler resolves directly.
//!
//! Every path out of the table resolves the slot at most once:
//!
//! | Path | Caller observes |
//! |------|-----------------|
//! | [`Correlator::resolve`] | the matching [`ActionResponse`] |
//! | [`Correlator::fail`] | the given error (send failure) |
//! | [`Correlator::fail_all`] | [`Error::ConnectionLost`] |
//! | [`Correlator::remove`] | nothing; the caller already gave up (timeout) |
//!
//! Once [`Correlator::fail_all`] has run the table is sealed: later
//! registrations are refused with [`Error::ConnectionLost`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::ActionId;
use crate::protocol::ActionResponse;

// ============================================================================
// Types
// ============================================================================

/// Completion slot for one outstanding action.
pub type ResponseSlot = oneshot::Receiver<Result<ActionResponse>>;

/// One outstanding action.
struct PendingRequest {
    /// When the action was registered.
    created_at: Instant,
    /// Single-resolution completion slot.
    tx: oneshot::Sender<Result<ActionResponse>>,
}

/// Map of action IDs to pending requests.
type CorrelationMap = FxHashMap<ActionId, PendingRequest>;

/// Pending map plus the sealed flag, guarded together.
#[derive(Default)]
struct Table {
    pending: CorrelationMap,
    /// Set by `fail_all`; no entry may be added afterwards.
    closed: bool,
}

// ============================================================================
// Correlator
// ============================================================================

/// Table of outstanding actions keyed by correlation id.
///
/// All access goes through one short critical section, so many tasks can
/// have actions outstanding at once.
#[derive(Default)]
pub struct Correlator {
    table: Mutex<Table>,
}

impl Correlator {
    /// Creates an empty correlator.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new outstanding action under a fresh id.
    ///
    /// The id is guaranteed not to collide with any id still pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionLost`] once [`fail_all`](Self::fail_all)
    /// has run.
    pub fn register(&self) -> Result<(ActionId, ResponseSlot)> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(Error::ConnectionLost);
        }

        let (tx, rx) = oneshot::channel();
        let pending = &mut table.pending;

        let id = loop {
            let candidate = ActionId::generate();
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };

        pending.insert(
            id,
            PendingRequest {
                created_at: Instant::now(),
                tx,
            },
        );

        trace!(action_id = %id, pending = pending.len(), "Action registered");
        Ok((id, rx))
    }

    /// Resolves an outstanding action with its response.
    ///
    /// Returns `false` if the id is unknown or already resolved.
    pub fn resolve(&self, id: &ActionId, response: ActionResponse) -> bool {
        let Some(request) = self.table.lock().pending.remove(id) else {
            return false;
        };

        trace!(
            action_id = %id,
            elapsed_ms = request.created_at.elapsed().as_millis() as u64,
            "Action resolved"
        );
        let _ = request.tx.send(Ok(response));
        true
    }

    /// Resolves an outstanding action with an error.
    pub fn fail(&self, id: &ActionId, error: Error) -> bool {
        let Some(request) = self.table.lock().pending.remove(id) else {
            return false;
        };

        let _ = request.tx.send(Err(error));
        true
    }

    /// Drops an entry without resolving it.
    pub fn remove(&self, id: &ActionId) -> bool {
        self.table.lock().pending.remove(id).is_some()
    }

    /// Fails every outstanding action with [`Error::ConnectionLost`] and
    /// seals the table.
    ///
    /// Returns the number of actions failed.
    pub fn fail_all(&self) -> usize {
        let pending: Vec<_> = {
            let mut table = self.table.lock();
            table.closed = true;
            table.pending.drain().collect()
        };
        let count = pending.len();

        for (_, request) in pending {
            let _ = request.tx.send(Err(Error::ConnectionLost));
        }

        if count > 0 {
            debug!(count, "Failed pending actions on close");
        }
        count
    }

    /// Returns `true` if `id` is still outstanding.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ActionId) -> bool {
        self.table.lock().pending.contains_key(id)
    }

    /// Returns the number of outstanding actions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().pending.len()
    }

    /// Returns `true` if nothing is outstanding.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().pending.is_empty()
    }
}

// ============================================================================
// PendingGuard
// ============================================================================

/// Removes a table entry when the waiting caller goes away.
///
/// Covers timeouts and dropped futures alike; removal after resolution is a
/// no-op.
pub(crate) struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: ActionId,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(correlator: &'a Correlator, id: ActionId) -> Self {
        Self { correlator, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.remove(&self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================
