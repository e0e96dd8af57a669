//! Dedup ledger: which route keys are fresh, and which are being fetched.
//!
//! Each key is in one of three states:
//!
//! ```text
//! Absent --try_begin--> Pending --promote--> Present --expire/remove/clear--> Absent
//!                          |
//!                          +--abandon/remove/clear--> Absent
//! ```
//!
//! Every `Pending`/`Present` entry carries the [`Ticket`] issued when its fetch
//! was admitted. Promotion and expiry only act on the entry holding the same
//! ticket, so a stale expiry timer or an orphaned fetch (one whose key was
//! invalidated mid-flight) can never touch a newer entry.

use std::collections::HashMap;

use tokio::sync::watch;

use crate::prefetch::key::RouteKey;

/// Identifies one admitted fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// Observable state of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    Absent,
    Pending,
    Present,
}

/// Outcome of asking to start a fetch for a key.
#[derive(Debug)]
pub enum Admission {
    /// The key is fresh; nothing to do.
    Fresh,
    /// A fetch is already running. The receiver observes `Some(success)` when
    /// it settles, or closes if the entry is invalidated first.
    InFlight(watch::Receiver<Option<bool>>),
    /// The caller owns the fetch for this key.
    Granted(Ticket),
}

#[derive(Debug)]
enum Entry {
    Pending {
        ticket: Ticket,
        settled: watch::Sender<Option<bool>>,
    },
    Present {
        ticket: Ticket,
    },
}

/// The set of fresh (and in-flight) route keys.
#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: HashMap<RouteKey, Entry>,
    next_ticket: u64,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &RouteKey) -> LedgerState {
        match self.entries.get(key) {
            None => LedgerState::Absent,
            Some(Entry::Pending { .. }) => LedgerState::Pending,
            Some(Entry::Present { .. }) => LedgerState::Present,
        }
    }

    /// Check-and-mark-pending in one step.
    pub fn try_begin(&mut self, key: &RouteKey) -> Admission {
        match self.entries.get(key) {
            Some(Entry::Present { .. }) => Admission::Fresh,
            Some(Entry::Pending { settled, .. }) => Admission::InFlight(settled.subscribe()),
            None => {
                let ticket = Ticket(self.next_ticket);
                self.next_ticket += 1;
                let (settled, _) = watch::channel(None);
                self.entries
                    .insert(key.clone(), Entry::Pending { ticket, settled });
                Admission::Granted(ticket)
            }
        }
    }

    /// Mark a pending fetch as successful.
    ///
    /// Returns `false` if the entry was invalidated (or replaced) while the
    /// fetch was running; in that case nothing is recorded.
    pub fn promote(&mut self, key: &RouteKey, ticket: Ticket) -> bool {
        match self.entries.get(key) {
            Some(Entry::Pending { ticket: current, .. }) if *current == ticket => {}
            _ => return false,
        }
        if let Some(Entry::Pending { settled, .. }) =
            self.entries.insert(key.clone(), Entry::Present { ticket })
        {
            settled.send_replace(Some(true));
        }
        true
    }

    /// Drop a pending fetch that failed or was cancelled. Leaves no trace.
    pub fn abandon(&mut self, key: &RouteKey, ticket: Ticket) -> bool {
        match self.entries.get(key) {
            Some(Entry::Pending { ticket: current, .. }) if *current == ticket => {}
            _ => return false,
        }
        if let Some(Entry::Pending { settled, .. }) = self.entries.remove(key) {
            settled.send_replace(Some(false));
        }
        true
    }

    /// Remove a present entry if it still belongs to `ticket`.
    pub fn expire(&mut self, key: &RouteKey, ticket: Ticket) -> bool {
        match self.entries.get(key) {
            Some(Entry::Present { ticket: current }) if *current == ticket => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Remove a key regardless of state. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &RouteKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry, in-flight ones included. Returns how many fresh
    /// keys were removed, matching what [`len`](Self::len) reported.
    pub fn clear(&mut self) -> usize {
        let removed = self.len();
        self.entries.clear();
        removed
    }

    /// Number of fresh keys.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, Entry::Present { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys with a fetch in flight.
    pub fn pending_len(&self) -> usize {
        self.entries.len() - self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_parts;

    fn key(id: i64) -> RouteKey {
        RouteKey::new(key_parts!["users", id]).unwrap()
    }

    fn granted(admission: Admission) -> Ticket {
        match admission {
            Admission::Granted(ticket) => ticket,
            other => panic!("expected Granted, got {other:?}"),
        }
    }

    #[test]
    fn test_lifecycle() {
        let mut ledger = DedupLedger::new();
        let k = key(1);

        let ticket = granted(ledger.try_begin(&k));
        assert_eq!(ledger.state(&k), LedgerState::Pending);
        assert!(ledger.is_empty());
        assert_eq!(ledger.pending_len(), 1);

        assert!(ledger.promote(&k, ticket));
        assert_eq!(ledger.state(&k), LedgerState::Present);
        assert!(matches!(ledger.try_begin(&k), Admission::Fresh));

        assert!(ledger.expire(&k, ticket));
        assert_eq!(ledger.state(&k), LedgerState::Absent);
        // Second expiry is a no-op.
        assert!(!ledger.expire(&k, ticket));
    }

    #[test]
    fn test_pending_key_joins() {
        let mut ledger = DedupLedger::new();
        let k = key(2);
        let ticket = granted(ledger.try_begin(&k));

        let rx = match ledger.try_begin(&k) {
            Admission::InFlight(rx) => rx,
            other => panic!("expected InFlight, got {other:?}"),
        };
        assert_eq!(*rx.borrow(), None);

        ledger.promote(&k, ticket);
        assert_eq!(*rx.borrow(), Some(true));
    }

    #[test]
    fn test_abandon_leaves_no_trace() {
        let mut ledger = DedupLedger::new();
        let k = key(3);
        let ticket = granted(ledger.try_begin(&k));
        let rx = match ledger.try_begin(&k) {
            Admission::InFlight(rx) => rx,
            other => panic!("expected InFlight, got {other:?}"),
        };

        assert!(ledger.abandon(&k, ticket));
        assert_eq!(ledger.state(&k), LedgerState::Absent);
        assert_eq!(*rx.borrow(), Some(false));
        granted(ledger.try_begin(&k));
    }

    #[test]
    fn test_invalidated_in_flight_is_not_promoted() {
        let mut ledger = DedupLedger::new();
        let k = key(4);
        let ticket = granted(ledger.try_begin(&k));

        assert!(ledger.remove(&k));
        assert!(!ledger.promote(&k, ticket));
        assert_eq!(ledger.state(&k), LedgerState::Absent);
    }

    #[test]
    fn test_stale_expiry_does_not_remove_newer_entry() {
        let mut ledger = DedupLedger::new();
        let k = key(5);

        let old = granted(ledger.try_begin(&k));
        ledger.promote(&k, old);
        ledger.remove(&k);

        let new = granted(ledger.try_begin(&k));
        ledger.promote(&k, new);
        assert_ne!(old, new);

        assert!(!ledger.expire(&k, old));
        assert_eq!(ledger.state(&k), LedgerState::Present);
        assert!(ledger.expire(&k, new));
    }

    #[test]
    fn test_clear() {
        let mut ledger = DedupLedger::new();
        for id in 0..3 {
            let ticket = granted(ledger.try_begin(&key(id)));
            ledger.promote(&key(id), ticket);
        }
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.clear(), 3);
        assert!(ledger.is_empty());
        assert!(!ledger.remove(&key(0)));
    }

    #[test]
    fn test_clear_counts_only_fresh_keys() {
        let mut ledger = DedupLedger::new();
        let fresh = granted(ledger.try_begin(&key(1)));
        ledger.promote(&key(1), fresh);
        let in_flight = granted(ledger.try_begin(&key(2)));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending_len(), 1);
        assert_eq!(ledger.clear(), 1);
        assert_eq!(ledger.pending_len(), 0);
        assert!(!ledger.promote(&key(2), in_flight));
    }
}
