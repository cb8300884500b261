// The caching logic is what decouples the moment a client sends `wl_surface.commit`
// from the moment the committed state becomes current.
//
// The logic of the queue is as follows:
//
// - Protocol handlers and extensions may lock the pending state of a surface. A commit
//   happening while the pending state is locked, or while older states are still waiting,
//   snapshots the pending state into a new `CachedState` appended at the tail of the queue.
//   The snapshot inherits the lock count of the pending state, which restarts at zero.
// - A lock is released with the token it was taken with, which is the sequence number of the
//   state it was taken on. Once the head of the queue has no lock left, it is applied and
//   removed, and the same is repeated with the new head. States never skip ahead of older
//   ones, whatever order their locks are released in.
//
// The commit engine driving this queue lives in `transaction.rs`.

use std::collections::{TryReserveError, VecDeque};

use crate::utils::Serial;

use super::SurfaceState;

/// A committed state waiting to become current
#[derive(Debug)]
pub(crate) struct CachedState {
    pub state: SurfaceState,
    pub lock_count: u32,
}

#[derive(Debug, Default)]
pub(crate) struct StateQueue {
    pub pending_locks: u32,
    entries: VecDeque<CachedState>,
}

impl StateQueue {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn reserve_one(&mut self) -> Result<(), TryReserveError> {
        self.entries.try_reserve(1)
    }

    /// Append a state, taking over the locks of the pending state
    pub fn push(&mut self, state: SurfaceState) {
        let lock_count = std::mem::take(&mut self.pending_locks);
        self.entries.push_back(CachedState { state, lock_count });
    }

    pub fn position(&self, seq: Serial) -> Option<usize> {
        self.entries.iter().position(|entry| entry.state.seq == seq)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CachedState> {
        self.entries.get_mut(index)
    }

    /// Remove the head of the queue if it holds no lock
    pub fn pop_ready(&mut self) -> Option<SurfaceState> {
        match self.entries.front() {
            Some(head) if head.lock_count == 0 => self.entries.pop_front().map(|entry| entry.state),
            _ => None,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &CachedState> {
        self.entries.iter()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut CachedState> {
        self.entries.iter_mut()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = CachedState> + '_ {
        self.entries.drain(..)
    }
}
