// Synced extension state
//
// Protocol extensions frequently need their own double-buffered state, that should be
// committed, cached and applied together with the core surface state. Instead of keeping
// a parallel queue, an extension registers a `Synced` descriptor on the surface. From then on,
// every state of the surface (pending, current and each cached entry) carries one sub-state
// for this extension, stored in a slot whose index is the registration order.
//
// Slots are keyed by a `SyncedId` inside an `IndexMap`, so the slot index of an extension
// shifts down when an extension registered before it is removed, while its handle stays valid.

use std::{marker::PhantomData, rc::Rc};

use downcast_rs::{impl_downcast, Downcast};
use indexmap::IndexMap;
use tracing::trace;

use super::{CommittedSurface, Surface, SurfaceState};

crate::utils::ids::id_type!(
    /// Identifier of one registration of a synced extension on a surface
    pub SyncedId
);

/// Descriptor of an extension whose state is synchronized with surface commits
///
/// Only [`Synced::commit`] is required: by default a sub-state starts as
/// [`Default::default()`], needs no cleanup, and is copied on commit.
pub trait Synced: 'static {
    /// Per-state data of this extension
    type State: Clone + Default + 'static;

    /// Create the sub-state of a new surface state
    fn init_state(&self) -> Self::State {
        Self::State::default()
    }

    /// Release whatever a sub-state holds before it is dropped
    fn finish_state(&self, _state: &mut Self::State) {}

    /// Move a committed sub-state from `src` into `dst`
    fn move_state(&self, dst: &mut Self::State, src: &mut Self::State) {
        dst.clone_from(src);
    }

    /// Called once a state carrying this sub-state became current
    fn commit(&self, surface: &CommittedSurface<'_>, state: &Self::State);
}

/// Type-erased sub-state storage
pub trait SyncedState: Downcast {}
impl_downcast!(SyncedState);
impl<T: 'static> SyncedState for T {}

pub(crate) trait ErasedSynced {
    fn init(&self) -> Box<dyn SyncedState>;
    fn finish(&self, state: &mut dyn SyncedState);
    fn move_state(&self, dst: &mut dyn SyncedState, src: &mut dyn SyncedState);
    fn commit(&self, surface: &CommittedSurface<'_>, state: &dyn SyncedState);
    fn instance(&self) -> *const ();
}

struct SyncedSlot<S: Synced>(Rc<S>);

impl<S: Synced> ErasedSynced for SyncedSlot<S> {
    fn init(&self) -> Box<dyn SyncedState> {
        Box::new(self.0.init_state())
    }

    fn finish(&self, state: &mut dyn SyncedState) {
        self.0.finish_state(state.downcast_mut::<S::State>().unwrap())
    }

    fn move_state(&self, dst: &mut dyn SyncedState, src: &mut dyn SyncedState) {
        self.0.move_state(
            dst.downcast_mut::<S::State>().unwrap(),
            src.downcast_mut::<S::State>().unwrap(),
        )
    }

    fn commit(&self, surface: &CommittedSurface<'_>, state: &dyn SyncedState) {
        self.0.commit(surface, state.downcast_ref::<S::State>().unwrap())
    }

    fn instance(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

pub(crate) type SyncedSlots = IndexMap<SyncedId, Rc<dyn ErasedSynced>>;

/// Handle to the registration of a synced extension on a surface
///
/// The handle addresses the sub-state of the extension in every state of the surface.
/// Using it on another surface, or after the extension was unregistered, panics.
pub struct SyncedHandle<S: Synced> {
    id: SyncedId,
    _synced: PhantomData<fn() -> S>,
}

impl<S: Synced> std::fmt::Debug for SyncedHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SyncedHandle").field(&self.id).finish()
    }
}

impl<S: Synced> Clone for SyncedHandle<S> {
    fn clone(&self) -> Self {
        SyncedHandle {
            id: self.id.clone(),
            _synced: PhantomData,
        }
    }
}

impl<S: Synced> SyncedHandle<S> {
    /// Id of this registration
    pub fn id(&self) -> &SyncedId {
        &self.id
    }

    pub(crate) fn index(&self, slots: &SyncedSlots) -> usize {
        slots
            .get_index_of(&self.id)
            .unwrap_or_else(|| panic!("{:?} is not registered on this surface", self.id))
    }

    pub(crate) fn get<'a>(&self, slots: &SyncedSlots, state: &'a SurfaceState) -> &'a S::State {
        state.synced[self.index(slots)]
            .downcast_ref::<S::State>()
            .unwrap()
    }

    pub(crate) fn get_mut<'a>(&self, slots: &SyncedSlots, state: &'a mut SurfaceState) -> &'a mut S::State {
        state.synced[self.index(slots)]
            .downcast_mut::<S::State>()
            .unwrap()
    }
}

/// Errors of synced extension registration
#[derive(Debug, thiserror::Error)]
pub enum SyncedError {
    /// Sub-state storage could not be allocated, nothing was registered
    #[error("out of memory while registering a synced extension")]
    OutOfMemory,
}

impl From<std::collections::TryReserveError> for SyncedError {
    fn from(_: std::collections::TryReserveError) -> Self {
        SyncedError::OutOfMemory
    }
}

impl Surface {
    /// Register a synced extension on this surface
    ///
    /// Every existing state of the surface receives a sub-state created by [`Synced::init_state`].
    ///
    /// # Panics
    ///
    /// If the same descriptor instance is already registered on this surface.
    pub fn register_synced<S: Synced>(&mut self, synced: Rc<S>) -> Result<SyncedHandle<S>, SyncedError> {
        let slot: Rc<dyn ErasedSynced> = Rc::new(SyncedSlot(synced));
        if self.synced.values().any(|s| s.instance() == slot.instance()) {
            panic!("synced extension registered twice on {:?}", self.id);
        }

        self.pending.synced.try_reserve(1)?;
        self.current.synced.try_reserve(1)?;
        for entry in self.cache.entries_mut() {
            entry.state.synced.try_reserve(1)?;
        }

        self.pending.synced.push(slot.init());
        self.current.synced.push(slot.init());
        for entry in self.cache.entries_mut() {
            entry.state.synced.push(slot.init());
        }

        let id = SyncedId::new();
        trace!(surface = ?self.id, synced = ?id, index = self.synced.len(), "Registering synced extension");
        self.synced.insert(id.clone(), slot);
        Ok(SyncedHandle {
            id,
            _synced: PhantomData,
        })
    }

    /// Remove a synced extension from this surface
    ///
    /// Its sub-state is finished in the pending state, the current state and every cached state,
    /// and the slots of the extensions registered after it shift down by one.
    pub fn unregister_synced<S: Synced>(&mut self, handle: SyncedHandle<S>) {
        let index = handle.index(&self.synced);
        let Some((_, slot)) = self.synced.shift_remove_index(index) else {
            unreachable!()
        };
        trace!(surface = ?self.id, synced = ?handle.id, index, "Unregistering synced extension");

        let mut states = vec![&mut self.pending, &mut self.current];
        states.extend(self.cache.entries_mut().map(|entry| &mut entry.state));
        for state in states {
            let mut data = state.synced.remove(index);
            slot.finish(&mut *data);
        }
    }

    /// Sub-state of an extension in the pending state
    pub fn synced_pending<S: Synced>(&self, handle: &SyncedHandle<S>) -> &S::State {
        handle.get(&self.synced, &self.pending)
    }

    /// Mutable sub-state of an extension in the pending state
    pub fn synced_pending_mut<S: Synced>(&mut self, handle: &SyncedHandle<S>) -> &mut S::State {
        handle.get_mut(&self.synced, &mut self.pending)
    }

    /// Sub-state of an extension in the current state
    pub fn synced_current<S: Synced>(&self, handle: &SyncedHandle<S>) -> &S::State {
        handle.get(&self.synced, &self.current)
    }

    /// Number of synced extensions registered on this surface
    pub fn synced_count(&self) -> usize {
        self.synced.len()
    }

    pub(crate) fn finish_synced(&self, state: &mut SurfaceState) {
        for (slot, data) in self.synced.values().zip(state.synced.iter_mut()) {
            slot.finish(&mut **data);
        }
        state.synced.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::wayland::compositor::tests::{surface, Fixture};

    #[derive(Default)]
    struct Counter {
        finished: RefCell<Vec<u32>>,
        commits: RefCell<Vec<u32>>,
    }

    impl Synced for Counter {
        type State = u32;

        fn finish_state(&self, state: &mut u32) {
            self.finished.borrow_mut().push(*state);
        }

        fn commit(&self, _surface: &CommittedSurface<'_>, state: &u32) {
            self.commits.borrow_mut().push(*state);
        }
    }

    struct Tagged(u32);

    impl Synced for Tagged {
        type State = Vec<u32>;

        fn init_state(&self) -> Vec<u32> {
            vec![self.0]
        }

        fn move_state(&self, dst: &mut Vec<u32>, src: &mut Vec<u32>) {
            dst.append(src);
        }

        fn commit(&self, _surface: &CommittedSurface<'_>, _state: &Vec<u32>) {}
    }

    #[test]
    fn sub_state_follows_commit() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let counter = Rc::new(Counter::default());
        let handle = surface.register_synced(counter.clone()).unwrap();

        *surface.synced_pending_mut(&handle) = 7;
        surface.commit().unwrap();
        assert_eq!(*surface.synced_current(&handle), 7);
        assert_eq!(*counter.commits.borrow(), vec![7]);
    }

    #[test]
    fn custom_move_and_init() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let handle = surface.register_synced(Rc::new(Tagged(1))).unwrap();

        surface.synced_pending_mut(&handle).push(2);
        surface.commit().unwrap();
        assert_eq!(*surface.synced_current(&handle), vec![1, 1, 2]);
        assert!(surface.synced_pending(&handle).is_empty());
    }

    #[test]
    fn unregister_shifts_slots() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let first = Rc::new(Counter::default());
        let second = Rc::new(Counter::default());
        let first_handle = surface.register_synced(first.clone()).unwrap();
        let second_handle = surface.register_synced(second.clone()).unwrap();
        assert_eq!(second_handle.index(&surface.synced), 1);

        let mut tokens = Vec::new();
        for value in [5, 6, 7] {
            *surface.synced_pending_mut(&second_handle) = value;
            tokens.push(surface.lock());
            surface.commit().unwrap();
        }
        *surface.synced_pending_mut(&second_handle) = 8;
        assert_eq!(surface.cached_len(), 3);

        surface.unregister_synced(first_handle);
        assert_eq!(surface.synced_count(), 1);
        assert_eq!(second_handle.index(&surface.synced), 0);
        // pending, current and the three cached states
        assert_eq!(first.finished.borrow().len(), 5);
        assert_eq!(*surface.synced_pending(&second_handle), 8);

        let last = tokens.pop().unwrap();
        surface.unlock(last);
        assert!(second.commits.borrow().is_empty());
        let middle = tokens.pop().unwrap();
        let oldest = tokens.pop().unwrap();
        surface.unlock(oldest);
        assert_eq!(*surface.synced_current(&second_handle), 5);
        surface.unlock(middle);
        assert_eq!(surface.cached_len(), 0);
        assert_eq!(*surface.synced_current(&second_handle), 7);
        assert_eq!(*second.commits.borrow(), vec![5, 6, 7]);
        assert!(first.commits.borrow().is_empty());
        // each applied cached state is finished once moved into current
        assert_eq!(*second.finished.borrow(), vec![5, 6, 7]);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn double_registration_panics() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let counter = Rc::new(Counter::default());
        let _handle = surface.register_synced(counter.clone()).unwrap();
        let _ = surface.register_synced(counter);
    }

    #[test]
    fn registration_reaches_cached_states() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let token = surface.lock();
        surface.commit().unwrap();

        let counter = Rc::new(Counter::default());
        let handle = surface.register_synced(counter.clone()).unwrap();
        surface.unlock(token);
        assert_eq!(*surface.synced_current(&handle), 0);
        assert_eq!(*counter.commits.borrow(), vec![0]);
    }
}
