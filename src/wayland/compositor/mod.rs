//! Utilities for handling surfaces and their double-buffered state
//!
//! This module provides the [`Surface`] type, which stores the state of a `wl_surface`
//! the way the protocol defines it: the client incrementally describes the next contents
//! of the surface through many small requests (attach a buffer, post damage, set a
//! transform...), which accumulate in a *pending* state. Once the client sends
//! `wl_surface.commit`, the pending state is validated and atomically promoted into
//! the *current* state, which is what the compositor should use for everything it does
//! with the surface.
//!
//! ## Deferring commits
//!
//! Protocol extensions sometimes need to hold back a commit, for example until the GPU
//! work producing a buffer has completed. For this, the pending state can be locked
//! with [`Surface::lock`]. A commit happening while the pending state is locked is cached
//! instead of being applied, and only becomes current once every lock taken on it was
//! released with [`Surface::unlock`]. Cached states always become current in commit order.
//!
//! ## Extension state
//!
//! Extensions storing their own double-buffered state alongside the surface state register
//! a [`Synced`] descriptor with [`Surface::register_synced`]. See the [`Synced`] trait for
//! details.
//!
//! ## Roles
//!
//! See the [`roles`] submodule.
//!
//! ## How to use it
//!
//! ```
//! use std::rc::Rc;
//! use stratum::utils::Size;
//! use stratum::wayland::buffer::BufferRegistry;
//! use stratum::wayland::compositor::{CommitOutcome, Surface};
//!
//! let buffers = Rc::new(BufferRegistry::new());
//! let mut surface = Surface::new(buffers.clone());
//!
//! // a client request handler would do this
//! let buffer = buffers.create((256, 128), false);
//! surface.attach(Some(buffer.token()));
//! surface.set_buffer_scale(2).unwrap();
//!
//! // a hook is notified once the state becomes current
//! surface.add_post_commit_hook(|surface| {
//!     println!("surface is now {:?}", surface.current().size());
//! });
//!
//! assert!(matches!(surface.commit(), Ok(CommitOutcome::Applied)));
//! assert_eq!(surface.current().size(), Size::from((128, 64)));
//! ```

use std::{fmt, rc::Rc};

use crate::{
    utils::{
        hook::HookList, user_data::UserDataMap, Buffer as BufferCoords, HookId, Logical, Region, Serial,
    },
    wayland::buffer::{BufferResolver, BufferToken},
};

mod cache;
mod damage;
mod handlers;
pub mod roles;
mod state;
mod synced;
mod transaction;

pub use self::handlers::RequestError;
pub use self::roles::{RoleError, RoleObject, SurfaceRole};
pub use self::state::{Committed, FrameCallback, SubsurfaceOrder, SurfaceState, ViewportState};
pub use self::synced::{Synced, SyncedError, SyncedHandle, SyncedId, SyncedState};

use self::{cache::StateQueue, synced::SyncedSlots};

crate::utils::ids::id_type!(
    /// Unique identifier of a surface
    pub SurfaceId
);

/// Object a protocol error is posted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTarget {
    /// The `wl_surface` itself
    Surface,
    /// The buffer attached to the surface
    Buffer(BufferToken),
    /// The viewport of the surface
    Viewport,
    /// The explicit synchronization object of the surface
    SyncobjSurface,
    /// The role object of the surface, by role name
    Role(&'static str),
}

/// A commit refused because of a client error
///
/// The compositor is expected to post the error on the target object, which usually
/// disconnects the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({target:?}, code {code})")]
pub struct Rejection {
    /// Object the error applies to
    pub target: ErrorTarget,
    /// Protocol error code
    pub code: u32,
    /// Human-readable description
    pub message: String,
}

/// Errors of [`Surface::commit`]
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// The pending state was refused, it stays pending as is
    #[error("commit rejected: {0}")]
    Rejected(#[from] Rejection),
    /// The state could not be cached, the pending state was left untouched
    #[error("out of memory while caching surface state")]
    OutOfMemory,
}

/// Result of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The state became current
    Applied,
    /// The state was cached, it is identified by the token of the lock(s) holding it
    Cached(LockToken),
}

/// Token identifying a lock taken on a surface state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(pub(crate) Serial);

impl LockToken {
    /// Sequence number of the locked state
    pub fn seq(&self) -> Serial {
        self.0
    }
}

type PreCommitHook = dyn Fn(&mut Surface);
type SurfaceHook = dyn Fn(&CommittedSurface<'_>);

#[derive(Debug, Default)]
pub(crate) struct SurfaceHooks {
    pub pre_commit: HookList<PreCommitHook>,
    pub post_commit: HookList<SurfaceHook>,
    pub map: HookList<SurfaceHook>,
    pub unmap: HookList<SurfaceHook>,
    pub destruction: HookList<SurfaceHook>,
}

/// The state of a `wl_surface`
pub struct Surface {
    id: SurfaceId,
    resolver: Rc<dyn BufferResolver>,

    pub(crate) pending: SurfaceState,
    pub(crate) current: SurfaceState,
    pub(crate) cache: StateQueue,
    pub(crate) synced: SyncedSlots,

    pub(crate) role: Option<&'static dyn SurfaceRole>,
    pub(crate) role_object: Option<Box<dyn RoleObject>>,
    pub(crate) mapped: bool,

    pub(crate) handling_commit: bool,
    pub(crate) rejection: Option<Rejection>,

    pub(crate) opaque_region: Region<Logical>,
    pub(crate) input_region: Region<Logical>,
    pub(crate) buffer_damage: Region<BufferCoords>,

    pub(crate) hooks: SurfaceHooks,
    data_map: UserDataMap,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("pending", &self.pending)
            .field("current", &self.current)
            .field("cache", &self.cache)
            .field("synced", &self.synced.len())
            .field("role", &self.role)
            .field("role_object", &self.role_object.is_some())
            .field("mapped", &self.mapped)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Surface {
    /// Create a new surface, resolving attached buffers through `resolver`
    pub fn new(resolver: Rc<dyn BufferResolver>) -> Surface {
        let id = SurfaceId::new();
        let mut pending = SurfaceState::empty();
        pending.seq = Serial(1);
        tracing::trace!(surface = ?id, "New surface");
        Surface {
            id,
            resolver,
            pending,
            current: SurfaceState::empty(),
            cache: StateQueue::default(),
            synced: SyncedSlots::default(),
            role: None,
            role_object: None,
            mapped: false,
            handling_commit: false,
            rejection: None,
            opaque_region: Region::new(),
            input_region: Region::new(),
            buffer_damage: Region::new(),
            hooks: SurfaceHooks::default(),
            data_map: UserDataMap::new(),
        }
    }

    /// Id of this surface
    pub fn id(&self) -> &SurfaceId {
        &self.id
    }

    /// The pending state, as built by client requests
    pub fn pending(&self) -> &SurfaceState {
        &self.pending
    }

    /// The current state
    pub fn current(&self) -> &SurfaceState {
        &self.current
    }

    /// Whether the current state holds a buffer
    pub fn has_buffer(&self) -> bool {
        self.current.buffer.is_some()
    }

    /// Number of committed states waiting to become current
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Opaque region of the current state, clipped to the surface
    pub fn opaque_region(&self) -> &Region<Logical> {
        &self.opaque_region
    }

    /// Input region of the current state, clipped to the surface
    pub fn input_region(&self) -> &Region<Logical> {
        &self.input_region
    }

    /// Damage of the last applied state, in buffer coordinates
    pub fn buffer_damage(&self) -> &Region<BufferCoords> {
        &self.buffer_damage
    }

    /// Typed data attached to this surface by protocol modules
    pub fn data_map(&self) -> &UserDataMap {
        &self.data_map
    }

    /// Mutable access to the typed data attached to this surface
    pub fn data_map_mut(&mut self) -> &mut UserDataMap {
        &mut self.data_map
    }

    pub(crate) fn resolver(&self) -> &dyn BufferResolver {
        &*self.resolver
    }

    /// Register a hook invoked on commit, before the pending state is applied or cached
    ///
    /// The hook may inspect and modify the pending state, lock it, or [`reject`](Surface::reject)
    /// the commit. Hooks are not invoked when the commit was already rejected.
    pub fn add_pre_commit_hook<F: Fn(&mut Surface) + 'static>(&mut self, hook: F) -> HookId {
        self.hooks.pre_commit.add(Rc::new(hook))
    }

    /// Register a hook invoked each time a state became current
    pub fn add_post_commit_hook<F: Fn(&CommittedSurface<'_>) + 'static>(&mut self, hook: F) -> HookId {
        self.hooks.post_commit.add(Rc::new(hook))
    }

    /// Register a hook invoked when the surface gets mapped
    pub fn add_map_hook<F: Fn(&CommittedSurface<'_>) + 'static>(&mut self, hook: F) -> HookId {
        self.hooks.map.add(Rc::new(hook))
    }

    /// Register a hook invoked when the surface gets unmapped
    pub fn add_unmap_hook<F: Fn(&CommittedSurface<'_>) + 'static>(&mut self, hook: F) -> HookId {
        self.hooks.unmap.add(Rc::new(hook))
    }

    /// Register a hook invoked when the surface is destroyed
    pub fn add_destruction_hook<F: Fn(&CommittedSurface<'_>) + 'static>(&mut self, hook: F) -> HookId {
        self.hooks.destruction.add(Rc::new(hook))
    }

    /// Unregister a hook of any kind
    pub fn remove_hook(&mut self, id: &HookId) -> bool {
        let hooks = &mut self.hooks;
        hooks.pre_commit.remove(id)
            || hooks.post_commit.remove(id)
            || hooks.map.remove(id)
            || hooks.unmap.remove(id)
            || hooks.destruction.remove(id)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        let locked = self
            .cache
            .entries()
            .filter(|entry| entry.lock_count > 0)
            .count();
        if locked > 0 {
            tracing::warn!(
                surface = ?self.id,
                locked,
                "Destroying surface with locked cached states, dropping them"
            );
        }
        let cached: Vec<_> = self.cache.drain().collect();
        for mut entry in cached {
            self.finish_synced(&mut entry.state);
        }

        self.destroy_role_object();
        self.unmap();

        let view = CommittedSurface::new(self);
        for hook in self.hooks.destruction.snapshot() {
            hook(&view);
        }

        let mut pending = std::mem::replace(&mut self.pending, SurfaceState::empty());
        let mut current = std::mem::replace(&mut self.current, SurfaceState::empty());
        self.finish_synced(&mut pending);
        self.finish_synced(&mut current);
        tracing::trace!(surface = ?self.id, "Surface destroyed");
    }
}

/// Read-only view of a surface given to observers
///
/// Only the committed side of the surface is reachable: the current state and what is
/// derived from it.
#[derive(Debug, Clone, Copy)]
pub struct CommittedSurface<'a> {
    surface: &'a Surface,
}

impl<'a> CommittedSurface<'a> {
    pub(crate) fn new(surface: &'a Surface) -> Self {
        CommittedSurface { surface }
    }

    /// Id of the surface
    pub fn id(&self) -> &'a SurfaceId {
        &self.surface.id
    }

    /// The current state
    pub fn current(&self) -> &'a SurfaceState {
        &self.surface.current
    }

    /// Sub-state of an extension in the current state
    pub fn synced<S: Synced>(&self, handle: &SyncedHandle<S>) -> &'a S::State {
        self.surface.synced_current(handle)
    }

    /// Role of the surface
    pub fn role(&self) -> Option<&'static dyn SurfaceRole> {
        self.surface.role
    }

    /// The role object, if it is of type `T`
    pub fn role_object<T: 'static>(&self) -> Option<&'a T> {
        self.surface.role_object()
    }

    /// Whether the surface is mapped
    pub fn is_mapped(&self) -> bool {
        self.surface.mapped
    }

    /// Whether the current state holds a buffer
    pub fn has_buffer(&self) -> bool {
        self.surface.has_buffer()
    }

    /// Opaque region, clipped to the surface
    pub fn opaque_region(&self) -> &'a Region<Logical> {
        &self.surface.opaque_region
    }

    /// Input region, clipped to the surface
    pub fn input_region(&self) -> &'a Region<Logical> {
        &self.surface.input_region
    }

    /// Damage of the last applied state, in buffer coordinates
    pub fn buffer_damage(&self) -> &'a Region<BufferCoords> {
        &self.surface.buffer_damage
    }

    /// Typed data attached to the surface
    pub fn data_map(&self) -> &'a UserDataMap {
        &self.surface.data_map
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::utils::Size;
    use crate::wayland::buffer::{BufferRegistry, BufferResource};

    pub(crate) struct Fixture {
        pub buffers: Rc<BufferRegistry>,
    }

    impl Fixture {
        pub fn new() -> Self {
            // RUST_LOG=stratum=trace to follow the commit machinery of a failing test
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
            Fixture {
                buffers: Rc::new(BufferRegistry::new()),
            }
        }
    }

    pub(crate) fn surface(fixture: &Fixture) -> Surface {
        Surface::new(fixture.buffers.clone())
    }

    /// Create a buffer and attach it to the pending state
    pub(crate) fn attach_new(
        fixture: &Fixture,
        surface: &mut Surface,
        size: impl Into<Size<i32, BufferCoords>>,
    ) -> BufferResource {
        let buffer = fixture.buffers.create(size, false);
        surface.attach(Some(buffer.token()));
        buffer
    }

    #[test]
    fn destruction_releases_everything() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let destroyed = Rc::new(RefCell::new(None));
        let seen = destroyed.clone();
        surface.add_destruction_hook(move |s| *seen.borrow_mut() = Some(s.id().clone()));

        let current = attach_new(&fixture, &mut surface, (8, 8));
        surface.commit().unwrap();
        let _token = surface.lock();
        let cached = attach_new(&fixture, &mut surface, (8, 8));
        surface.commit().unwrap();
        let id = surface.id().clone();

        drop(surface);
        assert_eq!(*destroyed.borrow(), Some(id));
        assert_eq!(current.release_count(), 1);
        assert_eq!(cached.release_count(), 1);
    }

    #[test]
    fn removed_hooks_are_not_called() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let hook = surface.add_post_commit_hook(move |_| *counter.borrow_mut() += 1);

        surface.commit().unwrap();
        assert!(surface.remove_hook(&hook));
        assert!(!surface.remove_hook(&hook));
        surface.commit().unwrap();
        assert_eq!(*calls.borrow(), 1);
    }
}
