//! Explicit synchronization of surface buffers
//!
//! This module implements the logic of the `linux-drm-syncobj-v1` protocol. A client using it
//! attaches, alongside each buffer, an *acquire point* the compositor must wait for before
//! reading the buffer, and a *release point* the compositor signals once it is done with it.
//!
//! Both points are double-buffered state of the surface, carried by a [`Synced`] extension.
//! A commit whose acquire point is not signaled yet locks the pending state, so it is cached
//! until [`ExplicitSyncManager::signal`] reports the point as reached and the compositor
//! unlocks the surface. The release point of a state is signaled once a newer state with
//! sync points replaces it, or the surface is destroyed.
//!
//! ```
//! use std::rc::Rc;
//! use stratum::wayland::buffer::BufferRegistry;
//! use stratum::wayland::compositor::{CommitOutcome, Surface};
//! use stratum::wayland::explicit_sync::{ExplicitSyncManager, SyncTimeline};
//!
//! let buffers = Rc::new(BufferRegistry::new());
//! let mut surface = Surface::new(buffers.clone());
//! let manager = ExplicitSyncManager::new();
//! let syncobj = manager.get_surface(&mut surface).unwrap();
//!
//! let timeline = SyncTimeline::new();
//! let buffer = buffers.create((64, 64), false);
//! surface.attach(Some(buffer.token()));
//! syncobj.set_acquire_point(&mut surface, timeline.point(1)).unwrap();
//! syncobj.set_release_point(&mut surface, timeline.point(2)).unwrap();
//!
//! let Ok(CommitOutcome::Cached(_)) = surface.commit() else { unreachable!() };
//!
//! // later, once the GPU is done
//! for (_surface, token) in manager.signal(&timeline, 1) {
//!     surface.unlock(token);
//! }
//! assert!(surface.has_buffer());
//! ```

use std::{cell::RefCell, rc::Rc};

use tracing::trace;

use crate::utils::HookId;

use super::compositor::{
    Committed, CommittedSurface, ErrorTarget, LockToken, Surface, SurfaceId, Synced, SyncedHandle,
};

mod sync_point;
pub use sync_point::*;

// wp_linux_drm_syncobj_surface_v1.error
const NO_BUFFER: u32 = 3;
const NO_ACQUIRE_POINT: u32 = 4;
const NO_RELEASE_POINT: u32 = 5;
const CONFLICTING_POINTS: u32 = 6;

/// Errors of the explicit synchronization requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExplicitSyncError {
    /// The surface already has a synchronization object
    #[error("the surface already has a syncobj_surface object associated")]
    SurfaceExists,
    /// The synchronization object is used on another surface than its own
    #[error("the associated wl_surface was destroyed")]
    NoSurface,
    /// The sync point storage of the surface could not be allocated
    #[error("out of memory while creating a syncobj surface")]
    OutOfMemory,
}

impl ExplicitSyncError {
    /// Protocol error code, `SurfaceExists` belonging to the manager and `NoSurface` to the surface object
    ///
    /// `None` for errors that are not caused by the client.
    pub fn code(&self) -> Option<u32> {
        match self {
            ExplicitSyncError::SurfaceExists => Some(0),
            ExplicitSyncError::NoSurface => Some(1),
            ExplicitSyncError::OutOfMemory => None,
        }
    }
}

/// Sync points of a surface state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplicitSyncState {
    /// Timeline point signaled when buffer is ready to read
    pub acquire_point: Option<SyncPoint>,
    /// Timeline point to be signaled when server is done with buffer
    pub release_point: Option<SyncPoint>,
}

/// Synced extension carrying the [`ExplicitSyncState`] of surfaces
#[derive(Debug, Default)]
pub struct ExplicitSync;

impl Synced for ExplicitSync {
    type State = ExplicitSyncState;

    fn finish_state(&self, state: &mut ExplicitSyncState) {
        state.acquire_point = None;
        if let Some(release_point) = state.release_point.take() {
            release_point.signal();
        }
    }

    fn move_state(&self, dst: &mut ExplicitSyncState, src: &mut ExplicitSyncState) {
        let acquire_point = src.acquire_point.take();
        let release_point = src.release_point.take();
        if acquire_point.is_some() && release_point.is_some() {
            if let Some(superseded) = dst.release_point.take() {
                superseded.signal();
            }
            dst.acquire_point = acquire_point;
            dst.release_point = release_point;
        }
    }

    fn commit(&self, surface: &CommittedSurface<'_>, state: &ExplicitSyncState) {
        if let Some(acquire_point) = &state.acquire_point {
            trace!(surface = ?surface.id(), point = acquire_point.value(), "Acquire point became current");
        }
    }
}

#[derive(Debug)]
struct Waiter {
    point: SyncPoint,
    surface: SurfaceId,
    token: LockToken,
}

type Waiters = Rc<RefCell<Vec<Waiter>>>;

/// Data stored on surfaces that ever had a synchronization object
struct SyncobjMarker {
    handle: SyncedHandle<ExplicitSync>,
    commit_hook: Option<HookId>,
}

/// State of the explicit synchronization global
#[derive(Debug, Default)]
pub struct ExplicitSyncManager {
    synced: Rc<ExplicitSync>,
    waiters: Waiters,
}

impl ExplicitSyncManager {
    /// Create a new manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the synchronization object of a surface
    pub fn get_surface(&self, surface: &mut Surface) -> Result<SyncobjSurface, ExplicitSyncError> {
        if let Some(marker) = surface.data_map().get::<SyncobjMarker>() {
            if marker.commit_hook.is_some() {
                return Err(ExplicitSyncError::SurfaceExists);
            }
        } else {
            let handle = surface
                .register_synced(self.synced.clone())
                .map_err(|_| ExplicitSyncError::OutOfMemory)?;
            let waiters = self.waiters.clone();
            surface.add_destruction_hook(move |surface| {
                waiters.borrow_mut().retain(|waiter| &waiter.surface != surface.id());
            });
            surface.data_map_mut().insert_if_missing(|| SyncobjMarker {
                handle,
                commit_hook: None,
            });
        }

        let Some(handle) = surface.data_map().get::<SyncobjMarker>().map(|m| m.handle.clone()) else {
            unreachable!()
        };
        let waiters = self.waiters.clone();
        let hook_handle = handle.clone();
        let hook = surface.add_pre_commit_hook(move |surface| commit_hook(surface, &hook_handle, &waiters));
        if let Some(marker) = surface.data_map_mut().get_mut::<SyncobjMarker>() {
            marker.commit_hook = Some(hook);
        }
        trace!(surface = ?surface.id(), "Syncobj surface created");

        Ok(SyncobjSurface {
            surface: surface.id().clone(),
            handle,
        })
    }

    /// Signal `timeline` up to `point`
    ///
    /// Returns the locks of the commits that were waiting on an acquire point now reached.
    /// Each of them should be passed to [`Surface::unlock`] on the surface it names.
    pub fn signal(&self, timeline: &SyncTimeline, point: u64) -> Vec<(SurfaceId, LockToken)> {
        timeline.signal(point);
        let mut ready = Vec::new();
        self.waiters.borrow_mut().retain(|waiter| {
            if waiter.point.is_signaled() {
                ready.push((waiter.surface.clone(), waiter.token));
                false
            } else {
                true
            }
        });
        ready
    }

    /// Number of commits waiting for their acquire point
    pub fn waiting(&self) -> usize {
        self.waiters.borrow().len()
    }
}

/// The sync points of the current state of a surface, if it ever had a synchronization object
pub fn current_sync_state(surface: &Surface) -> Option<&ExplicitSyncState> {
    let marker = surface.data_map().get::<SyncobjMarker>()?;
    Some(surface.synced_current(&marker.handle))
}

/// A `wp_linux_drm_syncobj_surface_v1` object
#[derive(Debug)]
pub struct SyncobjSurface {
    surface: SurfaceId,
    handle: SyncedHandle<ExplicitSync>,
}

impl SyncobjSurface {
    fn pending<'a>(&self, surface: &'a mut Surface) -> Result<&'a mut ExplicitSyncState, ExplicitSyncError> {
        if surface.id() != &self.surface {
            return Err(ExplicitSyncError::NoSurface);
        }
        Ok(surface.synced_pending_mut(&self.handle))
    }

    /// Set the acquire point of the pending state
    pub fn set_acquire_point(&self, surface: &mut Surface, point: SyncPoint) -> Result<(), ExplicitSyncError> {
        self.pending(surface)?.acquire_point = Some(point);
        Ok(())
    }

    /// Set the release point of the pending state
    pub fn set_release_point(&self, surface: &mut Surface, point: SyncPoint) -> Result<(), ExplicitSyncError> {
        self.pending(surface)?.release_point = Some(point);
        Ok(())
    }

    /// Destroy the object
    ///
    /// Committed sync points are still honored, pending ones are dropped.
    pub fn destroy(self, surface: &mut Surface) {
        let Ok(pending) = self.pending(surface) else {
            return;
        };
        pending.acquire_point = None;
        if let Some(release_point) = pending.release_point.take() {
            release_point.signal();
        }
        let hook = surface
            .data_map_mut()
            .get_mut::<SyncobjMarker>()
            .and_then(|marker| marker.commit_hook.take());
        if let Some(hook) = hook {
            surface.remove_hook(&hook);
        }
        trace!(surface = ?surface.id(), "Syncobj surface destroyed");
    }
}

fn commit_hook(surface: &mut Surface, handle: &SyncedHandle<ExplicitSync>, waiters: &RefCell<Vec<Waiter>>) {
    let new_buffer =
        surface.pending().committed().contains(Committed::BUFFER) && surface.pending().buffer().is_some();
    let state = surface.synced_pending(handle);
    let error = match (&state.acquire_point, &state.release_point) {
        (Some(_), _) if !new_buffer => Some((NO_BUFFER, "acquire point without buffer".to_string())),
        (Some(_), None) => Some((NO_RELEASE_POINT, "acquire point without release point".to_string())),
        (None, Some(_)) => Some((NO_ACQUIRE_POINT, "release point without acquire point".to_string())),
        (Some(acquire), Some(release)) if acquire.timeline == release.timeline && release.point <= acquire.point => {
            Some((
                CONFLICTING_POINTS,
                format!(
                    "release point '{}' is not greater than acquire point '{}'",
                    release.point, acquire.point
                ),
            ))
        }
        _ => None,
    };
    let acquire_point = state.acquire_point.clone();

    if let Some((code, message)) = error {
        surface.reject(ErrorTarget::SyncobjSurface, code, message);
        return;
    }

    if let Some(point) = acquire_point.filter(|point| !point.is_signaled()) {
        let token = surface.lock();
        trace!(surface = ?surface.id(), point = point.value(), "Waiting for acquire point");
        waiters.borrow_mut().push(Waiter {
            point,
            surface: surface.id().clone(),
            token,
        });
    }
}
