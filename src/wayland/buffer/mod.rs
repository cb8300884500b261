//! Buffer management utilities.
//!
//! This module provides the [`BufferResource`] type, representing a buffer object created by a client,
//! and the [`Buffer`] type, a reference held by the compositor on such a resource.
//!
//! A surface state holding a buffer keeps a [`Buffer`] alive. The same client buffer resolved several
//! times while a reference is alive yields clones of the same [`Buffer`], and the client is sent a
//! `release` event once the last of these references is dropped, meaning the client is free to reuse
//! or destroy the buffer.
//!
//! How a client buffer handle is turned into a [`Buffer`] is abstracted by the [`BufferResolver`]
//! trait. [`BufferRegistry`] is a simple in-memory implementation of it.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::{Rc, Weak},
};

use tracing::trace;

use crate::utils::{Buffer as BufferCoords, Size};

/// Client-side handle of a buffer object, as sent in `wl_surface.attach`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferToken(pub u32);

#[derive(Debug)]
struct ResourceData {
    token: BufferToken,
    size: Size<i32, BufferCoords>,
    opaque: bool,
    releases: Cell<u32>,
    locked: RefCell<Weak<LockedBuffer>>,
}

/// A buffer object created by a client
#[derive(Debug, Clone)]
pub struct BufferResource(Rc<ResourceData>);

impl PartialEq for BufferResource {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl BufferResource {
    /// Create a new buffer resource of the given size
    ///
    /// `opaque` should be set for pixel formats without an alpha channel.
    pub fn new(token: BufferToken, size: impl Into<Size<i32, BufferCoords>>, opaque: bool) -> Self {
        BufferResource(Rc::new(ResourceData {
            token,
            size: size.into(),
            opaque,
            releases: Cell::new(0),
            locked: RefCell::new(Weak::new()),
        }))
    }

    /// Client-side handle of this buffer
    pub fn token(&self) -> BufferToken {
        self.0.token
    }

    /// Size of the buffer in pixels
    pub fn size(&self) -> Size<i32, BufferCoords> {
        self.0.size
    }

    /// Whether the buffer contents are fully opaque
    pub fn is_opaque(&self) -> bool {
        self.0.opaque
    }

    /// Number of `release` events sent for this buffer so far
    pub fn release_count(&self) -> u32 {
        self.0.releases.get()
    }

    /// Whether the compositor currently holds a reference on this buffer
    pub fn is_locked(&self) -> bool {
        self.0.locked.borrow().strong_count() > 0
    }

    /// Take a compositor reference on this buffer
    ///
    /// Returns a clone of the live reference if there is one.
    pub fn lock(&self) -> Buffer {
        if let Some(locked) = self.0.locked.borrow().upgrade() {
            return Buffer(locked);
        }
        let locked = Rc::new(LockedBuffer {
            resource: self.clone(),
        });
        *self.0.locked.borrow_mut() = Rc::downgrade(&locked);
        Buffer(locked)
    }
}

#[derive(Debug)]
struct LockedBuffer {
    resource: BufferResource,
}

impl Drop for LockedBuffer {
    fn drop(&mut self) {
        let data = &self.resource.0;
        data.releases.set(data.releases.get() + 1);
        trace!(buffer = ?data.token, "Sending buffer release");
    }
}

/// A reference held by the compositor on a client buffer
///
/// Dropping the last clone sends `release` to the client.
#[derive(Debug, Clone)]
pub struct Buffer(Rc<LockedBuffer>);

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Buffer {
    /// The client resource this reference points to
    pub fn resource(&self) -> &BufferResource {
        &self.0.resource
    }

    /// Size of the buffer in pixels
    pub fn size(&self) -> Size<i32, BufferCoords> {
        self.0.resource.size()
    }

    /// Whether the buffer contents are fully opaque
    pub fn is_opaque(&self) -> bool {
        self.0.resource.is_opaque()
    }
}

/// Turns client buffer handles into compositor buffer references
pub trait BufferResolver {
    /// Resolve a client handle, `None` if it does not name a buffer of a supported type
    fn resolve(&self, token: BufferToken) -> Option<Buffer>;
}

/// In-memory table of client buffers
#[derive(Debug, Default)]
pub struct BufferRegistry {
    buffers: RefCell<HashMap<BufferToken, BufferResource>>,
    next_token: Cell<u32>,
}

impl BufferRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        BufferRegistry::default()
    }

    /// Create and register a new buffer with a fresh token
    pub fn create(&self, size: impl Into<Size<i32, BufferCoords>>, opaque: bool) -> BufferResource {
        let token = BufferToken(self.next_token.get());
        self.next_token.set(token.0.wrapping_add(1));
        let resource = BufferResource::new(token, size, opaque);
        self.insert(resource.clone());
        resource
    }

    /// Register an externally created buffer, replacing any buffer with the same token
    pub fn insert(&self, resource: BufferResource) {
        self.buffers.borrow_mut().insert(resource.token(), resource);
    }

    /// Forget a buffer, as when the client destroys it
    ///
    /// References still held by surfaces stay valid.
    pub fn remove(&self, token: BufferToken) -> Option<BufferResource> {
        self.buffers.borrow_mut().remove(&token)
    }

    /// Look up a buffer by its client handle
    pub fn get(&self, token: BufferToken) -> Option<BufferResource> {
        self.buffers.borrow().get(&token).cloned()
    }
}

impl BufferResolver for BufferRegistry {
    fn resolve(&self, token: BufferToken) -> Option<Buffer> {
        self.get(token).map(|resource| resource.lock())
    }
}
