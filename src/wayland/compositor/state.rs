//! Double-buffered surface state

use std::fmt;

use crate::{
    utils::{Buffer as BufferCoords, Logical, Point, Rectangle, Region, Serial, Size, Transform},
    wayland::buffer::{Buffer, BufferToken},
};

use super::{synced::SyncedSlots, synced::SyncedState, SurfaceId};

bitflags::bitflags! {
    /// Set of state fields a client has changed since the last commit
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Committed: u32 {
        /// A buffer (or null) was attached
        const BUFFER = 1 << 0;
        /// Surface-local damage was posted
        const SURFACE_DAMAGE = 1 << 1;
        /// Buffer-local damage was posted
        const BUFFER_DAMAGE = 1 << 2;
        /// The opaque region was set
        const OPAQUE_REGION = 1 << 3;
        /// The input region was set
        const INPUT_REGION = 1 << 4;
        /// The buffer transform was set
        const TRANSFORM = 1 << 5;
        /// The buffer scale was set
        const SCALE = 1 << 6;
        /// Frame callbacks were requested
        const FRAME_CALLBACKS = 1 << 7;
        /// The viewport source or destination changed
        const VIEWPORT = 1 << 8;
        /// The buffer offset was set
        const OFFSET = 1 << 9;
        /// The subsurface stacking order changed
        const SUBSURFACES = 1 << 10;
    }
}

/// Crop and scale parameters set through a viewport
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewportState {
    /// Source rectangle, in surface-local coordinates before scaling
    pub src: Option<Rectangle<f64, Logical>>,
    /// Destination size of the surface
    pub dst: Option<Size<i32, Logical>>,
}

/// A `wl_surface.frame` callback
///
/// The closure receives the presentation timestamp in milliseconds.
pub struct FrameCallback {
    done: Box<dyn FnOnce(u32)>,
}

impl fmt::Debug for FrameCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCallback").finish_non_exhaustive()
    }
}

impl FrameCallback {
    /// Create a frame callback from the closure sending `done` to the client
    pub fn new<F: FnOnce(u32) + 'static>(done: F) -> Self {
        FrameCallback { done: Box::new(done) }
    }

    pub(crate) fn done(self, time: u32) {
        (self.done)(time)
    }
}

/// Stacking order of the subsurfaces of a surface, relative to the surface itself
///
/// Both lists are ordered from bottom to top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsurfaceOrder {
    /// Subsurfaces stacked above the parent
    pub above: Vec<SurfaceId>,
    /// Subsurfaces stacked below the parent
    pub below: Vec<SurfaceId>,
}

impl SubsurfaceOrder {
    /// Whether `id` is part of either list
    pub fn contains(&self, id: &SurfaceId) -> bool {
        self.above.contains(id) || self.below.contains(id)
    }

    pub(crate) fn remove(&mut self, id: &SurfaceId) -> bool {
        let len = self.above.len() + self.below.len();
        self.above.retain(|s| s != id);
        self.below.retain(|s| s != id);
        len != self.above.len() + self.below.len()
    }
}

/// One snapshot of the state of a surface
///
/// A surface holds three kinds of these: the pending state the client requests write into,
/// the current state the compositor reads from, and the cached states waiting in between.
pub struct SurfaceState {
    pub(crate) committed: Committed,
    pub(crate) seq: Serial,

    pub(crate) attachment: Option<BufferToken>,
    pub(crate) buffer: Option<Buffer>,
    pub(crate) buffer_size: Size<i32, BufferCoords>,
    pub(crate) size: Size<i32, Logical>,
    pub(crate) offset: Point<i32, Logical>,

    pub(crate) surface_damage: Region<Logical>,
    pub(crate) buffer_damage: Region<BufferCoords>,
    pub(crate) opaque: Region<Logical>,
    pub(crate) input: Option<Region<Logical>>,

    pub(crate) transform: Transform,
    pub(crate) scale: i32,
    pub(crate) viewport: ViewportState,

    pub(crate) frame_callbacks: Vec<FrameCallback>,
    pub(crate) subsurfaces: SubsurfaceOrder,

    pub(crate) synced: Vec<Box<dyn SyncedState>>,
}

impl fmt::Debug for SurfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceState")
            .field("committed", &self.committed)
            .field("seq", &self.seq)
            .field("buffer", &self.buffer.as_ref().map(|b| b.resource().token()))
            .field("buffer_size", &self.buffer_size)
            .field("size", &self.size)
            .field("offset", &self.offset)
            .field("transform", &self.transform)
            .field("scale", &self.scale)
            .field("viewport", &self.viewport)
            .field("frame_callbacks", &self.frame_callbacks.len())
            .field("synced", &self.synced.len())
            .finish_non_exhaustive()
    }
}

impl SurfaceState {
    /// A blank state without any extension sub-state
    pub(crate) fn empty() -> Self {
        SurfaceState {
            committed: Committed::empty(),
            seq: Serial(0),
            attachment: None,
            buffer: None,
            buffer_size: Size::default(),
            size: Size::default(),
            offset: Point::default(),
            surface_damage: Region::new(),
            buffer_damage: Region::new(),
            opaque: Region::new(),
            input: None,
            transform: Transform::Normal,
            scale: 1,
            viewport: ViewportState::default(),
            frame_callbacks: Vec::new(),
            subsurfaces: SubsurfaceOrder::default(),
            synced: Vec::new(),
        }
    }

    /// A blank state carrying a freshly initialized sub-state for each registered extension
    pub(crate) fn init(slots: &SyncedSlots) -> Result<Self, std::collections::TryReserveError> {
        let mut state = SurfaceState::empty();
        state.synced.try_reserve_exact(slots.len())?;
        state.synced.extend(slots.values().map(|slot| slot.init()));
        Ok(state)
    }

    /// Move the committed fields of `src` into `self`
    ///
    /// Fields not marked in `src.committed` keep their value in `self`, except the buffer
    /// offset and damage which are reset. `src` keeps its own buffer reference, releasing it
    /// is up to the caller.
    pub(crate) fn move_from(&mut self, src: &mut SurfaceState, slots: &SyncedSlots) {
        let committed = src.committed;

        self.buffer_size = src.buffer_size;
        self.size = src.size;

        if committed.contains(Committed::BUFFER) {
            self.attachment = src.attachment;
            self.buffer = src.buffer.clone();
        }
        if committed.contains(Committed::OFFSET) {
            self.offset = src.offset;
            src.offset = Point::default();
        } else {
            self.offset = Point::default();
        }
        if committed.contains(Committed::SURFACE_DAMAGE) {
            self.surface_damage = std::mem::take(&mut src.surface_damage);
        } else {
            self.surface_damage.clear();
        }
        if committed.contains(Committed::BUFFER_DAMAGE) {
            self.buffer_damage = std::mem::take(&mut src.buffer_damage);
        } else {
            self.buffer_damage.clear();
        }
        if committed.contains(Committed::OPAQUE_REGION) {
            self.opaque = src.opaque.clone();
        }
        if committed.contains(Committed::INPUT_REGION) {
            self.input = src.input.clone();
        }
        if committed.contains(Committed::TRANSFORM) {
            self.transform = src.transform;
        }
        if committed.contains(Committed::SCALE) {
            self.scale = src.scale;
        }
        if committed.contains(Committed::VIEWPORT) {
            self.viewport = src.viewport;
        }
        if committed.contains(Committed::FRAME_CALLBACKS) {
            self.frame_callbacks.append(&mut src.frame_callbacks);
        }
        if committed.contains(Committed::SUBSURFACES) {
            self.subsurfaces.clone_from(&src.subsurfaces);
        }

        for (index, slot) in slots.values().enumerate() {
            slot.move_state(&mut *self.synced[index], &mut *src.synced[index]);
        }

        self.committed = committed;
        src.committed = Committed::empty();
        self.seq = src.seq;
        src.seq.bump();
    }

    /// Fields changed by the client since the previous commit
    pub fn committed(&self) -> Committed {
        self.committed
    }

    /// Sequence number of this state
    pub fn seq(&self) -> Serial {
        self.seq
    }

    /// Client handle of the last attached buffer, `None` for a null attach
    pub fn attachment(&self) -> Option<BufferToken> {
        self.attachment
    }

    /// The buffer held by this state
    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }

    /// Size of the attached buffer in pixels, zero without buffer
    pub fn buffer_size(&self) -> Size<i32, BufferCoords> {
        self.buffer_size
    }

    /// Surface-local size, derived when the state is committed
    pub fn size(&self) -> Size<i32, Logical> {
        self.size
    }

    /// Position change of the buffer relative to the previous one
    pub fn offset(&self) -> Point<i32, Logical> {
        self.offset
    }

    /// Damage posted in surface-local coordinates
    pub fn surface_damage(&self) -> &Region<Logical> {
        &self.surface_damage
    }

    /// Damage posted in buffer coordinates
    pub fn buffer_damage(&self) -> &Region<BufferCoords> {
        &self.buffer_damage
    }

    /// Opaque region as set by the client
    pub fn opaque_region(&self) -> &Region<Logical> {
        &self.opaque
    }

    /// Input region as set by the client, `None` meaning infinite
    pub fn input_region(&self) -> Option<&Region<Logical>> {
        self.input.as_ref()
    }

    /// Buffer transform
    pub fn transform(&self) -> Transform {
        self.transform
    }

    /// Buffer scale
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Viewport crop and scale
    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    /// Number of frame callbacks waiting in this state
    pub fn frame_callback_count(&self) -> usize {
        self.frame_callbacks.len()
    }

    /// Stacking order of the subsurfaces
    pub fn subsurfaces(&self) -> &SubsurfaceOrder {
        &self.subsurfaces
    }

    /// Surface-local size of the viewport source, before destination scaling
    pub(crate) fn viewport_src_size(&self) -> Size<f64, Logical> {
        if self.buffer_size.is_empty() {
            return Size::default();
        }
        match self.viewport.src {
            Some(src) => src.size,
            None => self
                .buffer_size
                .to_logical(self.scale, self.transform)
                .to_f64(),
        }
    }
}
