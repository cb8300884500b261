use std::time::Duration;

use tracing::trace;

use crate::{
    utils::{Buffer as BufferCoords, Logical, Rectangle, RegionAttributes, Transform},
    wayland::buffer::BufferToken,
};

use super::{state::Committed, FrameCallback, Surface, SurfaceId};

/// Client errors detected while handling a request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// `wl_surface.set_buffer_scale` with a value below 1
    #[error("buffer scale must be positive, got {0}")]
    InvalidScale(i32),
    /// `wl_surface.set_buffer_transform` with an unknown value
    #[error("invalid buffer transform {0}")]
    InvalidTransform(i32),
    /// A subsurface request naming a surface that is neither a subsurface nor the parent
    #[error("{0:?} is not a sibling or the parent of the subsurface")]
    BadSurface(SurfaceId),
}

impl RequestError {
    /// Protocol error code to post on the object
    pub fn code(&self) -> u32 {
        match self {
            // wl_surface.error
            RequestError::InvalidScale(_) => 0,
            RequestError::InvalidTransform(_) => 1,
            // wl_subsurface.error
            RequestError::BadSurface(_) => 0,
        }
    }
}

/*
 * wl_surface
 */

impl Surface {
    /// Attach a buffer, or detach with `None`
    pub fn attach(&mut self, buffer: Option<BufferToken>) {
        trace!(surface = ?self.id, ?buffer, "Attaching buffer");
        self.pending.attachment = buffer;
        self.pending.committed |= Committed::BUFFER;
    }

    /// Set the position of the next buffer relative to the current one
    pub fn offset(&mut self, dx: i32, dy: i32) {
        self.pending.offset = (dx, dy).into();
        self.pending.committed |= Committed::OFFSET;
    }

    /// Post damage in surface-local coordinates
    ///
    /// Rectangles with a negative size are ignored.
    pub fn damage(&mut self, rect: Rectangle<i32, Logical>) {
        if rect.size.w < 0 || rect.size.h < 0 {
            return;
        }
        self.pending.surface_damage.add_rect(rect);
        self.pending.committed |= Committed::SURFACE_DAMAGE;
    }

    /// Post damage in buffer coordinates
    ///
    /// Rectangles with a negative size are ignored.
    pub fn damage_buffer(&mut self, rect: Rectangle<i32, BufferCoords>) {
        if rect.size.w < 0 || rect.size.h < 0 {
            return;
        }
        self.pending.buffer_damage.add_rect(rect);
        self.pending.committed |= Committed::BUFFER_DAMAGE;
    }

    /// Request a notification when it is a good time to draw the next frame
    pub fn frame(&mut self, callback: FrameCallback) {
        self.pending.frame_callbacks.push(callback);
        self.pending.committed |= Committed::FRAME_CALLBACKS;
    }

    /// Set the opaque region, `None` meaning empty
    pub fn set_opaque_region(&mut self, region: Option<&RegionAttributes>) {
        self.pending.opaque = region.map(RegionAttributes::to_region).unwrap_or_default();
        self.pending.committed |= Committed::OPAQUE_REGION;
    }

    /// Set the input region, `None` meaning infinite
    pub fn set_input_region(&mut self, region: Option<&RegionAttributes>) {
        self.pending.input = region.map(RegionAttributes::to_region);
        self.pending.committed |= Committed::INPUT_REGION;
    }

    /// Set the buffer transform, from its `wl_output.transform` value
    pub fn set_buffer_transform(&mut self, transform: i32) -> Result<(), RequestError> {
        let transform = Transform::try_from(transform).map_err(RequestError::InvalidTransform)?;
        self.pending.transform = transform;
        self.pending.committed |= Committed::TRANSFORM;
        Ok(())
    }

    /// Set the buffer scale
    pub fn set_buffer_scale(&mut self, scale: i32) -> Result<(), RequestError> {
        if scale <= 0 {
            return Err(RequestError::InvalidScale(scale));
        }
        self.pending.scale = scale;
        self.pending.committed |= Committed::SCALE;
        Ok(())
    }

    /// Notify every frame callback of the current state, returning how many were sent
    pub fn send_frame_done(&mut self, time: Duration) -> usize {
        let callbacks = std::mem::take(&mut self.current.frame_callbacks);
        let count = callbacks.len();
        let time = time.as_millis() as u32;
        for callback in callbacks {
            callback.done(time);
        }
        count
    }
}

/*
 * wl_subsurface
 */

impl Surface {
    /// Register a new subsurface of this surface, on top of the stack
    ///
    /// Takes effect immediately in every state of the surface: pending, current and cached.
    pub fn add_subsurface(&mut self, child: SurfaceId) {
        if self.pending.subsurfaces.contains(&child) {
            return;
        }
        trace!(surface = ?self.id, ?child, "Adding subsurface");
        let mut states = vec![&mut self.current];
        states.extend(self.cache.entries_mut().map(|entry| &mut entry.state));
        for state in states {
            if !state.subsurfaces.contains(&child) {
                state.subsurfaces.above.push(child.clone());
            }
        }
        self.pending.subsurfaces.above.push(child);
    }

    /// Forget a destroyed subsurface, in every state of this surface
    pub fn remove_subsurface(&mut self, child: &SurfaceId) {
        trace!(surface = ?self.id, ?child, "Removing subsurface");
        self.pending.subsurfaces.remove(child);
        self.current.subsurfaces.remove(child);
        for entry in self.cache.entries_mut() {
            entry.state.subsurfaces.remove(child);
        }
    }

    /// Restack `child` just above `sibling`, which may be this surface itself
    pub fn place_above(&mut self, child: &SurfaceId, sibling: &SurfaceId) -> Result<(), RequestError> {
        self.restack(child, sibling, true)
    }

    /// Restack `child` just below `sibling`, which may be this surface itself
    pub fn place_below(&mut self, child: &SurfaceId, sibling: &SurfaceId) -> Result<(), RequestError> {
        self.restack(child, sibling, false)
    }

    fn restack(&mut self, child: &SurfaceId, sibling: &SurfaceId, above: bool) -> Result<(), RequestError> {
        let is_parent = sibling == &self.id;
        let order = &mut self.pending.subsurfaces;
        if !order.contains(child) {
            return Err(RequestError::BadSurface(child.clone()));
        }
        if child == sibling || (!is_parent && !order.contains(sibling)) {
            return Err(RequestError::BadSurface(sibling.clone()));
        }
        order.remove(child);

        if is_parent {
            if above {
                order.above.insert(0, child.clone());
            } else {
                order.below.push(child.clone());
            }
        } else {
            let list = if order.above.contains(sibling) {
                &mut order.above
            } else {
                &mut order.below
            };
            let Some(pos) = list.iter().position(|s| s == sibling) else {
                unreachable!()
            };
            let pos = if above { pos + 1 } else { pos };
            list.insert(pos, child.clone());
        }

        self.pending.committed |= Committed::SUBSURFACES;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::utils::{Point, RectangleKind, Region};
    use crate::wayland::compositor::tests::{attach_new, surface, Fixture};

    #[test]
    fn scale_and_transform_validation() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        assert_eq!(surface.set_buffer_scale(0), Err(RequestError::InvalidScale(0)));
        assert_eq!(RequestError::InvalidScale(0).code(), 0);
        assert_eq!(surface.set_buffer_transform(9), Err(RequestError::InvalidTransform(9)));
        assert_eq!(RequestError::InvalidTransform(9).code(), 1);
        assert!(surface.pending().committed().is_empty());

        surface.set_buffer_transform(1).unwrap();
        assert_eq!(surface.pending().transform(), Transform::_90);
    }

    #[test]
    fn frame_callbacks_fire_once_current() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let fired = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..2 {
            let fired = fired.clone();
            surface.frame(FrameCallback::new(move |time| fired.borrow_mut().push(time)));
        }
        assert_eq!(surface.send_frame_done(Duration::from_millis(5)), 0);

        surface.commit().unwrap();
        assert_eq!(surface.send_frame_done(Duration::from_millis(16)), 2);
        assert_eq!(*fired.borrow(), vec![16, 16]);
        assert_eq!(surface.send_frame_done(Duration::from_millis(32)), 0);
    }

    #[test]
    fn regions_follow_commits() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        attach_new(&fixture, &mut surface, (100, 100));
        let region = RegionAttributes {
            rects: vec![(RectangleKind::Add, Rectangle::from(((50, 50), (100, 100))))],
        };
        surface.set_opaque_region(Some(&region));
        surface.set_input_region(Some(&region));
        surface.commit().unwrap();

        let expected = Region::from(Rectangle::from(((50, 50), (50, 50))));
        assert_eq!(*surface.opaque_region(), expected);
        assert_eq!(*surface.input_region(), expected);

        surface.set_input_region(None);
        surface.commit().unwrap();
        assert_eq!(surface.input_region().area(), 100 * 100);
        assert_eq!(*surface.opaque_region(), expected);
    }

    #[test]
    fn subsurface_stacking() {
        let fixture = Fixture::new();
        let mut parent = surface(&fixture);
        let a = surface(&fixture);
        let b = surface(&fixture);
        let (a, b) = (a.id().clone(), b.id().clone());
        let parent_id = parent.id().clone();

        parent.add_subsurface(a.clone());
        parent.add_subsurface(b.clone());
        assert_eq!(parent.current().subsurfaces().above, vec![a.clone(), b.clone()]);

        parent.place_below(&b, &parent_id).unwrap();
        parent.place_above(&a, &parent_id).unwrap();
        assert_eq!(parent.current().subsurfaces().above, vec![a.clone(), b.clone()]);

        parent.commit().unwrap();
        assert_eq!(parent.current().subsurfaces().above, vec![a.clone()]);
        assert_eq!(parent.current().subsurfaces().below, vec![b.clone()]);

        parent.place_above(&b, &a).unwrap();
        parent.commit().unwrap();
        assert_eq!(parent.current().subsurfaces().above, vec![a.clone(), b.clone()]);
        assert!(parent.current().subsurfaces().below.is_empty());

        let stranger = surface(&fixture);
        assert_eq!(
            parent.place_below(&a, stranger.id()),
            Err(RequestError::BadSurface(stranger.id().clone()))
        );

        parent.remove_subsurface(&a);
        assert_eq!(parent.current().subsurfaces().above, vec![b.clone()]);
        assert!(!parent.pending().subsurfaces().contains(&a));
    }

    #[test]
    fn subsurface_added_while_restack_is_cached() {
        let fixture = Fixture::new();
        let mut parent = surface(&fixture);
        let a = surface(&fixture).id().clone();
        let b = surface(&fixture).id().clone();
        let parent_id = parent.id().clone();

        parent.add_subsurface(a.clone());
        parent.commit().unwrap();

        let token = parent.lock();
        parent.place_below(&a, &parent_id).unwrap();
        parent.commit().unwrap();
        assert_eq!(parent.cached_len(), 1);

        parent.add_subsurface(b.clone());
        parent.unlock(token);
        assert_eq!(parent.current().subsurfaces().above, vec![b.clone()]);
        assert_eq!(parent.current().subsurfaces().below, vec![a.clone()]);

        parent.commit().unwrap();
        assert!(parent.current().subsurfaces().contains(&b));
        assert_eq!(parent.current().subsurfaces().below, vec![a]);
    }

    #[test]
    fn offset_applies_once() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        attach_new(&fixture, &mut surface, (10, 10));
        surface.offset(4, -2);
        surface.commit().unwrap();
        assert_eq!(surface.current().offset(), Point::from((4, -2)));

        surface.commit().unwrap();
        assert_eq!(surface.current().offset(), Point::default());
    }
}
