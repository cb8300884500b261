//! Utilities for handling the `wp_viewporter` protocol
//!
//! A viewport crops the buffer of a surface to a source rectangle and scales the result
//! to a destination size. Both are part of the double-buffered [`ViewportState`] of the surface,
//! which the commit machinery takes into account when deriving the surface size and projecting
//! damage.
//!
//! ## How to use it
//!
//! ```
//! use std::rc::Rc;
//! use stratum::utils::Size;
//! use stratum::wayland::buffer::BufferRegistry;
//! use stratum::wayland::compositor::Surface;
//! use stratum::wayland::viewporter::get_viewport;
//!
//! let buffers = Rc::new(BufferRegistry::new());
//! let mut surface = Surface::new(buffers.clone());
//!
//! // wp_viewporter.get_viewport
//! let viewport = get_viewport(&mut surface).unwrap();
//! viewport.set_destination(&mut surface, 64, 64).unwrap();
//!
//! let buffer = buffers.create((256, 256), false);
//! surface.attach(Some(buffer.token()));
//! surface.commit().unwrap();
//! assert_eq!(surface.current().size(), Size::from((64, 64)));
//! ```
//!
//! [`ViewportState`]: crate::wayland::compositor::ViewportState

use tracing::trace;

use crate::utils::{HookId, Rectangle, Size};

use super::compositor::{Committed, ErrorTarget, Surface, SurfaceId, ViewportState};

/// wp_viewport.error.bad_size
const BAD_SIZE: u32 = 1;
/// wp_viewport.error.out_of_buffer
const OUT_OF_BUFFER: u32 = 2;

/// Errors of the viewport requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewportError {
    /// The surface already has a viewport object
    #[error("the surface already has a viewport object associated")]
    ViewportExists,
    /// A request carried invalid values
    #[error("{0}")]
    BadValue(&'static str),
    /// The viewport is used on another surface than the one it was created for
    #[error("the wl_surface was destroyed")]
    NoSurface,
}

impl ViewportError {
    /// Protocol error code, `ViewportExists` belonging to `wp_viewporter` and the rest to `wp_viewport`
    pub fn code(&self) -> u32 {
        match self {
            ViewportError::ViewportExists => 0,
            ViewportError::BadValue(_) => 0,
            ViewportError::NoSurface => 3,
        }
    }
}

/// Marker stored in the surface data map while a viewport exists
struct ViewportMarker {
    hook: HookId,
}

/// A `wp_viewport` object
#[derive(Debug)]
pub struct Viewport {
    surface: SurfaceId,
}

/// Create the viewport of a surface
pub fn get_viewport(surface: &mut Surface) -> Result<Viewport, ViewportError> {
    if surface.data_map().get::<ViewportMarker>().is_some() {
        return Err(ViewportError::ViewportExists);
    }
    let hook = surface.add_pre_commit_hook(viewport_pre_commit_hook);
    surface.data_map_mut().insert_if_missing(|| ViewportMarker { hook });
    trace!(surface = ?surface.id(), "Viewport created");
    Ok(Viewport {
        surface: surface.id().clone(),
    })
}

impl Viewport {
    fn check_surface(&self, surface: &Surface) -> Result<(), ViewportError> {
        if surface.id() != &self.surface {
            return Err(ViewportError::NoSurface);
        }
        Ok(())
    }

    /// Set the source rectangle, all `-1.0` unsetting it
    pub fn set_source(
        &self,
        surface: &mut Surface,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<(), ViewportError> {
        self.check_surface(surface)?;
        // If all of x, y, width and height are -1.0, the source rectangle is unset instead.
        // Any other set of values where width or height are zero or negative,
        // or x or y are negative, raise the bad_value protocol error.
        let is_unset = x == -1.0 && y == -1.0 && width == -1.0 && height == -1.0;
        let is_valid_src = x >= 0.0 && y >= 0.0 && width > 0.0 && height > 0.0;
        if !is_unset && !is_valid_src {
            return Err(ViewportError::BadValue(
                "negative or zero values in width or height or negative values in x or y",
            ));
        }

        let src = (!is_unset).then(|| Rectangle::from(((x, y), (width, height))));
        set_pending(surface, |viewport| viewport.src = src);
        Ok(())
    }

    /// Set the destination size, `-1` for both unsetting it
    pub fn set_destination(&self, surface: &mut Surface, width: i32, height: i32) -> Result<(), ViewportError> {
        self.check_surface(surface)?;
        // If width is -1 and height is -1, the destination size is unset instead.
        // Any other pair of values for width and height that contains zero or
        // negative values raises the bad_value protocol error.
        let is_unset = width == -1 && height == -1;
        let is_valid_size = width > 0 && height > 0;
        if !is_unset && !is_valid_size {
            return Err(ViewportError::BadValue(
                "negative or zero values in width or height",
            ));
        }

        let dst = (!is_unset).then(|| Size::from((width, height)));
        set_pending(surface, |viewport| viewport.dst = dst);
        Ok(())
    }

    /// Destroy the viewport, unsetting source and destination on the next commit
    pub fn destroy(self, surface: &mut Surface) {
        if surface.id() != &self.surface {
            return;
        }
        if let Some(marker) = surface.data_map_mut().remove::<ViewportMarker>() {
            surface.remove_hook(&marker.hook);
        }
        set_pending(surface, |viewport| *viewport = ViewportState::default());
        trace!(surface = ?surface.id(), "Viewport destroyed");
    }
}

fn set_pending(surface: &mut Surface, f: impl FnOnce(&mut ViewportState)) {
    f(&mut surface.pending.viewport);
    surface.pending.committed |= Committed::VIEWPORT;
}

fn viewport_pre_commit_hook(surface: &mut Surface) {
    let pending = surface.pending();
    let viewport = *pending.viewport();
    let Some(src) = viewport.src else {
        return;
    };

    // If src_width or src_height are not integers and destination size is not set,
    // the bad_size protocol error is raised when the surface state is applied.
    if viewport.dst.is_none() && !src.size.is_integral() {
        surface.reject(
            ErrorTarget::Viewport,
            BAD_SIZE,
            "wp_viewport.set_source width and height must be integers when the destination rectangle is unset",
        );
        return;
    }

    if !pending.buffer_size().is_empty() {
        let content = pending
            .buffer_size()
            .to_logical(pending.scale(), pending.transform())
            .to_f64();
        if !Rectangle::from_size(content).contains_rect(src) {
            surface.reject(
                ErrorTarget::Viewport,
                OUT_OF_BUFFER,
                "source rectangle extends outside of the content area",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wayland::compositor::tests::{attach_new, surface, Fixture};
    use crate::wayland::compositor::CommitError;

    fn rejection_code(surface: &mut Surface) -> Option<u32> {
        match surface.commit() {
            Err(CommitError::Rejected(rejection)) => {
                assert_eq!(rejection.target, ErrorTarget::Viewport);
                Some(rejection.code)
            }
            Err(err) => panic!("unexpected error {:?}", err),
            Ok(_) => None,
        }
    }

    #[test]
    fn one_viewport_per_surface() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let viewport = get_viewport(&mut surface).unwrap();
        assert_eq!(get_viewport(&mut surface).unwrap_err(), ViewportError::ViewportExists);

        viewport.destroy(&mut surface);
        assert!(get_viewport(&mut surface).is_ok());
    }

    #[test]
    fn request_validation() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let viewport = get_viewport(&mut surface).unwrap();

        assert!(matches!(
            viewport.set_source(&mut surface, -1.0, 0.0, 10.0, 10.0),
            Err(ViewportError::BadValue(_))
        ));
        assert!(matches!(
            viewport.set_destination(&mut surface, 0, 10),
            Err(ViewportError::BadValue(_))
        ));
        assert!(!surface.pending().committed().contains(Committed::VIEWPORT));

        viewport.set_source(&mut surface, -1.0, -1.0, -1.0, -1.0).unwrap();
        viewport.set_destination(&mut surface, -1, -1).unwrap();
        assert_eq!(*surface.pending().viewport(), ViewportState::default());

        let mut other = crate::wayland::compositor::tests::surface(&fixture);
        assert_eq!(
            viewport.set_destination(&mut other, 5, 5),
            Err(ViewportError::NoSurface)
        );
    }

    #[test]
    fn crop_and_scale_size() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let viewport = get_viewport(&mut surface).unwrap();
        attach_new(&fixture, &mut surface, (200, 100));
        surface.set_buffer_scale(2).unwrap();
        viewport.set_source(&mut surface, 10.0, 10.0, 40.0, 20.0).unwrap();
        surface.commit().unwrap();
        assert_eq!(surface.current().size(), Size::from((40, 20)));

        viewport.set_destination(&mut surface, 80, 40).unwrap();
        surface.commit().unwrap();
        assert_eq!(surface.current().size(), Size::from((80, 40)));
    }

    #[test]
    fn fractional_source_needs_destination() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let viewport = get_viewport(&mut surface).unwrap();
        attach_new(&fixture, &mut surface, (100, 100));
        viewport.set_source(&mut surface, 0.0, 0.0, 10.5, 10.0).unwrap();
        assert_eq!(rejection_code(&mut surface), Some(BAD_SIZE));

        viewport.set_destination(&mut surface, 20, 20).unwrap();
        assert_eq!(rejection_code(&mut surface), None);
    }

    #[test]
    fn source_outside_buffer() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let viewport = get_viewport(&mut surface).unwrap();
        attach_new(&fixture, &mut surface, (100, 100));
        surface.set_buffer_scale(2).unwrap();
        viewport.set_source(&mut surface, 40.0, 0.0, 20.0, 20.0).unwrap();
        assert_eq!(rejection_code(&mut surface), Some(OUT_OF_BUFFER));

        viewport.set_source(&mut surface, 30.0, 0.0, 20.0, 20.0).unwrap();
        assert_eq!(rejection_code(&mut surface), None);
    }

    #[test]
    fn source_checked_against_attached_buffer() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let viewport = get_viewport(&mut surface).unwrap();
        attach_new(&fixture, &mut surface, (100, 100));
        surface.commit().unwrap();

        // no new attach, the buffer from the previous commit still bounds the source
        viewport.set_source(&mut surface, 90.0, 90.0, 50.0, 50.0).unwrap();
        assert_eq!(rejection_code(&mut surface), Some(OUT_OF_BUFFER));

        viewport.set_source(&mut surface, 50.0, 50.0, 50.0, 50.0).unwrap();
        assert_eq!(rejection_code(&mut surface), None);
    }

    #[test]
    fn non_divisible_buffer_allowed_with_source() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let viewport = get_viewport(&mut surface).unwrap();
        attach_new(&fixture, &mut surface, (101, 100));
        surface.set_buffer_scale(2).unwrap();
        viewport.set_source(&mut surface, 0.0, 0.0, 50.0, 50.0).unwrap();
        assert_eq!(rejection_code(&mut surface), None);
    }

    #[test]
    fn destroy_unsets_viewport() {
        let fixture = Fixture::new();
        let mut surface = surface(&fixture);
        let viewport = get_viewport(&mut surface).unwrap();
        attach_new(&fixture, &mut surface, (100, 100));
        viewport.set_destination(&mut surface, 10, 10).unwrap();
        surface.commit().unwrap();
        assert_eq!(surface.current().size(), Size::from((10, 10)));

        viewport.destroy(&mut surface);
        surface.commit().unwrap();
        assert_eq!(surface.current().size(), Size::from((100, 100)));
    }
}
