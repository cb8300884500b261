//! The pointer cursor role
//!
//! A surface set as the cursor image through `wl_pointer.set_cursor` gets the
//! [`CURSOR_ROLE`]. This role is never backed by a role object: it is active as soon as it
//! is assigned. The surface is mapped whenever its current state has a buffer, and unmapped
//! when the client attaches a null buffer.
//!
//! Many clients submit cursor buffers whose size does not match their buffer scale.
//! These are tolerated and only logged.

use tracing::trace;

use crate::utils::{Logical, Point};

use super::compositor::{RoleError, Surface, SurfaceRole};

/// Attributes of a surface having the cursor role
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CursorImageAttributes {
    /// Location of the hotspot of the pointer in the surface
    pub hotspot: Point<i32, Logical>,
}

/// Descriptor of the cursor role
#[derive(Debug)]
pub struct CursorRole;

/// The cursor role
pub static CURSOR_ROLE: CursorRole = CursorRole;

impl SurfaceRole for CursorRole {
    fn name(&self) -> &'static str {
        "cursor_image"
    }

    fn no_object(&self) -> bool {
        true
    }

    fn allows_unscaled_buffer(&self) -> bool {
        true
    }

    fn commit(&self, surface: &mut Surface) {
        // wl_surface.offset moves the hotspot in the opposite direction
        let offset = surface.current().offset();
        if offset != Point::default() {
            let attributes = surface.data_map_mut().get_or_insert(CursorImageAttributes::default);
            attributes.hotspot -= offset;
            trace!(hotspot = ?attributes.hotspot, "Cursor hotspot moved");
        }

        if surface.has_buffer() {
            surface.map();
        } else {
            surface.unmap();
        }
    }
}

/// Give the cursor role to a surface, with the hotspot of `wl_pointer.set_cursor`
pub fn set_cursor_role(surface: &mut Surface, hotspot: Point<i32, Logical>) -> Result<(), RoleError> {
    surface.set_role(&CURSOR_ROLE)?;
    surface
        .data_map_mut()
        .get_or_insert(CursorImageAttributes::default)
        .hotspot = hotspot;
    Ok(())
}

/// Hotspot of a cursor surface
pub fn cursor_hotspot(surface: &Surface) -> Option<Point<i32, Logical>> {
    if !surface.has_role(CURSOR_ROLE.name()) {
        return None;
    }
    Some(
        surface
            .data_map()
            .get::<CursorImageAttributes>()
            .map(|attributes| attributes.hotspot)
            .unwrap_or_default(),
    )
}
