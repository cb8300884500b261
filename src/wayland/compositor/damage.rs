//! Projection of committed damage and regions into the spaces the compositor consumes

use crate::utils::{Buffer as BufferCoords, Logical, Rectangle, Region};

use super::SurfaceState;

/// Damage of a state expressed in buffer coordinates
///
/// Surface-local damage has the viewport destination scaling undone, is moved by the viewport
/// source origin, multiplied by the buffer scale and brought back through the inverse of the
/// buffer transform, then merged with the damage the client posted in buffer coordinates.
///
/// A fractional source origin is floored, which may shift the damage by up to one pixel.
pub(super) fn buffer_damage(state: &SurfaceState) -> Region<BufferCoords> {
    let mut surface_damage = state.surface_damage.clone();

    if let Some(dst) = state.viewport.dst {
        let src = state.viewport_src_size();
        if !dst.is_empty() {
            surface_damage.scale_xy(src.w / dst.w as f64, src.h / dst.h as f64);
        }
    }
    if let Some(src) = state.viewport.src {
        surface_damage.translate(src.loc.to_i32_floor());
    }
    surface_damage.upscale(state.scale);

    let transformed_size = state.transform.transform_size(state.buffer_size);
    let mut damage: Region<BufferCoords> = surface_damage.cast();
    damage.transform(state.transform.invert(), transformed_size);

    damage.union(&state.buffer_damage);
    damage.intersect_rect(Rectangle::from_size(state.buffer_size));
    damage
}

/// Opaque part of the surface
///
/// The whole surface when the buffer has no alpha channel, otherwise the client region
/// clipped to the surface. Empty without buffer.
pub(super) fn opaque_region(state: &SurfaceState) -> Region<Logical> {
    let Some(buffer) = state.buffer.as_ref() else {
        return Region::new();
    };
    let surface_box = Rectangle::from_size(state.size);
    if buffer.is_opaque() {
        return Region::from(surface_box);
    }
    let mut region = state.opaque.clone();
    region.intersect_rect(surface_box);
    region
}

/// Input-sensitive part of the surface
pub(super) fn input_region(state: &SurfaceState) -> Region<Logical> {
    let surface_box = Rectangle::from_size(state.size);
    match state.input.as_ref() {
        None => Region::from(surface_box),
        Some(input) => {
            let mut region = input.clone();
            region.intersect_rect(surface_box);
            region
        }
    }
}
