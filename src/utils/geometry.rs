use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Type-level marker for the surface-local (logical) coordinate space
#[derive(Debug)]
pub struct Logical;

/// Type-level marker for the buffer coordinate space
#[derive(Debug)]
pub struct Buffer;

/// Trait for types serving as a coordinate for other geometry utils
pub trait Coordinate:
    Sized + Add<Self, Output = Self> + Sub<Self, Output = Self> + PartialOrd + Default + Copy + fmt::Debug
{
    /// A Coordinate that is 0
    const ZERO: Self;
    /// Convert the coordinate to a f64
    fn to_f64(self) -> f64;
    /// Convert to this coordinate from a f64
    fn from_f64(v: f64) -> Self;
    /// Compare and return the smaller one
    fn min(self, other: Self) -> Self {
        if self < other {
            self
        } else {
            other
        }
    }
    /// Compare and return the larger one
    fn max(self, other: Self) -> Self {
        if self > other {
            self
        } else {
            other
        }
    }
    /// Saturating addition
    fn saturating_add(self, other: Self) -> Self;
    /// Saturating subtraction
    fn saturating_sub(self, other: Self) -> Self;
    /// Saturating multiplication
    fn saturating_mul(self, other: Self) -> Self;
}

impl Coordinate for i32 {
    const ZERO: i32 = 0;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as i32
    }

    #[inline]
    fn saturating_add(self, other: Self) -> Self {
        i32::saturating_add(self, other)
    }

    #[inline]
    fn saturating_sub(self, other: Self) -> Self {
        i32::saturating_sub(self, other)
    }

    #[inline]
    fn saturating_mul(self, other: Self) -> Self {
        i32::saturating_mul(self, other)
    }
}

impl Coordinate for f64 {
    const ZERO: f64 = 0.0;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn saturating_add(self, other: Self) -> Self {
        self + other
    }

    #[inline]
    fn saturating_sub(self, other: Self) -> Self {
        self - other
    }

    #[inline]
    fn saturating_mul(self, other: Self) -> Self {
        self * other
    }
}

/*
 * Point
 */

/// A point as defined by its x and y coordinates
///
/// Operations on points are saturating.
pub struct Point<N, Kind> {
    /// horizontal coordinate
    pub x: N,
    /// vertical coordinate
    pub y: N,
    _kind: std::marker::PhantomData<Kind>,
}

impl<N: Coordinate, Kind> Point<N, Kind> {
    /// Convert the underlying numerical type to f64 for floating point manipulations
    #[inline]
    pub fn to_f64(self) -> Point<f64, Kind> {
        Point {
            x: self.x.to_f64(),
            y: self.y.to_f64(),
            _kind: std::marker::PhantomData,
        }
    }

    /// Convert this [`Point`] to a [`Size`] with the same coordinates
    #[inline]
    pub fn to_size(self) -> Size<N, Kind> {
        Size {
            w: self.x,
            h: self.y,
            _kind: std::marker::PhantomData,
        }
    }
}

impl<Kind> Point<f64, Kind> {
    /// Convert to i32 by flooring both coordinates
    #[inline]
    pub fn to_i32_floor(self) -> Point<i32, Kind> {
        Point {
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            _kind: std::marker::PhantomData,
        }
    }

    /// Convert to i32 by taking the ceiling of both coordinates
    #[inline]
    pub fn to_i32_ceil(self) -> Point<i32, Kind> {
        Point {
            x: self.x.ceil() as i32,
            y: self.y.ceil() as i32,
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N: fmt::Debug, S> fmt::Debug for Point<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Point")
            .field("x", &self.x)
            .field("y", &self.y)
            .finish()
    }
}

impl<N, Kind> From<(N, N)> for Point<N, Kind> {
    #[inline]
    fn from((x, y): (N, N)) -> Point<N, Kind> {
        Point {
            x,
            y,
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N, Kind> From<Point<N, Kind>> for (N, N) {
    #[inline]
    fn from(point: Point<N, Kind>) -> (N, N) {
        (point.x, point.y)
    }
}

impl<N: Coordinate, Kind> Add for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn add(self, other: Point<N, Kind>) -> Point<N, Kind> {
        Point {
            x: self.x.saturating_add(other.x),
            y: self.y.saturating_add(other.y),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> AddAssign for Point<N, Kind> {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.x = self.x.saturating_add(rhs.x);
        self.y = self.y.saturating_add(rhs.y);
    }
}

impl<N: Coordinate, Kind> Sub for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn sub(self, other: Point<N, Kind>) -> Point<N, Kind> {
        Point {
            x: self.x.saturating_sub(other.x),
            y: self.y.saturating_sub(other.y),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N: Coordinate, Kind> SubAssign for Point<N, Kind> {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.x = self.x.saturating_sub(rhs.x);
        self.y = self.y.saturating_sub(rhs.y);
    }
}

impl<N: Clone, Kind> Clone for Point<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Point {
            x: self.x.clone(),
            y: self.y.clone(),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N: Copy, Kind> Copy for Point<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Point<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<N: Eq, Kind> Eq for Point<N, Kind> {}

impl<N: Default, Kind> Default for Point<N, Kind> {
    fn default() -> Self {
        Point {
            x: N::default(),
            y: N::default(),
            _kind: std::marker::PhantomData,
        }
    }
}

/*
 * Size
 */

/// A size as defined by its width and height
///
/// Operations on sizes are saturating.
pub struct Size<N, Kind> {
    /// horizontal coordinate
    pub w: N,
    /// vertical coordinate
    pub h: N,
    _kind: std::marker::PhantomData<Kind>,
}

impl<N: Coordinate, Kind> Size<N, Kind> {
    /// Convert the underlying numerical type to f64 for floating point manipulations
    #[inline]
    pub fn to_f64(self) -> Size<f64, Kind> {
        Size {
            w: self.w.to_f64(),
            h: self.h.to_f64(),
            _kind: std::marker::PhantomData,
        }
    }

    /// Check if this [`Size`] is empty
    ///
    /// Returns true if either the width or the height is zero or negative
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w <= N::ZERO || self.h <= N::ZERO
    }
}

impl<Kind> Size<i32, Kind> {
    /// Multiply both dimensions by an integer scale
    #[inline]
    pub fn upscale(self, scale: i32) -> Size<i32, Kind> {
        Size {
            w: self.w.saturating_mul(scale),
            h: self.h.saturating_mul(scale),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<Kind> Size<f64, Kind> {
    /// Convert to i32 by truncating towards zero
    #[inline]
    pub fn to_i32_trunc(self) -> Size<i32, Kind> {
        Size {
            w: self.w as i32,
            h: self.h as i32,
            _kind: std::marker::PhantomData,
        }
    }

    /// Whether both dimensions hold integral values
    #[inline]
    pub fn is_integral(&self) -> bool {
        self.w.fract() == 0.0 && self.h.fract() == 0.0
    }
}

impl Size<i32, Buffer> {
    /// Convert a buffer size into the surface-local size it covers under the given scale and transform
    #[inline]
    pub fn to_logical(self, scale: i32, transform: Transform) -> Size<i32, Logical> {
        let size = transform.transform_size(self);
        Size::from((size.w / scale, size.h / scale))
    }
}

impl<N: fmt::Debug, S> fmt::Debug for Size<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Size")
            .field("w", &self.w)
            .field("h", &self.h)
            .finish()
    }
}

impl<N, Kind> From<(N, N)> for Size<N, Kind> {
    #[inline]
    fn from((w, h): (N, N)) -> Size<N, Kind> {
        Size {
            w,
            h,
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N, Kind> From<Size<N, Kind>> for (N, N) {
    #[inline]
    fn from(size: Size<N, Kind>) -> (N, N) {
        (size.w, size.h)
    }
}

impl<N: Coordinate, Kind> Add<Size<N, Kind>> for Point<N, Kind> {
    type Output = Point<N, Kind>;
    #[inline]
    fn add(self, other: Size<N, Kind>) -> Point<N, Kind> {
        Point {
            x: self.x.saturating_add(other.w),
            y: self.y.saturating_add(other.h),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N: Clone, Kind> Clone for Size<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Size {
            w: self.w.clone(),
            h: self.h.clone(),
            _kind: std::marker::PhantomData,
        }
    }
}

impl<N: Copy, Kind> Copy for Size<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Size<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.w == other.w && self.h == other.h
    }
}

impl<N: Eq, Kind> Eq for Size<N, Kind> {}

impl<N: Default, Kind> Default for Size<N, Kind> {
    fn default() -> Self {
        Size {
            w: N::default(),
            h: N::default(),
            _kind: std::marker::PhantomData,
        }
    }
}

/*
 * Rectangle
 */

/// A rectangle defined by its top-left corner and dimensions
///
/// Operations on rectangles are saturating.
pub struct Rectangle<N, Kind> {
    /// Location of the top-left corner of the rectangle
    pub loc: Point<N, Kind>,
    /// Size of the rectangle, as (width, height)
    pub size: Size<N, Kind>,
}

impl<N: Coordinate, Kind> Rectangle<N, Kind> {
    /// Create a new [`Rectangle`] from the coordinates of its top-left corner and its dimensions
    #[inline]
    pub fn new(loc: Point<N, Kind>, size: Size<N, Kind>) -> Self {
        Rectangle { loc, size }
    }

    /// Create a new [`Rectangle`] from its dimensions, with location zero
    #[inline]
    pub fn from_size(size: Size<N, Kind>) -> Self {
        Rectangle {
            loc: (N::ZERO, N::ZERO).into(),
            size,
        }
    }

    /// Create a new [`Rectangle`] from the coordinates of its top-left corner and its bottom-right corner
    #[inline]
    pub fn from_extremities(
        topleft: impl Into<Point<N, Kind>>,
        bottomright: impl Into<Point<N, Kind>>,
    ) -> Self {
        let topleft = topleft.into();
        let bottomright = bottomright.into();
        Rectangle {
            loc: topleft,
            size: (bottomright - topleft).to_size(),
        }
    }

    /// Convert the underlying numerical type to f64
    #[inline]
    pub fn to_f64(self) -> Rectangle<f64, Kind> {
        Rectangle {
            loc: self.loc.to_f64(),
            size: self.size.to_f64(),
        }
    }

    /// Check if this [`Rectangle`] is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    /// Bottom-right corner (exclusive)
    #[inline]
    pub fn bottom_right(&self) -> Point<N, Kind> {
        self.loc + self.size
    }

    /// Checks whether given [`Point`] is inside the rectangle
    #[inline]
    pub fn contains<P: Into<Point<N, Kind>>>(self, point: P) -> bool {
        let p: Point<N, Kind> = point.into();
        (p.x >= self.loc.x)
            && (p.x < self.loc.x.saturating_add(self.size.w))
            && (p.y >= self.loc.y)
            && (p.y < self.loc.y.saturating_add(self.size.h))
    }

    /// Checks whether given [`Rectangle`] is fully inside this rectangle
    #[inline]
    pub fn contains_rect(self, rect: Rectangle<N, Kind>) -> bool {
        rect.loc.x >= self.loc.x
            && rect.loc.y >= self.loc.y
            && rect.loc.x.saturating_add(rect.size.w) <= self.loc.x.saturating_add(self.size.w)
            && rect.loc.y.saturating_add(rect.size.h) <= self.loc.y.saturating_add(self.size.h)
    }

    /// Checks whether a given [`Rectangle`] overlaps with this one
    ///
    /// Touching rectangles do not overlap.
    #[inline]
    pub fn overlaps(self, other: Rectangle<N, Kind>) -> bool {
        self.loc.x < other.loc.x.saturating_add(other.size.w)
            && other.loc.x < self.loc.x.saturating_add(self.size.w)
            && self.loc.y < other.loc.y.saturating_add(other.size.h)
            && other.loc.y < self.loc.y.saturating_add(self.size.h)
    }

    /// Overlapping area of two rectangles, `None` if they don't overlap
    #[inline]
    pub fn intersection(self, other: Rectangle<N, Kind>) -> Option<Self> {
        if self.is_empty() || other.is_empty() || !self.overlaps(other) {
            return None;
        }
        Some(Rectangle::from_extremities(
            (self.loc.x.max(other.loc.x), self.loc.y.max(other.loc.y)),
            (
                (self.loc.x.saturating_add(self.size.w)).min(other.loc.x.saturating_add(other.size.w)),
                (self.loc.y.saturating_add(self.size.h)).min(other.loc.y.saturating_add(other.size.h)),
            ),
        ))
    }

    /// Subtract `other` from this rectangle
    ///
    /// Returns up to four non-overlapping pieces: full-width bands above and
    /// below the overlap, and the left and right remainders beside it.
    pub fn subtract_rect(self, other: Rectangle<N, Kind>) -> Vec<Self> {
        let Some(overlap) = self.intersection(other) else {
            return if self.is_empty() { Vec::new() } else { vec![self] };
        };

        let self_br = self.bottom_right();
        let overlap_br = overlap.bottom_right();
        let pieces = [
            Rectangle::from_extremities(self.loc, (self_br.x, overlap.loc.y)),
            Rectangle::from_extremities((self.loc.x, overlap_br.y), self_br),
            Rectangle::from_extremities((self.loc.x, overlap.loc.y), (overlap.loc.x, overlap_br.y)),
            Rectangle::from_extremities((overlap_br.x, overlap.loc.y), (self_br.x, overlap_br.y)),
        ];
        pieces.into_iter().filter(|r| !r.is_empty()).collect()
    }
}

impl<Kind> Rectangle<i32, Kind> {
    /// Translate by an offset
    #[inline]
    pub fn translate(self, offset: Point<i32, Kind>) -> Self {
        Rectangle::new(self.loc + offset, self.size)
    }

    /// Multiply location and size by an integer scale
    #[inline]
    pub fn upscale(self, scale: i32) -> Self {
        Rectangle::new(
            (self.loc.x.saturating_mul(scale), self.loc.y.saturating_mul(scale)).into(),
            self.size.upscale(scale),
        )
    }

    /// Reinterpret the rectangle in another coordinate space without changing its values
    #[inline]
    pub fn cast<K2>(self) -> Rectangle<i32, K2> {
        Rectangle::new(
            (self.loc.x, self.loc.y).into(),
            (self.size.w, self.size.h).into(),
        )
    }
}

impl<Kind> Rectangle<f64, Kind> {
    /// Smallest integer rectangle enclosing this float rectangle
    #[inline]
    pub fn to_i32_up(self) -> Rectangle<i32, Kind> {
        Rectangle::from_extremities(self.loc.to_i32_floor(), (self.loc + self.size).to_i32_ceil())
    }
}

impl<N: fmt::Debug, S> fmt::Debug for Rectangle<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rectangle")
            .field("x", &self.loc.x)
            .field("y", &self.loc.y)
            .field("width", &self.size.w)
            .field("height", &self.size.h)
            .finish()
    }
}

impl<N: Coordinate, Kind> From<((N, N), (N, N))> for Rectangle<N, Kind> {
    #[inline]
    fn from((loc, size): ((N, N), (N, N))) -> Self {
        Rectangle::new(loc.into(), size.into())
    }
}

impl<N: Clone, Kind> Clone for Rectangle<N, Kind> {
    #[inline]
    fn clone(&self) -> Self {
        Rectangle {
            loc: self.loc.clone(),
            size: self.size.clone(),
        }
    }
}

impl<N: Copy, Kind> Copy for Rectangle<N, Kind> {}

impl<N: PartialEq, Kind> PartialEq for Rectangle<N, Kind> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.loc == other.loc && self.size == other.size
    }
}

impl<N: Eq, Kind> Eq for Rectangle<N, Kind> {}

impl<N: Default, Kind> Default for Rectangle<N, Kind> {
    fn default() -> Self {
        Rectangle {
            loc: Default::default(),
            size: Default::default(),
        }
    }
}

/*
 * Transform
 */

/// Possible transformations to two-dimensional planes
///
/// Discriminants match the `wl_output.transform` wire values.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum Transform {
    /// Identity transformation (plane is unaltered when applied)
    #[default]
    Normal,
    /// Plane is rotated by 90 degrees
    _90,
    /// Plane is rotated by 180 degrees
    _180,
    /// Plane is rotated by 270 degrees
    _270,
    /// Plane is flipped vertically
    Flipped,
    /// Plane is flipped vertically and rotated by 90 degrees
    Flipped90,
    /// Plane is flipped vertically and rotated by 180 degrees
    Flipped180,
    /// Plane is flipped vertically and rotated by 270 degrees
    Flipped270,
}

impl Transform {
    /// The transformation undoing this one
    ///
    /// Rotations by 90 and 270 degrees invert into each other. Every flipped transformation
    /// is a reflection and inverts to itself.
    #[inline]
    pub fn invert(&self) -> Transform {
        match self {
            Transform::Normal => Transform::Normal,
            Transform::Flipped => Transform::Flipped,
            Transform::_90 => Transform::_270,
            Transform::_180 => Transform::_180,
            Transform::_270 => Transform::_90,
            Transform::Flipped90 => Transform::Flipped90,
            Transform::Flipped180 => Transform::Flipped180,
            Transform::Flipped270 => Transform::Flipped270,
        }
    }

    /// Whether this transformation swaps width and height
    #[inline]
    pub fn swaps_axes(&self) -> bool {
        matches!(
            self,
            Transform::_90 | Transform::_270 | Transform::Flipped90 | Transform::Flipped270
        )
    }

    /// Transformed size after applying this transformation.
    pub fn transform_size<N: Coordinate, Kind>(&self, size: Size<N, Kind>) -> Size<N, Kind> {
        if self.swaps_axes() {
            (size.h, size.w).into()
        } else {
            size
        }
    }

    /// Transforms a rectangle inside an area of a given size by applying this transformation.
    pub fn transform_rect_in<N: Coordinate, Kind>(
        &self,
        rect: Rectangle<N, Kind>,
        area: &Size<N, Kind>,
    ) -> Rectangle<N, Kind> {
        let size = self.transform_size(rect.size);

        let loc = match *self {
            Transform::Normal => rect.loc,
            Transform::_90 => (area.h - rect.loc.y - rect.size.h, rect.loc.x).into(),
            Transform::_180 => (
                area.w - rect.loc.x - rect.size.w,
                area.h - rect.loc.y - rect.size.h,
            )
                .into(),
            Transform::_270 => (rect.loc.y, area.w - rect.loc.x - rect.size.w).into(),
            Transform::Flipped => (area.w - rect.loc.x - rect.size.w, rect.loc.y).into(),
            Transform::Flipped90 => (
                area.h - rect.loc.y - rect.size.h,
                area.w - rect.loc.x - rect.size.w,
            )
                .into(),
            Transform::Flipped180 => (rect.loc.x, area.h - rect.loc.y - rect.size.h).into(),
            Transform::Flipped270 => (rect.loc.y, rect.loc.x).into(),
        };

        Rectangle::new(loc, size)
    }
}

impl TryFrom<i32> for Transform {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Transform::Normal,
            1 => Transform::_90,
            2 => Transform::_180,
            3 => Transform::_270,
            4 => Transform::Flipped,
            5 => Transform::Flipped90,
            6 => Transform::Flipped180,
            7 => Transform::Flipped270,
            other => return Err(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Buffer, Logical, Rectangle, Size, Transform};

    #[test]
    fn transform_rect_90() {
        let rect = Rectangle::<i32, Logical>::new((10, 20).into(), (30, 40).into());
        let size = Size::from((70, 90));

        assert_eq!(
            Rectangle::new((30, 10).into(), (40, 30).into()),
            Transform::_90.transform_rect_in(rect, &size)
        )
    }

    #[test]
    fn transform_rect_invert_roundtrip() {
        let rect = Rectangle::<i32, Logical>::new((10, 20).into(), (30, 40).into());
        let area = Size::from((70, 90));

        for transform in [
            Transform::Normal,
            Transform::_90,
            Transform::_180,
            Transform::_270,
            Transform::Flipped,
            Transform::Flipped90,
            Transform::Flipped180,
            Transform::Flipped270,
        ] {
            let moved = transform.transform_rect_in(rect, &area);
            let back = transform
                .invert()
                .transform_rect_in(moved, &transform.transform_size(area));
            assert_eq!(rect, back, "{:?}", transform);
        }
    }

    #[test]
    fn subtract_rect_pieces_cover_remainder() {
        let rect = Rectangle::<i32, Logical>::from(((0, 0), (10, 10)));
        let hole = Rectangle::from(((3, 3), (4, 4)));

        let pieces = rect.subtract_rect(hole);
        assert_eq!(pieces.len(), 4);
        let area: i32 = pieces.iter().map(|r| r.size.w * r.size.h).sum();
        assert_eq!(area, 100 - 16);
        assert!(pieces.iter().all(|p| p.intersection(hole).is_none()));
    }

    #[test]
    fn subtract_rect_no_overlap() {
        let rect = Rectangle::<i32, Logical>::from(((0, 0), (10, 10)));
        let other = Rectangle::from(((10, 0), (5, 5)));
        assert_eq!(rect.subtract_rect(other), vec![rect]);
    }

    #[test]
    fn buffer_size_to_logical() {
        let size = Size::<i32, Buffer>::from((200, 100));
        assert_eq!(size.to_logical(2, Transform::_90), Size::from((50, 100)));
        assert_eq!(size.to_logical(1, Transform::Flipped180), Size::from((200, 100)));
    }

    #[test]
    fn transform_from_wire() {
        assert_eq!(Transform::try_from(5), Ok(Transform::Flipped90));
        assert_eq!(Transform::try_from(8), Err(8));
    }
}
