use smallvec::SmallVec;

use super::geometry::{Logical, Point, Rectangle, Size, Transform};

/// Kind of a rectangle part of a client region
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RectangleKind {
    /// This rectangle should be added to the region
    Add,
    /// The intersection of this rectangle with the region should
    /// be removed from the region
    Subtract,
}

/// Description of the contents of a client region
///
/// A region is defined as an union and difference of rectangle.
///
/// This struct contains an ordered `Vec` containing the rectangles defining
/// a region. They should be added or subtracted in this order to compute the
/// actual contents of the region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionAttributes {
    /// List of rectangle part of this region
    pub rects: Vec<(RectangleKind, Rectangle<i32, Logical>)>,
}

impl RegionAttributes {
    /// Checks whether given point is inside the region.
    pub fn contains<P: Into<Point<i32, Logical>>>(&self, point: P) -> bool {
        let point: Point<i32, Logical> = point.into();
        let mut contains = false;
        for (kind, rect) in &self.rects {
            if rect.contains(point) {
                match kind {
                    RectangleKind::Add => contains = true,
                    RectangleKind::Subtract => contains = false,
                }
            }
        }
        contains
    }

    /// Flatten the ordered rectangle list into a [`Region`]
    pub fn to_region(&self) -> Region<Logical> {
        self.rects
            .iter()
            .fold(Region::new(), |mut region, (kind, rect)| {
                match kind {
                    RectangleKind::Add => region.add_rect(*rect),
                    RectangleKind::Subtract => region.subtract_rect(*rect),
                }
                region
            })
    }
}

/// A set of pixels, stored as non-overlapping integer rectangles
pub struct Region<Kind> {
    rects: SmallVec<[Rectangle<i32, Kind>; 4]>,
}

impl<Kind> std::fmt::Debug for Region<Kind> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.rects.iter()).finish()
    }
}

impl<Kind> Clone for Region<Kind> {
    fn clone(&self) -> Self {
        Region {
            rects: self.rects.clone(),
        }
    }
}

impl<Kind> Default for Region<Kind> {
    fn default() -> Self {
        Region {
            rects: SmallVec::new(),
        }
    }
}

impl<Kind> PartialEq for Region<Kind> {
    /// Two regions are equal when they cover the same pixels
    fn eq(&self, other: &Self) -> bool {
        self.area() == other.area() && self.rects.iter().all(|r| other.contains_rect(*r))
    }
}

impl<Kind> From<Rectangle<i32, Kind>> for Region<Kind> {
    fn from(rect: Rectangle<i32, Kind>) -> Self {
        let mut region = Region::new();
        region.add_rect(rect);
        region
    }
}

impl<Kind> Region<Kind> {
    /// An empty region
    pub fn new() -> Self {
        Region::default()
    }

    /// Whether this region covers no pixel
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The non-overlapping rectangles making up this region
    pub fn rects(&self) -> &[Rectangle<i32, Kind>] {
        &self.rects
    }

    /// Number of pixels covered by this region
    pub fn area(&self) -> i64 {
        self.rects
            .iter()
            .map(|r| r.size.w as i64 * r.size.h as i64)
            .sum()
    }

    /// Remove every rectangle from this region
    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Smallest rectangle containing the whole region
    pub fn extents(&self) -> Rectangle<i32, Kind> {
        let mut iter = self.rects.iter();
        let Some(first) = iter.next() else {
            return Rectangle::default();
        };
        let (mut min, mut max) = (first.loc, first.bottom_right());
        for rect in iter {
            let br = rect.bottom_right();
            min = (min.x.min(rect.loc.x), min.y.min(rect.loc.y)).into();
            max = (max.x.max(br.x), max.y.max(br.y)).into();
        }
        Rectangle::from_extremities(min, max)
    }

    /// Add a rectangle to the region
    pub fn add_rect(&mut self, rect: Rectangle<i32, Kind>) {
        if rect.is_empty() {
            return;
        }
        let mut pieces: SmallVec<[Rectangle<i32, Kind>; 4]> = smallvec::smallvec![rect];
        for existing in &self.rects {
            if pieces.is_empty() {
                return;
            }
            pieces = pieces
                .into_iter()
                .flat_map(|piece| piece.subtract_rect(*existing))
                .collect();
        }
        self.rects.extend(pieces);
    }

    /// Remove the pixels of a rectangle from the region
    pub fn subtract_rect(&mut self, rect: Rectangle<i32, Kind>) {
        if rect.is_empty() {
            return;
        }
        self.rects = std::mem::take(&mut self.rects)
            .into_iter()
            .flat_map(|existing| existing.subtract_rect(rect))
            .collect();
    }

    /// Add every pixel of `other` to this region
    pub fn union(&mut self, other: &Region<Kind>) {
        for rect in &other.rects {
            self.add_rect(*rect);
        }
    }

    /// Keep only the pixels inside `rect`
    pub fn intersect_rect(&mut self, rect: Rectangle<i32, Kind>) {
        self.rects = std::mem::take(&mut self.rects)
            .into_iter()
            .filter_map(|existing| existing.intersection(rect))
            .collect();
    }


    /// Move every rectangle of the region by an offset
    pub fn translate(&mut self, offset: Point<i32, Kind>) {
        for rect in &mut self.rects {
            *rect = rect.translate(offset);
        }
    }

    /// Multiply the region by an integer scale
    pub fn upscale(&mut self, scale: i32) {
        for rect in &mut self.rects {
            *rect = rect.upscale(scale);
        }
    }

    /// Scale the region by independent horizontal and vertical factors
    ///
    /// Every rectangle is rounded outwards, so no scaled pixel is lost.
    pub fn scale_xy(&mut self, sx: f64, sy: f64) {
        let scaled: SmallVec<[Rectangle<i32, Kind>; 4]> = self
            .rects
            .iter()
            .map(|rect| {
                let rect = rect.to_f64();
                Rectangle::<f64, Kind>::new(
                    (rect.loc.x * sx, rect.loc.y * sy).into(),
                    (rect.size.w * sx, rect.size.h * sy).into(),
                )
                .to_i32_up()
            })
            .collect();
        self.rects.clear();
        for rect in scaled {
            self.add_rect(rect);
        }
    }

    /// Apply a transform to the region, inside an area of the given size
    pub fn transform(&mut self, transform: Transform, area: Size<i32, Kind>) {
        for rect in &mut self.rects {
            *rect = transform.transform_rect_in(*rect, &area);
        }
    }

    /// Whether the given point is part of the region
    pub fn contains<P: Into<Point<i32, Kind>>>(&self, point: P) -> bool {
        let point = point.into();
        self.rects.iter().any(|rect| rect.contains(point))
    }

    /// Whether every pixel of `rect` is part of the region
    pub fn contains_rect(&self, rect: Rectangle<i32, Kind>) -> bool {
        let mut rest: SmallVec<[Rectangle<i32, Kind>; 4]> = smallvec::smallvec![rect];
        for mine in &self.rects {
            rest = rest
                .into_iter()
                .flat_map(|piece| piece.subtract_rect(*mine))
                .collect();
            if rest.is_empty() {
                return true;
            }
        }
        rest.iter().all(|r| r.is_empty())
    }

    /// Reinterpret the region in another coordinate space
    pub fn cast<K2>(&self) -> Region<K2> {
        Region {
            rects: self.rects.iter().map(|r| r.cast::<K2>()).collect(),
        }
    }
}
