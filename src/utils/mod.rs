//! Various utilities functions and types

mod geometry;
pub(crate) mod hook;
pub(crate) mod ids;
mod region;
mod serial;
pub mod user_data;

pub use self::geometry::{Buffer, Coordinate, Logical, Point, Rectangle, Size, Transform};
pub use self::hook::HookId;
pub use self::region::{Region, RegionAttributes, RectangleKind};
pub use self::serial::Serial;
