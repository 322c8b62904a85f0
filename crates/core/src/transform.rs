//! Coordinate transforms between document space, canvas space, and the
//! rotated working space used while a page is displayed turned.
//!
//! Document space follows the PDF convention:
//! - Origin (0, 0) at bottom-left of page
//! - X increases to the right
//! - Y increases upward
//! - Units are in points (1/72 inch)
//!
//! Canvas space has its origin at the top-left with Y increasing downward.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point in document space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PageCoordinate {
    pub x: f64,
    pub y: f64,
}

impl PageCoordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &PageCoordinate) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Point in canvas space (top-left origin, Y down).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

impl CanvasPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &CanvasPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Flips a document point into canvas space for a page of `page_height`.
pub fn to_canvas(point: PageCoordinate, page_height: f64) -> CanvasPoint {
    CanvasPoint::new(point.x, page_height - point.y)
}

/// Inverse of [`to_canvas`]; the flip is its own inverse.
pub fn to_document(point: CanvasPoint, page_height: f64) -> PageCoordinate {
    PageCoordinate::new(point.x, page_height - point.y)
}

/// Quarter-turn page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Accepts any multiple of 90, negative values included.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Rotation that undoes this one: `(360 - r) mod 360`.
    pub fn inverse(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg0,
            Self::Deg90 => Self::Deg270,
            Self::Deg180 => Self::Deg180,
            Self::Deg270 => Self::Deg90,
        }
    }

    pub fn clockwise(self) -> Self {
        self.compose(Self::Deg90)
    }

    pub fn counter_clockwise(self) -> Self {
        self.compose(Self::Deg270)
    }

    pub fn compose(self, other: Self) -> Self {
        match (self.degrees() + other.degrees()) % 360 {
            90 => Self::Deg90,
            180 => Self::Deg180,
            270 => Self::Deg270,
            _ => Self::Deg0,
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Page extents as seen while the page is displayed with `rotation` applied.
pub fn displayed_page_size(width: f64, height: f64, rotation: Rotation) -> (f64, f64) {
    if rotation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    }
}

/// Re-projects a point from the rotated working space into the stored page
/// space of a `width x height` page.
pub fn rotate_point(point: PageCoordinate, rotation: Rotation, width: f64, height: f64) -> PageCoordinate {
    let PageCoordinate { x, y } = point;
    match rotation {
        Rotation::Deg0 => PageCoordinate::new(x, y),
        Rotation::Deg90 => PageCoordinate::new(width - y, x),
        Rotation::Deg180 => PageCoordinate::new(width - x, height - y),
        Rotation::Deg270 => PageCoordinate::new(y, height - x),
    }
}

/// The re-projection for one page: rotation plus the page's unrotated size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationTransform {
    pub rotation: Rotation,
    pub width: f64,
    pub height: f64,
}

impl RotationTransform {
    pub fn new(rotation: Rotation, width: f64, height: f64) -> Self {
        Self { rotation, width, height }
    }

    pub fn apply(&self, point: PageCoordinate) -> PageCoordinate {
        rotate_point(point, self.rotation, self.width, self.height)
    }

    /// Linear part `[a, b, c, d]` of [`apply`](Self::apply), in PDF matrix
    /// order: a direction `(x, y)` maps to `(a*x + c*y, b*x + d*y)`.
    pub fn linear(&self) -> [f64; 4] {
        match self.rotation {
            Rotation::Deg0 => [1.0, 0.0, 0.0, 1.0],
            Rotation::Deg90 => [0.0, 1.0, -1.0, 0.0],
            Rotation::Deg180 => [-1.0, 0.0, 0.0, -1.0],
            Rotation::Deg270 => [0.0, -1.0, 1.0, 0.0],
        }
    }

    /// The transform that maps [`apply`](Self::apply)'s output back.
    ///
    /// It uses the inverse rotation over the frame the first transform
    /// produced, whose extents are swapped for quarter turns.
    pub fn inverse(&self) -> Self {
        let (width, height) = displayed_page_size(self.width, self.height, self.rotation);
        Self { rotation: self.rotation.inverse(), width, height }
    }
}

/// Canvas mapping for an interactive view: Y-flip followed by uniform zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Height of the page as displayed (after any rotation), in points
    pub page_height: f64,
    pub zoom: f64,
}

impl ViewTransform {
    pub fn new(page_height: f64) -> Self {
        Self { page_height, zoom: 1.0 }
    }

    /// View for a page of the given stored size shown with `rotation`.
    pub fn for_page(width: f64, height: f64, rotation: Rotation, zoom: f64) -> Self {
        let (_, page_height) = displayed_page_size(width, height, rotation);
        Self::new(page_height).with_zoom(zoom)
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn to_canvas(&self, point: PageCoordinate) -> CanvasPoint {
        let flipped = to_canvas(point, self.page_height);
        CanvasPoint::new(flipped.x * self.zoom, flipped.y * self.zoom)
    }

    pub fn to_document(&self, point: CanvasPoint) -> PageCoordinate {
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        to_document(CanvasPoint::new(point.x / zoom, point.y / zoom), self.page_height)
    }

    /// Converts a length in document units to canvas units.
    pub fn scale(&self, length: f64) -> f64 {
        length * self.zoom
    }
}

/// Per-page rotation chosen by the user, relative to the stored orientation.
///
/// Pages without an entry are unrotated. Lives for the session only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRotationMap {
    rotations: BTreeMap<u32, Rotation>,
}

impl PageRotationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page: u32) -> Rotation {
        self.rotations.get(&page).copied().unwrap_or_default()
    }

    pub fn set(&mut self, page: u32, rotation: Rotation) {
        if rotation == Rotation::Deg0 {
            self.rotations.remove(&page);
        } else {
            self.rotations.insert(page, rotation);
        }
    }

    pub fn rotate_cw(&mut self, page: u32) -> Rotation {
        let rotation = self.get(page).clockwise();
        self.set(page, rotation);
        rotation
    }

    pub fn rotate_ccw(&mut self, page: u32) -> Rotation {
        let rotation = self.get(page).counter_clockwise();
        self.set(page, rotation);
        rotation
    }

    pub fn clear(&mut self) {
        self.rotations.clear();
    }

    /// Pages with a non-zero rotation, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Rotation)> + '_ {
        self.rotations.iter().map(|(&page, &rotation)| (page, rotation))
    }
}

impl FromIterator<(u32, Rotation)> for PageRotationMap {
    fn from_iter<I: IntoIterator<Item = (u32, Rotation)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (page, rotation) in iter {
            map.set(page, rotation);
        }
        map
    }
}
