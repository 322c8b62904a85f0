//! Annotation data model
//!
//! Balloons (numbered callouts with an optional leader line) and GD&T labels.
//! All coordinates are stored in page-local document space; the registry is
//! the only owner of these records.

use crate::transform::PageCoordinate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an annotation
///
/// Assigned at creation, never reused, persists in session files.
pub type AnnotationId = uuid::Uuid;

/// Diameter given to newly placed balloons, in points.
pub const DEFAULT_DIAMETER: f64 = 36.0;

/// Diameter assumed for session records written before the field existed.
pub const LEGACY_DIAMETER: f64 = 20.0;

/// Font size assumed for GD&T records that omit it.
pub const DEFAULT_GDT_FONT_SIZE: f64 = 16.0;

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Convert to normalized RGBA values (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }
}

/// Palette shared by the display layout and the exporter.
impl Color {
    /// Circle outlines and labels on light fills
    pub const DARK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    /// Labels on accent fills
    pub const LIGHT: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    /// Leader lines, arrowheads, and the red balloon fill
    pub const ACCENT: Color = Color { r: 204, g: 0, b: 0, a: 255 };
}

/// Balloon visual style.
///
/// Closed set. Unknown names parse to [`BalloonStyle::Default`] so a renderer
/// or exporter never fails on a style it does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BalloonStyle {
    #[default]
    Default,
    Red,
    Outline,
    NoArrow,
}

impl BalloonStyle {
    pub const ALL: [BalloonStyle; 4] =
        [BalloonStyle::Default, BalloonStyle::Red, BalloonStyle::Outline, BalloonStyle::NoArrow];

    pub fn as_str(self) -> &'static str {
        match self {
            BalloonStyle::Default => "default",
            BalloonStyle::Red => "red",
            BalloonStyle::Outline => "outline",
            BalloonStyle::NoArrow => "no_arrow",
        }
    }

    /// Parses a style name, falling back to `Default` for anything unknown.
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "default" => BalloonStyle::Default,
            "red" => BalloonStyle::Red,
            "outline" => BalloonStyle::Outline,
            "no_arrow" => BalloonStyle::NoArrow,
            other => {
                log::warn!("unknown balloon style {other:?}, using \"default\"");
                BalloonStyle::Default
            }
        }
    }

    pub fn has_leader(self) -> bool {
        !matches!(self, BalloonStyle::NoArrow)
    }

    /// Resolves the color scheme. This is the single style table used by
    /// both the display layout and the vector exporter.
    pub fn colors(self) -> StyleColors {
        match self {
            BalloonStyle::Default | BalloonStyle::Outline => StyleColors {
                draw_leader: true,
                circle_fill: None,
                circle_stroke: Color::DARK,
                label: Color::DARK,
                leader: Color::ACCENT,
            },
            BalloonStyle::Red => StyleColors {
                draw_leader: true,
                circle_fill: Some(Color::ACCENT),
                circle_stroke: Color::DARK,
                label: Color::LIGHT,
                leader: Color::ACCENT,
            },
            BalloonStyle::NoArrow => StyleColors {
                draw_leader: false,
                circle_fill: None,
                circle_stroke: Color::ACCENT,
                label: Color::ACCENT,
                leader: Color::ACCENT,
            },
        }
    }
}

impl fmt::Display for BalloonStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for BalloonStyle {
    fn from(value: String) -> Self {
        BalloonStyle::parse(&value)
    }
}

impl From<&str> for BalloonStyle {
    fn from(value: &str) -> Self {
        BalloonStyle::parse(value)
    }
}

impl Serialize for BalloonStyle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BalloonStyle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(BalloonStyle::parse(&name))
    }
}

/// Colors and leader visibility derived from a [`BalloonStyle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleColors {
    pub draw_leader: bool,
    /// `None` leaves the circle interior transparent
    pub circle_fill: Option<Color>,
    pub circle_stroke: Color,
    pub label: Color,
    /// Leader line and arrowhead
    pub leader: Color,
}

/// A numbered balloon callout.
///
/// `id` and `page` are fixed at creation; everything else may be edited
/// through the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct BalloonRecord {
    id: AnnotationId,
    page: u32,
    pub number: u32,
    /// Where the leader line points (the feature being called out)
    pub target_point: PageCoordinate,
    /// Centre of the balloon circle
    pub center_point: PageCoordinate,
    /// Circle diameter in points, always positive
    pub diameter: f64,
    pub style: BalloonStyle,
    /// Fixed label size in points; `0.0` sizes the label from the radius
    pub font_size_override: f64,
    pub description: String,
}

impl BalloonRecord {
    /// Create a balloon with a freshly generated ID.
    pub fn new(
        number: u32,
        page: u32,
        target_point: PageCoordinate,
        center_point: PageCoordinate,
    ) -> Self {
        Self::with_id(AnnotationId::new_v4(), number, page, target_point, center_point)
    }

    /// Create a balloon with a specific ID (for deserialization).
    pub fn with_id(
        id: AnnotationId,
        number: u32,
        page: u32,
        target_point: PageCoordinate,
        center_point: PageCoordinate,
    ) -> Self {
        Self {
            id,
            page,
            number,
            target_point,
            center_point,
            diameter: DEFAULT_DIAMETER,
            style: BalloonStyle::Default,
            font_size_override: 0.0,
            description: String::new(),
        }
    }

    pub fn with_diameter(mut self, diameter: f64) -> Self {
        self.diameter = diameter;
        self
    }

    pub fn with_style(mut self, style: BalloonStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_font_size_override(mut self, size: f64) -> Self {
        self.font_size_override = size;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    pub fn label(&self) -> String {
        self.number.to_string()
    }

    pub(crate) fn attributes(&self) -> BalloonAttributes {
        BalloonAttributes {
            number: self.number,
            description: self.description.clone(),
            diameter: self.diameter,
            style: self.style,
            font_size_override: self.font_size_override,
        }
    }

    pub(crate) fn set_attributes(&mut self, attributes: &BalloonAttributes) {
        self.number = attributes.number;
        self.description.clone_from(&attributes.description);
        self.diameter = attributes.diameter;
        self.style = attributes.style;
        self.font_size_override = attributes.font_size_override;
    }

    pub(crate) fn placement(&self) -> Placement {
        Placement { center: self.center_point, target: self.target_point }
    }
}

/// Editable non-positional fields of a balloon, captured before and after an edit.
#[derive(Debug, Clone, PartialEq)]
pub struct BalloonAttributes {
    pub number: u32,
    pub description: String,
    pub diameter: f64,
    pub style: BalloonStyle,
    pub font_size_override: f64,
}

/// Circle centre and leader target of a balloon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub center: PageCoordinate,
    pub target: PageCoordinate,
}

/// A GD&T symbol label. Drawn as a filled box; no leader, no number.
#[derive(Debug, Clone, PartialEq)]
pub struct GdtRecord {
    id: AnnotationId,
    page: u32,
    pub symbol: String,
    pub position: PageCoordinate,
    pub font_size: f64,
}

impl GdtRecord {
    pub fn new(symbol: impl Into<String>, page: u32, position: PageCoordinate) -> Self {
        Self::with_id(AnnotationId::new_v4(), symbol, page, position)
    }

    pub fn with_id(
        id: AnnotationId,
        symbol: impl Into<String>,
        page: u32,
        position: PageCoordinate,
    ) -> Self {
        Self { id, page, symbol: symbol.into(), position, font_size: DEFAULT_GDT_FONT_SIZE }
    }

    pub fn with_font_size(mut self, font_size: f64) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn page(&self) -> u32 {
        self.page
    }
}

/// Borrowed view over either annotation kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnnotationRef<'a> {
    Balloon(&'a BalloonRecord),
    Gdt(&'a GdtRecord),
}

impl AnnotationRef<'_> {
    pub fn id(&self) -> AnnotationId {
        match self {
            AnnotationRef::Balloon(balloon) => balloon.id(),
            AnnotationRef::Gdt(gdt) => gdt.id(),
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            AnnotationRef::Balloon(balloon) => balloon.page(),
            AnnotationRef::Gdt(gdt) => gdt.page(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_normalization() {
        let (r, g, b, a) = Color::ACCENT.to_normalized();
        assert!((r - 0.8).abs() < 0.001);
        assert_eq!(g, 0.0);
        assert_eq!(b, 0.0);
        assert_eq!(a, 1.0);
    }

    #[test]
    fn style_names_round_trip() {
        for style in BalloonStyle::ALL {
            assert_eq!(BalloonStyle::parse(style.as_str()), style);
        }
    }

    #[test]
    fn unknown_style_fails_closed_to_default() {
        assert_eq!(BalloonStyle::parse("sparkly"), BalloonStyle::Default);
        assert_eq!(BalloonStyle::parse(""), BalloonStyle::Default);

        let style: BalloonStyle = serde_json::from_str("\"triangle\"").expect("any string parses");
        assert_eq!(style, BalloonStyle::Default);
    }

    #[test]
    fn style_table_matches_reference() {
        let default = BalloonStyle::Default.colors();
        assert!(default.draw_leader);
        assert_eq!(default.circle_fill, None);
        assert_eq!(default.circle_stroke, Color::DARK);
        assert_eq!(default.label, Color::DARK);
        assert_eq!(default.leader, Color::ACCENT);

        let red = BalloonStyle::Red.colors();
        assert!(red.draw_leader);
        assert_eq!(red.circle_fill, Some(Color::ACCENT));
        assert_eq!(red.label, Color::LIGHT);

        assert_eq!(BalloonStyle::Outline.colors(), default);

        let no_arrow = BalloonStyle::NoArrow.colors();
        assert!(!no_arrow.draw_leader);
        assert_eq!(no_arrow.circle_fill, None);
        assert_eq!(no_arrow.circle_stroke, Color::ACCENT);
        assert_eq!(no_arrow.label, Color::ACCENT);
        assert!(!BalloonStyle::NoArrow.has_leader());
    }

    #[test]
    fn balloon_builder_keeps_identity() {
        let balloon = BalloonRecord::new(
            3,
            1,
            PageCoordinate::new(10.0, 10.0),
            PageCoordinate::new(50.0, 50.0),
        )
        .with_diameter(24.0)
        .with_style(BalloonStyle::Red)
        .with_description("Ø12 ±0.1");

        assert_eq!(balloon.page(), 1);
        assert_eq!(balloon.radius(), 12.0);
        assert_eq!(balloon.label(), "3");
        assert_eq!(balloon.style, BalloonStyle::Red);

        let mut copy = balloon.clone();
        copy.number = 9;
        assert_eq!(copy.id(), balloon.id());
    }
}
