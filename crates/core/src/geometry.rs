//! Balloon and GD&T rendering geometry.
//!
//! Everything here is computed in document space from the persisted record
//! alone. The interactive display and the vector exporter both call into
//! this module and differ only in the [`Surface`] constants.

use crate::annotation::{AnnotationRef, BalloonRecord, Color, GdtRecord, StyleColors};
use crate::transform::PageCoordinate;

/// Smallest label size either surface will produce, in points.
pub const MIN_LABEL_FONT_SIZE: f64 = 4.0;

/// Shafts shorter than this get no arrowhead.
pub const MIN_ARROW_SHAFT: f64 = 1.0;

/// Width of one character relative to the font size (monospace estimate).
pub const CHAR_WIDTH_FACTOR: f64 = 0.6;

/// Baseline drop below the visual centre relative to the font size.
pub const BASELINE_DROP_FACTOR: f64 = 0.35;

/// Where the geometry will be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Display,
    Export,
}

impl Surface {
    /// Auto label size as a fraction of the circle radius.
    pub fn label_scale(self) -> f64 {
        match self {
            Surface::Display => 0.9,
            Surface::Export => 1.1,
        }
    }

    pub fn arrowhead(self) -> ArrowheadSpec {
        match self {
            Surface::Display => ArrowheadSpec { size: 6.0, half_width_ratio: 0.5 },
            Surface::Export => ArrowheadSpec { size: 5.0, half_width_ratio: 0.45 },
        }
    }

    /// Stroke width for circles and leader lines, in points.
    pub fn stroke_width(self) -> f64 {
        match self {
            Surface::Display => 2.0,
            Surface::Export => 1.5,
        }
    }
}

/// Arrowhead proportions: wing points sit `size` back from the tip and
/// `size * half_width_ratio` to either side of the shaft.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrowheadSpec {
    pub size: f64,
    pub half_width_ratio: f64,
}

/// Point on the circle boundary along the centre-to-target ray.
///
/// When target and centre coincide the direction is undefined; the point
/// directly above the centre is returned instead.
pub fn leader_edge_point(center: PageCoordinate, target: PageCoordinate, radius: f64) -> PageCoordinate {
    let dx = target.x - center.x;
    let dy = target.y - center.y;
    let distance = dx.hypot(dy);
    if distance > 0.0 {
        center.offset(dx / distance * radius, dy / distance * radius)
    } else {
        center.offset(0.0, radius)
    }
}

/// Filled arrowhead triangle `[tip, left wing, right wing]` for a shaft
/// running from `shaft_from` to `shaft_to`, or `None` for a too-short shaft.
pub fn arrowhead(
    shaft_from: PageCoordinate,
    shaft_to: PageCoordinate,
    spec: ArrowheadSpec,
) -> Option<[PageCoordinate; 3]> {
    let dx = shaft_to.x - shaft_from.x;
    let dy = shaft_to.y - shaft_from.y;
    let length = dx.hypot(dy);
    if !(length >= MIN_ARROW_SHAFT) {
        return None;
    }

    let (ux, uy) = (dx / length, dy / length);
    let (px, py) = (-uy, ux);
    let back = shaft_to.offset(-spec.size * ux, -spec.size * uy);
    let half = spec.size * spec.half_width_ratio;

    Some([
        shaft_to,
        back.offset(half * px, half * py),
        back.offset(-half * px, -half * py),
    ])
}

/// Label size for a balloon on the given surface.
pub fn label_font_size(balloon: &BalloonRecord, surface: Surface) -> f64 {
    if balloon.font_size_override > 0.0 {
        balloon.font_size_override
    } else {
        (balloon.radius() * surface.label_scale()).max(MIN_LABEL_FONT_SIZE)
    }
}

/// Crude text width estimate; no font metrics are available at export time.
pub fn estimated_text_width(text: &str, font_size: f64) -> f64 {
    CHAR_WIDTH_FACTOR * font_size * text.chars().count() as f64
}

/// Baseline origin that visually centres `text` on `center`.
pub fn centered_baseline(center: PageCoordinate, text: &str, font_size: f64) -> PageCoordinate {
    let width = estimated_text_width(text, font_size);
    center.offset(-width / 2.0, -font_size * BASELINE_DROP_FACTOR)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelGeometry {
    pub text: String,
    pub font_size: f64,
    pub baseline: PageCoordinate,
    pub width: f64,
    pub color: Color,
}

impl LabelGeometry {
    fn centered(text: String, center: PageCoordinate, font_size: f64, color: Color) -> Self {
        let width = estimated_text_width(&text, font_size);
        let baseline = centered_baseline(center, &text, font_size);
        Self { text, font_size, baseline, width, color }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderGeometry {
    /// Start of the line, on the circle boundary
    pub start: PageCoordinate,
    /// The target point
    pub end: PageCoordinate,
    pub arrowhead: Option<[PageCoordinate; 3]>,
}

/// Everything needed to draw one balloon.
#[derive(Debug, Clone, PartialEq)]
pub struct BalloonGeometry {
    pub center: PageCoordinate,
    pub radius: f64,
    pub stroke_width: f64,
    pub colors: StyleColors,
    pub leader: Option<LeaderGeometry>,
    pub label: LabelGeometry,
}

impl BalloonGeometry {
    pub fn compute(balloon: &BalloonRecord, surface: Surface) -> Self {
        let radius = balloon.radius();
        let colors = balloon.style.colors();
        let center = balloon.center_point;

        let leader = colors.draw_leader.then(|| {
            let start = leader_edge_point(center, balloon.target_point, radius);
            LeaderGeometry {
                start,
                end: balloon.target_point,
                arrowhead: arrowhead(start, balloon.target_point, surface.arrowhead()),
            }
        });

        let font_size = label_font_size(balloon, surface);
        let label = LabelGeometry::centered(balloon.label(), center, font_size, colors.label);

        Self { center, radius, stroke_width: surface.stroke_width(), colors, leader, label }
    }
}

/// A GD&T label box centred on its position.
#[derive(Debug, Clone, PartialEq)]
pub struct GdtGeometry {
    /// Bottom-left corner of the box
    pub origin: PageCoordinate,
    pub width: f64,
    pub height: f64,
    pub fill: Color,
    pub stroke: Color,
    pub label: LabelGeometry,
}

impl GdtGeometry {
    /// Horizontal padding around the symbol text, relative to the font size.
    const PADDING_FACTOR: f64 = 0.3;
    /// Box height relative to the font size.
    const HEIGHT_FACTOR: f64 = 1.4;

    pub fn compute(gdt: &GdtRecord) -> Self {
        let font_size = gdt.font_size.max(MIN_LABEL_FONT_SIZE);
        let label = LabelGeometry::centered(gdt.symbol.clone(), gdt.position, font_size, Color::DARK);
        let width = label.width + 2.0 * Self::PADDING_FACTOR * font_size;
        let height = Self::HEIGHT_FACTOR * font_size;
        let origin = gdt.position.offset(-width / 2.0, -height / 2.0);

        Self { origin, width, height, fill: Color::LIGHT, stroke: Color::DARK, label }
    }

    pub fn contains(&self, point: PageCoordinate) -> bool {
        point.x >= self.origin.x
            && point.x <= self.origin.x + self.width
            && point.y >= self.origin.y
            && point.y <= self.origin.y + self.height
    }
}

/// Geometry for either annotation kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationGeometry {
    Balloon(BalloonGeometry),
    Gdt(GdtGeometry),
}

impl AnnotationRef<'_> {
    pub fn geometry(&self, surface: Surface) -> AnnotationGeometry {
        match self {
            AnnotationRef::Balloon(balloon) => {
                AnnotationGeometry::Balloon(BalloonGeometry::compute(balloon, surface))
            }
            AnnotationRef::Gdt(gdt) => AnnotationGeometry::Gdt(GdtGeometry::compute(gdt)),
        }
    }
}
