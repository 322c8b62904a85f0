//! Canvas-space layout for the interactive display.
//!
//! The GUI paints and hit-tests these values; it never computes balloon
//! geometry itself. Layouts are rebuilt from the registry on every change.

use crate::annotation::{AnnotationId, AnnotationRef, Color, StyleColors};
use crate::geometry::{AnnotationGeometry, LabelGeometry, Surface};
use crate::transform::{CanvasPoint, PageCoordinate, ViewTransform};

/// Default pick tolerance around leader lines, in canvas pixels.
pub const DEFAULT_HIT_TOLERANCE: f64 = 4.0;

/// Axis-aligned rectangle in canvas space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CanvasRect {
    pub fn centered(center: CanvasPoint, width: f64, height: f64) -> Self {
        Self { x: center.x - width / 2.0, y: center.y - height / 2.0, width, height }
    }

    pub fn contains(&self, point: CanvasPoint, tolerance: f64) -> bool {
        point.x >= self.x - tolerance
            && point.x <= self.x + self.width + tolerance
            && point.y >= self.y - tolerance
            && point.y <= self.y + self.height + tolerance
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelLayout {
    pub text: String,
    pub font_size: f64,
    pub rect: CanvasRect,
    pub color: Color,
}

impl LabelLayout {
    fn project(label: &LabelGeometry, center: PageCoordinate, view: &ViewTransform) -> Self {
        Self {
            text: label.text.clone(),
            font_size: view.scale(label.font_size),
            rect: CanvasRect::centered(
                view.to_canvas(center),
                view.scale(label.width),
                view.scale(label.font_size),
            ),
            color: label.color,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalloonLayout {
    pub id: AnnotationId,
    pub center: CanvasPoint,
    pub radius: f64,
    pub stroke_width: f64,
    pub colors: StyleColors,
    /// Circle edge to target
    pub leader: Option<(CanvasPoint, CanvasPoint)>,
    pub arrowhead: Option<[CanvasPoint; 3]>,
    pub label: LabelLayout,
}

impl BalloonLayout {
    /// Inside the circle, or within `tolerance` of the leader line.
    pub fn hit_test(&self, point: CanvasPoint, tolerance: f64) -> bool {
        if point.distance_to(&self.center) <= self.radius + tolerance {
            return true;
        }
        self.leader
            .is_some_and(|(start, end)| point_near_line_segment(point, start, end, tolerance))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GdtLayout {
    pub id: AnnotationId,
    pub rect: CanvasRect,
    pub fill: Color,
    pub stroke: Color,
    pub label: LabelLayout,
}

/// One paintable annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationLayout {
    Balloon(BalloonLayout),
    Gdt(GdtLayout),
}

impl AnnotationLayout {
    pub fn build(annotation: AnnotationRef<'_>, view: &ViewTransform) -> Self {
        let id = annotation.id();
        match annotation.geometry(Surface::Display) {
            AnnotationGeometry::Balloon(geometry) => {
                let leader = geometry.leader.as_ref();
                AnnotationLayout::Balloon(BalloonLayout {
                    id,
                    center: view.to_canvas(geometry.center),
                    radius: view.scale(geometry.radius),
                    stroke_width: geometry.stroke_width,
                    colors: geometry.colors,
                    leader: leader.map(|l| (view.to_canvas(l.start), view.to_canvas(l.end))),
                    arrowhead: leader
                        .and_then(|l| l.arrowhead)
                        .map(|triangle| triangle.map(|p| view.to_canvas(p))),
                    label: LabelLayout::project(&geometry.label, geometry.center, view),
                })
            }
            AnnotationGeometry::Gdt(geometry) => {
                let center = geometry.origin.offset(geometry.width / 2.0, geometry.height / 2.0);
                AnnotationLayout::Gdt(GdtLayout {
                    id,
                    rect: CanvasRect::centered(
                        view.to_canvas(center),
                        view.scale(geometry.width),
                        view.scale(geometry.height),
                    ),
                    fill: geometry.fill,
                    stroke: geometry.stroke,
                    label: LabelLayout::project(&geometry.label, center, view),
                })
            }
        }
    }

    pub fn id(&self) -> AnnotationId {
        match self {
            AnnotationLayout::Balloon(balloon) => balloon.id,
            AnnotationLayout::Gdt(gdt) => gdt.id,
        }
    }

    pub fn hit_test(&self, point: CanvasPoint, tolerance: f64) -> bool {
        match self {
            AnnotationLayout::Balloon(balloon) => balloon.hit_test(point, tolerance),
            AnnotationLayout::Gdt(gdt) => gdt.rect.contains(point, tolerance),
        }
    }
}

/// Everything drawn on one page, in paint order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageLayout {
    pub items: Vec<AnnotationLayout>,
}

impl PageLayout {
    pub fn build<'a>(annotations: impl IntoIterator<Item = AnnotationRef<'a>>, view: &ViewTransform) -> Self {
        Self {
            items: annotations
                .into_iter()
                .map(|annotation| AnnotationLayout::build(annotation, view))
                .collect(),
        }
    }

    /// Topmost annotation under `point`, if any.
    pub fn hit_test(&self, point: CanvasPoint, tolerance: f64) -> Option<AnnotationId> {
        self.items
            .iter()
            .rev()
            .find(|item| item.hit_test(point, tolerance))
            .map(AnnotationLayout::id)
    }
}

fn point_near_line_segment(point: CanvasPoint, start: CanvasPoint, end: CanvasPoint, tolerance: f64) -> bool {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-9 {
        return point.distance_to(&start) <= tolerance;
    }

    let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq).clamp(0.0, 1.0);
    let closest = CanvasPoint::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&closest) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{BalloonRecord, BalloonStyle, GdtRecord};
    use crate::transform::Rotation;

    fn view() -> ViewTransform {
        ViewTransform::for_page(612.0, 792.0, Rotation::Deg0, 1.0)
    }

    fn balloon() -> BalloonRecord {
        BalloonRecord::new(5, 0, PageCoordinate::new(100.0, 700.0), PageCoordinate::new(140.0, 740.0))
    }

    #[test]
    fn balloon_layout_is_flipped_into_canvas() {
        let record = balloon();
        let layout = AnnotationLayout::build(AnnotationRef::Balloon(&record), &view());
        let AnnotationLayout::Balloon(layout) = layout else {
            panic!("expected balloon layout");
        };

        assert_eq!(layout.center, CanvasPoint::new(140.0, 52.0));
        assert_eq!(layout.radius, 18.0);
        let (start, end) = layout.leader.expect("default style has a leader");
        assert_eq!(end, CanvasPoint::new(100.0, 92.0));
        assert!((start.distance_to(&layout.center) - 18.0).abs() < 1e-9);
        assert!(layout.arrowhead.is_some());
        assert_eq!(layout.label.text, "5");
        assert!((layout.label.font_size - 16.2).abs() < 1e-9);
    }

    #[test]
    fn zoom_scales_every_length() {
        let record = balloon();
        let zoomed = view().with_zoom(2.0);
        let AnnotationLayout::Balloon(layout) = AnnotationLayout::build(AnnotationRef::Balloon(&record), &zoomed) else {
            panic!("expected balloon layout");
        };
        assert_eq!(layout.center, CanvasPoint::new(280.0, 104.0));
        assert_eq!(layout.radius, 36.0);
    }

    #[test]
    fn hit_test_covers_circle_and_leader() {
        let record = balloon();
        let page = PageLayout::build([AnnotationRef::Balloon(&record)], &view());

        assert_eq!(page.hit_test(CanvasPoint::new(140.0, 52.0), DEFAULT_HIT_TOLERANCE), Some(record.id()));
        assert_eq!(page.hit_test(CanvasPoint::new(105.0, 88.0), DEFAULT_HIT_TOLERANCE), Some(record.id()));
        assert_eq!(page.hit_test(CanvasPoint::new(300.0, 300.0), DEFAULT_HIT_TOLERANCE), None);
    }

    #[test]
    fn no_arrow_is_only_hit_inside_circle() {
        let record = balloon().with_style(BalloonStyle::NoArrow);
        let page = PageLayout::build([AnnotationRef::Balloon(&record)], &view());
        assert_eq!(page.hit_test(CanvasPoint::new(105.0, 88.0), DEFAULT_HIT_TOLERANCE), None);
    }

    #[test]
    fn topmost_item_wins() {
        let below = balloon();
        let above = balloon();
        let gdt = GdtRecord::new("⌭", 0, PageCoordinate::new(400.0, 400.0));
        let page = PageLayout::build(
            [AnnotationRef::Balloon(&below), AnnotationRef::Balloon(&above), AnnotationRef::Gdt(&gdt)],
            &view(),
        );

        assert_eq!(page.hit_test(CanvasPoint::new(140.0, 52.0), 0.0), Some(above.id()));
        assert_eq!(page.hit_test(CanvasPoint::new(400.0, 392.0), 0.0), Some(gdt.id()));
    }
}
