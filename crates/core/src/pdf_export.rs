//! Vector PDF export
//!
//! Burns balloons and GD&T labels into a copy of the source PDF as plain
//! page content (paths and text), so the result prints and scales like the
//! drawing itself. Annotation coordinates live in the working space the user
//! edited in; each page's rotation re-projects them onto the stored page.
//!
//! Per page, shapes are drawn before any text so no label is hidden under a
//! later balloon's fill.

use crate::annotation::{AnnotationRef, Color};
use crate::atomic::write_atomic;
use crate::geometry::{AnnotationGeometry, BalloonGeometry, GdtGeometry, LabelGeometry, Surface};
use crate::registry::AnnotationRegistry;
use crate::transform::{PageCoordinate, PageRotationMap, Rotation, RotationTransform};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Resource name of the label font added to every annotated page.
pub const LABEL_FONT_RESOURCE: &str = "BalloonF1";

/// Standard-14 font used for labels; no embedding required.
pub const LABEL_FONT: &str = "Helvetica-Bold";

/// Bezier control distance for a quarter circle.
const KAPPA: f64 = 0.552_284_8;

/// GD&T box outline width, in points.
const GDT_STROKE_WIDTH: f64 = 1.0;

/// Error types for PDF export operations
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot overwrite the source PDF {}; choose a different output path", .0.display())]
    SameFile(PathBuf),

    #[error("encrypted PDFs are not supported")]
    Encrypted,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

impl ExportError {
    /// True for mistakes the user can fix by choosing different input,
    /// as opposed to I/O or document failures.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ExportError::SameFile(_) | ExportError::Encrypted)
    }
}

/// Result type for PDF export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// What an export did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Pages that received an overlay or a new rotation
    pub pages_touched: usize,
    pub balloons_drawn: usize,
    pub gdt_drawn: usize,
    /// Records on pages the document does not have
    pub skipped: usize,
}

/// Export `registry` onto a copy of `source`, written atomically to `output`.
///
/// Fails with [`ExportError::SameFile`] before reading anything when both
/// paths resolve to the same file.
pub fn export_pdf(
    source: &Path,
    output: &Path,
    registry: &AnnotationRegistry,
    rotations: &PageRotationMap,
) -> ExportResult<ExportSummary> {
    if same_file(source, output) {
        return Err(ExportError::SameFile(source.to_path_buf()));
    }

    let bytes = fs::read(source)?;
    if pdf_engine::is_encrypted(&bytes) {
        return Err(ExportError::Encrypted);
    }
    let mut doc = Document::load_mem(&bytes)?;

    let summary = draw_annotations(&mut doc, registry, rotations)?;

    doc.prune_objects();
    doc.compress();
    write_atomic(output, |writer| {
        doc.save_to(writer)?;
        Ok::<(), ExportError>(())
    })?;

    log::info!(
        "exported {} balloons and {} GD&T labels on {} pages to {}",
        summary.balloons_drawn,
        summary.gdt_drawn,
        summary.pages_touched,
        output.display()
    );
    Ok(summary)
}

/// Draw every annotation into `doc` in memory and apply page rotations.
pub fn draw_annotations(
    doc: &mut Document,
    registry: &AnnotationRegistry,
    rotations: &PageRotationMap,
) -> ExportResult<ExportSummary> {
    let page_ids: BTreeMap<u32, ObjectId> =
        doc.get_pages().into_iter().map(|(number, id)| (number - 1, id)).collect();

    let pages: BTreeSet<u32> = registry
        .pages()
        .into_iter()
        .chain(rotations.iter().map(|(page, _)| page))
        .collect();

    let mut summary = ExportSummary::default();
    let mut font_id = None;

    for page in pages {
        let annotations = registry.page_annotations(page);
        let rotation = rotations.get(page);

        let Some(&page_id) = page_ids.get(&page) else {
            if !annotations.is_empty() {
                log::warn!(
                    "skipping {} annotation(s) on page {} (document has {} pages)",
                    annotations.len(),
                    page + 1,
                    page_ids.len()
                );
            }
            summary.skipped += annotations.len();
            continue;
        };

        let info = pdf_engine::page_info(doc, page_id);
        let transform = RotationTransform::new(rotation, info.width_pt, info.height_pt);

        if !annotations.is_empty() {
            let origin = pdf_engine::media_box_origin(doc, page_id);
            let overlay = PageOverlay::build(&annotations, transform, origin);
            summary.balloons_drawn += overlay.balloons;
            summary.gdt_drawn += overlay.gdt;

            let font = *font_id.get_or_insert_with(|| add_label_font(doc));
            let content = overlay.encode()?;
            attach_overlay(doc, page_id, content, font)?;
            log::debug!("page {}: drew {} annotation(s)", page + 1, annotations.len());
        }

        if rotation != Rotation::Deg0 {
            let rotate = (info.rotation + rotation.degrees()) % 360;
            doc.get_object_mut(page_id)
                .and_then(Object::as_dict_mut)?
                .set("Rotate", i64::from(rotate));
            log::debug!("page {}: /Rotate {} -> {}", page + 1, info.rotation, rotate);
        }

        summary.pages_touched += 1;
    }

    Ok(summary)
}

/// True when both paths name the same file. `output` need not exist yet.
fn same_file(source: &Path, output: &Path) -> bool {
    match (source.canonicalize(), canonical_target(output)) {
        (Ok(source), Some(output)) => source == output,
        _ => source == output,
    }
}

fn canonical_target(path: &Path) -> Option<PathBuf> {
    if let Ok(path) = path.canonicalize() {
        return Some(path);
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Some(parent.canonicalize().ok()?.join(path.file_name()?))
}

fn add_label_font(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => LABEL_FONT,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Wrap the page's existing content in `q`/`Q` so its graphics state cannot
/// leak into the overlay, then append the overlay and register the font.
fn attach_overlay(doc: &mut Document, page_id: ObjectId, overlay: Vec<u8>, font_id: ObjectId) -> ExportResult<()> {
    let mut contents = existing_contents(doc, page_id)?;
    let resources = resources_with_font(doc, page_id, font_id);

    let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(dictionary! {}, overlay));
    contents.insert(0, Object::Reference(save_id));
    contents.push(Object::Reference(overlay_id));

    let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
    page.set("Contents", contents);
    page.set("Resources", resources);
    Ok(())
}

fn existing_contents(doc: &Document, page_id: ObjectId) -> ExportResult<Vec<Object>> {
    let page = doc.get_dictionary(page_id)?;
    Ok(match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    })
}

/// The page's effective resources (possibly inherited) as a direct
/// dictionary, with the label font added. Shared dictionaries are copied,
/// never modified.
fn resources_with_font(doc: &Document, page_id: ObjectId, font_id: ObjectId) -> Dictionary {
    let mut resources = match pdf_engine::inherited_attribute(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };
    let mut fonts = match resources.get(b"Font") {
        Ok(Object::Dictionary(dict)) => dict.clone(),
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).cloned().unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };
    fonts.set(LABEL_FONT_RESOURCE, font_id);
    resources.set("Font", fonts);
    resources
}

/// Content operations for one page, shapes first and text last.
struct PageOverlay {
    shapes: Vec<Operation>,
    labels: Vec<Operation>,
    transform: RotationTransform,
    balloons: usize,
    gdt: usize,
}

impl PageOverlay {
    fn build(annotations: &[AnnotationRef<'_>], transform: RotationTransform, origin: (f64, f64)) -> Self {
        let mut overlay = Self { shapes: Vec::new(), labels: Vec::new(), transform, balloons: 0, gdt: 0 };

        overlay.shapes.push(Operation::new("Q", vec![]));
        overlay.shapes.push(Operation::new("q", vec![]));
        if origin != (0.0, 0.0) {
            overlay.shapes.push(Operation::new(
                "cm",
                vec![real(1.0), real(0.0), real(0.0), real(1.0), real(origin.0), real(origin.1)],
            ));
        }

        let mut boxes = Vec::new();
        for annotation in annotations {
            match annotation.geometry(Surface::Export) {
                AnnotationGeometry::Balloon(geometry) => {
                    overlay.balloon(&geometry);
                    overlay.balloons += 1;
                }
                AnnotationGeometry::Gdt(geometry) => boxes.push(geometry),
            }
        }
        for geometry in &boxes {
            overlay.gdt_box(geometry);
            overlay.gdt += 1;
        }

        overlay.labels.push(Operation::new("Q", vec![]));
        overlay
    }

    fn encode(self) -> ExportResult<Vec<u8>> {
        let mut operations = self.shapes;
        operations.extend(self.labels);
        Ok(Content { operations }.encode()?)
    }

    fn balloon(&mut self, geometry: &BalloonGeometry) {
        let colors = geometry.colors;

        if let Some(leader) = &geometry.leader {
            self.stroke_color(colors.leader);
            self.line_width(geometry.stroke_width);
            self.move_to(leader.start);
            self.line_to(leader.end);
            self.shapes.push(Operation::new("S", vec![]));

            if let Some([tip, left, right]) = leader.arrowhead {
                self.fill_color(colors.leader);
                self.move_to(tip);
                self.line_to(left);
                self.line_to(right);
                self.shapes.push(Operation::new("h", vec![]));
                self.shapes.push(Operation::new("f", vec![]));
            }
        }

        self.stroke_color(colors.circle_stroke);
        self.line_width(geometry.stroke_width);
        self.circle(geometry.center, geometry.radius);
        match colors.circle_fill {
            Some(fill) => {
                self.fill_color(fill);
                self.shapes.push(Operation::new("B", vec![]));
            }
            None => self.shapes.push(Operation::new("S", vec![])),
        }

        self.label(&geometry.label);
    }

    fn gdt_box(&mut self, geometry: &GdtGeometry) {
        let origin = geometry.origin;
        let corners = [
            origin,
            origin.offset(geometry.width, 0.0),
            origin.offset(geometry.width, geometry.height),
            origin.offset(0.0, geometry.height),
        ];

        self.fill_color(geometry.fill);
        self.stroke_color(geometry.stroke);
        self.line_width(GDT_STROKE_WIDTH);
        self.move_to(corners[0]);
        for corner in &corners[1..] {
            self.line_to(*corner);
        }
        self.shapes.push(Operation::new("h", vec![]));
        self.shapes.push(Operation::new("B", vec![]));

        self.label(&geometry.label);
    }

    /// Four Bezier quarter arcs around `center`.
    fn circle(&mut self, center: PageCoordinate, r: f64) {
        let k = r * KAPPA;
        let at = |dx: f64, dy: f64| center.offset(dx, dy);

        self.move_to(at(r, 0.0));
        self.curve_to(at(r, k), at(k, r), at(0.0, r));
        self.curve_to(at(-k, r), at(-r, k), at(-r, 0.0));
        self.curve_to(at(-r, -k), at(-k, -r), at(0.0, -r));
        self.curve_to(at(k, -r), at(r, -k), at(r, 0.0));
        self.shapes.push(Operation::new("h", vec![]));
    }

    /// Text is oriented with the page rotation so it reads upright in the
    /// rotated view.
    fn label(&mut self, label: &LabelGeometry) {
        let bytes = encode_win_ansi(&label.text);
        let [a, b, c, d] = self.transform.linear();
        let origin = self.transform.apply(label.baseline);
        let (r, g, bl) = rgb(label.color);

        self.labels.extend([
            Operation::new("BT", vec![]),
            Operation::new("rg", vec![r, g, bl]),
            Operation::new(
                "Tf",
                vec![Object::Name(LABEL_FONT_RESOURCE.as_bytes().to_vec()), real(label.font_size)],
            ),
            Operation::new(
                "Tm",
                vec![real(a), real(b), real(c), real(d), real(origin.x), real(origin.y)],
            ),
            Operation::new("Tj", vec![Object::String(bytes, StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn point(&self, point: PageCoordinate) -> Vec<Object> {
        let projected = self.transform.apply(point);
        vec![real(projected.x), real(projected.y)]
    }

    fn move_to(&mut self, point: PageCoordinate) {
        let operands = self.point(point);
        self.shapes.push(Operation::new("m", operands));
    }

    fn line_to(&mut self, point: PageCoordinate) {
        let operands = self.point(point);
        self.shapes.push(Operation::new("l", operands));
    }

    fn curve_to(&mut self, c1: PageCoordinate, c2: PageCoordinate, end: PageCoordinate) {
        let mut operands = self.point(c1);
        operands.extend(self.point(c2));
        operands.extend(self.point(end));
        self.shapes.push(Operation::new("c", operands));
    }

    fn line_width(&mut self, width: f64) {
        self.shapes.push(Operation::new("w", vec![real(width)]));
    }

    fn stroke_color(&mut self, color: Color) {
        let (r, g, b) = rgb(color);
        self.shapes.push(Operation::new("RG", vec![r, g, b]));
    }

    fn fill_color(&mut self, color: Color) {
        let (r, g, b) = rgb(color);
        self.shapes.push(Operation::new("rg", vec![r, g, b]));
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn rgb(color: Color) -> (Object, Object, Object) {
    let (r, g, b, _) = color.to_normalized();
    (Object::Real(r), Object::Real(g), Object::Real(b))
}

/// Encode for the standard font's WinAnsi encoding. Characters outside
/// Latin-1 cannot be shown and become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    let mut replaced = false;
    let bytes = text
        .chars()
        .map(|ch| match u32::from(ch) {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            _ => {
                replaced = true;
                b'?'
            }
        })
        .collect();
    if replaced {
        log::warn!("label {text:?} has characters the export font cannot show; replaced with '?'");
    }
    bytes
}
