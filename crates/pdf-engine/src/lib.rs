//! Page geometry provider.
//!
//! The ballooning core treats every page as an opaque rectangle with a known
//! size and rotation. This crate opens a PDF with `lopdf` and reports exactly
//! that, walking the page tree so inherited `MediaBox` and `Rotate` entries
//! are honoured.

use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// US Letter, used when a page carries no usable `MediaBox`.
pub const FALLBACK_PAGE_SIZE: (f64, f64) = (612.0, 792.0);

/// Guards against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Size and stored orientation of one page.
///
/// `width_pt` / `height_pt` are the unrotated `MediaBox` extents; `rotation`
/// is the page's `/Rotate` value normalised to 0, 90, 180 or 270.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageInfo {
    pub width_pt: f64,
    pub height_pt: f64,
    pub rotation: u16,
}

impl Default for PageInfo {
    fn default() -> Self {
        Self { width_pt: FALLBACK_PAGE_SIZE.0, height_pt: FALLBACK_PAGE_SIZE.1, rotation: 0 }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
}

pub type PdfEngineResult<T> = Result<T, PdfEngineError>;

pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> PdfEngineResult<DocumentHandle>;
    fn page_count(&self, handle: DocumentHandle) -> PdfEngineResult<u32>;
    fn page_info(&self, handle: DocumentHandle, page_index: u32) -> PdfEngineResult<PageInfo>;
    fn close(&mut self, handle: DocumentHandle) -> PdfEngineResult<()>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    pages: Vec<PageInfo>,
}

#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_pages(bytes: &[u8]) -> PdfEngineResult<Vec<PageInfo>> {
        if is_encrypted(bytes) {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages: Vec<PageInfo> =
            doc.get_pages().into_values().map(|page_id| page_info(&doc, page_id)).collect();

        if pages.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        Ok(pages)
    }

    fn record(&self, handle: DocumentHandle) -> PdfEngineResult<&DocumentRecord> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> PdfEngineResult<DocumentHandle> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let pages = Self::parse_pages(&bytes)?;
        log::debug!("opened document with {} page(s)", pages.len());

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, DocumentRecord { pages });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> PdfEngineResult<u32> {
        Ok(self.record(handle)?.pages.len() as u32)
    }

    fn page_info(&self, handle: DocumentHandle, page_index: u32) -> PdfEngineResult<PageInfo> {
        let record = self.record(handle)?;
        record.pages.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: record.pages.len() as u32,
        })
    }

    fn close(&mut self, handle: DocumentHandle) -> PdfEngineResult<()> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

/// Cheap marker scan; `lopdf` cannot decrypt, so these are refused up front.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt")
}

/// Reads size and rotation for a page already loaded in `doc`.
pub fn page_info(doc: &Document, page_id: ObjectId) -> PageInfo {
    let (width_pt, height_pt) = media_box(doc, page_id)
        .map(|[x0, y0, x1, y1]| ((x1 - x0).abs(), (y1 - y0).abs()))
        .unwrap_or(FALLBACK_PAGE_SIZE);

    let rotation = inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .map(normalize_rotation)
        .unwrap_or(0);

    PageInfo { width_pt, height_pt, rotation }
}

/// Lower-left corner of the page's `MediaBox`; `(0, 0)` for most documents.
pub fn media_box_origin(doc: &Document, page_id: ObjectId) -> (f64, f64) {
    media_box(doc, page_id)
        .map(|[x0, y0, x1, y1]| (x0.min(x1), y0.min(y1)))
        .unwrap_or((0.0, 0.0))
}

fn media_box(doc: &Document, page_id: ObjectId) -> Option<[f64; 4]> {
    let array = inherited_attribute(doc, page_id, b"MediaBox")?.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut corners = [0.0; 4];
    for (corner, value) in corners.iter_mut().zip(array) {
        *corner = number(resolve(doc, value)?)?;
    }
    Some(corners)
}

/// Maps any multiple-of-90 `/Rotate` value (negative included) onto 0..360.
/// Values that are not multiples of 90 are not valid /Rotate values and read as 0.
pub fn normalize_rotation(degrees: i64) -> u16 {
    if degrees % 90 != 0 {
        log::warn!("ignoring non-orthogonal page rotation {degrees}");
        return 0;
    }
    degrees.rem_euclid(360) as u16
}

/// Looks `key` up on the page, then on each ancestor in the page tree.
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn sample_pdf_bytes(pages: &[(i64, i64, Option<i64>)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = pages
            .iter()
            .map(|&(width, height, rotate)| {
                let mut page = dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                };
                if let Some(rotate) = rotate {
                    page.set("Rotate", rotate);
                }
                doc.add_object(page).into()
            })
            .collect();
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("sample document should serialize");
        buffer
    }

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes(&[(612, 792, None), (842, 595, None)])))
            .expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 2);
    }

    #[test]
    fn reports_size_and_rotation_per_page() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes(&[(612, 792, None), (842, 595, Some(-90))])))
            .expect("open should succeed");

        let first = engine.page_info(handle, 0).expect("page 0 should exist");
        assert_eq!(first, PageInfo { width_pt: 612.0, height_pt: 792.0, rotation: 0 });

        let second = engine.page_info(handle, 1).expect("page 1 should exist");
        assert_eq!(second, PageInfo { width_pt: 842.0, height_pt: 595.0, rotation: 270 });
    }

    #[test]
    fn media_box_is_inherited_from_page_tree() {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
                "Rotate" => 180,
            }),
        );

        let info = page_info(&doc, page_id);
        assert_eq!(info, PageInfo { width_pt: 300.0, height_pt: 400.0, rotation: 180 });
        assert_eq!(media_box_origin(&doc, page_id), (0.0, 0.0));
    }

    #[test]
    fn media_box_origin_uses_lower_left_corner() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![(-10).into(), 500.into(), 200.into(), 20.into()],
        });

        assert_eq!(media_box_origin(&doc, page_id), (-10.0, 20.0));
        let info = page_info(&doc, page_id);
        assert_eq!((info.width_pt, info.height_pt), (210.0, 480.0));
    }

    #[test]
    fn page_out_of_range_is_reported() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(sample_pdf_bytes(&[(612, 792, None)])))
            .expect("open should succeed");

        let err = engine.page_info(handle, 3).expect_err("page 3 does not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 3, page_count: 1 }));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }

    #[test]
    fn encrypted_marker_is_refused() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"%PDF-1.7\n/Encrypt 5 0 R\n".to_vec()))
            .expect_err("encrypted marker should be refused");

        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn rotation_normalization() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(45), 0);
    }
}
