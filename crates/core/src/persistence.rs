//! Session persistence
//!
//! Balloons and GD&T labels are saved as a JSON sidecar next to the PDF
//! (`drawing.pdf` -> `drawing.balloons.json`). Loading is per record: a
//! record that fails to convert is reported and skipped as a whole, and the
//! rest of the session still loads.

use crate::annotation::{
    AnnotationId, BalloonRecord, BalloonStyle, GdtRecord, DEFAULT_GDT_FONT_SIZE, LEGACY_DIAMETER,
};
use crate::atomic::write_atomic;
use crate::registry::AnnotationRegistry;
use crate::transform::PageCoordinate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for whole-file session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("session is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Balloon,
    Gdt,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Balloon => f.write_str("balloon"),
            RecordKind::Gdt => f.write_str("GD&T label"),
        }
    }
}

/// One field that failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid `{field}`: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// A record that could not be loaded. The record is skipped entirely.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("{kind} #{index} is malformed: {message}")]
    Malformed { kind: RecordKind, index: usize, message: String },

    #[error("{kind} #{index} has an {source}")]
    InvalidField {
        kind: RecordKind,
        index: usize,
        #[source]
        source: FieldError,
    },
}

impl RecordError {
    pub fn index(&self) -> usize {
        match self {
            RecordError::Malformed { index, .. } | RecordError::InvalidField { index, .. } => *index,
        }
    }
}

fn legacy_diameter() -> f64 {
    LEGACY_DIAMETER
}

fn default_gdt_font_size() -> f64 {
    DEFAULT_GDT_FONT_SIZE
}

/// A balloon as written to the session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBalloon {
    pub number: u32,
    pub page: u32,
    pub target_point: [f64; 2],
    pub balloon_center: [f64; 2],
    #[serde(default)]
    pub description: String,
    #[serde(default = "legacy_diameter")]
    pub diameter: f64,
    #[serde(default)]
    pub style: BalloonStyle,
    #[serde(default)]
    pub font_size_override: f64,
    #[serde(alias = "id")]
    pub uid: String,
}

/// A GD&T label as written to the session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGdt {
    pub symbol: String,
    pub page: u32,
    pub position: [f64; 2],
    #[serde(default = "default_gdt_font_size")]
    pub font_size: f64,
    #[serde(alias = "id")]
    pub uid: String,
}

pub fn to_record(balloon: &BalloonRecord) -> SessionBalloon {
    SessionBalloon {
        number: balloon.number,
        page: balloon.page(),
        target_point: [balloon.target_point.x, balloon.target_point.y],
        balloon_center: [balloon.center_point.x, balloon.center_point.y],
        description: balloon.description.clone(),
        diameter: balloon.diameter,
        style: balloon.style,
        font_size_override: balloon.font_size_override,
        uid: balloon.id().to_string(),
    }
}

/// Validate every field before building anything, so a bad record never
/// yields a half-populated balloon.
pub fn from_record(entry: &SessionBalloon) -> Result<BalloonRecord, FieldError> {
    let id = parse_id(&entry.uid)?;
    if entry.number == 0 {
        return Err(FieldError::new("number", "must be positive"));
    }
    let target = point("target_point", entry.target_point)?;
    let center = point("balloon_center", entry.balloon_center)?;
    if !(entry.diameter.is_finite() && entry.diameter > 0.0) {
        return Err(FieldError::new("diameter", format!("{} is not a positive size", entry.diameter)));
    }
    if !(entry.font_size_override.is_finite() && entry.font_size_override >= 0.0) {
        return Err(FieldError::new(
            "font_size_override",
            format!("{} is not a non-negative size", entry.font_size_override),
        ));
    }

    Ok(BalloonRecord::with_id(id, entry.number, entry.page, target, center)
        .with_diameter(entry.diameter)
        .with_style(entry.style)
        .with_font_size_override(entry.font_size_override)
        .with_description(entry.description.clone()))
}

pub fn gdt_to_record(gdt: &GdtRecord) -> SessionGdt {
    SessionGdt {
        symbol: gdt.symbol.clone(),
        page: gdt.page(),
        position: [gdt.position.x, gdt.position.y],
        font_size: gdt.font_size,
        uid: gdt.id().to_string(),
    }
}

pub fn gdt_from_record(entry: &SessionGdt) -> Result<GdtRecord, FieldError> {
    let id = parse_id(&entry.uid)?;
    let position = point("position", entry.position)?;
    if !(entry.font_size.is_finite() && entry.font_size > 0.0) {
        return Err(FieldError::new("font_size", format!("{} is not a positive size", entry.font_size)));
    }
    Ok(GdtRecord::with_id(id, entry.symbol.clone(), entry.page, position).with_font_size(entry.font_size))
}

fn parse_id(uid: &str) -> Result<AnnotationId, FieldError> {
    AnnotationId::parse_str(uid).map_err(|e| FieldError::new("uid", e.to_string()))
}

fn point(field: &'static str, [x, y]: [f64; 2]) -> Result<PageCoordinate, FieldError> {
    let point = PageCoordinate::new(x, y);
    if point.is_finite() {
        Ok(point)
    } else {
        Err(FieldError::new(field, "coordinates must be finite"))
    }
}

/// Records that could not be loaded, kept verbatim so a re-save writes them
/// back instead of dropping them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnparsedRecords {
    pub balloons: Vec<serde_json::Value>,
    pub gdt: Vec<serde_json::Value>,
}

impl UnparsedRecords {
    pub fn is_empty(&self) -> bool {
        self.balloons.is_empty() && self.gdt.is_empty()
    }

    pub fn len(&self) -> usize {
        self.balloons.len() + self.gdt.len()
    }

    fn append_to(&self, document: &mut serde_json::Value) {
        for (key, records) in [("balloons", &self.balloons), ("gdt", &self.gdt)] {
            if let Some(serde_json::Value::Array(items)) = document.get_mut(key) {
                items.extend(records.iter().cloned());
            }
        }
    }
}

/// The on-disk session document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    /// PDF the session was saved against
    #[serde(default)]
    pub pdf: Option<PathBuf>,
    #[serde(default)]
    pub balloons: Vec<SessionBalloon>,
    #[serde(default)]
    pub gdt: Vec<SessionGdt>,
    /// Written after the typed records by [`save_session`]
    #[serde(skip)]
    pub unparsed: UnparsedRecords,
}

impl SessionFile {
    /// Snapshot every record held by `registry`.
    pub fn capture(pdf: Option<&Path>, registry: &AnnotationRegistry) -> Self {
        Self {
            pdf: pdf.map(Path::to_path_buf),
            balloons: registry.all().into_iter().map(to_record).collect(),
            gdt: registry.all_gdt().into_iter().map(gdt_to_record).collect(),
            unparsed: UnparsedRecords::default(),
        }
    }

    pub fn with_unparsed(mut self, unparsed: UnparsedRecords) -> Self {
        self.unparsed = unparsed;
        self
    }
}

/// Same shape as [`SessionFile`] but with records left unparsed, so one bad
/// record cannot fail the whole file.
#[derive(Deserialize)]
struct RawSession {
    #[serde(default)]
    pdf: Option<PathBuf>,
    #[serde(default)]
    balloons: Vec<serde_json::Value>,
    #[serde(default)]
    gdt: Vec<serde_json::Value>,
}

/// Result of loading a session: everything that converted, plus what didn't.
#[derive(Debug, Default)]
pub struct LoadedSession {
    pub pdf: Option<PathBuf>,
    pub balloons: Vec<BalloonRecord>,
    pub gdt: Vec<GdtRecord>,
    pub errors: Vec<RecordError>,
    /// The raw records behind `errors`
    pub unparsed: UnparsedRecords,
}

impl LoadedSession {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

fn convert<E, R>(
    kind: RecordKind,
    values: Vec<serde_json::Value>,
    from_record: impl Fn(&E) -> Result<R, FieldError>,
    errors: &mut Vec<RecordError>,
    rejected: &mut Vec<serde_json::Value>,
) -> Vec<R>
where
    E: serde::de::DeserializeOwned,
{
    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        let entry = match E::deserialize(&value) {
            Ok(entry) => entry,
            Err(e) => {
                errors.push(RecordError::Malformed { kind, index, message: e.to_string() });
                rejected.push(value);
                continue;
            }
        };
        match from_record(&entry) {
            Ok(record) => records.push(record),
            Err(source) => {
                errors.push(RecordError::InvalidField { kind, index, source });
                rejected.push(value);
            }
        }
    }
    records
}

/// Parse a session document.
pub fn parse_session(json: &str) -> SessionResult<LoadedSession> {
    let raw: RawSession = serde_json::from_str(json)?;
    let mut errors = Vec::new();
    let mut unparsed = UnparsedRecords::default();
    let balloons =
        convert(RecordKind::Balloon, raw.balloons, from_record, &mut errors, &mut unparsed.balloons);
    let gdt = convert(RecordKind::Gdt, raw.gdt, gdt_from_record, &mut errors, &mut unparsed.gdt);

    for error in &errors {
        log::warn!("skipping session record: {error}");
    }
    Ok(LoadedSession { pdf: raw.pdf, balloons, gdt, errors, unparsed })
}

/// Default session path for a PDF: same directory and stem, `.balloons.json`.
pub fn session_path(pdf_path: &Path) -> PathBuf {
    pdf_path.with_extension("balloons.json")
}

/// Save a session as pretty JSON, replacing `path` atomically. Unparsed
/// records are appended unchanged after the typed ones.
pub fn save_session(path: &Path, session: &SessionFile) -> SessionResult<()> {
    let mut document = serde_json::to_value(session)?;
    session.unparsed.append_to(&mut document);

    write_atomic(path, |writer| {
        serde_json::to_writer_pretty(writer, &document)?;
        Ok::<(), SessionError>(())
    })?;
    log::info!(
        "saved session with {} balloons and {} GD&T labels to {} ({} kept unparsed)",
        session.balloons.len(),
        session.gdt.len(),
        path.display(),
        session.unparsed.len()
    );
    Ok(())
}

pub fn load_session(path: &Path) -> SessionResult<LoadedSession> {
    let json = fs::read_to_string(path)?;
    let session = parse_session(&json)?;
    log::info!(
        "loaded {} balloons and {} GD&T labels from {} ({} skipped)",
        session.balloons.len(),
        session.gdt.len(),
        path.display(),
        session.errors.len()
    );
    Ok(session)
}
