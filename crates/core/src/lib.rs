//! PDF Ballooner Core Library
//!
//! Annotation model, geometry, undo history and exporters for numbering
//! features on engineering drawings.

pub mod annotation;
mod atomic;
pub mod command;
pub mod config;
pub mod csv_export;
pub mod editor;
pub mod geometry;
pub mod layout;
pub mod pdf_export;
pub mod persistence;
pub mod registry;
pub mod transform;

pub use annotation::{
    AnnotationId, AnnotationRef, BalloonAttributes, BalloonRecord, BalloonStyle, Color, GdtRecord,
    Placement, StyleColors,
};
pub use command::{BalloonCommand, Command, CommandStack};
pub use config::{ConfigError, ConfigResult, EditorConfig};
pub use csv_export::{export_balloons_csv, export_balloons_csv_to_path, CsvExportConfig, CsvExportError};
pub use editor::{BalloonEditor, EditorError, EditorResult};
pub use geometry::{AnnotationGeometry, BalloonGeometry, GdtGeometry, Surface};
pub use layout::{AnnotationLayout, PageLayout};
pub use pdf_export::{export_pdf, ExportError, ExportResult, ExportSummary};
pub use persistence::{
    load_session, save_session, session_path, LoadedSession, RecordError, SessionError, SessionFile,
    UnparsedRecords,
};
pub use registry::{AnnotationRegistry, RegistryError, RegistryEvent, SubscriptionId};
pub use transform::{
    CanvasPoint, PageCoordinate, PageRotationMap, Rotation, RotationTransform, ViewTransform,
};
