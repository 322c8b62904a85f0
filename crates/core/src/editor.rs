//! Balloon editor
//!
//! Ties the registry, undo history, page rotations and configuration into
//! the operations a front end calls. Every balloon mutation goes through a
//! [`BalloonCommand`] so it can be undone.

use crate::annotation::{AnnotationId, BalloonAttributes, BalloonRecord, BalloonStyle, GdtRecord, Placement};
use crate::command::{BalloonCommand, CommandStack};
use crate::config::EditorConfig;
use crate::csv_export::{export_balloons_csv_to_path, CsvExportConfig, CsvExportError};
use crate::layout::PageLayout;
use crate::pdf_export::{self, ExportError, ExportSummary};
use crate::persistence::{self, LoadedSession, RecordError, SessionError, SessionFile, UnparsedRecords};
use crate::registry::{AnnotationRegistry, RegistryError, RegistryEvent, SubscriptionId};
use crate::transform::{PageCoordinate, PageRotationMap, Rotation, ViewTransform};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for editor operations
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("balloon {0} not found")]
    NotFound(AnnotationId),

    #[error("no source PDF is associated with this session")]
    NoDocument,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Csv(#[from] CsvExportError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl EditorError {
    /// True when the caller asked for something impossible, as opposed to
    /// an I/O or document failure.
    pub fn is_user_error(&self) -> bool {
        match self {
            EditorError::NotFound(_) | EditorError::NoDocument => true,
            EditorError::Export(error) => error.is_user_error(),
            _ => false,
        }
    }
}

pub type EditorResult<T> = Result<T, EditorError>;

/// Editing session over one PDF.
#[derive(Debug)]
pub struct BalloonEditor {
    registry: AnnotationRegistry,
    history: CommandStack<BalloonCommand>,
    rotations: PageRotationMap,
    config: EditorConfig,
    pdf_path: Option<PathBuf>,
    /// Session records that could not be loaded; saved back unchanged
    unparsed: UnparsedRecords,
}

impl Default for BalloonEditor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl BalloonEditor {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            registry: AnnotationRegistry::new(),
            history: CommandStack::with_limit(config.undo_limit),
            rotations: PageRotationMap::new(),
            config,
            pdf_path: None,
            unparsed: UnparsedRecords::default(),
        }
    }

    pub fn with_pdf(mut self, path: impl Into<PathBuf>) -> Self {
        self.pdf_path = Some(path.into());
        self
    }

    pub fn pdf_path(&self) -> Option<&Path> {
        self.pdf_path.as_deref()
    }

    pub fn set_pdf_path(&mut self, path: Option<PathBuf>) {
        self.pdf_path = path;
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &AnnotationRegistry {
        &self.registry
    }

    pub fn rotations(&self) -> &PageRotationMap {
        &self.rotations
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&RegistryEvent) + 'static) -> SubscriptionId {
        self.registry.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Place a balloon pointing at `target` with the configured defaults.
    ///
    /// The balloon takes the lowest free number. Styles with a leader get
    /// their circle offset from the target; `no_arrow` sits on it.
    pub fn place_balloon(&mut self, target: PageCoordinate, page: u32) -> EditorResult<AnnotationId> {
        let style = self.config.default_style;
        let center = if style.has_leader() {
            let [dx, dy] = self.config.leader_offset;
            target.offset(dx, dy)
        } else {
            target
        };

        let record = BalloonRecord::new(self.registry.next_free_number(), page, target, center)
            .with_diameter(self.config.clamp_diameter(self.config.default_diameter))
            .with_style(style)
            .with_font_size_override(self.config.default_font_size);
        let id = record.id();

        log::debug!("placing balloon #{} on page {}", record.number, page + 1);
        self.history.execute(BalloonCommand::Place(record), &mut self.registry)?;
        Ok(id)
    }

    pub fn delete(&mut self, id: AnnotationId) -> EditorResult<()> {
        let record = self.balloon(id)?.clone();
        self.history.execute(BalloonCommand::Delete(record), &mut self.registry)?;
        Ok(())
    }

    /// Move the circle and the leader target. Returns false if nothing
    /// moved, including when the balloon is already gone.
    pub fn move_balloon(
        &mut self,
        id: AnnotationId,
        center: PageCoordinate,
        target: PageCoordinate,
    ) -> EditorResult<bool> {
        let Some(record) = self.registry.get(id) else {
            log::debug!("ignoring move of removed balloon {id}");
            return Ok(false);
        };
        let command = BalloonCommand::moved(record, Placement { center, target });
        self.run(command)
    }

    /// Renumber every balloon in reading order. Returns false if the
    /// numbering was already canonical.
    pub fn renumber_all(&mut self) -> EditorResult<bool> {
        self.run(BalloonCommand::renumber(&self.registry))
    }

    pub fn set_number(&mut self, id: AnnotationId, number: u32) -> EditorResult<bool> {
        self.edit(id, |attributes| attributes.number = number)
    }

    pub fn set_description(&mut self, id: AnnotationId, description: impl Into<String>) -> EditorResult<bool> {
        let description = description.into();
        self.edit(id, |attributes| attributes.description = description)
    }

    /// Change the diameter, clamped to the configured range.
    pub fn resize(&mut self, id: AnnotationId, diameter: f64) -> EditorResult<bool> {
        let diameter = self.config.clamp_diameter(diameter);
        self.edit(id, |attributes| attributes.diameter = diameter)
    }

    pub fn restyle(&mut self, id: AnnotationId, style: BalloonStyle) -> EditorResult<bool> {
        self.edit(id, |attributes| attributes.style = style)
    }

    /// Fix the label size; `0.0` returns to sizing from the radius.
    pub fn set_font_size(&mut self, id: AnnotationId, size: f64) -> EditorResult<bool> {
        let size = if size.is_finite() { size.max(0.0) } else { 0.0 };
        self.edit(id, |attributes| attributes.font_size_override = size)
    }

    pub fn undo(&mut self) -> EditorResult<bool> {
        Ok(self.history.undo(&mut self.registry)?)
    }

    pub fn redo(&mut self) -> EditorResult<bool> {
        Ok(self.history.redo(&mut self.registry)?)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_label(&self) -> Option<String> {
        self.history.undo_label()
    }

    pub fn redo_label(&self) -> Option<String> {
        self.history.redo_label()
    }

    pub fn add_gdt(&mut self, symbol: impl Into<String>, page: u32, position: PageCoordinate) -> EditorResult<AnnotationId> {
        let record = GdtRecord::new(symbol, page, position);
        let id = record.id();
        self.registry.add_gdt(record)?;
        Ok(id)
    }

    pub fn remove_gdt(&mut self, id: AnnotationId) -> EditorResult<GdtRecord> {
        self.registry.remove_gdt(id).ok_or(EditorError::NotFound(id))
    }

    pub fn rotate_page_cw(&mut self, page: u32) -> Rotation {
        self.rotations.rotate_cw(page)
    }

    pub fn rotate_page_ccw(&mut self, page: u32) -> Rotation {
        self.rotations.rotate_ccw(page)
    }

    pub fn set_page_rotation(&mut self, page: u32, rotation: Rotation) {
        self.rotations.set(page, rotation);
    }

    /// Canvas layout of one page for painting and hit testing. `width` and
    /// `height` are the unrotated page size in points.
    pub fn page_layout(&self, page: u32, width: f64, height: f64, zoom: f64) -> PageLayout {
        let view = ViewTransform::for_page(width, height, self.rotations.get(page), zoom);
        PageLayout::build(self.registry.page_annotations(page), &view)
    }

    /// Burn all annotations into a copy of the session's PDF.
    pub fn export_pdf(&self, output: &Path) -> EditorResult<ExportSummary> {
        let source = self.pdf_path.as_deref().ok_or(EditorError::NoDocument)?;
        Ok(pdf_export::export_pdf(source, output, &self.registry, &self.rotations)?)
    }

    pub fn export_csv(&self, output: &Path) -> EditorResult<()> {
        export_balloons_csv_to_path(output, &self.registry.all(), &CsvExportConfig::default())?;
        Ok(())
    }

    pub fn to_session(&self) -> SessionFile {
        SessionFile::capture(self.pdf_path.as_deref(), &self.registry)
            .with_unparsed(self.unparsed.clone())
    }

    pub fn save_session(&self, path: &Path) -> EditorResult<()> {
        persistence::save_session(path, &self.to_session())?;
        Ok(())
    }

    /// Replace the current records with a loaded session. Undo history and
    /// page rotations are reset. Returns the records that could not be
    /// loaded; they are kept verbatim and written back by
    /// [`save_session`](Self::save_session).
    pub fn restore(&mut self, session: LoadedSession) -> Vec<RecordError> {
        self.registry.clear();
        self.history.clear();
        self.rotations.clear();
        if session.pdf.is_some() {
            self.pdf_path = session.pdf;
        }
        self.unparsed = session.unparsed;

        for record in session.balloons {
            if self.registry.contains(record.id()) {
                log::warn!("duplicate balloon {} in session, keeping it unparsed", record.id());
                if let Ok(value) = serde_json::to_value(persistence::to_record(&record)) {
                    self.unparsed.balloons.push(value);
                }
                continue;
            }
            if let Err(error) = self.registry.add(record) {
                log::warn!("skipping balloon: {error}");
            }
        }
        for record in session.gdt {
            if self.registry.contains(record.id()) {
                log::warn!("duplicate GD&T label {} in session, keeping it unparsed", record.id());
                if let Ok(value) = serde_json::to_value(persistence::gdt_to_record(&record)) {
                    self.unparsed.gdt.push(value);
                }
                continue;
            }
            if let Err(error) = self.registry.add_gdt(record) {
                log::warn!("skipping GD&T label: {error}");
            }
        }
        session.errors
    }

    /// Load a session file from disk. See [`BalloonEditor::restore`].
    pub fn load_session(&mut self, path: &Path) -> EditorResult<Vec<RecordError>> {
        let session = persistence::load_session(path)?;
        Ok(self.restore(session))
    }

    fn balloon(&self, id: AnnotationId) -> EditorResult<&BalloonRecord> {
        self.registry.get(id).ok_or(EditorError::NotFound(id))
    }

    /// Edits of a balloon that is already gone are ignored.
    fn edit(&mut self, id: AnnotationId, change: impl FnOnce(&mut BalloonAttributes)) -> EditorResult<bool> {
        let Some(record) = self.registry.get(id) else {
            log::debug!("ignoring edit of removed balloon {id}");
            return Ok(false);
        };
        let command = BalloonCommand::edited(record, change);
        self.run(command)
    }

    fn run(&mut self, command: BalloonCommand) -> EditorResult<bool> {
        if command.is_noop() {
            return Ok(false);
        }
        self.history.execute(command, &mut self.registry)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn point(x: f64, y: f64) -> PageCoordinate {
        PageCoordinate::new(x, y)
    }

    fn numbers(editor: &BalloonEditor) -> Vec<u32> {
        let mut numbers: Vec<u32> = editor.registry().all().iter().map(|b| b.number).collect();
        numbers.sort_unstable();
        numbers
    }

    #[test]
    fn placement_takes_lowest_free_number() {
        let mut editor = BalloonEditor::default();
        let first = editor.place_balloon(point(10.0, 10.0), 0).unwrap();
        let second = editor.place_balloon(point(20.0, 10.0), 0).unwrap();
        let third = editor.place_balloon(point(30.0, 10.0), 0).unwrap();
        editor.set_number(third, 4).unwrap();
        assert_eq!(numbers(&editor), vec![1, 2, 4]);

        let fourth = editor.place_balloon(point(40.0, 10.0), 0).unwrap();
        assert_eq!(editor.registry().get(fourth).unwrap().number, 3);

        editor.delete(second).unwrap();
        let fifth = editor.place_balloon(point(50.0, 10.0), 0).unwrap();
        assert_eq!(editor.registry().get(fifth).unwrap().number, 2);
        assert_eq!(editor.registry().get(first).unwrap().number, 1);
    }

    #[test]
    fn leader_styles_are_offset_and_no_arrow_is_not() {
        let mut editor = BalloonEditor::default();
        let id = editor.place_balloon(point(100.0, 200.0), 0).unwrap();
        let record = editor.registry().get(id).unwrap();
        assert_eq!(record.target_point, point(100.0, 200.0));
        assert_eq!(record.center_point, point(140.0, 240.0));
        assert_eq!(record.diameter, 36.0);

        let config = EditorConfig::default().with_default_style(BalloonStyle::NoArrow);
        let mut editor = BalloonEditor::new(config);
        let id = editor.place_balloon(point(100.0, 200.0), 0).unwrap();
        let record = editor.registry().get(id).unwrap();
        assert_eq!(record.center_point, record.target_point);
        assert_eq!(record.style, BalloonStyle::NoArrow);
    }

    #[test]
    fn place_delete_undo_redo() {
        let mut editor = BalloonEditor::default();
        let id = editor.place_balloon(point(10.0, 10.0), 0).unwrap();
        editor.delete(id).unwrap();
        assert!(editor.registry().is_empty());

        assert!(editor.undo().unwrap());
        assert!(editor.registry().contains(id));
        assert!(editor.undo().unwrap());
        assert!(editor.registry().is_empty());
        assert!(!editor.can_undo());

        assert!(editor.redo().unwrap());
        assert!(editor.registry().contains(id));
        assert!(editor.redo().unwrap());
        assert!(editor.registry().is_empty());
        assert!(!editor.can_redo());
        assert_eq!(editor.undo_label().as_deref(), Some("Delete balloon #1"));
    }

    #[test]
    fn edits_are_undoable_and_noops_are_not_recorded() {
        let mut editor = BalloonEditor::default();
        let id = editor.place_balloon(point(10.0, 10.0), 0).unwrap();

        assert!(editor.set_description(id, "Ø6 H7").unwrap());
        assert!(!editor.set_description(id, "Ø6 H7").unwrap());
        assert!(editor.resize(id, 1000.0).unwrap());
        assert_eq!(editor.registry().get(id).unwrap().diameter, 200.0);
        assert_eq!(editor.undo_label().as_deref(), Some("Resize balloon"));

        editor.undo().unwrap();
        editor.undo().unwrap();
        let record = editor.registry().get(id).unwrap();
        assert_eq!(record.diameter, 36.0);
        assert_eq!(record.description, "");
    }

    #[test]
    fn move_and_renumber_go_through_history() {
        let mut editor = BalloonEditor::default();
        let low = editor.place_balloon(point(10.0, 100.0), 0).unwrap();
        let high = editor.place_balloon(point(10.0, 500.0), 0).unwrap();

        assert!(editor.renumber_all().unwrap());
        assert_eq!(editor.registry().get(high).unwrap().number, 1);
        assert!(!editor.renumber_all().unwrap());

        assert!(editor.move_balloon(low, point(300.0, 700.0), point(250.0, 650.0)).unwrap());
        assert_eq!(editor.registry().get(low).unwrap().center_point, point(300.0, 700.0));

        editor.undo().unwrap();
        editor.undo().unwrap();
        assert_eq!(editor.registry().get(low).unwrap().number, 1);
        assert_eq!(editor.registry().get(low).unwrap().center_point, point(50.0, 140.0));
    }

    #[test]
    fn missing_balloon_is_a_user_error() {
        let mut editor = BalloonEditor::default();
        let error = editor.delete(AnnotationId::new_v4()).unwrap_err();
        assert!(matches!(error, EditorError::NotFound(_)));
        assert!(error.is_user_error());
        assert!(!editor.can_undo());
    }

    #[test]
    fn edits_of_a_deleted_balloon_are_ignored() {
        let mut editor = BalloonEditor::default();
        let id = editor.place_balloon(point(10.0, 10.0), 0).unwrap();
        editor.delete(id).unwrap();

        assert!(!editor.move_balloon(id, point(1.0, 1.0), point(2.0, 2.0)).unwrap());
        assert!(!editor.set_description(id, "x").unwrap());
        assert!(!editor.resize(id, 50.0).unwrap());
        assert_eq!(editor.undo_label().as_deref(), Some("Delete balloon #1"));
        assert!(!editor.can_redo());

        editor.undo().unwrap();
        editor.undo().unwrap();
        assert!(!editor.can_undo());
    }

    #[test]
    fn unloadable_session_records_are_saved_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawing.balloons.json");
        let bad = serde_json::json!({
            "number": 7,
            "page": 0,
            "target_point": [1.0, 1.0],
            "balloon_center": [1.0, 1.0],
            "diameter": -1.0,
            "uid": "00000000-0000-4000-8000-000000002a11",
        });
        let json = serde_json::json!({"balloons": [bad]}).to_string();
        std::fs::write(&path, json).unwrap();

        let mut editor = BalloonEditor::default();
        let errors = editor.load_session(&path).unwrap();
        assert_eq!(errors.len(), 1);
        editor.place_balloon(point(50.0, 50.0), 0).unwrap();
        editor.save_session(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let balloons = written["balloons"].as_array().unwrap();
        assert_eq!(balloons.len(), 2);
        assert_eq!(balloons[1], bad);
    }

    #[test]
    fn export_without_document_fails() {
        let editor = BalloonEditor::default();
        let error = editor.export_pdf(Path::new("out.pdf")).unwrap_err();
        assert!(matches!(error, EditorError::NoDocument));
    }

    #[test]
    fn session_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawing.balloons.json");

        let mut editor = BalloonEditor::default().with_pdf("drawing.pdf");
        let id = editor.place_balloon(point(10.0, 10.0), 1).unwrap();
        editor.set_description(id, "chamfer").unwrap();
        let gdt = editor.add_gdt("⏥ 0.05", 1, point(200.0, 200.0)).unwrap();
        editor.rotate_page_cw(1);
        editor.save_session(&path).unwrap();

        let mut reloaded = BalloonEditor::default();
        let errors = reloaded.load_session(&path).unwrap();
        assert!(errors.is_empty());
        assert_eq!(reloaded.pdf_path(), Some(Path::new("drawing.pdf")));
        assert_eq!(reloaded.registry().get(id), editor.registry().get(id));
        assert_eq!(reloaded.registry().get_gdt(gdt).unwrap().symbol, "⏥ 0.05");
        assert_eq!(reloaded.rotations().get(1), Rotation::Deg0);
        assert!(!reloaded.can_undo());
    }

    #[test]
    fn observers_see_editor_mutations() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let mut editor = BalloonEditor::default();
        editor.subscribe(move |event| sink.borrow_mut().push(*event));

        let id = editor.place_balloon(point(10.0, 10.0), 0).unwrap();
        editor.restyle(id, BalloonStyle::Red).unwrap();
        editor.undo().unwrap();

        assert_eq!(
            *events.borrow(),
            vec![RegistryEvent::Added(id), RegistryEvent::Updated(id), RegistryEvent::Updated(id)]
        );
    }

    #[test]
    fn page_layout_hit_tests_placed_balloon() {
        let mut editor = BalloonEditor::default();
        let id = editor.place_balloon(point(100.0, 700.0), 0).unwrap();

        let layout = editor.page_layout(0, 612.0, 792.0, 1.0);
        // circle centre (140, 740) in document space is (140, 52) on canvas
        assert_eq!(layout.hit_test(crate::transform::CanvasPoint::new(140.0, 52.0), 4.0), Some(id));
        assert_eq!(layout.hit_test(crate::transform::CanvasPoint::new(500.0, 500.0), 4.0), None);
    }
}
