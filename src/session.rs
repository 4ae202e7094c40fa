//! The box list of one open image.
//!
//! A session owns the authoritative boxes (center form, natural pixels), keeps
//! one [`BoxEditor`] per box while the image has a known rendered size, routes
//! pointer input to them, and persists the list on an explicit save.

use crate::api::{AnnotationUpdate, DetectionRecord, ImageId, ProcessedImage};
use crate::catalog::{ClassCatalog, ClassId};
use crate::constants::{
    DEFAULT_BOX_HEIGHT, DEFAULT_BOX_WIDTH, DEFAULT_BOX_X, DEFAULT_BOX_Y,
    INTERACTION_RELEASE_DELAY, MANUAL_CONFIDENCE, MAX_TEXTURE_DIMENSION,
};
use crate::coords::{CenterBox, RenderScale, Size, TopLeftBox};
use crate::editor::{BoxChange, BoxEditor, BoxHit, BoxId};
use crate::error::{ClientError, SaveError};
use crate::image_loader::{decode_image, LoadedImage};
use crate::jobs::{JobOutput, Jobs, SessionEvent};
use crate::notice::Notices;
use egui::{ColorImage, Pos2};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub id: BoxId,
    pub detection_id: Option<u32>,
    pub class_id: Option<ClassId>,
    pub geometry: CenterBox,
    pub confidence: f32,
}

/// Result of a pointer press inside the image area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOutcome {
    /// A drag or resize started on this box.
    Captured(BoxId),
    Removed(BoxId),
    /// The press landed on a class selector; the UI handles it.
    Label(BoxId),
    Background,
}

/// Suppresses dismissal while an edit is in progress and shortly after it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InteractionLock {
    Released,
    Held,
    Releasing { until: Instant },
}

pub struct AnnotationSession {
    image_id: ImageId,
    generation: u64,
    catalog: Arc<ClassCatalog>,
    boxes: Vec<BoundingBox>,
    editors: Vec<BoxEditor>,
    next_local_id: BoxId,
    natural_size: Option<Size>,
    rendered_size: Option<Size>,
    capture: Option<BoxId>,
    lock: InteractionLock,
    detections_pending: bool,
    image_pending: bool,
    save_pending: bool,
}

impl AnnotationSession {
    pub fn new(image_id: ImageId, generation: u64, catalog: Arc<ClassCatalog>) -> Self {
        Self {
            image_id,
            generation,
            catalog,
            boxes: Vec::new(),
            editors: Vec::new(),
            next_local_id: 1,
            natural_size: None,
            rendered_size: None,
            capture: None,
            lock: InteractionLock::Released,
            detections_pending: false,
            image_pending: false,
            save_pending: false,
        }
    }

    /// Creates a session and starts fetching the image and its detections.
    pub fn open(
        image_id: ImageId,
        generation: u64,
        catalog: Arc<ClassCatalog>,
        jobs: &mut Jobs,
    ) -> Self {
        log::info!("Opening image {image_id} (session {generation})");
        let mut session = Self::new(image_id, generation, catalog);
        session.detections_pending = true;
        session.image_pending = true;

        jobs.spawn(move |backend| JobOutput::Session {
            generation,
            event: SessionEvent::Detections(backend.detections(image_id)),
        });
        jobs.spawn(move |backend| JobOutput::Session {
            generation,
            event: SessionEvent::Image(
                backend
                    .raw_image(image_id)
                    .and_then(|bytes| decode_image(&bytes, Some(MAX_TEXTURE_DIMENSION))),
            ),
        });
        session
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn image_id(&self) -> ImageId {
        self.image_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a result tagged with `generation` belongs to this session.
    pub fn accepts(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn boxes(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn get(&self, id: BoxId) -> Option<&BoundingBox> {
        self.boxes.iter().find(|b| b.id == id)
    }

    /// Editors in drawing order. Empty until both image sizes are known.
    pub fn editors(&self) -> &[BoxEditor] {
        &self.editors
    }

    pub fn natural_size(&self) -> Option<Size> {
        self.natural_size
    }

    pub fn captured(&self) -> Option<BoxId> {
        self.capture
    }

    pub fn is_loading(&self) -> bool {
        self.detections_pending || self.image_pending
    }

    pub fn is_save_pending(&self) -> bool {
        self.save_pending
    }

    /// A box can be added only while the catalog has a class to give it.
    pub fn can_add_box(&self) -> bool {
        !self.catalog.is_empty()
    }

    /// Removal is offered only while more than one box exists.
    pub fn can_remove(&self) -> bool {
        self.boxes.len() > 1
    }

    fn scale(&self) -> Option<RenderScale> {
        match (self.natural_size, self.rendered_size) {
            (Some(natural), Some(rendered)) if natural.is_positive() && rendered.is_positive() => {
                Some(RenderScale::new(natural, rendered))
            }
            _ => None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Loading
    // ─────────────────────────────────────────────────────────────────────────────

    /// Applies a background result. Returns decoded pixels when the image arrived.
    pub fn handle_event(&mut self, event: SessionEvent, notices: &mut Notices) -> Option<ColorImage> {
        match event {
            SessionEvent::Detections(result) => {
                self.apply_detections(result, notices);
                None
            }
            SessionEvent::Image(result) => self.apply_image(result, notices),
            SessionEvent::Saved(result) => {
                self.finish_save(result, notices);
                None
            }
        }
    }

    /// Replaces the loaded boxes with the fetched detections.
    ///
    /// A failed fetch leaves the session open with no boxes.
    pub fn apply_detections(
        &mut self,
        result: Result<ProcessedImage, ClientError>,
        notices: &mut Notices,
    ) {
        self.detections_pending = false;
        let records = match result {
            Ok(processed) => {
                if let Some(filename) = &processed.filename {
                    log::debug!("Image {} is processed as {filename}", self.image_id);
                }
                processed.detections
            }
            Err(err) => {
                log::error!("Failed to load detections for image {}: {err}", self.image_id);
                notices.warning(format!("Could not load boxes for image {}", self.image_id));
                Vec::new()
            }
        };

        // Boxes added while the fetch was in flight survive; loaded ids continue after them.
        let added: Vec<BoundingBox> = std::mem::take(&mut self.boxes)
            .into_iter()
            .filter(|b| b.detection_id.is_none())
            .collect();
        let first_id = self.next_local_id;
        let mut boxes: Vec<BoundingBox> = records
            .iter()
            .zip(first_id..)
            .map(|(record, id)| self.box_from_record(id, record))
            .collect();
        self.next_local_id = boxes.iter().map(|b| b.id + 1).max().unwrap_or(first_id);
        let loaded = boxes.len();
        boxes.extend(added);
        self.boxes = boxes;

        let boxes = &self.boxes;
        self.editors.retain(|e| boxes.iter().any(|b| b.id == e.id()));
        if let Some(id) = self.capture {
            if self.get(id).is_none() {
                self.capture = None;
                self.lock = InteractionLock::Released;
            }
        }
        self.rebuild_editors();
        log::info!("Loaded {loaded} box(es) for image {}", self.image_id);
    }

    fn box_from_record(&self, id: BoxId, record: &DetectionRecord) -> BoundingBox {
        // A class id the catalog knows wins, then the name, then whatever was sent.
        let class_id = record
            .class_id
            .filter(|class_id| self.catalog.contains(*class_id))
            .or_else(|| self.catalog.find_by_name(&record.name).map(|entry| entry.id))
            .or(record.class_id);
        BoundingBox {
            id,
            detection_id: record.detection_id,
            class_id,
            geometry: record.geometry,
            confidence: record.confidence.unwrap_or(MANUAL_CONFIDENCE),
        }
    }

    pub fn apply_image(
        &mut self,
        result: Result<LoadedImage, ClientError>,
        notices: &mut Notices,
    ) -> Option<ColorImage> {
        self.image_pending = false;
        match result {
            Ok(loaded) => {
                self.set_natural_size(loaded.natural_size);
                Some(loaded.image)
            }
            Err(err) => {
                log::error!("Failed to load image {}: {err}", self.image_id);
                notices.error(format!("Could not load image {}", self.image_id));
                None
            }
        }
    }

    pub fn set_natural_size(&mut self, size: Size) {
        if !size.is_positive() {
            log::warn!("Ignoring unusable natural size {size:?} for image {}", self.image_id);
            return;
        }
        self.natural_size = Some(size);
        self.rebuild_editors();
    }

    /// Tracks the on-screen image size; editors are re-derived from stored geometry.
    pub fn set_rendered_size(&mut self, size: Size) {
        if self.rendered_size == Some(size) || !size.is_positive() {
            return;
        }
        log::debug!("Image {} rendered at {}x{}", self.image_id, size.width, size.height);
        self.rendered_size = Some(size);
        self.rebuild_editors();
    }

    fn rebuild_editors(&mut self) {
        let Some(scale) = self.scale() else {
            self.editors.clear();
            return;
        };
        let mut previous = std::mem::take(&mut self.editors);
        self.editors = self
            .boxes
            .iter()
            .map(|b| match previous.iter().position(|e| e.id() == b.id) {
                Some(index) => {
                    let mut editor = previous.swap_remove(index);
                    editor.rebase(b.geometry, scale);
                    editor
                }
                None => BoxEditor::new(b.id, b.geometry, b.class_id, scale),
            })
            .collect();
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Box Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Appends a default box labelled with the first class. None if the catalog is empty.
    pub fn add_box(&mut self) -> Option<BoxId> {
        let Some(class_id) = self.catalog.first_selectable().map(|entry| entry.id) else {
            log::warn!("Cannot add a box: the class catalog is empty");
            return None;
        };
        // Before layout, the default geometry is taken as natural pixels.
        let scale = self
            .scale()
            .unwrap_or_else(|| RenderScale::identity(Size::default()));
        let geometry = scale.to_natural(TopLeftBox::new(
            DEFAULT_BOX_X,
            DEFAULT_BOX_Y,
            DEFAULT_BOX_WIDTH,
            DEFAULT_BOX_HEIGHT,
        ));

        let id = self.next_local_id;
        self.next_local_id += 1;
        self.boxes.push(BoundingBox {
            id,
            detection_id: None,
            class_id: Some(class_id),
            geometry,
            confidence: MANUAL_CONFIDENCE,
        });
        self.rebuild_editors();
        log::debug!("Added box {id} to image {}", self.image_id);
        Some(id)
    }

    /// Removes a box unless it is the last one. Returns whether anything was removed.
    pub fn remove_box(&mut self, id: BoxId) -> bool {
        if self.boxes.len() <= 1 {
            log::debug!("Refusing to remove the last box of image {}", self.image_id);
            return false;
        }
        let Some(index) = self.boxes.iter().position(|b| b.id == id) else {
            return false;
        };
        self.boxes.remove(index);
        self.editors.retain(|e| e.id() != id);
        if self.capture == Some(id) {
            self.capture = None;
            self.lock = InteractionLock::Released;
        }
        log::debug!("Removed box {id} from image {}", self.image_id);
        true
    }

    /// Merges a change reported by an editor into the stored box.
    pub fn update_box(&mut self, change: BoxChange) -> bool {
        let Some(stored) = self.boxes.iter_mut().find(|b| b.id == change.id) else {
            log::warn!("Change for unknown box {}", change.id);
            return false;
        };
        stored.geometry = change.geometry;
        if let Some(class_id) = change.class_id {
            stored.class_id = Some(class_id);
        }
        stored.confidence = MANUAL_CONFIDENCE;
        true
    }

    /// Sets a box's class. Only classes from the catalog are accepted.
    pub fn set_box_class(&mut self, id: BoxId, class_id: ClassId) -> bool {
        if !self.catalog.contains(class_id) {
            log::warn!("Ignoring unknown class {class_id} for box {id}");
            return false;
        }
        if let Some(editor) = self.editors.iter_mut().find(|e| e.id() == id) {
            editor.set_class(class_id);
            self.sync_editors();
            return true;
        }
        match self.boxes.iter_mut().find(|b| b.id == id) {
            Some(stored) => {
                stored.class_id = Some(class_id);
                stored.confidence = MANUAL_CONFIDENCE;
                true
            }
            None => false,
        }
    }

    fn sync_editors(&mut self) {
        let changes: Vec<BoxChange> = self
            .editors
            .iter_mut()
            .filter_map(BoxEditor::take_change)
            .collect();
        for change in changes {
            self.update_box(change);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pointer Routing
    // ─────────────────────────────────────────────────────────────────────────────

    /// Handles a press at `pointer`, relative to the rendered image's top-left corner.
    pub fn pointer_pressed(&mut self, pointer: Pos2) -> PointerOutcome {
        let show_remove = self.can_remove();
        // Later boxes are drawn on top.
        let hit = self
            .editors
            .iter()
            .rev()
            .find_map(|e| e.hit_test(pointer, show_remove).map(|hit| (e.id(), hit)));

        let Some((id, hit)) = hit else {
            return PointerOutcome::Background;
        };
        match hit {
            BoxHit::Remove => {
                if self.remove_box(id) {
                    PointerOutcome::Removed(id)
                } else {
                    PointerOutcome::Background
                }
            }
            BoxHit::Label => PointerOutcome::Label(id),
            BoxHit::Handle(handle) => {
                log::debug!("Resizing box {id} from its {} corner", handle.code());
                self.capture_editor(id, |editor| editor.begin_resize(handle, pointer));
                PointerOutcome::Captured(id)
            }
            BoxHit::Body => {
                self.capture_editor(id, |editor| editor.begin_drag(pointer));
                PointerOutcome::Captured(id)
            }
        }
    }

    fn capture_editor(&mut self, id: BoxId, begin: impl FnOnce(&mut BoxEditor)) {
        if let Some(editor) = self.editors.iter_mut().find(|e| e.id() == id) {
            begin(editor);
            self.capture = Some(id);
            self.lock = InteractionLock::Held;
        }
    }

    /// Moves go only to the editor that captured the pointer.
    pub fn pointer_moved(&mut self, pointer: Pos2) {
        let Some(id) = self.capture else {
            return;
        };
        if let Some(editor) = self.editors.iter_mut().find(|e| e.id() == id) {
            editor.pointer_moved(pointer);
        }
        self.sync_editors();
    }

    pub fn pointer_released(&mut self, now: Instant) {
        let Some(id) = self.capture.take() else {
            return;
        };
        if let Some(editor) = self.editors.iter_mut().find(|e| e.id() == id) {
            editor.pointer_released();
        }
        self.sync_editors();
        self.lock = InteractionLock::Releasing {
            until: now + INTERACTION_RELEASE_DELAY,
        };
    }

    pub fn is_interaction_locked(&self, now: Instant) -> bool {
        match self.lock {
            InteractionLock::Released => false,
            InteractionLock::Held => true,
            InteractionLock::Releasing { until } => now < until,
        }
    }

    /// Whether a click outside the image may close the session.
    pub fn allows_dismiss(&self, now: Instant) -> bool {
        !self.is_interaction_locked(now)
    }

    /// True while the lock is counting down and a timed repaint is needed to observe it.
    pub fn lock_is_releasing(&self, now: Instant) -> bool {
        matches!(self.lock, InteractionLock::Releasing { until } if now < until)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Saving
    // ─────────────────────────────────────────────────────────────────────────────

    /// Builds the batch to post, substituting the first class for unknown class references.
    pub fn annotation_updates(&self) -> Result<Vec<AnnotationUpdate>, SaveError> {
        if self.boxes.is_empty() {
            return Err(SaveError::NothingToSave);
        }
        self.boxes
            .iter()
            .map(|b| {
                let resolution = self
                    .catalog
                    .resolve(b.class_id)
                    .ok_or(SaveError::NoClassAvailable)?;
                if resolution.substituted {
                    log::warn!(
                        "Box {} has invalid class {:?}; saving it as '{}'",
                        b.id,
                        b.class_id,
                        resolution.entry.name
                    );
                }
                Ok(AnnotationUpdate {
                    detection_id: b.detection_id,
                    x: b.geometry.x,
                    y: b.geometry.y,
                    width: b.geometry.width,
                    height: b.geometry.height,
                    label: resolution.entry.name.clone(),
                })
            })
            .collect()
    }

    /// Posts every box as one batch. At most one save runs at a time.
    pub fn save(&mut self, jobs: &mut Jobs) -> Result<usize, SaveError> {
        if self.save_pending {
            return Err(SaveError::AlreadyPending);
        }
        let updates = self.annotation_updates()?;
        let count = updates.len();
        let (image_id, generation) = (self.image_id, self.generation);
        self.save_pending = true;
        log::info!("Saving {count} box(es) for image {image_id}");

        jobs.spawn(move |backend| JobOutput::Session {
            generation,
            event: SessionEvent::Saved(backend.save_annotations(image_id, &updates)),
        });
        Ok(count)
    }

    /// Reports the save outcome. Local boxes are kept either way so a failed save can be retried.
    pub fn finish_save(&mut self, result: Result<(), ClientError>, notices: &mut Notices) {
        self.save_pending = false;
        match result {
            Ok(()) => notices.success("Annotations saved"),
            Err(err) => notices.error(format!("Failed to save annotations: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;
    use crate::coords::{center_to_top_left, top_left_to_center};
    use crate::notice::NoticeLevel;
    use egui::pos2;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn catalog() -> Arc<ClassCatalog> {
        Arc::new(ClassCatalog::new([(0, "dog"), (1, "cat"), (2, "pant_tigr")]))
    }

    fn record(x: f32, y: f32, width: f32, height: f32, name: &str) -> DetectionRecord {
        DetectionRecord {
            detection_id: None,
            geometry: CenterBox {
                x,
                y,
                width,
                height,
            },
            name: name.to_string(),
            class_id: None,
            confidence: Some(0.8),
        }
    }

    fn loaded_session(records: Vec<DetectionRecord>, size: Size) -> AnnotationSession {
        let mut session = AnnotationSession::new(1, 1, catalog());
        session.apply_detections(
            Ok(ProcessedImage {
                detections: records,
                ..Default::default()
            }),
            &mut Notices::default(),
        );
        session.set_natural_size(size);
        session.set_rendered_size(size);
        session
    }

    fn next_event(jobs: &mut Jobs) -> (u64, SessionEvent) {
        match jobs.wait(WAIT) {
            Some(JobOutput::Session { generation, event }) => (generation, event),
            _ => panic!("expected a session event"),
        }
    }

    #[test]
    fn test_add_box_to_empty_image() {
        let mut session = loaded_session(Vec::new(), Size::new(800.0, 600.0));
        assert!(session.boxes().is_empty());

        let id = session.add_box().unwrap();
        assert_eq!(session.boxes().len(), 1);
        let added = session.get(id).unwrap();
        assert_eq!(added.class_id, Some(0));
        assert_eq!(added.detection_id, None);
        let g = added.geometry;
        assert_eq!(
            center_to_top_left(g.x, g.y, g.width, g.height),
            TopLeftBox::new(10.0, 10.0, 100.0, 30.0)
        );
        assert_eq!(session.editors()[0].rect(), TopLeftBox::new(10.0, 10.0, 100.0, 30.0));
    }

    #[test]
    fn test_add_box_scales_default_to_natural_pixels() {
        let mut session = AnnotationSession::new(1, 1, catalog());
        session.set_natural_size(Size::new(1600.0, 1200.0));
        session.set_rendered_size(Size::new(800.0, 600.0));
        let id = session.add_box().unwrap();
        assert_eq!(
            session.get(id).unwrap().geometry,
            top_left_to_center(20.0, 20.0, 200.0, 60.0)
        );
    }

    #[test]
    fn test_add_box_with_empty_catalog_is_noop() {
        let mut session = AnnotationSession::new(1, 1, Arc::new(ClassCatalog::default()));
        assert!(!session.can_add_box());
        assert_eq!(session.add_box(), None);
        assert!(session.boxes().is_empty());
    }

    #[test]
    fn test_loaded_boxes_round_trip_exactly() {
        let mut session = loaded_session(
            vec![
                record(50.0, 50.0, 20.0, 20.0, "dog"),
                record(200.0, 80.0, 40.0, 10.0, "cat"),
            ],
            Size::new(800.0, 600.0),
        );
        let ids: Vec<_> = session.boxes().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let back: Vec<CenterBox> = session
            .editors()
            .iter()
            .map(|e| {
                let r = e.rect();
                top_left_to_center(r.x, r.y, r.width, r.height)
            })
            .collect();
        assert_eq!(
            back,
            vec![
                CenterBox { x: 50.0, y: 50.0, width: 20.0, height: 20.0 },
                CenterBox { x: 200.0, y: 80.0, width: 40.0, height: 10.0 },
            ]
        );
        assert_eq!(session.boxes()[1].class_id, Some(1));
        assert_eq!(session.add_box(), Some(3));
    }

    #[test]
    fn test_record_class_resolution() {
        let mut unknown_name = record(10.0, 10.0, 5.0, 5.0, "unicorn");
        unknown_name.class_id = Some(99);
        let mut stale_id = record(10.0, 10.0, 5.0, 5.0, "pant_tigr");
        stale_id.class_id = Some(73);
        let session = loaded_session(
            vec![unknown_name, stale_id, record(1.0, 1.0, 1.0, 1.0, "unicorn")],
            Size::new(100.0, 100.0),
        );
        let classes: Vec<_> = session.boxes().iter().map(|b| b.class_id).collect();
        assert_eq!(classes, vec![Some(99), Some(2), None]);
    }

    #[test]
    fn test_failed_fetch_opens_empty() {
        let mut session = AnnotationSession::new(4, 1, catalog());
        let mut notices = Notices::default();
        session.apply_detections(
            Err(ClientError::Malformed("no metadata".to_string())),
            &mut notices,
        );
        assert!(session.boxes().is_empty());
        assert_eq!(notices.last().map(|n| n.level), Some(NoticeLevel::Warning));
        assert_eq!(session.add_box(), Some(1));
    }

    #[test]
    fn test_box_added_while_loading_survives_detections() {
        let mut session = AnnotationSession::new(1, 1, catalog());
        session.detections_pending = true;
        session.set_natural_size(Size::new(800.0, 600.0));
        session.set_rendered_size(Size::new(800.0, 600.0));
        assert!(session.can_add_box());
        let added = session.add_box().unwrap();
        assert_eq!(added, 1);

        session.apply_detections(
            Ok(ProcessedImage {
                detections: vec![record(200.0, 200.0, 100.0, 50.0, "cat")],
                ..Default::default()
            }),
            &mut Notices::default(),
        );

        let boxes: Vec<_> = session
            .boxes()
            .iter()
            .map(|b| (b.id, b.class_id))
            .collect();
        assert_eq!(boxes, vec![(2, Some(1)), (1, Some(0))]);
        assert_eq!(session.editors().len(), 2);
        assert_eq!(
            session.editors()[1].rect(),
            TopLeftBox::new(10.0, 10.0, 100.0, 30.0)
        );
        assert_eq!(session.add_box(), Some(3));
    }

    #[test]
    fn test_last_box_cannot_be_removed() {
        let mut session = loaded_session(
            vec![record(60.0, 25.0, 100.0, 30.0, "dog")],
            Size::new(800.0, 600.0),
        );
        assert!(!session.can_remove());
        assert!(!session.remove_box(1));
        assert_eq!(session.boxes().len(), 1);

        let second = session.add_box().unwrap();
        assert!(session.can_remove());
        assert!(session.remove_box(1));
        assert_eq!(session.boxes().len(), 1);
        assert_eq!(session.boxes()[0].id, second);
        assert_eq!(session.editors().len(), 1);
    }

    #[test]
    fn test_drag_updates_only_captured_box() {
        let mut session = loaded_session(
            vec![
                record(100.0, 100.0, 100.0, 60.0, "dog"),
                record(400.0, 300.0, 100.0, 60.0, "cat"),
            ],
            Size::new(800.0, 600.0),
        );
        let first_before = session.boxes()[0].clone();
        let start = Instant::now();

        assert_eq!(session.pointer_pressed(pos2(400.0, 310.0)), PointerOutcome::Captured(2));
        assert!(session.is_interaction_locked(start));
        session.pointer_moved(pos2(450.0, 330.0));
        session.pointer_released(start);

        assert_eq!(session.boxes()[0], first_before);
        let moved = &session.boxes()[1];
        assert_eq!(moved.geometry.x, 450.0);
        assert_eq!(moved.geometry.y, 320.0);
        assert_eq!(moved.confidence, MANUAL_CONFIDENCE);
        assert_eq!(session.captured(), None);

        session.pointer_moved(pos2(0.0, 0.0));
        assert_eq!(session.boxes()[1].geometry.x, 450.0);
    }

    #[test]
    fn test_interaction_lock_outlives_release() {
        let mut session = loaded_session(
            vec![record(100.0, 100.0, 100.0, 60.0, "dog")],
            Size::new(800.0, 600.0),
        );
        let now = Instant::now();
        assert!(session.allows_dismiss(now));

        session.pointer_pressed(pos2(150.0, 129.0));
        assert!(!session.allows_dismiss(now + Duration::from_secs(10)));

        session.pointer_released(now);
        assert!(!session.allows_dismiss(now));
        assert!(session.lock_is_releasing(now));
        assert!(session.allows_dismiss(now + INTERACTION_RELEASE_DELAY));
    }

    #[test]
    fn test_background_press_captures_nothing() {
        let mut session = loaded_session(
            vec![record(100.0, 100.0, 100.0, 60.0, "dog")],
            Size::new(800.0, 600.0),
        );
        assert_eq!(session.pointer_pressed(pos2(700.0, 500.0)), PointerOutcome::Background);
        assert!(session.allows_dismiss(Instant::now()));
    }

    #[test]
    fn test_remove_button_press() {
        let mut session = loaded_session(
            vec![
                record(100.0, 100.0, 100.0, 60.0, "dog"),
                record(400.0, 300.0, 100.0, 60.0, "cat"),
            ],
            Size::new(800.0, 600.0),
        );
        let remove = session.editors()[0].remove_rect().center();
        assert_eq!(session.pointer_pressed(remove), PointerOutcome::Removed(1));
        assert_eq!(session.boxes().len(), 1);
    }

    #[test]
    fn test_window_resize_keeps_stored_geometry() {
        let mut session = AnnotationSession::new(1, 1, catalog());
        session.apply_detections(
            Ok(ProcessedImage {
                detections: vec![record(400.0, 300.0, 400.0, 200.0, "dog")],
                ..Default::default()
            }),
            &mut Notices::default(),
        );
        session.set_natural_size(Size::new(1600.0, 1200.0));
        session.set_rendered_size(Size::new(800.0, 600.0));
        let stored = session.boxes()[0].geometry;

        session.set_rendered_size(Size::new(400.0, 300.0));
        session.set_rendered_size(Size::new(1000.0, 750.0));
        assert_eq!(session.boxes()[0].geometry, stored);
        assert_eq!(session.boxes()[0].confidence, 0.8);
        assert_eq!(session.editors()[0].rect(), TopLeftBox::new(125.0, 125.0, 250.0, 125.0));
    }

    #[test]
    fn test_set_box_class() {
        let mut session = loaded_session(
            vec![record(100.0, 100.0, 100.0, 60.0, "dog")],
            Size::new(800.0, 600.0),
        );
        assert!(!session.set_box_class(1, 42));
        assert!(session.set_box_class(1, 2));
        assert_eq!(session.boxes()[0].class_id, Some(2));
        assert_eq!(session.editors()[0].class_id(), Some(2));
    }

    #[test]
    fn test_save_substitutes_invalid_class() {
        let backend = Arc::new(FakeBackend::default());
        let mut jobs = Jobs::new(backend.clone());
        let mut session = loaded_session(Vec::new(), Size::new(800.0, 600.0));
        session.add_box();
        session.boxes[0].class_id = Some(999);

        assert_eq!(session.save(&mut jobs).unwrap(), 1);
        let (generation, event) = next_event(&mut jobs);
        assert!(session.accepts(generation));
        let mut notices = Notices::default();
        session.handle_event(event, &mut notices);

        let saved = backend.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, 1);
        assert_eq!(saved[0].1[0].label, "dog");
        assert_eq!(saved[0].1[0].detection_id, None);
        assert_eq!(notices.last().map(|n| n.level), Some(NoticeLevel::Success));
        assert!(!session.is_save_pending());
    }

    #[test]
    fn test_second_save_is_rejected_while_pending() {
        let backend = Arc::new(FakeBackend::default());
        let mut jobs = Jobs::new(backend.clone());
        let mut session = loaded_session(
            vec![record(60.0, 25.0, 100.0, 30.0, "cat")],
            Size::new(800.0, 600.0),
        );

        session.save(&mut jobs).unwrap();
        assert!(matches!(session.save(&mut jobs), Err(SaveError::AlreadyPending)));

        let (_, event) = next_event(&mut jobs);
        session.handle_event(event, &mut Notices::default());
        assert!(session.save(&mut jobs).is_ok());
        next_event(&mut jobs);
        assert_eq!(backend.saved().len(), 2);
    }

    #[test]
    fn test_failed_save_keeps_boxes() {
        let backend = Arc::new(FakeBackend {
            fail_saves: true,
            ..Default::default()
        });
        let mut jobs = Jobs::new(backend);
        let mut session = loaded_session(
            vec![record(60.0, 25.0, 100.0, 30.0, "cat")],
            Size::new(800.0, 600.0),
        );
        let before = session.boxes().to_vec();

        session.save(&mut jobs).unwrap();
        let (_, event) = next_event(&mut jobs);
        let mut notices = Notices::default();
        session.handle_event(event, &mut notices);

        assert_eq!(session.boxes(), before.as_slice());
        assert_eq!(notices.last().map(|n| n.level), Some(NoticeLevel::Error));
        assert!(!session.is_save_pending());
    }

    #[test]
    fn test_save_refusals() {
        let mut jobs = Jobs::new(Arc::new(FakeBackend::default()));
        let mut empty = AnnotationSession::new(1, 1, catalog());
        assert!(matches!(empty.save(&mut jobs), Err(SaveError::NothingToSave)));

        let mut no_classes = AnnotationSession::new(1, 1, Arc::new(ClassCatalog::default()));
        no_classes.apply_detections(
            Ok(ProcessedImage {
                detections: vec![record(60.0, 25.0, 100.0, 30.0, "dog")],
                ..Default::default()
            }),
            &mut Notices::default(),
        );
        assert!(matches!(no_classes.save(&mut jobs), Err(SaveError::NoClassAvailable)));
        assert!(!no_classes.is_save_pending());
    }

    #[test]
    fn test_open_fetches_and_ignores_stale_results() {
        let mut backend = FakeBackend::default();
        backend.processed.insert(
            7,
            ProcessedImage {
                detections: vec![record(60.0, 25.0, 100.0, 30.0, "dog")],
                ..Default::default()
            },
        );
        let mut jobs = Jobs::new(Arc::new(backend));

        let stale = AnnotationSession::open(7, 1, catalog(), &mut jobs);
        assert!(stale.is_loading());
        drop(stale);
        let mut current = AnnotationSession::new(7, 2, catalog());

        let mut notices = Notices::default();
        for _ in 0..2 {
            let (generation, event) = next_event(&mut jobs);
            assert_eq!(generation, 1);
            if current.accepts(generation) {
                current.handle_event(event, &mut notices);
            }
        }
        assert!(current.boxes().is_empty());
        assert!(notices.is_empty());

        let mut fresh = AnnotationSession::open(7, 3, catalog(), &mut jobs);
        for _ in 0..2 {
            let (generation, event) = next_event(&mut jobs);
            assert!(fresh.accepts(generation));
            fresh.handle_event(event, &mut notices);
        }
        assert!(!fresh.is_loading());
        assert_eq!(fresh.boxes().len(), 1);
        // The fake has no raw bytes for image 7.
        assert_eq!(notices.last().map(|n| n.level), Some(NoticeLevel::Error));
    }
}
