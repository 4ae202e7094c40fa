use crate::api::{HttpBackend, ImageId};
use crate::catalog::{ClassCatalog, ClassFilter, ClassId};
use crate::config::AppConfig;
use crate::constants::{
    ANNOTATION_WINDOW_FILL, COLOR_BOX_ACTIVE, COLOR_BOX_FILL, COLOR_BOX_STROKE, COLOR_HANDLE,
    COLOR_REMOVE_BUTTON, COLOR_REMOVE_BUTTON_HOVER, COLOR_TOAST_ERROR, COLOR_TOAST_INFO,
    COLOR_TOAST_SUCCESS, COLOR_TOAST_WARNING, COLOR_TOOLBAR_BG, IMAGE_LIST_WIDTH,
    TIMED_REPAINT_INTERVAL, TOOLBAR_BUTTON_SIZE, TOOLBAR_ICON_SIZE, TOOLBAR_START_SPACING,
};
use crate::coords::Size;
use crate::editor::{BoxEditor, BoxId, ResizeHandle};
use crate::error::SaveError;
use crate::jobs::{JobOutput, Jobs};
use crate::notice::{NoticeLevel, Notices};
use crate::session::{AnnotationSession, PointerOutcome};
use eframe::egui::{
    self, Align2, Color32, FontId, Order, Pos2, Rect, RichText, Sense, Stroke, UiBuilder, Vec2,
};
use egui::{pos2, vec2};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Image currently open in the annotation window.
struct OpenImage {
    session: AnnotationSession,
    texture: Option<egui::TextureHandle>,
}

#[derive(Clone, Copy, PartialEq)]
enum WindowAction {
    AddBox,
    Save,
    Close,
}

pub struct AnnotatorApp {
    catalog: Arc<ClassCatalog>,
    jobs: Jobs,
    notices: Notices,
    filter: ClassFilter,
    images: Vec<ImageId>,
    images_loading: bool,
    open: Option<OpenImage>,
    next_generation: u64,
}

impl AnnotatorApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        let backend = Arc::new(HttpBackend::new(&config));
        let jobs = Jobs::new(backend).with_repaint(cc.egui_ctx.clone());
        let mut app = Self {
            catalog: Arc::new(ClassCatalog::wildlife()),
            jobs,
            notices: Notices::default(),
            filter: ClassFilter::All,
            images: Vec::new(),
            images_loading: false,
            open: None,
            next_generation: 0,
        };
        app.refresh_images();
        app
    }

    fn refresh_images(&mut self) {
        let class_name = match self.filter {
            ClassFilter::All => None,
            ClassFilter::Class(id) => self.catalog.get(id).map(|entry| entry.name.clone()),
        };
        self.images_loading = true;
        self.jobs.refresh_images(self.filter, class_name);
    }

    fn open_image(&mut self, image_id: ImageId) {
        self.close_image();
        self.next_generation += 1;
        let session = AnnotationSession::open(
            image_id,
            self.next_generation,
            Arc::clone(&self.catalog),
            &mut self.jobs,
        );
        self.open = Some(OpenImage {
            session,
            texture: None,
        });
    }

    /// Drops the session; unsaved edits are discarded.
    fn close_image(&mut self) {
        if let Some(open) = self.open.take() {
            log::info!("Closed image {}", open.session.image_id());
        }
    }

    fn pick_upload(&mut self, folder: bool) {
        let dialog = if folder {
            rfd::FileDialog::new().add_filter("Zip archive", &["zip"])
        } else {
            rfd::FileDialog::new().add_filter("Images", &["png", "jpg", "jpeg"])
        };
        let Some(path) = dialog.pick_file() else {
            return;
        };
        self.start_upload(path, folder);
    }

    fn start_upload(&mut self, path: PathBuf, folder: bool) {
        log::info!("Uploading {}", path.display());
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.notices.info(format!("Uploading {name}..."));
        self.jobs.spawn(move |backend| {
            let result = if folder {
                backend.upload_folder(&path)
            } else {
                backend.upload_image(&path)
            };
            JobOutput::Upload(result)
        });
    }

    fn save_open_image(&mut self) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        match open.session.save(&mut self.jobs) {
            Ok(count) => log::debug!("Save of {count} box(es) started"),
            Err(SaveError::AlreadyPending) => {
                log::warn!("Save rejected: another save is still running");
                self.notices.warning("A save is already in progress");
            }
            Err(err) => self.notices.warning(err.to_string()),
        }
    }

    fn poll_jobs(&mut self, ctx: &egui::Context) {
        for output in self.jobs.drain() {
            match output {
                JobOutput::ImageList { filter, result } => {
                    if filter != self.filter {
                        log::debug!("Discarding image list for stale filter {filter:?}");
                        continue;
                    }
                    self.images_loading = false;
                    match result {
                        Ok(images) => self.images = images,
                        Err(err) => {
                            log::error!("Failed to list images: {err}");
                            self.notices.error("Could not load the image list");
                            self.images.clear();
                        }
                    }
                }
                JobOutput::Upload(result) => match result {
                    Ok(ids) => {
                        log::info!("Upload finished: {} processed image(s)", ids.len());
                        self.notices.success("Upload complete");
                        self.refresh_images();
                    }
                    Err(err) => self.notices.error(format!("Upload failed: {err}")),
                },
                JobOutput::Session { generation, event } => match self.open.as_mut() {
                    Some(open) if open.session.accepts(generation) => {
                        if let Some(image) = open.session.handle_event(event, &mut self.notices) {
                            let label = format!("raw-image-{}", open.session.image_id());
                            open.texture =
                                Some(ctx.load_texture(label, image, egui::TextureOptions::LINEAR));
                        }
                    }
                    _ => log::warn!("Discarding late result for closed session {generation}"),
                },
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Panels
    // ─────────────────────────────────────────────────────────────────────────────

    fn show_toolbar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("toolbar")
            .frame(
                egui::Frame::default()
                    .fill(COLOR_TOOLBAR_BG)
                    .inner_margin(0.0)
                    .outer_margin(0.0),
            )
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.add_space(TOOLBAR_START_SPACING);
                    if toolbar_button(ui, "🔄", "Refresh Images") {
                        self.refresh_images();
                    }
                    if toolbar_button(ui, "🖼", "Upload Image") {
                        self.pick_upload(false);
                    }
                    if toolbar_button(ui, "📦", "Upload Folder (zip)") {
                        self.pick_upload(true);
                    }
                    if self.jobs.is_busy() {
                        ui.spinner();
                    }
                });
            });
    }

    fn show_image_list(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("image_list")
            .default_width(IMAGE_LIST_WIDTH)
            .show(ctx, |ui| {
                let previous = self.filter;
                egui::ComboBox::from_label("Class")
                    .selected_text(self.catalog.filter_label(self.filter))
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut self.filter, ClassFilter::All, "All");
                        for entry in self.catalog.selectable() {
                            ui.selectable_value(
                                &mut self.filter,
                                ClassFilter::Class(entry.id),
                                entry.name.as_str(),
                            );
                        }
                    });
                if self.filter != previous {
                    self.refresh_images();
                }
                ui.separator();

                if self.images_loading && self.images.is_empty() {
                    ui.spinner();
                    return;
                }
                if self.images.is_empty() {
                    ui.label("No images");
                    return;
                }

                let open_id = self.open.as_ref().map(|open| open.session.image_id());
                let mut clicked = None;
                egui::ScrollArea::vertical().show(ui, |ui| {
                    for &id in &self.images {
                        if ui
                            .selectable_label(open_id == Some(id), format!("Image {id}"))
                            .clicked()
                        {
                            clicked = Some(id);
                        }
                    }
                });
                if let Some(id) = clicked {
                    self.open_image(id);
                }
            });
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Annotation Window
    // ─────────────────────────────────────────────────────────────────────────────

    fn show_annotation_window(&mut self, ctx: &egui::Context, dismissable: bool) {
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let now = Instant::now();
        let max_size = ctx.screen_rect().size() * ANNOTATION_WINDOW_FILL;
        let mut window_open = true;
        let mut action = None;

        let window = egui::Window::new(format!("Image {}", open.session.image_id()))
            .id(egui::Id::new("annotation_window"))
            .open(&mut window_open)
            .collapsible(false)
            .resizable(false)
            .movable(false)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .max_size(max_size)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(open.session.can_add_box(), egui::Button::new("➕ Add Box"))
                        .clicked()
                    {
                        action = Some(WindowAction::AddBox);
                    }
                    let save_label = if open.session.is_save_pending() {
                        "Saving..."
                    } else {
                        "💾 Save"
                    };
                    if ui
                        .add_enabled(!open.session.is_save_pending(), egui::Button::new(save_label))
                        .clicked()
                    {
                        action = Some(WindowAction::Save);
                    }
                    if ui.button("Close").clicked() {
                        action = Some(WindowAction::Close);
                    }
                    ui.separator();
                    if open.session.is_loading() {
                        ui.spinner();
                    } else {
                        ui.label(format!("{} box(es)", open.session.boxes().len()));
                    }
                });
                ui.separator();

                let available = vec2(max_size.x, (max_size.y - 80.0).max(1.0));
                match (&open.texture, open.session.natural_size()) {
                    (Some(texture), Some(natural)) => {
                        show_image_editor(ui, &mut open.session, texture, natural, available, now);
                    }
                    _ if open.session.is_loading() => {
                        ui.allocate_ui(vec2(available.x * 0.5, available.y * 0.5), |ui| {
                            ui.centered_and_justified(|ui| ui.spinner());
                        });
                    }
                    _ => {
                        ui.label("The image could not be loaded.");
                    }
                }
            });

        if open.session.lock_is_releasing(now) {
            ctx.request_repaint_after(TIMED_REPAINT_INTERVAL);
        }

        let popup_open = ctx.memory(|m| m.any_popup_open());
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) && !popup_open {
            action = Some(WindowAction::Close);
        }

        // A click on the backdrop closes the window, but not right after an edit ended.
        if let Some(window) = &window {
            let window_rect = window.response.rect;
            let clicked_outside = ctx.input(|i| {
                i.pointer.primary_clicked()
                    && i.pointer
                        .interact_pos()
                        .is_some_and(|pos| !window_rect.contains(pos))
                    && i.pointer
                        .press_origin()
                        .is_some_and(|pos| !window_rect.contains(pos))
            });
            if clicked_outside && dismissable && !popup_open && open.session.allows_dismiss(now) {
                action = Some(WindowAction::Close);
            }
        }
        if !window_open {
            action = Some(WindowAction::Close);
        }

        match action {
            Some(WindowAction::AddBox) => {
                if open.session.add_box().is_none() {
                    self.notices.warning("No class is available for a new box");
                }
            }
            Some(WindowAction::Save) => self.save_open_image(),
            Some(WindowAction::Close) => self.close_image(),
            None => {}
        }
    }

    fn show_notices(&mut self, ctx: &egui::Context) {
        self.notices.prune(Instant::now());
        if self.notices.is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new("notices"))
            .order(Order::Foreground)
            .anchor(Align2::CENTER_TOP, vec2(0.0, TOOLBAR_BUTTON_SIZE + 16.0))
            .interactable(false)
            .show(ctx, |ui| {
                for notice in self.notices.iter() {
                    let fill = match notice.level {
                        NoticeLevel::Info => COLOR_TOAST_INFO,
                        NoticeLevel::Success => COLOR_TOAST_SUCCESS,
                        NoticeLevel::Warning => COLOR_TOAST_WARNING,
                        NoticeLevel::Error => COLOR_TOAST_ERROR,
                    };
                    egui::Frame::none()
                        .fill(fill)
                        .rounding(6.0)
                        .inner_margin(egui::Margin::symmetric(12.0, 6.0))
                        .show(ui, |ui| {
                            ui.label(RichText::new(&notice.text).color(Color32::WHITE));
                        });
                    ui.add_space(4.0);
                }
            });
        ctx.request_repaint_after(TIMED_REPAINT_INTERVAL);
    }
}

impl eframe::App for AnnotatorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_jobs(ctx);
        let open_before = self.open.as_ref().map(|open| open.session.generation());

        self.show_toolbar(ctx);
        self.show_image_list(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| {
                ui.label(
                    RichText::new("Select an image to review its bounding boxes")
                        .color(Color32::GRAY),
                );
            });
        });

        // The click that opened a new image must not also dismiss it.
        let open_now = self.open.as_ref().map(|open| open.session.generation());
        self.show_annotation_window(ctx, open_before == open_now);
        self.show_notices(ctx);
    }
}

fn toolbar_button(ui: &mut egui::Ui, icon: &str, hover: &str) -> bool {
    ui.add(
        egui::Button::new(RichText::new(icon).size(TOOLBAR_ICON_SIZE))
            .min_size(Vec2::splat(TOOLBAR_BUTTON_SIZE))
            .frame(false),
    )
    .on_hover_text(hover)
    .clicked()
}

/// Draws the image with its boxes and feeds pointer input to the session.
fn show_image_editor(
    ui: &mut egui::Ui,
    session: &mut AnnotationSession,
    texture: &egui::TextureHandle,
    natural: Size,
    available: Vec2,
    now: Instant,
) {
    let fit = (available.x / natural.width)
        .min(available.y / natural.height)
        .min(1.0);
    let (rect, _response) = ui.allocate_exact_size(
        vec2(natural.width * fit, natural.height * fit),
        Sense::click_and_drag(),
    );
    session.set_rendered_size(Size::new(rect.width(), rect.height()));

    let painter = ui.painter_at(rect);
    painter.image(
        texture.id(),
        rect,
        Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
        Color32::WHITE,
    );

    let ctx = ui.ctx().clone();
    let popup_open = ctx.memory(|m| m.any_popup_open());
    let (pressed, released, press_pos, latest_pos, hover_pos) = ctx.input(|i| {
        (
            i.pointer.primary_pressed(),
            i.pointer.primary_released(),
            i.pointer.press_origin(),
            i.pointer.latest_pos(),
            i.pointer.hover_pos(),
        )
    });
    let to_local = |pos: Pos2| pos2(pos.x - rect.min.x, pos.y - rect.min.y);

    if pressed && !popup_open {
        if let Some(pos) = press_pos.filter(|pos| rect.contains(*pos)) {
            match session.pointer_pressed(to_local(pos)) {
                PointerOutcome::Captured(id) => log::debug!("Editing box {id}"),
                PointerOutcome::Removed(id) => log::debug!("Removed box {id}"),
                PointerOutcome::Label(_) | PointerOutcome::Background => {}
            }
        }
    }
    if session.captured().is_some() {
        if let Some(pos) = latest_pos {
            session.pointer_moved(to_local(pos));
        }
    }
    if released {
        session.pointer_released(now);
    }

    let offset = rect.min.to_vec2();
    let show_remove = session.can_remove();
    let captured = session.captured();
    let mut class_changes = Vec::new();

    for editor in session.editors() {
        let area = editor.area().translate(offset);
        let stroke_color = if captured == Some(editor.id()) {
            COLOR_BOX_ACTIVE
        } else {
            COLOR_BOX_STROKE
        };
        painter.rect_filled(area, 0.0, COLOR_BOX_FILL);
        painter.rect_stroke(area, 0.0, Stroke::new(2.0, stroke_color));

        for handle in ResizeHandle::ALL {
            painter.rect_filled(editor.handle_rect(handle).translate(offset), 1.0, COLOR_HANDLE);
        }

        if show_remove {
            let remove = editor.remove_rect().translate(offset);
            let hovered = hover_pos.is_some_and(|pos| remove.contains(pos));
            painter.circle_filled(
                remove.center(),
                remove.width() / 2.0,
                if hovered {
                    COLOR_REMOVE_BUTTON_HOVER
                } else {
                    COLOR_REMOVE_BUTTON
                },
            );
            painter.text(
                remove.center(),
                Align2::CENTER_CENTER,
                "x",
                FontId::monospace(12.0),
                Color32::WHITE,
            );
        }

        if let Some(change) = class_selector(ui, session.catalog(), editor, offset, show_remove) {
            class_changes.push(change);
        }
    }

    for (id, class_id) in class_changes {
        session.set_box_class(id, class_id);
    }
}

fn class_selector(
    ui: &mut egui::Ui,
    catalog: &ClassCatalog,
    editor: &BoxEditor,
    offset: Vec2,
    show_remove: bool,
) -> Option<(BoxId, ClassId)> {
    let label_rect = editor.label_rect(show_remove).translate(offset);
    if label_rect.width() < 1.0 {
        return None;
    }
    let current = editor.class_id();
    let mut choice = current;
    let selected_text = catalog
        .display_entry(current)
        .map(|entry| entry.name.clone())
        .unwrap_or_default();

    let mut child = ui.new_child(UiBuilder::new().max_rect(label_rect));
    egui::ComboBox::from_id_salt(("box_class", editor.id()))
        .selected_text(selected_text)
        .width((label_rect.width() - 8.0).max(16.0))
        .show_ui(&mut child, |ui| {
            for entry in catalog.selectable() {
                ui.selectable_value(&mut choice, Some(entry.id), entry.name.as_str());
            }
        });

    match choice {
        Some(class_id) if choice != current => Some((editor.id(), class_id)),
        _ => None,
    }
}
