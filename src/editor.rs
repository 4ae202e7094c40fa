//! Interactive editing of a single bounding box.
//!
//! An editor owns the working copy of one box in top-left form at the rendered
//! image size. Pointer positions handed to it are relative to the top-left
//! corner of the rendered image. Settled changes are reported in center form at
//! the image's natural resolution through [`BoxEditor::take_change`].

use crate::catalog::ClassId;
use crate::constants::{
    HANDLE_SIZE, LABEL_STRIP_HEIGHT, LABEL_STRIP_MAX_WIDTH, MIN_BOX_HEIGHT, MIN_BOX_WIDTH,
    REMOVE_BUTTON_SIZE,
};
use crate::coords::{CenterBox, RenderScale, Size, TopLeftBox};
use egui::{pos2, vec2, Pos2, Rect, Vec2};

/// Locally unique box identifier within one annotation session.
pub type BoxId = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeHandle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 4] = [
        ResizeHandle::TopLeft,
        ResizeHandle::TopRight,
        ResizeHandle::BottomLeft,
        ResizeHandle::BottomRight,
    ];

    /// Compass code of the corner (`nw`, `ne`, `sw`, `se`).
    pub fn code(self) -> &'static str {
        match self {
            ResizeHandle::TopLeft => "nw",
            ResizeHandle::TopRight => "ne",
            ResizeHandle::BottomLeft => "sw",
            ResizeHandle::BottomRight => "se",
        }
    }

    fn corner(self, rect: &TopLeftBox) -> Pos2 {
        match self {
            ResizeHandle::TopLeft => pos2(rect.x, rect.y),
            ResizeHandle::TopRight => pos2(rect.right(), rect.y),
            ResizeHandle::BottomLeft => pos2(rect.x, rect.bottom()),
            ResizeHandle::BottomRight => pos2(rect.right(), rect.bottom()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Interaction {
    Idle,
    /// `offset` is the pointer position relative to the box's top-left corner at drag start.
    Dragging { offset: Vec2 },
    /// Deltas are taken from `last_pointer`, which advances on every move.
    Resizing {
        handle: ResizeHandle,
        last_pointer: Pos2,
    },
}

/// Part of a box under the pointer, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoxHit {
    Handle(ResizeHandle),
    Remove,
    Label,
    Body,
}

/// A settled edit, in storage form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxChange {
    pub id: BoxId,
    pub geometry: CenterBox,
    pub class_id: Option<ClassId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Snapshot {
    rect: TopLeftBox,
    class_id: Option<ClassId>,
}

pub struct BoxEditor {
    id: BoxId,
    rect: TopLeftBox,
    class_id: Option<ClassId>,
    scale: RenderScale,
    interaction: Interaction,
    last_reported: Snapshot,
}

impl BoxEditor {
    /// Creates an editor from stored geometry. Nothing is reported until the box changes.
    pub fn new(id: BoxId, stored: CenterBox, class_id: Option<ClassId>, scale: RenderScale) -> Self {
        let rect = scale.to_render(stored);
        Self {
            id,
            rect,
            class_id,
            scale,
            interaction: Interaction::Idle,
            last_reported: Snapshot { rect, class_id },
        }
    }

    pub fn id(&self) -> BoxId {
        self.id
    }

    /// Working geometry: top-left form, rendered pixels.
    pub fn rect(&self) -> TopLeftBox {
        self.rect
    }

    pub fn class_id(&self) -> Option<ClassId> {
        self.class_id
    }

    pub fn is_interacting(&self) -> bool {
        self.interaction != Interaction::Idle
    }

    pub fn bounds(&self) -> Size {
        self.scale.rendered
    }

    /// Re-derives the working copy from stored geometry after the rendered size changed.
    ///
    /// The stored geometry is authoritative, so repeated layout changes never
    /// accumulate rounding drift. The snapshot moves along with it: a rebase is
    /// not an edit. An interaction in progress is carried over to the new scale.
    pub fn rebase(&mut self, stored: CenterBox, scale: RenderScale) {
        let ratio = vec2(
            scale.rendered.width / self.scale.rendered.width,
            scale.rendered.height / self.scale.rendered.height,
        );
        self.interaction = match self.interaction {
            Interaction::Idle => Interaction::Idle,
            Interaction::Dragging { offset } => Interaction::Dragging {
                offset: offset * ratio,
            },
            Interaction::Resizing {
                handle,
                last_pointer,
            } => Interaction::Resizing {
                handle,
                last_pointer: pos2(last_pointer.x * ratio.x, last_pointer.y * ratio.y),
            },
        };
        self.scale = scale;
        self.rect = scale.to_render(stored);
        self.last_reported = Snapshot {
            rect: self.rect,
            class_id: self.class_id,
        };
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Hit Areas
    // ─────────────────────────────────────────────────────────────────────────────

    /// Box outline relative to the image origin.
    pub fn area(&self) -> Rect {
        Rect::from_min_size(
            pos2(self.rect.x, self.rect.y),
            vec2(self.rect.width, self.rect.height),
        )
    }

    pub fn handle_rect(&self, handle: ResizeHandle) -> Rect {
        Rect::from_center_size(handle.corner(&self.rect), Vec2::splat(HANDLE_SIZE))
    }

    pub fn remove_rect(&self) -> Rect {
        let area = self.area();
        Rect::from_min_size(
            pos2(area.max.x - REMOVE_BUTTON_SIZE - 2.0, area.min.y + 2.0),
            Vec2::splat(REMOVE_BUTTON_SIZE),
        )
    }

    /// Strip along the top edge that hosts the class selector.
    pub fn label_rect(&self, show_remove: bool) -> Rect {
        let area = self.area();
        let reserved = if show_remove {
            REMOVE_BUTTON_SIZE + 4.0
        } else {
            0.0
        };
        let width = (area.width() - reserved).clamp(0.0, LABEL_STRIP_MAX_WIDTH);
        Rect::from_min_size(
            area.min,
            vec2(width, LABEL_STRIP_HEIGHT.min(area.height())),
        )
    }

    pub fn hit_test(&self, pointer: Pos2, show_remove: bool) -> Option<BoxHit> {
        if let Some(handle) = ResizeHandle::ALL
            .into_iter()
            .find(|&h| self.handle_rect(h).contains(pointer))
        {
            return Some(BoxHit::Handle(handle));
        }
        if show_remove && self.remove_rect().contains(pointer) {
            return Some(BoxHit::Remove);
        }
        if self.label_rect(show_remove).contains(pointer) {
            return Some(BoxHit::Label);
        }
        if self.rect.contains(pointer.x, pointer.y) {
            return Some(BoxHit::Body);
        }
        None
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pointer State Machine
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn begin_drag(&mut self, pointer: Pos2) {
        let offset = pointer - pos2(self.rect.x, self.rect.y);
        self.interaction = Interaction::Dragging { offset };
    }

    pub fn begin_resize(&mut self, handle: ResizeHandle, pointer: Pos2) {
        self.interaction = Interaction::Resizing {
            handle,
            last_pointer: pointer,
        };
    }

    pub fn pointer_moved(&mut self, pointer: Pos2) {
        match self.interaction {
            Interaction::Idle => {}
            Interaction::Dragging { offset } => self.drag_to(pointer, offset),
            Interaction::Resizing {
                handle,
                last_pointer,
            } => {
                self.resize_by(handle, pointer - last_pointer);
                self.interaction = Interaction::Resizing {
                    handle,
                    last_pointer: pointer,
                };
            }
        }
    }

    /// Ends any interaction. Returns true if one was in progress.
    pub fn pointer_released(&mut self) -> bool {
        let was_interacting = self.is_interacting();
        self.interaction = Interaction::Idle;
        was_interacting
    }

    pub fn set_class(&mut self, class_id: ClassId) {
        self.class_id = Some(class_id);
    }

    fn drag_to(&mut self, pointer: Pos2, offset: Vec2) {
        let bounds = self.bounds();
        let target = pointer - offset;
        self.rect.x = target.x.min(bounds.width - self.rect.width).max(0.0);
        self.rect.y = target.y.min(bounds.height - self.rect.height).max(0.0);
    }

    fn resize_by(&mut self, handle: ResizeHandle, delta: Vec2) {
        let bounds = self.bounds();
        let (dx, dy) = (delta.x, delta.y);
        let r = &mut self.rect;

        match handle {
            ResizeHandle::TopLeft => {
                r.x += dx;
                r.y += dy;
                r.width -= dx;
                r.height -= dy;
            }
            ResizeHandle::TopRight => {
                r.y += dy;
                r.width += dx;
                r.height -= dy;
            }
            ResizeHandle::BottomLeft => {
                r.x += dx;
                r.width -= dx;
                r.height += dy;
            }
            ResizeHandle::BottomRight => {
                r.width += dx;
                r.height += dy;
            }
        }

        r.width = r.width.min(bounds.width - r.x).max(MIN_BOX_WIDTH);
        r.height = r.height.min(bounds.height - r.y).max(MIN_BOX_HEIGHT);
        r.x = r.x.min(bounds.width - r.width).max(0.0);
        r.y = r.y.min(bounds.height - r.height).max(0.0);

        // A left/top edge pulled past the image border can leave the box wider
        // than what remains to its right once x is pinned at zero.
        r.width = r.width.min(bounds.width - r.x).max(MIN_BOX_WIDTH);
        r.height = r.height.min(bounds.height - r.y).max(MIN_BOX_HEIGHT);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Change Notification
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns the current box in storage form if it differs from what was last reported.
    pub fn take_change(&mut self) -> Option<BoxChange> {
        let current = Snapshot {
            rect: self.rect,
            class_id: self.class_id,
        };
        if current == self.last_reported {
            return None;
        }
        self.last_reported = current;
        Some(BoxChange {
            id: self.id,
            geometry: self.scale.to_natural(self.rect),
            class_id: self.class_id,
        })
    }
}
