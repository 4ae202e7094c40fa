//! Centralized constants for box geometry, interaction timing, sizing, and colors.
//!
//! Geometry values are in rendered (on-screen) pixels unless stated otherwise.

use eframe::egui::Color32;
use std::time::Duration;

// =============================================================================
// BOX GEOMETRY CONSTANTS
// =============================================================================

/// Minimum box width, wide enough for the embedded class selector to stay usable.
pub const MIN_BOX_WIDTH: f32 = 100.0;

/// Minimum box height, tall enough for the embedded class selector.
pub const MIN_BOX_HEIGHT: f32 = 30.0;

/// Top-left X of a freshly added box.
pub const DEFAULT_BOX_X: f32 = 10.0;

/// Top-left Y of a freshly added box.
pub const DEFAULT_BOX_Y: f32 = 10.0;

/// Width of a freshly added box.
pub const DEFAULT_BOX_WIDTH: f32 = MIN_BOX_WIDTH;

/// Height of a freshly added box.
pub const DEFAULT_BOX_HEIGHT: f32 = MIN_BOX_HEIGHT;

/// Confidence recorded for boxes created or edited by hand.
pub const MANUAL_CONFIDENCE: f32 = 1.0;

// =============================================================================
// HIT AREA CONSTANTS
// =============================================================================

/// Side length of the square corner resize handles.
pub const HANDLE_SIZE: f32 = 10.0;

/// Side length of the remove button drawn in the top-right corner of a box.
pub const REMOVE_BUTTON_SIZE: f32 = 18.0;

/// Height of the class selector strip along the top edge of a box.
pub const LABEL_STRIP_HEIGHT: f32 = 22.0;

/// Maximum width of the class selector strip.
pub const LABEL_STRIP_MAX_WIDTH: f32 = 180.0;

// =============================================================================
// TIMING CONSTANTS
// =============================================================================

/// How long the interaction lock outlives a pointer release.
pub const INTERACTION_RELEASE_DELAY: Duration = Duration::from_millis(50);

/// Lifetime of a transient notification.
pub const TOAST_LIFETIME: Duration = Duration::from_secs(3);

/// Maximum number of notifications shown at once.
pub const MAX_VISIBLE_TOASTS: usize = 5;

/// Repaint interval while something time-based (toasts, lock release) is pending.
pub const TIMED_REPAINT_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// WINDOW / LAYOUT CONSTANTS
// =============================================================================

/// Initial window width when the application starts.
pub const INITIAL_WINDOW_WIDTH: f32 = 1200.0;

/// Initial window height when the application starts.
pub const INITIAL_WINDOW_HEIGHT: f32 = 800.0;

/// Default width of the image list side panel.
pub const IMAGE_LIST_WIDTH: f32 = 220.0;

/// Fraction of the screen the annotation window may occupy.
pub const ANNOTATION_WINDOW_FILL: f32 = 0.85;

/// Textures larger than this are downscaled before upload; box math keeps natural size.
pub const MAX_TEXTURE_DIMENSION: u32 = 4096;

// =============================================================================
// TOOLBAR CONSTANTS
// =============================================================================

/// Spacing at the start of the toolbar.
pub const TOOLBAR_START_SPACING: f32 = 8.0;

/// Size of toolbar button icons.
pub const TOOLBAR_ICON_SIZE: f32 = 20.0;

/// Minimum size for toolbar buttons.
pub const TOOLBAR_BUTTON_SIZE: f32 = 28.0;

// =============================================================================
// COLORS
// =============================================================================

/// Background color for the toolbar.
pub const COLOR_TOOLBAR_BG: Color32 = Color32::from_rgb(30, 30, 30);

/// Outline of a box at rest.
pub const COLOR_BOX_STROKE: Color32 = Color32::from_rgb(255, 200, 0);

/// Outline of the box currently being dragged or resized.
pub const COLOR_BOX_ACTIVE: Color32 = Color32::from_rgb(0, 200, 255);

/// Translucent fill so the box body is visible as a drag target.
pub const COLOR_BOX_FILL: Color32 = Color32::from_rgba_premultiplied(40, 32, 0, 40);

/// Corner handle fill.
pub const COLOR_HANDLE: Color32 = Color32::WHITE;

/// Remove button color in normal state.
pub const COLOR_REMOVE_BUTTON: Color32 = Color32::RED;

/// Remove button color when hovered.
pub const COLOR_REMOVE_BUTTON_HOVER: Color32 = Color32::from_rgb(255, 100, 100);

/// Toast background per severity.
pub const COLOR_TOAST_INFO: Color32 = Color32::from_rgb(40, 90, 160);
pub const COLOR_TOAST_SUCCESS: Color32 = Color32::from_rgb(30, 130, 60);
pub const COLOR_TOAST_WARNING: Color32 = Color32::from_rgb(190, 120, 20);
pub const COLOR_TOAST_ERROR: Color32 = Color32::from_rgb(170, 40, 40);
