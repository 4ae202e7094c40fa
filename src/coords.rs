//! Conversions between the two box representations.
//!
//! Boxes travel to and from the backend in center form at the image's natural
//! resolution, and are edited on screen in top-left form at the rendered size.
//! Everything here is pure arithmetic.

use serde::{Deserialize, Serialize};

/// Width and height of an image, natural or rendered.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// A size is usable for ratio math only when both sides are positive and finite.
    pub fn is_positive(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Box geometry anchored at its center.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CenterBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Box geometry anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TopLeftBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TopLeftBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }
}

pub fn center_to_top_left(x_center: f32, y_center: f32, width: f32, height: f32) -> TopLeftBox {
    TopLeftBox {
        x: x_center - width / 2.0,
        y: y_center - height / 2.0,
        width,
        height,
    }
}

pub fn top_left_to_center(x_top_left: f32, y_top_left: f32, width: f32, height: f32) -> CenterBox {
    CenterBox {
        x: x_top_left + width / 2.0,
        y: y_top_left + height / 2.0,
        width,
        height,
    }
}

/// Multiplies `value` by `rendered_dimension / natural_dimension`.
///
/// Swap the two dimensions to go the other way. A non-positive divisor leaves
/// the value untouched rather than producing inf/NaN.
pub fn scale_by_ratio(value: f32, rendered_dimension: f32, natural_dimension: f32) -> f32 {
    if natural_dimension <= 0.0 || !natural_dimension.is_finite() {
        return value;
    }
    value * rendered_dimension / natural_dimension
}

/// Pairing of natural and rendered image size, used at the edit/storage boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderScale {
    pub natural: Size,
    pub rendered: Size,
}

impl RenderScale {
    pub fn new(natural: Size, rendered: Size) -> Self {
        Self { natural, rendered }
    }

    /// Same size on both sides; used before the image has been laid out.
    pub fn identity(size: Size) -> Self {
        Self::new(size, size)
    }

    /// Stored (center, natural) geometry to editable (top-left, rendered) geometry.
    pub fn to_render(&self, stored: CenterBox) -> TopLeftBox {
        let natural = center_to_top_left(stored.x, stored.y, stored.width, stored.height);
        TopLeftBox {
            x: scale_by_ratio(natural.x, self.rendered.width, self.natural.width),
            y: scale_by_ratio(natural.y, self.rendered.height, self.natural.height),
            width: scale_by_ratio(natural.width, self.rendered.width, self.natural.width),
            height: scale_by_ratio(natural.height, self.rendered.height, self.natural.height),
        }
    }

    /// Editable (top-left, rendered) geometry back to stored (center, natural) geometry.
    pub fn to_natural(&self, edited: TopLeftBox) -> CenterBox {
        let x = scale_by_ratio(edited.x, self.natural.width, self.rendered.width);
        let y = scale_by_ratio(edited.y, self.natural.height, self.rendered.height);
        let width = scale_by_ratio(edited.width, self.natural.width, self.rendered.width);
        let height = scale_by_ratio(edited.height, self.natural.height, self.rendered.height);
        top_left_to_center(x, y, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() <= EPS * a.abs().max(1.0)
    }

    #[test]
    fn test_center_to_top_left_shifts_by_half_size() {
        let tl = center_to_top_left(50.0, 50.0, 20.0, 10.0);
        assert_eq!(tl, TopLeftBox::new(40.0, 45.0, 20.0, 10.0));
    }

    #[test]
    fn test_anchor_round_trip() {
        let cases = [
            (0.0, 0.0, 100.0, 30.0),
            (200.0, 80.0, 40.0, 10.0),
            (1234.5, 987.25, 333.3, 0.5),
            (-5.0, 7.0, 2.0, 2.0),
        ];
        for (x, y, w, h) in cases {
            let tl = center_to_top_left(x, y, w, h);
            let back = top_left_to_center(tl.x, tl.y, tl.width, tl.height);
            assert!(approx(back.x, x) && approx(back.y, y), "{:?}", (x, y, w, h));
            assert_eq!((back.width, back.height), (w, h));
        }
    }

    #[test]
    fn test_scale_round_trip() {
        for (value, rendered, natural) in [(120.0, 640.0, 1920.0), (3.0, 1000.0, 10.0)] {
            let forward = scale_by_ratio(value, rendered, natural);
            let back = scale_by_ratio(forward, natural, rendered);
            assert!(approx(back, value));
        }
    }

    #[test]
    fn test_scale_with_zero_natural_is_passthrough() {
        assert_eq!(scale_by_ratio(42.0, 100.0, 0.0), 42.0);
    }

    #[test]
    fn test_render_scale_halves_geometry() {
        let scale = RenderScale::new(Size::new(1600.0, 1200.0), Size::new(800.0, 600.0));
        let stored = CenterBox {
            x: 400.0,
            y: 300.0,
            width: 200.0,
            height: 100.0,
        };
        let edited = scale.to_render(stored);
        assert!(approx(edited.x, 150.0));
        assert!(approx(edited.y, 125.0));
        assert!(approx(edited.width, 100.0));
        assert!(approx(edited.height, 50.0));

        let back = scale.to_natural(edited);
        assert!(approx(back.x, stored.x) && approx(back.y, stored.y));
        assert!(approx(back.width, stored.width) && approx(back.height, stored.height));
    }
}
