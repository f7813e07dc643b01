//! Plane geometry for detected quads and their projection into view space.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle with its origin at the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    /// Inclusive containment: a rectangle touching an edge is still inside.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x <= self.max_x() && p.y <= self.max_y()
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Four corners of a detected quadrilateral, clockwise from top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl Quad {
    pub fn new(top_left: Point, top_right: Point, bottom_right: Point, bottom_left: Point) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Quad covering exactly the given rectangle
    pub fn from_rect(rect: &Rect) -> Self {
        Self::new(
            Point::new(rect.x, rect.y),
            Point::new(rect.max_x(), rect.y),
            Point::new(rect.max_x(), rect.max_y()),
            Point::new(rect.x, rect.max_y()),
        )
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    pub fn bounding_box(&self) -> Rect {
        let [a, b, c, d] = self.corners();
        let min_x = a.x.min(b.x).min(c.x).min(d.x);
        let min_y = a.y.min(b.y).min(c.y).min(d.y);
        let max_x = a.x.max(b.x).max(c.x).max(d.x);
        let max_y = a.y.max(b.y).max(c.y).max(d.y);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Unsigned area via the shoelace formula
    pub fn area(&self) -> f64 {
        let c = self.corners();
        let mut twice = 0.0;
        for i in 0..4 {
            let p = c[i];
            let q = c[(i + 1) % 4];
            twice += p.x * q.y - q.x * p.y;
        }
        (twice / 2.0).abs()
    }

    /// True when every turn along the outline has the same orientation.
    pub fn is_convex(&self) -> bool {
        let c = self.corners();
        let mut sign = 0.0_f64;
        for i in 0..4 {
            let a = c[i];
            let b = c[(i + 1) % 4];
            let d = c[(i + 2) % 4];
            let cross = (b.x - a.x) * (d.y - b.y) - (b.y - a.y) * (d.x - b.x);
            if cross == 0.0 {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        sign != 0.0
    }

    pub fn map<F: Fn(Point) -> Point>(&self, f: F) -> Quad {
        Quad::new(
            f(self.top_left),
            f(self.top_right),
            f(self.bottom_right),
            f(self.bottom_left),
        )
    }
}

/// Size of the view the preview is laid out in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewSize {
    pub width: f64,
    pub height: f64,
}

impl ViewSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Maps image pixel coordinates to view coordinates for an aspect-fit preview.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub scale: f64,
    pub offset: Point,
    /// Swap x and y before scaling (landscape sensor in a portrait view)
    pub swap_axes: bool,
}

impl ViewTransform {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: Point::default(),
            swap_axes: false,
        }
    }

    /// Fit an `image_width` x `image_height` frame into `view`, centred.
    pub fn aspect_fit(image_width: u32, image_height: u32, view: ViewSize, swap_axes: bool) -> Self {
        let (logical_w, logical_h) = if swap_axes {
            (image_height as f64, image_width as f64)
        } else {
            (image_width as f64, image_height as f64)
        };
        if logical_w <= 0.0 || logical_h <= 0.0 {
            return Self::identity();
        }

        let scale = (view.width / logical_w).min(view.height / logical_h);
        let offset = Point::new(
            (view.width - logical_w * scale) / 2.0,
            (view.height - logical_h * scale) / 2.0,
        );
        Self {
            scale,
            offset,
            swap_axes,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        let (x, y) = if self.swap_axes { (p.y, p.x) } else { (p.x, p.y) };
        Point::new(x * self.scale + self.offset.x, y * self.scale + self.offset.y)
    }

    pub fn apply_quad(&self, quad: &Quad) -> Quad {
        quad.map(|p| self.apply(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expanded() {
        let r = Rect::new(10.0, 10.0, 100.0, 100.0).expanded(50.0);
        assert_eq!(r, Rect::new(-40.0, -40.0, 200.0, 200.0));
    }

    #[test]
    fn test_contains_is_inclusive() {
        let outer = Rect::new(0.0, 0.0, 100.0, 100.0);
        assert!(outer.contains_rect(&outer));
        assert!(outer.contains_rect(&Rect::new(0.0, 50.0, 100.0, 50.0)));
        assert!(!outer.contains_rect(&Rect::new(-0.5, 0.0, 10.0, 10.0)));
        assert!(!outer.contains_rect(&Rect::new(95.0, 95.0, 10.0, 1.0)));
    }

    #[test]
    fn test_bounding_box_of_skewed_quad() {
        let quad = Quad::new(
            Point::new(12.0, 5.0),
            Point::new(90.0, 10.0),
            Point::new(95.0, 80.0),
            Point::new(8.0, 70.0),
        );
        assert_eq!(quad.bounding_box(), Rect::new(8.0, 5.0, 87.0, 75.0));
    }

    #[test]
    fn test_area_and_convexity() {
        let quad = Quad::from_rect(&Rect::new(0.0, 0.0, 10.0, 20.0));
        assert_eq!(quad.area(), 200.0);
        assert!(quad.is_convex());

        let bow_tie = Quad::new(
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        );
        assert!(!bow_tie.is_convex());
    }

    #[test]
    fn test_aspect_fit_letterbox() {
        // 1280x720 into a 640x640 view: scale 0.5, 140px bands top and bottom
        let t = ViewTransform::aspect_fit(1280, 720, ViewSize::new(640.0, 640.0), false);
        assert_eq!(t.scale, 0.5);
        assert_eq!(t.offset, Point::new(0.0, 140.0));
        assert_eq!(t.apply(Point::new(1280.0, 720.0)), Point::new(640.0, 500.0));
    }

    #[test]
    fn test_aspect_fit_swapped_axes() {
        // Landscape 1920x1080 sensor shown in a 540x960 portrait view
        let t = ViewTransform::aspect_fit(1920, 1080, ViewSize::new(540.0, 960.0), true);
        assert_eq!(t.scale, 0.5);
        assert_eq!(t.apply(Point::new(100.0, 40.0)), Point::new(20.0, 50.0));
    }
}
