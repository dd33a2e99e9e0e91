//! Integer rectangle used for scissor and viewport overrides.

/// An axis-aligned rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RectInt {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl RectInt {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle covering `width x height` from the origin.
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Intersection with `other`, or an empty rectangle at the clamped origin.
    pub fn intersect(&self, other: &RectInt) -> RectInt {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        RectInt::new(x, y, (right - x).max(0), (bottom - y).max(0))
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect() {
        let a = RectInt::new(0, 0, 100, 100);
        let b = RectInt::new(50, 60, 100, 100);
        assert_eq!(a.intersect(&b), RectInt::new(50, 60, 50, 40));
    }

    #[test]
    fn test_disjoint_intersection_is_empty() {
        let a = RectInt::new(0, 0, 10, 10);
        let b = RectInt::new(20, 20, 5, 5);
        assert!(a.intersect(&b).is_empty());
    }
}
