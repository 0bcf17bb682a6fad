/// Axis-aligned box described by its centre and full extent.
///
/// Tile-local label layout works in centre coordinates (the tile centre is the
/// origin), so the box stores the centre rather than a min corner.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CenteredBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CenteredBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> f64 {
        self.x - self.width / 2.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn top(&self) -> f64 {
        self.y - self.height / 2.0
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Strict overlap test: boxes that only share an edge do not intersect.
    pub fn intersects(&self, other: &CenteredBox) -> bool {
        (self.x - other.x).abs() * 2.0 < self.width + other.width
            && (self.y - other.y).abs() * 2.0 < self.height + other.height
    }

    /// Returns true if any edge of `self` extends past the matching edge of `outer`.
    pub fn exceeds(&self, outer: &CenteredBox) -> bool {
        self.right() > outer.right()
            || self.left() < outer.left()
            || self.bottom() > outer.bottom()
            || self.top() < outer.top()
    }
}

#[cfg(test)]
mod tests {
    use super::CenteredBox;

    #[test]
    fn touching_edges_do_not_intersect() {
        let a = CenteredBox::new(0.0, 0.0, 10.0, 10.0);
        let b = CenteredBox::new(10.0, 0.0, 10.0, 10.0);
        assert!(!a.intersects(&b));

        let c = CenteredBox::new(9.5, 3.0, 10.0, 10.0);
        assert!(a.intersects(&c));
        assert!(c.intersects(&a));
    }

    #[test]
    fn exceeds_checks_every_edge() {
        let outer = CenteredBox::new(0.0, 0.0, 100.0, 50.0);
        assert!(!CenteredBox::new(0.0, 0.0, 100.0, 50.0).exceeds(&outer));
        assert!(CenteredBox::new(1.0, 0.0, 100.0, 10.0).exceeds(&outer));
        assert!(CenteredBox::new(-1.0, 0.0, 100.0, 10.0).exceeds(&outer));
        assert!(CenteredBox::new(0.0, 21.0, 10.0, 10.0).exceeds(&outer));
        assert!(CenteredBox::new(0.0, -21.0, 10.0, 10.0).exceeds(&outer));
    }
}
