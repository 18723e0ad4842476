//! Grid traversal along evidence rays.
//!
//! Cells under a ray are found with Bresenham lines: one along the ray's
//! centre plus parallel lines offset by whole cells to cover its width.

/// Iterator over the cells of a Bresenham line, both ends included.
#[derive(Debug, Clone)]
pub struct CellLine {
    x: i32,
    y: i32,
    x1: i32,
    y1: i32,
    dx: i32,
    dy: i32,
    sx: i32,
    sy: i32,
    err: i32,
    finished: bool,
}

impl CellLine {
    /// Line from `(x0, y0)` to `(x1, y1)` in cell coordinates.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let dx = (x1 - x0).abs();
        let dy = (y1 - y0).abs();
        Self {
            x: x0,
            y: y0,
            x1,
            y1,
            dx,
            dy,
            sx: if x0 < x1 { 1 } else { -1 },
            sy: if y0 < y1 { 1 } else { -1 },
            err: dx - dy,
            finished: false,
        }
    }
}

impl Iterator for CellLine {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = (self.x, self.y);
        if self.x == self.x1 && self.y == self.y1 {
            self.finished = true;
            return Some(result);
        }

        let e2 = 2 * self.err;
        if e2 > -self.dy {
            self.err -= self.dy;
            self.x += self.sx;
        }
        if e2 < self.dx {
            self.err += self.dx;
            self.y += self.sy;
        }

        Some(result)
    }
}

/// Cells covered by a band of `half_width` cells either side of the line
/// from `start` to `end` (cell coordinates, fractional allowed).
///
/// The result is sorted and free of duplicates.
pub fn band_cells(start: (f32, f32), end: (f32, f32), half_width: f32) -> Vec<(i32, i32)> {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let len = (dx * dx + dy * dy).sqrt();
    // Unit normal to the line
    let (nx, ny) = if len > f32::EPSILON {
        (-dy / len, dx / len)
    } else {
        (1.0, 0.0)
    };

    let offsets = half_width.max(0.0).ceil() as i32;
    let mut cells = Vec::new();
    for k in -offsets..=offsets {
        let (ox, oy) = (nx * k as f32, ny * k as f32);
        let line = CellLine::new(
            (start.0 + ox).floor() as i32,
            (start.1 + oy).floor() as i32,
            (end.0 + ox).floor() as i32,
            (end.1 + oy).floor() as i32,
        );
        cells.extend(line);
    }

    cells.sort_unstable();
    cells.dedup();
    cells
}
