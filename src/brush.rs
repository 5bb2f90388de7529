//! Brush rasterization: Bresenham lines for 1px brushes, distance-to-segment
//! circles and oriented parallelograms for everything larger.
//!
//! All numbers a stroke needs are derived once in [`BrushGeometry`]; the CPU
//! predicate here and the GPU uniform block in `gpu::preview` both read from
//! it so the two paths agree pixel for pixel.

use crate::canvas::PixelRect;
use crate::executor::{DEFAULT_MIN_BATCH, Executor};
use image::Rgba;
use serde::{Deserialize, Serialize};

/// Subtracted from the radius of a size-3 circle so it stamps a plus-shaped
/// cross instead of a full 3×3 block.
pub const CROSS_BRUSH_RADIUS_BIAS: f32 = 0.1;

pub const MAX_BRUSH_SIZE: u32 = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushShape {
    #[default]
    Circle,
    Square,
}

impl BrushShape {
    pub fn all() -> &'static [BrushShape] {
        &[BrushShape::Circle, BrushShape::Square]
    }

    pub fn label(&self) -> &'static str {
        match self {
            BrushShape::Circle => "Circle",
            BrushShape::Square => "Square",
        }
    }
}

/// One segment of a gesture, from the previous pointer texel to the current one.
///
/// Coordinates are signed because the pointer may leave the canvas mid-drag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke {
    pub from: (i32, i32),
    pub to: (i32, i32),
    pub size: u32,
    pub shape: BrushShape,
    /// Alpha 0 erases.
    pub color: Rgba<u8>,
}

impl Stroke {
    pub fn new(from: (i32, i32), to: (i32, i32), size: u32, shape: BrushShape, color: Rgba<u8>) -> Self {
        Self {
            from,
            to,
            size: size.clamp(1, MAX_BRUSH_SIZE),
            shape,
            color,
        }
    }

    /// Single stamp at `at`.
    pub fn dot(at: (i32, i32), size: u32, shape: BrushShape, color: Rgba<u8>) -> Self {
        Self::new(at, at, size, shape, color)
    }

    /// Clamp the size to a host-configured maximum (never above `MAX_BRUSH_SIZE`).
    pub fn with_max_size(mut self, max: u32) -> Self {
        self.size = self.size.clamp(1, max.clamp(1, MAX_BRUSH_SIZE));
        self
    }

    pub fn is_degenerate(&self) -> bool {
        self.from == self.to
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryKind {
    Line,
    Circle,
    Square,
}

impl GeometryKind {
    /// Discriminant shared with the WGSL `mode` field.
    pub fn mode(&self) -> u32 {
        match self {
            GeometryKind::Line => 0,
            GeometryKind::Circle => 1,
            GeometryKind::Square => 2,
        }
    }
}

/// Derived per-stroke values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushGeometry {
    pub kind: GeometryKind,
    /// Center of the previous stamp (`from`), shifted by half a pixel for odd sizes.
    pub prev_center: [f32; 2],
    /// Center of the current stamp (`to`).
    pub curr_center: [f32; 2],
    pub radius: f32,
    pub radius_sq: f32,
    /// Parallelogram edge offset for square brushes; x is negated along the
    /// main diagonal so the two edges never cross.
    pub square_offset: [f32; 2],
    /// Candidate pixels: the stroke box grown by `size`, clamped to the canvas
    /// and intersected with the clip rect.
    pub bounds: PixelRect,
    pub clip: PixelRect,
    /// Part of the 1px line that can land inside `clip`. `None` for area
    /// brushes and for lines that miss the clip entirely.
    pub line: Option<LineSpan>,
}

impl BrushGeometry {
    pub fn new(stroke: &Stroke, clip: PixelRect, canvas_size: (u32, u32)) -> Self {
        let size = stroke.size.clamp(1, MAX_BRUSH_SIZE);
        let kind = match (size, stroke.shape) {
            (1, _) => GeometryKind::Line,
            (_, BrushShape::Circle) => GeometryKind::Circle,
            (_, BrushShape::Square) => GeometryKind::Square,
        };

        let mut radius = size as f32 * 0.5;
        if kind == GeometryKind::Circle && size == 3 {
            radius -= CROSS_BRUSH_RADIUS_BIAS;
        }

        let half = if size % 2 == 1 { 0.5 } else { 0.0 };
        let prev_center = [stroke.from.0 as f32 + half, stroke.from.1 as f32 + half];
        let curr_center = [stroke.to.0 as f32 + half, stroke.to.1 as f32 + half];

        let diagonal = (prev_center[0] > curr_center[0] && prev_center[1] > curr_center[1])
            || (prev_center[0] < curr_center[0] && prev_center[1] < curr_center[1]);
        let square_offset = if diagonal { [-radius, radius] } else { [radius, radius] };

        let clip = clip.intersect(&PixelRect::full(canvas_size.0, canvas_size.1));
        let bounds = match kind {
            GeometryKind::Line => clip,
            _ => stamp_box(stroke.from, stroke.to, size, canvas_size).intersect(&clip),
        };
        let line = match kind {
            GeometryKind::Line => LineSpan::clipped(stroke.from, stroke.to, clip),
            _ => None,
        };

        Self {
            kind,
            prev_center,
            curr_center,
            radius,
            radius_sq: radius * radius,
            square_offset,
            bounds,
            clip,
            line,
        }
    }

    /// Whether the brush body covers pixel `(x, y)`. Line geometry has no
    /// area predicate; it is walked with [`walk_line`] instead.
    pub fn covers(&self, x: u32, y: u32) -> bool {
        if !self.clip.contains(x as i32, y as i32) {
            return false;
        }
        let p = [x as f32 + 0.5, y as f32 + 0.5];
        match self.kind {
            GeometryKind::Line => false,
            GeometryKind::Circle => {
                distance_sq_to_segment(p, self.curr_center, self.prev_center) < self.radius_sq
            }
            GeometryKind::Square => self.square_covers(p),
        }
    }

    fn square_covers(&self, p: [f32; 2]) -> bool {
        let (prev, curr, off, r) = (self.prev_center, self.curr_center, self.square_offset, self.radius);
        let p1 = [prev[0] - off[0], prev[1] - off[1]];
        let p2 = [curr[0] - off[0], curr[1] - off[1]];
        let p3 = [prev[0] + off[0], prev[1] + off[1]];
        let p4 = [curr[0] + off[0], curr[1] + off[1]];

        let on1 = closest_point_on_line(p, p1, p2);
        let on2 = closest_point_on_line(p, p3, p4);
        let between = (p[1] > on1[1] && p[1] < on2[1]) || (p[0] > on1[0] && p[0] < on2[0]);
        if !between {
            return false;
        }

        let min = [prev[0].min(curr[0]) - r, prev[1].min(curr[1]) - r];
        let max = [prev[0].max(curr[0]) + r, prev[1].max(curr[1]) + r];
        p[0] > min[0] && p[0] < max[0] && p[1] > min[1] && p[1] < max[1]
    }
}

fn stamp_box(from: (i32, i32), to: (i32, i32), size: u32, canvas_size: (u32, u32)) -> PixelRect {
    let size = size as i64;
    let clamp = |v: i64, hi: u32| v.clamp(0, hi as i64) as u32;
    PixelRect::from_min_max(
        clamp(from.0.min(to.0) as i64 - size, canvas_size.0),
        clamp(from.1.min(to.1) as i64 - size, canvas_size.1),
        clamp(from.0.max(to.0) as i64 + size, canvas_size.0),
        clamp(from.1.max(to.1) as i64 + size, canvas_size.1),
    )
}

// ============================================================================
// VECTOR HELPERS
// ============================================================================

fn dot(a: [f32; 2], b: [f32; 2]) -> f32 {
    a[0] * b[0] + a[1] * b[1]
}

fn distance_sq(a: [f32; 2], b: [f32; 2]) -> f32 {
    let d = [a[0] - b[0], a[1] - b[1]];
    dot(d, d)
}

/// Squared distance from `p` to the segment `v..w`.
pub fn distance_sq_to_segment(p: [f32; 2], v: [f32; 2], w: [f32; 2]) -> f32 {
    let l2 = distance_sq(v, w);
    if l2 == 0.0 {
        return distance_sq(p, v);
    }
    let vw = [w[0] - v[0], w[1] - v[1]];
    let t = (dot([p[0] - v[0], p[1] - v[1]], vw) / l2).clamp(0.0, 1.0);
    distance_sq(p, [v[0] + t * vw[0], v[1] + t * vw[1]])
}

/// Projection of `target` onto the infinite line through `a` and `b`;
/// `a` itself when the two points coincide.
pub fn closest_point_on_line(target: [f32; 2], a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    let d = [b[0] - a[0], b[1] - a[1]];
    let len_sq = dot(d, d);
    if len_sq > 0.0 {
        let s = dot([target[0] - a[0], target[1] - a[1]], d) / len_sq;
        return [a[0] + d[0] * s, a[1] + d[1] * s];
    }
    a
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// A run of Bresenham steps: the start point, the error term at that point
/// and how many steps follow it. The full line `from → to` is the span that
/// starts at step 0; a clipped span starts part way in and visits exactly
/// the points the full walk visits over the same steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSpan {
    pub start: (i64, i64),
    pub err: i64,
    pub steps: u64,
    /// `|to.x - from.x|`
    pub dx: i64,
    /// `-|to.y - from.y|`
    pub dy: i64,
    pub sx: i64,
    pub sy: i64,
}

impl LineSpan {
    pub fn new(from: (i32, i32), to: (i32, i32)) -> Self {
        let (x0, y0) = (from.0 as i64, from.1 as i64);
        let (x1, y1) = (to.0 as i64, to.1 as i64);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        Self {
            start: (x0, y0),
            err: dx + dy,
            steps: dx.max(-dy) as u64,
            dx,
            dy,
            sx: if x0 < x1 { 1 } else { -1 },
            sy: if y0 < y1 { 1 } else { -1 },
        }
    }

    /// The steps of `from → to` whose major-axis coordinate falls inside
    /// `clip`. Every step advances the major axis by one, so the run is
    /// never longer than the clip is wide (or tall).
    pub fn clipped(from: (i32, i32), to: (i32, i32), clip: PixelRect) -> Option<Self> {
        if clip.is_empty() {
            return None;
        }
        let full = Self::new(from, to);
        let (dx, ady) = (full.dx, -full.dy);
        let x_major = dx >= ady;
        let (origin, step, lo, hi) = if x_major {
            (full.start.0, full.sx, clip.min_x as i64, clip.max_x as i64 - 1)
        } else {
            (full.start.1, full.sy, clip.min_y as i64, clip.max_y as i64 - 1)
        };
        let (k_lo, k_hi) = if step > 0 { (lo - origin, hi - origin) } else { (origin - hi, origin - lo) };
        let first = k_lo.max(0);
        let last = k_hi.min(full.steps as i64);
        if first > last {
            return None;
        }

        // Minor-axis moves made during the first `first` steps.
        let (major, minor) = (dx.max(ady) as i128, dx.min(ady) as i128);
        let moved = if major == 0 { 0 } else { (2 * minor * first as i128 + major) / (2 * major) };
        let (x_moves, y_moves) = if x_major { (first as i128, moved) } else { (moved, first as i128) };

        let err = (dx + full.dy) as i128 + x_moves * full.dy as i128 + y_moves * dx as i128;
        Some(Self {
            start: (
                full.start.0 + full.sx * x_moves as i64,
                full.start.1 + full.sy * y_moves as i64,
            ),
            err: err as i64,
            steps: (last - first) as u64,
            ..full
        })
    }

    /// Visit every point of the span, start included.
    pub fn walk(&self, mut visit: impl FnMut(i64, i64)) {
        let (mut x, mut y) = self.start;
        let mut err = self.err;
        visit(x, y);
        for _ in 0..self.steps {
            let e2 = 2 * err;
            if e2 >= self.dy {
                err += self.dy;
                x += self.sx;
            }
            if e2 <= self.dx {
                err += self.dx;
                y += self.sy;
            }
            visit(x, y);
        }
    }
}

/// Visit every point of the integer line `from → to`, endpoints included.
pub fn walk_line(from: (i32, i32), to: (i32, i32), visit: impl FnMut(i64, i64)) {
    LineSpan::new(from, to).walk(visit);
}

/// Pixels painted by `stroke`, restricted to `clip`, in row-major order.
pub fn rasterize_stroke(
    stroke: &Stroke,
    clip: PixelRect,
    canvas_size: (u32, u32),
    executor: &Executor,
) -> Vec<(u32, u32)> {
    let geometry = BrushGeometry::new(stroke, clip, canvas_size);
    rasterize_geometry(&geometry, executor)
}

pub fn rasterize_geometry(geometry: &BrushGeometry, executor: &Executor) -> Vec<(u32, u32)> {
    if geometry.kind == GeometryKind::Line {
        let mut out = Vec::new();
        let Some(span) = geometry.line else {
            return out;
        };
        span.walk(|x, y| {
            if x >= 0 && y >= 0 && x <= i32::MAX as i64 && y <= i32::MAX as i64 && geometry.clip.contains(x as i32, y as i32) {
                out.push((x as u32, y as u32));
            }
        });
        out.sort_unstable_by_key(|&(x, y)| (y, x));
        out.dedup();
        return out;
    }

    let bounds = geometry.bounds;
    if bounds.is_empty() {
        return Vec::new();
    }
    executor
        .filter_indices(0..bounds.area(), DEFAULT_MIN_BATCH, |i| {
            let (x, y) = bounds.coord_at(i);
            geometry.covers(x, y)
        })
        .into_iter()
        .map(|i| bounds.coord_at(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn raster(stroke: Stroke, clip: PixelRect) -> Vec<(u32, u32)> {
        rasterize_stroke(&stroke, clip, (32, 32), &Executor::Serial)
    }

    #[test]
    fn test_zero_length_line_is_single_pixel() {
        let px = raster(Stroke::dot((7, 3), 1, BrushShape::Circle, BLACK), PixelRect::full(32, 32));
        assert_eq!(px, vec![(7, 3)]);
    }

    #[test]
    fn test_size_one_circle_matches_line_walk() {
        let stroke = Stroke::new((1, 2), (19, 9), 1, BrushShape::Circle, BLACK);
        let mut walked = Vec::new();
        walk_line(stroke.from, stroke.to, |x, y| walked.push((x as u32, y as u32)));
        walked.sort_unstable_by_key(|&(x, y)| (y, x));
        assert_eq!(raster(stroke, PixelRect::full(32, 32)), walked);
        assert_eq!(walked.len(), 19);
    }

    #[test]
    fn test_line_walk_reaches_both_endpoints() {
        for &(from, to) in &[((0, 0), (5, -3)), ((4, 4), (-2, 9)), ((3, 3), (3, 3)), ((0, 7), (0, 0))] {
            let mut pts = Vec::new();
            walk_line(from, to, |x, y| pts.push((x, y)));
            assert_eq!(pts.first(), Some(&(from.0 as i64, from.1 as i64)));
            assert_eq!(pts.last(), Some(&(to.0 as i64, to.1 as i64)));
            // 8-connected, one step at a time
            assert!(pts.windows(2).all(|w| (w[0].0 - w[1].0).abs() <= 1 && (w[0].1 - w[1].1).abs() <= 1));
        }
    }

    #[test]
    fn test_size_three_circle_is_cross() {
        let px = raster(Stroke::dot((5, 5), 3, BrushShape::Circle, BLACK), PixelRect::full(32, 32));
        let got: HashSet<_> = px.into_iter().collect();
        let want: HashSet<_> = [(5, 5), (4, 5), (6, 5), (5, 4), (5, 6)].into_iter().collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_even_size_stamps() {
        let circle = raster(Stroke::dot((5, 5), 2, BrushShape::Circle, BLACK), PixelRect::full(32, 32));
        assert_eq!(circle, vec![(4, 4), (5, 4), (4, 5), (5, 5)]);
        let square = raster(Stroke::dot((5, 5), 2, BrushShape::Square, BLACK), PixelRect::full(32, 32));
        assert_eq!(square, circle);
    }

    #[test]
    fn test_odd_square_stamp_is_full_block() {
        let px = raster(Stroke::dot((5, 5), 3, BrushShape::Square, BLACK), PixelRect::full(32, 32));
        assert_eq!(px.len(), 9);
        assert!(px.iter().all(|&(x, y)| (4..=6).contains(&x) && (4..=6).contains(&y)));
    }

    #[test]
    fn test_horizontal_square_stroke() {
        let px = raster(Stroke::new((2, 5), (8, 5), 3, BrushShape::Square, BLACK), PixelRect::full(32, 32));
        assert_eq!(px.len(), 9 * 3);
        assert!(px.iter().all(|&(x, y)| (1..=9).contains(&x) && (4..=6).contains(&y)));
    }

    #[test]
    fn test_diagonal_square_covers_center_line() {
        for &(from, to) in &[((2, 2), (9, 9)), ((9, 9), (2, 2)), ((2, 9), (9, 2))] {
            let px: HashSet<_> = raster(Stroke::new(from, to, 3, BrushShape::Square, BLACK), PixelRect::full(32, 32))
                .into_iter()
                .collect();
            walk_line(from, to, |x, y| assert!(px.contains(&(x as u32, y as u32)), "{from:?}->{to:?} missed {x},{y}"));
        }
    }

    #[test]
    fn test_output_is_row_major() {
        let px = raster(Stroke::new((3, 10), (12, 4), 5, BrushShape::Circle, BLACK), PixelRect::full(32, 32));
        assert!(px.windows(2).all(|w| (w[0].1, w[0].0) < (w[1].1, w[1].0)));
    }

    #[test]
    fn test_nothing_outside_clip() {
        let clip = PixelRect::new(8, 8, 8, 8);
        for shape in BrushShape::all() {
            for size in [1, 2, 3, 6, 11] {
                let stroke = Stroke::new((-5, 3), (30, 20), size, *shape, BLACK);
                let px = raster(stroke, clip);
                assert!(!px.is_empty());
                assert!(px.iter().all(|&(x, y)| clip.contains(x as i32, y as i32)));
            }
        }
    }

    fn full_walk_in(from: (i32, i32), to: (i32, i32), clip: PixelRect) -> Vec<(u32, u32)> {
        let mut pts = Vec::new();
        walk_line(from, to, |x, y| {
            if x >= 0 && y >= 0 && clip.contains(x as i32, y as i32) {
                pts.push((x as u32, y as u32));
            }
        });
        pts.sort_unstable_by_key(|&(x, y)| (y, x));
        pts
    }

    #[test]
    fn test_clipped_span_matches_full_walk() {
        let clips = [PixelRect::full(32, 32), PixelRect::new(8, 3, 9, 20), PixelRect::new(0, 30, 32, 2)];
        let ends = [(-7, -3), (40, 11), (5, 31), (31, 0), (-12, 44), (16, 16), (3, -9), (33, 33)];
        for clip in clips {
            for &from in &ends {
                for &to in &ends {
                    let stroke = Stroke::new(from, to, 1, BrushShape::Circle, BLACK);
                    assert_eq!(raster(stroke, clip), full_walk_in(from, to, clip), "{from:?}->{to:?} in {clip}");
                }
            }
        }
    }

    #[test]
    fn test_long_line_walks_only_the_clip() {
        let span = LineSpan::clipped((-100_000, 3), (100_000, 7), PixelRect::full(32, 32)).unwrap();
        assert_eq!(span.start, (0, 5));
        assert_eq!(span.steps, 31);
        assert_eq!(span.err, 199_996);

        let px = raster(Stroke::new((-100_000, 3), (100_000, 7), 1, BrushShape::Circle, BLACK), PixelRect::full(32, 32));
        assert_eq!(px, (0..32).map(|x| (x, 5)).collect::<Vec<_>>());
        assert_eq!(px, full_walk_in((-100_000, 3), (100_000, 7), PixelRect::full(32, 32)));

        let px = raster(Stroke::new((5, -70_000), (9, 70_000), 1, BrushShape::Square, BLACK), PixelRect::full(32, 32));
        assert_eq!(px, (0..32).map(|y| (7, y)).collect::<Vec<_>>());
    }

    #[test]
    fn test_span_misses_clip() {
        assert_eq!(LineSpan::clipped((40, 40), (60, 60), PixelRect::full(32, 32)), None);
        assert_eq!(LineSpan::clipped((0, 0), (5, 5), PixelRect::EMPTY), None);
        let unclipped = LineSpan::clipped((2, 2), (9, 4), PixelRect::full(32, 32)).unwrap();
        assert_eq!(unclipped, LineSpan::new((2, 2), (9, 4)));
    }

    #[test]
    fn test_pointer_far_outside_canvas() {
        let px = raster(Stroke::new((-400, -400), (-300, -390), 9, BrushShape::Circle, BLACK), PixelRect::full(32, 32));
        assert!(px.is_empty());
    }

    #[test]
    fn test_parallel_matches_serial() {
        let stroke = Stroke::new((1, 30), (28, 2), 7, BrushShape::Square, BLACK);
        let clip = PixelRect::full(32, 32);
        let serial = rasterize_stroke(&stroke, clip, (32, 32), &Executor::Serial);
        let parallel = rasterize_stroke(&stroke, clip, (32, 32), &Executor::with_threads(4));
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_size_clamped() {
        let stroke = Stroke::new((0, 0), (0, 0), 0, BrushShape::Circle, BLACK);
        assert_eq!(stroke.size, 1);
        assert_eq!(Stroke::new((0, 0), (0, 0), 99_999, BrushShape::Circle, BLACK).size, MAX_BRUSH_SIZE);
        assert_eq!(stroke.with_max_size(0).size, 1);
    }

    #[test]
    fn test_segment_distance_guards_zero_length() {
        assert_eq!(distance_sq_to_segment([3.0, 4.0], [0.0, 0.0], [0.0, 0.0]), 25.0);
        assert_eq!(closest_point_on_line([3.0, 4.0], [1.0, 1.0], [1.0, 1.0]), [1.0, 1.0]);
    }
}
