//! Flood fill: contiguous breadth-first search from a seed, or a global
//! tolerance pass over the whole clip rect.

use crate::canvas::{Canvas, PixelRect};
use crate::executor::Executor;
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Minimum pixels per rayon job in the non-contiguous pass.
const NON_CONTIGUOUS_MIN_BATCH: usize = 100;

pub const DEFAULT_TOLERANCE: u8 = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    #[default]
    Four,
    Eight,
}

impl Connectivity {
    fn offsets(&self) -> &'static [(i32, i32)] {
        match self {
            Connectivity::Four => &[(-1, 0), (0, -1), (0, 1), (1, 0)],
            Connectivity::Eight => &[(-1, -1), (-1, 0), (-1, 1), (0, -1), (0, 1), (1, -1), (1, 0), (1, 1)],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FillRequest {
    pub seed: (i32, i32),
    /// Maximum per-channel absolute difference from the seed color.
    pub tolerance: u8,
    pub connectivity: Connectivity,
    pub contiguous: bool,
    pub color: Rgba<u8>,
}

impl FillRequest {
    pub fn new(seed: (i32, i32), color: Rgba<u8>) -> Self {
        Self {
            seed,
            tolerance: DEFAULT_TOLERANCE,
            connectivity: Connectivity::Four,
            contiguous: true,
            color,
        }
    }

    pub fn tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn contiguous(mut self, contiguous: bool) -> Self {
        self.contiguous = contiguous;
        self
    }
}

/// Two fully transparent pixels always match; otherwise every channel must be
/// within `tolerance`.
pub fn colors_match(seed: Rgba<u8>, other: Rgba<u8>, tolerance: u8) -> bool {
    if seed[3] == 0 && other[3] == 0 {
        return true;
    }
    seed.0.iter().zip(other.0.iter()).all(|(a, b)| a.abs_diff(*b) <= tolerance)
}

/// Pixels the fill would paint, in row-major order. The canvas is not
/// modified. A seed outside the clip rect yields nothing.
pub fn fill(canvas: &Canvas, request: &FillRequest, executor: &Executor) -> Vec<(u32, u32)> {
    let clip = canvas.clip();
    let (sx, sy) = request.seed;
    if !clip.contains(sx, sy) {
        return Vec::new();
    }
    let seed_color = canvas.read_pixel(sx, sy);

    if request.contiguous {
        flood(canvas, clip, (sx as u32, sy as u32), seed_color, request)
    } else {
        let image = canvas.image();
        executor
            .filter_indices(0..clip.area(), NON_CONTIGUOUS_MIN_BATCH, |i| {
                let (x, y) = clip.coord_at(i);
                colors_match(seed_color, *image.get_pixel(x, y), request.tolerance)
            })
            .into_iter()
            .map(|i| clip.coord_at(i))
            .collect()
    }
}

fn flood(
    canvas: &Canvas,
    clip: PixelRect,
    seed: (u32, u32),
    seed_color: Rgba<u8>,
    request: &FillRequest,
) -> Vec<(u32, u32)> {
    let image = canvas.image();
    let width = clip.width() as usize;
    let local = |x: u32, y: u32| (y - clip.min_y) as usize * width + (x - clip.min_x) as usize;

    // Marked when first seen, so a pixel is tested at most once.
    let mut visited = vec![false; clip.area()];
    let mut filled = vec![false; clip.area()];
    let mut queue = VecDeque::new();

    visited[local(seed.0, seed.1)] = true;
    queue.push_back(seed);

    while let Some((x, y)) = queue.pop_front() {
        filled[local(x, y)] = true;
        for &(dx, dy) in request.connectivity.offsets() {
            let (nx, ny) = (x as i32 + dx, y as i32 + dy);
            if !clip.contains(nx, ny) {
                continue;
            }
            let (nx, ny) = (nx as u32, ny as u32);
            let idx = local(nx, ny);
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            if colors_match(seed_color, *image.get_pixel(nx, ny), request.tolerance) {
                queue.push_back((nx, ny));
            }
        }
    }

    filled
        .iter()
        .enumerate()
        .filter(|(_, hit)| **hit)
        .map(|(i, _)| clip.coord_at(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn run(canvas: &Canvas, request: FillRequest) -> Vec<(u32, u32)> {
        fill(canvas, &request, &Executor::Serial)
    }

    /// 8×8 white canvas split by a black vertical wall at x = 4.
    fn walled() -> Canvas {
        let mut canvas = Canvas::new_filled(8, 8, WHITE).unwrap();
        for y in 0..8 {
            canvas.write_pixel(4, y, BLACK);
        }
        canvas.apply();
        canvas
    }

    #[test]
    fn test_transparent_canvas_fills_completely() {
        let canvas = Canvas::new(4, 4).unwrap();
        let px = run(&canvas, FillRequest::new((0, 0), RED).tolerance(0));
        assert_eq!(px.len(), 16);
        assert_eq!(px[0], (0, 0));
        assert_eq!(px[15], (3, 3));
    }

    #[test]
    fn test_does_not_cross_wall() {
        let canvas = walled();
        let px = run(&canvas, FillRequest::new((1, 1), RED).tolerance(0));
        assert_eq!(px.len(), 4 * 8);
        assert!(px.iter().all(|&(x, _)| x < 4));
    }

    #[test]
    fn test_eight_way_leaks_through_diagonal_gap() {
        // Diagonal line from (0,3) to (3,0) separates the top-left corner.
        let mut canvas = Canvas::new_filled(6, 6, WHITE).unwrap();
        for i in 0..4 {
            canvas.write_pixel(i, 3 - i, BLACK);
        }
        canvas.apply();
        let four = run(&canvas, FillRequest::new((0, 0), RED).tolerance(0));
        assert_eq!(four.len(), 6);
        let eight = run(&canvas, FillRequest::new((0, 0), RED).tolerance(0).connectivity(Connectivity::Eight));
        assert_eq!(eight.len(), 36 - 4);
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let mut canvas = Canvas::new_filled(3, 1, Rgba([100, 100, 100, 255])).unwrap();
        canvas.write_pixel(1, 0, Rgba([110, 100, 100, 255]));
        canvas.write_pixel(2, 0, Rgba([100, 100, 100, 255]));
        assert_eq!(run(&canvas, FillRequest::new((0, 0), RED).tolerance(10)).len(), 3);
        assert_eq!(run(&canvas, FillRequest::new((0, 0), RED).tolerance(9)), vec![(0, 0)]);
    }

    #[test]
    fn test_transparent_pixels_match_regardless_of_rgb() {
        assert!(colors_match(Rgba([0, 0, 0, 0]), Rgba([200, 10, 50, 0]), 0));
        assert!(!colors_match(Rgba([0, 0, 0, 0]), Rgba([0, 0, 0, 1]), 0));
    }

    #[test]
    fn test_uniform_region_refill_is_noop() {
        let mut canvas = Canvas::new_filled(5, 5, RED).unwrap();
        let px = run(&canvas, FillRequest::new((2, 2), RED));
        assert_eq!(canvas.write_pixels(&px, RED), 0);
        assert_eq!(canvas.apply(), None);
    }

    #[test]
    fn test_seed_outside_clip() {
        let canvas = Canvas::new(8, 8).unwrap().with_clip(PixelRect::new(2, 2, 4, 4));
        assert!(run(&canvas, FillRequest::new((0, 0), RED)).is_empty());
        assert!(run(&canvas, FillRequest::new((-3, 20), RED)).is_empty());
    }

    #[test]
    fn test_stays_inside_clip() {
        let clip = PixelRect::new(2, 2, 4, 4);
        let canvas = Canvas::new(8, 8).unwrap().with_clip(clip);
        for contiguous in [true, false] {
            let px = run(&canvas, FillRequest::new((3, 3), RED).contiguous(contiguous));
            assert_eq!(px.len(), 16);
            assert!(px.iter().all(|&(x, y)| clip.contains(x as i32, y as i32)));
        }
    }

    #[test]
    fn test_non_contiguous_jumps_walls() {
        let canvas = walled();
        let serial = run(&canvas, FillRequest::new((1, 1), RED).tolerance(0).contiguous(false));
        assert_eq!(serial.len(), 7 * 8);
        let parallel = fill(
            &canvas,
            &FillRequest::new((1, 1), RED).tolerance(0).contiguous(false),
            &Executor::with_threads(2),
        );
        assert_eq!(serial, parallel);
    }
}
