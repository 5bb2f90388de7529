use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Largest supported canvas edge, in pixels.
pub const MAX_CANVAS_DIM: u32 = 2048;

/// Fully transparent black, the initial value of every new canvas pixel.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// IDENTITY / ORIGIN
// ============================================================================

/// Opaque identity of a canvas, stable for the lifetime of the edit target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanvasId(Uuid);

impl CanvasId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CanvasId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CanvasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row order of the pixel buffer relative to the host's texture space.
///
/// `TopLeft` matches wgpu and PNG (row 0 is the top of the image).
/// `BottomLeft` matches hosts that address textures from the bottom row up;
/// such buffers are flipped when they cross the PNG boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    TopLeft,
    BottomLeft,
}

// ============================================================================
// PIXEL RECT
// ============================================================================

/// Half-open integer rectangle `[min, max)` in pixel coordinates.
///
/// Used both as the clip rect (valid-edit region) and as the dirty region
/// accumulated by writes. An empty rect has `min >= max` on either axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl PixelRect {
    pub const EMPTY: PixelRect = PixelRect { min_x: 0, min_y: 0, max_x: 0, max_y: 0 };

    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x.saturating_add(width),
            max_y: y.saturating_add(height),
        }
    }

    pub fn from_min_max(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// The whole of a `width × height` canvas.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// A single pixel.
    pub fn pixel(x: u32, y: u32) -> Self {
        Self::new(x, y, 1, 1)
    }

    pub fn width(&self) -> u32 {
        self.max_x.saturating_sub(self.min_x)
    }

    pub fn height(&self) -> u32 {
        self.max_y.saturating_sub(self.min_y)
    }

    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Signed containment test; negative coordinates are never inside.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0
            && y >= 0
            && (x as u32) >= self.min_x
            && (y as u32) >= self.min_y
            && (x as u32) < self.max_x
            && (y as u32) < self.max_y
    }

    pub fn contains_rect(&self, other: &PixelRect) -> bool {
        other.is_empty()
            || (other.min_x >= self.min_x
                && other.min_y >= self.min_y
                && other.max_x <= self.max_x
                && other.max_y <= self.max_y)
    }

    pub fn intersect(&self, other: &PixelRect) -> PixelRect {
        let r = PixelRect {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if r.is_empty() { PixelRect::EMPTY } else { r }
    }

    pub fn union(&self, other: &PixelRect) -> PixelRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        PixelRect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow the rect so it covers pixel `(x, y)`.
    pub fn include(&mut self, x: u32, y: u32) {
        *self = self.union(&PixelRect::pixel(x, y));
    }

    /// Linear index → pixel coordinate, row-major within this rect.
    pub fn coord_at(&self, index: usize) -> (u32, u32) {
        let w = self.width().max(1) as usize;
        (self.min_x + (index % w) as u32, self.min_y + (index / w) as u32)
    }
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{} → {},{})", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

// ============================================================================
// CANVAS
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CanvasError {
    #[error("canvas size {width}x{height} is outside 1..={MAX_CANVAS_DIM}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

fn check_dimensions(width: u32, height: u32) -> Result<(), CanvasError> {
    if width == 0 || height == 0 || width > MAX_CANVAS_DIM || height > MAX_CANVAS_DIM {
        return Err(CanvasError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Mutable RGBA8 pixel buffer plus its valid-edit region.
///
/// The CPU buffer is the single source of truth for a canvas: undo snapshots
/// and save entries are taken from it, and the GPU preview is re-derived from
/// it. Writes outside the clip rect are silently dropped.
#[derive(Clone, Debug)]
pub struct Canvas {
    id: CanvasId,
    pixels: RgbaImage,
    clip: PixelRect,
    origin: Origin,
    /// Region written since the last `apply()`.
    pending: PixelRect,
    /// Bumped by every `apply()` that committed writes, and by wholesale replacement.
    generation: u64,
}

impl Canvas {
    /// New fully transparent canvas.
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        Self::new_filled(width, height, TRANSPARENT)
    }

    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Result<Self, CanvasError> {
        check_dimensions(width, height)?;
        Ok(Self::from_valid_image(RgbaImage::from_pixel(width, height, color)))
    }

    pub fn from_image(image: RgbaImage) -> Result<Self, CanvasError> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self::from_valid_image(image))
    }

    /// Build from raw row-major RGBA8 bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CanvasError> {
        check_dimensions(width, height)?;
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        RgbaImage::from_raw(width, height, data)
            .map(Self::from_valid_image)
            .ok_or(CanvasError::BufferSize { expected, actual })
    }

    fn from_valid_image(pixels: RgbaImage) -> Self {
        let clip = PixelRect::full(pixels.width(), pixels.height());
        Self {
            id: CanvasId::new(),
            pixels,
            clip,
            origin: Origin::TopLeft,
            pending: PixelRect::EMPTY,
            generation: 0,
        }
    }

    pub fn with_clip(mut self, clip: PixelRect) -> Self {
        self.set_clip(clip);
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_id(mut self, id: CanvasId) -> Self {
        self.id = id;
        self
    }

    /// Restrict edits to `clip` (intersected with the canvas bounds).
    pub fn set_clip(&mut self, clip: PixelRect) {
        self.clip = clip.intersect(&self.bounds());
    }

    pub fn id(&self) -> CanvasId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::full(self.width(), self.height())
    }

    pub fn clip(&self) -> PixelRect {
        self.clip
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Read a pixel; out-of-range coordinates are clamped to the nearest edge.
    pub fn read_pixel(&self, x: i32, y: i32) -> Rgba<u8> {
        let cx = x.clamp(0, self.width() as i32 - 1) as u32;
        let cy = y.clamp(0, self.height() as i32 - 1) as u32;
        *self.pixels.get_pixel(cx, cy)
    }

    /// Write a pixel. No-op outside the clip rect. Returns whether the stored
    /// value changed.
    pub fn write_pixel(&mut self, x: i32, y: i32, color: Rgba<u8>) -> bool {
        if !self.clip.contains(x, y) {
            return false;
        }
        let (ux, uy) = (x as u32, y as u32);
        let px = self.pixels.get_pixel_mut(ux, uy);
        if *px == color {
            return false;
        }
        *px = color;
        self.pending.include(ux, uy);
        true
    }

    /// Write `color` to every listed pixel; returns how many changed.
    pub fn write_pixels(&mut self, pixels: &[(u32, u32)], color: Rgba<u8>) -> usize {
        pixels
            .iter()
            .filter(|&&(x, y)| {
                x <= i32::MAX as u32 && y <= i32::MAX as u32 && self.write_pixel(x as i32, y as i32, color)
            })
            .count()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Region written since the last `apply()`, without consuming it.
    pub fn pending(&self) -> PixelRect {
        self.pending
    }

    /// Commit pending writes. Returns the region written since the previous
    /// call, or `None` if nothing changed.
    pub fn apply(&mut self) -> Option<PixelRect> {
        if self.pending.is_empty() {
            return None;
        }
        let committed = std::mem::replace(&mut self.pending, PixelRect::EMPTY);
        self.generation += 1;
        Some(committed)
    }

    /// Copy out the bytes of `rect` (clamped to the canvas), row-major.
    pub fn snapshot_rect(&self, rect: PixelRect) -> (PixelRect, Vec<u8>) {
        let rect = rect.intersect(&self.bounds());
        let mut out = Vec::with_capacity(rect.area() * 4);
        let stride = self.width() as usize * 4;
        let raw = self.pixels.as_raw();
        for y in rect.min_y..rect.max_y {
            let start = y as usize * stride + rect.min_x as usize * 4;
            out.extend_from_slice(&raw[start..start + rect.width() as usize * 4]);
        }
        (rect, out)
    }

    /// Overwrite `rect` with row-major bytes, bypassing the clip rect.
    ///
    /// Used to restore history snapshots, which must reproduce the buffer
    /// exactly regardless of the current clip.
    pub fn restore_rect(&mut self, rect: PixelRect, data: &[u8]) -> Result<(), CanvasError> {
        let expected = rect.area() * 4;
        if !self.bounds().contains_rect(&rect) || data.len() != expected {
            return Err(CanvasError::BufferSize { expected, actual: data.len() });
        }
        if rect.is_empty() {
            return Ok(());
        }
        let stride = self.width() as usize * 4;
        let row_bytes = rect.width() as usize * 4;
        let raw: &mut [u8] = &mut self.pixels;
        for (row, y) in (rect.min_y..rect.max_y).enumerate() {
            let dst = y as usize * stride + rect.min_x as usize * 4;
            raw[dst..dst + row_bytes].copy_from_slice(&data[row * row_bytes..(row + 1) * row_bytes]);
        }
        self.pending = self.pending.union(&rect);
        Ok(())
    }

    /// Replace the whole buffer (dimensions may change). The clip rect is
    /// kept where it still fits, otherwise reset to the full canvas.
    pub fn replace_image(&mut self, image: RgbaImage) -> Result<(), CanvasError> {
        check_dimensions(image.width(), image.height())?;
        let resized = image.dimensions() != self.pixels.dimensions();
        self.pixels = image;
        if resized {
            self.clip = self.bounds();
        }
        self.pending = self.bounds();
        self.apply();
        Ok(())
    }

    /// Resize to `width × height`, keeping existing pixels anchored at the
    /// origin corner and filling new area with transparency.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), CanvasError> {
        check_dimensions(width, height)?;
        let mut next = RgbaImage::from_pixel(width, height, TRANSPARENT);
        let copy_w = width.min(self.width());
        let copy_h = height.min(self.height());
        for y in 0..copy_h {
            for x in 0..copy_w {
                next.put_pixel(x, y, *self.pixels.get_pixel(x, y));
            }
        }
        self.replace_image(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn rejects_out_of_range_dimensions() {
        assert!(Canvas::new(0, 4).is_err());
        assert!(Canvas::new(4, MAX_CANVAS_DIM + 1).is_err());
        assert!(Canvas::new(MAX_CANVAS_DIM, 1).is_ok());
    }

    #[test]
    fn writes_outside_clip_are_dropped() {
        let mut canvas = Canvas::new(8, 8).unwrap().with_clip(PixelRect::new(2, 2, 4, 4));
        assert!(!canvas.write_pixel(1, 1, RED));
        assert!(!canvas.write_pixel(-1, 3, RED));
        assert!(!canvas.write_pixel(6, 3, RED));
        assert!(canvas.write_pixel(2, 5, RED));
        assert_eq!(canvas.read_pixel(1, 1), TRANSPARENT);
        assert_eq!(canvas.read_pixel(2, 5), RED);
    }

    #[test]
    fn read_clamps_coordinates() {
        let mut canvas = Canvas::new(3, 3).unwrap();
        canvas.write_pixel(2, 0, RED);
        assert_eq!(canvas.read_pixel(99, -5), RED);
    }

    #[test]
    fn apply_reports_pending_region_once() {
        let mut canvas = Canvas::new(8, 8).unwrap();
        canvas.write_pixel(1, 2, RED);
        canvas.write_pixel(4, 6, RED);
        assert_eq!(canvas.apply(), Some(PixelRect::from_min_max(1, 2, 5, 7)));
        assert_eq!(canvas.generation(), 1);
        assert_eq!(canvas.apply(), None);
        // Rewriting the same value is not a change.
        canvas.write_pixel(1, 2, RED);
        assert!(!canvas.has_pending());
    }

    #[test]
    fn rect_round_trip() {
        let mut canvas = Canvas::new(4, 4).unwrap();
        canvas.write_pixel(1, 1, RED);
        let (rect, bytes) = canvas.snapshot_rect(PixelRect::new(0, 0, 2, 2));
        let mut other = Canvas::new(4, 4).unwrap();
        other.restore_rect(rect, &bytes).unwrap();
        assert_eq!(other.read_pixel(1, 1), RED);
        assert!(other.restore_rect(PixelRect::new(3, 3, 2, 2), &[0; 16]).is_err());
    }

    #[test]
    fn resize_keeps_origin_corner() {
        let mut canvas = Canvas::new(4, 4).unwrap().with_clip(PixelRect::new(1, 1, 2, 2));
        canvas.write_pixel(1, 1, RED);
        canvas.resize(2, 6).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (2, 6));
        assert_eq!(canvas.read_pixel(1, 1), RED);
        assert_eq!(canvas.clip(), PixelRect::full(2, 6));
    }

    #[test]
    fn rect_helpers() {
        let a = PixelRect::new(0, 0, 4, 4);
        let b = PixelRect::new(2, 2, 4, 4);
        assert_eq!(a.intersect(&b), PixelRect::new(2, 2, 2, 2));
        assert_eq!(a.union(&b), PixelRect::new(0, 0, 6, 6));
        assert!(a.intersect(&PixelRect::new(10, 10, 1, 1)).is_empty());
        assert_eq!(b.coord_at(5), (3, 3));
    }
}
