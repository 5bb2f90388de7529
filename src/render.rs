//! Dual-path rendering: the CPU buffer is authoritative, a preview surface
//! (GPU textures when available) mirrors it and shows in-progress strokes.

use image::{Rgba, RgbaImage};

use crate::brush::{self, BrushGeometry, Stroke};
use crate::canvas::{Canvas, CanvasId, PixelRect};
use crate::executor::Executor;
use crate::fill::{self, FillRequest};
use crate::gpu::GpuPreview;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no GPU adapter available")]
    NoAdapter,
    #[error("{width}x{height} exceeds the device texture limit of {max}")]
    TooLarge { width: u32, height: u32, max: u32 },
    #[error("preview surface has not been uploaded")]
    NotUploaded,
    #[error("GPU readback failed: {0}")]
    Readback(String),
    #[error("GPU device error: {0}")]
    Device(String),
    #[error("line is too long for the GPU preview")]
    LineTooLong,
}

impl RenderError {
    /// The backend itself is unusable, not just this call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::Device(_))
    }
}

/// Which preview surface an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewLayer {
    /// Mirror of the committed CPU buffer.
    Base,
    /// Base plus the in-progress stroke; what the host displays.
    Display,
}

/// A preview surface implementation.
///
/// `rasterize` always rebuilds `Display` from `Base` before drawing, so
/// repeated previews never accumulate. Targeting `Base` also commits the
/// result.
pub trait PreviewBackend {
    fn name(&self) -> &str;
    fn upload(&mut self, canvas: &Canvas) -> Result<(), RenderError>;
    fn rasterize(&mut self, geometry: &BrushGeometry, color: Rgba<u8>, layer: PreviewLayer) -> Result<(), RenderError>;
    fn read_back(&mut self, layer: PreviewLayer) -> Result<Vec<u8>, RenderError>;
}

// ============================================================================
// CPU PREVIEW
// ============================================================================

/// Software mirror used when no GPU adapter exists.
pub struct CpuPreview {
    base: Option<RgbaImage>,
    display: Option<RgbaImage>,
    executor: Executor,
}

impl CpuPreview {
    pub fn new(executor: Executor) -> Self {
        Self { base: None, display: None, executor }
    }
}

impl PreviewBackend for CpuPreview {
    fn name(&self) -> &str {
        "cpu"
    }

    fn upload(&mut self, canvas: &Canvas) -> Result<(), RenderError> {
        self.base = Some(canvas.image().clone());
        self.display = Some(canvas.image().clone());
        Ok(())
    }

    fn rasterize(&mut self, geometry: &BrushGeometry, color: Rgba<u8>, layer: PreviewLayer) -> Result<(), RenderError> {
        let base = self.base.as_ref().ok_or(RenderError::NotUploaded)?;
        let mut display = base.clone();
        for (x, y) in brush::rasterize_geometry(geometry, &self.executor) {
            if x < display.width() && y < display.height() {
                display.put_pixel(x, y, color);
            }
        }
        if layer == PreviewLayer::Base {
            self.base = Some(display.clone());
        }
        self.display = Some(display);
        Ok(())
    }

    fn read_back(&mut self, layer: PreviewLayer) -> Result<Vec<u8>, RenderError> {
        let image = match layer {
            PreviewLayer::Base => self.base.as_ref(),
            PreviewLayer::Display => self.display.as_ref(),
        };
        image.map(|i| i.as_raw().clone()).ok_or(RenderError::NotUploaded)
    }
}

// ============================================================================
// DUAL-PATH RENDERER
// ============================================================================

pub struct DualPathRenderer {
    backend: Box<dyn PreviewBackend>,
    executor: Executor,
    /// Canvas identity and generation the base surface currently mirrors.
    synced: Option<(CanvasId, u64)>,
}

impl DualPathRenderer {
    pub fn new(backend: Box<dyn PreviewBackend>, executor: Executor) -> Self {
        Self { backend, executor, synced: None }
    }

    pub fn cpu(executor: Executor) -> Self {
        Self::new(Box::new(CpuPreview::new(executor.clone())), executor)
    }

    /// GPU preview if an adapter can be created, CPU preview otherwise.
    pub fn with_gpu(preferred_gpu: &str, executor: Executor) -> Self {
        match GpuPreview::try_new(preferred_gpu) {
            Ok(gpu) => Self::new(Box::new(gpu), executor),
            Err(e) => {
                tracing::warn!("GPU preview unavailable ({e}), using CPU preview");
                Self::cpu(executor)
            }
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    fn is_synced(&self, canvas: &Canvas) -> bool {
        self.synced == Some((canvas.id(), canvas.generation()))
    }

    /// Swap a failed backend for the CPU preview. Returns true if it did.
    fn demote_on(&mut self, e: &RenderError) -> bool {
        if !e.is_fatal() || self.backend.name() == "cpu" {
            return false;
        }
        tracing::error!("{} preview failed ({e}), switching to CPU preview", self.backend.name());
        self.backend = Box::new(CpuPreview::new(self.executor.clone()));
        self.synced = None;
        true
    }

    /// Re-upload the CPU buffer to the preview surface.
    pub fn sync(&mut self, canvas: &Canvas) {
        let result = match self.backend.upload(canvas) {
            Err(e) if self.demote_on(&e) => self.backend.upload(canvas),
            other => other,
        };
        match result {
            Ok(()) => self.synced = Some((canvas.id(), canvas.generation())),
            Err(e) => {
                self.synced = None;
                tracing::warn!("preview upload failed: {e}");
            }
        }
    }

    /// Show `stroke` on top of the current CPU buffer without committing it.
    pub fn preview_stroke(&mut self, canvas: &Canvas, stroke: &Stroke) {
        if !self.is_synced(canvas) {
            self.sync(canvas);
        }
        let geometry = BrushGeometry::new(stroke, canvas.clip(), (canvas.width(), canvas.height()));
        if let Err(e) = self.backend.rasterize(&geometry, stroke.color, PreviewLayer::Display) {
            if self.demote_on(&e) {
                self.sync(canvas);
                if let Err(e) = self.backend.rasterize(&geometry, stroke.color, PreviewLayer::Display) {
                    tracing::warn!("preview stroke failed: {e}");
                }
            } else {
                tracing::warn!("preview stroke failed: {e}");
            }
        }
    }

    /// Apply `stroke` to the CPU buffer, then the same edit to the preview's
    /// committed surface. Returns the region that changed.
    pub fn commit_stroke(&mut self, canvas: &mut Canvas, stroke: &Stroke) -> Option<PixelRect> {
        let was_synced = self.is_synced(canvas);
        let geometry = BrushGeometry::new(stroke, canvas.clip(), (canvas.width(), canvas.height()));
        let pixels = brush::rasterize_geometry(&geometry, &self.executor);
        canvas.write_pixels(&pixels, stroke.color);
        let changed = canvas.apply();

        if !was_synced {
            self.sync(canvas);
            return changed;
        }
        match self.backend.rasterize(&geometry, stroke.color, PreviewLayer::Base) {
            Ok(()) => self.synced = Some((canvas.id(), canvas.generation())),
            Err(e) => {
                tracing::warn!("preview commit failed, re-uploading: {e}");
                self.demote_on(&e);
                self.sync(canvas);
            }
        }
        changed
    }

    /// Fill on the CPU buffer and mirror the result by re-upload.
    pub fn commit_fill(&mut self, canvas: &mut Canvas, request: &FillRequest) -> Option<PixelRect> {
        let pixels = fill::fill(canvas, request, &self.executor);
        canvas.write_pixels(&pixels, request.color);
        let changed = canvas.apply();
        if changed.is_some() || !self.is_synced(canvas) {
            self.sync(canvas);
        }
        changed
    }

    /// Current display surface (committed pixels plus any preview stroke).
    pub fn read_preview(&mut self) -> Option<Vec<u8>> {
        match self.backend.read_back(PreviewLayer::Display) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("preview readback failed: {e}");
                self.demote_on(&e);
                None
            }
        }
    }

    /// Compare the committed preview surface with the CPU buffer. Returns the
    /// number of differing pixels.
    pub fn verify(&mut self, canvas: &Canvas) -> Result<usize, RenderError> {
        let mirror = self.backend.read_back(PreviewLayer::Base)?;
        if mirror.len() != canvas.as_raw().len() {
            return Ok(canvas.bounds().area());
        }
        Ok(mirror
            .chunks_exact(4)
            .zip(canvas.as_raw().chunks_exact(4))
            .filter(|(a, b)| a != b)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::BrushShape;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn renderer() -> DualPathRenderer {
        DualPathRenderer::cpu(Executor::Serial)
    }

    #[test]
    fn test_preview_does_not_touch_cpu_buffer() {
        let canvas = Canvas::new(16, 16).unwrap();
        let mut r = renderer();
        r.preview_stroke(&canvas, &Stroke::new((1, 1), (10, 10), 3, BrushShape::Circle, RED));
        assert!(canvas.as_raw().iter().all(|&b| b == 0));
        let shown = r.read_preview().unwrap();
        assert!(shown.chunks_exact(4).any(|p| p == RED.0));
        assert_eq!(r.verify(&canvas).unwrap(), 0);
    }

    #[test]
    fn test_preview_is_idempotent() {
        let canvas = Canvas::new(16, 16).unwrap();
        let mut r = renderer();
        r.preview_stroke(&canvas, &Stroke::new((1, 1), (14, 1), 2, BrushShape::Square, RED));
        r.preview_stroke(&canvas, &Stroke::dot((8, 8), 1, BrushShape::Circle, RED));
        let shown = r.read_preview().unwrap();
        assert_eq!(shown.chunks_exact(4).filter(|p| *p == RED.0).count(), 1);
    }

    #[test]
    fn test_commit_keeps_paths_consistent() {
        let mut canvas = Canvas::new(24, 24).unwrap().with_clip(PixelRect::new(4, 4, 12, 12));
        let mut r = renderer();
        r.sync(&canvas);
        let strokes = [
            Stroke::new((0, 0), (23, 23), 1, BrushShape::Circle, RED),
            Stroke::new((5, 20), (20, 5), 4, BrushShape::Square, Rgba([0, 0, 255, 255])),
            Stroke::dot((9, 9), 5, BrushShape::Circle, Rgba([0, 0, 0, 0])),
        ];
        for stroke in &strokes {
            r.commit_stroke(&mut canvas, stroke);
            assert_eq!(r.verify(&canvas).unwrap(), 0);
        }
        assert_eq!(r.read_preview().unwrap(), canvas.as_raw());
    }

    #[test]
    fn test_commit_resyncs_after_external_change() {
        let mut canvas = Canvas::new(8, 8).unwrap();
        let mut r = renderer();
        r.sync(&canvas);
        canvas.write_pixel(0, 0, RED);
        canvas.apply();
        r.commit_stroke(&mut canvas, &Stroke::dot((5, 5), 1, BrushShape::Circle, RED));
        assert_eq!(r.verify(&canvas).unwrap(), 0);
    }

    #[test]
    fn test_commit_fill_mirrors() {
        let mut canvas = Canvas::new(6, 6).unwrap();
        let mut r = renderer();
        let changed = r.commit_fill(&mut canvas, &FillRequest::new((0, 0), RED));
        assert_eq!(changed, Some(PixelRect::full(6, 6)));
        assert_eq!(r.verify(&canvas).unwrap(), 0);
    }

    /// Backend whose device is gone.
    struct LostDevice;

    impl PreviewBackend for LostDevice {
        fn name(&self) -> &str {
            "gpu"
        }
        fn upload(&mut self, _: &Canvas) -> Result<(), RenderError> {
            Err(RenderError::Device("pipeline creation failed".into()))
        }
        fn rasterize(&mut self, _: &BrushGeometry, _: Rgba<u8>, _: PreviewLayer) -> Result<(), RenderError> {
            Err(RenderError::Device("pipeline creation failed".into()))
        }
        fn read_back(&mut self, _: PreviewLayer) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Device("pipeline creation failed".into()))
        }
    }

    #[test]
    fn test_device_error_switches_to_cpu_preview() {
        let mut canvas = Canvas::new(8, 8).unwrap();
        let mut r = DualPathRenderer::new(Box::new(LostDevice), Executor::Serial);
        assert_eq!(r.backend_name(), "gpu");
        r.sync(&canvas);
        assert_eq!(r.backend_name(), "cpu");
        r.commit_stroke(&mut canvas, &Stroke::new((0, 0), (7, 7), 1, BrushShape::Circle, RED));
        assert_eq!(r.verify(&canvas).unwrap(), 0);
    }

    #[test]
    fn test_device_error_during_preview_recovers() {
        let canvas = Canvas::new(8, 8).unwrap();
        let mut r = DualPathRenderer::new(Box::new(LostDevice), Executor::Serial);
        r.preview_stroke(&canvas, &Stroke::dot((3, 3), 1, BrushShape::Circle, RED));
        assert_eq!(r.backend_name(), "cpu");
        let shown = r.read_preview().unwrap();
        assert_eq!(shown.chunks_exact(4).filter(|p| *p == RED.0).count(), 1);
    }

    #[test]
    fn test_verify_before_upload_errors() {
        let canvas = Canvas::new(2, 2).unwrap();
        let mut r = renderer();
        assert!(matches!(r.verify(&canvas), Err(RenderError::NotUploaded)));
    }
}
