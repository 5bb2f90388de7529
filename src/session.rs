//! Editor core: owns the open canvases and the services around them, and
//! turns tool input into recorded, saveable edits.
//!
//! A gesture (one mouse-down..mouse-up) maps to one undo group. The undo
//! record is opened right before the first write of the gesture, so it
//! captures the untouched canvas, and sealed with the touched region when
//! the gesture ends. Sealing also marks the canvas dirty for saving.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use image::Rgba;

use crate::brush::{BrushShape, Stroke};
use crate::canvas::{Canvas, CanvasError, CanvasId, PixelRect};
use crate::executor::Executor;
use crate::fill::FillRequest;
use crate::history::{CanvasImage, GroupId, PixelPatch, Snapshot, UndoError, UndoLog, UndoRecord, UndoTarget};
use crate::io::{self, CodecError};
use crate::render::{DualPathRenderer, RenderError};
use crate::save::{BackingStore, FileStore, FlushReport, SaveEntry, SaveError, SaveTracker};
use crate::settings::EngineSettings;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("unknown canvas {0}")]
    UnknownCanvas(CanvasId),
    #[error("gesture {0} is still active")]
    GestureActive(GroupId),
    #[error("no gesture is active")]
    NoGesture,
    #[error("canvas {0} could not be saved")]
    Unsaved(CanvasId),
    #[error("preview of canvas {canvas} differs from the buffer in {pixels} pixel(s)")]
    PreviewMismatch { canvas: CanvasId, pixels: usize },
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    #[error(transparent)]
    Undo(#[from] UndoError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Save(#[from] SaveError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

// ============================================================================
// GESTURE
// ============================================================================

/// State of the gesture in progress.
#[derive(Debug)]
pub struct Gesture {
    group: GroupId,
    canvas: CanvasId,
    label: String,
    recording: bool,
    touched: PixelRect,
    /// Pixel-perfect trail of size-1 stroke endpoints.
    painted: Vec<(i32, i32)>,
    prev_painted_color: Option<Rgba<u8>>,
}

impl Gesture {
    fn new(group: GroupId, canvas: CanvasId, label: String) -> Self {
        Self {
            group,
            canvas,
            label,
            recording: false,
            touched: PixelRect::EMPTY,
            painted: Vec::new(),
            prev_painted_color: None,
        }
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn canvas(&self) -> CanvasId {
        self.canvas
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Region changed so far.
    pub fn touched(&self) -> PixelRect {
        self.touched
    }

    fn start_recording(&mut self, canvas: &Canvas, undo: &mut UndoLog) {
        if !self.recording {
            undo.submit(UndoRecord::paint(canvas, self.label.clone()), self.group);
            self.recording = true;
        }
    }

    fn touch(&mut self, changed: Option<PixelRect>) {
        if let Some(rect) = changed {
            self.touched = self.touched.union(&rect);
        }
    }

    /// Middle point of the last three painted pixels if they form an L.
    fn l_corner(&self) -> Option<(i32, i32)> {
        let [.., a0, a1, a2] = self.painted[..] else {
            return None;
        };
        let horizontal_then_vertical = (a0.0 - a1.0).abs() == 1
            && a2.0 == a1.0
            && (a2.1 - a1.1).abs() == 1
            && a0.1 == a1.1;
        let vertical_then_horizontal = (a0.1 - a1.1).abs() == 1
            && a2.1 == a1.1
            && (a2.0 - a1.0).abs() == 1
            && a0.0 == a1.0;
        (horizontal_then_vertical || vertical_then_horizontal).then_some(a1)
    }
}

// ============================================================================
// REPLAY TARGET
// ============================================================================

/// Applies replayed records to the open canvases and remembers which ones
/// changed, so they can be marked dirty and re-uploaded afterwards.
struct ReplayTarget<'a> {
    canvases: &'a mut HashMap<CanvasId, Canvas>,
    touched: HashSet<CanvasId>,
}

impl<'a> ReplayTarget<'a> {
    fn new(canvases: &'a mut HashMap<CanvasId, Canvas>) -> Self {
        Self { canvases, touched: HashSet::new() }
    }

    fn canvas(&mut self, id: CanvasId) -> Result<&mut Canvas, UndoError> {
        self.touched.insert(id);
        self.canvases.get_mut(&id).ok_or(UndoError::UnknownCanvas(id))
    }

    fn finish<S: BackingStore>(self, saves: &mut SaveTracker<S>, renderer: &mut DualPathRenderer) {
        for id in self.touched {
            if let Some(canvas) = self.canvases.get(&id) {
                saves.mark_dirty(id, SaveEntry::capture(canvas));
                renderer.sync(canvas);
            }
        }
    }
}

impl UndoTarget for ReplayTarget<'_> {
    fn restore_patch(&mut self, canvas: CanvasId, patch: &PixelPatch) -> Result<(), UndoError> {
        self.canvas(canvas)?.restore_patch(canvas, patch)
    }

    fn restore_image(&mut self, canvas: CanvasId, image: &CanvasImage) -> Result<(), UndoError> {
        self.canvas(canvas)?.restore_image(canvas, image)
    }
}

// ============================================================================
// EDITOR CORE
// ============================================================================

pub struct EditorCore<S: BackingStore = FileStore> {
    settings: EngineSettings,
    canvases: HashMap<CanvasId, Canvas>,
    undo: UndoLog,
    saves: SaveTracker<S>,
    renderer: DualPathRenderer,
    gesture: Option<Gesture>,
    next_group: GroupId,
}

impl<S: BackingStore> EditorCore<S> {
    /// Build the services from `settings`. The GPU preview is used when
    /// enabled and an adapter exists.
    pub fn new(settings: EngineSettings, store: S) -> Self {
        let executor = Executor::with_threads(settings.worker_threads);
        let renderer = if settings.gpu_acceleration {
            DualPathRenderer::with_gpu(&settings.preferred_gpu, executor)
        } else {
            DualPathRenderer::cpu(executor)
        };
        Self::with_renderer(settings, store, renderer)
    }

    pub fn with_renderer(settings: EngineSettings, store: S, renderer: DualPathRenderer) -> Self {
        tracing::info!(
            "editor core ready: {} preview, {:?} executor, undo cap {} records / {} bytes",
            renderer.backend_name(),
            renderer.executor(),
            settings.max_undo_steps,
            settings.max_undo_bytes
        );
        Self {
            undo: UndoLog::new(settings.max_undo_steps, settings.max_undo_bytes),
            saves: SaveTracker::new(store),
            canvases: HashMap::new(),
            renderer,
            gesture: None,
            next_group: GroupId(1),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn canvas(&self, id: CanvasId) -> Option<&Canvas> {
        self.canvases.get(&id)
    }

    pub fn canvas_ids(&self) -> Vec<CanvasId> {
        let mut ids: Vec<_> = self.canvases.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn undo_log(&self) -> &UndoLog {
        &self.undo
    }

    pub fn save_tracker(&self) -> &SaveTracker<S> {
        &self.saves
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.saves.store_mut()
    }

    pub fn renderer_mut(&mut self) -> &mut DualPathRenderer {
        &mut self.renderer
    }

    pub fn active_gesture(&self) -> Option<&Gesture> {
        self.gesture.as_ref()
    }

    fn ensure_idle(&self) -> Result<(), EditorError> {
        match &self.gesture {
            Some(g) => Err(EditorError::GestureActive(g.group)),
            None => Ok(()),
        }
    }

    fn allocate_group(&mut self) -> GroupId {
        let group = self.next_group;
        self.next_group = group.next();
        group
    }

    // ========================================================================
    // CANVAS LIFECYCLE
    // ========================================================================

    pub fn open_canvas(&mut self, canvas: Canvas) -> CanvasId {
        let id = canvas.id();
        tracing::debug!("opened canvas {id} ({}x{}, clip {})", canvas.width(), canvas.height(), canvas.clip());
        self.renderer.sync(&canvas);
        self.canvases.insert(id, canvas);
        id
    }

    /// Release a canvas. Its undo records are dropped; a pending save entry
    /// stays until saved or discarded.
    pub fn close_canvas(&mut self, id: CanvasId) -> Result<Canvas, EditorError> {
        if let Some(g) = self.gesture.as_ref().filter(|g| g.canvas == id) {
            return Err(EditorError::GestureActive(g.group));
        }
        let canvas = self.canvases.remove(&id).ok_or(EditorError::UnknownCanvas(id))?;
        self.undo.forget_canvas(id);
        tracing::debug!("closed canvas {id}");
        Ok(canvas)
    }

    /// Change the editable sub-region of a canvas.
    pub fn set_clip(&mut self, id: CanvasId, clip: PixelRect) -> Result<(), EditorError> {
        let canvas = self.canvases.get_mut(&id).ok_or(EditorError::UnknownCanvas(id))?;
        canvas.set_clip(clip);
        Ok(())
    }

    // ========================================================================
    // GESTURES
    // ========================================================================

    pub fn begin_gesture(&mut self, canvas: CanvasId, label: impl Into<String>) -> Result<GroupId, EditorError> {
        self.ensure_idle()?;
        if !self.canvases.contains_key(&canvas) {
            return Err(EditorError::UnknownCanvas(canvas));
        }
        let group = self.allocate_group();
        self.gesture = Some(Gesture::new(group, canvas, label.into()));
        Ok(group)
    }

    /// Paint one stroke segment on the gesture's canvas. Returns the region
    /// that changed.
    pub fn stroke(&mut self, stroke: Stroke) -> Result<Option<PixelRect>, EditorError> {
        let stroke = stroke.with_max_size(self.settings.max_brush_size);
        let pixel_perfect = self.settings.pixel_perfect && stroke.size == 1;
        let gesture = self.gesture.as_mut().ok_or(EditorError::NoGesture)?;
        let canvas = self
            .canvases
            .get_mut(&gesture.canvas)
            .ok_or(EditorError::UnknownCanvas(gesture.canvas))?;

        gesture.start_recording(canvas, &mut self.undo);
        let (x, y) = stroke.to;
        let under = canvas.read_pixel(x, y);
        let mut changed = self.renderer.commit_stroke(canvas, &stroke);

        if pixel_perfect && canvas.clip().contains(x, y) && gesture.painted.last() != Some(&stroke.to) {
            gesture.painted.push(stroke.to);
            if let Some(corner) = gesture.l_corner() {
                if let Some(color) = gesture.prev_painted_color {
                    let fix = self
                        .renderer
                        .commit_stroke(canvas, &Stroke::dot(corner, 1, BrushShape::Circle, color));
                    changed = match (changed, fix) {
                        (Some(a), Some(b)) => Some(a.union(&b)),
                        (a, b) => a.or(b),
                    };
                }
                let n = gesture.painted.len();
                gesture.painted.remove(n - 2);
            }
            gesture.prev_painted_color = Some(under);
        }

        gesture.touch(changed);
        Ok(changed)
    }

    /// Fill from `seed` using the configured tolerance, connectivity and
    /// contiguity.
    pub fn fill(&mut self, seed: (i32, i32), color: Rgba<u8>) -> Result<Option<PixelRect>, EditorError> {
        let request = FillRequest::new(seed, color)
            .tolerance(self.settings.fill_tolerance)
            .connectivity(self.settings.fill_connectivity)
            .contiguous(self.settings.fill_contiguous);
        self.fill_with(&request)
    }

    pub fn fill_with(&mut self, request: &FillRequest) -> Result<Option<PixelRect>, EditorError> {
        let gesture = self.gesture.as_mut().ok_or(EditorError::NoGesture)?;
        let canvas = self
            .canvases
            .get_mut(&gesture.canvas)
            .ok_or(EditorError::UnknownCanvas(gesture.canvas))?;
        gesture.start_recording(canvas, &mut self.undo);
        let changed = self.renderer.commit_fill(canvas, request);
        gesture.touch(changed);
        Ok(changed)
    }

    /// Show `stroke` on the preview surface without touching the canvas.
    pub fn preview(&mut self, canvas: CanvasId, stroke: &Stroke) -> Result<(), EditorError> {
        let canvas = self.canvases.get(&canvas).ok_or(EditorError::UnknownCanvas(canvas))?;
        let stroke = stroke.with_max_size(self.settings.max_brush_size);
        self.renderer.preview_stroke(canvas, &stroke);
        Ok(())
    }

    /// Pixels currently shown by the preview surface.
    pub fn preview_pixels(&mut self) -> Option<Vec<u8>> {
        self.renderer.read_preview()
    }

    /// Number of pixels where the preview's committed surface differs from
    /// the canvas buffer.
    pub fn verify_preview(&mut self, id: CanvasId) -> Result<usize, EditorError> {
        let canvas = self.canvases.get(&id).ok_or(EditorError::UnknownCanvas(id))?;
        Ok(self.renderer.verify(canvas)?)
    }

    /// Fail unless the preview's committed surface matches the canvas.
    pub fn check_preview(&mut self, id: CanvasId) -> Result<(), EditorError> {
        match self.verify_preview(id)? {
            0 => Ok(()),
            pixels => Err(EditorError::PreviewMismatch { canvas: id, pixels }),
        }
    }

    /// Seal the gesture's undo record and mark its canvas dirty.
    pub fn end_gesture(&mut self) -> Result<GroupId, EditorError> {
        let gesture = self.gesture.take().ok_or(EditorError::NoGesture)?;
        let canvas = self
            .canvases
            .get(&gesture.canvas)
            .ok_or(EditorError::UnknownCanvas(gesture.canvas))?;

        if gesture.recording {
            let after = PixelPatch::capture(canvas, gesture.touched);
            if let Err(e) = self.undo.seal(gesture.group, Snapshot::Patch(after)) {
                // Evicted before it was sealed.
                tracing::debug!("'{}' not sealed: {e}", gesture.label);
            }
        }
        if !gesture.touched.is_empty() {
            self.saves.mark_dirty(canvas.id(), SaveEntry::capture(canvas));
        }
        tracing::debug!("gesture {} '{}' ended, touched {}", gesture.group, gesture.label, gesture.touched);
        Ok(gesture.group)
    }

    /// Resize a canvas as its own undoable edit.
    pub fn resize_canvas(&mut self, id: CanvasId, width: u32, height: u32) -> Result<GroupId, EditorError> {
        self.ensure_idle()?;
        let group = self.next_group;
        let canvas = self.canvases.get_mut(&id).ok_or(EditorError::UnknownCanvas(id))?;
        let record = UndoRecord::resize(canvas, format!("Resize to {width}x{height}"));
        canvas.resize(width, height)?;
        self.next_group = group.next();

        self.undo.submit(record, group);
        if let Err(e) = self.undo.seal(group, Snapshot::Image(CanvasImage::capture(canvas))) {
            tracing::debug!("resize of {id} not sealed: {e}");
        }
        self.saves.mark_dirty(id, SaveEntry::capture(canvas));
        self.renderer.sync(canvas);
        Ok(group)
    }

    // ========================================================================
    // UNDO / REDO
    // ========================================================================

    /// Undo the latest applied gesture. Returns its label.
    pub fn undo(&mut self) -> Result<Option<String>, EditorError> {
        self.ensure_idle()?;
        let mut target = ReplayTarget::new(&mut self.canvases);
        let label = self.undo.undo_step(&mut target);
        target.finish(&mut self.saves, &mut self.renderer);
        Ok(label)
    }

    pub fn redo(&mut self) -> Result<Option<String>, EditorError> {
        self.ensure_idle()?;
        let mut target = ReplayTarget::new(&mut self.canvases);
        let label = self.undo.redo_step(&mut target);
        target.finish(&mut self.saves, &mut self.renderer);
        Ok(label)
    }

    /// Undo back to and including `group`. Returns the records replayed.
    pub fn undo_group(&mut self, group: GroupId) -> Result<usize, EditorError> {
        self.ensure_idle()?;
        let mut target = ReplayTarget::new(&mut self.canvases);
        let replayed = self.undo.undo(group, &mut target);
        target.finish(&mut self.saves, &mut self.renderer);
        Ok(replayed)
    }

    pub fn redo_group(&mut self, group: GroupId) -> Result<usize, EditorError> {
        self.ensure_idle()?;
        let mut target = ReplayTarget::new(&mut self.canvases);
        let replayed = self.undo.redo(group, &mut target);
        target.finish(&mut self.saves, &mut self.renderer);
        Ok(replayed)
    }

    // ========================================================================
    // SAVING
    // ========================================================================

    pub fn is_dirty(&self, id: CanvasId) -> bool {
        self.saves.is_dirty(id)
    }

    /// Flush the pending entry of one canvas. Returns whether it was written;
    /// a canvas with nothing pending counts as saved.
    pub fn save(&mut self, id: CanvasId) -> bool {
        !self.saves.is_dirty(id) || self.saves.flush(id)
    }

    pub fn save_all(&mut self) -> FlushReport {
        self.saves.flush_all()
    }

    /// Drop the pending entry without writing it.
    pub fn discard(&mut self, id: CanvasId) -> bool {
        self.saves.discard(id)
    }

    pub fn write_journal(&self, path: &Path) -> Result<(), EditorError> {
        Ok(self.saves.write_journal(path)?)
    }

    /// Restore pending entries written by a previous session.
    pub fn read_journal(&mut self, path: &Path) -> Result<usize, EditorError> {
        Ok(self.saves.read_journal(path)?)
    }
}

impl EditorCore<FileStore> {
    /// Open a PNG as a canvas that saves back to the same file.
    pub fn open_png(&mut self, path: &Path) -> Result<CanvasId, EditorError> {
        let canvas = io::load_png(path, self.settings.origin)?;
        let id = self.open_canvas(canvas);
        self.saves.store_mut().register(id, path);
        Ok(id)
    }

    /// Point a canvas at a new file and write its current pixels there.
    pub fn save_as(&mut self, id: CanvasId, path: &Path) -> Result<(), EditorError> {
        let canvas = self.canvases.get(&id).ok_or(EditorError::UnknownCanvas(id))?;
        self.saves.mark_dirty(id, SaveEntry::capture(canvas));
        self.saves.store_mut().register(id, path);
        if self.saves.flush(id) { Ok(()) } else { Err(EditorError::Unsaved(id)) }
    }
}
