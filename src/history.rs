use image::RgbaImage;
use std::collections::VecDeque;
use std::fmt;

use crate::canvas::{Canvas, CanvasError, CanvasId, PixelRect};

/// Default maximum number of records kept.
pub const DEFAULT_MAX_RECORDS: usize = 50;
/// Default snapshot memory cap.
pub const DEFAULT_MAX_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum UndoError {
    #[error("canvas {0} is not open")]
    UnknownCanvas(CanvasId),
    #[error("record for group {0} has no after-snapshot yet")]
    Unsealed(GroupId),
    #[error("no record for group {0}")]
    UnknownGroup(GroupId),
    #[error("snapshot kind does not match record for group {0}")]
    KindMismatch(GroupId),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// Monotonic gesture id. Edits sharing an id collapse into one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GroupId(pub u64);

impl GroupId {
    pub fn next(self) -> GroupId {
        GroupId(self.0 + 1)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// A rectangular patch of RGBA8 pixel data.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelPatch {
    pub rect: PixelRect,
    pub pixels: Vec<u8>,
}

impl PixelPatch {
    /// Capture `rect` (clamped to the canvas).
    pub fn capture(canvas: &Canvas, rect: PixelRect) -> Self {
        let (rect, pixels) = canvas.snapshot_rect(rect);
        Self { rect, pixels }
    }

    pub fn full(canvas: &Canvas) -> Self {
        Self::capture(canvas, canvas.bounds())
    }

    /// Sub-patch covering `rect ∩ self.rect`.
    pub fn crop(&self, rect: PixelRect) -> PixelPatch {
        let rect = rect.intersect(&self.rect);
        let src_stride = self.rect.width() as usize * 4;
        let row_bytes = rect.width() as usize * 4;
        let mut pixels = Vec::with_capacity(rect.area() * 4);
        for y in rect.min_y..rect.max_y {
            let start = (y - self.rect.min_y) as usize * src_stride + (rect.min_x - self.rect.min_x) as usize * 4;
            pixels.extend_from_slice(&self.pixels[start..start + row_bytes]);
        }
        PixelPatch { rect, pixels }
    }

    pub fn apply(&self, canvas: &mut Canvas) -> Result<(), CanvasError> {
        canvas.restore_rect(self.rect, &self.pixels)
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.len() + std::mem::size_of::<Self>()
    }
}

/// A whole canvas image, for operations that change dimensions.
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl CanvasImage {
    pub fn capture(canvas: &Canvas) -> Self {
        Self {
            width: canvas.width(),
            height: canvas.height(),
            pixels: canvas.as_raw().to_vec(),
        }
    }

    pub fn apply(&self, canvas: &mut Canvas) -> Result<(), CanvasError> {
        let expected = self.width as usize * self.height as usize * 4;
        let image = RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or(CanvasError::BufferSize { expected, actual: self.pixels.len() })?;
        canvas.replace_image(image)
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.len() + std::mem::size_of::<Self>()
    }
}

/// The deferred after-state handed to [`UndoLog::seal`].
#[derive(Clone, Debug)]
pub enum Snapshot {
    Patch(PixelPatch),
    Image(CanvasImage),
}

/// Where a replayed record writes its pixels.
pub trait UndoTarget {
    fn restore_patch(&mut self, canvas: CanvasId, patch: &PixelPatch) -> Result<(), UndoError>;
    fn restore_image(&mut self, canvas: CanvasId, image: &CanvasImage) -> Result<(), UndoError>;
}

impl UndoTarget for Canvas {
    fn restore_patch(&mut self, canvas: CanvasId, patch: &PixelPatch) -> Result<(), UndoError> {
        if canvas != self.id() {
            return Err(UndoError::UnknownCanvas(canvas));
        }
        patch.apply(self)?;
        self.apply();
        Ok(())
    }

    fn restore_image(&mut self, canvas: CanvasId, image: &CanvasImage) -> Result<(), UndoError> {
        if canvas != self.id() {
            return Err(UndoError::UnknownCanvas(canvas));
        }
        image.apply(self)?;
        Ok(())
    }
}

// ============================================================================
// UNDO RECORD
// ============================================================================

#[derive(Clone, Debug)]
pub enum RecordKind {
    /// Pixel edit. `before` starts as a full-canvas capture and is cropped to
    /// the touched region when the record is sealed.
    Paint { before: PixelPatch, after: Option<PixelPatch> },
    /// Dimension change.
    Resize { before: CanvasImage, after: Option<CanvasImage> },
}

#[derive(Clone, Debug)]
pub struct UndoRecord {
    pub group: GroupId,
    pub canvas: CanvasId,
    pub label: String,
    pub kind: RecordKind,
}

impl UndoRecord {
    /// Open a paint record from the canvas state before the first write.
    pub fn paint(canvas: &Canvas, label: impl Into<String>) -> Self {
        Self {
            group: GroupId::default(),
            canvas: canvas.id(),
            label: label.into(),
            kind: RecordKind::Paint { before: PixelPatch::full(canvas), after: None },
        }
    }

    pub fn resize(canvas: &Canvas, label: impl Into<String>) -> Self {
        Self {
            group: GroupId::default(),
            canvas: canvas.id(),
            label: label.into(),
            kind: RecordKind::Resize { before: CanvasImage::capture(canvas), after: None },
        }
    }

    pub fn is_sealed(&self) -> bool {
        match &self.kind {
            RecordKind::Paint { after, .. } => after.is_some(),
            RecordKind::Resize { after, .. } => after.is_some(),
        }
    }

    pub fn seal(&mut self, snapshot: Snapshot) -> Result<(), UndoError> {
        match (&mut self.kind, snapshot) {
            (RecordKind::Paint { before, after }, Snapshot::Patch(patch)) => {
                if before.rect != patch.rect {
                    *before = before.crop(patch.rect);
                }
                *after = Some(patch);
                Ok(())
            }
            (RecordKind::Resize { after, .. }, Snapshot::Image(image)) => {
                *after = Some(image);
                Ok(())
            }
            _ => Err(UndoError::KindMismatch(self.group)),
        }
    }

    pub fn memory_size(&self) -> usize {
        let body = match &self.kind {
            RecordKind::Paint { before, after } => {
                before.memory_size() + after.as_ref().map_or(0, PixelPatch::memory_size)
            }
            RecordKind::Resize { before, after } => {
                before.memory_size() + after.as_ref().map_or(0, CanvasImage::memory_size)
            }
        };
        body + self.label.len() + std::mem::size_of::<Self>()
    }

    pub fn replay(&self, direction: Direction, target: &mut dyn UndoTarget) -> Result<(), UndoError> {
        match (&self.kind, direction) {
            (RecordKind::Paint { before, .. }, Direction::Undo) => target.restore_patch(self.canvas, before),
            (RecordKind::Paint { after: Some(after), .. }, Direction::Redo) => {
                target.restore_patch(self.canvas, after)
            }
            (RecordKind::Resize { before, .. }, Direction::Undo) => target.restore_image(self.canvas, before),
            (RecordKind::Resize { after: Some(after), .. }, Direction::Redo) => {
                target.restore_image(self.canvas, after)
            }
            (_, Direction::Redo) => Err(UndoError::Unsealed(self.group)),
        }
    }
}

// ============================================================================
// UNDO LOG
// ============================================================================

/// Bounded, grouped undo history.
///
/// `index` is the last applied record; `-1` means every record is undone.
pub struct UndoLog {
    records: VecDeque<UndoRecord>,
    index: isize,
    previous_group: Option<GroupId>,
    max_records: usize,
    max_bytes: usize,
    total_bytes: usize,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS, DEFAULT_MAX_BYTES)
    }
}

impl UndoLog {
    pub fn new(max_records: usize, max_bytes: usize) -> Self {
        Self {
            records: VecDeque::new(),
            index: -1,
            previous_group: None,
            max_records: max_records.max(1),
            max_bytes,
            total_bytes: 0,
        }
    }

    /// Record an edit for `group`. Discards the redo branch. Returns whether
    /// a new record was appended; a repeat of the previous group is absorbed
    /// into the record already open for it.
    pub fn submit(&mut self, mut record: UndoRecord, group: GroupId) -> bool {
        let keep = (self.index + 1) as usize;
        while self.records.len() > keep {
            if let Some(dropped) = self.records.pop_back() {
                self.total_bytes = self.total_bytes.saturating_sub(dropped.memory_size());
            }
        }

        let appended = self.previous_group != Some(group);
        if appended {
            record.group = group;
            self.total_bytes += record.memory_size();
            self.records.push_back(record);
            self.index = self.records.len() as isize - 1;
        }
        self.previous_group = Some(group);

        self.enforce_caps();
        appended
    }

    /// Attach the after-snapshot to the record of `group`.
    pub fn seal(&mut self, group: GroupId, after: Snapshot) -> Result<(), UndoError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.group == group)
            .ok_or(UndoError::UnknownGroup(group))?;
        let old = record.memory_size();
        record.seal(after)?;
        let new = record.memory_size();
        self.total_bytes = self.total_bytes.saturating_sub(old) + new;
        self.enforce_caps();
        Ok(())
    }

    fn enforce_caps(&mut self) {
        while self.total_bytes > self.max_bytes || self.records.len() > self.max_records {
            let Some(evicted) = self.records.pop_front() else {
                break;
            };
            self.total_bytes = self.total_bytes.saturating_sub(evicted.memory_size());
            self.index = (self.index - 1).max(-1);
            tracing::debug!(
                "evicted undo record {} ({}), {} records / {} bytes remain",
                evicted.group,
                evicted.label,
                self.records.len(),
                self.total_bytes
            );
        }
    }

    /// Undo back to (and including) the record of `group`.
    pub fn undo(&mut self, group: GroupId, target: &mut dyn UndoTarget) -> usize {
        self.jump(group, Direction::Undo, target)
    }

    /// Redo forward to (and including) the record of `group`.
    pub fn redo(&mut self, group: GroupId, target: &mut dyn UndoTarget) -> usize {
        self.jump(group, Direction::Redo, target)
    }

    fn target_index(&self, group: GroupId, direction: Direction) -> Option<isize> {
        let (first, last) = (self.records.front()?.group, self.records.back()?.group);
        match self.records.iter().position(|r| r.group == group) {
            Some(found) => Some(match direction {
                Direction::Redo => found as isize,
                Direction::Undo => found as isize - 1,
            }),
            None if group < first => Some(-1),
            None if group > last => Some(self.records.len() as isize - 1),
            // Untracked group inside the tracked range: undo steps back one
            // record from the current index, redo stays put.
            None => Some(match direction {
                Direction::Redo => self.index,
                Direction::Undo => (self.index - 1).max(-1),
            }),
        }
    }

    /// Step one record at a time towards the target, dispatching each.
    /// Returns the number of records replayed successfully.
    fn jump(&mut self, group: GroupId, direction: Direction, target: &mut dyn UndoTarget) -> usize {
        let Some(goal) = self.target_index(group, direction) else {
            return 0;
        };

        let mut replayed = 0;
        while self.index != goal {
            let step = if goal > self.index {
                self.index += 1;
                Direction::Redo
            } else {
                Direction::Undo
            };

            let record = &self.records[self.index as usize];
            match record.replay(step, target) {
                Ok(()) => replayed += 1,
                Err(e) => tracing::error!("failed to {step:?} '{}' ({}): {e}", record.label, record.group),
            }

            if step == Direction::Undo {
                self.index -= 1;
            }
        }
        replayed
    }

    /// Undo the most recent applied record. Returns its label.
    pub fn undo_step(&mut self, target: &mut dyn UndoTarget) -> Option<String> {
        let record = self.records.get(usize::try_from(self.index).ok()?)?;
        let (group, label) = (record.group, record.label.clone());
        self.undo(group, target);
        Some(label)
    }

    /// Redo the next undone record. Returns its label.
    pub fn redo_step(&mut self, target: &mut dyn UndoTarget) -> Option<String> {
        let record = self.records.get((self.index + 1) as usize)?;
        let (group, label) = (record.group, record.label.clone());
        self.redo(group, target);
        Some(label)
    }

    pub fn can_undo(&self) -> bool {
        self.index >= 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.records.len() as isize
    }

    pub fn index(&self) -> isize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn groups(&self) -> Vec<GroupId> {
        self.records.iter().map(|r| r.group).collect()
    }

    /// Labels oldest first.
    pub fn labels(&self) -> Vec<String> {
        self.records.iter().map(|r| r.label.clone()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_bytes
    }

    /// Drop records of a canvas that is no longer editable.
    pub fn forget_canvas(&mut self, canvas: CanvasId) {
        let mut i = 0;
        while i < self.records.len() {
            if self.records[i].canvas == canvas {
                if let Some(removed) = self.records.remove(i) {
                    self.total_bytes = self.total_bytes.saturating_sub(removed.memory_size());
                }
                if (i as isize) <= self.index {
                    self.index -= 1;
                }
            } else {
                i += 1;
            }
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.index = -1;
        self.previous_group = None;
        self.total_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// Paint `color` at `at` as gesture `group`, sealed.
    fn paint(log: &mut UndoLog, canvas: &mut Canvas, group: u64, at: (i32, i32), color: Rgba<u8>) {
        log.submit(UndoRecord::paint(canvas, "Paint"), GroupId(group));
        canvas.write_pixel(at.0, at.1, color);
        let rect = canvas.apply().unwrap_or(PixelRect::pixel(at.0 as u32, at.1 as u32));
        log.seal(GroupId(group), Snapshot::Patch(PixelPatch::capture(canvas, rect))).unwrap();
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut canvas = Canvas::new(4, 4).unwrap();
        let mut log = UndoLog::default();
        let blank = canvas.as_raw().to_vec();

        paint(&mut log, &mut canvas, 1, (1, 1), RED);
        let painted = canvas.as_raw().to_vec();

        assert_eq!(log.undo(GroupId(1), &mut canvas), 1);
        assert_eq!(canvas.as_raw(), &blank[..]);
        assert_eq!(log.index(), -1);

        assert_eq!(log.redo(GroupId(1), &mut canvas), 1);
        assert_eq!(canvas.as_raw(), &painted[..]);
        assert_eq!(log.index(), 0);
    }

    #[test]
    fn test_seal_crops_before_patch() {
        let mut canvas = Canvas::new(16, 16).unwrap();
        let mut log = UndoLog::default();
        let open_bytes = {
            log.submit(UndoRecord::paint(&canvas, "Paint"), GroupId(1));
            log.memory_usage()
        };
        canvas.write_pixel(3, 3, RED);
        let rect = canvas.apply().unwrap();
        log.seal(GroupId(1), Snapshot::Patch(PixelPatch::capture(&canvas, rect))).unwrap();
        assert!(log.memory_usage() < open_bytes);
    }

    #[test]
    fn test_same_group_coalesces() {
        let canvas = Canvas::new(2, 2).unwrap();
        let mut log = UndoLog::default();
        assert!(log.submit(UndoRecord::paint(&canvas, "a"), GroupId(1)));
        assert!(!log.submit(UndoRecord::paint(&canvas, "b"), GroupId(1)));
        assert!(log.submit(UndoRecord::paint(&canvas, "c"), GroupId(2)));
        assert_eq!(log.labels(), vec!["a", "c"]);
    }

    #[test]
    fn test_submit_discards_redo_branch() {
        let mut canvas = Canvas::new(4, 4).unwrap();
        let mut log = UndoLog::default();
        for g in 1..=3 {
            paint(&mut log, &mut canvas, g, (g as i32, 0), RED);
        }
        log.undo(GroupId(2), &mut canvas);
        assert_eq!(log.index(), 0);
        paint(&mut log, &mut canvas, 4, (0, 3), BLUE);
        assert_eq!(log.groups(), vec![GroupId(1), GroupId(4)]);
        assert!(!log.can_redo());
    }

    #[test]
    fn test_count_cap_evicts_oldest() {
        let canvas = Canvas::new(2, 2).unwrap();
        let mut log = UndoLog::new(50, DEFAULT_MAX_BYTES);
        for g in 0..60 {
            log.submit(UndoRecord::paint(&canvas, "Paint"), GroupId(g));
            assert!(log.len() <= 50);
        }
        assert_eq!(log.len(), 50);
        assert_eq!(log.groups()[0], GroupId(10));
        assert_eq!(log.index(), 49);
    }

    #[test]
    fn test_byte_cap_evicts_oldest() {
        let canvas = Canvas::new(32, 32).unwrap();
        let one = UndoRecord::paint(&canvas, "Paint").memory_size();
        let mut log = UndoLog::new(100, one * 3);
        for g in 0..10 {
            log.submit(UndoRecord::paint(&canvas, "Paint"), GroupId(g));
            assert!(log.memory_usage() <= one * 3);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.index(), 2);
    }

    #[test]
    fn test_submit_after_full_undo_starts_fresh() {
        let canvas = Canvas::new(2, 2).unwrap();
        let mut log = UndoLog::new(2, DEFAULT_MAX_BYTES);
        let mut target = canvas.clone();
        log.submit(UndoRecord::paint(&canvas, "a"), GroupId(1));
        log.submit(UndoRecord::paint(&canvas, "b"), GroupId(2));
        log.undo(GroupId(1), &mut target);
        assert_eq!(log.index(), -1);
        // Submit truncates everything, so only the new record remains.
        log.submit(UndoRecord::paint(&canvas, "c"), GroupId(3));
        assert_eq!(log.index(), 0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_untracked_groups_clamp() {
        let mut canvas = Canvas::new(4, 4).unwrap();
        let mut log = UndoLog::default();
        for g in [10, 20, 30] {
            paint(&mut log, &mut canvas, g, ((g / 10) as i32, 0), RED);
        }
        assert_eq!(log.undo(GroupId(1), &mut canvas), 3);
        assert_eq!(log.index(), -1);
        assert_eq!(log.redo(GroupId(99), &mut canvas), 3);
        assert_eq!(log.index(), 2);
        assert_eq!(log.redo(GroupId(15), &mut canvas), 0);
        assert_eq!(log.index(), 2);
    }

    #[test]
    fn test_untracked_group_in_range_steps_back_once() {
        let mut canvas = Canvas::new(4, 4).unwrap();
        let mut log = UndoLog::default();
        for g in [10, 20, 30] {
            paint(&mut log, &mut canvas, g, ((g / 10) as i32, 0), RED);
        }
        assert_eq!(log.undo(GroupId(15), &mut canvas), 1);
        assert_eq!(log.index(), 1);
        assert_eq!(canvas.read_pixel(3, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(canvas.read_pixel(2, 0), RED);
        assert_eq!(log.undo(GroupId(25), &mut canvas), 1);
        assert_eq!(log.index(), 0);
        assert_eq!(log.redo(GroupId(25), &mut canvas), 0);
        assert_eq!(log.index(), 0);
    }

    #[test]
    fn test_multi_step_jump_restores_intermediate_state() {
        let mut canvas = Canvas::new(4, 4).unwrap();
        let mut log = UndoLog::default();
        paint(&mut log, &mut canvas, 1, (0, 0), RED);
        let after_first = canvas.as_raw().to_vec();
        paint(&mut log, &mut canvas, 2, (1, 0), RED);
        paint(&mut log, &mut canvas, 3, (2, 0), BLUE);

        assert_eq!(log.undo(GroupId(2), &mut canvas), 2);
        assert_eq!(canvas.as_raw(), &after_first[..]);
        assert_eq!(log.undo_step(&mut canvas).as_deref(), Some("Paint"));
        assert!(!log.can_undo());
        assert_eq!(log.redo_step(&mut canvas).as_deref(), Some("Paint"));
        assert_eq!(canvas.as_raw(), &after_first[..]);
    }

    struct FlakyTarget {
        fail_on: CanvasId,
        applied: usize,
    }

    impl UndoTarget for FlakyTarget {
        fn restore_patch(&mut self, canvas: CanvasId, _patch: &PixelPatch) -> Result<(), UndoError> {
            if canvas == self.fail_on {
                return Err(UndoError::UnknownCanvas(canvas));
            }
            self.applied += 1;
            Ok(())
        }

        fn restore_image(&mut self, canvas: CanvasId, _image: &CanvasImage) -> Result<(), UndoError> {
            Err(UndoError::UnknownCanvas(canvas))
        }
    }

    #[test]
    fn test_failed_dispatch_does_not_stop_traversal() {
        let good = Canvas::new(2, 2).unwrap();
        let bad = Canvas::new(2, 2).unwrap();
        let mut log = UndoLog::default();
        log.submit(UndoRecord::paint(&good, "a"), GroupId(1));
        log.submit(UndoRecord::paint(&bad, "b"), GroupId(2));
        log.submit(UndoRecord::paint(&good, "c"), GroupId(3));

        let mut target = FlakyTarget { fail_on: bad.id(), applied: 0 };
        assert_eq!(log.undo(GroupId(1), &mut target), 2);
        assert_eq!(target.applied, 2);
        assert_eq!(log.index(), -1);
    }

    #[test]
    fn test_unsealed_record_cannot_redo() {
        let canvas = Canvas::new(2, 2).unwrap();
        let record = UndoRecord::paint(&canvas, "Paint");
        let mut target = canvas.clone();
        assert!(matches!(record.replay(Direction::Redo, &mut target), Err(UndoError::Unsealed(_))));
        assert!(record.replay(Direction::Undo, &mut target).is_ok());
    }

    #[test]
    fn test_resize_round_trip() {
        let mut canvas = Canvas::new(4, 4).unwrap();
        canvas.write_pixel(0, 0, RED);
        canvas.apply();
        let mut log = UndoLog::default();
        log.submit(UndoRecord::resize(&canvas, "Resize"), GroupId(1));
        canvas.resize(8, 2).unwrap();
        log.seal(GroupId(1), Snapshot::Image(CanvasImage::capture(&canvas))).unwrap();
        assert!(log.seal(GroupId(1), Snapshot::Patch(PixelPatch::full(&canvas))).is_err());

        log.undo_step(&mut canvas);
        assert_eq!((canvas.width(), canvas.height()), (4, 4));
        log.redo_step(&mut canvas);
        assert_eq!((canvas.width(), canvas.height()), (8, 2));
        assert_eq!(canvas.read_pixel(0, 0), RED);
    }

    #[test]
    fn test_forget_canvas_keeps_index_valid() {
        let a = Canvas::new(2, 2).unwrap();
        let b = Canvas::new(2, 2).unwrap();
        let mut log = UndoLog::default();
        log.submit(UndoRecord::paint(&a, "a"), GroupId(1));
        log.submit(UndoRecord::paint(&b, "b"), GroupId(2));
        log.submit(UndoRecord::paint(&a, "c"), GroupId(3));
        log.forget_canvas(a.id());
        assert_eq!(log.labels(), vec!["b"]);
        assert_eq!(log.index(), 0);
        log.clear();
        assert_eq!(log.memory_usage(), 0);
        assert_eq!(log.index(), -1);
    }
}
