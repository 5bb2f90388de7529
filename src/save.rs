//! Deferred saving: one pending snapshot per canvas, written on flush.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::canvas::{Canvas, CanvasId, Origin};
use crate::io::{self, CodecError};

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("no save target registered for canvas {0}")]
    NoTarget(CanvasId),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("journal {path}: {source}")]
    Journal {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("{target} rejected the write")]
    Rejected { target: String },
}

/// Latest unsaved pixels of one canvas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveEntry {
    pub width: u32,
    pub height: u32,
    pub origin: Origin,
    pub pixels: Vec<u8>,
}

impl SaveEntry {
    pub fn capture(canvas: &Canvas) -> Self {
        Self {
            width: canvas.width(),
            height: canvas.height(),
            origin: canvas.origin(),
            pixels: canvas.as_raw().to_vec(),
        }
    }
}

// ============================================================================
// BACKING STORES
// ============================================================================

/// Persistent destination for flushed entries.
pub trait BackingStore {
    /// Human-readable target (usually a path) for log messages.
    fn describe(&self, canvas: CanvasId) -> String;
    fn write(&mut self, canvas: CanvasId, entry: &SaveEntry) -> Result<(), SaveError>;
    /// Called when a canvas is discarded or closed.
    fn forget(&mut self, _canvas: CanvasId) {}
}

/// Writes each canvas to a registered PNG path.
#[derive(Debug, Default)]
pub struct FileStore {
    paths: HashMap<CanvasId, PathBuf>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, canvas: CanvasId, path: impl Into<PathBuf>) {
        self.paths.insert(canvas, path.into());
    }

    pub fn path(&self, canvas: CanvasId) -> Option<&Path> {
        self.paths.get(&canvas).map(PathBuf::as_path)
    }
}

impl BackingStore for FileStore {
    fn describe(&self, canvas: CanvasId) -> String {
        match self.paths.get(&canvas) {
            Some(path) => path.display().to_string(),
            None => format!("<unregistered canvas {canvas}>"),
        }
    }

    fn write(&mut self, canvas: CanvasId, entry: &SaveEntry) -> Result<(), SaveError> {
        let path = self.paths.get(&canvas).ok_or(SaveError::NoTarget(canvas))?;
        io::write_png(path, entry.width, entry.height, entry.origin, &entry.pixels)
            .map_err(|source| SaveError::Write { path: path.clone(), source })
    }

    fn forget(&mut self, canvas: CanvasId) {
        self.paths.remove(&canvas);
    }
}

/// Keeps flushed entries in memory. Individual canvases can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: HashMap<CanvasId, SaveEntry>,
    failing: HashSet<CanvasId>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, canvas: CanvasId) -> Option<&SaveEntry> {
        self.saved.get(&canvas)
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn set_failing(&mut self, canvas: CanvasId, failing: bool) {
        if failing {
            self.failing.insert(canvas);
        } else {
            self.failing.remove(&canvas);
        }
    }
}

impl BackingStore for MemoryStore {
    fn describe(&self, canvas: CanvasId) -> String {
        format!("memory://{canvas}")
    }

    fn write(&mut self, canvas: CanvasId, entry: &SaveEntry) -> Result<(), SaveError> {
        if self.failing.contains(&canvas) {
            return Err(SaveError::Rejected { target: self.describe(canvas) });
        }
        self.saved.insert(canvas, entry.clone());
        self.writes += 1;
        Ok(())
    }
}

// ============================================================================
// SAVE TRACKER
// ============================================================================

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub written: Vec<CanvasId>,
    pub failed: Vec<CanvasId>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Dirty-canvas registry. A canvas is dirty while it has a pending entry.
pub struct SaveTracker<S: BackingStore> {
    pending: HashMap<CanvasId, SaveEntry>,
    store: S,
}

impl<S: BackingStore> SaveTracker<S> {
    pub fn new(store: S) -> Self {
        Self { pending: HashMap::new(), store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Last write wins.
    pub fn mark_dirty(&mut self, canvas: CanvasId, entry: SaveEntry) {
        self.pending.insert(canvas, entry);
    }

    pub fn is_dirty(&self, canvas: CanvasId) -> bool {
        self.pending.contains_key(&canvas)
    }

    pub fn pending(&self, canvas: CanvasId) -> Option<&SaveEntry> {
        self.pending.get(&canvas)
    }

    pub fn dirty_canvases(&self) -> Vec<CanvasId> {
        let mut ids: Vec<_> = self.pending.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Write the pending entry of `canvas`, if any. On failure the entry is
    /// kept for a later retry. Returns `true` when nothing is left pending.
    pub fn flush(&mut self, canvas: CanvasId) -> bool {
        let Some(entry) = self.pending.get(&canvas) else {
            return true;
        };
        match self.store.write(canvas, entry) {
            Ok(()) => {
                self.pending.remove(&canvas);
                tracing::debug!("saved {}", self.store.describe(canvas));
                true
            }
            Err(e) => {
                tracing::error!("failed to save {}: {e}", self.store.describe(canvas));
                false
            }
        }
    }

    pub fn flush_all(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        for canvas in self.dirty_canvases() {
            if self.flush(canvas) {
                report.written.push(canvas);
            } else {
                report.failed.push(canvas);
            }
        }
        if !report.written.is_empty() {
            tracing::info!("flushed {} canvas(es), {} failed", report.written.len(), report.failed.len());
        }
        report
    }

    /// Drop the pending entry without writing it.
    pub fn discard(&mut self, canvas: CanvasId) -> bool {
        let had = self.pending.remove(&canvas).is_some();
        self.store.forget(canvas);
        had
    }

    /// Persist all pending entries so they survive a host restart.
    pub fn write_journal(&self, path: &Path) -> Result<(), SaveError> {
        let mut entries: Vec<(CanvasId, &SaveEntry)> = self.pending.iter().map(|(id, e)| (*id, e)).collect();
        entries.sort_by_key(|(id, _)| *id);
        io::write_journal(path, &entries)
            .map_err(|source| SaveError::Journal { path: path.to_path_buf(), source })
    }

    /// Merge a journal back in. Entries already pending in memory are newer
    /// and win. Returns how many entries were restored.
    pub fn read_journal(&mut self, path: &Path) -> Result<usize, SaveError> {
        let entries: Vec<(CanvasId, SaveEntry)> = io::read_journal(path)
            .map_err(|source| SaveError::Journal { path: path.to_path_buf(), source })?;
        let mut restored = 0;
        for (canvas, entry) in entries {
            if !self.pending.contains_key(&canvas) {
                self.pending.insert(canvas, entry);
                restored += 1;
            }
        }
        if restored > 0 {
            tracing::info!("restored {restored} unsaved canvas(es) from {}", path.display());
        }
        Ok(restored)
    }
}
