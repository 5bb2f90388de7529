//! Pixel-level editing engine for sprite tools: brush rasterization, flood
//! fill, a CPU buffer mirrored by a (GPU) preview surface, grouped undo and
//! deferred saving.

pub mod brush;
pub mod canvas;
pub mod cli;
pub mod executor;
pub mod fill;
pub mod gpu;
pub mod history;
pub mod io;
pub mod logger;
pub mod render;
pub mod save;
pub mod session;
pub mod settings;

pub use brush::{BrushGeometry, BrushShape, LineSpan, Stroke, rasterize_stroke};
pub use canvas::{Canvas, CanvasError, CanvasId, Origin, PixelRect};
pub use executor::Executor;
pub use fill::{Connectivity, FillRequest, fill};
pub use history::{GroupId, UndoError, UndoLog, UndoRecord};
pub use render::{DualPathRenderer, PreviewBackend, RenderError};
pub use save::{BackingStore, FileStore, MemoryStore, SaveEntry, SaveError, SaveTracker};
pub use session::{EditorCore, EditorError};
pub use settings::EngineSettings;
