// ============================================================================
// GPU MODULE - compute-shader preview surface
// ============================================================================
//
// Architecture:
//   context.rs - wgpu Device, Queue, adapter init
//   shaders.rs - WGSL source (inline strings)
//   preview.rs - GpuPreview: base/display textures, stroke + line passes
// ============================================================================

pub mod context;
pub mod preview;
pub mod shaders;

pub use context::GpuContext;
pub use preview::{GpuPreview, StrokeParams};

/// Texture → buffer copies need `bytes_per_row` padded to 256 bytes.
pub fn aligned_bytes_per_row(width: u32) -> u32 {
    (width * 4).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}
