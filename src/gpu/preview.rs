// ============================================================================
// GPU PREVIEW - compute-shader brush preview with committed/display textures
// ============================================================================

use bytemuck::{Pod, Zeroable};
use image::Rgba;
use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::{aligned_bytes_per_row, shaders};
use crate::brush::{BrushGeometry, LineSpan};
use crate::canvas::Canvas;
use crate::render::{PreviewBackend, PreviewLayer, RenderError};

/// Uniform block for `STROKE_SHADER`. Field order matches the WGSL struct.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct StrokeParams {
    pub prev_center: [f32; 2],
    pub curr_center: [f32; 2],
    pub square_offset: [f32; 2],
    pub radius: f32,
    pub radius_sq: f32,
    pub color: u32,
    pub mode: u32,
    pub width: u32,
    pub height: u32,
    pub line_x: i32,
    pub line_y: i32,
    pub line_err: i32,
    pub line_points: u32,
    pub line_dx: i32,
    pub line_dy: i32,
    pub line_sx: i32,
    pub line_sy: i32,
    pub box_min_x: u32,
    pub box_min_y: u32,
    pub box_max_x: u32,
    pub box_max_y: u32,
    pub clip_min_x: u32,
    pub clip_min_y: u32,
    pub clip_max_x: u32,
    pub clip_max_y: u32,
}

/// The shader walks in i32 and doubles the error term, so both deltas
/// must stay below this.
const SHADER_DELTA_LIMIT: i64 = 1 << 30;

/// Narrow a line span to the shader's integer width.
fn shader_line(span: &LineSpan) -> Result<[i32; 8], RenderError> {
    if span.dx >= SHADER_DELTA_LIMIT || -span.dy >= SHADER_DELTA_LIMIT {
        return Err(RenderError::LineTooLong);
    }
    let narrow = |v: i64| i32::try_from(v).map_err(|_| RenderError::LineTooLong);
    let points = span.steps.checked_add(1).and_then(|p| i32::try_from(p).ok()).ok_or(RenderError::LineTooLong)?;
    Ok([
        narrow(span.start.0)?,
        narrow(span.start.1)?,
        narrow(span.err)?,
        points,
        narrow(span.dx)?,
        narrow(span.dy)?,
        narrow(span.sx)?,
        narrow(span.sy)?,
    ])
}

impl StrokeParams {
    pub fn new(geometry: &BrushGeometry, color: Rgba<u8>, size: (u32, u32)) -> Result<Self, RenderError> {
        // A line that misses the clip walks zero points.
        let [line_x, line_y, line_err, line_points, line_dx, line_dy, line_sx, line_sy] = match &geometry.line {
            Some(span) => shader_line(span)?,
            None => [0, 0, 0, 0, 0, 0, 1, 1],
        };
        Ok(Self {
            prev_center: geometry.prev_center,
            curr_center: geometry.curr_center,
            square_offset: geometry.square_offset,
            radius: geometry.radius,
            radius_sq: geometry.radius_sq,
            color: u32::from_le_bytes(color.0),
            mode: geometry.kind.mode(),
            width: size.0,
            height: size.1,
            line_x,
            line_y,
            line_err,
            line_points: line_points as u32,
            line_dx,
            line_dy,
            line_sx,
            line_sy,
            box_min_x: geometry.bounds.min_x,
            box_min_y: geometry.bounds.min_y,
            box_max_x: geometry.bounds.max_x,
            box_max_y: geometry.bounds.max_y,
            clip_min_x: geometry.clip.min_x,
            clip_min_y: geometry.clip.min_y,
            clip_max_x: geometry.clip.max_x,
            clip_max_y: geometry.clip.max_y,
        })
    }
}

/// Base (committed) and display (committed + in-progress stroke) textures.
struct Surfaces {
    base: wgpu::Texture,
    display: wgpu::Texture,
    staging: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

pub struct GpuPreview {
    ctx: GpuContext,
    stroke_pipeline: wgpu::ComputePipeline,
    line_pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    params_buf: wgpu::Buffer,
    surfaces: Option<Surfaces>,
}

impl GpuPreview {
    /// Build the pipelines on `ctx`. Shader or pipeline validation errors
    /// (including backend translation failures) come back as
    /// `RenderError::Device`.
    pub fn new(ctx: GpuContext) -> Result<Self, RenderError> {
        let (stroke_pipeline, line_pipeline, bgl) = ctx.validated("stroke pipelines", |device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("stroke_shader"),
                source: wgpu::ShaderSource::Wgsl(shaders::STROKE_SHADER.into()),
            });

            // 0: base texture (sampled via textureLoad)
            // 1: display storage texture (write-only)
            // 2: uniform buffer (params)
            let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("stroke_bgl"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::Rgba8Unorm,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("stroke_pipeline_layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });

            let make_pipeline = |entry_point: &str, label: &str| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: Some(&layout),
                    module: &shader,
                    entry_point,
                    compilation_options: Default::default(),
                })
            };
            let stroke_pipeline = make_pipeline("cs_stroke", "stroke_pipeline");
            let line_pipeline = make_pipeline("cs_line", "line_pipeline");
            (stroke_pipeline, line_pipeline, bgl)
        })?;

        let params_buf = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("stroke_params"),
            contents: bytemuck::bytes_of(&StrokeParams::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Ok(Self {
            ctx,
            stroke_pipeline,
            line_pipeline,
            bgl,
            params_buf,
            surfaces: None,
        })
    }

    /// Initialise a GPU context and build the preview on it.
    pub fn try_new(preferred_gpu: &str) -> Result<Self, RenderError> {
        GpuContext::new(preferred_gpu).and_then(Self::new)
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    fn ensure_surfaces(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.ctx.check_size(width, height)?;
        let stale = self.surfaces.as_ref().is_none_or(|s| s.width != width || s.height != height);
        if stale {
            let device = &self.ctx.device;
            let size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
            let make_texture = |label: &str, usage: wgpu::TextureUsages| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage,
                    view_formats: &[],
                })
            };
            let base = make_texture(
                "preview_base",
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
            );
            let display = make_texture(
                "preview_display",
                wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
            );
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("preview_staging"),
                size: (aligned_bytes_per_row(width) * height) as u64,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let base_view = base.create_view(&wgpu::TextureViewDescriptor::default());
            let display_view = display.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("stroke_bg"),
                layout: &self.bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&base_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&display_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.params_buf.as_entire_binding(),
                    },
                ],
            });
            tracing::debug!("allocated {width}x{height} preview textures");
            self.surfaces = Some(Surfaces { base, display, staging, bind_group, width, height });
        }
        Ok(())
    }

    fn write_texture(&self, texture: &wgpu::Texture, data: &[u8], width: u32, height: u32) {
        self.ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
    }
}

impl PreviewBackend for GpuPreview {
    fn name(&self) -> &str {
        "gpu"
    }

    fn upload(&mut self, canvas: &Canvas) -> Result<(), RenderError> {
        let (width, height) = (canvas.width(), canvas.height());
        self.ensure_surfaces(width, height)?;
        let surfaces = self.surfaces.as_ref().ok_or(RenderError::NotUploaded)?;
        self.write_texture(&surfaces.base, canvas.as_raw(), width, height);
        self.write_texture(&surfaces.display, canvas.as_raw(), width, height);
        self.ctx.check()
    }

    fn rasterize(&mut self, geometry: &BrushGeometry, color: Rgba<u8>, layer: PreviewLayer) -> Result<(), RenderError> {
        let surfaces = self.surfaces.as_ref().ok_or(RenderError::NotUploaded)?;
        let (w, h) = (surfaces.width, surfaces.height);
        let params = StrokeParams::new(geometry, color, (w, h))?;
        self.ctx.queue.write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&params));

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("stroke_encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("stroke_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.stroke_pipeline);
            pass.set_bind_group(0, &surfaces.bind_group, &[]);
            pass.dispatch_workgroups(w.div_ceil(16), h.div_ceil(16), 1);
        }
        if params.mode == 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("line_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.line_pipeline);
            pass.set_bind_group(0, &surfaces.bind_group, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        if layer == PreviewLayer::Base {
            encoder.copy_texture_to_texture(
                surfaces.display.as_image_copy(),
                surfaces.base.as_image_copy(),
                wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 1 },
            );
        }
        self.ctx.submit(encoder)
    }

    fn read_back(&mut self, layer: PreviewLayer) -> Result<Vec<u8>, RenderError> {
        let surfaces = self.surfaces.as_ref().ok_or(RenderError::NotUploaded)?;
        let (w, h) = (surfaces.width, surfaces.height);
        let texture = match layer {
            PreviewLayer::Base => &surfaces.base,
            PreviewLayer::Display => &surfaces.display,
        };
        let bytes_per_row = aligned_bytes_per_row(w);

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("preview_readback"),
        });
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &surfaces.staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(h),
                },
            },
            wgpu::Extent3d { width: w, height: h, depth_or_array_layers: 1 },
        );
        self.ctx.submit(encoder)?;

        self.ctx.map_read(&surfaces.staging)?;
        let mapped = surfaces.staging.slice(..).get_mapped_range();
        let row = w as usize * 4;
        let mut out = Vec::with_capacity(row * h as usize);
        for y in 0..h as usize {
            let start = y * bytes_per_row as usize;
            out.extend_from_slice(&mapped[start..start + row]);
        }
        drop(mapped);
        surfaces.staging.unmap();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::{BrushShape, Stroke};
    use crate::canvas::PixelRect;

    #[test]
    fn test_params_layout_matches_wgsl() {
        // 28 four-byte scalars, a multiple of the 16-byte uniform alignment.
        assert_eq!(std::mem::size_of::<StrokeParams>(), 112);
    }

    #[test]
    fn test_params_from_geometry() {
        let stroke = Stroke::new((1, 2), (5, 2), 3, BrushShape::Square, Rgba([1, 2, 3, 4]));
        let geometry = BrushGeometry::new(&stroke, PixelRect::full(16, 16), (16, 16));
        let params = StrokeParams::new(&geometry, stroke.color, (16, 16)).unwrap();
        assert_eq!(params.mode, 2);
        assert_eq!(params.line_points, 0);
        assert_eq!(params.color.to_le_bytes(), [1, 2, 3, 4]);
        assert_eq!(params.prev_center, [1.5, 2.5]);
        assert_eq!((params.clip_max_x, params.clip_max_y), (16, 16));
    }

    #[test]
    fn test_params_carry_clipped_line() {
        let stroke = Stroke::new((-100_000, 3), (100_000, 7), 1, BrushShape::Circle, Rgba([9, 9, 9, 255]));
        let geometry = BrushGeometry::new(&stroke, PixelRect::full(32, 32), (32, 32));
        let params = StrokeParams::new(&geometry, stroke.color, (32, 32)).unwrap();
        assert_eq!(params.mode, 0);
        assert_eq!((params.line_x, params.line_y), (0, 5));
        assert_eq!(params.line_points, 32);
        assert_eq!((params.line_dx, params.line_dy, params.line_err), (200_000, -4, 199_996));

        let outside = Stroke::new((40, 40), (60, 60), 1, BrushShape::Circle, stroke.color);
        let geometry = BrushGeometry::new(&outside, PixelRect::full(32, 32), (32, 32));
        assert_eq!(StrokeParams::new(&geometry, stroke.color, (32, 32)).unwrap().line_points, 0);
    }

    #[test]
    fn test_params_reject_lines_beyond_shader_range() {
        let stroke = Stroke::new((i32::MIN, 0), (i32::MAX, 1), 1, BrushShape::Circle, Rgba([9, 9, 9, 255]));
        let geometry = BrushGeometry::new(&stroke, PixelRect::full(8, 8), (8, 8));
        assert!(matches!(StrokeParams::new(&geometry, stroke.color, (8, 8)), Err(RenderError::LineTooLong)));
    }

    #[test]
    fn test_gpu_matches_cpu_when_available() {
        let Ok(mut gpu) = GpuPreview::try_new("high performance") else {
            return;
        };
        let mut canvas = Canvas::new(40, 24).unwrap();
        gpu.upload(&canvas).unwrap();
        let strokes = [
            Stroke::new((2, 3), (30, 17), 1, BrushShape::Circle, Rgba([255, 0, 0, 255])),
            Stroke::new((-90_000, 1), (90_000, 20), 1, BrushShape::Circle, Rgba([255, 255, 0, 255])),
            Stroke::new((5, 5), (5, 5), 3, BrushShape::Circle, Rgba([0, 255, 0, 255])),
            Stroke::new((10, 4), (20, 4), 4, BrushShape::Square, Rgba([0, 0, 255, 128])),
        ];
        for stroke in &strokes {
            let geometry = BrushGeometry::new(stroke, canvas.clip(), (40, 24));
            let px = crate::brush::rasterize_geometry(&geometry, &crate::executor::Executor::Serial);
            canvas.write_pixels(&px, stroke.color);
            canvas.apply();
            gpu.rasterize(&geometry, stroke.color, PreviewLayer::Base).unwrap();
        }
        assert_eq!(gpu.read_back(PreviewLayer::Base).unwrap(), canvas.as_raw());
    }
}
