// ============================================================================
// GPU CONTEXT - headless wgpu device for the preview surface
// ============================================================================

use std::sync::{Arc, Mutex};

use crate::render::RenderError;

/// Map the `preferred_gpu` setting onto a wgpu power preference.
pub fn power_preference(preferred_gpu: &str) -> wgpu::PowerPreference {
    match preferred_gpu.trim().to_lowercase().as_str() {
        "low power" | "integrated" => wgpu::PowerPreference::LowPower,
        _ => wgpu::PowerPreference::HighPerformance,
    }
}

/// Device and queue owned by one preview. No surface is ever attached;
/// everything runs as compute passes and buffer copies.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
    pub max_texture_dim: u32,
    /// First error raised outside an error scope, reported by `check`.
    device_error: Arc<Mutex<Option<String>>>,
}

impl GpuContext {
    /// Hardware adapter first, then the software one.
    pub fn new(preferred_gpu: &str) -> Result<Self, RenderError> {
        let power = power_preference(preferred_gpu);
        match pollster::block_on(Self::request(power, false)) {
            Ok(ctx) => Ok(ctx),
            Err(e) => {
                tracing::warn!("hardware GPU unavailable ({e}), trying software adapter");
                pollster::block_on(Self::request(power, true))
            }
        }
    }

    async fn request(power: wgpu::PowerPreference, software: bool) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power,
                compatible_surface: None,
                force_fallback_adapter: software,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let info = adapter.get_info();
        let supported = adapter.limits();
        // Canvases never exceed 2048, which downlevel limits already cover.
        let required_limits = wgpu::Limits {
            max_texture_dimension_2d: supported.max_texture_dimension_2d,
            ..wgpu::Limits::downlevel_defaults()
        };
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("spritecore preview"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                },
                None,
            )
            .await
            .map_err(|e| {
                tracing::warn!("device request on {} failed: {e}", info.name);
                RenderError::NoAdapter
            })?;

        // The default handler panics; record the error and let the caller
        // fall back instead.
        let device_error = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&device_error);
        device.on_uncaptured_error(Box::new(move |e: wgpu::Error| {
            tracing::error!("wgpu error: {e}");
            if let Ok(mut slot) = sink.lock() {
                slot.get_or_insert_with(|| e.to_string());
            }
        }));

        tracing::info!("GPU preview on {} ({:?}, software: {software})", info.name, info.backend);
        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
            max_texture_dim: supported.max_texture_dimension_2d,
            device_error,
        })
    }

    /// Run `build` inside a validation error scope.
    pub fn validated<T>(&self, what: &str, build: impl FnOnce(&wgpu::Device) -> T) -> Result<T, RenderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = build(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(value),
            Some(e) => Err(RenderError::Device(format!("{what}: {e}"))),
        }
    }

    /// Fail if the device reported an error since creation.
    pub fn check(&self) -> Result<(), RenderError> {
        match self.device_error.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(e) => Err(RenderError::Device(e.clone())),
                None => Ok(()),
            },
            Err(_) => Err(RenderError::Device("error state poisoned".into())),
        }
    }

    pub fn check_size(&self, width: u32, height: u32) -> Result<(), RenderError> {
        if width > self.max_texture_dim || height > self.max_texture_dim {
            return Err(RenderError::TooLarge { width, height, max: self.max_texture_dim });
        }
        Ok(())
    }

    pub fn submit(&self, encoder: wgpu::CommandEncoder) -> Result<(), RenderError> {
        self.queue.submit(Some(encoder.finish()));
        self.check()
    }

    /// Map `buffer` for reading and block until the mapping completes.
    pub fn map_read(&self, buffer: &wgpu::Buffer) -> Result<(), RenderError> {
        let (tx, rx) = std::sync::mpsc::channel();
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RenderError::Readback(format!("map error: {e:?}"))),
            Err(e) => Err(RenderError::Readback(format!("channel error: {e:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_preference() {
        assert_eq!(power_preference("Low Power"), wgpu::PowerPreference::LowPower);
        assert_eq!(power_preference("integrated"), wgpu::PowerPreference::LowPower);
        assert_eq!(power_preference("high performance"), wgpu::PowerPreference::HighPerformance);
        assert_eq!(power_preference("whatever"), wgpu::PowerPreference::HighPerformance);
    }
}
