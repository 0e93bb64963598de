//! GPU execution — device initialization, shader compilation, dispatch.
//!
//! Uses wgpu for cross-platform compute (Metal, Vulkan, DX12). The device
//! is the pipeline's front door: [`GpuDevice::for_each`] takes a kernel
//! descriptor and a grid, runs inspection, consults the shader cache,
//! compiles on a miss, and dispatches synchronously.

pub mod buffer;
pub mod dispatch;

pub use buffer::{Element, GpuBuffer};
pub use dispatch::GridShape;

use crate::cache::{CompiledShader, ShaderCache};
use crate::closure::{inspect, KernelDescriptor, ENTRY_NAME};
use crate::error::KernelError;
use crate::wgsl::ShaderProgram;

/// A wgpu device/queue pair.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuDevice {
    /// Try to acquire the default high-performance adapter.
    /// Returns None if no GPU adapter is available.
    pub fn try_default() -> Option<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("riptide-gpu"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .ok()?;
        Some(Self { device, queue })
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(crate) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Compile a rendered program into a device pipeline. A validation
    /// error surfaces as [`KernelError::ShaderCompilation`] carrying the
    /// generated source.
    pub fn compile(&self, program: ShaderProgram) -> Result<CompiledShader, KernelError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("riptide_kernel"),
                source: wgpu::ShaderSource::Wgsl(program.source.as_str().into()),
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("riptide_pipeline"),
                layout: None,
                module: &module,
                entry_point: Some(ENTRY_NAME),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(KernelError::ShaderCompilation {
                message: error.to_string(),
                source: program.source,
            });
        }
        Ok(CompiledShader { pipeline, program })
    }

    /// Run one kernel over a grid, blocking until the device has finished.
    ///
    /// Inspection, translation and compilation happen at most once per
    /// structural shape; later dispatches of the same shape reduce to a
    /// signature lookup plus the pass itself.
    pub fn for_each(&self, grid: GridShape, desc: &KernelDescriptor) -> Result<(), KernelError> {
        let inspection = inspect(desc)?;
        let shader = ShaderCache::global().get_or_compile(self, &inspection)?;
        dispatch::run(self, &shader, grid, desc)
    }
}
