//! wgpu compute backend

use super::{BufferId, BufferLayout, ComputeBackend};
use crate::environment::KernelParams;
use crate::kernels::Kernel;
use crate::{Error, Result};
use std::collections::HashMap;

const SHADER_SOURCE: &str = include_str!("../shaders/kernels.wgsl");

struct DeviceBuffers {
    layout: BufferLayout,
    storage: Vec<wgpu::Buffer>,
    bind_group: wgpu::BindGroup,
}

impl DeviceBuffers {
    fn get(&self, buffer: BufferId) -> Result<&wgpu::Buffer> {
        self.storage
            .get(buffer.binding() as usize - 1)
            .ok_or(Error::NotAllocated)
    }
}

/// Compute backend running the WGSL kernels through wgpu
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<Kernel, wgpu::ComputePipeline>,
    params_buffer: wgpu::Buffer,
    buffers: Option<DeviceBuffers>,
}

impl GpuBackend {
    /// Open a headless device and compile every kernel
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("voxtrace device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            "opened {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        entries.extend(BufferId::ALL.iter().map(|buffer| wgpu::BindGroupLayoutEntry {
            binding: buffer.binding(),
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Kernel Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Kernel Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Shader and pipeline validation errors surface through the scope
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Kernel Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });
        let pipelines = Kernel::ALL
            .into_iter()
            .map(|kernel| {
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kernel.entry_point()),
                    layout: Some(&pipeline_layout),
                    module: &module,
                    entry_point: Some(kernel.entry_point()),
                    compilation_options: Default::default(),
                    cache: None,
                });
                (kernel, pipeline)
            })
            .collect();
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::KernelCompileFailure(error.to_string()));
        }

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Params Buffer"),
            size: KernelParams::SIZE as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            device,
            queue,
            adapter_info,
            bind_group_layout,
            pipelines,
            params_buffer,
            buffers: None,
        })
    }

    fn buffers(&self) -> Result<&DeviceBuffers> {
        self.buffers.as_ref().ok_or(Error::NotAllocated)
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> String {
        format!("{} ({:?})", self.adapter_info.name, self.adapter_info.backend)
    }

    fn allocate(&mut self, layout: BufferLayout) -> Result<()> {
        let storage: Vec<wgpu::Buffer> = BufferId::ALL
            .iter()
            .map(|&buffer| {
                // Runtime-sized arrays need room for at least one element
                let size = layout.byte_size(buffer).max(buffer.element_size());
                self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{buffer:?} Buffer")),
                    size: size as u64,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_DST
                        | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: self.params_buffer.as_entire_binding(),
        }];
        entries.extend(
            BufferId::ALL
                .iter()
                .zip(&storage)
                .map(|(buffer, storage)| wgpu::BindGroupEntry {
                    binding: buffer.binding(),
                    resource: storage.as_entire_binding(),
                }),
        );

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Kernel Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        self.buffers = Some(DeviceBuffers {
            layout,
            storage,
            bind_group,
        });
        Ok(())
    }

    fn layout(&self) -> Option<BufferLayout> {
        self.buffers.as_ref().map(|buffers| buffers.layout)
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let buffers = self.buffers()?;
        buffers.layout.check(buffer, data.len())?;
        if !data.is_empty() {
            self.queue.write_buffer(buffers.get(buffer)?, 0, data);
        }
        Ok(())
    }

    fn dispatch(&mut self, kernel: Kernel, params: &KernelParams) -> Result<()> {
        let buffers = self.buffers()?;
        if BufferLayout::new(params) != buffers.layout {
            return Err(Error::InvalidParameter(format!(
                "dispatch parameters do not match the allocated buffers for {kernel:?}"
            )));
        }
        let pipeline = self
            .pipelines
            .get(&kernel)
            .ok_or_else(|| Error::KernelCompileFailure(format!("{kernel:?} was not built")))?;

        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Kernel Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            let groups = kernel.workgroups(params);
            pass.dispatch_workgroups(groups.x, groups.y, groups.z);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        tracing::trace!("gpu dispatch {:?}", kernel);
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferId) -> Result<Vec<u8>> {
        let buffers = self.buffers()?;
        let size = buffers.layout.byte_size(buffer) as u64;
        if size == 0 {
            return Ok(Vec::new());
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(buffers.get(buffer)?, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| Error::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| Error::Readback(e.to_string()))?
            .map_err(|e| Error::Readback(e.to_string()))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }
}
