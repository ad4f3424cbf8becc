//! GPU-accelerated activation kernel using WGPU.
//!
//! Runs the forward and backward passes as WGSL compute shaders. The device, queue,
//! shader and both pipelines are created once, lazily, on first use (via `lazy_static`);
//! if no adapter or device can be acquired, every call reports
//! [`GpuFailure::Unavailable`] and the [`Gpu`] kernel serves the request on the CPU.
//!
//! Buffers are uploaded for each call and the result is copied back into the caller's
//! slice, so unlike the CPU backends this path allocates device memory.
//!
//! # Notes
//!
//! - `f32` only; other element types go to the CPU
//! - Comparison branches match the reference exactly; the multiply-add may round
//!   differently depending on the driver

use std::sync::mpsc;

use briny::BrinyError;
use briny::raw::cast::{slice_from_bytes, slice_to_bytes};
use thiserror::Error;
use wgpu::util::DeviceExt;

use super::ReluKernel;
use super::cpu::Parallel;
use crate::element::Element;

const RELU: &str = include_str!("shaders/relu.wgsl");

const WORKGROUP_SIZE: u32 = 64;
const MAX_WORKGROUPS_PER_DIM: u32 = 65_535;

/// Failure to bring up the GPU context.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No suitable adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    /// The adapter refused to open a device.
    #[error("device error: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Failure of a single GPU dispatch.
#[derive(Debug, Error)]
pub enum GpuFailure {
    /// The shared context could not be created.
    #[error("GPU unavailable: {0}")]
    Unavailable(String),
    /// The buffer does not fit in one storage binding or one dispatch.
    #[error("buffer of {0} elements exceeds the device limits")]
    TooLarge(usize),
    /// Waiting on the device failed.
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    /// The staging buffer could not be mapped.
    #[error("buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    /// The map callback never ran.
    #[error("buffer mapping callback was dropped")]
    MapCallbackDropped,
    /// Mapped bytes could not be viewed as `f32`.
    #[error("readback cast failed")]
    Cast,
}

impl From<BrinyError> for GpuFailure {
    fn from(_: BrinyError) -> Self {
        Self::Cast
    }
}

/// Holds the WGPU device and queue together with the compiled activation pipelines.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// Submission queue of the device.
    pub queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    forward_pipeline: wgpu::ComputePipeline,
    backward_pipeline: wgpu::ComputePipeline,
}

#[derive(Debug, Clone, Copy)]
enum Pass {
    Forward,
    Backward,
}

impl Pass {
    fn label(self) -> &'static str {
        match self {
            Self::Forward => "relu_forward",
            Self::Backward => "relu_backward",
        }
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuContext {
    /// Selects the default adapter, opens a device and compiles both entry points.
    ///
    /// Uses `pollster::block_on` to wait for the async WGPU calls.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("relu_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;
        log::info!("relu GPU context on adapter {:?}", adapter.get_info().name);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("relu"),
            source: wgpu::ShaderSource::Wgsl(RELU.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("relu_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("relu_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |pass: Pass, entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(pass.label()),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };
        let forward_pipeline = pipeline(Pass::Forward, "forward");
        let backward_pipeline = pipeline(Pass::Backward, "backward");

        Ok(Self {
            device,
            queue,
            bind_group_layout,
            forward_pipeline,
            backward_pipeline,
        })
    }

    fn pipeline(&self, pass: Pass) -> &wgpu::ComputePipeline {
        match pass {
            Pass::Forward => &self.forward_pipeline,
            Pass::Backward => &self.backward_pipeline,
        }
    }

    /// Workgroup grid `(x, y)` and the flat-index row stride for `len` elements.
    fn grid(&self, len: usize) -> Result<(u32, u32, u32), GpuFailure> {
        let max_binding = self.device.limits().max_storage_buffer_binding_size as usize;
        if len * size_of::<f32>() > max_binding {
            return Err(GpuFailure::TooLarge(len));
        }
        let groups = u32::try_from(len)
            .map_err(|_| GpuFailure::TooLarge(len))?
            .div_ceil(WORKGROUP_SIZE);
        let x = groups.min(MAX_WORKGROUPS_PER_DIM);
        let y = groups.div_ceil(x);
        if y > MAX_WORKGROUPS_PER_DIM {
            return Err(GpuFailure::TooLarge(len));
        }
        Ok((x, y, x * WORKGROUP_SIZE))
    }

    /// Uploads `a` and `b`, runs `pass`, and returns the staging buffer holding the result.
    fn submit(
        &self,
        pass: Pass,
        a: &[f32],
        b: &[f32],
        negative_slope: f32,
    ) -> Result<wgpu::Buffer, GpuFailure> {
        let len = a.len();
        let (groups_x, groups_y, row_stride) = self.grid(len)?;
        let size = (len * size_of::<f32>()) as u64;

        // count, slope bits, row stride, padding
        let params = [len as u32, negative_slope.to_bits(), row_stride, 0u32];
        let params_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("relu_params"),
            contents: slice_to_bytes(&params[..]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let a_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("relu_a"),
            contents: slice_to_bytes(a),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let b_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("relu_b"),
            contents: slice_to_bytes(b),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let out_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("relu_out"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("relu_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("relu_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: a_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: b_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: out_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("relu_encoder"),
        });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(pass.label()),
                timestamp_writes: None,
            });
            cpass.set_pipeline(self.pipeline(pass));
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&out_buf, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        Ok(staging)
    }

    /// Maps `staging` and copies its contents into `out`.
    fn read_back(&self, staging: &wgpu::Buffer, out: &mut [f32]) -> Result<(), GpuFailure> {
        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::PollType::Wait)?;
        rx.recv().map_err(|_| GpuFailure::MapCallbackDropped)??;

        {
            let view = slice.get_mapped_range();
            out.copy_from_slice(slice_from_bytes::<f32>(&view)?);
        }
        staging.unmap();
        Ok(())
    }
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: Result<GpuContext, GpuError> = GpuContext::new();
}

/// Returns the shared context, creating it on first use.
pub fn context() -> Result<&'static GpuContext, GpuFailure> {
    GPU_CONTEXT
        .as_ref()
        .map_err(|e| GpuFailure::Unavailable(e.to_string()))
}

/// Forward pass on the GPU into `output`.
///
/// # Panics
/// Panics if the buffers differ in length.
pub fn wgpu_forward(input: &[f32], output: &mut [f32], negative_slope: f32) -> Result<(), GpuFailure> {
    assert_eq!(input.len(), output.len(), "relu forward: buffer length mismatch");
    if input.is_empty() {
        return Ok(());
    }
    let ctx = context()?;
    let staging = ctx.submit(Pass::Forward, input, input, negative_slope)?;
    ctx.read_back(&staging, output)
}

/// Forward pass on the GPU overwriting `data`.
pub fn wgpu_forward_in_place(data: &mut [f32], negative_slope: f32) -> Result<(), GpuFailure> {
    if data.is_empty() {
        return Ok(());
    }
    let ctx = context()?;
    let staging = ctx.submit(Pass::Forward, data, data, negative_slope)?;
    ctx.read_back(&staging, data)
}

/// Backward pass on the GPU into `bottom_diff`.
///
/// # Panics
/// Panics if the buffers differ in length.
pub fn wgpu_backward(
    top_diff: &[f32],
    bottom_data: &[f32],
    bottom_diff: &mut [f32],
    negative_slope: f32,
) -> Result<(), GpuFailure> {
    assert_eq!(top_diff.len(), bottom_diff.len(), "relu backward: buffer length mismatch");
    assert_eq!(bottom_data.len(), bottom_diff.len(), "relu backward: buffer length mismatch");
    if bottom_diff.is_empty() {
        return Ok(());
    }
    let ctx = context()?;
    let staging = ctx.submit(Pass::Backward, top_diff, bottom_data, negative_slope)?;
    ctx.read_back(&staging, bottom_diff)
}

/// Backward pass on the GPU where `diff` holds the upstream gradient on entry.
///
/// # Panics
/// Panics if the buffers differ in length.
pub fn wgpu_backward_in_place(
    diff: &mut [f32],
    bottom_data: &[f32],
    negative_slope: f32,
) -> Result<(), GpuFailure> {
    assert_eq!(bottom_data.len(), diff.len(), "relu backward: buffer length mismatch");
    if diff.is_empty() {
        return Ok(());
    }
    let ctx = context()?;
    let staging = ctx.submit(Pass::Backward, diff, bottom_data, negative_slope)?;
    ctx.read_back(&staging, diff)
}

/// GPU backend. Falls back to [`Parallel`] for non-`f32` buffers and whenever a dispatch
/// fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gpu;

fn slope_f32<T: Element>(negative_slope: T) -> Option<f32> {
    num_traits::ToPrimitive::to_f32(&negative_slope)
}

fn fall_back(op: &str, err: &GpuFailure) {
    log::warn!("GPU relu {op} failed, falling back to CPU: {err}");
}

impl<T: Element> ReluKernel<T> for Gpu {
    fn forward(&self, input: &[T], output: &mut [T], negative_slope: T) {
        if let (Some(x), Some(s)) = (T::as_f32_slice(input), slope_f32(negative_slope)) {
            if let Some(y) = T::as_f32_slice_mut(output) {
                match wgpu_forward(x, y, s) {
                    Ok(()) => return,
                    Err(e) => fall_back("forward", &e),
                }
            }
        } else {
            log::debug!("GPU relu forward needs f32 buffers, running on CPU");
        }
        Parallel.forward(input, output, negative_slope);
    }

    fn forward_in_place(&self, data: &mut [T], negative_slope: T) {
        if let (Some(x), Some(s)) = (T::as_f32_slice_mut(data), slope_f32(negative_slope)) {
            match wgpu_forward_in_place(x, s) {
                Ok(()) => return,
                Err(e) => fall_back("forward", &e),
            }
        } else {
            log::debug!("GPU relu forward needs f32 buffers, running on CPU");
        }
        Parallel.forward_in_place(data, negative_slope);
    }

    fn backward(&self, top_diff: &[T], bottom_data: &[T], bottom_diff: &mut [T], negative_slope: T) {
        if let (Some(dy), Some(x), Some(s)) = (
            T::as_f32_slice(top_diff),
            T::as_f32_slice(bottom_data),
            slope_f32(negative_slope),
        ) {
            if let Some(g) = T::as_f32_slice_mut(bottom_diff) {
                match wgpu_backward(dy, x, g, s) {
                    Ok(()) => return,
                    Err(e) => fall_back("backward", &e),
                }
            }
        } else {
            log::debug!("GPU relu backward needs f32 buffers, running on CPU");
        }
        Parallel.backward(top_diff, bottom_data, bottom_diff, negative_slope);
    }

    fn backward_in_place(&self, diff: &mut [T], bottom_data: &[T], negative_slope: T) {
        if let (Some(g), Some(x), Some(s)) = (
            T::as_f32_slice_mut(diff),
            T::as_f32_slice(bottom_data),
            slope_f32(negative_slope),
        ) {
            match wgpu_backward_in_place(g, x, s) {
                Ok(()) => return,
                Err(e) => fall_back("backward", &e),
            }
        } else {
            log::debug!("GPU relu backward needs f32 buffers, running on CPU");
        }
        Parallel.backward_in_place(diff, bottom_data, negative_slope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::approx_eq;
    use crate::ops::reference;

    fn gpu_available() -> bool {
        match context() {
            Ok(_) => true,
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                false
            }
        }
    }

    #[test]
    fn wgpu_forward_matches_reference() {
        if !gpu_available() {
            return;
        }
        let input: Vec<f32> = (0..1000).map(|i| (i as f32 - 500.0) * 0.013).collect();
        for slope in [0.0f32, 0.1, -0.7] {
            let mut expected = vec![0.0f32; input.len()];
            reference::forward(&input, &mut expected, slope);

            let mut output = vec![0.0f32; input.len()];
            wgpu_forward(&input, &mut output, slope).expect("wgpu_forward failed");
            assert!(approx_eq(output.as_slice(), expected.as_slice()));

            let mut data = input.clone();
            wgpu_forward_in_place(&mut data, slope).expect("wgpu_forward_in_place failed");
            assert!(approx_eq(data.as_slice(), expected.as_slice()));
        }
    }

    #[test]
    fn wgpu_backward_takes_slope_branch_at_zero() {
        if !gpu_available() {
            return;
        }
        let input = [-2.0f32, -1.0, 0.0, 1.0, 2.0];
        let mut grad = [-999.0f32; 5];
        wgpu_backward(&[1.0; 5], &input, &mut grad, 0.1).expect("wgpu_backward failed");
        assert!(approx_eq(&grad[..], &[0.1f32, 0.1, 0.1, 1.0, 1.0][..]));

        let mut diff = [1.0f32; 5];
        wgpu_backward_in_place(&mut diff, &input, 0.1).expect("wgpu_backward_in_place failed");
        assert!(approx_eq(&diff[..], &[0.1f32, 0.1, 0.1, 1.0, 1.0][..]));
    }

    #[test]
    fn wgpu_empty_input_is_a_no_op() {
        let mut output: [f32; 0] = [];
        assert!(wgpu_forward(&[], &mut output, 0.5).is_ok());
    }

    #[test]
    fn gpu_kernel_serves_f64_on_cpu() {
        let input = [-2.0f64, 0.0, 3.0];
        let mut output = [0.0f64; 3];
        Gpu.forward(&input, &mut output, 0.5);
        assert_eq!(output, [-1.0, 0.0, 3.0]);
    }
}
