//! Headless compute job
//!
//! Runs a compute shader over a storage buffer and reads the result back:
//! input (host visible) -> kernel -> output (device local) -> readback (host visible).
//! The kernel sees the input at binding 0 and the output at binding 1 of set 0.

use std::sync::Arc;
use bytemuck::Pod;

use crate::device::types::*;
use crate::device::{CommandRecorder, GraphicsDevice};
use crate::error::{Error, Result};
use crate::resource_scope::{Handle, ResourceScope};
use crate::shader::ShaderCode;
use crate::{engine_debug, engine_info};

const STORAGE_BINDINGS: [DescriptorBinding; 2] = [
    DescriptorBinding {
        binding: 0,
        kind: DescriptorKind::StorageBuffer,
        stages: ShaderStageFlags::COMPUTE,
    },
    DescriptorBinding {
        binding: 1,
        kind: DescriptorKind::StorageBuffer,
        stages: ShaderStageFlags::COMPUTE,
    },
];

pub struct ComputeJob<D: GraphicsDevice> {
    scope: ResourceScope,
    device: Arc<D>,
    input: Handle<D::Buffer>,
    output: Handle<D::Buffer>,
    readback: Handle<D::Buffer>,
    pipeline: Handle<D::Pipeline>,
    set: Handle<D::DescriptorSet>,
    cmd: Handle<D::CommandBuffer>,
    size: u64,
    workgroups: u32,
    runs: u64,
}

impl<D: GraphicsDevice> ComputeJob<D> {
    /// Create a job processing `size` bytes with `workgroups` dispatched groups
    pub fn new(device: Arc<D>, shader: &ShaderCode, size: u64, workgroups: u32) -> Result<Self> {
        if shader.stage() != ShaderStage::Compute {
            return Err(Error::InvalidResource(format!(
                "shader '{}' is a {:?} shader, expected compute",
                shader.name(),
                shader.stage()
            )));
        }
        if size == 0 || workgroups == 0 {
            return Err(Error::InvalidResource("empty compute job".to_string()));
        }

        let mut scope = ResourceScope::new(format!("compute:{}", shader.name()));
        let input = device.create_buffer(&BufferDesc {
            label: "compute input".to_string(),
            size,
            usage: BufferUsage::STORAGE,
            location: MemoryLocation::HostVisible,
        })?;
        let input = scope.register("input buffer", input)?;
        let output = device.create_buffer(&BufferDesc {
            label: "compute output".to_string(),
            size,
            usage: BufferUsage::STORAGE | BufferUsage::TRANSFER_SRC,
            location: MemoryLocation::DeviceLocal,
        })?;
        let output = scope.register("output buffer", output)?;
        let readback = device.create_buffer(&BufferDesc {
            label: "compute readback".to_string(),
            size,
            usage: BufferUsage::TRANSFER_DST,
            location: MemoryLocation::HostVisible,
        })?;
        let readback = scope.register("readback buffer", readback)?;

        let layout = device.create_descriptor_set_layout(&STORAGE_BINDINGS)?;
        let layout = scope.register("descriptor layout", layout)?;
        let pool = device.create_descriptor_pool(&STORAGE_BINDINGS, 1)?;
        let pool = scope.register("descriptor pool", pool)?;
        let set = device.allocate_descriptor_set(scope.get(pool)?, scope.get(layout)?)?;
        let set = scope.register("descriptor set", set)?;
        device.write_descriptor_buffer(scope.get(set)?, 0, DescriptorKind::StorageBuffer, scope.get(input)?)?;
        device.write_descriptor_buffer(scope.get(set)?, 1, DescriptorKind::StorageBuffer, scope.get(output)?)?;

        let module = device.create_shader_module(shader)?;
        let module = scope.register("compute shader", module)?;
        let pipeline = device.create_compute_pipeline(scope.get(module)?, scope.get(layout)?)?;
        let pipeline = scope.register("compute pipeline", pipeline)?;

        let command_pool = device.create_command_pool(QueueKind::Compute, CommandPoolFlags::RESET_COMMAND_BUFFER)?;
        let command_pool = scope.register("command pool", command_pool)?;
        let mut buffers = device.allocate_command_buffers(scope.get(command_pool)?, 1)?;
        let cmd = buffers
            .pop()
            .ok_or_else(|| Error::BackendError("no command buffer allocated".to_string()))?;
        let cmd = scope.register("command buffer", cmd)?;

        engine_info!(
            "kludge::compute",
            "Compute job '{}' ready: {} bytes, {} workgroups",
            shader.name(),
            size,
            workgroups
        );

        Ok(Self {
            scope,
            device,
            input,
            output,
            readback,
            pipeline,
            set,
            cmd,
            size,
            workgroups,
            runs: 0,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Upload `input`, run the kernel to completion and return the output
    pub fn run<T: Pod>(&mut self, input: &[T]) -> Result<Vec<T>> {
        let bytes: &[u8] = bytemuck::cast_slice(input);
        if bytes.len() as u64 != self.size {
            return Err(Error::InvalidResource(format!(
                "compute input is {} bytes, job expects {}",
                bytes.len(),
                self.size
            )));
        }
        self.device.write_buffer(self.scope.get(self.input)?, 0, bytes)?;

        self.record()?;
        self.device.submit(QueueKind::Compute, self.scope.get(self.cmd)?, &[], &[])?;
        self.device.queue_wait_idle(QueueKind::Compute)?;

        let mut out = vec![0u8; self.size as usize];
        self.device.read_buffer(self.scope.get(self.readback)?, 0, &mut out)?;
        self.runs += 1;
        engine_debug!("kludge::compute", "Compute run {} complete", self.runs);
        Ok(bytemuck::pod_collect_to_vec(&out))
    }

    fn record(&self) -> Result<()> {
        let pipeline = self.scope.get(self.pipeline)?;
        let mut recorder = CommandRecorder::begin(
            self.device.as_ref(),
            self.scope.get(self.cmd)?,
            CommandBufferUsage::ONE_TIME_SUBMIT,
        )?;
        recorder.bind_pipeline(pipeline)?;
        recorder.bind_descriptor_set(pipeline, self.scope.get(self.set)?)?;
        recorder.dispatch(self.workgroups, 1, 1)?;
        recorder.pipeline_barrier(&MemoryBarrier {
            src_stage: PipelineStage::COMPUTE_SHADER,
            src_access: AccessFlags::SHADER_WRITE,
            dst_stage: PipelineStage::TRANSFER,
            dst_access: AccessFlags::TRANSFER_READ,
        })?;
        recorder.copy_buffer(self.scope.get(self.output)?, self.scope.get(self.readback)?, self.size)?;
        recorder.finish()
    }
}

#[cfg(test)]
#[path = "compute_tests.rs"]
mod tests;
