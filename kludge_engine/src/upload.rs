//! Static GPU data uploaded once through a staging buffer
//!
//! Textures and vertex buffers that never change live in device-local
//! memory. They are filled by a one-shot command buffer on the graphics
//! queue, which is waited on before the staging memory is released.

use std::sync::Arc;
use bytemuck::Pod;

use crate::device::types::*;
use crate::device::{CommandRecorder, GraphicsDevice};
use crate::error::{Error, Result};
use crate::resource_scope::{Handle, ResourceScope};
use crate::engine_debug;

/// Tightly packed RGBA8 texels, rows top to bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    extent: Extent2D,
    pixels: Vec<u8>,
}

impl TextureData {
    pub fn rgba8(extent: Extent2D, pixels: Vec<u8>) -> Result<Self> {
        if extent.is_zero_area() {
            return Err(Error::InvalidResource("texture has zero area".to_string()));
        }
        let expected = extent.width as usize * extent.height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::InvalidResource(format!(
                "{}x{} RGBA8 texture needs {} bytes, got {}",
                extent.width,
                extent.height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self { extent, pixels })
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn format(&self) -> Format {
        Format::R8G8B8A8_UNORM
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Interleaved vertices matching `layout`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexData {
    layout: VertexLayout,
    bytes: Vec<u8>,
}

impl VertexData {
    pub fn new<T: Pod>(layout: VertexLayout, vertices: &[T]) -> Result<Self> {
        if layout.stride as usize != std::mem::size_of::<T>() {
            return Err(Error::InvalidResource(format!(
                "vertex stride {} does not match {}-byte vertices",
                layout.stride,
                std::mem::size_of::<T>()
            )));
        }
        if vertices.is_empty() {
            return Err(Error::InvalidResource("empty vertex data".to_string()));
        }
        Ok(Self {
            layout,
            bytes: bytemuck::cast_slice(vertices).to_vec(),
        })
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn vertex_count(&self) -> u32 {
        (self.bytes.len() / self.layout.stride as usize) as u32
    }
}

/// Record, submit and wait for one transient command buffer on the graphics queue
pub fn submit_one_shot<D: GraphicsDevice>(
    device: &D,
    record: impl FnOnce(&mut CommandRecorder<'_, D>) -> Result<()>,
) -> Result<()> {
    let pool = device.create_command_pool(QueueKind::Graphics, CommandPoolFlags::TRANSIENT)?;
    let cmd = device
        .allocate_command_buffers(&pool, 1)?
        .pop()
        .ok_or_else(|| Error::BackendError("no command buffer allocated".to_string()))?;

    let mut recorder = CommandRecorder::begin(device, &cmd, CommandBufferUsage::ONE_TIME_SUBMIT)?;
    record(&mut recorder)?;
    recorder.finish()?;

    device.submit(QueueKind::Graphics, &cmd, &[], &[])?;
    device.queue_wait_idle(QueueKind::Graphics)?;
    drop(cmd);
    drop(pool);
    Ok(())
}

fn staging_buffer<D: GraphicsDevice>(device: &D, label: &str, bytes: &[u8]) -> Result<D::Buffer> {
    let staging = device.create_buffer(&BufferDesc {
        label: format!("{} staging", label),
        size: bytes.len() as u64,
        usage: BufferUsage::TRANSFER_SRC,
        location: MemoryLocation::HostVisible,
    })?;
    device.write_buffer(&staging, 0, bytes)?;
    Ok(staging)
}

/// Sampled device-local image with its view and sampler
pub struct Texture<D: GraphicsDevice> {
    scope: ResourceScope,
    image: Handle<D::Image>,
    view: Handle<D::ImageView>,
    sampler: Handle<D::Sampler>,
    extent: Extent2D,
}

impl<D: GraphicsDevice> Texture<D> {
    /// Upload `data` and leave the image in `ShaderReadOnly` layout
    pub fn upload(device: &Arc<D>, label: &str, data: &TextureData, sampler: &SamplerDesc) -> Result<Self> {
        let mut scope = ResourceScope::new(format!("texture:{}", label));
        let image = device.create_image(&ImageDesc {
            extent: data.extent(),
            format: data.format(),
            usage: ImageUsage::Sampled,
        })?;
        let image = scope.register("image", image)?;

        let staging = staging_buffer(device.as_ref(), label, data.pixels())?;
        submit_one_shot(device.as_ref(), |recorder| {
            let target = scope.get(image)?;
            recorder.image_barrier(target, &ImageBarrier::to_transfer_dst())?;
            recorder.copy_buffer_to_image(&staging, target, data.extent())?;
            recorder.image_barrier(target, &ImageBarrier::to_shader_read())
        })?;
        drop(staging);

        let view = device.create_image_view(scope.get(image)?)?;
        let view = scope.register("view", view)?;
        let sampler = scope.register("sampler", device.create_sampler(sampler)?)?;

        engine_debug!(
            "kludge::upload",
            "Texture '{}' uploaded: {}x{}",
            label,
            data.extent().width,
            data.extent().height
        );
        Ok(Self {
            scope,
            image,
            view,
            sampler,
            extent: data.extent(),
        })
    }

    pub fn image(&self) -> Result<&D::Image> {
        self.scope.get(self.image)
    }

    pub fn view(&self) -> Result<&D::ImageView> {
        self.scope.get(self.view)
    }

    pub fn sampler(&self) -> Result<&D::Sampler> {
        self.scope.get(self.sampler)
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }
}

/// Device-local vertex buffer filled once
pub struct StaticVertexBuffer<D: GraphicsDevice> {
    scope: ResourceScope,
    buffer: Handle<D::Buffer>,
    layout: VertexLayout,
    vertex_count: u32,
}

impl<D: GraphicsDevice> StaticVertexBuffer<D> {
    pub fn upload(device: &Arc<D>, label: &str, data: &VertexData) -> Result<Self> {
        let mut scope = ResourceScope::new(format!("vertices:{}", label));
        let size = data.bytes().len() as u64;
        let buffer = device.create_buffer(&BufferDesc {
            label: label.to_string(),
            size,
            usage: BufferUsage::VERTEX | BufferUsage::TRANSFER_DST,
            location: MemoryLocation::DeviceLocal,
        })?;
        let buffer = scope.register("vertex buffer", buffer)?;

        let staging = staging_buffer(device.as_ref(), label, data.bytes())?;
        submit_one_shot(device.as_ref(), |recorder| {
            recorder.copy_buffer(&staging, scope.get(buffer)?, size)?;
            recorder.pipeline_barrier(&MemoryBarrier {
                src_stage: PipelineStage::TRANSFER,
                src_access: AccessFlags::TRANSFER_WRITE,
                dst_stage: PipelineStage::VERTEX_INPUT,
                dst_access: AccessFlags::VERTEX_ATTRIBUTE_READ,
            })
        })?;
        drop(staging);

        engine_debug!(
            "kludge::upload",
            "Vertex buffer '{}' uploaded: {} vertices",
            label,
            data.vertex_count()
        );
        Ok(Self {
            scope,
            buffer,
            layout: data.layout().clone(),
            vertex_count: data.vertex_count(),
        })
    }

    pub fn buffer(&self) -> Result<&D::Buffer> {
        self.scope.get(self.buffer)
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
