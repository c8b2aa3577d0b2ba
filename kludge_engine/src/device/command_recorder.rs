/// CommandRecorder - state-checked recording of one command buffer
///
/// Wraps the `cmd_*` primitives of a `GraphicsDevice` and rejects calls made
/// in the wrong recording state (draw outside a render pass, copy inside one,
/// finishing with an open pass).

use crate::device::graphics_device::GraphicsDevice;
use crate::device::types::*;
use crate::error::{Error, Result};

pub struct CommandRecorder<'a, D: GraphicsDevice> {
    device: &'a D,
    cmd: &'a D::CommandBuffer,
    in_render_pass: bool,
    bound_pipeline: bool,
    commands: u32,
}

impl<'a, D: GraphicsDevice> CommandRecorder<'a, D> {
    /// Begin recording `cmd`
    pub fn begin(device: &'a D, cmd: &'a D::CommandBuffer, usage: CommandBufferUsage) -> Result<Self> {
        device.cmd_begin(cmd, usage)?;
        Ok(Self {
            device,
            cmd,
            in_render_pass: false,
            bound_pipeline: false,
            commands: 0,
        })
    }

    pub fn begin_render_pass(
        &mut self,
        render_pass: &D::RenderPass,
        framebuffer: &D::Framebuffer,
        extent: Extent2D,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        if self.in_render_pass {
            return Err(Error::ContractViolation("Already inside a render pass".to_string()));
        }
        self.device.cmd_begin_render_pass(self.cmd, render_pass, framebuffer, extent, clear_values)?;
        self.in_render_pass = true;
        self.commands += 1;
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        if !self.in_render_pass {
            return Err(Error::ContractViolation("No render pass to end".to_string()));
        }
        self.device.cmd_end_render_pass(self.cmd)?;
        self.in_render_pass = false;
        self.commands += 1;
        Ok(())
    }

    pub fn bind_pipeline(&mut self, pipeline: &D::Pipeline) -> Result<()> {
        self.device.cmd_bind_pipeline(self.cmd, pipeline)?;
        self.bound_pipeline = true;
        self.commands += 1;
        Ok(())
    }

    pub fn bind_descriptor_set(&mut self, pipeline: &D::Pipeline, set: &D::DescriptorSet) -> Result<()> {
        self.device.cmd_bind_descriptor_set(self.cmd, pipeline, set)?;
        self.commands += 1;
        Ok(())
    }

    pub fn bind_vertex_buffer(&mut self, buffer: &D::Buffer) -> Result<()> {
        self.device.cmd_bind_vertex_buffer(self.cmd, buffer)?;
        self.commands += 1;
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        if !self.in_render_pass {
            return Err(Error::ContractViolation("Draw recorded outside a render pass".to_string()));
        }
        if !self.bound_pipeline {
            return Err(Error::ContractViolation("Draw recorded without a bound pipeline".to_string()));
        }
        self.device.cmd_draw(self.cmd, vertex_count, first_vertex)?;
        self.commands += 1;
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        if self.in_render_pass {
            return Err(Error::ContractViolation("Dispatch recorded inside a render pass".to_string()));
        }
        if !self.bound_pipeline {
            return Err(Error::ContractViolation("Dispatch recorded without a bound pipeline".to_string()));
        }
        self.device.cmd_dispatch(self.cmd, x, y, z)?;
        self.commands += 1;
        Ok(())
    }

    pub fn pipeline_barrier(&mut self, barrier: &MemoryBarrier) -> Result<()> {
        if self.in_render_pass {
            return Err(Error::ContractViolation("Barrier recorded inside a render pass".to_string()));
        }
        self.device.cmd_pipeline_barrier(self.cmd, barrier)?;
        self.commands += 1;
        Ok(())
    }

    pub fn copy_buffer(&mut self, src: &D::Buffer, dst: &D::Buffer, size: u64) -> Result<()> {
        if self.in_render_pass {
            return Err(Error::ContractViolation("Buffer copy recorded inside a render pass".to_string()));
        }
        self.device.cmd_copy_buffer(self.cmd, src, dst, size)?;
        self.commands += 1;
        Ok(())
    }

    pub fn image_barrier(&mut self, image: &D::Image, barrier: &ImageBarrier) -> Result<()> {
        if self.in_render_pass {
            return Err(Error::ContractViolation("Image barrier recorded inside a render pass".to_string()));
        }
        self.device.cmd_image_barrier(self.cmd, image, barrier)?;
        self.commands += 1;
        Ok(())
    }

    pub fn copy_buffer_to_image(&mut self, src: &D::Buffer, dst: &D::Image, extent: Extent2D) -> Result<()> {
        if self.in_render_pass {
            return Err(Error::ContractViolation("Image upload recorded inside a render pass".to_string()));
        }
        self.device.cmd_copy_buffer_to_image(self.cmd, src, dst, extent)?;
        self.commands += 1;
        Ok(())
    }

    /// Number of commands recorded so far
    pub fn command_count(&self) -> u32 {
        self.commands
    }

    /// End recording; the render pass must be closed
    pub fn finish(self) -> Result<()> {
        if self.in_render_pass {
            return Err(Error::ContractViolation(
                "Render pass not ended before ending command buffer".to_string(),
            ));
        }
        self.device.cmd_end(self.cmd)
    }
}
