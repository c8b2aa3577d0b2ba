/// Render pass, shader module and pipeline construction

use ash::vk;
use kludge_engine::kludge::device::{GraphicsPipelineDesc, RenderPassDesc, ShaderStage};
use kludge_engine::kludge::{Error, Result, ShaderCode};
use kludge_engine::{engine_debug, engine_err, engine_error};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_device::VulkanDevice;
use crate::vulkan_format::{
    cull_mode_to_vk, format_to_vk, front_face_to_vk, shader_stage_to_vk, topology_to_vk, vk_error,
};
use crate::vulkan_objects::{VulkanDescriptorSetLayout, VulkanPipeline, VulkanRenderPass, VulkanShaderModule};

/// Every shader is compiled with this entry point
const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Single subpass: cleared color attachment presented at the end, optional depth
pub(crate) fn create_render_pass(ctx: &Arc<GpuContext>, desc: &RenderPassDesc) -> Result<VulkanRenderPass> {
    let mut attachments = vec![vk::AttachmentDescription::default()
        .format(format_to_vk(desc.color_format))
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    let color_attachment_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let depth_attachment_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    if let Some(depth_format) = desc.depth_format {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(format_to_vk(depth_format))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
    }

    let has_depth = desc.depth_format.is_some();
    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_attachment_ref));
    if has_depth {
        subpass = subpass.depth_stencil_attachment(&depth_attachment_ref);
    }

    let (stage_mask, access_mask) = if has_depth {
        (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
    } else {
        (
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
    };

    // the swapchain image may still be read by the presentation engine
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stage_mask)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stage_mask)
        .dst_access_mask(access_mask);

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    let render_pass = unsafe {
        ctx.device
            .create_render_pass(&render_pass_info, None)
            .map_err(|e| vk_error("Failed to create render pass", e))?
    };
    Ok(VulkanRenderPass::new(ctx.clone(), render_pass, has_depth))
}

/// Create a shader module after checking the binary declares a `main` entry point
pub(crate) fn create_shader_module(ctx: &Arc<GpuContext>, code: &ShaderCode) -> Result<VulkanShaderModule> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code.words())
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| {
            engine_error!("kludge::vulkan", "SPIR-V reflection of '{}' failed: {:?}", code.name(), e);
            Error::InvalidResource(format!("shader '{}' is not valid SPIR-V", code.name()))
        })?;

    let entry = entry_points.iter().find(|ep| ep.name == "main").ok_or_else(|| {
        engine_error!("kludge::vulkan", "Shader '{}' has no 'main' entry point", code.name());
        Error::InvalidResource(format!("shader '{}' has no 'main' entry point", code.name()))
    })?;
    engine_debug!(
        "kludge::vulkan",
        "Shader '{}' ({:?}) reflects {} resource(s)",
        code.name(),
        code.stage(),
        entry.vars.len()
    );

    let create_info = vk::ShaderModuleCreateInfo::default().code(code.words());
    let module = unsafe {
        ctx.device
            .create_shader_module(&create_info, None)
            .map_err(|e| vk_error("Failed to create shader module", e))?
    };
    Ok(VulkanShaderModule::new(ctx.clone(), module, shader_stage_to_vk(code.stage())))
}

unsafe fn create_pipeline_layout(
    ctx: &GpuContext,
    descriptor_layout: Option<&VulkanDescriptorSetLayout>,
) -> Result<vk::PipelineLayout> {
    let set_layouts: Vec<vk::DescriptorSetLayout> = descriptor_layout.map(|l| l.layout).into_iter().collect();
    let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    ctx.device
        .create_pipeline_layout(&layout_info, None)
        .map_err(|e| vk_error("Failed to create pipeline layout", e))
}

/// Graphics pipeline with a fixed viewport covering `desc.extent`
pub(crate) fn create_graphics_pipeline(
    ctx: &Arc<GpuContext>,
    desc: &GraphicsPipelineDesc<'_, VulkanDevice>,
) -> Result<VulkanPipeline> {
    if desc.vertex_shader.stage != shader_stage_to_vk(ShaderStage::Vertex)
        || desc.fragment_shader.stage != shader_stage_to_vk(ShaderStage::Fragment)
    {
        return Err(Error::InvalidResource(
            "graphics pipeline needs a vertex and a fragment shader".to_string(),
        ));
    }

    unsafe {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(desc.vertex_shader.module)
                .name(ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(desc.fragment_shader.module)
                .name(ENTRY_POINT),
        ];

        let (vertex_bindings, vertex_attributes) = match &desc.vertex_layout {
            Some(layout) => (
                vec![vk::VertexInputBindingDescription {
                    binding: 0,
                    stride: layout.stride,
                    input_rate: vk::VertexInputRate::VERTEX,
                }],
                layout
                    .attributes
                    .iter()
                    .map(|attribute| vk::VertexInputAttributeDescription {
                        location: attribute.location,
                        binding: 0,
                        format: format_to_vk(attribute.format),
                        offset: attribute.offset,
                    })
                    .collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: desc.extent.width as f32,
            height: desc.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: desc.extent.width,
                height: desc.extent.height,
            },
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(desc.cull_mode))
            .front_face(front_face_to_vk(desc.front_face))
            .depth_bias_enable(false);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let mut color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(desc.alpha_blend);
        if desc.alpha_blend {
            color_blend_attachment = color_blend_attachment
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD);
        }
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let layout = create_pipeline_layout(ctx, desc.descriptor_layout)?;

        let mut pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .layout(layout)
            .render_pass(desc.render_pass.render_pass)
            .subpass(0);
        if desc.render_pass.has_depth {
            pipeline_create_info = pipeline_create_info.depth_stencil_state(&depth_stencil_state);
        }

        let pipelines = ctx
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_create_info], None)
            .map_err(|e| {
                ctx.device.destroy_pipeline_layout(layout, None);
                engine_err!("kludge::vulkan", "Failed to create graphics pipeline: {:?}", e.1)
            })?;

        Ok(VulkanPipeline::new(
            ctx.clone(),
            pipelines[0],
            layout,
            vk::PipelineBindPoint::GRAPHICS,
        ))
    }
}

pub(crate) fn create_compute_pipeline(
    ctx: &Arc<GpuContext>,
    shader: &VulkanShaderModule,
    descriptor_layout: &VulkanDescriptorSetLayout,
) -> Result<VulkanPipeline> {
    if shader.stage != vk::ShaderStageFlags::COMPUTE {
        return Err(Error::InvalidResource("compute pipeline needs a compute shader".to_string()));
    }

    unsafe {
        let layout = create_pipeline_layout(ctx, Some(descriptor_layout))?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.module)
            .name(ENTRY_POINT);
        let create_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout);

        let pipelines = ctx
            .device
            .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|e| {
                ctx.device.destroy_pipeline_layout(layout, None);
                engine_err!("kludge::vulkan", "Failed to create compute pipeline: {:?}", e.1)
            })?;

        Ok(VulkanPipeline::new(
            ctx.clone(),
            pipelines[0],
            layout,
            vk::PipelineBindPoint::COMPUTE,
        ))
    }
}
