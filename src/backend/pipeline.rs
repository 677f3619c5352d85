// Render pass, framebuffers and graphics pipelines
//
// Every pipeline uses the same fixed-function state: one vec4 attribute,
// triangle lists, back-face culling, alpha blending, depth test with
// LESS_OR_EQUAL, and a dynamic viewport + scissor. Only the shaders and the
// number of sampled textures vary.

use ash::vk;
use std::ffi::CStr;

use super::buffer::DEPTH_FORMAT;
use super::driver::Driver;
use super::shader::{create_shader_module, ShaderPair};
use crate::error::{Result, VkResultExt};

const ENTRY_POINT: &[u8] = b"main\0";

/// Bytes per vertex: one vec4 of f32
pub const VERTEX_STRIDE: u32 = 16;

/// Create the render pass: color (cleared, stored) + depth (cleared, discarded)
pub fn create_render_pass<D: Driver>(driver: &D, format: vk::Format) -> Result<vk::RenderPass> {
    // Color attachment (the swapchain image, moved in and out of
    // COLOR_ATTACHMENT_OPTIMAL by the frame loop's barriers)
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let depth_attachment = vk::AttachmentDescription::builder()
        .format(DEPTH_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let depth_attachment_ref = vk::AttachmentReference::builder()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .depth_stencil_attachment(&depth_attachment_ref)
        .build();

    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .build();

    let attachments = &[color_attachment, depth_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { driver.create_render_pass(&render_pass_info) }.context("Failed to create render pass")
}

/// Create one framebuffer per swapchain image view, all sharing the depth view
pub fn create_framebuffers<D: Driver>(
    driver: &D,
    image_views: &[vk::ImageView],
    depth_image_view: vk::ImageView,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for &image_view in image_views {
        let attachments = &[image_view, depth_image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { driver.create_framebuffer(&framebuffer_info) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(result) => {
                for framebuffer in framebuffers {
                    unsafe { driver.destroy_framebuffer(framebuffer) };
                }
                return Err(result).context("Failed to create framebuffer");
            }
        }
    }

    Ok(framebuffers)
}

/// Handles of one built pipeline; draw instances keep a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub set_layout: vk::DescriptorSetLayout,
    /// Descriptor count of the sampler binding
    pub texture_slots: u32,
}

impl Pipeline {
    /// Pipeline, pipeline layout, set layout; null handles are skipped
    pub fn destroy<D: Driver>(&self, driver: &D) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                driver.destroy_pipeline(self.pipeline);
            }
            if self.layout != vk::PipelineLayout::null() {
                driver.destroy_pipeline_layout(self.layout);
            }
            if self.set_layout != vk::DescriptorSetLayout::null() {
                driver.destroy_descriptor_set_layout(self.set_layout);
            }
        }
    }
}

/// Build one pipeline per shader pair, in order
///
/// Each pair's shader modules are destroyed once its pipeline exists. On
/// failure everything this call created is destroyed before returning.
pub fn build_pipelines<D: Driver>(
    driver: &D,
    render_pass: vk::RenderPass,
    pairs: &[ShaderPair<'_>],
) -> Result<Vec<Pipeline>> {
    let mut pipelines = Vec::with_capacity(pairs.len());

    for pair in pairs {
        match build_pipeline(driver, render_pass, pair) {
            Ok(pipeline) => pipelines.push(pipeline),
            Err(e) => {
                for pipeline in &pipelines {
                    pipeline.destroy(driver);
                }
                return Err(e);
            }
        }
    }

    log::info!("Built {} pipeline(s)", pipelines.len());
    Ok(pipelines)
}

fn build_pipeline<D: Driver>(driver: &D, render_pass: vk::RenderPass, pair: &ShaderPair<'_>) -> Result<Pipeline> {
    let vert_shader = create_shader_module(driver, pair.vertex)?;
    let frag_shader = match create_shader_module(driver, pair.fragment) {
        Ok(module) => module,
        Err(e) => {
            unsafe { driver.destroy_shader_module(vert_shader) };
            return Err(e);
        }
    };

    let mut pipeline = Pipeline {
        texture_slots: pair.textures.max(1),
        ..Default::default()
    };
    let result = create_pipeline_objects(driver, render_pass, vert_shader, frag_shader, &mut pipeline);

    unsafe {
        driver.destroy_shader_module(vert_shader);
        driver.destroy_shader_module(frag_shader);
    }

    match result {
        Ok(()) => {
            log::debug!("Created pipeline {:?} ({} texture slot(s))", pipeline.pipeline, pipeline.texture_slots);
            Ok(pipeline)
        }
        Err(e) => {
            pipeline.destroy(driver);
            Err(e)
        }
    }
}

fn create_pipeline_objects<D: Driver>(
    driver: &D,
    render_pass: vk::RenderPass,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
    pipeline: &mut Pipeline,
) -> Result<()> {
    // Binding 0: transform uniform, binding 1: sampled textures
    let bindings = [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(pipeline.texture_slots)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build(),
    ];
    let set_layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

    pipeline.set_layout = unsafe { driver.create_descriptor_set_layout(&set_layout_info) }
        .context("Failed to create descriptor set layout")?;

    let set_layouts = [pipeline.set_layout];
    let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);

    pipeline.layout =
        unsafe { driver.create_pipeline_layout(&layout_info) }.context("Failed to create pipeline layout")?;

    // Shader stages
    let entry_point = unsafe { CStr::from_bytes_with_nul_unchecked(ENTRY_POINT) };

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_shader)
            .name(entry_point)
            .build(),
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_shader)
            .name(entry_point)
            .build(),
    ];

    // Vertex input: a single vec4 position per vertex
    let vertex_bindings = [vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride(VERTEX_STRIDE)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build()];
    let vertex_attributes = [vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32B32A32_SFLOAT)
        .offset(0)
        .build()];
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&vertex_bindings)
        .vertex_attribute_descriptions(&vertex_attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport and scissor are set per frame
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    // Straight alpha blending
    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(pipeline.layout)
        .render_pass(render_pass)
        .subpass(0);

    pipeline.pipeline = unsafe { driver.create_graphics_pipeline(&pipeline_info) }
        .context("Failed to create graphics pipeline")?;

    Ok(())
}
