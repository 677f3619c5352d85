// Recording driver for tests
//
// Hands out fake handles, keeps host memory behind every allocation so
// mapped writes can be inspected, and logs every create/destroy so tests can
// check pairing and ordering. Destroying a handle that is not live panics.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::c_void;
use std::sync::Once;

use super::driver::Driver;
use super::memory::HOST_MAPPABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Memory,
    Buffer,
    Image,
    ImageView,
    Sampler,
    SetLayout,
    DescriptorPool,
    DescriptorSet,
    ShaderModule,
    PipelineLayout,
    Pipeline,
    RenderPass,
    Framebuffer,
    Swapchain,
    Semaphore,
    Fence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Create(Kind, u64),
    Destroy(Kind, u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub count: u32,
    pub ty: vk::DescriptorType,
    pub buffer_range: Option<vk::DeviceSize>,
    pub image_layout: Option<vk::ImageLayout>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub image: u64,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

#[derive(Default)]
struct ImageInfo {
    extent: vk::Extent3D,
    tiling: vk::ImageTiling,
}

struct State {
    next_handle: u64,
    events: Vec<Event>,
    live: HashMap<u64, Kind>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, (usize, vk::Result)>,
    memory: HashMap<u64, Vec<u8>>,
    mapped: HashSet<u64>,
    buffers: HashMap<u64, vk::DeviceSize>,
    images: HashMap<u64, ImageInfo>,
    acquire_results: VecDeque<VkResult<(u32, bool)>>,
    present_results: VecDeque<VkResult<bool>>,
    acquire_semaphores: Vec<u64>,
    submit_waits: Vec<Vec<u64>>,
    present_waits: Vec<Vec<u64>>,
    descriptor_writes: Vec<DescriptorWrite>,
    barriers: Vec<Barrier>,
    copies: Vec<(u64, u64, vk::Extent3D)>,
    draws: Vec<u32>,
    pool_sizes: Vec<Vec<vk::DescriptorPoolSize>>,
    set_layouts: Vec<Vec<LayoutBinding>>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    linear_sampling: bool,
    row_alignment: u64,
    row_offset: u64,
}

pub struct MockDriver {
    state: RefCell<State>,
}

impl Default for MockDriver {
    fn default() -> Self {
        // Type 0: device local, type 1: host visible + coherent
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        memory_properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory_properties.memory_types[1].property_flags = HOST_MAPPABLE;

        Self {
            state: RefCell::new(State {
                next_handle: 0x1000,
                events: Vec::new(),
                live: HashMap::new(),
                calls: HashMap::new(),
                failures: HashMap::new(),
                memory: HashMap::new(),
                mapped: HashSet::new(),
                buffers: HashMap::new(),
                images: HashMap::new(),
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                acquire_semaphores: Vec::new(),
                submit_waits: Vec::new(),
                present_waits: Vec::new(),
                descriptor_writes: Vec::new(),
                barriers: Vec::new(),
                copies: Vec::new(),
                draws: Vec::new(),
                pool_sizes: Vec::new(),
                set_layouts: Vec::new(),
                memory_properties,
                linear_sampling: true,
                row_alignment: 1,
                row_offset: 0,
            }),
        }
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether linear-tiled RGBA8 images may be sampled directly
    pub fn with_linear_sampling(self, supported: bool) -> Self {
        self.state.borrow_mut().linear_sampling = supported;
        self
    }

    /// Row pitch of linear images is rounded up to this many bytes
    pub fn with_row_alignment(self, alignment: u64) -> Self {
        self.state.borrow_mut().row_alignment = alignment;
        self
    }

    pub fn with_row_offset(self, offset: u64) -> Self {
        self.state.borrow_mut().row_offset = offset;
        self
    }

    pub fn with_memory_properties(self, props: vk::PhysicalDeviceMemoryProperties) -> Self {
        self.state.borrow_mut().memory_properties = props;
        self
    }

    /// Every later call named `op` fails with `result`
    pub fn fail(&self, op: &'static str, result: vk::Result) {
        self.fail_after(op, 0, result);
    }

    /// Let `successes` more calls named `op` through, then fail with `result`
    pub fn fail_after(&self, op: &'static str, successes: usize, result: vk::Result) {
        self.state.borrow_mut().failures.insert(op, (successes, result));
    }

    /// Stop failing calls named `op`
    pub fn heal(&self, op: &'static str) {
        self.state.borrow_mut().failures.remove(op);
    }

    pub fn push_acquire(&self, result: VkResult<(u32, bool)>) {
        self.state.borrow_mut().acquire_results.push_back(result);
    }

    pub fn push_present(&self, result: VkResult<bool>) {
        self.state.borrow_mut().present_results.push_back(result);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state.borrow().calls.get(op).copied().unwrap_or(0)
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn created(&self, kind: Kind) -> Vec<u64> {
        self.filter_events(|e| match e {
            Event::Create(k, h) if k == kind => Some(h),
            _ => None,
        })
    }

    pub fn destroyed(&self, kind: Kind) -> Vec<u64> {
        self.filter_events(|e| match e {
            Event::Destroy(k, h) if k == kind => Some(h),
            _ => None,
        })
    }

    fn filter_events(&self, f: impl Fn(Event) -> Option<u64>) -> Vec<u64> {
        self.state.borrow().events.iter().copied().filter_map(f).collect()
    }

    /// Handles created and not yet destroyed
    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    /// Position of the destroy event for `handle`
    pub fn destroy_position(&self, handle: u64) -> Option<usize> {
        self.state
            .borrow()
            .events
            .iter()
            .position(|e| matches!(e, Event::Destroy(_, h) if *h == handle))
    }

    pub fn memory_bytes(&self, memory: vk::DeviceMemory) -> Vec<u8> {
        self.state.borrow().memory[&memory.as_raw()].clone()
    }

    pub fn acquire_semaphores(&self) -> Vec<u64> {
        self.state.borrow().acquire_semaphores.clone()
    }

    pub fn submit_waits(&self) -> Vec<Vec<u64>> {
        self.state.borrow().submit_waits.clone()
    }

    pub fn present_waits(&self) -> Vec<Vec<u64>> {
        self.state.borrow().present_waits.clone()
    }

    pub fn descriptor_writes(&self) -> Vec<DescriptorWrite> {
        self.state.borrow().descriptor_writes.clone()
    }

    pub fn barriers(&self) -> Vec<Barrier> {
        self.state.borrow().barriers.clone()
    }

    pub fn copies(&self) -> Vec<(u64, u64, vk::Extent3D)> {
        self.state.borrow().copies.clone()
    }

    pub fn draws(&self) -> Vec<u32> {
        self.state.borrow().draws.clone()
    }

    pub fn pool_sizes(&self) -> Vec<Vec<vk::DescriptorPoolSize>> {
        self.state.borrow().pool_sizes.clone()
    }

    pub fn set_layouts(&self) -> Vec<Vec<LayoutBinding>> {
        self.state.borrow().set_layouts.clone()
    }

    fn call(&self, op: &'static str) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.get_mut(op) {
            Some((0, result)) => Err(*result),
            Some((successes, _)) => {
                *successes -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn create(&self, op: &'static str, kind: Kind) -> VkResult<u64> {
        self.call(op)?;
        let mut state = self.state.borrow_mut();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.live.insert(handle, kind);
        state.events.push(Event::Create(kind, handle));
        Ok(handle)
    }

    fn destroy(&self, op: &'static str, kind: Kind, handle: u64) {
        let _ = self.call(op);
        let mut state = self.state.borrow_mut();
        match state.live.remove(&handle) {
            Some(k) if k == kind => state.events.push(Event::Destroy(kind, handle)),
            other => panic!("{op}: {handle:#x} is not a live {kind:?} (found {other:?})"),
        }
    }

    fn linear_layout(&self, image: u64) -> vk::SubresourceLayout {
        let state = self.state.borrow();
        let info = &state.images[&image];
        let tight = info.extent.width as u64 * 4;
        let align = state.row_alignment.max(1);
        let row_pitch = tight.div_ceil(align) * align;
        vk::SubresourceLayout {
            offset: state.row_offset,
            size: row_pitch * info.extent.height as u64,
            row_pitch,
            array_pitch: 0,
            depth_pitch: 0,
        }
    }
}

impl Driver for MockDriver {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.state.borrow().memory_properties
    }

    fn format_properties(&self, _format: vk::Format) -> vk::FormatProperties {
        let linear_tiling_features = if self.state.borrow().linear_sampling {
            vk::FormatFeatureFlags::SAMPLED_IMAGE
        } else {
            vk::FormatFeatureFlags::empty()
        };
        vk::FormatProperties {
            linear_tiling_features,
            optimal_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE,
            buffer_features: vk::FormatFeatureFlags::empty(),
        }
    }

    unsafe fn allocate_memory(&self, info: &vk::MemoryAllocateInfo) -> VkResult<vk::DeviceMemory> {
        let handle = self.create("allocate_memory", Kind::Memory)?;
        self.state
            .borrow_mut()
            .memory
            .insert(handle, vec![0; info.allocation_size as usize]);
        Ok(vk::DeviceMemory::from_raw(handle))
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.destroy("free_memory", Kind::Memory, memory.as_raw());
        assert!(
            !self.state.borrow().mapped.contains(&memory.as_raw()),
            "freed mapped memory"
        );
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        _size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        self.call("map_memory")?;
        let mut state = self.state.borrow_mut();
        assert!(state.mapped.insert(memory.as_raw()), "memory mapped twice");
        let block = state.memory.get_mut(&memory.as_raw()).expect("unknown memory");
        Ok(block.as_mut_ptr().add(offset as usize) as *mut c_void)
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        let _ = self.call("unmap_memory");
        assert!(
            self.state.borrow_mut().mapped.remove(&memory.as_raw()),
            "unmapping memory that is not mapped"
        );
    }

    unsafe fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VkResult<vk::Buffer> {
        let handle = self.create("create_buffer", Kind::Buffer)?;
        self.state.borrow_mut().buffers.insert(handle, info.size);
        Ok(vk::Buffer::from_raw(handle))
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.destroy("destroy_buffer", Kind::Buffer, buffer.as_raw());
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.state.borrow().buffers[&buffer.as_raw()];
        vk::MemoryRequirements {
            size: size.div_ceil(256) * 256,
            alignment: 256,
            memory_type_bits: 0b11,
        }
    }

    unsafe fn bind_buffer_memory(
        &self,
        _buffer: vk::Buffer,
        _memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.call("bind_buffer_memory")
    }

    unsafe fn create_image(&self, info: &vk::ImageCreateInfo) -> VkResult<vk::Image> {
        let handle = self.create("create_image", Kind::Image)?;
        self.state.borrow_mut().images.insert(
            handle,
            ImageInfo {
                extent: info.extent,
                tiling: info.tiling,
            },
        );
        Ok(vk::Image::from_raw(handle))
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.destroy("destroy_image", Kind::Image, image.as_raw());
    }

    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let linear = self.state.borrow().images[&image.as_raw()].tiling == vk::ImageTiling::LINEAR;
        let size = if linear {
            let layout = self.linear_layout(image.as_raw());
            layout.offset + layout.size
        } else {
            let state = self.state.borrow();
            let extent = state.images[&image.as_raw()].extent;
            extent.width as u64 * extent.height as u64 * 4
        };
        vk::MemoryRequirements {
            size,
            alignment: 256,
            memory_type_bits: 0b11,
        }
    }

    unsafe fn bind_image_memory(
        &self,
        _image: vk::Image,
        _memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        self.call("bind_image_memory")
    }

    unsafe fn image_subresource_layout(
        &self,
        image: vk::Image,
        _subresource: vk::ImageSubresource,
    ) -> vk::SubresourceLayout {
        let _ = self.call("image_subresource_layout");
        self.linear_layout(image.as_raw())
    }

    unsafe fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        self.create("create_image_view", Kind::ImageView)
            .map(vk::ImageView::from_raw)
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.destroy("destroy_image_view", Kind::ImageView, view.as_raw());
    }

    unsafe fn create_sampler(&self, _info: &vk::SamplerCreateInfo) -> VkResult<vk::Sampler> {
        self.create("create_sampler", Kind::Sampler)
            .map(vk::Sampler::from_raw)
    }

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.destroy("destroy_sampler", Kind::Sampler, sampler.as_raw());
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> VkResult<vk::DescriptorSetLayout> {
        let handle = self.create("create_descriptor_set_layout", Kind::SetLayout)?;
        let bindings = std::slice::from_raw_parts(info.p_bindings, info.binding_count as usize)
            .iter()
            .map(|b| LayoutBinding {
                binding: b.binding,
                ty: b.descriptor_type,
                count: b.descriptor_count,
                stages: b.stage_flags,
            })
            .collect();
        self.state.borrow_mut().set_layouts.push(bindings);
        Ok(vk::DescriptorSetLayout::from_raw(handle))
    }

    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.destroy("destroy_descriptor_set_layout", Kind::SetLayout, layout.as_raw());
    }

    unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo,
    ) -> VkResult<vk::DescriptorPool> {
        let handle = self.create("create_descriptor_pool", Kind::DescriptorPool)?;
        let sizes = std::slice::from_raw_parts(info.p_pool_sizes, info.pool_size_count as usize);
        self.state.borrow_mut().pool_sizes.push(sizes.to_vec());
        Ok(vk::DescriptorPool::from_raw(handle))
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.destroy("destroy_descriptor_pool", Kind::DescriptorPool, pool.as_raw());
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        (0..info.descriptor_set_count)
            .map(|_| {
                self.create("allocate_descriptor_sets", Kind::DescriptorSet)
                    .map(vk::DescriptorSet::from_raw)
            })
            .collect()
    }

    unsafe fn free_descriptor_sets(
        &self,
        _pool: vk::DescriptorPool,
        sets: &[vk::DescriptorSet],
    ) -> VkResult<()> {
        for set in sets {
            self.destroy("free_descriptor_sets", Kind::DescriptorSet, set.as_raw());
        }
        Ok(())
    }

    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        let _ = self.call("update_descriptor_sets");
        let mut state = self.state.borrow_mut();
        for write in writes {
            let buffer_range = (!write.p_buffer_info.is_null()).then(|| (*write.p_buffer_info).range);
            let image_layout = (!write.p_image_info.is_null()).then(|| (*write.p_image_info).image_layout);
            state.descriptor_writes.push(DescriptorWrite {
                binding: write.dst_binding,
                count: write.descriptor_count,
                ty: write.descriptor_type,
                buffer_range,
                image_layout,
            });
        }
    }

    unsafe fn create_shader_module(
        &self,
        _info: &vk::ShaderModuleCreateInfo,
    ) -> VkResult<vk::ShaderModule> {
        self.create("create_shader_module", Kind::ShaderModule)
            .map(vk::ShaderModule::from_raw)
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.destroy("destroy_shader_module", Kind::ShaderModule, module.as_raw());
    }

    unsafe fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        self.create("create_pipeline_layout", Kind::PipelineLayout)
            .map(vk::PipelineLayout::from_raw)
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.destroy("destroy_pipeline_layout", Kind::PipelineLayout, layout.as_raw());
    }

    unsafe fn create_graphics_pipeline(
        &self,
        _info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        self.create("create_graphics_pipeline", Kind::Pipeline)
            .map(vk::Pipeline::from_raw)
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.destroy("destroy_pipeline", Kind::Pipeline, pipeline.as_raw());
    }

    unsafe fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        self.create("create_render_pass", Kind::RenderPass)
            .map(vk::RenderPass::from_raw)
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.destroy("destroy_render_pass", Kind::RenderPass, render_pass.as_raw());
    }

    unsafe fn create_framebuffer(&self, _info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        self.create("create_framebuffer", Kind::Framebuffer)
            .map(vk::Framebuffer::from_raw)
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.destroy("destroy_framebuffer", Kind::Framebuffer, framebuffer.as_raw());
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.destroy("destroy_swapchain", Kind::Swapchain, swapchain.as_raw());
    }

    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        self.create("create_semaphore", Kind::Semaphore)
            .map(vk::Semaphore::from_raw)
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.destroy("destroy_semaphore", Kind::Semaphore, semaphore.as_raw());
    }

    unsafe fn create_fence(&self) -> VkResult<vk::Fence> {
        self.create("create_fence", Kind::Fence).map(vk::Fence::from_raw)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        self.destroy("destroy_fence", Kind::Fence, fence.as_raw());
    }

    unsafe fn wait_for_fence(&self, _fence: vk::Fence) -> VkResult<()> {
        self.call("wait_for_fence")
    }

    unsafe fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.call("acquire_next_image")?;
        let mut state = self.state.borrow_mut();
        state.acquire_semaphores.push(semaphore.as_raw());
        state.acquire_results.pop_front().unwrap_or(Ok((0, false)))
    }

    unsafe fn queue_submit(
        &self,
        _queue: vk::Queue,
        submit: &vk::SubmitInfo,
        _fence: vk::Fence,
    ) -> VkResult<()> {
        self.call("queue_submit")?;
        let waits = semaphores(submit.p_wait_semaphores, submit.wait_semaphore_count);
        self.state.borrow_mut().submit_waits.push(waits);
        Ok(())
    }

    unsafe fn queue_present(&self, _queue: vk::Queue, info: &vk::PresentInfoKHR) -> VkResult<bool> {
        self.call("queue_present")?;
        let waits = semaphores(info.p_wait_semaphores, info.wait_semaphore_count);
        let mut state = self.state.borrow_mut();
        state.present_waits.push(waits);
        state.present_results.pop_front().unwrap_or(Ok(false))
    }

    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        self.call("device_wait_idle")
    }

    unsafe fn begin_command_buffer(
        &self,
        _cmd: vk::CommandBuffer,
        _info: &vk::CommandBufferBeginInfo,
    ) -> VkResult<()> {
        self.call("begin_command_buffer")
    }

    unsafe fn end_command_buffer(&self, _cmd: vk::CommandBuffer) -> VkResult<()> {
        self.call("end_command_buffer")
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        _cmd: vk::CommandBuffer,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        let _ = self.call("cmd_pipeline_barrier");
        let mut state = self.state.borrow_mut();
        for barrier in image_barriers {
            state.barriers.push(Barrier {
                image: barrier.image.as_raw(),
                old_layout: barrier.old_layout,
                new_layout: barrier.new_layout,
            });
        }
    }

    unsafe fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, _info: &vk::RenderPassBeginInfo) {
        let _ = self.call("cmd_begin_render_pass");
    }

    unsafe fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        let _ = self.call("cmd_end_render_pass");
    }

    unsafe fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, _viewport: vk::Viewport) {
        let _ = self.call("cmd_set_viewport");
    }

    unsafe fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, _scissor: vk::Rect2D) {
        let _ = self.call("cmd_set_scissor");
    }

    unsafe fn cmd_bind_vertex_buffer(
        &self,
        _cmd: vk::CommandBuffer,
        _buffer: vk::Buffer,
        _offset: vk::DeviceSize,
    ) {
        let _ = self.call("cmd_bind_vertex_buffer");
    }

    unsafe fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, _pipeline: vk::Pipeline) {
        let _ = self.call("cmd_bind_pipeline");
    }

    unsafe fn cmd_bind_descriptor_set(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _set: vk::DescriptorSet,
    ) {
        let _ = self.call("cmd_bind_descriptor_set");
    }

    unsafe fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32) {
        let _ = self.call("cmd_draw");
        self.state.borrow_mut().draws.push(vertex_count);
    }

    unsafe fn cmd_copy_image(
        &self,
        _cmd: vk::CommandBuffer,
        src: vk::Image,
        _src_layout: vk::ImageLayout,
        dst: vk::Image,
        _dst_layout: vk::ImageLayout,
        region: vk::ImageCopy,
    ) {
        let _ = self.call("cmd_copy_image");
        self.state
            .borrow_mut()
            .copies
            .push((src.as_raw(), dst.as_raw(), region.extent));
    }
}

unsafe fn semaphores(ptr: *const vk::Semaphore, count: u32) -> Vec<u64> {
    if count == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(ptr, count as usize)
        .iter()
        .map(|s| s.as_raw())
        .collect()
}

/// Fake swapchain handle registered with the mock so it can be destroyed
pub fn fake_swapchain(driver: &MockDriver) -> vk::SwapchainKHR {
    let handle = driver
        .create("create_swapchain", Kind::Swapchain)
        .expect("swapchain");
    vk::SwapchainKHR::from_raw(handle)
}

/// Fake present images (owned by the swapchain, never destroyed)
pub fn fake_images(count: u64) -> Vec<vk::Image> {
    (0..count).map(|i| vk::Image::from_raw(0x10 + i)).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Warning capture
// ─────────────────────────────────────────────────────────────────────────────

struct CaptureLogger;

thread_local! {
    static CAPTURED: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if record.level() == log::Level::Warn {
            CAPTURED.with(|captured| {
                if let Some(warnings) = captured.borrow_mut().as_mut() {
                    warnings.push(record.args().to_string());
                }
            });
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;
static INSTALL: Once = Once::new();

/// Run `f` and collect the warnings it logged on this thread
pub fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
    INSTALL.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);
    });
    CAPTURED.with(|captured| *captured.borrow_mut() = Some(Vec::new()));
    let out = f();
    let warnings = CAPTURED.with(|captured| captured.borrow_mut().take().unwrap_or_default());
    (out, warnings)
}
