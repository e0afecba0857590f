// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, physical-device choice and the logical device.
//!
//! Construction order: instance (with WSI extensions and, optionally, the
//! validation layer), then the surface from that instance, then the device
//! picked against that surface. Teardown runs the other way round.

use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trident_render::GpuSelection;

use crate::debug::{DebugMessenger, DiagnosticSink, TracingSink};
use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::gpu::{find_memory_type, Gpu, RenderPassBegin, RenderPassLayout, Submission, SwapchainDesc};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device extensions a candidate must expose to be considered at all.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [swapchain::NAME];

/// What a selection policy gets to see about each qualifying device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub driver_version: u32,
}

pub enum DeviceSelection {
    First,
    Index(usize),
    /// Case-insensitive substring of the device name.
    Name(String),
    /// Returns the index of the chosen candidate, or `None` to refuse them all.
    Custom(Box<dyn Fn(&[DeviceCandidate]) -> Option<usize>>),
}

impl Default for DeviceSelection {
    fn default() -> Self {
        DeviceSelection::First
    }
}

impl From<&GpuSelection> for DeviceSelection {
    fn from(selection: &GpuSelection) -> Self {
        match selection {
            GpuSelection::First => DeviceSelection::First,
            GpuSelection::Index(i) => DeviceSelection::Index(*i),
            GpuSelection::Name(n) => DeviceSelection::Name(n.clone()),
        }
    }
}

impl fmt::Debug for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelection::First => f.write_str("First"),
            DeviceSelection::Index(i) => f.debug_tuple("Index").field(i).finish(),
            DeviceSelection::Name(n) => f.debug_tuple("Name").field(n).finish(),
            DeviceSelection::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

pub struct ContextOptions {
    pub app_name: String,
    /// Enables the Khronos validation layer when it is installed.
    pub validation: bool,
    pub selection: DeviceSelection,
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        ContextOptions {
            app_name: "trident".into(),
            validation: false,
            selection: DeviceSelection::First,
            diagnostics: Arc::new(TracingSink),
        }
    }
}

pub fn select_device(candidates: &[DeviceCandidate], selection: &DeviceSelection) -> Option<usize> {
    match selection {
        DeviceSelection::First => (!candidates.is_empty()).then_some(0),
        DeviceSelection::Index(i) => (*i < candidates.len()).then_some(*i),
        DeviceSelection::Name(needle) => {
            let needle = needle.to_lowercase();
            candidates
                .iter()
                .position(|c| c.name.to_lowercase().contains(&needle))
        }
        DeviceSelection::Custom(pick) => pick(candidates).filter(|&i| i < candidates.len()),
    }
}

/// First queue family that can run graphics work.
pub fn graphics_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|f| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
}

pub fn missing_extensions(available: &[&CStr], required: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .filter(|r| !available.contains(r))
        .map(|r| r.to_string_lossy().into_owned())
        .collect()
}

/// Instance-level objects. Dropping destroys surface, messenger, instance in that order.
struct InstanceScope {
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    messenger: Option<DebugMessenger>,
    instance: ash::Instance,
    entry: Entry,
}

impl Drop for InstanceScope {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some(messenger) = self.messenger.as_mut() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

struct Picked {
    phys: vk::PhysicalDevice,
    family: u32,
    candidate: DeviceCandidate,
}

/// The real [`Gpu`]: one logical device with one graphics queue.
pub struct DeviceContext {
    swapchain_loader: swapchain::Device,
    device: ash::Device,
    queue: vk::Queue,
    queue_family: u32,
    memory: vk::PhysicalDeviceMemoryProperties,
    properties: vk::PhysicalDeviceProperties,
    phys: vk::PhysicalDevice,
    candidate: DeviceCandidate,
    scope: InstanceScope,
}

impl DeviceContext {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        options: &ContextOptions,
    ) -> RenderResult<Self> {
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();

        let entry = unsafe { Entry::load()? };
        let validation = options.validation && has_validation_layer(&entry);

        let instance = create_instance(&entry, dh, &options.app_name, validation)?;
        let mut scope = InstanceScope {
            surface_loader: surface::Instance::new(&entry, &instance),
            surface: vk::SurfaceKHR::null(),
            messenger: None,
            instance,
            entry,
        };
        if validation {
            scope.messenger = Some(unsafe {
                DebugMessenger::new(
                    &scope.entry,
                    &scope.instance,
                    Arc::clone(&options.diagnostics),
                )?
            });
        }
        scope.surface = unsafe {
            ash_window::create_surface(&scope.entry, &scope.instance, dh, wh, None)
        }
        .during("create_surface")?;

        let picked = pick_device(&scope.instance, &options.selection)?;
        let present_ok = unsafe {
            scope.surface_loader.get_physical_device_surface_support(
                picked.phys,
                picked.family,
                scope.surface,
            )
        }
        .during("get_physical_device_surface_support")?;
        if !present_ok {
            return Err(RenderError::SurfaceUnsupported {
                device: picked.candidate.name,
                family: picked.family,
            });
        }

        let device = create_device(&scope.instance, picked.phys, picked.family)?;
        let queue = unsafe { device.get_device_queue(picked.family, 0) };
        let swapchain_loader = swapchain::Device::new(&scope.instance, &device);
        let (properties, memory) = unsafe {
            (
                scope.instance.get_physical_device_properties(picked.phys),
                scope
                    .instance
                    .get_physical_device_memory_properties(picked.phys),
            )
        };

        log_device(&picked.candidate, picked.family);

        Ok(DeviceContext {
            swapchain_loader,
            device,
            queue,
            queue_family: picked.family,
            memory,
            properties,
            phys: picked.phys,
            candidate: picked.candidate,
            scope,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.scope.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.phys
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn candidate(&self) -> &DeviceCandidate {
        &self.candidate
    }

    pub fn is_discrete(&self) -> bool {
        self.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_device(None);
        }
        // `scope` drops next: surface, messenger, instance
    }
}

fn has_validation_layer(entry: &Entry) -> bool {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    let found = layers
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER));
    if !found {
        warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed; continuing without it");
    }
    found
}

fn create_instance(
    entry: &Entry,
    display: raw_window_handle::RawDisplayHandle,
    app_name: &str,
    validation: bool,
) -> RenderResult<ash::Instance> {
    let app_name = CString::new(app_name).unwrap_or_else(|_| CString::from(c"trident"));
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: c"trident".as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display)
        .during("enumerate_required_extensions")?
        .to_vec();
    let mut layers: Vec<*const c_char> = Vec::new();
    if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    unsafe { entry.create_instance(&create_info, None) }.during("create_instance")
}

fn pick_device(instance: &ash::Instance, selection: &DeviceSelection) -> RenderResult<Picked> {
    let physical = unsafe { instance.enumerate_physical_devices() }
        .during("enumerate_physical_devices")?;
    if physical.is_empty() {
        return Err(RenderError::NoDeviceFound);
    }

    let mut qualified = Vec::new();
    let mut first_missing: Option<Vec<String>> = None;
    let mut without_graphics: Option<String> = None;

    for phys in physical {
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let candidate = DeviceCandidate {
            name: props
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "<unnamed>".into()),
            device_type: props.device_type,
            api_version: props.api_version,
            driver_version: props.driver_version,
        };

        let ext_props = unsafe { instance.enumerate_device_extension_properties(phys) }
            .during("enumerate_device_extension_properties")?;
        let available: Vec<&CStr> = ext_props
            .iter()
            .filter_map(|e| e.extension_name_as_c_str().ok())
            .collect();
        let missing = missing_extensions(&available, &REQUIRED_DEVICE_EXTENSIONS);
        if !missing.is_empty() {
            debug!("skipping {}: missing {}", candidate.name, missing.join(", "));
            first_missing.get_or_insert(missing);
            continue;
        }

        let families = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        match graphics_family(&families) {
            Some(family) => qualified.push(Picked {
                phys,
                family,
                candidate,
            }),
            None => {
                debug!("skipping {}: no graphics queue", candidate.name);
                without_graphics.get_or_insert(candidate.name);
            }
        }
    }

    if qualified.is_empty() {
        return Err(match (without_graphics, first_missing) {
            (Some(name), _) => RenderError::NoGraphicsQueue(name),
            (None, Some(missing)) => RenderError::MissingExtensions(missing),
            (None, None) => RenderError::NoDeviceFound,
        });
    }

    let candidates: Vec<DeviceCandidate> = qualified.iter().map(|p| p.candidate.clone()).collect();
    for (i, c) in candidates.iter().enumerate() {
        debug!("device {i}: {} ({:?})", c.name, c.device_type);
    }
    let index = select_device(&candidates, selection).ok_or(RenderError::DeviceNotSelected {
        candidates: candidates.len(),
    })?;
    Ok(qualified.swap_remove(index))
}

fn create_device(
    instance: &ash::Instance,
    phys: vk::PhysicalDevice,
    family: u32,
) -> RenderResult<ash::Device> {
    let priorities = [1.0_f32];
    let qinfo = vk::DeviceQueueCreateInfo {
        s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        queue_family_index: family,
        queue_count: 1,
        p_queue_priorities: priorities.as_ptr(),
        ..Default::default()
    };
    let device_exts: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|e| e.as_ptr())
        .collect();
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: 1,
        p_queue_create_infos: &qinfo,
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        ..Default::default()
    };
    unsafe { instance.create_device(phys, &dinfo, None) }.during("create_device")
}

fn log_device(c: &DeviceCandidate, family: u32) {
    info!(
        "GPU: {} ({:?}), Vulkan {}.{}.{}, driver {:#x}, queue family {}",
        c.name,
        c.device_type,
        vk::api_version_major(c.api_version),
        vk::api_version_minor(c.api_version),
        vk::api_version_patch(c.api_version),
        c.driver_version,
        family
    );
}

impl Gpu for DeviceContext {
    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory
    }

    fn graphics_family(&self) -> u32 {
        self.queue_family
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.scope
                .surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.scope.surface)
        }
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.scope
                .surface_loader
                .get_physical_device_surface_formats(self.phys, self.scope.surface)
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.scope
                .surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.scope.surface)
        }
    }

    fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.scope
                .instance
                .get_physical_device_format_properties(self.phys, format)
                .optimal_tiling_features
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.scope.surface,
            min_image_count: desc.image_count,
            image_format: desc.format.format,
            image_color_space: desc.format.color_space,
            image_extent: desc.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: desc.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: desc.present_mode,
            clipped: vk::TRUE,
            old_swapchain: desc.old_swapchain,
            ..Default::default()
        };
        unsafe { self.swapchain_loader.create_swapchain(&info, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_attachment_image(
        &self,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
    ) -> VkResult<vk::Image> {
        let info = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        unsafe { self.device.create_image(&info, None) }
    }

    fn bind_image_memory(&self, image: vk::Image) -> VkResult<vk::DeviceMemory> {
        let req = unsafe { self.device.get_image_memory_requirements(image) };
        let memory_type_index = find_memory_type(
            &self.memory,
            req.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .or_else(|| {
            find_memory_type(
                &self.memory,
                req.memory_type_bits,
                vk::MemoryPropertyFlags::empty(),
            )
        })
        .ok_or(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)?;

        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = unsafe { self.device.allocate_memory(&alloc, None)? };
        if let Err(err) = unsafe { self.device.bind_image_memory(image, memory, 0) } {
            unsafe { self.device.free_memory(memory, None) };
            return Err(err);
        }
        Ok(memory)
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn create_render_pass(&self, layout: &RenderPassLayout) -> VkResult<vk::RenderPass> {
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &layout.color,
            p_depth_stencil_attachment: &layout.depth,
            ..Default::default()
        };
        let info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: layout.attachments.len() as u32,
            p_attachments: layout.attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: layout.dependencies.len() as u32,
            p_dependencies: layout.dependencies.as_ptr(),
            ..Default::default()
        };
        unsafe { self.device.create_render_pass(&info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        unsafe { self.device.create_framebuffer(&info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.create_fence(&info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags,
            queue_family_index: self.queue_family,
            ..Default::default()
        };
        unsafe { self.device.create_command_pool(&info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: std::mem::size_of_val(code),
            p_code: code.as_ptr(),
            ..Default::default()
        };
        unsafe { self.device.create_shader_module(&info, None) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout, signal, vk::Fence::null())
        }
    }

    fn queue_submit(&self, submission: &Submission) -> VkResult<()> {
        let info = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &submission.wait,
            p_wait_dst_stage_mask: &submission.wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &submission.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &submission.signal,
            ..Default::default()
        };
        unsafe {
            self.device
                .queue_submit(self.queue, std::slice::from_ref(&info), submission.fence)
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        unsafe { self.swapchain_loader.queue_present(self.queue, &info) }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        let info = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            render_area: begin.area,
            clear_value_count: begin.clear_values.len() as u32,
            p_clear_values: begin.clear_values.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) }
    }

    fn cmd_set_viewports(&self, cmd: vk::CommandBuffer, viewports: &[vk::Viewport]) {
        unsafe { self.device.cmd_set_viewport(cmd, 0, viewports) }
    }

    fn cmd_set_scissors(&self, cmd: vk::CommandBuffer, scissors: &[vk::Rect2D]) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, scissors) }
    }
}
