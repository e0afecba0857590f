// SPDX-License-Identifier: CEPL-1.0
//! Presentable image chain plus the rules for negotiating it with the surface.

use ash::vk;
use std::rc::Rc;
use trident_render::VsyncMode;

use crate::error::{RenderResult, VkResultExt};
use crate::gpu::{Gpu, Owned, SwapchainDesc};

/// Used when the surface reports `UNDEFINED`, i.e. "anything goes".
pub const FALLBACK_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub struct Swapchain {
    // views go before the swapchain that owns their images
    views: Vec<Owned<vk::ImageView>>,
    handle: Owned<vk::SwapchainKHR>,
    images: Vec<vk::Image>,
    desc: SwapchainDesc,
}

impl Swapchain {
    /// Creates the swapchain and one color view per image.
    ///
    /// `desc.old_swapchain` is only borrowed; the caller keeps the predecessor
    /// alive until this returns and drops it afterwards.
    pub fn create(gpu: &Rc<dyn Gpu>, desc: &SwapchainDesc) -> RenderResult<Self> {
        let handle = Owned::new(gpu, gpu.create_swapchain(desc).during("create_swapchain")?);
        let images = gpu
            .swapchain_images(handle.raw())
            .during("get_swapchain_images")?;

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = gpu
                .create_image_view(image, desc.format.format, vk::ImageAspectFlags::COLOR)
                .during("create_image_view")?;
            views.push(Owned::new(gpu, view));
        }

        Ok(Swapchain {
            views,
            handle,
            images,
            desc: *desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle.raw()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.desc.format
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.desc.present_mode
    }

    /// Images actually handed out by the driver, which may exceed the request.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn view(&self, index: usize) -> Option<vk::ImageView> {
        self.views.get(index).map(Owned::raw)
    }

    pub fn views(&self) -> impl Iterator<Item = vk::ImageView> + '_ {
        self.views.iter().map(Owned::raw)
    }

    pub fn desc(&self) -> &SwapchainDesc {
        &self.desc
    }
}

/// Clamps `desired` into the surface's image-count range. A max of 0 means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, desired: u32) -> u32 {
    let count = desired.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// First reported format, with `UNDEFINED` mapped to [`FALLBACK_SURFACE_FORMAT`].
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let first = formats.first().copied()?;
    if first.format == vk::Format::UNDEFINED {
        Some(FALLBACK_SURFACE_FORMAT)
    } else {
        Some(first)
    }
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: VsyncMode) -> vk::PresentModeKHR {
    let preference: &[vk::PresentModeKHR] = match vsync {
        VsyncMode::Fifo => &[vk::PresentModeKHR::FIFO],
        VsyncMode::Mailbox => &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO],
        VsyncMode::Immediate => &[
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ],
    };
    preference
        .iter()
        .copied()
        .find(|m| modes.contains(m))
        // FIFO is the one mode every surface must support
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's current extent, or the drawable size clamped into range when
/// the surface leaves it to the swapchain (`u32::MAX` sentinel).
pub fn resolve_extent(caps: &vk::SurfaceCapabilitiesKHR, drawable: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: drawable
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: drawable
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

#[inline]
pub fn same_extent(a: vk::Extent2D, b: vk::Extent2D) -> bool {
    a.width == b.width && a.height == b.height
}
