// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::rc::Rc;

use crate::error::{RenderResult, VkResultExt};
use crate::gpu::{Gpu, Owned};

/// Semaphores shared by every frame, plus one fence per swapchain image.
///
/// Sharing the two semaphores means only one frame may sit between acquire
/// and present at a time. The fences keep a slot's command buffer from being
/// re-recorded while the device still reads it.
pub struct SyncSet {
    image_available: Owned<vk::Semaphore>,
    render_finished: Owned<vk::Semaphore>,
    fences: Vec<Owned<vk::Fence>>,
}

impl SyncSet {
    pub fn new(gpu: &Rc<dyn Gpu>, image_count: usize) -> RenderResult<Self> {
        let image_available = Owned::new(gpu, gpu.create_semaphore().during("create_semaphore")?);
        let render_finished = Owned::new(gpu, gpu.create_semaphore().during("create_semaphore")?);
        Ok(SyncSet {
            image_available,
            render_finished,
            fences: create_fences(gpu, image_count)?,
        })
    }

    /// Replaces every fence with `count` fresh signaled ones.
    ///
    /// The device must be idle: the old fences are destroyed here.
    pub fn rebuild_fences(&mut self, gpu: &Rc<dyn Gpu>, count: usize) -> RenderResult<()> {
        self.fences = create_fences(gpu, count)?;
        Ok(())
    }

    /// Replaces the acquire semaphore. The device must be idle.
    pub(crate) fn renew_image_available(&mut self, gpu: &Rc<dyn Gpu>) -> RenderResult<()> {
        self.image_available = Owned::new(gpu, gpu.create_semaphore().during("create_semaphore")?);
        Ok(())
    }

    /// Swaps slot `index` for a signaled fence after a submission that never reached the queue.
    pub(crate) fn reset_slot(&mut self, gpu: &Rc<dyn Gpu>, index: usize) -> RenderResult<()> {
        let fence = Owned::new(gpu, gpu.create_fence(true).during("create_fence")?);
        if let Some(slot) = self.fences.get_mut(index) {
            *slot = fence;
        }
        Ok(())
    }

    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.raw()
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.raw()
    }

    pub fn fence(&self, index: usize) -> Option<vk::Fence> {
        self.fences.get(index).map(Owned::raw)
    }

    pub fn fence_count(&self) -> usize {
        self.fences.len()
    }
}

/// `count` fences, all created signaled so the first use of each slot does not block.
fn create_fences(gpu: &Rc<dyn Gpu>, count: usize) -> RenderResult<Vec<Owned<vk::Fence>>> {
    (0..count)
        .map(|_| {
            gpu.create_fence(true)
                .during("create_fence")
                .map(|f| Owned::new(gpu, f))
        })
        .collect()
}
