// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::rc::Rc;

use crate::error::{RenderResult, VkResultExt};
use crate::gpu::{Gpu, Owned};

/// Hands out command buffers, from a caller's pool or from a default pool
/// on the graphics family that is created on first use.
#[derive(Default)]
pub struct CommandAllocator {
    default_pool: Option<Owned<vk::CommandPool>>,
}

impl CommandAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_pool(&mut self, gpu: &Rc<dyn Gpu>) -> RenderResult<vk::CommandPool> {
        if let Some(pool) = &self.default_pool {
            return Ok(pool.raw());
        }
        // buffers are re-recorded every frame, so each must be resettable on its own
        let pool = gpu
            .create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .during("create_command_pool")?;
        self.default_pool = Some(Owned::new(gpu, pool));
        Ok(pool)
    }

    pub fn allocate(
        &mut self,
        gpu: &Rc<dyn Gpu>,
        level: vk::CommandBufferLevel,
        count: u32,
        pool: Option<vk::CommandPool>,
    ) -> RenderResult<Vec<vk::CommandBuffer>> {
        let pool = match pool {
            Some(pool) => pool,
            None => self.default_pool(gpu)?,
        };
        gpu.allocate_command_buffers(pool, level, count)
            .during("allocate_command_buffers")
    }

    /// Returns buffers to `pool`, or to the default pool when `None`.
    pub fn free(
        &self,
        gpu: &dyn Gpu,
        buffers: &[vk::CommandBuffer],
        pool: Option<vk::CommandPool>,
    ) {
        if buffers.is_empty() {
            return;
        }
        let pool = pool.or_else(|| self.default_pool.as_ref().map(Owned::raw));
        if let Some(pool) = pool {
            gpu.free_command_buffers(pool, buffers);
        }
    }

    pub fn has_default_pool(&self) -> bool {
        self.default_pool.is_some()
    }
}
