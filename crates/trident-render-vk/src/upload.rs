// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};
use std::rc::Rc;
use tracing::debug;

use crate::context::DeviceContext;
use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::frame::FrameLoop;
use crate::gpu::{find_memory_type, Gpu, Owned};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn binding() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attributes() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// Immutable vertex data resident on the device.
pub struct VertexBuffer {
    buffer: Owned<vk::Buffer>,
    memory: Owned<vk::DeviceMemory>,
    count: u32,
}

impl VertexBuffer {
    /// Discrete GPUs get device-local memory filled through a staging copy;
    /// everything else writes straight into host-visible memory.
    pub fn upload(
        ctx: &DeviceContext,
        frames: &mut FrameLoop,
        vertices: &[Vertex],
    ) -> RenderResult<Self> {
        debug_assert!(!vertices.is_empty());
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let gpu = frames.gpu().clone();

        let (buffer, memory) = if ctx.is_discrete() {
            let (buffer, memory) = create_buffer(
                ctx,
                &gpu,
                bytes.len() as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            upload_via_staging(ctx, frames, &gpu, buffer.raw(), bytes)?;
            (buffer, memory)
        } else {
            let (buffer, memory) = create_buffer(
                ctx,
                &gpu,
                bytes.len() as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            write_mapped(ctx, memory.raw(), bytes)?;
            (buffer, memory)
        };

        debug!(
            "vertex buffer: {} vertices, {} bytes, staged={}",
            vertices.len(),
            bytes.len(),
            ctx.is_discrete()
        );
        Ok(VertexBuffer {
            buffer,
            memory,
            count: vertices.len() as u32,
        })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer.raw()
    }

    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.raw()
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

fn create_buffer(
    ctx: &DeviceContext,
    gpu: &Rc<dyn Gpu>,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    props: vk::MemoryPropertyFlags,
) -> RenderResult<(Owned<vk::Buffer>, Owned<vk::DeviceMemory>)> {
    let device = ctx.device();
    let info = vk::BufferCreateInfo {
        s_type: vk::StructureType::BUFFER_CREATE_INFO,
        size,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        ..Default::default()
    };
    let buffer = Owned::new(
        gpu,
        unsafe { device.create_buffer(&info, None) }.during("create_buffer")?,
    );

    let req = unsafe { device.get_buffer_memory_requirements(buffer.raw()) };
    let memory_type_index = find_memory_type(gpu.memory_properties(), req.memory_type_bits, props)
        .ok_or(RenderError::NoMemoryType(props))?;
    let alloc = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index,
        ..Default::default()
    };
    let memory = Owned::new(
        gpu,
        unsafe { device.allocate_memory(&alloc, None) }.during("allocate_memory")?,
    );
    unsafe { device.bind_buffer_memory(buffer.raw(), memory.raw(), 0) }
        .during("bind_buffer_memory")?;
    Ok((buffer, memory))
}

fn write_mapped(ctx: &DeviceContext, memory: vk::DeviceMemory, bytes: &[u8]) -> RenderResult<()> {
    let device = ctx.device();
    let size = bytes.len() as vk::DeviceSize;
    unsafe {
        let ptr = device
            .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
            .during("map_memory")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
        device.unmap_memory(memory);
    }
    Ok(())
}

/// Host -> staging -> `dst` through a one-time command buffer on the
/// graphics queue. Blocks until the copy has finished.
fn upload_via_staging(
    ctx: &DeviceContext,
    frames: &mut FrameLoop,
    gpu: &Rc<dyn Gpu>,
    dst: vk::Buffer,
    bytes: &[u8],
) -> RenderResult<()> {
    let size = bytes.len() as vk::DeviceSize;
    let (staging, staging_mem) = create_buffer(
        ctx,
        gpu,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    write_mapped(ctx, staging_mem.raw(), bytes)?;

    let cmds = frames.allocate_command_buffers(vk::CommandBufferLevel::PRIMARY, 1, None)?;
    let copied = record_and_submit_copy(ctx, &cmds, staging.raw(), dst, size);
    // the queue is idle (or the submit never happened), so the buffer is free to go
    frames.free_command_buffers(&cmds, None);
    copied
}

fn record_and_submit_copy(
    ctx: &DeviceContext,
    cmds: &[vk::CommandBuffer],
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> RenderResult<()> {
    let device = ctx.device();
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    };
    for &cmd in cmds {
        unsafe {
            device
                .begin_command_buffer(cmd, &begin)
                .during("begin_command_buffer")?;
            device.cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
            device
                .end_command_buffer(cmd)
                .during("end_command_buffer")?;
        }
    }

    let submit = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        command_buffer_count: cmds.len() as u32,
        p_command_buffers: cmds.as_ptr(),
        ..Default::default()
    };
    unsafe {
        device
            .queue_submit(ctx.queue(), std::slice::from_ref(&submit), vk::Fence::null())
            .during("queue_submit")?;
        device.queue_wait_idle(ctx.queue()).during("queue_wait_idle")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 20);
        assert_eq!(Vertex::binding().stride, 20);
    }

    #[test]
    fn attributes_match_the_shader_inputs() {
        let [pos, color] = Vertex::attributes();
        assert_eq!((pos.location, pos.offset), (0, 0));
        assert_eq!(pos.format, vk::Format::R32G32_SFLOAT);
        assert_eq!((color.location, color.offset), (1, 8));
        assert_eq!(color.format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn vertices_cast_to_their_raw_bytes() {
        let tri = [
            Vertex { pos: [0.0, -0.5], color: [1.0, 0.0, 0.0] },
            Vertex { pos: [0.5, 0.5], color: [0.0, 1.0, 0.0] },
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&tri);
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[8..12], &1.0f32.to_ne_bytes());
    }
}
