use std::mem::size_of;
use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::Result;
use nalgebra_glm as glm;
use vulkanalia::prelude::v1_0::*;

use crate::appdata::AppData;
use crate::config::*;
use crate::descriptors::{light_position, shadow_face_transforms};
use crate::model::Mesh;
use crate::targets::create_buffer;

pub unsafe fn create_command_pool(device: &Device, data: &mut AppData) -> Result<()> {
    let info = vk::CommandPoolCreateInfo::builder()
        .flags(vk::CommandPoolCreateFlags::empty())
        .queue_family_index(data.graphics_queue_index);
    data.command_pool = device.create_command_pool(&info, None)?;
    Ok(())
}

fn as_bytes<T>(slice: &[T]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(slice.as_ptr().cast::<u8>(), slice.len() * size_of::<T>())
    }
}

/// One-shot staging copy into a fresh device-local buffer. Blocks until the
/// transfer retires; only used during setup.
unsafe fn upload_to_device_buffer(
    instance: &Instance,
    device: &Device,
    data: &AppData,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let size = bytes.len() as u64;

    let (staging_buffer, staging_memory) = create_buffer(
        instance,
        device,
        data,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let memory = device.map_memory(staging_memory, 0, size, vk::MemoryMapFlags::empty())?;
    memcpy(bytes.as_ptr(), memory.cast(), bytes.len());
    device.unmap_memory(staging_memory);

    let (buffer, buffer_memory) = create_buffer(
        instance,
        device,
        data,
        size,
        vk::BufferUsageFlags::TRANSFER_DST | usage,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    let info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(data.command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let command_buffer = device.allocate_command_buffers(&info)?[0];

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device.begin_command_buffer(command_buffer, &begin_info)?;
    let region = vk::BufferCopy::builder().size(size);
    device.cmd_copy_buffer(command_buffer, staging_buffer, buffer, &[region]);
    device.end_command_buffer(command_buffer)?;

    let command_buffers = &[command_buffer];
    let submit_info = vk::SubmitInfo::builder().command_buffers(command_buffers);
    device.queue_submit(data.graphics_queue, &[submit_info], vk::Fence::null())?;
    device.queue_wait_idle(data.graphics_queue)?;

    device.free_command_buffers(data.command_pool, command_buffers);
    device.destroy_buffer(staging_buffer, None);
    device.free_memory(staging_memory, None);

    Ok((buffer, buffer_memory))
}

/// Uploads the mesh's three vertex streams and its index buffer. The shadow
/// pipeline binds only the position stream; the scene pipeline binds all
/// three over the same indices.
pub unsafe fn create_geometry_buffers(
    instance: &Instance,
    device: &Device,
    data: &mut AppData,
    mesh: &Mesh,
) -> Result<()> {
    let (buffer, memory) = upload_to_device_buffer(
        instance,
        device,
        data,
        as_bytes(&mesh.positions),
        vk::BufferUsageFlags::VERTEX_BUFFER,
    )?;
    data.position_buffer = buffer;
    data.position_buffer_memory = memory;

    let (buffer, memory) = upload_to_device_buffer(
        instance,
        device,
        data,
        as_bytes(&mesh.normals),
        vk::BufferUsageFlags::VERTEX_BUFFER,
    )?;
    data.normal_buffer = buffer;
    data.normal_buffer_memory = memory;

    let (buffer, memory) = upload_to_device_buffer(
        instance,
        device,
        data,
        as_bytes(&mesh.material_indices),
        vk::BufferUsageFlags::VERTEX_BUFFER,
    )?;
    data.material_index_buffer = buffer;
    data.material_index_buffer_memory = memory;

    let (buffer, memory) = upload_to_device_buffer(
        instance,
        device,
        data,
        as_bytes(&mesh.indices),
        vk::BufferUsageFlags::INDEX_BUFFER,
    )?;
    data.index_buffer = buffer;
    data.index_buffer_memory = memory;

    Ok(())
}

pub unsafe fn create_command_buffers(device: &Device, data: &mut AppData) -> Result<()> {
    let info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(data.command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(data.framebuffers.len() as u32);
    data.command_buffers = device.allocate_command_buffers(&info)?;
    Ok(())
}

unsafe fn transition_shadow_texture(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
) {
    // All six faces move in one barrier.
    let subresource_range = vk::ImageSubresourceRange::builder()
        .aspect_mask(vk::ImageAspectFlags::DEPTH)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(6);
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    device.cmd_pipeline_barrier(
        command_buffer,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[] as &[vk::MemoryBarrier],
        &[] as &[vk::BufferMemoryBarrier],
        &[barrier],
    );
}

/// Bakes the whole frame once per swapchain image: six shadow face passes,
/// a barrier making the cube sampleable, the lit scene pass, and a barrier
/// handing the cube back to the next frame's shadow pass. Valid only because
/// geometry, light and camera stay fixed between swapchain rebuilds.
pub unsafe fn record_command_buffers(device: &Device, data: &mut AppData, mesh: &Mesh) -> Result<()> {
    let face_transforms =
        shadow_face_transforms(light_position(), SHADOW_NEAR_PLANE, SHADOW_FAR_PLANE);

    for i in 0..data.command_buffers.len() {
        let command_buffer = data.command_buffers[i];

        let begin_info = vk::CommandBufferBeginInfo::builder();
        device.begin_command_buffer(command_buffer, &begin_info)?;

        record_shadow_passes(device, data, command_buffer, i, &face_transforms, mesh);

        transition_shadow_texture(
            device,
            command_buffer,
            data.shadow_frames[i].texture,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        );

        record_scene_pass(device, data, command_buffer, i, mesh);

        transition_shadow_texture(
            device,
            command_buffer,
            data.shadow_frames[i].texture,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        );

        device.end_command_buffer(command_buffer)?;
    }

    Ok(())
}

unsafe fn record_shadow_passes(
    device: &Device,
    data: &AppData,
    command_buffer: vk::CommandBuffer,
    image_index: usize,
    face_transforms: &[glm::Mat4; 6],
    mesh: &Mesh,
) {
    let clear_values = &[vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
    }];
    let render_area = vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent: vk::Extent2D { width: SHADOW_MAP_SIZE, height: SHADOW_MAP_SIZE },
    };

    for face in 0..6 {
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(data.shadow_render_pass)
            .framebuffer(data.shadow_frames[image_index].framebuffers[face])
            .render_area(render_area)
            .clear_values(clear_values);

        device.cmd_begin_render_pass(command_buffer, &info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            data.shadow_pipeline,
        );

        let transform_bytes = std::slice::from_raw_parts(
            &face_transforms[face] as *const glm::Mat4 as *const u8,
            size_of::<glm::Mat4>(),
        );
        device.cmd_push_constants(
            command_buffer,
            data.shadow_pipeline_layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            transform_bytes,
        );

        device.cmd_bind_vertex_buffers(command_buffer, 0, &[data.position_buffer], &[0]);
        device.cmd_bind_index_buffer(command_buffer, data.index_buffer, 0, vk::IndexType::UINT16);
        device.cmd_draw_indexed(command_buffer, mesh.indices.len() as u32, 1, 0, 0, 0);

        device.cmd_end_render_pass(command_buffer);
    }
}

unsafe fn record_scene_pass(
    device: &Device,
    data: &AppData,
    command_buffer: vk::CommandBuffer,
    image_index: usize,
    mesh: &Mesh,
) {
    let clear_values = &[
        vk::ClearValue {
            color: vk::ClearColorValue { float32: [0.0, 0.0, 0.0, 1.0] },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ];
    let render_area = vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent: data.swapchain_extent,
    };

    let info = vk::RenderPassBeginInfo::builder()
        .render_pass(data.render_pass)
        .framebuffer(data.framebuffers[image_index])
        .render_area(render_area)
        .clear_values(clear_values);

    device.cmd_begin_render_pass(command_buffer, &info, vk::SubpassContents::INLINE);
    device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, data.pipeline);
    device.cmd_bind_descriptor_sets(
        command_buffer,
        vk::PipelineBindPoint::GRAPHICS,
        data.pipeline_layout,
        0,
        &[data.descriptor_sets[image_index]],
        &[],
    );

    device.cmd_bind_vertex_buffers(
        command_buffer,
        0,
        &[data.position_buffer, data.normal_buffer, data.material_index_buffer],
        &[0, 0, 0],
    );
    device.cmd_bind_index_buffer(command_buffer, data.index_buffer, 0, vk::IndexType::UINT16);
    device.cmd_draw_indexed(command_buffer, mesh.indices.len() as u32, 1, 0, 0, 0);

    device.cmd_end_render_pass(command_buffer);
}
