use anyhow::Result;
use vulkanalia::prelude::v1_0::*;

use crate::appdata::{AppData, ShadowFrame};
use crate::config::SHADOW_MAP_SIZE;
use crate::device::{get_depth_format, get_memory_type_index};

/// Create a buffer and bind freshly allocated memory of the requested kind.
pub unsafe fn create_buffer(
    instance: &Instance,
    device: &Device,
    data: &AppData,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = device.create_buffer(&buffer_info, None)?;

    let requirements = device.get_buffer_memory_requirements(buffer);
    let memory_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(get_memory_type_index(instance, data, properties, requirements)?);
    let memory = device.allocate_memory(&memory_info, None)?;
    device.bind_buffer_memory(buffer, memory, 0)?;

    Ok((buffer, memory))
}

pub unsafe fn create_image(
    instance: &Instance,
    device: &Device,
    data: &AppData,
    width: u32,
    height: u32,
    array_layers: u32,
    samples: vk::SampleCountFlags,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    flags: vk::ImageCreateFlags,
    properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Image, vk::DeviceMemory)> {
    let info = vk::ImageCreateInfo::builder()
        .flags(flags)
        .image_type(vk::ImageType::_2D)
        .extent(vk::Extent3D { width, height, depth: 1 })
        .mip_levels(1)
        .array_layers(array_layers)
        .format(format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(usage)
        .samples(samples)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let image = device.create_image(&info, None)?;

    let requirements = device.get_image_memory_requirements(image);
    let memory_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(get_memory_type_index(instance, data, properties, requirements)?);
    let memory = device.allocate_memory(&memory_info, None)?;
    device.bind_image_memory(image, memory, 0)?;

    Ok((image, memory))
}

pub unsafe fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspects: vk::ImageAspectFlags,
    view_type: vk::ImageViewType,
    base_array_layer: u32,
    layer_count: u32,
) -> Result<vk::ImageView> {
    let subresource_range = vk::ImageSubresourceRange::builder()
        .aspect_mask(aspects)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(base_array_layer)
        .layer_count(layer_count);
    let info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(view_type)
        .format(format)
        .subresource_range(subresource_range);
    Ok(device.create_image_view(&info, None)?)
}

/// The multisampled color target the scene pass renders into before
/// resolving to the swapchain image. Transient: never stored to memory on
/// tilers.
pub unsafe fn create_color_objects(
    instance: &Instance,
    device: &Device,
    data: &mut AppData,
) -> Result<()> {
    let (color_image, color_image_memory) = create_image(
        instance,
        device,
        data,
        data.swapchain_extent.width,
        data.swapchain_extent.height,
        1,
        data.msaa_samples,
        data.swapchain_format,
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
        vk::ImageCreateFlags::empty(),
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    data.color_image = color_image;
    data.color_image_memory = color_image_memory;
    data.color_image_view = create_image_view(
        device,
        color_image,
        data.swapchain_format,
        vk::ImageAspectFlags::COLOR,
        vk::ImageViewType::_2D,
        0,
        1,
    )?;
    Ok(())
}

pub unsafe fn create_depth_objects(
    instance: &Instance,
    device: &Device,
    data: &mut AppData,
) -> Result<()> {
    let format = get_depth_format(instance, data)?;
    let (depth_image, depth_image_memory) = create_image(
        instance,
        device,
        data,
        data.swapchain_extent.width,
        data.swapchain_extent.height,
        1,
        data.msaa_samples,
        format,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        vk::ImageCreateFlags::empty(),
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    data.depth_image = depth_image;
    data.depth_image_memory = depth_image_memory;
    data.depth_image_view = create_image_view(
        device,
        depth_image,
        format,
        vk::ImageAspectFlags::DEPTH,
        vk::ImageViewType::_2D,
        0,
        1,
    )?;
    Ok(())
}

/// Scene framebuffers: {MSAA color, depth, resolve} where the resolve target
/// is the matching swapchain image view.
pub unsafe fn create_framebuffers(device: &Device, data: &mut AppData) -> Result<()> {
    data.framebuffers = data
        .swapchain_image_views
        .iter()
        .map(|i| {
            let attachments = &[data.color_image_view, data.depth_image_view, *i];
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(data.render_pass)
                .attachments(attachments)
                .width(data.swapchain_extent.width)
                .height(data.swapchain_extent.height)
                .layers(1);
            device.create_framebuffer(&info, None)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(())
}

/// Per swapchain image: a 6-layer cube-compatible depth texture, one
/// attachment view and framebuffer per face, and the cube view sampled by
/// the scene pass.
pub unsafe fn create_shadow_frames(
    instance: &Instance,
    device: &Device,
    data: &mut AppData,
) -> Result<()> {
    let format = get_depth_format(instance, data)?;

    let mut frames = Vec::with_capacity(data.swapchain_images.len());
    for _ in 0..data.swapchain_images.len() {
        let (texture, texture_memory) = create_image(
            instance,
            device,
            data,
            SHADOW_MAP_SIZE,
            SHADOW_MAP_SIZE,
            6,
            vk::SampleCountFlags::_1,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            vk::ImageCreateFlags::CUBE_COMPATIBLE,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let mut face_views = Vec::with_capacity(6);
        let mut framebuffers = Vec::with_capacity(6);
        for face in 0..6 {
            let view = create_image_view(
                device,
                texture,
                format,
                vk::ImageAspectFlags::DEPTH,
                vk::ImageViewType::_2D,
                face,
                1,
            )?;
            face_views.push(view);

            let attachments = &[view];
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(data.shadow_render_pass)
                .attachments(attachments)
                .width(SHADOW_MAP_SIZE)
                .height(SHADOW_MAP_SIZE)
                .layers(1);
            framebuffers.push(device.create_framebuffer(&info, None)?);
        }

        let cube_view = create_image_view(
            device,
            texture,
            format,
            vk::ImageAspectFlags::DEPTH,
            vk::ImageViewType::CUBE,
            0,
            6,
        )?;

        frames.push(ShadowFrame {
            texture,
            texture_memory,
            face_views,
            framebuffers,
            cube_view,
        });
    }

    data.shadow_frames = frames;
    Ok(())
}

pub unsafe fn destroy_shadow_frames(device: &Device, data: &mut AppData) {
    for frame in &data.shadow_frames {
        device.destroy_image_view(frame.cube_view, None);
        frame.framebuffers.iter().for_each(|f| device.destroy_framebuffer(*f, None));
        frame.face_views.iter().for_each(|v| device.destroy_image_view(*v, None));
        device.destroy_image(frame.texture, None);
        device.free_memory(frame.texture_memory, None);
    }
    data.shadow_frames.clear();
}
