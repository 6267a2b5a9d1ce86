use anyhow::Result;
use log::*;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{KhrSurfaceExtension, KhrSwapchainExtension};
use winit::window::Window;

use crate::appdata::AppData;

#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn get(
        instance: &Instance,
        data: &AppData,
        pdev: vk::PhysicalDevice,
    ) -> Result<Self> {
        Ok(Self {
            capabilities: instance
                .get_physical_device_surface_capabilities_khr(pdev, data.surface)?,
            formats: instance
                .get_physical_device_surface_formats_khr(pdev, data.surface)?,
            present_modes: instance
                .get_physical_device_surface_present_modes_khr(pdev, data.surface)?,
        })
    }
}

/// 8-bit BGRA sRGB with the sRGB-nonlinear color space when offered, else
/// whatever the surface lists first.
pub fn get_swapchain_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .cloned()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or_else(|| formats[0])
}

/// Mailbox when available, else FIFO which every surface guarantees.
pub fn get_swapchain_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .cloned()
        .find(|m| *m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's current extent, unless it reports the "inherit" sentinel, in
/// which case the framebuffer pixel size clamped to the surface bounds.
pub fn get_swapchain_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    fb_width: u32,
    fb_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D::builder()
            .width(fb_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ))
            .height(fb_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ))
            .build()
    }
}

/// One more than the minimum to reduce stalling, capped at the maximum.
pub fn get_swapchain_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    std::cmp::min(
        capabilities.min_image_count + 1,
        capabilities.max_image_count,
    )
}

pub unsafe fn create_swapchain(
    window: &Window,
    instance: &Instance,
    device: &Device,
    data: &mut AppData,
) -> Result<()> {
    let support = SwapchainSupport::get(instance, data, data.physical_device)?;

    let surface_format = get_swapchain_surface_format(&support.formats);
    let present_mode = get_swapchain_present_mode(&support.present_modes);
    let size = window.inner_size();
    let extent = get_swapchain_extent(&support.capabilities, size.width, size.height);
    let image_count = get_swapchain_image_count(&support.capabilities);

    debug!(
        "Swapchain: {:?} / {:?}, {}x{}, {} images.",
        surface_format.format, present_mode, extent.width, extent.height, image_count
    );

    // Concurrent sharing is only worth its ownership-transfer cost when the
    // graphics and present families actually differ.
    let indices = &[data.graphics_queue_index, data.present_queue_index];
    let mut info = vk::SwapchainCreateInfoKHR::builder()
        .surface(data.surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(vk::SwapchainKHR::null());
    if data.graphics_queue_index != data.present_queue_index {
        info = info
            .image_sharing_mode(vk::SharingMode::CONCURRENT)
            .queue_family_indices(indices);
    } else {
        info = info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
    }

    data.swapchain = device.create_swapchain_khr(&info, None)?;
    data.swapchain_format = surface_format.format;
    data.swapchain_extent = extent;
    data.swapchain_images = device.get_swapchain_images_khr(data.swapchain)?;

    Ok(())
}

pub unsafe fn create_swapchain_image_views(device: &Device, data: &mut AppData) -> Result<()> {
    data.swapchain_image_views = data
        .swapchain_images
        .iter()
        .map(|i| {
            let subresource_range = vk::ImageSubresourceRange::builder()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1);
            let info = vk::ImageViewCreateInfo::builder()
                .image(*i)
                .view_type(vk::ImageViewType::_2D)
                .format(data.swapchain_format)
                .subresource_range(subresource_range);
            device.create_image_view(&info, None)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        let mut capabilities = vk::SurfaceCapabilitiesKHR::default();
        capabilities.current_extent = vk::Extent2D { width: current.0, height: current.1 };
        capabilities.min_image_extent = vk::Extent2D { width: min.0, height: min.1 };
        capabilities.max_image_extent = vk::Extent2D { width: max.0, height: max.1 };
        capabilities
    }

    #[test]
    fn extent_uses_surface_extent_when_defined() {
        let capabilities = capabilities((800, 600), (1, 1), (4096, 4096));
        let extent = get_swapchain_extent(&capabilities, 1024, 768);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_clamps_framebuffer_size_on_inherit_sentinel() {
        let capabilities = capabilities((u32::MAX, u32::MAX), (100, 100), (4000, 4000));
        let extent = get_swapchain_extent(&capabilities, 50, 6000);
        assert_eq!((extent.width, extent.height), (100, 4000));
    }

    #[test]
    fn image_count_is_one_over_minimum_capped_at_maximum() {
        let mut capabilities = vk::SurfaceCapabilitiesKHR::default();
        capabilities.min_image_count = 2;
        capabilities.max_image_count = 8;
        assert_eq!(get_swapchain_image_count(&capabilities), 3);

        capabilities.min_image_count = 3;
        capabilities.max_image_count = 3;
        assert_eq!(get_swapchain_image_count(&capabilities), 3);
    }

    #[test]
    fn surface_format_prefers_bgra_srgb() {
        let linear = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };

        let chosen = get_swapchain_surface_format(&[linear, srgb]);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);

        let chosen = get_swapchain_surface_format(&[linear]);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn present_mode_prefers_mailbox_falls_back_to_fifo() {
        let modes = &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(get_swapchain_present_mode(modes), vk::PresentModeKHR::MAILBOX);

        let modes = &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(get_swapchain_present_mode(modes), vk::PresentModeKHR::FIFO);
    }
}
