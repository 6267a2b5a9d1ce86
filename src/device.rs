use anyhow::{anyhow, Result};
use log::*;
use std::collections::HashSet;
use thiserror::Error;
use vulkanalia::vk::{KhrSurfaceExtension};
use vulkanalia::{prelude::v1_0::*, vk::PhysicalDevice};

use crate::appdata::AppData;
use crate::config::*;
use crate::swapchain::SwapchainSupport;

#[derive(Debug, Error)]
#[error("Missing {0}")]
pub struct SuitabilityError(pub &'static str);

#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    pub unsafe fn get(instance: &Instance, data: &AppData, pdev: PhysicalDevice) -> Result<Self> {
        let props = instance.get_physical_device_queue_family_properties(pdev);
        let graphics = props.iter()
            .position(|x| x.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|x| x as u32);
        let mut present = None;
        for (index, _) in props.iter().enumerate() {
            if instance.get_physical_device_surface_support_khr(pdev, index as u32, data.surface)? {
                present = Some(index as u32);
                break;
            }
        }
        if let (Some(graphics), Some(present)) = (graphics, present) {
            Ok(Self { graphics, present })
        } else {
            Err(anyhow!(SuitabilityError("required queue families")))
        }
    }
}

pub unsafe fn pick_physical_device(instance: &Instance, data: &mut AppData) -> Result<()> {
    for pdev in instance.enumerate_physical_devices()? {
        let prop = instance.get_physical_device_properties(pdev);
        if let Err(error) = check_physical_device(instance, data, pdev) {
            warn!("Skipping physical device (`{}`): {}", prop.device_name, error);
        } else {
            info!("Selected physical device (`{}`).", prop.device_name);
            let indices = QueueFamilyIndices::get(instance, data, pdev)?;
            data.physical_device = pdev;
            data.graphics_queue_index = indices.graphics;
            data.present_queue_index = indices.present;
            data.msaa_samples = get_max_msaa_samples(instance, pdev);
            return Ok(());
        }
    }
    Err(anyhow!("Failed to find suitable physical device."))
}

unsafe fn check_physical_device(instance: &Instance, data: &AppData, pdev: PhysicalDevice) -> Result<()> {
    QueueFamilyIndices::get(instance, data, pdev)?;
    check_physical_device_extensions(instance, pdev)?;

    let support = SwapchainSupport::get(instance, data, pdev)?;
    if support.formats.is_empty() || support.present_modes.is_empty() {
        return Err(anyhow!(SuitabilityError("swapchain support")));
    }

    let features = instance.get_physical_device_features(pdev);
    if features.sampler_anisotropy != vk::TRUE {
        return Err(anyhow!(SuitabilityError("sampler anisotropy")));
    }

    Ok(())
}

unsafe fn check_physical_device_extensions(instance: &Instance, pdev: PhysicalDevice) -> Result<()> {
    let extensions = instance
        .enumerate_device_extension_properties(pdev, None)?
        .iter()
        .map(|e| e.extension_name)
        .collect::<HashSet<_>>();
    if DEVICE_EXTENSIONS.iter().all(|e| extensions.contains(e)) {
        Ok(())
    } else {
        Err(anyhow!(SuitabilityError("required device extensions")))
    }
}

pub unsafe fn create_logical_device(instance: &Instance, data: &mut AppData) -> Result<Device> {
    let mut unique_indices = HashSet::new();
    unique_indices.insert(data.graphics_queue_index);
    unique_indices.insert(data.present_queue_index);

    let queue_priorities = &[1.0];
    let queue_infos = unique_indices
        .iter()
        .map(|i| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(*i)
                .queue_priorities(queue_priorities)
        })
        .collect::<Vec<_>>();

    let layers = if VALIDATION_ENABLED {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    };

    let mut extensions = DEVICE_EXTENSIONS.iter().map(|n| n.as_ptr()).collect::<Vec<_>>();
    if cfg!(target_os = "macos") {
        extensions.push(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name.as_ptr());
    }

    let features = vk::PhysicalDeviceFeatures::builder()
        .sampler_anisotropy(true);

    let info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_infos)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);
    let device = instance.create_device(data.physical_device, &info, None)?;

    data.graphics_queue = device.get_device_queue(data.graphics_queue_index, 0);
    data.present_queue = device.get_device_queue(data.present_queue_index, 0);

    Ok(device)
}

/// Picks the highest sample count supported by both the color and depth
/// framebuffer paths, preferring 4x over 2x over no multisampling.
pub unsafe fn get_max_msaa_samples(instance: &Instance, pdev: PhysicalDevice) -> vk::SampleCountFlags {
    let props = instance.get_physical_device_properties(pdev);
    let counts = props.limits.framebuffer_color_sample_counts
        & props.limits.framebuffer_depth_sample_counts;
    pick_msaa_samples(counts)
}

pub fn pick_msaa_samples(counts: vk::SampleCountFlags) -> vk::SampleCountFlags {
    [vk::SampleCountFlags::_4, vk::SampleCountFlags::_2]
        .iter()
        .cloned()
        .find(|c| counts.contains(*c))
        .unwrap_or(vk::SampleCountFlags::_1)
}

pub unsafe fn get_supported_format(
    instance: &Instance,
    data: &AppData,
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> Result<vk::Format> {
    candidates
        .iter()
        .cloned()
        .find(|f| {
            let properties = instance.get_physical_device_format_properties(data.physical_device, *f);
            match tiling {
                vk::ImageTiling::LINEAR => properties.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => properties.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| anyhow!(SuitabilityError("supported format")))
}

/// Depth format search, descending precision.
pub unsafe fn get_depth_format(instance: &Instance, data: &AppData) -> Result<vk::Format> {
    let candidates = &[
        vk::Format::D32_SFLOAT,
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D24_UNORM_S8_UINT,
    ];
    get_supported_format(
        instance,
        data,
        candidates,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

/// The selected index must be set in `type_bits` and carry every requested
/// property flag. No approximate fallback: a miss is a miss.
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory.memory_type_count).find(|i| {
        let suitable = (type_bits & (1 << i)) != 0;
        let memory_type = memory.memory_types[*i as usize];
        suitable && memory_type.property_flags.contains(properties)
    })
}

pub unsafe fn get_memory_type_index(
    instance: &Instance,
    data: &AppData,
    properties: vk::MemoryPropertyFlags,
    requirements: vk::MemoryRequirements,
) -> Result<u32> {
    let memory = instance.get_physical_device_memory_properties(data.physical_device);
    find_memory_type(&memory, requirements.memory_type_bits, properties)
        .ok_or_else(|| anyhow!(SuitabilityError("suitable memory type")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties::default();
        memory.memory_type_count = flags.len() as u32;
        for (i, f) in flags.iter().enumerate() {
            memory.memory_types[i].property_flags = *f;
        }
        memory
    }

    #[test]
    fn memory_type_respects_bitmask_and_properties() {
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Type 0 carries the right properties but is masked out.
        let found = find_memory_type(&memory, 0b110, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert_eq!(found, Some(2));

        let found = find_memory_type(
            &memory,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(found, Some(1));
    }

    #[test]
    fn memory_type_requires_property_superset() {
        let memory = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let found = find_memory_type(
            &memory,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert_eq!(found, None);
    }

    #[test]
    fn memory_type_reports_failure_instead_of_approximating() {
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        let found = find_memory_type(&memory, 0b01, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(found, None);
    }

    #[test]
    fn msaa_prefers_four_then_two_then_one() {
        let all = vk::SampleCountFlags::_1 | vk::SampleCountFlags::_2 | vk::SampleCountFlags::_4;
        assert_eq!(pick_msaa_samples(all), vk::SampleCountFlags::_4);

        let two = vk::SampleCountFlags::_1 | vk::SampleCountFlags::_2;
        assert_eq!(pick_msaa_samples(two), vk::SampleCountFlags::_2);

        assert_eq!(pick_msaa_samples(vk::SampleCountFlags::_1), vk::SampleCountFlags::_1);
    }
}
