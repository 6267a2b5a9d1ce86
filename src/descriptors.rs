use std::mem::size_of;
use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::Result;
use nalgebra_glm as glm;
use vulkanalia::prelude::v1_0::*;

use crate::appdata::AppData;
use crate::camera::Camera;
use crate::config::*;
use crate::model::Mesh;
use crate::targets::create_buffer;

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct VertexShaderUbo {
    pub model: glm::Mat4,
    pub mvp: glm::Mat4,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct MaterialUbo {
    pub ambient: glm::Vec4,
    pub diffuse: glm::Vec4,
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct FragmentShaderUbo {
    pub light_pos: glm::Vec4,
    // Near plane in x, far plane in y. The lighting shader needs them to
    // linearize sampled shadow depth.
    pub shadow_planes: glm::Vec4,
    pub materials: [MaterialUbo; MAX_MATERIALS],
}

pub fn light_position() -> glm::Vec3 {
    glm::make_vec3(&LIGHT_POSITION)
}

/// One view per cube face, in +X,-X,+Y,-Y,+Z,-Z order. The scene's
/// handedness differs from the left-handed cube face convention, so every
/// face folds in a 180 degree yaw turn about the light's vertical axis.
pub fn shadow_face_views(light: glm::Vec3) -> [glm::Mat4; 6] {
    let spin = glm::rotate(
        &glm::identity(),
        std::f32::consts::PI,
        &glm::vec3(0.0, 1.0, 0.0),
    );
    let faces = [
        (glm::vec3(1.0, 0.0, 0.0), glm::vec3(0.0, -1.0, 0.0)),
        (glm::vec3(-1.0, 0.0, 0.0), glm::vec3(0.0, -1.0, 0.0)),
        (glm::vec3(0.0, 1.0, 0.0), glm::vec3(0.0, 0.0, 1.0)),
        (glm::vec3(0.0, -1.0, 0.0), glm::vec3(0.0, 0.0, -1.0)),
        (glm::vec3(0.0, 0.0, 1.0), glm::vec3(0.0, -1.0, 0.0)),
        (glm::vec3(0.0, 0.0, -1.0), glm::vec3(0.0, -1.0, 0.0)),
    ];
    faces.map(|(direction, up)| glm::look_at(&light, &(light + direction), &up) * spin)
}

/// The full per-face view-projection set pushed to the shadow pipeline.
/// Recomputed only when descriptors are rebuilt; the light is static.
pub fn shadow_face_transforms(light: glm::Vec3, near: f32, far: f32) -> [glm::Mat4; 6] {
    let proj = glm::perspective_rh_zo(1.0, glm::radians(&glm::vec1(90.0))[0], near, far);
    shadow_face_views(light).map(|view| proj * view)
}

/// One clamp-to-edge anisotropic sampler shared by every frame's shadow cube.
pub unsafe fn create_shadow_sampler(
    instance: &Instance,
    device: &Device,
    data: &mut AppData,
) -> Result<()> {
    let properties = instance.get_physical_device_properties(data.physical_device);
    let info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .anisotropy_enable(true)
        .max_anisotropy(properties.limits.max_sampler_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_WHITE)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(1.0);
    data.shadow_sampler = device.create_sampler(&info, None)?;
    Ok(())
}

pub unsafe fn create_descriptor_pool(device: &Device, data: &mut AppData) -> Result<()> {
    let image_count = data.swapchain_images.len() as u32;

    let ubo_size = vk::DescriptorPoolSize::builder()
        .type_(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(image_count * 2);
    let sampler_size = vk::DescriptorPoolSize::builder()
        .type_(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(image_count);

    let pool_sizes = &[ubo_size, sampler_size];
    let info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(pool_sizes)
        .max_sets(image_count);
    data.descriptor_pool = device.create_descriptor_pool(&info, None)?;
    Ok(())
}

/// Allocates one set per swapchain image and fills both uniform buffers.
/// Everything written here is immutable until the next swapchain rebuild,
/// so host-visible coherent memory written once is good enough.
pub unsafe fn create_descriptor_sets(
    instance: &Instance,
    device: &Device,
    data: &mut AppData,
    mesh: &Mesh,
    camera: &Camera,
) -> Result<()> {
    let image_count = data.swapchain_images.len();
    let layouts = vec![data.descriptor_set_layout; image_count];
    let info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(data.descriptor_pool)
        .set_layouts(&layouts);
    data.descriptor_sets = device.allocate_descriptor_sets(&info)?;

    let aspect_ratio =
        data.swapchain_extent.width as f32 / data.swapchain_extent.height as f32;
    let model = glm::identity::<f32, 4>();
    let view = camera.view_mat();
    let mut proj = glm::perspective_rh_zo(
        aspect_ratio,
        glm::radians(&glm::vec1(45.0))[0],
        0.1,
        100.0,
    );
    // Vulkan clip space points Y down.
    proj[(1, 1)] *= -1.0;

    let vert_ubo = VertexShaderUbo {
        model,
        mvp: proj * view * model,
    };

    let mut frag_ubo = FragmentShaderUbo {
        light_pos: glm::vec4(LIGHT_POSITION[0], LIGHT_POSITION[1], LIGHT_POSITION[2], 0.0),
        shadow_planes: glm::vec4(SHADOW_NEAR_PLANE, SHADOW_FAR_PLANE, 0.0, 0.0),
        materials: [MaterialUbo::default(); MAX_MATERIALS],
    };
    for (i, material) in mesh.materials.iter().enumerate() {
        frag_ubo.materials[i] = MaterialUbo {
            ambient: glm::vec4(material.ambient.x, material.ambient.y, material.ambient.z, 0.0),
            diffuse: glm::vec4(material.diffuse.x, material.diffuse.y, material.diffuse.z, 0.0),
        };
    }

    data.vert_ubo_buffers.clear();
    data.vert_ubo_buffers_memory.clear();
    data.frag_ubo_buffers.clear();
    data.frag_ubo_buffers_memory.clear();

    for i in 0..image_count {
        let (vert_buffer, vert_memory) = create_buffer(
            instance,
            device,
            data,
            size_of::<VertexShaderUbo>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let memory = device.map_memory(
            vert_memory,
            0,
            size_of::<VertexShaderUbo>() as u64,
            vk::MemoryMapFlags::empty(),
        )?;
        memcpy(&vert_ubo, memory.cast(), 1);
        device.unmap_memory(vert_memory);
        data.vert_ubo_buffers.push(vert_buffer);
        data.vert_ubo_buffers_memory.push(vert_memory);

        let (frag_buffer, frag_memory) = create_buffer(
            instance,
            device,
            data,
            size_of::<FragmentShaderUbo>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let memory = device.map_memory(
            frag_memory,
            0,
            size_of::<FragmentShaderUbo>() as u64,
            vk::MemoryMapFlags::empty(),
        )?;
        memcpy(&frag_ubo, memory.cast(), 1);
        device.unmap_memory(frag_memory);
        data.frag_ubo_buffers.push(frag_buffer);
        data.frag_ubo_buffers_memory.push(frag_memory);

        let vert_info = vk::DescriptorBufferInfo::builder()
            .buffer(vert_buffer)
            .offset(0)
            .range(size_of::<VertexShaderUbo>() as u64);
        let frag_info = vk::DescriptorBufferInfo::builder()
            .buffer(frag_buffer)
            .offset(0)
            .range(size_of::<FragmentShaderUbo>() as u64);
        let shadow_info = vk::DescriptorImageInfo::builder()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(data.shadow_frames[i].cube_view)
            .sampler(data.shadow_sampler);

        let vert_infos = &[vert_info];
        let frag_infos = &[frag_info];
        let shadow_infos = &[shadow_info];
        let vert_write = vk::WriteDescriptorSet::builder()
            .dst_set(data.descriptor_sets[i])
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(vert_infos);
        let frag_write = vk::WriteDescriptorSet::builder()
            .dst_set(data.descriptor_sets[i])
            .dst_binding(1)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(frag_infos);
        let shadow_write = vk::WriteDescriptorSet::builder()
            .dst_set(data.descriptor_sets[i])
            .dst_binding(2)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(shadow_infos);

        device.update_descriptor_sets(
            &[vert_write, frag_write, shadow_write],
            &[] as &[vk::CopyDescriptorSet],
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_blocks_match_std140_sizes() {
        assert_eq!(size_of::<VertexShaderUbo>(), 128);
        assert_eq!(size_of::<MaterialUbo>(), 32);
        assert_eq!(size_of::<FragmentShaderUbo>(), 32 + MAX_MATERIALS * 32);
    }

    #[test]
    fn shadow_views_center_on_the_light() {
        let light = light_position();
        for view in shadow_face_views(light) {
            let centered = view * glm::vec4(light.x, light.y, light.z, 1.0);
            assert!(centered.x.abs() < 1e-5);
            assert!(centered.y.abs() < 1e-5);
            assert!(centered.z.abs() < 1e-5);
        }
    }

    #[test]
    fn shadow_transform_set_covers_six_distinct_faces() {
        let transforms =
            shadow_face_transforms(light_position(), SHADOW_NEAR_PLANE, SHADOW_FAR_PLANE);
        assert_eq!(transforms.len(), 6);
        for (i, a) in transforms.iter().enumerate() {
            assert!(a.iter().all(|v| v.is_finite()));
            for b in transforms.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn opposite_faces_look_along_opposite_axes() {
        let light = light_position();
        let views = shadow_face_views(light);

        // A point ahead of the +X face must sit on the view -Z axis; the
        // same point seen from the -X face lands behind it. The yaw spin
        // flips which world axis that is, but the opposition must hold.
        let probe = light + glm::vec3(1.0, 0.0, 0.0);
        let probe = glm::vec4(probe.x, probe.y, probe.z, 1.0);
        let from_pos_x = views[0] * probe;
        let from_neg_x = views[1] * probe;
        assert!((from_pos_x.z + from_neg_x.z).abs() < 1e-5);
        assert!(from_pos_x.z.abs() > 0.5);
    }
}
