use std::collections::HashSet;

use anyhow::{anyhow, Result};
use log::*;
use nalgebra_glm as glm;
use vulkanalia::loader::{LibloadingLoader, LIBRARY};
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{ExtDebugUtilsExtension, ExtensionName, InstanceCreateFlags,
    KhrSurfaceExtension, KhrSwapchainExtension};
use vulkanalia::window as vk_window;
use winit::window::Window;

use crate::appdata::AppData;
use crate::callback::debug_callback;
use crate::camera::Camera;
use crate::commands::{create_command_buffers, create_command_pool, create_geometry_buffers,
    record_command_buffers};
use crate::config::*;
use crate::descriptors::{create_descriptor_pool, create_descriptor_sets, create_shadow_sampler};
use crate::device::{create_logical_device, pick_physical_device};
use crate::model::Mesh;
use crate::pipeline::{create_descriptor_set_layout, create_pipeline, create_pipeline_layouts,
    create_render_pass, create_shadow_pipeline, create_shadow_render_pass};
use crate::swapchain::{create_swapchain, create_swapchain_image_views};
use crate::targets::{create_color_objects, create_depth_objects, create_framebuffers,
    create_shadow_frames, destroy_shadow_frames};

/// Our Vulkan app.
#[derive(Clone, Debug)]
pub struct App {
    entry: Entry,
    instance: Instance,
    data: AppData,
    device: Device,
    frame: usize,
    /// Set by the event loop when the window reports a new size; folded into
    /// the next frame's present check.
    pub resized: bool,
    mesh: Mesh,
    camera: Camera,
}

impl App {
    /// Creates our Vulkan app.
    pub unsafe fn create(window: &Window) -> Result<Self> {
        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;
        let mut data = AppData::default();
        let instance = create_instance(window, &entry, &mut data)?;
        data.surface = vk_window::create_surface(&instance, window, window)?;
        pick_physical_device(&instance, &mut data)?;
        let device = create_logical_device(&instance, &mut data)?;

        let mesh = Mesh::load(MODEL_PATH)?;
        info!(
            "Loaded `{}`: {} vertices, {} triangles, {} materials.",
            MODEL_PATH,
            mesh.positions.len(),
            mesh.indices.len() / 3,
            mesh.materials.len()
        );
        let camera = Camera::new(glm::vec3(0.0, 1.0, 3.5));

        create_swapchain(window, &instance, &device, &mut data)?;
        create_swapchain_image_views(&device, &mut data)?;
        // Layouts and the sampler outlive swapchain rebuilds.
        create_descriptor_set_layout(&device, &mut data)?;
        create_pipeline_layouts(&device, &mut data)?;
        create_shadow_sampler(&instance, &device, &mut data)?;
        create_render_pass(&instance, &device, &mut data)?;
        create_shadow_render_pass(&instance, &device, &mut data)?;
        create_pipeline(&device, &mut data)?;
        create_shadow_pipeline(&device, &mut data)?;
        create_command_pool(&device, &mut data)?;
        create_color_objects(&instance, &device, &mut data)?;
        create_depth_objects(&instance, &device, &mut data)?;
        create_framebuffers(&device, &mut data)?;
        create_shadow_frames(&instance, &device, &mut data)?;
        create_geometry_buffers(&instance, &device, &mut data, &mesh)?;
        create_descriptor_pool(&device, &mut data)?;
        create_descriptor_sets(&instance, &device, &mut data, &mesh, &camera)?;
        create_command_buffers(&device, &mut data)?;
        record_command_buffers(&device, &mut data, &mesh)?;
        create_sync_objects(&device, &mut data)?;

        Ok(Self {
            entry,
            instance,
            data,
            device,
            frame: 0,
            resized: false,
            mesh,
            camera,
        })
    }

    /// Renders a frame for our Vulkan app.
    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        // Bound concurrent work to the in-flight ring: block until this
        // slot's previous frame has fully retired.
        let frame_ready_fence = self.data.frame_ready_fences[self.frame];
        self.device.wait_for_fences(&[frame_ready_fence], true, u64::MAX)?;

        let result = self.device.acquire_next_image_khr(
            self.data.swapchain,
            u64::MAX,
            self.data.image_ready_semaphores[self.frame],
            vk::Fence::null(),
        );
        let image_index = match result {
            Ok((image_index, _)) => image_index as usize,
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => return self.recreate_swapchain(window),
            Err(e) => return Err(anyhow!(e)),
        };

        // A different slot may still be rendering into this image when the
        // slot ring and image chain differ in length.
        let image_in_flight = self.data.images_in_flight[image_index];
        if !image_in_flight.is_null() && image_in_flight != frame_ready_fence {
            self.device.wait_for_fences(&[image_in_flight], true, u64::MAX)?;
        }
        self.data.images_in_flight[image_index] = frame_ready_fence;
        self.device.reset_fences(&[frame_ready_fence])?;

        let wait_semaphores = &[self.data.image_ready_semaphores[self.frame]];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[self.data.command_buffers[image_index]];
        let signal_semaphores = &[self.data.render_complete_semaphores[self.frame]];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);
        self.device.queue_submit(self.data.graphics_queue, &[submit_info], frame_ready_fence)?;

        let swapchains = &[self.data.swapchain];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(signal_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);
        let result = self.device.queue_present_khr(self.data.present_queue, &present_info);

        // A resize observed by the event loop converges on the same
        // recreation path as a stale present result.
        let changed = result == Ok(vk::SuccessCode::SUBOPTIMAL_KHR)
            || result == Err(vk::ErrorCode::OUT_OF_DATE_KHR);
        if self.resized || changed {
            self.resized = false;
            return self.recreate_swapchain(window);
        } else if let Err(e) = result {
            return Err(anyhow!(e));
        }

        self.frame = (self.frame + 1) % MAX_FRAMES_IN_FLIGHT;
        Ok(())
    }

    /// Tears down everything tied to the current swapchain generation and
    /// rebuilds it at the window's current size. Layouts, the sampler, the
    /// command pool, geometry buffers and sync objects survive.
    unsafe fn recreate_swapchain(&mut self, window: &Window) -> Result<()> {
        debug!("Recreating swapchain.");
        self.device.device_wait_idle()?;
        self.destroy_swapchain();

        create_swapchain(window, &self.instance, &self.device, &mut self.data)?;
        create_swapchain_image_views(&self.device, &mut self.data)?;
        create_render_pass(&self.instance, &self.device, &mut self.data)?;
        create_shadow_render_pass(&self.instance, &self.device, &mut self.data)?;
        create_pipeline(&self.device, &mut self.data)?;
        create_shadow_pipeline(&self.device, &mut self.data)?;
        create_color_objects(&self.instance, &self.device, &mut self.data)?;
        create_depth_objects(&self.instance, &self.device, &mut self.data)?;
        create_framebuffers(&self.device, &mut self.data)?;
        create_shadow_frames(&self.instance, &self.device, &mut self.data)?;
        create_descriptor_pool(&self.device, &mut self.data)?;
        create_descriptor_sets(&self.instance, &self.device, &mut self.data, &self.mesh, &self.camera)?;
        create_command_buffers(&self.device, &mut self.data)?;
        record_command_buffers(&self.device, &mut self.data, &self.mesh)?;
        self.data.images_in_flight = self
            .data
            .swapchain_images
            .iter()
            .map(|_| vk::Fence::null())
            .collect();

        Ok(())
    }

    /// Destroys the per-generation resources, most-dependent first.
    #[rustfmt::skip]
    unsafe fn destroy_swapchain(&mut self) {
        self.device.destroy_descriptor_pool(self.data.descriptor_pool, None);
        self.data.descriptor_sets.clear();
        self.data.vert_ubo_buffers.iter().for_each(|b| self.device.destroy_buffer(*b, None));
        self.data.vert_ubo_buffers_memory.iter().for_each(|m| self.device.free_memory(*m, None));
        self.data.frag_ubo_buffers.iter().for_each(|b| self.device.destroy_buffer(*b, None));
        self.data.frag_ubo_buffers_memory.iter().for_each(|m| self.device.free_memory(*m, None));
        self.data.vert_ubo_buffers.clear();
        self.data.vert_ubo_buffers_memory.clear();
        self.data.frag_ubo_buffers.clear();
        self.data.frag_ubo_buffers_memory.clear();
        self.device.free_command_buffers(self.data.command_pool, &self.data.command_buffers);
        self.data.command_buffers.clear();
        destroy_shadow_frames(&self.device, &mut self.data);
        self.data.framebuffers.iter().for_each(|f| self.device.destroy_framebuffer(*f, None));
        self.data.framebuffers.clear();
        self.device.destroy_image_view(self.data.color_image_view, None);
        self.device.destroy_image(self.data.color_image, None);
        self.device.free_memory(self.data.color_image_memory, None);
        self.device.destroy_image_view(self.data.depth_image_view, None);
        self.device.destroy_image(self.data.depth_image, None);
        self.device.free_memory(self.data.depth_image_memory, None);
        self.device.destroy_pipeline(self.data.pipeline, None);
        self.device.destroy_pipeline(self.data.shadow_pipeline, None);
        self.device.destroy_render_pass(self.data.render_pass, None);
        self.device.destroy_render_pass(self.data.shadow_render_pass, None);
        self.data.swapchain_image_views.iter()
            .for_each(|v| self.device.destroy_image_view(*v, None));
        self.data.swapchain_image_views.clear();
        self.device.destroy_swapchain_khr(self.data.swapchain, None);
    }

    /// Destroys our Vulkan app. The caller must have idled the device.
    #[rustfmt::skip]
    pub unsafe fn destroy(&mut self) {
        self.destroy_swapchain();
        self.data.frame_ready_fences.iter().for_each(|f| self.device.destroy_fence(*f, None));
        self.data.render_complete_semaphores.iter().for_each(|s| self.device.destroy_semaphore(*s, None));
        self.data.image_ready_semaphores.iter().for_each(|s| self.device.destroy_semaphore(*s, None));
        self.device.destroy_buffer(self.data.index_buffer, None);
        self.device.free_memory(self.data.index_buffer_memory, None);
        self.device.destroy_buffer(self.data.material_index_buffer, None);
        self.device.free_memory(self.data.material_index_buffer_memory, None);
        self.device.destroy_buffer(self.data.normal_buffer, None);
        self.device.free_memory(self.data.normal_buffer_memory, None);
        self.device.destroy_buffer(self.data.position_buffer, None);
        self.device.free_memory(self.data.position_buffer_memory, None);
        self.device.destroy_sampler(self.data.shadow_sampler, None);
        self.device.destroy_pipeline_layout(self.data.pipeline_layout, None);
        self.device.destroy_pipeline_layout(self.data.shadow_pipeline_layout, None);
        self.device.destroy_descriptor_set_layout(self.data.descriptor_set_layout, None);
        self.device.destroy_command_pool(self.data.command_pool, None);
        self.device.destroy_device(None);
        if VALIDATION_ENABLED {
            self.instance.destroy_debug_utils_messenger_ext(self.data.messenger, None);
        }
        self.instance.destroy_surface_khr(self.data.surface, None);
        self.instance.destroy_instance(None);
    }

    /// accessors
    pub fn device(&mut self) -> &Device {
        &self.device
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }
}

unsafe fn create_instance(window: &Window, entry: &Entry, data: &mut AppData) -> Result<Instance> {
    // Application Info

    let application_info = vk::ApplicationInfo::builder()
        .application_name(b"Point Light Shadows (Rust)\0")
        .application_version(vk::make_version(1, 0, 0))
        .engine_name(b"No Engine\0")
        .engine_version(vk::make_version(1, 0, 0))
        .api_version(vk::make_version(1, 0, 0));

    // Layers
    let available_layers = entry
        .enumerate_instance_layer_properties()?
        .iter()
        .map(|l| l.layer_name)
        .collect::<HashSet<_>>();
    if VALIDATION_ENABLED && !available_layers.contains(&VALIDATION_LAYER) {
        return Err(anyhow!("Validation layer requested but not supported."));
    }

    let layers: Vec<*const i8> = if VALIDATION_ENABLED {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    // Extensions
    let mut extensions = vk_window::get_required_instance_extensions(window)
        .iter()
        .map(|e| e.as_ptr())
        .collect::<Vec<_>>();
    let flags = if cfg!(target_os = "macos") {
        extensions.push(ExtensionName::from_bytes(b"VK_KHR_get_physical_device_properties2").as_ptr());
        extensions.push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name.as_ptr());
        InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    } else {
        InstanceCreateFlags::empty()
    };

    if VALIDATION_ENABLED {
        extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name.as_ptr());
    }

    // Create
    let mut info = vk::InstanceCreateInfo::builder()
        .flags(flags)
        .application_info(&application_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions);

    let mut debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::all())
        .message_type(vk::DebugUtilsMessageTypeFlagsEXT::all())
        .user_callback(Some(debug_callback));

    if VALIDATION_ENABLED {
        info = info.push_next(&mut debug_info);
    }
    let instance = entry.create_instance(&info, None)?;

    // Messenger
    if VALIDATION_ENABLED {
        data.messenger = instance.create_debug_utils_messenger_ext(&debug_info, None)?;
    }
    Ok(instance)
}

unsafe fn create_sync_objects(device: &Device, data: &mut AppData) -> Result<()> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        data.image_ready_semaphores.push(device.create_semaphore(&semaphore_info, None)?);
        data.render_complete_semaphores.push(device.create_semaphore(&semaphore_info, None)?);
        data.frame_ready_fences.push(device.create_fence(&fence_info, None)?);
    }

    data.images_in_flight = data
        .swapchain_images
        .iter()
        .map(|_| vk::Fence::null())
        .collect();

    Ok(())
}
