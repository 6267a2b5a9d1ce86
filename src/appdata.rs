use vulkanalia::prelude::v1_0::*;

/// The Vulkan handles and associated properties used by our Vulkan app.
#[derive(Clone, Debug, Default)]
pub struct AppData {
    pub messenger: vk::DebugUtilsMessengerEXT,
    pub surface: vk::SurfaceKHR,
    pub physical_device: vk::PhysicalDevice,
    pub graphics_queue_index: u32,
    pub present_queue_index: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub msaa_samples: vk::SampleCountFlags,
    pub swapchain_format: vk::Format,
    pub swapchain_extent: vk::Extent2D,
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_image_views: Vec<vk::ImageView>,
    // Scene pass. The color image is the multisampled target that resolves
    // into the swapchain image; the depth image matches its sample count.
    pub render_pass: vk::RenderPass,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub color_image: vk::Image,
    pub color_image_memory: vk::DeviceMemory,
    pub color_image_view: vk::ImageView,
    pub depth_image: vk::Image,
    pub depth_image_memory: vk::DeviceMemory,
    pub depth_image_view: vk::ImageView,
    pub framebuffers: Vec<vk::Framebuffer>,
    // Shadow pass. One cube depth texture per swapchain image, rendered face
    // by face and sampled by the scene pass of the same frame.
    pub shadow_render_pass: vk::RenderPass,
    pub shadow_pipeline_layout: vk::PipelineLayout,
    pub shadow_pipeline: vk::Pipeline,
    pub shadow_frames: Vec<ShadowFrame>,
    pub shadow_sampler: vk::Sampler,
    pub command_pool: vk::CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub vert_ubo_buffers: Vec<vk::Buffer>,
    pub vert_ubo_buffers_memory: Vec<vk::DeviceMemory>,
    pub frag_ubo_buffers: Vec<vk::Buffer>,
    pub frag_ubo_buffers_memory: Vec<vk::DeviceMemory>,
    // Geometry streams, device-local, uploaded once at startup.
    pub position_buffer: vk::Buffer,
    pub position_buffer_memory: vk::DeviceMemory,
    pub normal_buffer: vk::Buffer,
    pub normal_buffer_memory: vk::DeviceMemory,
    pub material_index_buffer: vk::Buffer,
    pub material_index_buffer_memory: vk::DeviceMemory,
    pub index_buffer: vk::Buffer,
    pub index_buffer_memory: vk::DeviceMemory,
    pub image_ready_semaphores: Vec<vk::Semaphore>,
    pub render_complete_semaphores: Vec<vk::Semaphore>,
    pub frame_ready_fences: Vec<vk::Fence>,
    pub images_in_flight: Vec<vk::Fence>,
}

/// Shadow resources owned by one swapchain image: the 6-layer cube depth
/// texture, one attachment view and framebuffer per face, and the cube view
/// the scene pass samples from.
#[derive(Clone, Debug, Default)]
pub struct ShadowFrame {
    pub texture: vk::Image,
    pub texture_memory: vk::DeviceMemory,
    pub face_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub cube_view: vk::ImageView,
}
