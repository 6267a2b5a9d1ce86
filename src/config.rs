use vulkanalia::{prelude::v1_0::*};

/// Whether the validation layers should be enabled.
pub const VALIDATION_ENABLED: bool = cfg!(debug_assertions);

/// The name of the validation layers & extensions.
pub const VALIDATION_LAYER: vk::ExtensionName = vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");
pub const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[
    vk::KHR_SWAPCHAIN_EXTENSION.name,
];

/// Max frames in flight to be presented.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Side length of one cube shadow map face, in pixels.
pub const SHADOW_MAP_SIZE: u32 = 1024;

/// Ceiling on distinct materials per scene. The material table is embedded in
/// the fragment uniform block, so exceeding it is a load-time error.
pub const MAX_MATERIALS: usize = 20;

/// Clip planes of the shadow cube projection, mirrored into the fragment
/// uniform block so the lighting shader can linearize sampled depth.
pub const SHADOW_NEAR_PLANE: f32 = 0.1;
pub const SHADOW_FAR_PLANE: f32 = 20.0;

/// The point light. Kept on the world Y axis; the shadow face transforms
/// fold a yaw correction around that axis.
pub const LIGHT_POSITION: [f32; 3] = [0.0, 1.9, 0.0];

/// Scene geometry, read from the working directory at startup.
pub const MODEL_PATH: &str = "cornell_box.obj";

/// Pre-compiled shader bytecode, read from the working directory.
pub const SCENE_VERT_SHADER_PATH: &str = "shader_vert.spv";
pub const SCENE_FRAG_SHADER_PATH: &str = "shader_frag.spv";
pub const SHADOW_VERT_SHADER_PATH: &str = "shadow_vert.spv";
pub const SHADOW_FRAG_SHADER_PATH: &str = "shadow_frag.spv";
