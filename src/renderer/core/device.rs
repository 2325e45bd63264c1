use std::ffi::{c_char, CStr};
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::core::adapter::AdapterInfo;

/// Logical device with its single graphics queue and the command pool feeding it
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub name: String,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    pub command_pool: vk::CommandPool,
}

impl RenderDevice {
    const REQUIRED_EXTENSIONS: &'static [&'static CStr] = &[ash::khr::swapchain::NAME];
    const OPTIONAL_EXTENSIONS: &'static [&'static CStr] = &[
        ash::khr::synchronization2::NAME,
        ash::khr::portability_subset::NAME,
    ];

    pub fn new(
        instance: &ash::Instance,
        adapter: &AdapterInfo,
    ) -> Result<Self> {
        let graphics_queue_family = adapter
            .graphics_queue_family
            .ok_or_eyre("Selected adapter has no graphics queue family")?;

        let extensions = Self::enabled_extensions(adapter)?;
        log::debug!("Enabling device extensions: {:?}", extensions);

        let (logical, graphics_queue) = Self::create_logical_device(
            instance,
            adapter.handle,
            graphics_queue_family,
            &extensions,
        )?;

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(graphics_queue_family);
        let command_pool = match unsafe { logical.create_command_pool(&command_pool_info, None) } {
            Ok(pool) => pool,
            Err(err) => {
                unsafe { logical.destroy_device(None) };
                return Err(err.into());
            }
        };

        Ok(Self {
            logical: Arc::new(logical),
            physical: adapter.handle,
            name: adapter.name.clone(),
            graphics_queue,
            graphics_queue_family,
            command_pool,
        })
    }

    /// Extensions to enable, resolved against the list the adapter reported during selection.
    fn enabled_extensions(adapter: &AdapterInfo) -> Result<Vec<&'static CStr>> {
        let supported = adapter.extensions.iter().map(|ext| ext.as_c_str()).collect::<Vec<_>>();
        resolve_device_extensions(&supported, Self::REQUIRED_EXTENSIONS, Self::OPTIONAL_EXTENSIONS)
    }

    /// Whether the graphics family can present to `surface`.
    pub fn supports_present(
        &self,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<bool> {
        Ok(unsafe {
            surface_loader.get_physical_device_surface_support(
                self.physical,
                self.graphics_queue_family,
                surface,
            )?
        })
    }

    pub fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe {
            self.logical.allocate_command_buffers(&allocate_info)?
        })
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
        extensions: &[&CStr],
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .queue_priorities(&queue_priorities),
        ];

        let enabled_extension_names = extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let supported_features = RequiredDeviceFeatures::query(instance, physical_device);
        if !supported_features.has_all() {
            return Err(eyre!(
                "Required features not supported (dynamic rendering: {}, synchronization2: {})",
                supported_features.dynamic_rendering,
                supported_features.synchronization2,
            ));
        }

        // Create device
        let device = {
            let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default()
                .dynamic_rendering(true)
                .synchronization2(true);
            let mut features = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut vulkan13_features);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&enabled_extension_names)
                .push_next(&mut features);

            unsafe {
                instance.create_device(physical_device, &device_create_info, None)?
            }
        };

        let graphics_queue = unsafe {
            device.get_device_queue(graphics_queue_family, 0)
        };

        Ok((device, graphics_queue))
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle on shutdown: {}", err);
            }
            self.logical.destroy_command_pool(self.command_pool, None);
            self.logical.destroy_device(None);
        }
    }
}

/// Required extensions plus whichever optional ones the adapter advertises.
pub fn resolve_device_extensions(
    supported: &[&CStr],
    required: &[&'static CStr],
    optional: &[&'static CStr],
) -> Result<Vec<&'static CStr>> {
    let missing = required
        .iter()
        .filter(|ext| !supported.contains(*ext))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(eyre!("Device extensions not supported: {:?}", missing));
    }

    let mut enabled = required.to_vec();
    for ext in optional {
        if supported.contains(ext) {
            enabled.push(*ext);
        } else {
            log::debug!("Optional device extension {:?} not available", ext);
        }
    }

    Ok(enabled)
}

struct RequiredDeviceFeatures {
    dynamic_rendering: bool,
    synchronization2: bool,
}

impl RequiredDeviceFeatures {
    fn query(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default();
        {
            let mut features = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut vulkan13_features);

            // Query physical device features
            unsafe {
                instance.get_physical_device_features2(physical_device, &mut features);
            }
        }

        Self {
            dynamic_rendering: vulkan13_features.dynamic_rendering == vk::TRUE,
            synchronization2: vulkan13_features.synchronization2 == vk::TRUE,
        }
    }

    fn has_all(&self) -> bool {
        self.dynamic_rendering && self.synchronization2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::core::adapter::DeviceKind;

    const REQUIRED: &[&CStr] = &[ash::khr::swapchain::NAME];
    const OPTIONAL: &[&CStr] = &[
        ash::khr::synchronization2::NAME,
        ash::khr::portability_subset::NAME,
    ];

    #[test]
    fn missing_swapchain_is_fatal() {
        let supported = [ash::khr::synchronization2::NAME];
        assert!(resolve_device_extensions(&supported, REQUIRED, OPTIONAL).is_err());
    }

    #[test]
    fn optional_extensions_are_pruned() {
        let supported = [ash::khr::swapchain::NAME, c"VK_KHR_something_else"];
        let enabled = resolve_device_extensions(&supported, REQUIRED, OPTIONAL).unwrap();
        assert_eq!(enabled, vec![ash::khr::swapchain::NAME]);
    }

    #[test]
    fn available_optional_extensions_are_enabled_in_order() {
        let supported = [
            ash::khr::portability_subset::NAME,
            ash::khr::swapchain::NAME,
            ash::khr::synchronization2::NAME,
        ];
        let enabled = resolve_device_extensions(&supported, REQUIRED, OPTIONAL).unwrap();
        assert_eq!(
            enabled,
            vec![
                ash::khr::swapchain::NAME,
                ash::khr::synchronization2::NAME,
                ash::khr::portability_subset::NAME,
            ],
        );
    }

    #[test]
    fn extensions_come_from_the_adapter_query() {
        let adapter = AdapterInfo {
            handle: vk::PhysicalDevice::null(),
            index: 0,
            kind: DeviceKind::Discrete,
            api_version: vk::API_VERSION_1_3,
            name: "Test GPU".to_string(),
            graphics_queue_family: Some(0),
            extensions: vec![
                ash::khr::synchronization2::NAME.to_owned(),
                ash::khr::swapchain::NAME.to_owned(),
            ],
            supports_swapchain: true,
        };
        assert_eq!(
            RenderDevice::enabled_extensions(&adapter).unwrap(),
            vec![ash::khr::swapchain::NAME, ash::khr::synchronization2::NAME],
        );

        let adapter = AdapterInfo { extensions: Vec::new(), ..adapter };
        assert!(RenderDevice::enabled_extensions(&adapter).is_err());
    }
}
