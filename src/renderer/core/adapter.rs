use std::cmp::Reverse;
use std::ffi::CString;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::{eyre, WrapErr};
use crate::renderer::config::GpuPreference;
use crate::renderer::vk::enumerate;

/// Lowest Vulkan version an adapter must report. Dynamic rendering and synchronization2 are
/// core from here on.
pub const REQUIRED_API_VERSION: (u32, u32) = (1, 3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

impl DeviceKind {
    pub fn from_vk(device_type: vk::PhysicalDeviceType) -> Self {
        match device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => Self::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => Self::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => Self::Virtual,
            vk::PhysicalDeviceType::CPU => Self::Cpu,
            _ => Self::Other,
        }
    }

    fn desirability(self) -> u8 {
        match self {
            Self::Discrete => 4,
            Self::Integrated => 3,
            Self::Cpu => 2,
            Self::Virtual => 1,
            Self::Other => 0,
        }
    }
}

/// What we learned about one physical device during enumeration.
#[derive(Clone, Debug)]
pub struct AdapterInfo {
    pub handle: vk::PhysicalDevice,
    /// Position in the driver's enumeration order
    pub index: usize,
    pub kind: DeviceKind,
    pub api_version: u32,
    pub name: String,
    /// First queue family with at least one queue that supports graphics
    pub graphics_queue_family: Option<u32>,
    /// Device extensions the driver reports
    pub extensions: Vec<CString>,
    pub supports_swapchain: bool,
}

/// Ordering key; the derived `Ord` compares fields top to bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct AdapterRank {
    name_match: bool,
    index_match: bool,
    desirability: u8,
}

impl AdapterInfo {
    pub fn query(
        instance: &ash::Instance,
        handle: vk::PhysicalDevice,
        index: usize,
    ) -> Result<Self> {
        let props = unsafe { instance.get_physical_device_properties(handle) };
        let name = props
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| format!("<unnamed adapter {}>", index));

        let queue_families = unsafe {
            instance.get_physical_device_queue_family_properties(handle)
        };
        let graphics_queue_family = queue_families
            .iter()
            .position(|q| {
                q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            })
            .map(|i| i as u32);

        let properties = enumerate::device_extensions(instance, handle)
            .wrap_err_with(|| format!("Failed to query extensions of adapter {:?}", name))?;
        let extensions = enumerate::extension_names(&properties);
        let supports_swapchain = extensions
            .iter()
            .any(|ext| ext.as_c_str() == ash::khr::swapchain::NAME);

        Ok(Self {
            handle,
            index,
            kind: DeviceKind::from_vk(props.device_type),
            api_version: props.api_version,
            name,
            graphics_queue_family,
            extensions,
            supports_swapchain,
        })
    }

    /// Why this adapter cannot be used, if it cannot.
    pub fn rejection(&self) -> Option<&'static str> {
        let major = vk::api_version_major(self.api_version);
        let minor = vk::api_version_minor(self.api_version);
        if (major, minor) < REQUIRED_API_VERSION {
            return Some("API version too old");
        }
        if self.graphics_queue_family.is_none() {
            return Some("no graphics queue family");
        }
        if !self.supports_swapchain {
            return Some("VK_KHR_swapchain not supported");
        }
        None
    }

    pub fn is_suitable(&self) -> bool {
        self.rejection().is_none()
    }

    fn rank(&self, preference: &GpuPreference) -> AdapterRank {
        let name_match = preference
            .device_name
            .as_deref()
            .is_some_and(|wanted| !wanted.is_empty() && self.name.contains(wanted));
        AdapterRank {
            name_match,
            index_match: preference.index == Some(self.index),
            desirability: self.kind.desirability(),
        }
    }
}

pub fn enumerate_adapters(instance: &ash::Instance) -> Result<Vec<AdapterInfo>> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    devices
        .into_iter()
        .enumerate()
        .map(|(index, handle)| AdapterInfo::query(instance, handle, index))
        .collect()
}

/// Picks the best suitable adapter. Among equally ranked adapters the one enumerated first
/// wins.
pub fn select_adapter<'a>(
    candidates: &'a [AdapterInfo],
    preference: &GpuPreference,
) -> Result<&'a AdapterInfo> {
    let mut survivors = candidates
        .iter()
        .filter(|adapter| match adapter.rejection() {
            Some(reason) => {
                log::debug!("Ignoring adapter {:?}: {}", adapter.name, reason);
                false
            }
            None => true,
        })
        .collect::<Vec<_>>();

    survivors.sort_by_key(|adapter| Reverse(adapter.rank(preference)));

    survivors.first().copied().ok_or_else(|| {
        eyre!(
            "No GPU meets the minimum requirements (Vulkan {}.{}, graphics queue, swapchain) \
             among {} adapter(s)",
            REQUIRED_API_VERSION.0,
            REQUIRED_API_VERSION.1,
            candidates.len(),
        )
    })
}
