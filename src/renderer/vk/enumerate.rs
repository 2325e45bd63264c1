use std::ffi::{CStr, CString};
use std::ptr;
use ash::prelude::VkResult;
use ash::vk;

/// Runs a two-call Vulkan query (first the count, then the data) until the result is stable.
///
/// The driver may report `VK_INCOMPLETE` when the set grows between the two calls; in that
/// case the whole query is repeated. ash's `enumerate_*` wrappers run the same loop per
/// query; this is the one loop every enumeration here goes through.
pub fn enumerate<T, F>(mut query: F) -> VkResult<Vec<T>>
where
    T: Default + Clone,
    F: FnMut(&mut u32, *mut T) -> vk::Result,
{
    loop {
        let mut count = 0u32;
        query(&mut count, ptr::null_mut()).result()?;

        let mut data = vec![T::default(); count as usize];
        let status = query(&mut count, data.as_mut_ptr());
        if status == vk::Result::INCOMPLETE {
            continue;
        }
        status.result()?;

        data.truncate(count as usize);
        return Ok(data);
    }
}

pub fn instance_layers(entry: &ash::Entry) -> VkResult<Vec<vk::LayerProperties>> {
    let fp = entry.fp_v1_0();
    enumerate(|count, data| unsafe {
        (fp.enumerate_instance_layer_properties)(count, data)
    })
}

pub fn instance_extensions(entry: &ash::Entry) -> VkResult<Vec<vk::ExtensionProperties>> {
    let fp = entry.fp_v1_0();
    enumerate(|count, data| unsafe {
        (fp.enumerate_instance_extension_properties)(ptr::null(), count, data)
    })
}

pub fn device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> VkResult<Vec<vk::ExtensionProperties>> {
    let fp = instance.fp_v1_0();
    enumerate(|count, data| unsafe {
        (fp.enumerate_device_extension_properties)(physical_device, ptr::null(), count, data)
    })
}

/// Names of the given extension properties, skipping entries that are not valid C strings.
pub fn extension_names(props: &[vk::ExtensionProperties]) -> Vec<CString> {
    props
        .iter()
        .filter_map(|props| props.extension_name_as_c_str().ok())
        .map(CStr::to_owned)
        .collect()
}
