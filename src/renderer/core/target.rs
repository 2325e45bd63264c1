use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt, WrapErr};
use color_eyre::Result;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::frame::{Acquire, SwapchainStatus};
use crate::renderer::vk::util;

/// Presentation surface created from the window's native handles
pub struct RenderSurface {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
}

impl RenderSurface {
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Self> {
        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle,
                window_handle,
                None,
            )?
        };
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);
        Ok(Self {
            surface,
            surface_loader,
        })
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Prefers 8-bit BGRA sRGB, otherwise takes whatever the surface lists first.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .ok_or_eyre("Surface reports no formats")
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|mode| *mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// A defined `current_extent` is authoritative; the `u32::MAX` sentinel means the
/// framebuffer size decides, clamped to what the surface allows.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let (width, height) = framebuffer_size;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, so acquiring rarely waits on the driver. A zero maximum
/// means unbounded.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = capabilities.max_image_count;
    if max > 0 && min + 1 > max {
        max
    } else {
        min + 1
    }
}

fn choose_composite_alpha(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
        .into_iter()
        .find(|mode| capabilities.supported_composite_alpha.contains(*mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Creates one view per image. If any creation fails, the views already created are
/// destroyed before the error is returned.
pub fn create_views<I, V, C, D>(
    images: &[I],
    mut create: C,
    mut destroy: D,
) -> Result<Vec<V>>
where
    I: Copy,
    C: FnMut(I) -> Result<V>,
    D: FnMut(V),
{
    let mut views = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        match create(*image) {
            Ok(view) => views.push(view),
            Err(err) => {
                views.into_iter().for_each(&mut destroy);
                return Err(err.wrap_err(format!("Failed to create view for swapchain image {}", i)));
            }
        }
    }
    Ok(views)
}

/// Swapchain plus one color view per image
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,

    device: Arc<ash::Device>,
}

impl Swapchain {
    pub fn new(
        instance: &ash::Instance,
        dev: &RenderDevice,
        surface: &RenderSurface,
        framebuffer_size: (u32, u32),
    ) -> Result<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &dev.logical);
        let mut swapchain = Self {
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            extent: vk::Extent2D::default(),
            format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            device: dev.logical.clone(),
        };
        swapchain.build(dev, surface, framebuffer_size)?;
        Ok(swapchain)
    }

    /// Tears down the views and the swapchain, then builds them again for the new size.
    /// The caller must have idled the device.
    pub fn recreate(
        &mut self,
        dev: &RenderDevice,
        surface: &RenderSurface,
        framebuffer_size: (u32, u32),
    ) -> Result<()> {
        self.destroy();
        self.build(dev, surface, framebuffer_size)
            .wrap_err("Failed to recreate swapchain")
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<Acquire> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(Acquire::Ready { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::Stale),
            Err(err) => Err(eyre!("Failed to acquire swapchain image: {}", err)),
        }
    }

    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<SwapchainStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader.queue_present(queue, &present_info)
        };
        match result {
            Ok(false) => Ok(SwapchainStatus::Optimal),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::Stale),
            Err(err) => Err(eyre!("Failed to present swapchain image: {}", err)),
        }
    }

    fn build(
        &mut self,
        dev: &RenderDevice,
        surface: &RenderSurface,
        framebuffer_size: (u32, u32),
    ) -> Result<()> {
        let (capabilities, formats, present_modes) = unsafe {
            let loader = &surface.surface_loader;
            (
                loader.get_physical_device_surface_capabilities(dev.physical, surface.surface)?,
                loader.get_physical_device_surface_formats(dev.physical, surface.surface)?,
                loader.get_physical_device_surface_present_modes(dev.physical, surface.surface)?,
            )
        };

        let format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&capabilities, framebuffer_size);
        let min_image_count = choose_image_count(&capabilities);
        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(choose_composite_alpha(&capabilities))
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1);

        let swapchain = unsafe {
            self.swapchain_loader.create_swapchain(&swapchain_info, None)?
        };
        let images = match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(err) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(err.into());
            }
        };

        let device = &self.device;
        let image_views = create_views(
            &images,
            |image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(util::color_subresource_range())
                    .image(image);
                Ok(unsafe { device.create_image_view(&view_info, None)? })
            },
            |view| unsafe { device.destroy_image_view(view, None) },
        );
        let image_views = match image_views {
            Ok(views) => views,
            Err(err) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(err);
            }
        };

        log::info!(
            "Swapchain ready: {}x{}, {:?}/{:?}, {:?}, {} images",
            extent.width,
            extent.height,
            format.format,
            format.color_space,
            present_mode,
            images.len(),
        );

        self.swapchain = swapchain;
        self.images = images;
        self.image_views = image_views;
        self.extent = extent;
        self.format = format;
        self.present_mode = present_mode;

        Ok(())
    }

    fn destroy(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
        }
        self.swapchain = vk::SwapchainKHR::null();
        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn capabilities(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn sentinel_extent_uses_framebuffer_size() {
        let caps = capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        assert_eq!(
            choose_extent(&caps, (100, 100)),
            vk::Extent2D { width: 100, height: 100 },
        );
    }

    #[test]
    fn framebuffer_size_is_clamped() {
        let caps = capabilities((u32::MAX, u32::MAX), (64, 64), (1920, 1080));
        assert_eq!(
            choose_extent(&caps, (10, 5000)),
            vk::Extent2D { width: 64, height: 1080 },
        );
        assert_eq!(
            choose_extent(&caps, (8000, 32)),
            vk::Extent2D { width: 1920, height: 64 },
        );
    }

    #[test]
    fn defined_current_extent_is_used_verbatim() {
        let caps = capabilities((800, 600), (1, 1), (4096, 4096));
        assert_eq!(
            choose_extent(&caps, (100, 100)),
            vk::Extent2D { width: 800, height: 600 },
        );
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        let mut caps = capabilities((800, 600), (1, 1), (4096, 4096));
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn prefers_bgra_srgb_then_first() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[unorm, srgb]).unwrap().format, srgb.format);
        assert_eq!(choose_surface_format(&[unorm]).unwrap().format, unorm.format);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn prefers_mailbox_then_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX,
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO,
        );
    }

    #[test]
    fn composite_alpha_falls_back_to_supported_mode() {
        let mut caps = capabilities((800, 600), (1, 1), (4096, 4096));
        caps.supported_composite_alpha = vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(choose_composite_alpha(&caps), vk::CompositeAlphaFlagsKHR::INHERIT);
        caps.supported_composite_alpha |= vk::CompositeAlphaFlagsKHR::OPAQUE;
        assert_eq!(choose_composite_alpha(&caps), vk::CompositeAlphaFlagsKHR::OPAQUE);
    }

    #[test]
    fn one_view_per_image() {
        let images = [10u32, 11, 12];
        let views = create_views(&images, |image| Ok(image * 2), |_| {}).unwrap();
        assert_eq!(views, vec![20, 22, 24]);
    }

    #[test]
    fn failed_view_rolls_back_earlier_views() {
        let images = [1u32, 2, 3, 4];
        let destroyed = RefCell::new(Vec::new());
        let result = create_views(
            &images,
            |image| {
                if image == 3 {
                    Err(eyre!("out of memory"))
                } else {
                    Ok(image * 100)
                }
            },
            |view| destroyed.borrow_mut().push(view),
        );
        assert!(result.is_err());
        assert_eq!(destroyed.into_inner(), vec![100, 200]);
    }
}
