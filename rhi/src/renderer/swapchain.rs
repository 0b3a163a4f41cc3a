//! Swap chains, image acquisition and format capability queries.

use std::sync::Arc;

use crate::error::{RhiError, RhiResult};
use crate::handle::{FenceHandle, RenderTargetHandle, SemaphoreHandle, SwapChainHandle};
use crate::types::{
    ClearValue, FenceStatus, FormatCapabilities, ImageFormat, RenderTargetDesc, ResourceState,
    SwapChainDesc, MAX_SWAPCHAIN_IMAGE_COUNT, MIN_SWAPCHAIN_IMAGES,
};

use super::objects::SwapChainObject;
use super::Device;

impl Device {
    /// Create a swap chain and one render target per image.
    ///
    /// Images start in the `PRESENT` state. The window handle is only used
    /// during this call.
    pub fn add_swap_chain(&self, desc: &SwapChainDesc) -> RhiResult<SwapChainHandle> {
        if !(MIN_SWAPCHAIN_IMAGES..=MAX_SWAPCHAIN_IMAGE_COUNT).contains(&desc.image_count) {
            return Err(RhiError::InvalidParameter(format!(
                "{} swap chain images requested, expected {MIN_SWAPCHAIN_IMAGES}..={MAX_SWAPCHAIN_IMAGE_COUNT}",
                desc.image_count
            )));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::InvalidParameter(format!(
                "swap chain extent {}x{} has a zero dimension",
                desc.width, desc.height
            )));
        }
        if desc.present_queues.is_empty() {
            return Err(RhiError::InvalidParameter("swap chain without present queue".into()));
        }
        if !self.can_color_write_to(desc.color_format) {
            return Err(RhiError::FeatureNotSupported(format!(
                "{:?} is not a color target format",
                desc.color_format
            )));
        }
        {
            let objects = self.objects.read();
            for &queue in &desc.present_queues {
                objects.queues.get(queue)?;
            }
        }

        let gpu = self.backend.create_swap_chain(desc, desc.window_handle.as_ref())?;

        let mut render_targets = Vec::with_capacity(desc.image_count as usize);
        for i in 0..desc.image_count {
            let rt_desc = RenderTargetDesc {
                start_state: ResourceState::PRESENT,
                ..RenderTargetDesc::new_2d(desc.width, desc.height, desc.color_format)
                    .with_clear_value(desc.color_clear_value)
                    .with_name(format!("swap chain image {i}"))
            };
            match self.add_render_target_owned(&rt_desc, None) {
                Ok(rt) => render_targets.push(rt),
                Err(e) => {
                    let mut objects = self.objects.write();
                    for rt in render_targets {
                        let _ = objects.destroy_render_target(rt);
                    }
                    return Err(e);
                }
            }
        }

        let mut guard = self.objects.write();
        let objects = &mut *guard;
        for &queue in &desc.present_queues {
            objects.queues.retain(queue)?;
        }
        for &rt in &render_targets {
            objects.render_targets.retain(rt)?;
        }
        let handle = objects.swap_chains.insert(SwapChainObject {
            gpu,
            width: desc.width,
            height: desc.height,
            color_format: desc.color_format,
            color_clear_value: desc.color_clear_value,
            present_queues: desc.present_queues.clone(),
            acquired: vec![false; render_targets.len()],
            render_targets: render_targets.clone(),
        });
        for rt in render_targets {
            objects.render_targets.get_mut(rt)?.swap_chain = Some(handle);
        }
        log::debug!(
            "Added swap chain {:?} ({}x{}, {} images, {:?})",
            handle,
            desc.width,
            desc.height,
            desc.image_count,
            desc.color_format
        );
        Ok(handle)
    }

    /// Destroy a swap chain and its render targets.
    ///
    /// The caller idles the present queues first.
    pub fn remove_swap_chain(&self, swap_chain: SwapChainHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let removed = objects.swap_chains.remove(swap_chain)?;
        for &queue in &removed.present_queues {
            objects.queues.release(queue);
        }
        for &rt in &removed.render_targets {
            objects.render_targets.release(rt);
            objects.destroy_render_target(rt)?;
        }
        log::debug!("Removed swap chain {:?}", swap_chain);
        Ok(())
    }

    /// Acquire the next presentable image.
    ///
    /// Blocks until the display releases an image. The optional semaphore
    /// and fence are signaled once the image may be rendered to. Fails if
    /// every image is already acquired, since the call could never return.
    pub fn acquire_next_image(
        &self,
        swap_chain: SwapChainHandle,
        signal_semaphore: Option<SemaphoreHandle>,
        signal_fence: Option<FenceHandle>,
    ) -> RhiResult<u32> {
        let gpu = {
            let objects = self.objects.read();
            let object = objects.swap_chains.get(swap_chain)?;
            if object.acquired.iter().all(|&a| a) {
                return Err(RhiError::InvalidParameter(
                    "every swap chain image is already acquired".into(),
                ));
            }
            if let Some(semaphore) = signal_semaphore {
                objects.semaphores.get(semaphore)?;
            }
            if let Some(fence) = signal_fence {
                if objects.fences.get(fence)?.fence.status() == FenceStatus::Incomplete {
                    return Err(RhiError::InvalidParameter(
                        "fence is already attached to an in-flight submission".into(),
                    ));
                }
            }
            Arc::clone(&object.gpu)
        };

        let index = gpu.acquire_next_image()?;

        let mut objects = self.objects.write();
        let object = objects.swap_chains.get_mut(swap_chain)?;
        let Some(acquired) = object.acquired.get_mut(index as usize) else {
            return Err(RhiError::DeviceLost);
        };
        *acquired = true;
        if let Some(semaphore) = signal_semaphore {
            let semaphore = &objects.semaphores.get(semaphore)?.semaphore;
            semaphore.schedule_signal();
            semaphore.signal();
        }
        if let Some(fence) = signal_fence {
            let fence = &objects.fences.get(fence)?.fence;
            fence.mark_submitted()?;
            fence.signal();
        }
        log::trace!("Acquired image {index} of {:?}", swap_chain);
        Ok(index)
    }

    /// Render target of image `index`.
    pub fn swap_chain_get_render_target(&self, swap_chain: SwapChainHandle, index: u32) -> RhiResult<RenderTargetHandle> {
        let objects = self.objects.read();
        let object = objects.swap_chains.get(swap_chain)?;
        object.render_targets.get(index as usize).copied().ok_or_else(|| {
            RhiError::InvalidParameter(format!(
                "image index {index} out of range ({} images)",
                object.render_targets.len()
            ))
        })
    }

    /// Number of images.
    pub fn swap_chain_image_count(&self, swap_chain: SwapChainHandle) -> RhiResult<u32> {
        Ok(self.objects.read().swap_chains.get(swap_chain)?.gpu.image_count())
    }

    /// Extent of the images.
    pub fn swap_chain_extent(&self, swap_chain: SwapChainHandle) -> RhiResult<(u32, u32)> {
        let objects = self.objects.read();
        let object = objects.swap_chains.get(swap_chain)?;
        Ok((object.width, object.height))
    }

    /// Format and clear value of the images.
    pub fn swap_chain_format(&self, swap_chain: SwapChainHandle) -> RhiResult<(ImageFormat, ClearValue)> {
        let objects = self.objects.read();
        let object = objects.swap_chains.get(swap_chain)?;
        Ok((object.color_format, object.color_clear_value))
    }

    /// Current vsync mode.
    pub fn swap_chain_get_vsync(&self, swap_chain: SwapChainHandle) -> RhiResult<bool> {
        Ok(self.objects.read().swap_chains.get(swap_chain)?.gpu.vsync())
    }

    /// Flip the vsync mode.
    ///
    /// The present queues must be idle.
    pub fn toggle_vsync(&self, swap_chain: SwapChainHandle) -> RhiResult<()> {
        let objects = self.objects.read();
        let object = objects.swap_chains.get(swap_chain)?;
        for &queue in &object.present_queues {
            let timeline = &objects.queues.get(queue)?.timeline;
            if !timeline.is_complete(timeline.submitted()) {
                return Err(RhiError::InvalidParameter(
                    "vsync toggled while the present queue is busy".into(),
                ));
            }
        }
        let vsync = !object.gpu.vsync();
        object.gpu.set_vsync(vsync);
        log::debug!("Swap chain {:?} vsync {}", swap_chain, if vsync { "on" } else { "off" });
        Ok(())
    }

    /// Back buffer format to request.
    ///
    /// `hdr` asks for a 10-bit format, which is only returned when the
    /// backend can output HDR.
    pub fn get_recommended_swapchain_format(&self, hdr: bool) -> ImageFormat {
        if hdr && self.capabilities().hdr_output && self.can_color_write_to(ImageFormat::A2R10G10B10Unorm) {
            ImageFormat::A2R10G10B10Unorm
        } else {
            ImageFormat::B8G8R8A8Srgb
        }
    }

    /// Returns true if the backend supports `format` at all.
    pub fn is_image_format_supported(&self, format: ImageFormat) -> bool {
        !self.backend.format_capabilities(format).is_empty()
    }

    /// Returns true if shaders can sample `format`.
    pub fn can_shader_read_from(&self, format: ImageFormat) -> bool {
        self.backend.format_capabilities(format).contains(FormatCapabilities::SHADER_READ)
    }

    /// Returns true if `format` can be a color attachment.
    pub fn can_color_write_to(&self, format: ImageFormat) -> bool {
        self.backend.format_capabilities(format).contains(FormatCapabilities::COLOR_WRITE)
    }

    /// Returns true if shaders can write `format` as a storage image.
    pub fn can_shader_write_to(&self, format: ImageFormat) -> bool {
        self.backend.format_capabilities(format).contains(FormatCapabilities::SHADER_WRITE)
    }
}

#[cfg(test)]
mod tests {
    use crate::renderer::{Renderer, RendererDesc};
    use crate::types::{
        FenceStatus, ImageFormat, QueueDesc, QueuePresentDesc, QueueType, ResourceState,
        SwapChainDesc,
    };
    use crate::RhiError;

    #[test]
    fn test_swap_chain_image_count_range() {
        let renderer = Renderer::new("swapchain-test", &RendererDesc::default()).unwrap();
        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
        for count in [0, 1, 5] {
            assert!(matches!(
                renderer.add_swap_chain(&SwapChainDesc::new(queue, 64, 64, count)),
                Err(RhiError::InvalidParameter(_))
            ));
        }
        let swap_chain = renderer
            .add_swap_chain(&SwapChainDesc::new(queue, 64, 64, 4))
            .unwrap();
        assert_eq!(renderer.swap_chain_image_count(swap_chain).unwrap(), 4);

        // The swap chain pins its queue and render targets
        assert!(renderer.remove_queue(queue).is_err());
        let rt = renderer.swap_chain_get_render_target(swap_chain, 0).unwrap();
        assert!(renderer.remove_render_target(rt).is_err());
        assert_eq!(renderer.render_target_state(rt).unwrap(), ResourceState::PRESENT);

        renderer.remove_swap_chain(swap_chain).unwrap();
        renderer.remove_queue(queue).unwrap();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_acquire_signals_fence_and_rejects_exhaustion() {
        let renderer = Renderer::new("swapchain-test", &RendererDesc::default()).unwrap();
        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
        let swap_chain = renderer
            .add_swap_chain(&SwapChainDesc::new(queue, 32, 32, 2))
            .unwrap();
        let fence = renderer.add_fence().unwrap();
        let acquired = renderer.add_semaphore().unwrap();

        let first = renderer.acquire_next_image(swap_chain, Some(acquired), Some(fence)).unwrap();
        assert_eq!(first, 0);
        assert_eq!(renderer.get_fence_status(fence).unwrap(), FenceStatus::Complete);
        let second = renderer.acquire_next_image(swap_chain, None, None).unwrap();
        assert_eq!(second, 1);
        assert!(renderer.acquire_next_image(swap_chain, None, None).is_err());

        for index in [first, second] {
            let wait_semaphores = if index == first { vec![acquired] } else { Vec::new() };
            renderer
                .queue_present(
                    queue,
                    &QueuePresentDesc {
                        swap_chain,
                        wait_semaphores,
                        index,
                    },
                )
                .unwrap();
        }
        assert_eq!(renderer.acquire_next_image(swap_chain, None, None).unwrap(), 0);

        renderer.wait_queue_idle(queue).unwrap();
        renderer.remove_semaphore(acquired).unwrap();
        renderer.remove_fence(fence).unwrap();
        renderer.remove_swap_chain(swap_chain).unwrap();
        renderer.remove_queue(queue).unwrap();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_vsync_toggle_and_formats() {
        let renderer = Renderer::new("swapchain-test", &RendererDesc::default()).unwrap();
        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
        let swap_chain = renderer
            .add_swap_chain(&SwapChainDesc::new(queue, 32, 32, 3).with_vsync(true))
            .unwrap();
        assert!(renderer.swap_chain_get_vsync(swap_chain).unwrap());
        renderer.toggle_vsync(swap_chain).unwrap();
        assert!(!renderer.swap_chain_get_vsync(swap_chain).unwrap());

        assert_eq!(renderer.get_recommended_swapchain_format(true), ImageFormat::B8G8R8A8Srgb);
        assert!(renderer.can_shader_read_from(ImageFormat::Dxbc7Unorm));
        assert!(!renderer.can_color_write_to(ImageFormat::D32Sfloat));
        assert!(!renderer.can_shader_write_to(ImageFormat::R8G8B8A8Srgb));
        assert!(!renderer.is_image_format_supported(ImageFormat::Undefined));

        renderer.remove_swap_chain(swap_chain).unwrap();
        renderer.remove_queue(queue).unwrap();
        renderer.shutdown().unwrap();
    }
}
