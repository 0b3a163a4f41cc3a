//! Buffers, textures, render targets and samplers.

use std::fmt::Write as _;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::error::{RhiError, RhiResult};
use crate::handle::{BufferHandle, RenderTargetHandle, SamplerHandle, SwapChainHandle, TextureHandle};
use crate::types::{
    BufferDesc, ImageFormat, ReadRange, RenderTargetDesc, ResourceMemoryUsage, ResourceState,
    SamplerDesc, TextureDesc,
};

use super::objects::{
    BufferObject, Objects, RenderTargetObject, SamplerObject, StateKey, TextureObject,
};
use super::Device;

/// CPU copy of a mapped buffer range.
///
/// Writes become visible to the buffer when the range is handed back to
/// [`Device::unmap_buffer`].
#[derive(Debug)]
pub struct MappedRange {
    buffer: BufferHandle,
    offset: u64,
    data: Vec<u8>,
}

impl MappedRange {
    /// Buffer the range belongs to.
    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    /// Offset of the range in the buffer.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Deref for MappedRange {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for MappedRange {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

fn default_buffer_state(desc: &BufferDesc) -> ResourceState {
    if !desc.start_state.is_empty() {
        return desc.start_state;
    }
    match desc.memory_usage {
        ResourceMemoryUsage::CpuOnly | ResourceMemoryUsage::CpuToGpu => ResourceState::GENERIC_READ,
        ResourceMemoryUsage::GpuToCpu => ResourceState::COPY_DEST,
        _ => ResourceState::COMMON,
    }
}

fn validate_texture_desc(desc: &TextureDesc) -> RhiResult<()> {
    if desc.format == ImageFormat::Undefined {
        return Err(RhiError::InvalidParameter("texture format is undefined".into()));
    }
    if desc.width == 0 || desc.height == 0 || desc.depth == 0 || desc.array_size == 0 {
        return Err(RhiError::InvalidParameter(format!(
            "texture extent {}x{}x{} with {} layer(s) has a zero dimension",
            desc.width, desc.height, desc.depth, desc.array_size
        )));
    }
    let max_mips = 32 - desc.width.max(desc.height).max(desc.depth).leading_zeros();
    if desc.mip_levels == 0 || desc.mip_levels > max_mips {
        return Err(RhiError::InvalidParameter(format!(
            "{} mip levels requested, expected 1..={max_mips}",
            desc.mip_levels
        )));
    }
    Ok(())
}

impl Objects {
    /// Remove a render target and the texture it owns.
    pub fn destroy_render_target(&mut self, render_target: RenderTargetHandle) -> RhiResult<()> {
        let removed = self.render_targets.remove(render_target)?;
        self.textures.release(removed.texture);
        self.textures.remove(removed.texture)?;
        Ok(())
    }
}

impl Device {
    /// Create a buffer.
    pub fn add_buffer(&self, desc: &BufferDesc) -> RhiResult<BufferHandle> {
        if desc.size == 0 {
            return Err(RhiError::InvalidParameter("buffer size must be nonzero".into()));
        }
        let storage = self.backend.create_buffer(desc)?;
        let handle = self.objects.write().buffers.insert(BufferObject {
            desc: desc.clone(),
            storage: Arc::new(storage),
            state: default_buffer_state(desc),
            pending_split: None,
            mapped: false,
            last_use: None,
        });
        log::trace!("Added buffer {:?} ({:?}, {} bytes)", handle, desc.name, desc.size);
        Ok(handle)
    }

    /// Destroy a buffer. Storage still referenced by in-flight work stays
    /// alive until that work completes.
    pub fn remove_buffer(&self, buffer: BufferHandle) -> RhiResult<()> {
        let mut objects = self.objects.write();
        if objects.buffers.get(buffer)?.mapped {
            return Err(RhiError::InvalidParameter("buffer is still mapped".into()));
        }
        objects.buffers.remove(buffer)?;
        Ok(())
    }

    /// Descriptor of a buffer.
    pub fn buffer_desc(&self, buffer: BufferHandle) -> RhiResult<BufferDesc> {
        Ok(self.objects.read().buffers.get(buffer)?.desc.clone())
    }

    /// Last declared state of a buffer.
    pub fn buffer_state(&self, buffer: BufferHandle) -> RhiResult<ResourceState> {
        Ok(self.objects.read().buffers.get(buffer)?.state)
    }

    /// Set the debug name of a buffer.
    pub fn set_buffer_name(&self, buffer: BufferHandle, name: &str) -> RhiResult<()> {
        self.objects.write().buffers.get_mut(buffer)?.desc.name = Some(name.to_string());
        Ok(())
    }

    /// Returns true if no submitted work references the buffer anymore.
    pub fn is_buffer_idle(&self, buffer: BufferHandle) -> RhiResult<bool> {
        let objects = self.objects.read();
        let object = objects.buffers.get(buffer)?;
        Ok(object.last_use.as_ref().map_or(true, |u| u.is_complete()))
    }

    /// Map a range of a CPU-visible buffer.
    ///
    /// `None` maps the whole buffer. Fails if the buffer is already mapped
    /// or still used by work in flight.
    pub fn map_buffer(&self, buffer: BufferHandle, range: Option<ReadRange>) -> RhiResult<MappedRange> {
        let mut guard = self.objects.write();
        let objects = &mut *guard;
        let name = objects.name(StateKey::Buffer(buffer));
        let object = objects.buffers.get_mut(buffer)?;
        if !object.desc.memory_usage.is_cpu_visible() {
            return Err(RhiError::InvalidParameter(format!(
                "buffer '{name}' is not CPU visible"
            )));
        }
        if object.mapped {
            return Err(RhiError::InvalidParameter(format!("buffer '{name}' is already mapped")));
        }
        if object.last_use.as_ref().is_some_and(|u| !u.is_complete()) {
            return Err(RhiError::ResourceInFlight(name));
        }
        let range = range.unwrap_or(ReadRange {
            offset: 0,
            size: object.desc.size,
        });
        let memory = object
            .storage
            .host_memory()
            .ok_or_else(|| RhiError::FeatureNotSupported("mapping device memory".into()))?;
        let data = memory.read(range.offset, range.size)?;
        object.mapped = true;
        Ok(MappedRange {
            buffer,
            offset: range.offset,
            data,
        })
    }

    /// Write a mapped range back and unmap the buffer.
    pub fn unmap_buffer(&self, range: MappedRange) -> RhiResult<()> {
        let mut objects = self.objects.write();
        let object = objects.buffers.get_mut(range.buffer)?;
        if !object.mapped {
            return Err(RhiError::InvalidParameter("buffer is not mapped".into()));
        }
        object.mapped = false;
        let memory = object
            .storage
            .host_memory()
            .ok_or_else(|| RhiError::FeatureNotSupported("mapping device memory".into()))?;
        memory.write(range.offset, &range.data)
    }

    /// Read back buffer contents on backends with host-backed storage.
    pub fn read_buffer(&self, buffer: BufferHandle, range: Option<ReadRange>) -> RhiResult<Vec<u8>> {
        let objects = self.objects.read();
        let object = objects.buffers.get(buffer)?;
        if object.last_use.as_ref().is_some_and(|u| !u.is_complete()) {
            return Err(RhiError::ResourceInFlight(objects.name(StateKey::Buffer(buffer))));
        }
        let range = range.unwrap_or(ReadRange {
            offset: 0,
            size: object.desc.size,
        });
        object
            .storage
            .host_memory()
            .ok_or_else(|| RhiError::FeatureNotSupported("buffer readback".into()))?
            .read(range.offset, range.size)
    }

    /// Create a texture.
    pub fn add_texture(&self, desc: &TextureDesc) -> RhiResult<TextureHandle> {
        validate_texture_desc(desc)?;
        let storage = self.backend.create_texture(desc)?;
        let handle = self.objects.write().textures.insert(TextureObject {
            desc: desc.clone(),
            storage: Arc::new(storage),
            state: desc.start_state,
            pending_split: None,
            last_use: None,
            owner: None,
        });
        log::trace!(
            "Added texture {:?} ({:?}, {}x{} {:?})",
            handle,
            desc.name,
            desc.width,
            desc.height,
            desc.format
        );
        Ok(handle)
    }

    /// Destroy a texture that no render target owns.
    pub fn remove_texture(&self, texture: TextureHandle) -> RhiResult<()> {
        self.objects.write().textures.remove(texture)?;
        Ok(())
    }

    /// Descriptor of a texture.
    pub fn texture_desc(&self, texture: TextureHandle) -> RhiResult<TextureDesc> {
        Ok(self.objects.read().textures.get(texture)?.desc.clone())
    }

    /// Width of mip 0.
    pub fn texture_get_width(&self, texture: TextureHandle) -> RhiResult<u32> {
        Ok(self.objects.read().textures.get(texture)?.desc.width)
    }

    /// Height of mip 0.
    pub fn texture_get_height(&self, texture: TextureHandle) -> RhiResult<u32> {
        Ok(self.objects.read().textures.get(texture)?.desc.height)
    }

    /// Last declared state of a texture.
    pub fn texture_state(&self, texture: TextureHandle) -> RhiResult<ResourceState> {
        Ok(self.objects.read().textures.get(texture)?.state)
    }

    /// Set the debug name of a texture.
    pub fn set_texture_name(&self, texture: TextureHandle, name: &str) -> RhiResult<()> {
        self.objects.write().textures.get_mut(texture)?.desc.name = Some(name.to_string());
        Ok(())
    }

    /// Read back one subresource, rows tightly packed.
    pub fn texture_contents(&self, texture: TextureHandle, mip_level: u32, array_layer: u32) -> RhiResult<Vec<u8>> {
        let objects = self.objects.read();
        let object = objects.textures.get(texture)?;
        if object.last_use.as_ref().is_some_and(|u| !u.is_complete()) {
            return Err(RhiError::ResourceInFlight(objects.name(StateKey::Texture(texture))));
        }
        let sub = object.storage.layout().subresource(mip_level, array_layer)?;
        object
            .storage
            .host_memory()
            .ok_or_else(|| RhiError::FeatureNotSupported("texture readback".into()))?
            .read(sub.offset, sub.size())
    }

    /// Create a render target and its backing texture.
    pub fn add_render_target(&self, desc: &RenderTargetDesc) -> RhiResult<RenderTargetHandle> {
        self.add_render_target_owned(desc, None)
    }

    pub(crate) fn add_render_target_owned(
        &self,
        desc: &RenderTargetDesc,
        swap_chain: Option<SwapChainHandle>,
    ) -> RhiResult<RenderTargetHandle> {
        let texture_desc = desc.texture_desc();
        validate_texture_desc(&texture_desc)?;
        let storage = self.backend.create_texture(&texture_desc)?;

        let mut objects = self.objects.write();
        let texture = objects.textures.insert(TextureObject {
            state: desc.initial_state(),
            desc: texture_desc,
            storage: Arc::new(storage),
            pending_split: None,
            last_use: None,
            owner: None,
        });
        objects.textures.retain(texture)?;
        let handle = objects.render_targets.insert(RenderTargetObject {
            desc: desc.clone(),
            texture,
            swap_chain,
        });
        objects.textures.get_mut(texture)?.owner = Some(handle);
        log::trace!(
            "Added render target {:?} ({:?}, {}x{} {:?})",
            handle,
            desc.name,
            desc.width,
            desc.height,
            desc.format
        );
        Ok(handle)
    }

    /// Destroy a render target and its backing texture.
    pub fn remove_render_target(&self, render_target: RenderTargetHandle) -> RhiResult<()> {
        self.objects.write().destroy_render_target(render_target)
    }

    /// Texture backing a render target.
    pub fn render_target_get_texture(&self, render_target: RenderTargetHandle) -> RhiResult<TextureHandle> {
        Ok(self.objects.read().render_targets.get(render_target)?.texture)
    }

    /// Descriptor of a render target.
    pub fn render_target_get_desc(&self, render_target: RenderTargetHandle) -> RhiResult<RenderTargetDesc> {
        Ok(self.objects.read().render_targets.get(render_target)?.desc.clone())
    }

    /// Last declared state of a render target.
    pub fn render_target_state(&self, render_target: RenderTargetHandle) -> RhiResult<ResourceState> {
        let objects = self.objects.read();
        let key = objects.render_target_key(render_target)?;
        Ok(objects.state(key)?.0)
    }

    /// Create a sampler.
    pub fn add_sampler(&self, desc: &SamplerDesc) -> RhiResult<SamplerHandle> {
        if desc.max_anisotropy < 0.0 {
            return Err(RhiError::InvalidParameter("negative max anisotropy".into()));
        }
        Ok(self.objects.write().samplers.insert(SamplerObject { desc: *desc }))
    }

    /// Descriptor of a sampler.
    pub fn sampler_desc(&self, sampler: SamplerHandle) -> RhiResult<SamplerDesc> {
        Ok(self.objects.read().samplers.get(sampler)?.desc)
    }

    /// Destroy a sampler no root signature uses.
    pub fn remove_sampler(&self, sampler: SamplerHandle) -> RhiResult<()> {
        self.objects.write().samplers.remove(sampler)?;
        Ok(())
    }

    /// Object counts and memory totals, for debug overlays and logs.
    pub fn calculate_memory_stats(&self) -> String {
        let objects = self.objects.read();
        let buffer_bytes: u64 = objects.buffers.iter().map(|(_, b)| b.desc.size).sum();
        let texture_bytes: u64 = objects.textures.iter().map(|(_, t)| t.storage.layout().total_size()).sum();
        let mapped = objects.buffers.iter().filter(|(_, b)| b.mapped).count();

        let mut stats = String::new();
        let _ = writeln!(stats, "buffers: {} ({} bytes, {} mapped)", objects.buffers.len(), buffer_bytes, mapped);
        let _ = writeln!(stats, "textures: {} ({} bytes)", objects.textures.len(), texture_bytes);
        let _ = writeln!(stats, "render targets: {}", objects.render_targets.len());
        let _ = writeln!(stats, "samplers: {}", objects.samplers.len());
        let _ = writeln!(stats, "total: {} bytes", buffer_bytes + texture_bytes);
        stats
    }
}

#[cfg(test)]
mod tests {
    use crate::renderer::{Renderer, RendererDesc};
    use crate::types::{
        AddressMode, BufferDesc, DescriptorType, ImageFormat, ReadRange, RenderTargetDesc,
        ResourceMemoryUsage, ResourceState, SamplerDesc,
    };
    use crate::RhiError;

    #[test]
    fn test_map_requires_cpu_visible_memory() {
        let renderer = Renderer::new("resource-test", &RendererDesc::default()).unwrap();
        let gpu_only = renderer
            .add_buffer(&BufferDesc::new(16, DescriptorType::VERTEX_BUFFER))
            .unwrap();
        assert!(matches!(
            renderer.map_buffer(gpu_only, None),
            Err(RhiError::InvalidParameter(_))
        ));

        let upload = renderer
            .add_buffer(
                &BufferDesc::new(16, DescriptorType::UNIFORM_BUFFER)
                    .with_memory_usage(ResourceMemoryUsage::CpuToGpu),
            )
            .unwrap();
        assert_eq!(renderer.buffer_state(upload).unwrap(), ResourceState::GENERIC_READ);
        let mut range = renderer
            .map_buffer(upload, Some(ReadRange { offset: 4, size: 4 }))
            .unwrap();
        range.copy_from_slice(&[1, 2, 3, 4]);
        assert!(renderer.map_buffer(upload, None).is_err());
        renderer.unmap_buffer(range).unwrap();

        let contents = renderer.read_buffer(upload, None).unwrap();
        assert_eq!(&contents[4..8], &[1, 2, 3, 4]);

        renderer.remove_buffer(upload).unwrap();
        renderer.remove_buffer(gpu_only).unwrap();
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_render_target_owns_texture() {
        let renderer = Renderer::new("resource-test", &RendererDesc::default()).unwrap();
        let depth = renderer
            .add_render_target(&RenderTargetDesc::new_2d(64, 32, ImageFormat::D32Sfloat))
            .unwrap();
        let texture = renderer.render_target_get_texture(depth).unwrap();
        assert_eq!(renderer.texture_get_width(texture).unwrap(), 64);
        assert_eq!(renderer.texture_get_height(texture).unwrap(), 32);
        assert_eq!(renderer.render_target_state(depth).unwrap(), ResourceState::DEPTH_WRITE);

        assert!(matches!(
            renderer.remove_texture(texture),
            Err(RhiError::ObjectInUse { .. })
        ));
        renderer.remove_render_target(depth).unwrap();
        assert!(renderer.texture_get_width(texture).is_err());
        renderer.shutdown().unwrap();
    }

    #[test]
    fn test_memory_stats_counts_objects() {
        let renderer = Renderer::new("resource-test", &RendererDesc::default()).unwrap();
        let buffer = renderer
            .add_buffer(&BufferDesc::new(128, DescriptorType::BUFFER))
            .unwrap();
        let stats = renderer.calculate_memory_stats();
        assert!(stats.contains("buffers: 1 (128 bytes"));
        renderer.remove_buffer(buffer).unwrap();
        renderer.shutdown().unwrap();
    }
    #[test]
    fn test_sampler_desc_round_trips() {
        let renderer = Renderer::new("resource-test", &RendererDesc::default()).unwrap();
        let desc = SamplerDesc::trilinear(AddressMode::ClampToEdge).with_anisotropy(8.0);
        let sampler = renderer.add_sampler(&desc).unwrap();
        assert_eq!(renderer.sampler_desc(sampler).unwrap(), desc);

        renderer.remove_sampler(sampler).unwrap();
        assert!(matches!(
            renderer.sampler_desc(sampler),
            Err(RhiError::InvalidHandle { .. })
        ));
        renderer.shutdown().unwrap();
    }
}
