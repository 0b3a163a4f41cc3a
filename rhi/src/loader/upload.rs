//! Staging ring and copy recording of the loader worker.
//!
//! Requests are packed into the current staging buffer. When it is full,
//! its command buffer is submitted with the slot's fence and the ring moves
//! on. A slot is written again only after its fence has completed, which is
//! also when the requests it carried are reported complete.

use std::sync::Arc;

use crate::error::{RhiError, RhiResult};
use crate::handle::{BufferHandle, CmdHandle, CmdPoolHandle, FenceHandle, QueueHandle, TextureHandle};
use crate::renderer::Device;
use crate::types::{
    BufferBarrier, BufferDesc, CmdDesc, CmdPoolDesc, DescriptorType, ImageFormat, QueueDesc,
    QueueSubmitDesc, QueueType, ReadRange, Region3d, ResourceMemoryUsage, ResourceState,
    SubresourceDataDesc, TextureBarrier,
};

use super::desc::{RawImageData, ResourceLoaderDesc};
use super::token::LoadPriority;

/// Contents of a buffer upload.
#[derive(Debug)]
pub(crate) enum BufferSource {
    Bytes(Vec<u8>),
    Zeros(u64),
}

impl BufferSource {
    fn len(&self) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes.len() as u64,
            Self::Zeros(size) => *size,
        }
    }
}

/// GPU work of one load request.
#[derive(Debug)]
pub(crate) enum Upload {
    Buffer {
        buffer: BufferHandle,
        dst_offset: u64,
        source: BufferSource,
        final_state: ResourceState,
    },
    Texture {
        texture: TextureHandle,
        image: RawImageData,
        base_mip: u32,
        base_layer: u32,
        final_state: ResourceState,
    },
}

/// A queued request with its position in its priority class.
#[derive(Debug)]
pub(crate) struct LoadRequest {
    pub id: u64,
    pub upload: Upload,
}

/// Where one subresource of a raw image sits in its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SourceSubresource {
    pub mip: u32,
    pub layer: u32,
    pub offset: u64,
    pub row_pitch: u64,
    pub row_bytes: u64,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Subresources of `image` in data order.
pub(crate) fn source_subresources(image: &RawImageData) -> RhiResult<Vec<SourceSubresource>> {
    if image.format == ImageFormat::Undefined || image.width == 0 || image.height == 0 {
        return Err(RhiError::InvalidParameter(format!(
            "raw image {}x{} {:?}",
            image.width, image.height, image.format
        )));
    }
    let mip_levels = image.mip_levels.max(1);
    let array_size = image.array_size.max(1);
    let (_, block_height) = image.format.block_extent();

    let mut order = Vec::with_capacity((mip_levels * array_size) as usize);
    if image.mips_after_slices {
        for mip in 0..mip_levels {
            for layer in 0..array_size {
                order.push((mip, layer));
            }
        }
    } else {
        for layer in 0..array_size {
            for mip in 0..mip_levels {
                order.push((mip, layer));
            }
        }
    }

    let mut offset = 0;
    let mut subresources = Vec::with_capacity(order.len());
    for (mip, layer) in order {
        let width = (image.width >> mip).max(1);
        let height = (image.height >> mip).max(1);
        let depth = (image.depth.max(1) >> mip).max(1);
        let rows = height.div_ceil(block_height);
        let row_bytes = image.format.surface_size(width, block_height, 1);
        // The row stride describes mip 0; smaller mips are tightly packed
        let row_pitch = if mip == 0 && image.row_stride != 0 {
            let stride = u64::from(image.row_stride);
            if stride < row_bytes {
                return Err(RhiError::InvalidParameter(format!(
                    "row stride {stride} smaller than row size {row_bytes}"
                )));
            }
            stride
        } else {
            row_bytes
        };
        subresources.push(SourceSubresource {
            mip,
            layer,
            offset,
            row_pitch,
            row_bytes,
            rows,
            width,
            height,
            depth,
        });
        offset += row_pitch * u64::from(rows) * u64::from(depth);
    }
    if offset > image.data.len() as u64 {
        return Err(RhiError::InvalidParameter(format!(
            "raw image needs {offset} bytes, got {}",
            image.data.len()
        )));
    }
    Ok(subresources)
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

struct StagingSlot {
    buffer: BufferHandle,
    cmd: CmdHandle,
    fence: FenceHandle,
    used: u64,
    recording: bool,
    /// Requests whose last copy was recorded in this slot.
    finished: Vec<(LoadPriority, u64)>,
}

/// Worker side of the loader: owns the transfer queue and the staging ring.
pub(crate) struct Uploader {
    device: Arc<Device>,
    queue: QueueHandle,
    pool: CmdPoolHandle,
    slots: Vec<StagingSlot>,
    current: usize,
    buffer_size: u64,
    texture_alignment: u64,
    row_alignment: u64,
}

impl Uploader {
    /// Create the transfer queue and the staging ring.
    pub fn new(device: Arc<Device>, desc: &ResourceLoaderDesc) -> RhiResult<Self> {
        if desc.buffer_size == 0 || desc.buffer_count == 0 {
            return Err(RhiError::InvalidParameter(format!(
                "{} staging buffers of {} bytes",
                desc.buffer_count, desc.buffer_size
            )));
        }
        let caps = device.capabilities();
        let texture_alignment = u64::from(caps.upload_buffer_texture_alignment);
        let row_alignment = u64::from(caps.upload_buffer_texture_row_alignment);

        let queue = device.add_queue(&QueueDesc::new(QueueType::Transfer))?;
        let pool = match device.add_cmd_pool(&CmdPoolDesc::new(queue)) {
            Ok(pool) => pool,
            Err(err) => {
                let _ = device.remove_queue(queue);
                return Err(err);
            }
        };
        let mut uploader = Self {
            device,
            queue,
            pool,
            slots: Vec::with_capacity(desc.buffer_count as usize),
            current: 0,
            buffer_size: desc.buffer_size,
            texture_alignment,
            row_alignment,
        };
        for i in 0..desc.buffer_count {
            match uploader.add_slot(i, desc.buffer_size) {
                Ok(slot) => uploader.slots.push(slot),
                Err(err) => return Err(err),
            }
        }
        Ok(uploader)
    }

    fn add_slot(&self, index: u32, size: u64) -> RhiResult<StagingSlot> {
        let buffer = self.device.add_buffer(
            &BufferDesc::new(size, DescriptorType::empty())
                .with_memory_usage(ResourceMemoryUsage::CpuToGpu)
                .with_start_state(ResourceState::COPY_SOURCE)
                .with_name(format!("loader staging {index}")),
        )?;
        let cmd = match self.device.add_cmd(&CmdDesc::new(self.pool)) {
            Ok(cmd) => cmd,
            Err(err) => {
                let _ = self.device.remove_buffer(buffer);
                return Err(err);
            }
        };
        let fence = match self.device.add_fence() {
            Ok(fence) => fence,
            Err(err) => {
                let _ = self.device.remove_cmd(cmd);
                let _ = self.device.remove_buffer(buffer);
                return Err(err);
            }
        };
        Ok(StagingSlot {
            buffer,
            cmd,
            fence,
            used: 0,
            recording: false,
            finished: Vec::new(),
        })
    }

    /// Returns true if recorded or submitted work is not yet reported.
    pub fn has_pending(&self) -> bool {
        self.slots.iter().any(|slot| slot.recording || !slot.finished.is_empty())
    }

    /// Record the copies of one request. Completed requests are passed to
    /// `complete` in submission order.
    pub fn upload(
        &mut self,
        priority: LoadPriority,
        request: LoadRequest,
        complete: &mut dyn FnMut(&[(LoadPriority, u64)]),
    ) -> RhiResult<()> {
        let result = match &request.upload {
            Upload::Buffer {
                buffer,
                dst_offset,
                source,
                final_state,
            } => self.upload_buffer(*buffer, *dst_offset, source, *final_state, complete),
            Upload::Texture {
                texture,
                image,
                base_mip,
                base_layer,
                final_state,
            } => self.upload_texture(*texture, image, *base_mip, *base_layer, *final_state, complete),
        };
        // Failed requests still complete so that waiters are released
        self.slots[self.current].finished.push((priority, request.id));
        result
    }

    fn upload_buffer(
        &mut self,
        buffer: BufferHandle,
        dst_offset: u64,
        source: &BufferSource,
        final_state: ResourceState,
        complete: &mut dyn FnMut(&[(LoadPriority, u64)]),
    ) -> RhiResult<()> {
        let total = source.len();
        let mut done = 0;
        let mut first = true;
        while done < total {
            if self.space() == 0 {
                self.advance(complete)?;
            }
            let chunk = self.space().min(total - done);
            let staging_offset = self.slots[self.current].used;
            let bytes = match source {
                BufferSource::Bytes(bytes) => bytes[done as usize..(done + chunk) as usize].to_vec(),
                BufferSource::Zeros(_) => vec![0; chunk as usize],
            };
            self.write_staging(staging_offset, &bytes)?;
            let cmd = self.begin_slot()?;
            if first {
                self.device
                    .cmd_resource_barrier(cmd, &[BufferBarrier::new(buffer, ResourceState::COPY_DEST)], &[], &[])?;
                first = false;
            }
            let staging = self.slots[self.current].buffer;
            self.device
                .cmd_update_buffer(cmd, buffer, dst_offset + done, staging, staging_offset, chunk)?;
            self.slots[self.current].used += chunk;
            done += chunk;
        }
        let cmd = self.begin_slot()?;
        self.device
            .cmd_resource_barrier(cmd, &[BufferBarrier::new(buffer, final_state)], &[], &[])
    }

    #[allow(clippy::too_many_arguments)]
    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        image: &RawImageData,
        base_mip: u32,
        base_layer: u32,
        final_state: ResourceState,
        complete: &mut dyn FnMut(&[(LoadPriority, u64)]),
    ) -> RhiResult<()> {
        let (_, block_height) = image.format.block_extent();
        let mut first = true;
        for sub in source_subresources(image)? {
            let staging_row_pitch = align_up(sub.row_bytes, self.row_alignment);
            if staging_row_pitch > self.buffer_size {
                return Err(RhiError::InvalidParameter(format!(
                    "texture row of {staging_row_pitch} bytes exceeds staging buffer of {} bytes",
                    self.buffer_size
                )));
            }
            for z in 0..sub.depth {
                let slice_offset = sub.offset + u64::from(z) * sub.row_pitch * u64::from(sub.rows);
                let mut row = 0;
                while row < sub.rows {
                    let mut staging_offset =
                        align_up(self.slots[self.current].used, self.texture_alignment);
                    if staging_offset + staging_row_pitch > self.buffer_size {
                        self.advance(complete)?;
                        staging_offset = 0;
                    }
                    let fit = (self.buffer_size - staging_offset) / staging_row_pitch;
                    let rows = (sub.rows - row).min(fit as u32);

                    let mut packed = vec![0; (staging_row_pitch * u64::from(rows)) as usize];
                    for r in 0..rows {
                        let src = (slice_offset + u64::from(row + r) * sub.row_pitch) as usize;
                        let dst = (u64::from(r) * staging_row_pitch) as usize;
                        packed[dst..dst + sub.row_bytes as usize]
                            .copy_from_slice(&image.data[src..src + sub.row_bytes as usize]);
                    }
                    self.write_staging(staging_offset, &packed)?;

                    let cmd = self.begin_slot()?;
                    if first {
                        self.device.cmd_resource_barrier(
                            cmd,
                            &[],
                            &[TextureBarrier::new(texture, ResourceState::COPY_DEST)],
                            &[],
                        )?;
                        first = false;
                    }
                    let y = row * block_height;
                    let region = SubresourceDataDesc {
                        buffer_offset: staging_offset,
                        row_pitch: staging_row_pitch as u32,
                        slice_pitch: (staging_row_pitch * u64::from(rows)) as u32,
                        array_layer: base_layer + sub.layer,
                        mip_level: base_mip + sub.mip,
                        region: Region3d {
                            x_offset: 0,
                            y_offset: y,
                            z_offset: z,
                            width: sub.width,
                            height: (rows * block_height).min(sub.height - y),
                            depth: 1,
                        },
                    };
                    let staging = self.slots[self.current].buffer;
                    self.device.cmd_update_subresource(cmd, texture, staging, &region)?;
                    self.slots[self.current].used = staging_offset + u64::from(rows) * staging_row_pitch;
                    row += rows;
                }
            }
        }
        let cmd = self.begin_slot()?;
        self.device
            .cmd_resource_barrier(cmd, &[], &[TextureBarrier::new(texture, final_state)], &[])
    }

    fn space(&self) -> u64 {
        self.buffer_size - self.slots[self.current].used
    }

    fn write_staging(&self, offset: u64, bytes: &[u8]) -> RhiResult<()> {
        let staging = self.slots[self.current].buffer;
        let mut range = self.device.map_buffer(
            staging,
            Some(ReadRange {
                offset,
                size: bytes.len() as u64,
            }),
        )?;
        range.copy_from_slice(bytes);
        self.device.unmap_buffer(range)
    }

    fn begin_slot(&mut self) -> RhiResult<CmdHandle> {
        let slot = &mut self.slots[self.current];
        if !slot.recording {
            self.device.begin_cmd(slot.cmd)?;
            slot.recording = true;
        }
        Ok(slot.cmd)
    }

    fn submit_current(&mut self) -> RhiResult<()> {
        let slot = &mut self.slots[self.current];
        if !slot.recording {
            return Ok(());
        }
        slot.recording = false;
        self.device.end_cmd(slot.cmd)?;
        self.device.queue_submit(
            self.queue,
            &QueueSubmitDesc {
                cmds: vec![slot.cmd],
                signal_fence: Some(slot.fence),
                ..Default::default()
            },
        )?;
        log::trace!(
            "Loader submitted staging slot {} ({} bytes, {} requests)",
            self.current,
            slot.used,
            slot.finished.len()
        );
        Ok(())
    }

    /// Wait for slot `index` and report the requests it carried.
    fn retire(&mut self, index: usize, complete: &mut dyn FnMut(&[(LoadPriority, u64)])) -> RhiResult<()> {
        let slot = &mut self.slots[index];
        let waited = self.device.wait_for_fences(&[slot.fence]);
        slot.used = 0;
        let finished = std::mem::take(&mut slot.finished);
        if !finished.is_empty() {
            complete(&finished);
        }
        waited
    }

    /// Submit the current slot and move to the next free one.
    pub fn advance(&mut self, complete: &mut dyn FnMut(&[(LoadPriority, u64)])) -> RhiResult<()> {
        let submitted = self.submit_current();
        self.current = (self.current + 1) % self.slots.len();
        self.retire(self.current, complete)?;
        submitted
    }

    /// Submit everything recorded and wait for it.
    pub fn flush(&mut self, complete: &mut dyn FnMut(&[(LoadPriority, u64)])) -> RhiResult<()> {
        let submitted = self.submit_current();
        let count = self.slots.len();
        // Oldest submission first, the current slot last
        for i in 1..=count {
            let index = (self.current + i) % count;
            self.retire(index, complete)?;
        }
        submitted
    }

}

impl Drop for Uploader {
    fn drop(&mut self) {
        let device = Arc::clone(&self.device);
        for slot in self.slots.drain(..) {
            let removed = device
                .remove_fence(slot.fence)
                .and_then(|()| device.remove_cmd(slot.cmd))
                .and_then(|()| device.remove_buffer(slot.buffer));
            if let Err(err) = removed {
                log::error!("Failed to release loader staging slot: {err}");
            }
        }
        let removed = device
            .remove_cmd_pool(self.pool)
            .and_then(|()| device.remove_queue(self.queue));
        if let Err(err) = removed {
            log::error!("Failed to release loader queue: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_subresources_honor_row_stride() {
        let mut image = RawImageData::new_2d(vec![0; 8 * 4], ImageFormat::R8G8B8A8Unorm, 1, 4);
        image.row_stride = 8;
        let subs = source_subresources(&image).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].row_pitch, 8);
        assert_eq!(subs[0].row_bytes, 4);

        image.row_stride = 2;
        assert!(source_subresources(&image).is_err());
    }

    #[test]
    fn test_source_subresource_order() {
        let mut image = RawImageData::new_2d(vec![0; 1024], ImageFormat::R8Unorm, 4, 4);
        image.mip_levels = 2;
        image.array_size = 2;
        let layer_major: Vec<_> = source_subresources(&image)
            .unwrap()
            .iter()
            .map(|s| (s.mip, s.layer, s.offset))
            .collect();
        assert_eq!(layer_major, vec![(0, 0, 0), (1, 0, 16), (0, 1, 20), (1, 1, 36)]);

        image.mips_after_slices = true;
        let mip_major: Vec<_> = source_subresources(&image)
            .unwrap()
            .iter()
            .map(|s| (s.mip, s.layer, s.offset))
            .collect();
        assert_eq!(mip_major, vec![(0, 0, 0), (0, 1, 16), (1, 0, 32), (1, 1, 36)]);
    }

    #[test]
    fn test_short_image_data_rejected() {
        let image = RawImageData::new_2d(vec![0; 15], ImageFormat::R8Unorm, 4, 4);
        assert!(source_subresources(&image).is_err());
    }
}
