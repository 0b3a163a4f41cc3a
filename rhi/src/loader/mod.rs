//! Asynchronous resource loader.
//!
//! The loader owns a transfer queue and a ring of staging buffers, and runs
//! one worker thread that drains the [`LoadScheduler`]. Every enqueued
//! request is stamped with a [`SyncToken`]; the token completes once the
//! copy has finished on the GPU and the resource has reached its final
//! state.
//!
//! # Example
//!
//! ```ignore
//! renderer.init_resource_loader(None)?;
//! let (vertices, token) = renderer.add_buffer_resource(
//!     &BufferLoadDesc::new(BufferDesc::new(size, DescriptorType::VERTEX_BUFFER))
//!         .with_contents(&vertex_data),
//!     LoadPriority::Normal,
//! )?;
//! renderer.wait_for_token(&token)?;
//! ```

mod decode;
mod desc;
mod schedule;
mod shader;
mod token;
mod upload;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use static_assertions::assert_impl_all;

use crate::error::{RhiError, RhiResult};
use crate::handle::{BufferHandle, TextureHandle};
use crate::renderer::Renderer;
use crate::types::{ReadRange, ResourceState, TextureDesc};

pub use decode::{decode_binary, decode_file};
pub use desc::{
    BinaryImageData, BufferLoadDesc, BufferUpdateDesc, RawImageData, ResourceLoaderDesc,
    ShaderLoadDesc, ShaderStageLoadDesc, TextureLoadDesc, TextureUpdateDesc,
};
pub use schedule::LoadScheduler;
pub use token::{LoadPriority, SyncToken};

use upload::{BufferSource, LoadRequest, Upload, Uploader};

/// Resource a pending upload writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PendingResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

struct LoaderState {
    scheduler: LoadScheduler<LoadRequest>,
    issued: SyncToken,
    completed: SyncToken,
    /// Latest token of every resource with uploads in flight.
    pending: HashMap<PendingResource, SyncToken>,
    exiting: bool,
}

/// State shared by the loader's callers and its worker.
pub(crate) struct LoaderShared {
    state: Mutex<LoaderState>,
    /// Signaled when work is enqueued or the loader exits.
    work: Condvar,
    /// Signaled when requests complete.
    progress: Condvar,
}

assert_impl_all!(LoaderShared: Send, Sync);

impl LoaderShared {
    /// Shared state whose counters start at `start`, all of it complete.
    fn new(start: SyncToken) -> Self {
        Self {
            state: Mutex::new(LoaderState {
                scheduler: LoadScheduler::new(),
                issued: start,
                completed: start,
                pending: HashMap::new(),
                exiting: false,
            }),
            work: Condvar::new(),
            progress: Condvar::new(),
        }
    }

    fn enqueue(&self, priority: LoadPriority, resource: PendingResource, upload: Upload) -> SyncToken {
        let mut state = self.state.lock();
        let counter = &mut state.issued.wait_index[priority.index()];
        *counter += 1;
        let token = SyncToken::at(priority, *counter);
        state.pending.entry(resource).or_default().merge(&token);
        state.scheduler.push(
            priority,
            LoadRequest {
                id: token.get(priority),
                upload,
            },
        );
        drop(state);
        self.work.notify_one();
        token
    }

    fn complete(&self, done: &[(LoadPriority, u64)]) {
        let mut state = self.state.lock();
        for &(priority, id) in done {
            let counter = &mut state.completed.wait_index[priority.index()];
            *counter = (*counter).max(id);
        }
        let completed = state.completed;
        state.pending.retain(|_, token| !completed.reaches(token));
        drop(state);
        self.progress.notify_all();
    }

    fn pending_token(&self, resource: PendingResource) -> Option<SyncToken> {
        self.state.lock().pending.get(&resource).copied()
    }

    fn is_completed(&self, token: &SyncToken) -> bool {
        self.state.lock().completed.reaches(token)
    }

    fn wait(&self, token: &SyncToken) -> RhiResult<()> {
        let mut state = self.state.lock();
        if !state.issued.reaches(token) {
            return Err(RhiError::InvalidParameter(format!(
                "token {:?} was never issued by this loader",
                token.wait_index
            )));
        }
        while !state.completed.reaches(token) {
            self.progress.wait(&mut state);
        }
        Ok(())
    }
}

/// Worker thread and staging configuration of a running loader.
pub struct ResourceLoader {
    shared: Arc<LoaderShared>,
    worker: Option<JoinHandle<()>>,
    desc: ResourceLoaderDesc,
}

impl ResourceLoader {
    /// Staging configuration the loader was started with.
    pub fn desc(&self) -> &ResourceLoaderDesc {
        &self.desc
    }
}

impl Drop for ResourceLoader {
    fn drop(&mut self) {
        self.shared.state.lock().exiting = true;
        self.shared.work.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Resource loader worker panicked");
            }
        }
        log::info!("Resource loader exited");
    }
}

enum Step {
    Upload(Vec<(LoadPriority, LoadRequest)>),
    Flush,
    Exit,
}

fn run_worker(shared: Arc<LoaderShared>, mut uploader: Uploader) {
    let mut complete = |done: &[(LoadPriority, u64)]| shared.complete(done);
    loop {
        let step = {
            let mut state = shared.state.lock();
            loop {
                if !state.scheduler.is_empty() {
                    break Step::Upload(state.scheduler.next_cycle());
                }
                if uploader.has_pending() {
                    break Step::Flush;
                }
                if state.exiting {
                    break Step::Exit;
                }
                shared.work.wait(&mut state);
            }
        };
        match step {
            Step::Upload(cycle) => {
                for (priority, request) in cycle {
                    let id = request.id;
                    if let Err(err) = uploader.upload(priority, request, &mut complete) {
                        log::error!("Resource load {priority:?} #{id} failed: {err}");
                    }
                }
                // One submission per drain cycle
                if let Err(err) = uploader.advance(&mut complete) {
                    log::error!("Resource loader submission failed: {err}");
                }
            }
            Step::Flush => {
                if let Err(err) = uploader.flush(&mut complete) {
                    log::error!("Resource loader flush failed: {err}");
                }
            }
            Step::Exit => break,
        }
    }
    drop(uploader);
}

impl Renderer {
    /// Start the resource loader. `None` uses [`ResourceLoaderDesc::default`].
    pub fn init_resource_loader(&self, desc: Option<&ResourceLoaderDesc>) -> RhiResult<()> {
        let mut loader = self.loader.lock();
        if loader.is_some() {
            return Err(RhiError::InvalidParameter("resource loader already initialized".into()));
        }
        let desc = desc.copied().unwrap_or_default();
        let uploader = Uploader::new(Arc::clone(self.device_arc()), &desc)?;
        let shared = Arc::new(LoaderShared::new(*self.retired_tokens.lock()));
        let worker_shared = Arc::clone(&shared);
        let spawned = std::thread::Builder::new()
            .name("rhi-resource-loader".into())
            .spawn(move || run_worker(worker_shared, uploader));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                log::error!("Failed to spawn resource loader thread: {err}");
                return Err(err.into());
            }
        };
        log::info!(
            "Resource loader started ({} staging buffers of {} bytes)",
            desc.buffer_count,
            desc.buffer_size
        );
        *loader = Some(ResourceLoader {
            shared,
            worker: Some(worker),
            desc,
        });
        Ok(())
    }

    /// Drain pending loads, join the worker and release its objects.
    /// Does nothing if the loader is not running.
    pub fn exit_resource_loader(&self) {
        let Some(loader) = self.loader.lock().take() else {
            return;
        };
        let shared = Arc::clone(&loader.shared);
        drop(loader);
        let state = shared.state.lock();
        self.retired_tokens.lock().merge(&state.issued.max(state.completed));
    }

    /// Returns true if the resource loader is running.
    pub fn has_resource_loader(&self) -> bool {
        self.loader.lock().is_some()
    }

    fn loader_shared(&self) -> Option<Arc<LoaderShared>> {
        self.loader.lock().as_ref().map(|loader| Arc::clone(&loader.shared))
    }

    fn require_loader(&self) -> RhiResult<Arc<LoaderShared>> {
        self.loader_shared().ok_or(RhiError::LoaderNotInitialized)
    }

    /// Create a buffer and schedule its upload.
    ///
    /// CPU-visible buffers are written directly and return a completed
    /// token. Without data or `force_reset` nothing is uploaded.
    pub fn add_buffer_resource(
        &self,
        desc: &BufferLoadDesc,
        priority: LoadPriority,
    ) -> RhiResult<(BufferHandle, SyncToken)> {
        let shared = self.require_loader()?;
        let source = match &desc.data {
            Some(data) if data.len() as u64 > desc.desc.size => {
                return Err(RhiError::InvalidParameter(format!(
                    "{} bytes of data for a buffer of {} bytes",
                    data.len(),
                    desc.desc.size
                )));
            }
            Some(data) if !data.is_empty() => Some(BufferSource::Bytes(data.clone())),
            _ if desc.force_reset => Some(BufferSource::Zeros(desc.desc.size)),
            _ => None,
        };

        let buffer = self.add_buffer(&desc.desc)?;
        let Some(source) = source else {
            return Ok((buffer, SyncToken::default()));
        };

        if desc.desc.memory_usage.is_cpu_visible() {
            if let Err(err) = self.write_mapped(buffer, &source) {
                let _ = self.remove_buffer(buffer);
                return Err(err);
            }
            return Ok((buffer, SyncToken::default()));
        }

        let token = shared.enqueue(
            priority,
            PendingResource::Buffer(buffer),
            Upload::Buffer {
                buffer,
                dst_offset: 0,
                source,
                final_state: desc.desc.resident_state(),
            },
        );
        log::debug!("Queued buffer {buffer:?} upload at {priority:?}");
        Ok((buffer, token))
    }

    fn write_mapped(&self, buffer: BufferHandle, source: &BufferSource) -> RhiResult<()> {
        let bytes = match source {
            BufferSource::Bytes(bytes) => bytes.clone(),
            BufferSource::Zeros(size) => vec![0; *size as usize],
        };
        let mut range = self.map_buffer(
            buffer,
            Some(ReadRange {
                offset: 0,
                size: bytes.len() as u64,
            }),
        )?;
        range.copy_from_slice(&bytes);
        self.unmap_buffer(range)
    }

    /// Create a texture and schedule its upload.
    ///
    /// File and binary images are decoded on the calling thread. If decoding
    /// fails and the request carries a `desc`, the failure is logged and an
    /// empty texture is created from it.
    pub fn add_texture_resource(
        &self,
        desc: &TextureLoadDesc,
        priority: LoadPriority,
    ) -> RhiResult<(TextureHandle, SyncToken)> {
        let shared = self.require_loader()?;
        let (image, name) = match self.texture_source(desc) {
            Ok(source) => source,
            Err(err) => match &desc.desc {
                Some(fallback) => {
                    log::error!("Texture load failed, creating it empty: {err}");
                    let texture = self.add_texture(fallback)?;
                    return Ok((texture, SyncToken::default()));
                }
                None => return Err(err),
            },
        };
        let Some(image) = image else {
            let Some(texture_desc) = &desc.desc else {
                return Err(RhiError::InvalidParameter(
                    "texture load needs a source or a desc".into(),
                ));
            };
            return Ok((self.add_texture(texture_desc)?, SyncToken::default()));
        };

        let mut texture_desc = image.texture_desc();
        texture_desc.flags = desc.creation_flags;
        texture_desc.node_index = desc.node_index;
        texture_desc.name = name;
        if let Some(requested) = &desc.desc {
            texture_desc.descriptors = requested.descriptors;
            if texture_desc.name.is_none() {
                texture_desc.name.clone_from(&requested.name);
            }
        }
        let texture = self.add_texture(&texture_desc)?;
        let token = shared.enqueue(
            priority,
            PendingResource::Texture(texture),
            Upload::Texture {
                texture,
                image,
                base_mip: 0,
                base_layer: 0,
                final_state: ResourceState::SHADER_RESOURCE,
            },
        );
        log::debug!(
            "Queued texture {texture:?} upload ({}x{} {:?}) at {priority:?}",
            texture_desc.width,
            texture_desc.height,
            texture_desc.format
        );
        Ok((texture, token))
    }

    fn texture_source(&self, desc: &TextureLoadDesc) -> RhiResult<(Option<RawImageData>, Option<String>)> {
        if let Some(path) = &desc.file_path {
            let directory = desc.directory.unwrap_or(crate::config::ResourceDirectory::Textures);
            let full_path = self.resource_directories().resolve(directory, path);
            let image = decode_file(&full_path)?;
            return Ok((Some(image), Some(path.display().to_string())));
        }
        if let Some(binary) = &desc.binary {
            return Ok((Some(decode_binary(&binary.data, &binary.extension)?), None));
        }
        Ok((desc.raw.clone(), None))
    }

    /// Hand out `desc.size` bytes to fill for a buffer update.
    pub fn begin_update_buffer_resource<'a>(&self, desc: &'a mut BufferUpdateDesc) -> RhiResult<&'a mut [u8]> {
        let buffer_desc = self.buffer_desc(desc.buffer)?;
        let end = desc.dst_offset.checked_add(desc.size);
        if desc.size == 0 || end.map_or(true, |end| end > buffer_desc.size) {
            return Err(RhiError::InvalidParameter(format!(
                "update of {} bytes at {} outside buffer of {} bytes",
                desc.size, desc.dst_offset, buffer_desc.size
            )));
        }
        Ok(desc.mapped.insert(vec![0; desc.size as usize]).as_mut_slice())
    }

    /// Schedule the copy of a buffer update at [`LoadPriority::Update`].
    pub fn end_update_buffer_resource(&self, mut desc: BufferUpdateDesc) -> RhiResult<SyncToken> {
        let shared = self.require_loader()?;
        let data = desc
            .mapped
            .take()
            .ok_or_else(|| RhiError::InvalidParameter("buffer update was not begun".into()))?;
        let final_state = self.buffer_desc(desc.buffer)?.resident_state();
        Ok(shared.enqueue(
            LoadPriority::Update,
            PendingResource::Buffer(desc.buffer),
            Upload::Buffer {
                buffer: desc.buffer,
                dst_offset: desc.dst_offset,
                source: BufferSource::Bytes(data),
                final_state,
            },
        ))
    }

    /// Hand out the bytes of one texture subresource to fill.
    ///
    /// Rows are `desc.row_stride` bytes apart, or tightly packed if it is 0.
    pub fn begin_update_texture_resource<'a>(&self, desc: &'a mut TextureUpdateDesc) -> RhiResult<&'a mut [u8]> {
        let image = self.update_image(desc, Vec::new())?;
        let (_, block_height) = image.format.block_extent();
        let rows = u64::from(image.height.div_ceil(block_height)) * u64::from(image.depth);
        let row_bytes = image.format.surface_size(image.width, block_height, 1);
        let row_pitch = if desc.row_stride == 0 {
            row_bytes
        } else {
            u64::from(desc.row_stride)
        };
        Ok(desc.mapped.insert(vec![0; (row_pitch * rows) as usize]).as_mut_slice())
    }

    /// Schedule the copy of a texture update at [`LoadPriority::Update`].
    pub fn end_update_texture_resource(&self, mut desc: TextureUpdateDesc) -> RhiResult<SyncToken> {
        let shared = self.require_loader()?;
        let data = desc
            .mapped
            .take()
            .ok_or_else(|| RhiError::InvalidParameter("texture update was not begun".into()))?;
        let image = self.update_image(&desc, data)?;
        upload::source_subresources(&image)?;
        Ok(shared.enqueue(
            LoadPriority::Update,
            PendingResource::Texture(desc.texture),
            Upload::Texture {
                texture: desc.texture,
                image,
                base_mip: desc.mip_level,
                base_layer: desc.array_layer,
                final_state: ResourceState::SHADER_RESOURCE,
            },
        ))
    }

    fn update_image(&self, desc: &TextureUpdateDesc, data: Vec<u8>) -> RhiResult<RawImageData> {
        let texture: TextureDesc = self.texture_desc(desc.texture)?;
        if desc.mip_level >= texture.mip_levels || desc.array_layer >= texture.array_size {
            return Err(RhiError::InvalidParameter(format!(
                "subresource mip {} layer {} outside texture with {} mips and {} layers",
                desc.mip_level, desc.array_layer, texture.mip_levels, texture.array_size
            )));
        }
        Ok(RawImageData {
            data,
            format: texture.format,
            width: (texture.width >> desc.mip_level).max(1),
            height: (texture.height >> desc.mip_level).max(1),
            depth: (texture.depth >> desc.mip_level).max(1),
            array_size: 1,
            mip_levels: 1,
            mips_after_slices: false,
            row_stride: desc.row_stride,
        })
    }

    /// Wait for pending uploads to `buffer`, then remove it.
    pub fn remove_buffer_resource(&self, buffer: BufferHandle) -> RhiResult<()> {
        if let Some(shared) = self.loader_shared() {
            if let Some(token) = shared.pending_token(PendingResource::Buffer(buffer)) {
                shared.wait(&token)?;
            }
        }
        self.remove_buffer(buffer)
    }

    /// Wait for pending uploads to `texture`, then remove it.
    pub fn remove_texture_resource(&self, texture: TextureHandle) -> RhiResult<()> {
        if let Some(shared) = self.loader_shared() {
            if let Some(token) = shared.pending_token(PendingResource::Texture(texture)) {
                shared.wait(&token)?;
            }
        }
        self.remove_texture(texture)
    }

    /// Returns true if every request issued so far has completed.
    pub fn all_resource_loads_completed(&self) -> bool {
        self.loader_shared().map_or(true, |shared| {
            let state = shared.state.lock();
            state.completed.reaches(&state.issued)
        })
    }

    /// Block until every request issued so far has completed.
    pub fn wait_for_all_resource_loads(&self) -> RhiResult<()> {
        let Some(shared) = self.loader_shared() else {
            return Ok(());
        };
        let issued = shared.state.lock().issued;
        shared.wait(&issued)
    }

    /// Snapshot of the completed counters of every priority class.
    pub fn get_last_token_completed(&self) -> SyncToken {
        match self.loader_shared() {
            Some(shared) => shared.state.lock().completed,
            None => *self.retired_tokens.lock(),
        }
    }

    /// Returns true if `token` has completed. Once true it stays true, also
    /// across a restart of the loader.
    pub fn is_token_completed(&self, token: &SyncToken) -> bool {
        self.loader_shared().map_or(true, |shared| shared.is_completed(token))
    }

    /// Block until `token` has completed.
    pub fn wait_for_token(&self, token: &SyncToken) -> RhiResult<()> {
        match self.loader_shared() {
            Some(shared) => shared.wait(token),
            None => Ok(()),
        }
    }
}
