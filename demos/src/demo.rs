//! Textured spinning cube driven through the RHI.
//!
//! [`CubeDemo`] owns a renderer and every object the frame loop needs:
//!
//! ```text
//! init:     renderer → loader → queue → cmd pool → cmds → FramePacer
//!           → swap chain + depth → vertex/index buffers → texture
//!           → sampler → shader → root signature → descriptor set → pipeline
//! tick:     acquire → record → submit → present → vsync change
//! on_size:  idle → recreate swap chain + depth → new projection
//! shutdown: idle → remove everything in reverse order
//! ```

use std::path::PathBuf;

use glam::Mat4;
use redlilium_rhi::types::{
    AddressMode, BindRenderTargetsDesc, BufferDesc, ClearValue, CmdDesc, CmdPoolDesc, CompareMode, CullMode,
    DepthStateDesc, DescriptorData, DescriptorSetDesc, DescriptorType, DescriptorUpdateFrequency,
    FenceStatus, GraphicsPipelineDesc, ImageFormat, IndexType, LoadActionsDesc, PipelineDesc,
    PipelineReflection, QueueDesc, QueueType, RasterizerStateDesc, RenderTargetBarrier,
    RenderTargetDesc, ResourceState, RootSignatureDesc, SamplerDesc, ScissorRect, ShaderResource,
    ShaderSemantic, ShaderStage, SwapChainDesc, VertexAttrib, VertexInput, VertexLayout, Viewport,
    WindowHandle,
};
use redlilium_rhi::{
    BufferHandle, BufferLoadDesc, CmdHandle, CmdPoolHandle, DescriptorSetHandle, FramePacer,
    LoadPriority, PipelineHandle, QueueHandle, RenderTargetHandle, Renderer, RhiError, RhiResult,
    RootSignatureHandle, SamplerHandle, ShaderHandle, ShaderLoadDesc, ShaderStageLoadDesc,
    SwapChainHandle, TextureHandle, TextureLoadDesc,
};

use crate::config::DemoSettings;
use crate::geometry::{self, CUBE_INDEX_COUNT, CUBE_INDICES, UV_OFFSET, VERTEX_STRIDE};
use crate::overlay::Overlay;

/// Depth attachment format.
pub const DEPTH_FORMAT: ImageFormat = ImageFormat::D32Sfloat;

/// Root constant block holding the model-view-projection matrix.
pub const MVP_ROOT_CONSTANT: &str = "UniformBlockRootConstant";

const TEXTURE_NAME: &str = "texture0";
const SAMPLER_NAME: &str = "samplerState0";
const CLEAR_COLOR: ClearValue = ClearValue::color(0.2, 0.2, 0.2, 0.0);
/// Spin speed in radians per second.
const ROTATION_SPEED: f32 = 0.8;
const CHECKERBOARD_SIZE: u32 = 64;

/// Counters the scenario tests check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemoStats {
    /// Swap chain image acquired by every tick, in order.
    pub frame_indices: Vec<u32>,
    /// `wait_queue_idle` calls made outside of shutdown.
    pub queue_idle_waits: u64,
    pub vsync_toggles: u64,
    pub swap_chain_recreations: u64,
    /// Times a tick blocked on its slot fence.
    pub fence_waits: u64,
    /// Slot fences still incomplete after the pacer's wait returned.
    pub incomplete_after_wait: u64,
    pub last_viewport: Option<Viewport>,
    pub last_scissor: Option<ScissorRect>,
}

/// Every RHI object the demo created.
struct GpuState {
    renderer: Renderer,
    queue: QueueHandle,
    cmd_pool: CmdPoolHandle,
    cmds: Vec<CmdHandle>,
    pacer: FramePacer,
    swap_chain: SwapChainHandle,
    depth_target: RenderTargetHandle,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    texture: TextureHandle,
    sampler: SamplerHandle,
    shader: ShaderHandle,
    root_signature: RootSignatureHandle,
    descriptor_set: DescriptorSetHandle,
    pipeline: PipelineHandle,
}

impl GpuState {
    /// Idle the GPU and remove every object in reverse creation order.
    fn destroy(self) -> RhiResult<()> {
        let renderer = &self.renderer;
        renderer.wait_queue_idle(self.queue)?;
        self.pacer.wait_idle(renderer)?;

        renderer.remove_pipeline(self.pipeline)?;
        renderer.remove_descriptor_set(self.descriptor_set)?;
        renderer.remove_root_signature(self.root_signature)?;
        renderer.remove_shader(self.shader)?;
        renderer.remove_sampler(self.sampler)?;
        renderer.remove_texture_resource(self.texture)?;
        renderer.remove_buffer_resource(self.index_buffer)?;
        renderer.remove_buffer_resource(self.vertex_buffer)?;
        renderer.remove_render_target(self.depth_target)?;
        renderer.remove_swap_chain(self.swap_chain)?;
        self.pacer.destroy(renderer)?;
        renderer.remove_cmd_n(&self.cmds)?;
        renderer.remove_cmd_pool(self.cmd_pool)?;
        renderer.remove_queue(self.queue)?;
        renderer.exit_resource_loader();
        self.renderer.shutdown()
    }

    fn swap_chain_desc(&self, width: u32, height: u32, vsync: bool, window: Option<WindowHandle>) -> SwapChainDesc {
        swap_chain_desc(self.queue, width, height, self.cmds.len() as u32, vsync, window)
    }
}

fn swap_chain_desc(
    queue: QueueHandle,
    width: u32,
    height: u32,
    image_count: u32,
    vsync: bool,
    window: Option<WindowHandle>,
) -> SwapChainDesc {
    let desc = SwapChainDesc::new(queue, width, height, image_count).with_vsync(vsync);
    match window {
        Some(window) => desc.with_window(window),
        None => desc,
    }
}

fn depth_target_desc(width: u32, height: u32) -> RenderTargetDesc {
    RenderTargetDesc::new_2d(width, height, DEPTH_FORMAT)
        .with_clear_value(ClearValue::depth(1.0))
        .with_name("Depth Buffer")
}

fn shader_load_desc() -> ShaderLoadDesc {
    ShaderLoadDesc {
        vert: Some(ShaderStageLoadDesc::new("demo.vert")),
        frag: Some(ShaderStageLoadDesc::new("demo.frag")),
        reflection: PipelineReflection {
            shader_stages: ShaderStage::VERT | ShaderStage::FRAG,
            resources: vec![
                ShaderResource::new(TEXTURE_NAME, DescriptorType::TEXTURE, 0, 0, ShaderStage::FRAG),
                ShaderResource::new(SAMPLER_NAME, DescriptorType::SAMPLER, 0, 1, ShaderStage::FRAG),
                ShaderResource::root_constant(MVP_ROOT_CONSTANT, 64, ShaderStage::VERT),
            ],
            vertex_inputs: vec![
                VertexInput {
                    name: "POSITION".into(),
                    size: 12,
                },
                VertexInput {
                    name: "TEXCOORD".into(),
                    size: 8,
                },
            ],
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Textured spinning cube.
pub struct CubeDemo {
    gpu: Option<GpuState>,
    window: Option<WindowHandle>,
    width: u32,
    height: u32,
    desired_vsync: bool,
    rotation: f32,
    projection: Mat4,
    view: Mat4,
    overlay: Option<Box<dyn Overlay>>,
    stats: DemoStats,
}

impl CubeDemo {
    /// Create the renderer and every object the frame loop uses.
    ///
    /// `window` is the surface to present into. Without one the swap chain
    /// is offscreen.
    pub fn init(settings: &DemoSettings, window: Option<WindowHandle>) -> RhiResult<Self> {
        let renderer = Renderer::new("RedLilium Cube", &settings.renderer)?;
        renderer.init_resource_loader(None)?;

        let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics))?;
        let cmd_pool = renderer.add_cmd_pool(&CmdPoolDesc::new(queue))?;
        let cmds = renderer.add_cmd_n(&CmdDesc::new(cmd_pool), settings.image_count)?;
        let pacer = FramePacer::new(&renderer, settings.image_count)?;

        let swap_chain = renderer.add_swap_chain(&swap_chain_desc(
            queue,
            settings.width,
            settings.height,
            settings.image_count,
            settings.vsync,
            window,
        ))?;
        let depth_target = renderer.add_render_target(&depth_target_desc(settings.width, settings.height))?;

        let vertices = geometry::cube_vertices();
        let vertex_size = (vertices.len() as u32 * VERTEX_STRIDE) as u64;
        let (vertex_buffer, _) = renderer.add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(vertex_size, DescriptorType::VERTEX_BUFFER)).with_contents(&vertices),
            LoadPriority::Normal,
        )?;
        let (index_buffer, _) = renderer.add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(
                std::mem::size_of_val(&CUBE_INDICES) as u64,
                DescriptorType::INDEX_BUFFER,
            ))
            .with_contents(&CUBE_INDICES),
            LoadPriority::Normal,
        )?;
        let texture = load_texture(&renderer, settings.texture.as_ref())?;

        let sampler = renderer.add_sampler(&SamplerDesc::trilinear(AddressMode::ClampToEdge))?;
        let shader = renderer.add_shader_resource(&shader_load_desc())?;
        let root_signature = renderer
            .add_root_signature(&RootSignatureDesc::new(vec![shader]).with_static_sampler(SAMPLER_NAME, sampler))?;

        // The descriptor set references the texture, which must be resident
        renderer.wait_for_all_resource_loads()?;
        let descriptor_set = renderer.add_descriptor_set(&DescriptorSetDesc::new(
            root_signature,
            DescriptorUpdateFrequency::None,
            1,
        ))?;
        renderer.update_descriptor_set(0, descriptor_set, &[DescriptorData::texture(TEXTURE_NAME, texture)])?;

        let back_buffer = renderer.swap_chain_get_render_target(swap_chain, 0)?;
        let color_format = renderer.render_target_get_desc(back_buffer)?.format;
        let depth_format = renderer.render_target_get_desc(depth_target)?.format;
        let pipeline = renderer.add_pipeline(&PipelineDesc::Graphics(GraphicsPipelineDesc {
            vertex_layout: Some(VertexLayout::new(vec![
                VertexAttrib::new(ShaderSemantic::Position, ImageFormat::R32G32B32Sfloat, 0, 0),
                VertexAttrib::new(ShaderSemantic::Texcoord0, ImageFormat::R32G32Sfloat, 1, UV_OFFSET),
            ])),
            depth_state: Some(DepthStateDesc::depth_test_write(CompareMode::LessEqual)),
            rasterizer_state: Some(RasterizerStateDesc::with_cull(CullMode::Back)),
            color_formats: vec![color_format],
            depth_stencil_format: depth_format,
            ..GraphicsPipelineDesc::new(shader, root_signature)
        }))?;

        log::info!(
            "Cube demo initialized: {}x{}, {} images, vsync {}",
            settings.width,
            settings.height,
            settings.image_count,
            settings.vsync
        );

        Ok(Self {
            gpu: Some(GpuState {
                renderer,
                queue,
                cmd_pool,
                cmds,
                pacer,
                swap_chain,
                depth_target,
                vertex_buffer,
                index_buffer,
                texture,
                sampler,
                shader,
                root_signature,
                descriptor_set,
                pipeline,
            }),
            window,
            width: settings.width,
            height: settings.height,
            desired_vsync: settings.vsync,
            rotation: 0.0,
            projection: geometry::projection(settings.width, settings.height),
            view: geometry::view(),
            overlay: None,
            stats: DemoStats::default(),
        })
    }

    fn gpu(&self) -> RhiResult<&GpuState> {
        self.gpu
            .as_ref()
            .ok_or_else(|| RhiError::InvalidParameter("demo was shut down".into()))
    }

    /// Advance the cube by `dt` seconds and render one frame.
    ///
    /// A frame that fails after its image was acquired hands the image back
    /// before returning the error, so the next tick can run.
    pub fn tick(&mut self, dt: f32) -> RhiResult<()> {
        self.rotation += dt * ROTATION_SPEED;
        let mvp = self.projection * self.view * geometry::model(self.rotation);

        let Some(gpu) = self.gpu.as_mut() else {
            return Err(RhiError::InvalidParameter("demo was shut down".into()));
        };

        let index = gpu.pacer.acquire(&gpu.renderer, gpu.swap_chain)?;
        self.stats.frame_indices.push(index);
        self.stats.fence_waits = gpu.pacer.fence_waits();

        let cmd = gpu.cmds[index as usize];
        let mut result = record_frame(gpu, &mut self.overlay, &mut self.stats, index, &mvp);
        if result.is_ok() {
            result = gpu.pacer.submit(&gpu.renderer, gpu.queue, &[cmd]);
        }
        if result.is_ok() {
            result = gpu.pacer.present(&gpu.renderer, gpu.queue, gpu.swap_chain);
        }
        if let Err(err) = result {
            if let Err(release) = gpu.pacer.abandon(&gpu.renderer, gpu.queue, gpu.swap_chain, cmd) {
                log::error!("Failed to release image {index} after a failed frame: {release}");
            }
            return Err(err);
        }

        let renderer = &gpu.renderer;
        if renderer.swap_chain_get_vsync(gpu.swap_chain)? != self.desired_vsync {
            renderer.wait_queue_idle(gpu.queue)?;
            self.stats.queue_idle_waits += 1;
            renderer.toggle_vsync(gpu.swap_chain)?;
            self.stats.vsync_toggles += 1;
            log::info!("VSync {}", if self.desired_vsync { "enabled" } else { "disabled" });
        }
        Ok(())
    }

    /// Recreate the size-dependent objects for a `width` x `height` target.
    ///
    /// A zero-sized target (a minimized window) is ignored.
    pub fn on_size(&mut self, width: u32, height: u32) -> RhiResult<()> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {width}x{height}");
            return Ok(());
        }
        let Some(gpu) = self.gpu.as_mut() else {
            return Err(RhiError::InvalidParameter("demo was shut down".into()));
        };
        let renderer = &gpu.renderer;

        renderer.wait_queue_idle(gpu.queue)?;
        self.stats.queue_idle_waits += 1;

        let vsync = renderer.swap_chain_get_vsync(gpu.swap_chain)?;
        renderer.remove_swap_chain(gpu.swap_chain)?;
        renderer.remove_render_target(gpu.depth_target)?;

        gpu.swap_chain = renderer.add_swap_chain(&gpu.swap_chain_desc(width, height, vsync, self.window))?;
        gpu.depth_target = renderer.add_render_target(&depth_target_desc(width, height))?;

        log::info!("Resized {}x{} -> {width}x{height}", self.width, self.height);
        self.width = width;
        self.height = height;
        self.projection = geometry::projection(width, height);
        self.stats.swap_chain_recreations += 1;
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.on_size(width, height);
        }
        Ok(())
    }

    /// Request vsync on or off. Applied at the end of the next tick.
    pub fn set_vsync(&mut self, vsync: bool) {
        self.desired_vsync = vsync;
    }

    /// Vsync state the next tick will converge to.
    pub fn desired_vsync(&self) -> bool {
        self.desired_vsync
    }

    /// Install the consumer of the overlay pass.
    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) {
        self.overlay = Some(overlay);
    }

    /// Current target size.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Counters recorded so far.
    pub fn stats(&self) -> &DemoStats {
        &self.stats
    }

    /// Renderer, until shutdown.
    pub fn renderer(&self) -> Option<&Renderer> {
        self.gpu.as_ref().map(|gpu| &gpu.renderer)
    }

    /// Current swap chain.
    pub fn swap_chain(&self) -> Option<SwapChainHandle> {
        self.gpu.as_ref().map(|gpu| gpu.swap_chain)
    }

    /// Current depth target.
    pub fn depth_target(&self) -> Option<RenderTargetHandle> {
        self.gpu.as_ref().map(|gpu| gpu.depth_target)
    }

    /// Frames rendered.
    pub fn frame_count(&self) -> u64 {
        self.gpu().map_or(0, |gpu| gpu.pacer.frame_count())
    }

    /// Idle the GPU and destroy everything, reporting the first failure.
    pub fn shutdown(mut self) -> RhiResult<()> {
        match self.gpu.take() {
            Some(gpu) => {
                let result = gpu.destroy();
                log::info!("Cube demo shut down");
                result
            }
            None => Ok(()),
        }
    }
}

/// Record the cube and overlay passes of image `index` into its command buffer.
fn record_frame(
    gpu: &GpuState,
    overlay: &mut Option<Box<dyn Overlay>>,
    stats: &mut DemoStats,
    index: u32,
    mvp: &Mat4,
) -> RhiResult<()> {
    let renderer = &gpu.renderer;
    if let Some(fence) = gpu.pacer.fence(index) {
        if renderer.get_fence_status(fence)? == FenceStatus::Incomplete {
            stats.incomplete_after_wait += 1;
        }
    }

    let cmd = gpu.cmds[index as usize];
    let render_target = renderer.swap_chain_get_render_target(gpu.swap_chain, index)?;
    let target_desc = renderer.render_target_get_desc(render_target)?;

    renderer.begin_cmd(cmd)?;
    renderer.cmd_resource_barrier(
        cmd,
        &[],
        &[],
        &[
            RenderTargetBarrier::new(render_target, ResourceState::RENDER_TARGET),
            RenderTargetBarrier::new(gpu.depth_target, ResourceState::DEPTH_WRITE),
        ],
    )?;
    renderer.cmd_bind_render_targets(
        cmd,
        &BindRenderTargetsDesc::new(vec![render_target], Some(gpu.depth_target))
            .with_load_actions(LoadActionsDesc::clear(CLEAR_COLOR, Some(ClearValue::depth(1.0)))),
    )?;
    let viewport = Viewport::from_dimensions(target_desc.width, target_desc.height);
    let scissor = ScissorRect::from_dimensions(target_desc.width, target_desc.height);
    renderer.cmd_set_viewport(cmd, viewport)?;
    renderer.cmd_set_scissor(cmd, scissor)?;
    stats.last_viewport = Some(viewport);
    stats.last_scissor = Some(scissor);

    renderer.cmd_bind_descriptor_set(cmd, 0, gpu.descriptor_set)?;
    renderer.cmd_bind_pipeline(cmd, gpu.pipeline)?;
    renderer.cmd_bind_index_buffer(cmd, gpu.index_buffer, IndexType::Uint16, 0)?;
    renderer.cmd_bind_vertex_buffer(cmd, &[gpu.vertex_buffer], &[VERTEX_STRIDE], None)?;
    renderer.cmd_bind_push_constants(cmd, gpu.root_signature, MVP_ROOT_CONSTANT, bytemuck::bytes_of(mvp))?;
    renderer.cmd_draw_indexed(cmd, CUBE_INDEX_COUNT, 0, 0)?;

    // Overlay pass draws over the cube without depth
    renderer.cmd_bind_render_targets(
        cmd,
        &BindRenderTargetsDesc::new(vec![render_target], None).with_load_actions(LoadActionsDesc::load()),
    )?;
    if let Some(overlay) = overlay.as_mut() {
        overlay.draw(renderer, cmd, render_target)?;
    }

    renderer.cmd_bind_render_targets(cmd, &BindRenderTargetsDesc::unbind())?;
    renderer.cmd_resource_barrier(
        cmd,
        &[],
        &[],
        &[RenderTargetBarrier::new(render_target, ResourceState::PRESENT)],
    )?;
    renderer.end_cmd(cmd)
}

impl Drop for CubeDemo {
    fn drop(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            if let Err(e) = gpu.destroy() {
                log::error!("Cube demo teardown failed: {e}");
            }
        }
    }
}

/// Upload the configured texture file, or the checkerboard when none is set
/// or the file cannot be decoded.
fn load_texture(renderer: &Renderer, file: Option<&PathBuf>) -> RhiResult<TextureHandle> {
    if let Some(path) = file {
        match renderer.add_texture_resource(&TextureLoadDesc::from_file(path.clone()), LoadPriority::Normal) {
            Ok((texture, _)) => return Ok(texture),
            Err(e) => log::warn!("Failed to load texture {}: {e}; using checkerboard", path.display()),
        }
    }
    let (texture, _) = renderer.add_texture_resource(
        &TextureLoadDesc::from_raw(geometry::checkerboard(CHECKERBOARD_SIZE, 8)),
        LoadPriority::Normal,
    )?;
    Ok(texture)
}
