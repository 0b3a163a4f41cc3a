use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_rhi::loader::LoadScheduler;
use redlilium_rhi::types::{
    BufferBarrier, BufferDesc, CmdDesc, CmdPoolDesc, DescriptorType, QueueDesc, QueueType,
    ResourceMemoryUsage, ResourceState, TextureDesc, ImageFormat,
};
use redlilium_rhi::{LoadPriority, Renderer, RendererDesc, SyncToken};

// ---------------------------------------------------------------------------
// Command recording
// ---------------------------------------------------------------------------

fn bench_record_copy_commands(c: &mut Criterion) {
    let renderer = Renderer::new("bench", &RendererDesc::default()).unwrap();
    let queue = renderer.add_queue(&QueueDesc::new(QueueType::Graphics)).unwrap();
    let pool = renderer.add_cmd_pool(&CmdPoolDesc::new(queue)).unwrap();
    let cmd = renderer.add_cmd(&CmdDesc::new(pool)).unwrap();
    let src = renderer
        .add_buffer(&BufferDesc::new(4096, DescriptorType::empty()).with_memory_usage(ResourceMemoryUsage::CpuToGpu))
        .unwrap();
    let dst = renderer
        .add_buffer(&BufferDesc::new(4096, DescriptorType::VERTEX_BUFFER))
        .unwrap();

    c.bench_function("record_64_copies_with_barriers", |b| {
        b.iter(|| {
            renderer.begin_cmd(cmd).unwrap();
            renderer
                .cmd_resource_barrier(cmd, &[BufferBarrier::new(dst, ResourceState::COPY_DEST)], &[], &[])
                .unwrap();
            for i in 0..64 {
                renderer.cmd_update_buffer(cmd, dst, i * 64, src, i * 64, 64).unwrap();
            }
            renderer
                .cmd_resource_barrier(
                    cmd,
                    &[BufferBarrier::new(dst, ResourceState::VERTEX_AND_CONSTANT_BUFFER)],
                    &[],
                    &[],
                )
                .unwrap();
            renderer.end_cmd(cmd).unwrap();
        });
    });

    renderer.remove_buffer(dst).unwrap();
    renderer.remove_buffer(src).unwrap();
    renderer.remove_cmd(cmd).unwrap();
    renderer.remove_cmd_pool(pool).unwrap();
    renderer.remove_queue(queue).unwrap();
}

// ---------------------------------------------------------------------------
// Resource creation
// ---------------------------------------------------------------------------

fn bench_dummy_buffer_lifecycle(c: &mut Criterion) {
    let renderer = Renderer::new("bench", &RendererDesc::default()).unwrap();

    c.bench_function("dummy_add_remove_buffer_1kb", |b| {
        b.iter(|| {
            let buffer = renderer
                .add_buffer(&BufferDesc::new(1024, DescriptorType::VERTEX_BUFFER))
                .unwrap();
            renderer.remove_buffer(black_box(buffer)).unwrap();
        });
    });
}

fn bench_dummy_texture_lifecycle(c: &mut Criterion) {
    let renderer = Renderer::new("bench", &RendererDesc::default()).unwrap();

    c.bench_function("dummy_add_remove_texture_256x256", |b| {
        b.iter(|| {
            let texture = renderer
                .add_texture(&TextureDesc::new_2d(256, 256, ImageFormat::R8G8B8A8Unorm))
                .unwrap();
            renderer.remove_texture(black_box(texture)).unwrap();
        });
    });
}

// ---------------------------------------------------------------------------
// Loader bookkeeping
// ---------------------------------------------------------------------------

fn bench_scheduler_drain(c: &mut Criterion) {
    c.bench_function("scheduler_drain_1000_mixed", |b| {
        b.iter(|| {
            let mut scheduler = LoadScheduler::new();
            for i in 0..1000u64 {
                scheduler.push(LoadPriority::ALL[(i % 4) as usize], i);
            }
            let mut drained = 0;
            while !scheduler.is_empty() {
                drained += scheduler.next_cycle().len();
            }
            black_box(drained);
        });
    });
}

fn bench_token_merge(c: &mut Criterion) {
    let tokens: Vec<SyncToken> = (0..256u64)
        .map(|i| SyncToken::at(LoadPriority::ALL[(i % 4) as usize], i))
        .collect();
    c.bench_function("sync_token_merge_256", |b| {
        b.iter(|| {
            let mut merged = SyncToken::default();
            for token in &tokens {
                merged.merge(token);
            }
            black_box(merged.reaches(&tokens[0]));
        });
    });
}

criterion_group!(
    benches,
    bench_record_copy_commands,
    bench_dummy_buffer_lifecycle,
    bench_dummy_texture_lifecycle,
    bench_scheduler_drain,
    bench_token_merge,
);
criterion_main!(benches);
