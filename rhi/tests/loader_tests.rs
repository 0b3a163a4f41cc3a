//! Resource loader integration tests.
//!
//! Uploads run on the loader's worker thread against the dummy backend,
//! whose host-backed storage lets every test read the results back.

mod common;

use std::time::Duration;

use rstest::rstest;

use common::{generate_test_pattern, TestContext};
use redlilium_rhi::types::{
    BufferDesc, DescriptorType, ImageFormat, ResourceMemoryUsage, ResourceState, TextureDesc,
};
use redlilium_rhi::{
    BufferLoadDesc, BufferUpdateDesc, LoadPriority, RawImageData, ResourceDirectories,
    ResourceLoaderDesc, RhiError, SyncToken, TextureLoadDesc, TextureUpdateDesc,
};

fn staging(buffer_size: u64) -> Option<ResourceLoaderDesc> {
    Some(ResourceLoaderDesc {
        buffer_size,
        buffer_count: 2,
    })
}

// ============================================================================
// Buffer Loads
// ============================================================================

#[rstest]
#[case::single_chunk(1 << 20)]
#[case::many_chunks(64)]
#[case::uneven_chunks(100)]
fn test_buffer_upload_roundtrip(#[case] buffer_size: u64) {
    let ctx = TestContext::new().with_loader(staging(buffer_size));
    let renderer = &ctx.renderer;
    let data = generate_test_pattern(1000);

    let (buffer, token) = renderer
        .add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(1000, DescriptorType::VERTEX_BUFFER)).with_data(data.clone()),
            LoadPriority::Normal,
        )
        .unwrap();
    assert_eq!(token.get(LoadPriority::Normal), 1);
    renderer.wait_for_token(&token).unwrap();

    assert!(renderer.is_token_completed(&token));
    assert_eq!(renderer.read_buffer(buffer, None).unwrap(), data);
    assert_eq!(
        renderer.buffer_state(buffer).unwrap(),
        ResourceState::VERTEX_AND_CONSTANT_BUFFER
    );

    renderer.remove_buffer_resource(buffer).unwrap();
    ctx.teardown();
}

#[test]
fn test_skipped_and_reset_uploads() {
    let ctx = TestContext::new().with_loader(None);
    let renderer = &ctx.renderer;

    // No data and no reset: created, nothing uploaded
    let (lazy, token) = renderer
        .add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(64, DescriptorType::BUFFER)),
            LoadPriority::Low,
        )
        .unwrap();
    assert_eq!(token, SyncToken::default());
    assert!(renderer.is_token_completed(&token));

    let (reset, token) = renderer
        .add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(64, DescriptorType::BUFFER)).with_force_reset(true),
            LoadPriority::Low,
        )
        .unwrap();
    renderer.wait_for_token(&token).unwrap();
    assert_eq!(renderer.read_buffer(reset, None).unwrap(), vec![0; 64]);

    // Oversized data is rejected before anything is created
    let oversized = renderer.add_buffer_resource(
        &BufferLoadDesc::new(BufferDesc::new(4, DescriptorType::BUFFER)).with_data(vec![1; 8]),
        LoadPriority::Low,
    );
    assert!(matches!(oversized, Err(RhiError::InvalidParameter(_))));

    renderer.remove_buffer_resource(lazy).unwrap();
    renderer.remove_buffer_resource(reset).unwrap();
    ctx.teardown();
}

#[test]
fn test_cpu_visible_buffer_written_directly() {
    let ctx = TestContext::new().with_loader(None);
    let renderer = &ctx.renderer;
    let values: [u32; 4] = [1, 2, 3, 4];

    let (buffer, token) = renderer
        .add_buffer_resource(
            &BufferLoadDesc::new(
                BufferDesc::new(16, DescriptorType::UNIFORM_BUFFER)
                    .with_memory_usage(ResourceMemoryUsage::CpuToGpu),
            )
            .with_contents(&values),
            LoadPriority::High,
        )
        .unwrap();
    assert!(renderer.is_token_completed(&token));
    assert_eq!(
        renderer.read_buffer(buffer, None).unwrap(),
        bytemuck::cast_slice::<u32, u8>(&values)
    );

    renderer.remove_buffer_resource(buffer).unwrap();
    ctx.teardown();
}

#[test]
fn test_buffer_update_streams_through_update_priority() {
    let ctx = TestContext::new().with_loader(None);
    let renderer = &ctx.renderer;
    let (buffer, token) = renderer
        .add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(32, DescriptorType::BUFFER)).with_data(vec![7; 32]),
            LoadPriority::Normal,
        )
        .unwrap();
    renderer.wait_for_token(&token).unwrap();

    let mut update = BufferUpdateDesc::new(buffer, 8, 4);
    renderer
        .begin_update_buffer_resource(&mut update)
        .unwrap()
        .copy_from_slice(&[1, 2, 3, 4]);
    let token = renderer.end_update_buffer_resource(update).unwrap();
    assert_eq!(token.get(LoadPriority::Update), 1);
    renderer.wait_for_token(&token).unwrap();

    let contents = renderer.read_buffer(buffer, None).unwrap();
    assert_eq!(&contents[..8], &[7; 8]);
    assert_eq!(&contents[8..12], &[1, 2, 3, 4]);
    assert_eq!(&contents[12..], &[7; 20]);

    // Ending an update that was never begun is an error
    assert!(renderer
        .end_update_buffer_resource(BufferUpdateDesc::new(buffer, 0, 4))
        .is_err());
    // So is an update outside the buffer
    let mut outside = BufferUpdateDesc::new(buffer, 30, 4);
    assert!(renderer.begin_update_buffer_resource(&mut outside).is_err());

    renderer.remove_buffer_resource(buffer).unwrap();
    ctx.teardown();
}

// ============================================================================
// Texture Loads
// ============================================================================

#[rstest]
#[case::single_chunk(1 << 20)]
#[case::row_groups(256)]
#[case::single_rows(64)]
fn test_raw_texture_upload(#[case] buffer_size: u64) {
    let ctx = TestContext::new().with_loader(staging(buffer_size));
    let renderer = &ctx.renderer;
    let texels = generate_test_pattern(16 * 16 * 4);

    let (texture, token) = renderer
        .add_texture_resource(
            &TextureLoadDesc::from_raw(RawImageData::new_2d(
                texels.clone(),
                ImageFormat::R8G8B8A8Unorm,
                16,
                16,
            )),
            LoadPriority::High,
        )
        .unwrap();
    renderer.wait_for_token(&token).unwrap();

    assert_eq!(renderer.texture_contents(texture, 0, 0).unwrap(), texels);
    assert_eq!(renderer.texture_state(texture).unwrap(), ResourceState::SHADER_RESOURCE);

    renderer.remove_texture_resource(texture).unwrap();
    ctx.teardown();
}

#[test]
fn test_raw_texture_row_stride_and_mips() {
    let ctx = TestContext::new().with_loader(None);
    let renderer = &ctx.renderer;

    // 2x2 RGBA8 mip 0 with 4 bytes of row padding, then a packed 1x1 mip 1
    let mut data = Vec::new();
    data.extend_from_slice(&[1; 8]);
    data.extend_from_slice(&[0xEE; 4]);
    data.extend_from_slice(&[2; 8]);
    data.extend_from_slice(&[0xEE; 4]);
    data.extend_from_slice(&[3; 4]);
    let mut image = RawImageData::new_2d(data, ImageFormat::R8G8B8A8Unorm, 2, 2);
    image.row_stride = 12;
    image.mip_levels = 2;

    let (texture, token) = renderer
        .add_texture_resource(&TextureLoadDesc::from_raw(image), LoadPriority::Normal)
        .unwrap();
    renderer.wait_for_token(&token).unwrap();

    let mut mip0 = vec![1; 8];
    mip0.extend_from_slice(&[2; 8]);
    assert_eq!(renderer.texture_contents(texture, 0, 0).unwrap(), mip0);
    assert_eq!(renderer.texture_contents(texture, 1, 0).unwrap(), vec![3; 4]);

    renderer.remove_texture_resource(texture).unwrap();
    ctx.teardown();
}

#[test]
fn test_texture_from_file() {
    let root = std::env::temp_dir().join(format!("redlilium-rhi-loader-{}", std::process::id()));
    let textures = root.join("textures");
    std::fs::create_dir_all(&textures).unwrap();
    let png = image::RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8, y as u8, 9, 255]));
    png.save(textures.join("tiny.png")).unwrap();

    let desc = redlilium_rhi::RendererDesc::default()
        .with_validation(true)
        .with_resource_directories(ResourceDirectories::new(&root));
    let ctx = TestContext::with_desc(&desc).with_loader(None);
    let renderer = &ctx.renderer;

    let (texture, token) = renderer
        .add_texture_resource(&TextureLoadDesc::from_file("tiny.png"), LoadPriority::Normal)
        .unwrap();
    renderer.wait_for_token(&token).unwrap();
    let texture_desc = renderer.texture_desc(texture).unwrap();
    assert_eq!((texture_desc.width, texture_desc.height), (3, 2));
    assert_eq!(texture_desc.format, ImageFormat::R8G8B8A8Unorm);
    assert_eq!(renderer.texture_contents(texture, 0, 0).unwrap(), png.into_raw());

    // A missing file without a fallback desc fails
    let missing = renderer.add_texture_resource(&TextureLoadDesc::from_file("missing.png"), LoadPriority::Normal);
    assert!(matches!(missing, Err(RhiError::Io(_))));

    // With a fallback desc the failure is logged and an empty texture created
    let fallback = TextureLoadDesc {
        desc: Some(TextureDesc::new_2d(4, 4, ImageFormat::R8G8B8A8Unorm)),
        ..TextureLoadDesc::from_file("missing.png")
    };
    let (empty, token) = renderer.add_texture_resource(&fallback, LoadPriority::Normal).unwrap();
    assert!(renderer.is_token_completed(&token));
    assert_eq!(renderer.texture_get_width(empty).unwrap(), 4);

    renderer.remove_texture_resource(texture).unwrap();
    renderer.remove_texture_resource(empty).unwrap();
    ctx.teardown();
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn test_texture_update_rewrites_subresource() {
    let ctx = TestContext::new().with_loader(None);
    let renderer = &ctx.renderer;
    let (texture, token) = renderer
        .add_texture_resource(
            &TextureLoadDesc::from_raw(RawImageData::new_2d(vec![0; 4 * 4], ImageFormat::R8Unorm, 4, 4)),
            LoadPriority::Normal,
        )
        .unwrap();
    renderer.wait_for_token(&token).unwrap();

    let mut update = TextureUpdateDesc::new(texture);
    let mapped = renderer.begin_update_texture_resource(&mut update).unwrap();
    assert_eq!(mapped.len(), 16);
    mapped.copy_from_slice(&generate_test_pattern(16));
    let token = renderer.end_update_texture_resource(update).unwrap();
    renderer.wait_for_token(&token).unwrap();
    assert_eq!(renderer.texture_contents(texture, 0, 0).unwrap(), generate_test_pattern(16));

    let mut out_of_range = TextureUpdateDesc::new(texture).with_subresource(1, 0);
    assert!(renderer.begin_update_texture_resource(&mut out_of_range).is_err());

    renderer.remove_texture_resource(texture).unwrap();
    ctx.teardown();
}

#[test]
fn test_texture_load_needs_source_or_desc() {
    let ctx = TestContext::new().with_loader(None);
    let result = ctx
        .renderer
        .add_texture_resource(&TextureLoadDesc::default(), LoadPriority::Normal);
    assert!(matches!(result, Err(RhiError::InvalidParameter(_))));
    ctx.teardown();
}

// ============================================================================
// Tokens and Scheduling
// ============================================================================

#[test]
fn test_token_monotonicity() {
    let ctx = TestContext::with_submit_delay(Duration::from_millis(2)).with_loader(None);
    let renderer = &ctx.renderer;

    let mut buffers = Vec::new();
    let mut tokens: Vec<SyncToken> = Vec::new();
    for i in 0..6u8 {
        let (buffer, token) = renderer
            .add_buffer_resource(
                &BufferLoadDesc::new(BufferDesc::new(16, DescriptorType::BUFFER)).with_data(vec![i; 16]),
                LoadPriority::Normal,
            )
            .unwrap();
        if let Some(previous) = tokens.last() {
            assert!(token.get(LoadPriority::Normal) > previous.get(LoadPriority::Normal));
        }
        buffers.push(buffer);
        tokens.push(token);
    }

    let last = tokens[tokens.len() - 1];
    renderer.wait_for_token(&last).unwrap();
    // Completion within a class is FIFO, so every earlier token is done too
    for token in &tokens {
        assert!(renderer.is_token_completed(token));
    }
    assert!(renderer.get_last_token_completed().reaches(&last));

    // Completion is sticky across later enqueues
    let (extra, _) = renderer
        .add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(16, DescriptorType::BUFFER)).with_force_reset(true),
            LoadPriority::Normal,
        )
        .unwrap();
    assert!(renderer.is_token_completed(&tokens[0]));
    renderer.wait_for_all_resource_loads().unwrap();
    assert!(renderer.all_resource_loads_completed());

    for buffer in buffers.into_iter().chain([extra]) {
        renderer.remove_buffer_resource(buffer).unwrap();
    }
    ctx.teardown();
}

#[test]
fn test_high_priority_not_starved_by_low() {
    let ctx = TestContext::with_submit_delay(Duration::from_millis(20)).with_loader(None);
    let renderer = &ctx.renderer;
    let load = |priority| {
        renderer
            .add_buffer_resource(
                &BufferLoadDesc::new(BufferDesc::new(256, DescriptorType::BUFFER)).with_force_reset(true),
                priority,
            )
            .unwrap()
    };

    let lows: Vec<_> = (0..10).map(|_| load(LoadPriority::Low)).collect();
    let (high, high_token) = load(LoadPriority::High);

    renderer.wait_for_token(&high_token).unwrap();
    let low_done = renderer.get_last_token_completed().get(LoadPriority::Low);
    assert!(low_done <= 3, "{low_done} low-priority loads completed before the high one");

    renderer.wait_for_all_resource_loads().unwrap();
    assert_eq!(renderer.get_last_token_completed().get(LoadPriority::Low), 10);

    renderer.remove_buffer_resource(high).unwrap();
    for (buffer, _) in lows {
        renderer.remove_buffer_resource(buffer).unwrap();
    }
    ctx.teardown();
}

#[test]
fn test_remove_waits_for_pending_upload() {
    let ctx = TestContext::with_submit_delay(Duration::from_millis(20)).with_loader(None);
    let renderer = &ctx.renderer;
    let (buffer, token) = renderer
        .add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(128, DescriptorType::BUFFER)).with_force_reset(true),
            LoadPriority::Low,
        )
        .unwrap();
    renderer.remove_buffer_resource(buffer).unwrap();
    assert!(renderer.is_token_completed(&token));
    ctx.teardown();
}

#[test]
fn test_loader_lifecycle() {
    let ctx = TestContext::new();
    let renderer = &ctx.renderer;

    // Without a loader, queries are trivially complete and loads fail
    assert!(renderer.all_resource_loads_completed());
    assert_eq!(renderer.get_last_token_completed(), SyncToken::default());
    let result = renderer.add_buffer_resource(
        &BufferLoadDesc::new(BufferDesc::new(16, DescriptorType::BUFFER)),
        LoadPriority::Normal,
    );
    assert!(matches!(result, Err(RhiError::LoaderNotInitialized)));

    renderer.init_resource_loader(None).unwrap();
    assert!(renderer.has_resource_loader());
    assert!(renderer.init_resource_loader(None).is_err());
    // Tokens the loader never issued cannot be waited on
    assert!(renderer.wait_for_token(&SyncToken::at(LoadPriority::High, 5)).is_err());

    renderer.exit_resource_loader();
    assert!(!renderer.has_resource_loader());
    ctx.teardown();
}

#[test]
fn test_tokens_stay_completed_across_loader_restart() {
    let ctx = TestContext::new().with_loader(None);
    let renderer = &ctx.renderer;

    let (first, token) = renderer
        .add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(64, DescriptorType::BUFFER)).with_force_reset(true),
            LoadPriority::Normal,
        )
        .unwrap();
    renderer.wait_for_token(&token).unwrap();
    assert!(renderer.is_token_completed(&token));

    renderer.exit_resource_loader();
    assert!(renderer.is_token_completed(&token));
    assert_eq!(renderer.get_last_token_completed(), token);

    renderer.init_resource_loader(None).unwrap();
    assert!(renderer.is_token_completed(&token));
    renderer.wait_for_token(&token).unwrap();
    assert_eq!(renderer.get_last_token_completed(), token);

    // The restarted loader continues the counters
    let (second, next) = renderer
        .add_buffer_resource(
            &BufferLoadDesc::new(BufferDesc::new(64, DescriptorType::BUFFER)).with_force_reset(true),
            LoadPriority::Normal,
        )
        .unwrap();
    assert_eq!(next.get(LoadPriority::Normal), token.get(LoadPriority::Normal) + 1);
    renderer.wait_for_token(&next).unwrap();
    assert!(renderer.is_token_completed(&token));

    renderer.remove_buffer_resource(first).unwrap();
    renderer.remove_buffer_resource(second).unwrap();
    ctx.teardown();
}
