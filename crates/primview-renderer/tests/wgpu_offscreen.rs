#![cfg(feature = "wgpu")]

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};
use primview_core::{Circle, Frame, Line, OrthoCamera, PrimitiveSlice, Rectangle};
use primview_renderer::{PrimitiveRenderer, RendererConfig, ShaderLibrary, WgpuDevice};

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const SIZE: u32 = 64;
const BYTES_PER_ROW: u32 = SIZE * 4;

/// Returns `None` on machines without any adapter.
fn create_device() -> Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::LowPower,
        force_fallback_adapter: false,
        compatible_surface: None,
    }))?;
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("primview test device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            memory_hints: wgpu::MemoryHints::default(),
        },
        None,
    ))
    .ok()?;
    Some((Arc::new(device), Arc::new(queue)))
}

fn create_target(device: &wgpu::Device) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("primview test target"),
        size: wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

/// Copies `target` back to the CPU as tightly packed RGBA rows, top row first.
fn read_pixels(device: &wgpu::Device, queue: &wgpu::Queue, target: &wgpu::Texture) -> Vec<u8> {
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("primview readback"),
        size: (BYTES_PER_ROW * SIZE) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("primview readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: target,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &readback,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(BYTES_PER_ROW),
                rows_per_image: Some(SIZE),
            },
        },
        wgpu::Extent3d {
            width: SIZE,
            height: SIZE,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let slice = readback.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).ok();
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv().unwrap().unwrap();

    let pixels = slice.get_mapped_range().to_vec();
    readback.unmap();
    pixels
}

/// RGBA of the pixel containing world point `(x, y)`; world y grows upwards.
fn pixel_at(pixels: &[u8], x: f32, y: f32) -> [u8; 4] {
    let col = x as usize;
    let row = SIZE as usize - 1 - y as usize;
    let i = row * BYTES_PER_ROW as usize + col * 4;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

fn assert_rgb(actual: [u8; 4], expected: [u8; 3], what: &str) {
    for c in 0..3 {
        assert!(
            actual[c].abs_diff(expected[c]) <= 2,
            "{what}: expected {expected:?}, got {actual:?}"
        );
    }
}

#[test]
fn test_offscreen_frame_without_validation_errors() {
    let Some((device, queue)) = create_device() else {
        eprintln!("No wgpu adapter available, skipping");
        return;
    };

    let mut gpu = WgpuDevice::new(
        Arc::clone(&device),
        Arc::clone(&queue),
        FORMAT,
        ShaderLibrary::builtin(),
    );
    let mut renderer = PrimitiveRenderer::new(&mut gpu, RendererConfig::default()).unwrap();
    let target = create_target(&device);
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let mut slice = PrimitiveSlice::new();
    slice.push(Circle::new(Vec2::new(200.0, 200.0), 50.0, Vec4::new(1.0, 0.0, 0.0, 1.0)));
    slice.push(Rectangle::new(Vec2::new(400.0, 300.0), 80.0, 40.0, Vec4::ONE));
    slice.push(Line::solid(Vec2::ZERO, Vec2::new(800.0, 600.0), Vec3::ONE, 0.5));

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let camera = OrthoCamera::fit_area(Vec2::new(800.0, 600.0), Vec2::splat(SIZE as f32));
    renderer.update_frustum(&mut gpu, &camera).unwrap();
    renderer.render_background(&mut gpu, Vec3::splat(0.1)).unwrap();
    renderer.render_grid(&mut gpu, Vec3::splat(0.3)).unwrap();
    renderer.render_frame_layer(&mut gpu, &slice).unwrap();
    assert_eq!(gpu.pending_draws(), 5);

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("primview test encoder"),
    });
    gpu.flush(&mut encoder, &view, Some(wgpu::Color::BLACK));
    queue.submit(Some(encoder.finish()));
    assert_eq!(gpu.pending_draws(), 0);

    let error = pollster::block_on(device.pop_error_scope());
    assert!(error.is_none(), "validation error: {error:?}");

    renderer.release(&mut gpu);
}

#[test]
fn test_readback_keeps_primitives_apart() {
    let Some((device, queue)) = create_device() else {
        eprintln!("No wgpu adapter available, skipping");
        return;
    };

    let mut gpu = WgpuDevice::new(
        Arc::clone(&device),
        Arc::clone(&queue),
        FORMAT,
        ShaderLibrary::builtin(),
    );
    let mut renderer = PrimitiveRenderer::new(&mut gpu, RendererConfig::default()).unwrap();
    let target = create_target(&device);
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());

    // One world unit per pixel over [0, 64]².
    let camera = Mat4::orthographic_rh(0.0, SIZE as f32, 0.0, SIZE as f32, -1.0, 1.0);

    let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
    let green = Vec4::new(0.0, 1.0, 0.0, 1.0);
    let blue = Vec4::new(0.0, 0.0, 1.0, 1.0);
    let yellow = Vec4::new(1.0, 1.0, 0.0, 1.0);

    // Two layers, so the line buffer is uploaded twice in one frame.
    let mut frame = Frame::new();
    let shapes = frame.layer_mut(0);
    shapes.push(Circle::new(Vec2::new(12.0, 12.0), 8.0, red));
    shapes.push(Circle::new(Vec2::new(40.0, 12.0), 8.0, green));
    shapes.push(Rectangle::new(Vec2::new(12.0, 40.0), 6.0, 6.0, blue));
    shapes.push(Rectangle::new(Vec2::new(40.0, 40.0), 6.0, 6.0, yellow));
    shapes.push(Line::solid(
        Vec2::new(56.5, 2.0),
        Vec2::new(56.5, 62.0),
        Vec3::ONE,
        1.0,
    ));
    frame.layer_mut(1).push(Line::solid(
        Vec2::new(60.5, 2.0),
        Vec2::new(60.5, 62.0),
        Vec3::new(0.0, 1.0, 1.0),
        1.0,
    ));

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    renderer.update_frustum(&mut gpu, &camera).unwrap();
    renderer.render_frame(&mut gpu, &frame).unwrap();

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("primview test encoder"),
    });
    gpu.flush(&mut encoder, &view, Some(wgpu::Color::BLACK));
    queue.submit(Some(encoder.finish()));

    let error = pollster::block_on(device.pop_error_scope());
    assert!(error.is_none(), "validation error: {error:?}");

    let pixels = read_pixels(&device, &queue, &target);

    assert_rgb(pixel_at(&pixels, 12.5, 12.5), [255, 0, 0], "first circle");
    assert_rgb(pixel_at(&pixels, 40.5, 12.5), [0, 255, 0], "second circle");
    // Inside the bounding square, outside the disc.
    assert_rgb(pixel_at(&pixels, 4.5, 4.5), [0, 0, 0], "circle corner");
    assert_rgb(pixel_at(&pixels, 12.5, 40.5), [0, 0, 255], "first rectangle");
    assert_rgb(pixel_at(&pixels, 40.5, 40.5), [255, 255, 0], "second rectangle");
    assert_rgb(pixel_at(&pixels, 56.5, 32.5), [255, 255, 255], "first layer line");
    assert_rgb(pixel_at(&pixels, 60.5, 32.5), [0, 255, 255], "second layer line");

    renderer.release(&mut gpu);
}
