// ============================================================================
// RENDER TARGET — offscreen texture wrapper with upload + aligned readback
// ============================================================================

use image::RgbaImage;

use crate::gpu::context::GpuContext;
use crate::{Error, Result};

/// An Rgba8 texture usable as both a sampling source and a render target.
pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Full upload of tightly packed RGBA pixels.
    pub fn upload(&self, queue: &wgpu::Queue, data: &[u8]) {
        debug_assert_eq!(data.len(), (self.width * self.height * 4) as usize);
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// `bytes_per_row` for buffer copies must be 256-aligned.
pub fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

/// Read a whole texture back as an `RgbaImage`, stripping row padding.
///
/// The staging buffer is caller-owned and reused across frames when it is
/// already large enough.
pub fn readback(
    ctx: &GpuContext,
    target: &RenderTarget,
    cached_staging: &mut Option<(wgpu::Buffer, u64)>,
) -> Result<RgbaImage> {
    let device = &ctx.device;
    let bytes_per_row = aligned_bytes_per_row(target.width);
    let buffer_size = bytes_per_row as u64 * target.height as u64;

    let need_new = !matches!(cached_staging, Some((_, size)) if *size >= buffer_size);
    if need_new {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback staging"),
            size: buffer_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        *cached_staging = Some((buffer, buffer_size));
    }
    let staging = match cached_staging {
        Some((buffer, _)) => buffer,
        None => return Err(Error::GpuPassFailure("staging buffer")),
    };

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: &target.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(target.height),
            },
        },
        wgpu::Extent3d {
            width: target.width,
            height: target.height,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..buffer_size);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    match rx.recv() {
        Ok(Ok(())) => {}
        _ => return Err(Error::GpuPassFailure("readback map")),
    }

    let mapped = slice.get_mapped_range();
    let row_bytes = target.width as usize * 4;
    let mut pixels = Vec::with_capacity(row_bytes * target.height as usize);
    for y in 0..target.height as usize {
        let start = y * bytes_per_row as usize;
        pixels.extend_from_slice(&mapped[start..start + row_bytes]);
    }
    drop(mapped);
    staging.unmap();

    RgbaImage::from_raw(target.width, target.height, pixels)
        .ok_or(Error::GpuPassFailure("readback size"))
}
