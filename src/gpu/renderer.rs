// ============================================================================
// GPU RENDERER — multi-pass pipeline coordinator
// ============================================================================
//
// Pass protocol per frame:
//   1. tonal pass      source ─(crop-aware UV, stages 1–10)→ base
//   2. copy            base → accumulator
//   3. global blur     3 × (horizontal, vertical) box passes on accumulator
//   4. per blur region 3 box pass pairs reading `base`, then a composite
//                      pass that selects the blurred pixels inside the rect
//   5. grain pass      accumulator → output (amount 0 degenerates to a copy)
//   6. readback        output → RgbaImage
//
// Per-frame failures surface as `Error::GpuPassFailure` so the compositor
// can redo the frame on the CPU; `Error::GpuUnavailable` at construction
// parks the session on the CPU path permanently.

use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::gpu::context::GpuContext;
use crate::gpu::shaders;
use crate::gpu::texture::{self, RenderTarget};
use crate::ops::adjustments::{BLUR_RADIUS_MAX, StageFactors};
use crate::state::{AdjustmentsState, BlurArea, CropArea};
use crate::{Error, Result};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct TonalUniforms {
    uv_origin: [f32; 2],
    uv_scale: [f32; 2],
    out_size: [f32; 2],
    brightness_mul: f32,
    contrast_mul: f32,
    exposure_mul: f32,
    shadows: f32,
    highlights: f32,
    saturation: f32,
    temperature: f32,
    sepia: f32,
    grayscale: f32,
    vignette: f32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurUniforms {
    dir_x: i32,
    dir_y: i32,
    box_radius: i32,
    _pad: i32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RegionUniforms {
    rect_min: [f32; 2],
    rect_max: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GrainUniforms {
    origin: [f32; 2],
    amount: f32,
    inv_scale: f32,
}

struct PassPipeline {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
}

/// Offscreen textures for one target size, recreated on resize.
struct Targets {
    width: u32,
    height: u32,
    base: RenderTarget,
    acc: [RenderTarget; 2],
    scratch: [RenderTarget; 2],
    output: RenderTarget,
}

pub struct GpuRenderer {
    ctx: GpuContext,
    sampler: wgpu::Sampler,
    tonal: PassPipeline,
    blur: PassPipeline,
    region: PassPipeline,
    grain: PassPipeline,
    source: Option<RenderTarget>,
    source_version: u64,
    targets: Option<Targets>,
    staging: Option<(wgpu::Buffer, u64)>,
}

impl GpuRenderer {
    pub fn new() -> Result<Self> {
        let ctx = GpuContext::new()?;
        let device = &ctx.device;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("source sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let tonal = Self::make_pipeline(
            device,
            "tonal",
            shaders::TONAL_SHADER,
            &[
                uniform_entry(0),
                texture_entry(1, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        );
        let blur = Self::make_pipeline(
            device,
            "blur",
            shaders::BLUR_SHADER,
            &[uniform_entry(0), texture_entry(1, false)],
        );
        let region = Self::make_pipeline(
            device,
            "region composite",
            shaders::REGION_COMPOSITE_SHADER,
            &[uniform_entry(0), texture_entry(1, false), texture_entry(2, false)],
        );
        let grain = Self::make_pipeline(
            device,
            "grain",
            shaders::GRAIN_SHADER,
            &[uniform_entry(0), texture_entry(1, false)],
        );

        Ok(Self {
            ctx,
            sampler,
            tonal,
            blur,
            region,
            grain,
            source: None,
            source_version: 0,
            targets: None,
            staging: None,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    fn make_pipeline(
        device: &wgpu::Device,
        label: &str,
        shader_src: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> PassPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries,
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });
        PassPipeline {
            pipeline,
            bind_layout,
        }
    }

    /// Upload the source image unless the cached copy is current.
    /// `version` is bumped by the caller whenever the pixels change.
    fn ensure_source(&mut self, source: &RgbaImage, version: u64) -> Result<()> {
        let (w, h) = source.dimensions();
        if !self.ctx.supports_size(w, h) {
            return Err(Error::GpuPassFailure("source exceeds texture limit"));
        }
        let stale = match &self.source {
            Some(tex) => tex.width != w || tex.height != h || self.source_version != version,
            None => true,
        };
        if stale {
            let tex = RenderTarget::new(&self.ctx.device, w, h, "source");
            tex.upload(&self.ctx.queue, source.as_raw());
            self.source = Some(tex);
            self.source_version = version;
        }
        Ok(())
    }

    fn ensure_targets(&mut self, width: u32, height: u32) -> Result<()> {
        if !self.ctx.supports_size(width, height) {
            return Err(Error::GpuPassFailure("target exceeds texture limit"));
        }
        let stale = match &self.targets {
            Some(t) => t.width != width || t.height != height,
            None => true,
        };
        if stale {
            let device = &self.ctx.device;
            self.targets = Some(Targets {
                width,
                height,
                base: RenderTarget::new(device, width, height, "base"),
                acc: [
                    RenderTarget::new(device, width, height, "acc 0"),
                    RenderTarget::new(device, width, height, "acc 1"),
                ],
                scratch: [
                    RenderTarget::new(device, width, height, "scratch 0"),
                    RenderTarget::new(device, width, height, "scratch 1"),
                ],
                output: RenderTarget::new(device, width, height, "output"),
            });
        }
        Ok(())
    }

    /// Drop all GPU-side image state (image closed / replaced).
    pub fn release(&mut self) {
        self.source = None;
        self.targets = None;
        self.staging = None;
    }

    /// Render the adjusted (and optionally cropped, scaled) image.
    ///
    /// `render_scale` maps crop-space pixels to output pixels; blur radii
    /// scale with it the same way the CPU path does.
    pub fn render(
        &mut self,
        source: &RgbaImage,
        source_version: u64,
        crop: Option<&CropArea>,
        adj: &AdjustmentsState,
        blur_areas: &[BlurArea],
        render_scale: f32,
    ) -> Result<RgbaImage> {
        let (src_w, src_h) = source.dimensions();
        if src_w == 0 || src_h == 0 {
            return Err(Error::MissingSurface);
        }
        let adj = adj.clamped();

        // Crop window in source pixels.
        let (cx, cy, cw, chh) = match crop.filter(|c| c.is_valid()) {
            Some(c) => {
                let x = c.x.clamp(0.0, src_w as f32);
                let y = c.y.clamp(0.0, src_h as f32);
                let w = c.width.min(src_w as f32 - x);
                let h = c.height.min(src_h as f32 - y);
                (x, y, w, h)
            }
            None => (0.0, 0.0, src_w as f32, src_h as f32),
        };
        if cw < 1.0 || chh < 1.0 {
            return Err(Error::MissingSurface);
        }

        let out_w = ((cw * render_scale).round() as u32).max(1);
        let out_h = ((chh * render_scale).round() as u32).max(1);

        self.ensure_source(source, source_version)?;
        self.ensure_targets(out_w, out_h)?;
        let source_tex = self.source.as_ref().ok_or(Error::GpuPassFailure("no source"))?;
        let targets = self.targets.as_ref().ok_or(Error::GpuPassFailure("no targets"))?;
        let device = &self.ctx.device;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame encoder"),
        });

        // -- Pass 1: tonal chain into `base`.
        let factors = StageFactors::from_state(&adj);
        let tonal_uniforms = TonalUniforms {
            uv_origin: [cx / src_w as f32, cy / src_h as f32],
            uv_scale: [cw / src_w as f32, chh / src_h as f32],
            out_size: [out_w as f32, out_h as f32],
            brightness_mul: factors.brightness_mul,
            contrast_mul: factors.contrast_mul,
            exposure_mul: factors.exposure_mul,
            shadows: factors.shadows,
            highlights: factors.highlights,
            saturation: factors.saturation,
            temperature: factors.temperature,
            sepia: factors.sepia,
            grayscale: factors.grayscale,
            vignette: factors.vignette,
        };
        let tonal_buf = self.uniform_buffer(&tonal_uniforms);
        let tonal_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tonal bind"),
            layout: &self.tonal.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: tonal_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source_tex.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        run_pass(&mut encoder, &self.tonal.pipeline, &tonal_bind, &targets.base.view);

        // -- Pass 2: seed the accumulator with the tonal base.
        let mut cur = 0usize;
        encoder.copy_texture_to_texture(
            targets.base.texture.as_image_copy(),
            targets.acc[cur].texture.as_image_copy(),
            wgpu::Extent3d {
                width: out_w,
                height: out_h,
                depth_or_array_layers: 1,
            },
        );

        // -- Pass 3: global blur on the accumulator.
        if adj.blur > 0.0 {
            let radius = adj.blur / 100.0 * BLUR_RADIUS_MAX * render_scale.max(0.0);
            let box_radius = (radius / 2.0).round() as i32;
            if box_radius > 0 {
                for _ in 0..3 {
                    self.encode_blur_pass(
                        &mut encoder,
                        &targets.acc[cur],
                        &targets.scratch[0],
                        (1, 0),
                        box_radius,
                    );
                    self.encode_blur_pass(
                        &mut encoder,
                        &targets.scratch[0],
                        &targets.acc[cur],
                        (0, 1),
                        box_radius,
                    );
                }
            }
        }

        // -- Pass 4: regional blurs, each blurring the *base* image and
        //    composited into the accumulator inside its rect.
        for area in blur_areas {
            let radius = area.blur_strength / 100.0 * BLUR_RADIUS_MAX * render_scale.max(0.0);
            let box_radius = (radius / 2.0).round() as i32;
            if box_radius <= 0 {
                continue;
            }
            // 3 box pass pairs: base → s0 → s1, s1 → s0 → s1, s1 → s0 → s1.
            let mut blur_src = &targets.base;
            for _ in 0..3 {
                self.encode_blur_pass(&mut encoder, blur_src, &targets.scratch[0], (1, 0), box_radius);
                self.encode_blur_pass(
                    &mut encoder,
                    &targets.scratch[0],
                    &targets.scratch[1],
                    (0, 1),
                    box_radius,
                );
                blur_src = &targets.scratch[1];
            }

            // Rect in output pixels (image space → crop space → scale).
            let rect_uniforms = RegionUniforms {
                rect_min: [
                    (area.x - cx) * render_scale,
                    (area.y - cy) * render_scale,
                ],
                rect_max: [
                    (area.x + area.width - cx) * render_scale,
                    (area.y + area.height - cy) * render_scale,
                ],
            };
            let rect_buf = self.uniform_buffer(&rect_uniforms);
            let bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("region bind"),
                layout: &self.region.bind_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: rect_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&targets.acc[cur].view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&targets.scratch[1].view),
                    },
                ],
            });
            run_pass(&mut encoder, &self.region.pipeline, &bind, &targets.acc[1 - cur].view);
            cur = 1 - cur;
        }

        // -- Pass 5: grain (amount 0 is a plain copy into `output`).
        let grain_uniforms = GrainUniforms {
            origin: [cx, cy],
            amount: (adj.grain / 100.0).clamp(0.0, 1.0),
            inv_scale: 1.0 / render_scale.max(0.001),
        };
        let grain_buf = self.uniform_buffer(&grain_uniforms);
        let grain_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("grain bind"),
            layout: &self.grain.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: grain_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.acc[cur].view),
                },
            ],
        });
        run_pass(&mut encoder, &self.grain.pipeline, &grain_bind, &targets.output.view);

        self.ctx.queue.submit(std::iter::once(encoder.finish()));

        // -- Pass 6: readback.
        let targets = self.targets.as_ref().ok_or(Error::GpuPassFailure("no targets"))?;
        texture::readback(&self.ctx, &targets.output, &mut self.staging)
    }

    fn encode_blur_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        src: &RenderTarget,
        dst: &RenderTarget,
        dir: (i32, i32),
        box_radius: i32,
    ) {
        let uniforms = BlurUniforms {
            dir_x: dir.0,
            dir_y: dir.1,
            box_radius,
            _pad: 0,
        };
        let buf = self.uniform_buffer(&uniforms);
        let bind = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur bind"),
            layout: &self.blur.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&src.view),
                },
            ],
        });
        run_pass(encoder, &self.blur.pipeline, &bind, &dst.view);
    }

    fn uniform_buffer<T: bytemuck::Pod>(&self, value: &T) -> wgpu::Buffer {
        self.ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("pass uniforms"),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }
}

fn run_pass(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::RenderPipeline,
    bind: &wgpu::BindGroup,
    target: &wgpu::TextureView,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("fullscreen pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind, &[]);
    pass.draw(0..6, 0..1);
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}
