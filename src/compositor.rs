// ============================================================================
// COMPOSITOR — full-frame draw orchestration, CPU and GPU paths
// ============================================================================
//
// Draw order: base (cropped, scaled) → tonal adjustments → global blur →
// regional blur areas (array order, later over earlier) → stamps →
// annotations → orientation (flips, then 90° rotation).  Export re-runs the
// same pipeline at natural resolution and encodes the result.
//
// The GPU renderer covers the pixel-adjustment stages (tonal, blurs, grain);
// stamps, annotations, and orientation are cheap overlay work done on the
// CPU either way.  A per-frame GPU failure falls back to the CPU operators
// for that frame; a missing GPU parks the session on the CPU path.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage, imageops};

use crate::brush::{self, OutlinePoint};
use crate::gpu::GpuRenderer;
use crate::ops::adjustments::{self, BLUR_RADIUS_MAX};
use crate::ops::{blur, grain};
use crate::state::{
    AdjustmentsState, Annotation, AnnotationKind, CropArea, EditState, Rotation, StrokePoint,
    TransformState, Viewport,
};
use crate::stamps::{self, StampCache};
use crate::{Error, Result, log_info, log_warn};

/// Moving-average window applied to pen annotation points before stroking.
const PEN_SMOOTH_WINDOW: usize = 3;

/// Shadow offset (render pixels at scale 1.0) and color for shadowed strokes.
const SHADOW_OFFSET: f32 = 2.0;
const SHADOW_COLOR: [u8; 4] = [0, 0, 0, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
}

pub struct Compositor {
    gpu: Option<GpuRenderer>,
    stamps: StampCache,
    /// Bumped whenever the source pixels change, so the GPU keeps its
    /// uploaded copy across frames.
    source_version: u64,
}

impl Compositor {
    /// `use_gpu: false` forces the CPU path (tests, headless environments
    /// where adapter init is unwanted).
    pub fn new(use_gpu: bool) -> Self {
        let gpu = if use_gpu {
            match GpuRenderer::new() {
                Ok(renderer) => {
                    log_info!("compositor using GPU adapter '{}'", renderer.adapter_name());
                    Some(renderer)
                }
                Err(e) => {
                    log_warn!("GPU unavailable, CPU path for this session: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self {
            gpu,
            stamps: StampCache::new(),
            source_version: 0,
        }
    }

    /// True when a GPU renderer initialized for this session.
    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    /// Notify that the source pixels changed (new image, destructive edit).
    pub fn mark_source_changed(&mut self) {
        self.source_version = self.source_version.wrapping_add(1);
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.release();
        }
    }

    pub fn stamp_cache(&mut self) -> &mut StampCache {
        &mut self.stamps
    }

    /// Drain async stamp loads; true means a repaint is warranted.
    pub fn poll_assets(&mut self) -> bool {
        self.stamps.poll()
    }

    /// Render the preview at the viewport's scale.
    pub fn render_preview(&mut self, source: &RgbaImage, state: &EditState) -> Result<RgbaImage> {
        self.render(source, state, state.viewport.total_scale())
    }

    /// Render the full composite at `render_scale` output pixels per image
    /// pixel (times the transform scale).
    pub fn render(
        &mut self,
        source: &RgbaImage,
        state: &EditState,
        render_scale: f32,
    ) -> Result<RgbaImage> {
        if source.width() == 0 || source.height() == 0 {
            return Err(Error::MissingSurface);
        }
        let scale = (render_scale * state.transform.scale).max(0.001);
        let (cx, cy, _, _) = crop_rect(source, state.crop_area.as_ref());

        // -- Adjusted base: GPU first, CPU on failure or absence.
        let mut img = match self.gpu.as_mut() {
            Some(gpu) => match gpu.render(
                source,
                self.source_version,
                state.crop_area.as_ref(),
                &state.adjustments,
                &state.blur_areas,
                scale,
            ) {
                Ok(base) => base,
                Err(e) => {
                    log_warn!("GPU frame failed ({}), rendering on CPU", e);
                    render_base_cpu(source, state, scale)?
                }
            },
            None => render_base_cpu(source, state, scale)?,
        };

        // -- Stamps (placeholder while an async load is pending).
        self.stamps.poll();
        for area in &state.stamp_areas {
            let scaled = scale_stamp(area, cx, cy, scale);
            match self.stamps.resolve(area) {
                Some(asset) => stamps::draw_stamp(&mut img, &scaled, asset),
                None => {
                    let pending = stamps::placeholder(
                        (scaled.width.max(1.0)) as u32,
                        (scaled.height.max(1.0)) as u32,
                    );
                    stamps::draw_stamp(&mut img, &scaled, &pending);
                }
            }
        }

        // -- Annotations.
        for ann in &state.annotations {
            draw_annotation(&mut img, ann, cx, cy, scale);
        }

        // -- Orientation last, shared by preview and export.
        Ok(apply_orientation(img, &state.transform))
    }

    /// Export at natural resolution: unity viewport, crop/rotation-correct
    /// dimensions, then PNG or JPEG encode.  `quality` in [0, 1] maps to
    /// JPEG quality 1–100 (ignored for PNG).
    pub fn export(
        &mut self,
        source: &RgbaImage,
        state: &EditState,
        format: ExportFormat,
        quality: f32,
    ) -> Result<Vec<u8>> {
        let mut export_state = state.clone();
        export_state.viewport = Viewport::for_export();
        let img = self.render(source, &export_state, 1.0)?;
        encode(&img, format, quality)
    }
}

/// Encode a finished composite.
pub fn encode(img: &RgbaImage, format: ExportFormat, quality: f32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match format {
        ExportFormat::Png => {
            PngEncoder::new(&mut out)
                .write_image(img.as_raw(), img.width(), img.height(), image::ColorType::Rgba8)
                .map_err(|e| Error::EncodeFailure(format!("png: {}", e)))?;
        }
        ExportFormat::Jpeg => {
            let q = (quality.clamp(0.0, 1.0) * 99.0 + 1.0).round() as u8;
            let rgb = image::DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut out, q)
                .encode_image(&rgb)
                .map_err(|e| Error::EncodeFailure(format!("jpeg: {}", e)))?;
        }
    }
    Ok(out)
}

// ============================================================================
// CPU base path — mirrors the GPU pass protocol
// ============================================================================

fn render_base_cpu(source: &RgbaImage, state: &EditState, scale: f32) -> Result<RgbaImage> {
    let (cx, cy, cw, ch) = crop_rect(source, state.crop_area.as_ref());
    if cw < 1.0 || ch < 1.0 {
        return Err(Error::MissingSurface);
    }

    let mut img =
        imageops::crop_imm(source, cx as u32, cy as u32, cw as u32, ch as u32).to_image();
    let out_w = ((cw * scale).round() as u32).max(1);
    let out_h = ((ch * scale).round() as u32).max(1);
    if (out_w, out_h) != img.dimensions() {
        img = imageops::resize(&img, out_w, out_h, imageops::FilterType::Triangle);
    }

    let adj = state.adjustments.clamped();
    let tonal_only = AdjustmentsState {
        blur: 0.0,
        grain: 0.0,
        ..adj
    };
    if !tonal_only.is_identity() {
        adjustments::apply_tonal_stages(&mut img, &adj);
    }

    // Regions read the tonal base, not the globally blurred composite, so
    // keep a copy before the global pass (GPU does the same with texture A).
    let base = if state.blur_areas.is_empty() {
        None
    } else {
        Some(img.clone())
    };

    if adj.blur > 0.0 {
        let radius = adj.blur / 100.0 * BLUR_RADIUS_MAX * scale;
        blur::box_blur(&mut img, radius);
    }

    if let Some(base) = base {
        for area in &state.blur_areas {
            let radius = area.blur_strength / 100.0 * BLUR_RADIUS_MAX * scale;
            if radius <= 0.0 {
                continue;
            }
            blur::box_blur_region_into(
                &base,
                &mut img,
                ((area.x - cx) * scale).round() as i64,
                ((area.y - cy) * scale).round() as i64,
                (area.width * scale).round().max(0.0) as u32,
                (area.height * scale).round().max(0.0) as u32,
                radius,
            );
        }
    }

    if adj.grain > 0.0 {
        grain::apply_grain(&mut img, adj.grain / 100.0, (cx, cy), scale);
    }
    Ok(img)
}

/// Clamped crop window in source pixels; full image when crop is absent or
/// degenerate.
fn crop_rect(source: &RgbaImage, crop: Option<&CropArea>) -> (f32, f32, f32, f32) {
    let (sw, sh) = (source.width() as f32, source.height() as f32);
    match crop.filter(|c| c.is_valid()) {
        Some(c) => {
            let x = c.x.clamp(0.0, sw);
            let y = c.y.clamp(0.0, sh);
            (x, y, c.width.min(sw - x).max(0.0), c.height.min(sh - y).max(0.0))
        }
        None => (0.0, 0.0, sw, sh),
    }
}

fn scale_stamp(area: &crate::state::StampArea, cx: f32, cy: f32, scale: f32) -> crate::state::StampArea {
    let mut scaled = area.clone();
    scaled.x = (area.x - cx) * scale;
    scaled.y = (area.y - cy) * scale;
    scaled.width = area.width * scale;
    scaled.height = area.height * scale;
    scaled
}

// ============================================================================
// Orientation
// ============================================================================

/// Flips first, then the 90°-step rotation.  90/270 swap the output axes.
fn apply_orientation(img: RgbaImage, transform: &TransformState) -> RgbaImage {
    let mut out = img;
    if transform.flip_horizontal {
        out = imageops::flip_horizontal(&out);
    }
    if transform.flip_vertical {
        out = imageops::flip_vertical(&out);
    }
    match transform.rotation {
        Rotation::None => out,
        Rotation::Cw90 => imageops::rotate90(&out),
        Rotation::Cw180 => imageops::rotate180(&out),
        Rotation::Cw270 => imageops::rotate270(&out),
    }
}

// ============================================================================
// Annotation rasterization
// ============================================================================

fn draw_annotation(img: &mut RgbaImage, ann: &Annotation, cx: f32, cy: f32, scale: f32) {
    if ann.points.is_empty() {
        return;
    }
    let to_render = |p: &StrokePoint| StrokePoint {
        x: (p.x - cx) * scale,
        y: (p.y - cy) * scale,
        width: p.width.map(|w| w * scale),
    };
    let points: Vec<StrokePoint> = ann.points.iter().map(to_render).collect();
    let width = (ann.stroke_width * scale).max(0.5);

    match ann.kind {
        AnnotationKind::Pen => {
            let smoothed = smooth_points(&points, PEN_SMOOTH_WINDOW);
            if ann.shadow {
                let shadow = offset_points(&smoothed, SHADOW_OFFSET * scale);
                draw_polyline(img, &shadow, width, SHADOW_COLOR);
            }
            draw_polyline(img, &smoothed, width, ann.color);
        }
        AnnotationKind::Brush => {
            let outline = brush::stroke_outline(&points, width);
            if ann.shadow {
                let shadow: Vec<OutlinePoint> = outline
                    .iter()
                    .map(|p| OutlinePoint {
                        x: p.x + SHADOW_OFFSET * scale,
                        y: p.y + SHADOW_OFFSET * scale,
                    })
                    .collect();
                fill_polygon(img, &shadow, SHADOW_COLOR);
            }
            fill_polygon(img, &outline, ann.color);
        }
        AnnotationKind::Arrow => {
            if points.len() >= 2 {
                draw_arrow(img, points[0], points[points.len() - 1], width, ann.color);
            }
        }
        AnnotationKind::Rectangle => {
            if points.len() >= 2 {
                draw_rectangle_outline(img, points[0], points[points.len() - 1], width, ann.color);
            }
        }
    }
}

/// Moving-average smoothing of annotation points, endpoints pinned.
fn smooth_points(points: &[StrokePoint], window: usize) -> Vec<StrokePoint> {
    let n = points.len();
    if n <= 2 || window < 2 {
        return points.to_vec();
    }
    let half = window / 2;
    (0..n)
        .map(|i| {
            if i == 0 || i == n - 1 {
                return points[i];
            }
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            let count = (hi - lo + 1) as f32;
            let (sx, sy) = points[lo..=hi]
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            StrokePoint {
                x: sx / count,
                y: sy / count,
                width: points[i].width,
            }
        })
        .collect()
}

fn offset_points(points: &[StrokePoint], offset: f32) -> Vec<StrokePoint> {
    points
        .iter()
        .map(|p| StrokePoint {
            x: p.x + offset,
            y: p.y + offset,
            width: p.width,
        })
        .collect()
}

fn draw_polyline(img: &mut RgbaImage, points: &[StrokePoint], width: f32, color: [u8; 4]) {
    if points.len() == 1 {
        fill_capsule(img, points[0].x, points[0].y, points[0].x, points[0].y, width, color);
        return;
    }
    for pair in points.windows(2) {
        fill_capsule(img, pair[0].x, pair[0].y, pair[1].x, pair[1].y, width, color);
    }
}

fn draw_arrow(img: &mut RgbaImage, start: StrokePoint, end: StrokePoint, width: f32, color: [u8; 4]) {
    fill_capsule(img, start.x, start.y, end.x, end.y, width, color);

    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-3 {
        return;
    }
    let angle = dy.atan2(dx);
    let head_len = (width * 3.0).max(10.0);
    // Barbs swept back 30° either side of the shaft.
    for sign in [-1.0f32, 1.0] {
        let a = angle + std::f32::consts::PI - sign * std::f32::consts::FRAC_PI_6;
        fill_capsule(
            img,
            end.x,
            end.y,
            end.x + a.cos() * head_len,
            end.y + a.sin() * head_len,
            width,
            color,
        );
    }
}

fn draw_rectangle_outline(
    img: &mut RgbaImage,
    a: StrokePoint,
    b: StrokePoint,
    width: f32,
    color: [u8; 4],
) {
    let (x0, x1) = (a.x.min(b.x), a.x.max(b.x));
    let (y0, y1) = (a.y.min(b.y), a.y.max(b.y));
    fill_capsule(img, x0, y0, x1, y0, width, color);
    fill_capsule(img, x1, y0, x1, y1, width, color);
    fill_capsule(img, x1, y1, x0, y1, width, color);
    fill_capsule(img, x0, y1, x0, y0, width, color);
}

/// Fill a rounded-cap thick segment by distance test with 1px anti-aliased
/// edge coverage.
fn fill_capsule(img: &mut RgbaImage, x0: f32, y0: f32, x1: f32, y1: f32, width: f32, color: [u8; 4]) {
    let r = width * 0.5;
    let (w, h) = (img.width() as i64, img.height() as i64);
    let min_x = ((x0.min(x1) - r - 1.0).floor() as i64).max(0);
    let min_y = ((y0.min(y1) - r - 1.0).floor() as i64).max(0);
    let max_x = ((x0.max(x1) + r + 1.0).ceil() as i64 + 1).min(w);
    let max_y = ((y0.max(y1) + r + 1.0).ceil() as i64 + 1).min(h);

    let dx = x1 - x0;
    let dy = y1 - y0;
    let len2 = dx * dx + dy * dy;

    for y in min_y..max_y {
        for x in min_x..max_x {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            // Closest point on the segment.
            let t = if len2 > 1e-9 {
                (((px - x0) * dx + (py - y0) * dy) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let ex = px - (x0 + dx * t);
            let ey = py - (y0 + dy * t);
            let dist = (ex * ex + ey * ey).sqrt();
            let coverage = (r + 0.5 - dist).clamp(0.0, 1.0);
            if coverage <= 0.0 {
                continue;
            }
            let mut src = color;
            src[3] = (color[3] as f32 * coverage).round() as u8;
            if src[3] == 0 {
                continue;
            }
            stamps::blend_over(&mut img.get_pixel_mut(x as u32, y as u32).0, src);
        }
    }
}

/// Even-odd scanline fill of a closed polygon.
fn fill_polygon(img: &mut RgbaImage, points: &[OutlinePoint], color: [u8; 4]) {
    if points.len() < 3 {
        return;
    }
    let (w, h) = (img.width() as i64, img.height() as i64);
    let min_y = points
        .iter()
        .fold(f32::INFINITY, |m, p| m.min(p.y))
        .floor()
        .max(0.0) as i64;
    let max_y = (points.iter().fold(f32::NEG_INFINITY, |m, p| m.max(p.y)).ceil() as i64 + 1).min(h);

    let mut crossings: Vec<f32> = Vec::with_capacity(16);
    for y in min_y..max_y {
        let scan_y = y as f32 + 0.5;
        crossings.clear();
        for i in 0..points.len() {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            if (a.y <= scan_y) != (b.y <= scan_y) {
                let t = (scan_y - a.y) / (b.y - a.y);
                crossings.push(a.x + (b.x - a.x) * t);
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for pair in crossings.chunks_exact(2) {
            let x0 = (pair[0].round() as i64).max(0);
            let x1 = (pair[1].round() as i64).min(w);
            for x in x0..x1 {
                stamps::blend_over(&mut img.get_pixel_mut(x as u32, y as u32).0, color);
            }
        }
    }
}

// ============================================================================
// RENDER SCHEDULING — coalesced re-render requests
// ============================================================================

/// Dirty-flag scheduler: at most one render in flight, at most one deferred.
/// A burst of slider changes collapses into the frame in flight plus one
/// follow-up.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    in_flight: bool,
    pending: bool,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a re-render.  `true` means start one now; `false` means one
    /// is already running and this request was coalesced.
    pub fn request(&mut self) -> bool {
        if self.in_flight {
            self.pending = true;
            false
        } else {
            self.in_flight = true;
            true
        }
    }

    /// Mark the in-flight render done.  `true` means a coalesced request is
    /// waiting and the caller should render again immediately.
    pub fn finish(&mut self) -> bool {
        self.in_flight = false;
        if self.pending {
            self.pending = false;
            self.in_flight = true;
            true
        } else {
            false
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.in_flight && !self.pending
    }
}

// ============================================================================
// TESTS
// ============================================================================
