// ============================================================================
// STAMP ASSETS — cache + rasterization for emoji / image / SVG stamps
// ============================================================================
//
// Stamps reference their pixels by `asset_id`.  Emoji are rasterized
// synchronously (glyph coverage is cheap); image and SVG sources load on a
// worker thread and land in the cache via an mpsc channel, so a stamp drawn
// before its asset arrives gets a placeholder and is repainted once `poll`
// drains the result.

use std::collections::{HashMap, HashSet};
use std::sync::{OnceLock, mpsc};

use ab_glyph::{Font, FontArc, ScaleFont};
use image::{Rgba, RgbaImage};

use crate::state::{StampArea, StampKind};
use crate::{log_info, log_warn};

/// Emoji glyphs rasterize at this size; draws scale from it.
const EMOJI_RASTER_SIZE: f32 = 256.0;

type LoadResult = (String, Option<RgbaImage>);

pub struct StampCache {
    assets: HashMap<String, RgbaImage>,
    pending: HashSet<String>,
    tx: mpsc::Sender<LoadResult>,
    rx: mpsc::Receiver<LoadResult>,
}

impl Default for StampCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StampCache {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            assets: HashMap::new(),
            pending: HashSet::new(),
            tx,
            rx,
        }
    }

    /// Drain finished background loads into the cache.  Returns `true` if
    /// anything arrived (the caller should repaint).
    pub fn poll(&mut self) -> bool {
        let mut dirty = false;
        while let Ok((asset_id, result)) = self.rx.try_recv() {
            self.pending.remove(&asset_id);
            match result {
                Some(img) => {
                    log_info!("stamp asset loaded: {} ({}x{})", asset_id, img.width(), img.height());
                    self.assets.insert(asset_id, img);
                }
                None => {
                    log_warn!("stamp asset failed to load: {}", asset_id);
                    // Cache the placeholder so we don't retry every frame.
                    self.assets.insert(asset_id, placeholder(64, 64));
                }
            }
            dirty = true;
        }
        dirty
    }

    /// Look up a stamp's pixels, kicking off a load if needed.  `None` means
    /// the asset is still loading — draw a placeholder for now.
    pub fn resolve(&mut self, stamp: &StampArea) -> Option<&RgbaImage> {
        if !self.assets.contains_key(&stamp.asset_id) {
            match stamp.kind {
                StampKind::Emoji => {
                    // Synchronous: glyph coverage at a fixed raster size.
                    let img = render_emoji(&stamp.content, EMOJI_RASTER_SIZE)
                        .unwrap_or_else(|| placeholder(64, 64));
                    self.assets.insert(stamp.asset_id.clone(), img);
                }
                StampKind::Image | StampKind::Svg => {
                    self.request_load(stamp);
                    return None;
                }
            }
        }
        self.assets.get(&stamp.asset_id)
    }

    fn request_load(&mut self, stamp: &StampArea) {
        if !self.pending.insert(stamp.asset_id.clone()) {
            return;
        }
        let asset_id = stamp.asset_id.clone();
        let source = stamp.content.clone();
        let kind = stamp.kind;
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let result = match kind {
                StampKind::Image => image::open(&source).ok().map(|img| img.to_rgba8()),
                StampKind::Svg => std::fs::read(&source)
                    .ok()
                    .and_then(|data| rasterize_svg(&data)),
                StampKind::Emoji => unreachable!("emoji renders synchronously"),
            };
            // Receiver gone means the editor shut down; nothing to do.
            let _ = tx.send((asset_id, result));
        });
    }

    /// Insert pre-rasterized pixels (tests, clipboard paste).
    pub fn insert(&mut self, asset_id: String, img: RgbaImage) {
        self.assets.insert(asset_id, img);
    }
}

/// Checkered gray placeholder shown while an asset loads (or when it failed).
pub fn placeholder(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            Rgba([180, 180, 180, 200])
        } else {
            Rgba([120, 120, 120, 200])
        }
    })
}

// ============================================================================
// Emoji rasterization
// ============================================================================

fn emoji_font() -> Option<&'static FontArc> {
    static FONT: OnceLock<Option<FontArc>> = OnceLock::new();
    FONT.get_or_init(|| {
        use font_kit::family_name::FamilyName;
        use font_kit::properties::Properties;
        use font_kit::source::SystemSource;

        let families = [
            FamilyName::Title("Noto Emoji".to_string()),
            FamilyName::Title("Noto Color Emoji".to_string()),
            FamilyName::Title("Segoe UI Emoji".to_string()),
            FamilyName::Title("Apple Color Emoji".to_string()),
            FamilyName::SansSerif,
        ];
        let handle = SystemSource::new()
            .select_best_match(&families, &Properties::new())
            .ok()?;
        let data = handle.load().ok()?.copy_font_data()?;
        FontArc::try_from_vec((*data).clone()).ok()
    })
    .as_ref()
}

/// Rasterize an emoji (or any single grapheme) as glyph alpha coverage.
/// Returns `None` when no usable font or outline exists.
fn render_emoji(content: &str, size: f32) -> Option<RgbaImage> {
    let font = emoji_font()?;
    let ch = content.chars().next()?;
    let glyph_id = font.glyph_id(ch);
    if glyph_id.0 == 0 {
        return None;
    }

    let scaled = font.as_scaled(size);
    let ascent = scaled.ascent();
    let glyph = glyph_id.with_scale_and_position(size, ab_glyph::point(0.0, ascent));
    let outlined = font.outline_glyph(glyph)?;
    let bounds = outlined.px_bounds();
    let w = bounds.width().ceil() as u32;
    let h = bounds.height().ceil() as u32;
    if w == 0 || h == 0 {
        return None;
    }

    let mut img = RgbaImage::new(w, h);
    outlined.draw(|px, py, cov| {
        if px < w && py < h {
            let a = (cov * 255.0).round().clamp(0.0, 255.0) as u8;
            img.put_pixel(px, py, Rgba([40, 40, 40, a]));
        }
    });
    Some(img)
}

// ============================================================================
// SVG rasterization
// ============================================================================

/// Rasterize SVG bytes at the document's intrinsic size.
pub fn rasterize_svg(data: &[u8]) -> Option<RgbaImage> {
    use resvg::{tiny_skia, usvg};

    let tree = usvg::Tree::from_data(data, &usvg::Options::default()).ok()?;
    let size = tree.size();
    let w = size.width().ceil() as u32;
    let h = size.height().ceil() as u32;
    let mut pixmap = tiny_skia::Pixmap::new(w.max(1), h.max(1))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    // tiny-skia hands back premultiplied RGBA; unpremultiply for compositing.
    let mut raw = pixmap.take();
    for px in raw.chunks_exact_mut(4) {
        let a = px[3] as u32;
        if a > 0 && a < 255 {
            for c in px.iter_mut().take(3) {
                *c = ((*c as u32 * 255) / a).min(255) as u8;
            }
        }
    }
    RgbaImage::from_raw(w.max(1), h.max(1), raw)
}

// ============================================================================
// Drawing
// ============================================================================

/// Composite a stamp onto the canvas: scale the asset to the stamp rect,
/// rotate about the stamp center, source-over blend.
///
/// Sampling is inverse-mapped (each covered canvas pixel is rotated back
/// into asset space and bilinearly sampled), so there are no rotation holes.
pub fn draw_stamp(canvas: &mut RgbaImage, stamp: &StampArea, asset: &RgbaImage) {
    if stamp.width <= 0.0 || stamp.height <= 0.0 {
        return;
    }
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    let half_w = stamp.width * 0.5;
    let half_h = stamp.height * 0.5;
    let angle = stamp.rotation.to_radians();
    let (sin, cos) = angle.sin_cos();

    // Bounding box of the rotated rect, clipped to the canvas.
    let extent_x = half_w * cos.abs() + half_h * sin.abs();
    let extent_y = half_w * sin.abs() + half_h * cos.abs();
    let x0 = ((stamp.x - extent_x).floor() as i64).max(0);
    let y0 = ((stamp.y - extent_y).floor() as i64).max(0);
    let x1 = ((stamp.x + extent_x).ceil() as i64 + 1).min(cw);
    let y1 = ((stamp.y + extent_y).ceil() as i64 + 1).min(ch);

    let scale_x = asset.width() as f32 / stamp.width;
    let scale_y = asset.height() as f32 / stamp.height;

    for y in y0..y1 {
        for x in x0..x1 {
            // Canvas → unrotated stamp-local coordinates.
            let dx = x as f32 + 0.5 - stamp.x;
            let dy = y as f32 + 0.5 - stamp.y;
            let lx = dx * cos + dy * sin;
            let ly = -dx * sin + dy * cos;
            if lx < -half_w || lx >= half_w || ly < -half_h || ly >= half_h {
                continue;
            }
            let sx = (lx + half_w) * scale_x;
            let sy = (ly + half_h) * scale_y;
            let src = sample_bilinear(asset, sx - 0.5, sy - 0.5);
            if src[3] == 0 {
                continue;
            }
            let dst = canvas.get_pixel_mut(x as u32, y as u32);
            blend_over(&mut dst.0, src);
        }
    }
}

/// Bilinear sample with clamp-to-edge.
fn sample_bilinear(img: &RgbaImage, x: f32, y: f32) -> [u8; 4] {
    let max_x = img.width() as i64 - 1;
    let max_y = img.height() as i64 - 1;
    let fx = x.floor();
    let fy = y.floor();
    let tx = x - fx;
    let ty = y - fy;

    let px = |ix: i64, iy: i64| -> [u8; 4] {
        img.get_pixel(ix.clamp(0, max_x) as u32, iy.clamp(0, max_y) as u32).0
    };
    let (ix, iy) = (fx as i64, fy as i64);
    let (p00, p10) = (px(ix, iy), px(ix + 1, iy));
    let (p01, p11) = (px(ix, iy + 1), px(ix + 1, iy + 1));

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f32 * (1.0 - tx) + p10[c] as f32 * tx;
        let bottom = p01[c] as f32 * (1.0 - tx) + p11[c] as f32 * tx;
        out[c] = (top * (1.0 - ty) + bottom * ty).round() as u8;
    }
    out
}

/// Un-premultiplied source-over blend.
pub fn blend_over(dst: &mut [u8; 4], src: [u8; 4]) {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        *dst = src;
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        *dst = [0, 0, 0, 0];
        return;
    }
    for c in 0..3 {
        let s = src[c] as f32;
        let d = dst[c] as f32;
        dst[c] = ((s * sa + d * da * (1.0 - sa)) / out_a).round() as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn stamp_at(x: f32, y: f32, w: f32, h: f32, rotation: f32) -> StampArea {
        StampArea {
            id: Uuid::new_v4(),
            x,
            y,
            width: w,
            height: h,
            rotation,
            asset_id: "test".to_string(),
            kind: StampKind::Image,
            content: String::new(),
        }
    }

    #[test]
    fn placeholder_is_checkered() {
        let img = placeholder(32, 32);
        assert_eq!((img.width(), img.height()), (32, 32));
        assert_ne!(img.get_pixel(0, 0), img.get_pixel(8, 0));
    }

    #[test]
    fn svg_rasterizes_at_intrinsic_size() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20">
            <rect width="40" height="20" fill="#ff0000"/></svg>"##;
        let img = rasterize_svg(svg).unwrap();
        assert_eq!((img.width(), img.height()), (40, 20));
        let center = img.get_pixel(20, 10).0;
        assert_eq!(center[0], 255);
        assert_eq!(center[1], 0);
        assert_eq!(center[3], 255);
    }

    #[test]
    fn unrotated_stamp_covers_its_rect() {
        let mut canvas = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let asset = RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255]));
        draw_stamp(&mut canvas, &stamp_at(50.0, 50.0, 40.0, 40.0, 0.0), &asset);

        assert_eq!(canvas.get_pixel(50, 50).0, [0, 255, 0, 255]);
        assert_eq!(canvas.get_pixel(35, 35).0, [0, 255, 0, 255]);
        // Outside the rect untouched.
        assert_eq!(canvas.get_pixel(20, 50).0, [0, 0, 0, 255]);
    }

    #[test]
    fn rotation_moves_the_footprint() {
        let asset = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        // A wide flat stamp: unrotated it covers (80, 50); rotated 90° that
        // point is bare and (50, 80) is covered instead.
        let mut flat = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        draw_stamp(&mut flat, &stamp_at(50.0, 50.0, 70.0, 10.0, 0.0), &asset);
        assert_eq!(flat.get_pixel(80, 50).0[0], 255);
        assert_eq!(flat.get_pixel(50, 80).0[0], 0);

        let mut turned = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        draw_stamp(&mut turned, &stamp_at(50.0, 50.0, 70.0, 10.0, 90.0), &asset);
        assert_eq!(turned.get_pixel(80, 50).0[0], 0);
        assert_eq!(turned.get_pixel(50, 80).0[0], 255);
    }

    #[test]
    fn stamp_clips_to_canvas_edges() {
        let mut canvas = RgbaImage::from_pixel(50, 50, Rgba([0, 0, 0, 255]));
        let asset = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
        // Center off-canvas; must not panic.
        draw_stamp(&mut canvas, &stamp_at(-10.0, 25.0, 40.0, 40.0, 30.0), &asset);
        draw_stamp(&mut canvas, &stamp_at(60.0, 60.0, 40.0, 40.0, 0.0), &asset);
        assert_eq!(canvas.get_pixel(0, 25).0[0], 255);
    }

    #[test]
    fn semi_transparent_stamp_blends() {
        let mut canvas = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        let asset = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 128]));
        draw_stamp(&mut canvas, &stamp_at(10.0, 10.0, 10.0, 10.0, 0.0), &asset);
        let px = canvas.get_pixel(10, 10).0;
        assert!(px[0] > 100 && px[0] < 150, "got {}", px[0]);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn cache_resolves_inserted_assets_and_tracks_pending() {
        let mut cache = StampCache::new();
        let mut stamp = stamp_at(0.0, 0.0, 10.0, 10.0, 0.0);
        stamp.asset_id = "local".to_string();
        stamp.content = "/nonexistent/path.png".to_string();

        // Unknown file asset: load kicked off, placeholder phase.
        assert!(cache.resolve(&stamp).is_none());

        // Pre-inserted pixels resolve immediately.
        cache.insert("ready".to_string(), RgbaImage::new(4, 4));
        stamp.asset_id = "ready".to_string();
        assert!(cache.resolve(&stamp).is_some());

        // The failed background load eventually lands as a placeholder.
        stamp.asset_id = "local".to_string();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            cache.poll();
            if let Some(img) = cache.resolve(&stamp) {
                assert!(img.width() > 0);
                break;
            }
            assert!(std::time::Instant::now() < deadline, "load never completed");
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }
}
