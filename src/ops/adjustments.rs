// ============================================================================
// TONAL ADJUSTMENT ENGINE — ordered per-pixel chain (CPU scalar path)
// ============================================================================
//
// The application order is a correctness contract shared with the fragment
// shader in `gpu::shaders` — the two implementations must stay in lockstep:
//
//   1. brightness   c *= 1 + b/200
//   2. contrast     c  = (c - PIVOT) * (1 + k/200) + PIVOT
//   3. exposure     c *= 2^(e/100)
//   4. shadows/highlights   Rec.709 luma masks (1-L)² / L²
//   5. saturation   RGB→HSL, S *= 1 + s/100, HSL→RGB
//   6. temperature  R += t/100*0.1, B -= t/100*0.1
//   7. sepia        blend toward sepia matrix by sepia/100
//   8. grayscale    blend toward luma by g/100
//   9. vignette     c *= 1 + v/100 * dist² * 1.5
//  10. clamp to [0,1]  (single clamp, deferred — not per-step)
//  11. blur         radius = blur/100 * 10, scaled by render scale
//  12. grain        deterministic hash noise, reads post-blur pixels
//
// All intermediate math runs unclamped in normalized f32; only the final
// store rounds to 8-bit.

use image::RgbaImage;
use rayon::prelude::*;

use crate::ops::{blur, grain};
use crate::state::AdjustmentsState;

/// Contrast pivot: 128 on the 8-bit scale, expressed in normalized space so
/// a mid-gray (128,128,128) pixel is a fixed point of the contrast stage.
pub const CONTRAST_PIVOT: f32 = 128.0 / 255.0;

/// Rec.709 luma weights.
pub const LUMA_R: f32 = 0.2126;
pub const LUMA_G: f32 = 0.7152;
pub const LUMA_B: f32 = 0.0722;

/// Empirically tuned stage constants, pinned by tests.  These are behavioral
/// contracts shared with the shader — do not re-derive them.
pub const TEMPERATURE_SHIFT: f32 = 0.1;
pub const VIGNETTE_STRENGTH: f32 = 1.5;
pub const BLUR_RADIUS_MAX: f32 = 10.0;

/// Per-pixel multipliers derived once per frame from the slider values.
/// The GPU renderer packs these into its tonal-pass uniforms.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StageFactors {
    pub(crate) brightness_mul: f32,
    pub(crate) contrast_mul: f32,
    pub(crate) exposure_mul: f32,
    pub(crate) shadows: f32,
    pub(crate) highlights: f32,
    pub(crate) saturation: f32,
    pub(crate) temperature: f32,
    pub(crate) sepia: f32,
    pub(crate) grayscale: f32,
    pub(crate) vignette: f32,
}

impl StageFactors {
    pub(crate) fn from_state(adj: &AdjustmentsState) -> Self {
        Self {
            brightness_mul: 1.0 + adj.brightness / 200.0,
            contrast_mul: 1.0 + adj.contrast / 200.0,
            exposure_mul: (adj.exposure / 100.0).exp2(),
            shadows: adj.shadows / 100.0,
            highlights: adj.highlights / 100.0,
            saturation: adj.saturation / 100.0,
            temperature: adj.temperature / 100.0 * TEMPERATURE_SHIFT,
            sepia: adj.sepia / 100.0,
            grayscale: adj.grayscale / 100.0,
            vignette: adj.vignette / 100.0,
        }
    }
}

/// Apply all non-zero adjustments to the buffer in place.
///
/// `render_scale` converts the logical blur radius into on-screen pixels
/// when the buffer is a scaled preview (pass 1.0 for export / natural
/// resolution).  Identity states return immediately without touching a
/// single pixel.
pub fn apply_adjustments(img: &mut RgbaImage, adj: &AdjustmentsState, render_scale: f32) {
    if adj.is_identity() {
        return;
    }
    let adj = adj.clamped();

    apply_tonal_stages(img, &adj);

    // Stage 11: global blur reads the tonally adjusted pixels.
    if adj.blur > 0.0 {
        let radius = adj.blur / 100.0 * BLUR_RADIUS_MAX * render_scale.max(0.0);
        blur::box_blur(img, radius);
    }

    // Stage 12: grain reads the post-blur pixels; the hash domain is
    // image-space, so the preview scale divides back out.
    if adj.grain > 0.0 {
        grain::apply_grain(img, adj.grain / 100.0, (0.0, 0.0), render_scale.max(0.001));
    }
}

/// Stages 1–10 only (no blur/grain).  Used directly by the regional-blur
/// compositing path, which needs the tonal base image before any blur.
pub fn apply_tonal_stages(img: &mut RgbaImage, adj: &AdjustmentsState) {
    let w = img.width() as usize;
    let h = img.height() as usize;
    if w == 0 || h == 0 {
        return;
    }

    let factors = StageFactors::from_state(adj);
    let stride = w * 4;
    let half_w = w as f32 / 2.0;
    let half_h = h as f32 / 2.0;

    let raw = img.as_mut();
    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let ny = (y as f32 + 0.5 - half_h) / half_h;
        for x in 0..w {
            let pi = x * 4;
            let nx = (x as f32 + 0.5 - half_w) / half_w;
            // Normalized distance² from center, 0 at center, 1 at corners.
            let dist2 = (nx * nx + ny * ny) / 2.0;

            let r = row[pi] as f32 / 255.0;
            let g = row[pi + 1] as f32 / 255.0;
            let b = row[pi + 2] as f32 / 255.0;
            let (r, g, b) = adjust_pixel(r, g, b, &factors, dist2);
            row[pi] = (r * 255.0).round().clamp(0.0, 255.0) as u8;
            row[pi + 1] = (g * 255.0).round().clamp(0.0, 255.0) as u8;
            row[pi + 2] = (b * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    });
}

/// The shared scalar formula — one pixel through stages 1–10.
///
/// `dist2` is the normalized squared distance from the surface center used
/// by the vignette stage.  Input and output are normalized RGB; the output
/// is clamped to [0,1] (stage 10).
fn adjust_pixel(
    mut r: f32,
    mut g: f32,
    mut b: f32,
    f: &StageFactors,
    dist2: f32,
) -> (f32, f32, f32) {
    // 1. Brightness
    r *= f.brightness_mul;
    g *= f.brightness_mul;
    b *= f.brightness_mul;

    // 2. Contrast
    r = (r - CONTRAST_PIVOT) * f.contrast_mul + CONTRAST_PIVOT;
    g = (g - CONTRAST_PIVOT) * f.contrast_mul + CONTRAST_PIVOT;
    b = (b - CONTRAST_PIVOT) * f.contrast_mul + CONTRAST_PIVOT;

    // 3. Exposure
    r *= f.exposure_mul;
    g *= f.exposure_mul;
    b *= f.exposure_mul;

    // 4. Shadows / highlights: luma computed once on the current values.
    if f.shadows != 0.0 || f.highlights != 0.0 {
        let luma = LUMA_R * r + LUMA_G * g + LUMA_B * b;
        let shadow_mask = (1.0 - luma) * (1.0 - luma);
        let highlight_mask = luma * luma;
        r -= r * f.shadows * shadow_mask * 0.5;
        g -= g * f.shadows * shadow_mask * 0.5;
        b -= b * f.shadows * shadow_mask * 0.5;
        r += r * f.highlights * highlight_mask * 0.5;
        g += g * f.highlights * highlight_mask * 0.5;
        b += b * f.highlights * highlight_mask * 0.5;
    }

    // 5. Saturation via HSL.  The round trip needs in-range values, so this
    //    stage clamps its inputs — the only mid-chain clamp.
    if f.saturation != 0.0 {
        let (h, s, l) = rgb_to_hsl(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0));
        let s = (s * (1.0 + f.saturation)).clamp(0.0, 1.0);
        let (nr, ng, nb) = hsl_to_rgb(h, s, l);
        r = nr;
        g = ng;
        b = nb;
    }

    // 6. Temperature
    r += f.temperature;
    b -= f.temperature;

    // 7. Sepia matrix blend
    if f.sepia > 0.0 {
        let sr = 0.393 * r + 0.769 * g + 0.189 * b;
        let sg = 0.349 * r + 0.686 * g + 0.168 * b;
        let sb = 0.272 * r + 0.534 * g + 0.131 * b;
        r += (sr - r) * f.sepia;
        g += (sg - g) * f.sepia;
        b += (sb - b) * f.sepia;
    }

    // 8. Grayscale blend toward luma
    if f.grayscale > 0.0 {
        let luma = LUMA_R * r + LUMA_G * g + LUMA_B * b;
        r += (luma - r) * f.grayscale;
        g += (luma - g) * f.grayscale;
        b += (luma - b) * f.grayscale;
    }

    // 9. Vignette
    if f.vignette != 0.0 {
        let mul = 1.0 + f.vignette * dist2 * VIGNETTE_STRENGTH;
        r *= mul;
        g *= mul;
        b *= mul;
    }

    // 10. Single deferred clamp
    (r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
}

// ============================================================================
// RGB ↔ HSL
// ============================================================================

/// RGB (normalized) to HSL.  Hue in [0,1).
pub fn rgb_to_hsl(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max_c = r.max(g).max(b);
    let min_c = r.min(g).min(b);
    let l = (max_c + min_c) * 0.5;
    let d = max_c - min_c;
    if d <= 1e-6 {
        return (0.0, 0.0, l);
    }

    let mut h = if max_c == r {
        let mut v = (g - b) / d;
        if v < 0.0 {
            v += 6.0;
        }
        v
    } else if max_c == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    h /= 6.0;
    let s = d / (1.0 - (2.0 * l - 1.0).abs()).max(1e-6);
    (h, s.clamp(0.0, 1.0), l)
}

fn hue_to_rgb(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// HSL back to RGB (normalized).
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s <= 1e-6 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba(rgba))
    }

    #[test]
    fn identity_adjustments_leave_pixels_untouched() {
        let mut img = RgbaImage::from_fn(16, 16, |x, y| {
            image::Rgba([(x * 16) as u8, (y * 16) as u8, 77, 255])
        });
        let before = img.clone();
        apply_adjustments(&mut img, &AdjustmentsState::default(), 1.0);
        assert_eq!(before.as_raw(), img.as_raw());
    }

    #[test]
    fn full_contrast_fixes_midpoint_gray() {
        // (128-128)*2 + 128 = 128: the pivot pixel must not move.
        let mut img = solid(100, 100, [128, 128, 128, 255]);
        let adj = AdjustmentsState {
            contrast: 100.0,
            ..Default::default()
        };
        apply_adjustments(&mut img, &adj, 1.0);
        assert_eq!(img.get_pixel(50, 50).0, [128, 128, 128, 255]);
    }

    #[test]
    fn full_contrast_spreads_off_midpoint_values() {
        let mut img = solid(4, 4, [192, 192, 192, 255]);
        let adj = AdjustmentsState {
            contrast: 100.0,
            ..Default::default()
        };
        apply_adjustments(&mut img, &adj, 1.0);
        // (192-128)*1.5 + 128 = 224
        assert_eq!(img.get_pixel(0, 0).0[0], 224);
    }

    #[test]
    fn full_exposure_doubles_pixel_values() {
        // 2^(100/100) = 2; 128*2 = 256 → clamped to 255.
        let mut img = solid(100, 100, [128, 128, 128, 255]);
        let adj = AdjustmentsState {
            exposure: 100.0,
            ..Default::default()
        };
        apply_adjustments(&mut img, &adj, 1.0);
        assert_eq!(img.get_pixel(50, 50).0, [255, 255, 255, 255]);

        let mut img = solid(4, 4, [60, 60, 60, 255]);
        apply_adjustments(&mut img, &adj, 1.0);
        assert_eq!(img.get_pixel(0, 0).0[0], 120);
    }

    #[test]
    fn full_grayscale_on_pure_red_gives_rec709_luma() {
        // 0.2126 * 255 ≈ 54.2 → 54 on every channel.
        let mut img = solid(4, 4, [255, 0, 0, 255]);
        let adj = AdjustmentsState {
            grayscale: 100.0,
            ..Default::default()
        };
        apply_adjustments(&mut img, &adj, 1.0);
        assert_eq!(img.get_pixel(1, 1).0, [54, 54, 54, 255]);
    }

    #[test]
    fn temperature_shifts_red_and_blue_oppositely() {
        let mut img = solid(4, 4, [100, 100, 100, 255]);
        let adj = AdjustmentsState {
            temperature: 100.0,
            ..Default::default()
        };
        apply_adjustments(&mut img, &adj, 1.0);
        let px = img.get_pixel(0, 0).0;
        // +0.1 normalized = +25.5 on the 8-bit scale; blue symmetric down.
        assert!((px[0] as i32 - 126).abs() <= 1, "red: {}", px[0]);
        assert_eq!(px[1], 100);
        assert!((px[2] as i32 - 75).abs() <= 1, "blue: {}", px[2]);
    }

    #[test]
    fn negative_vignette_darkens_corners_not_center() {
        let mut img = solid(101, 101, [200, 200, 200, 255]);
        let adj = AdjustmentsState {
            vignette: -100.0,
            ..Default::default()
        };
        apply_adjustments(&mut img, &adj, 1.0);
        let center = img.get_pixel(50, 50).0[0];
        let corner = img.get_pixel(0, 0).0[0];
        assert!(center >= 199, "center should be nearly untouched: {}", center);
        assert!(corner < 80, "corner should be strongly darkened: {}", corner);
    }

    #[test]
    fn saturation_minus_hundred_desaturates() {
        let mut img = solid(4, 4, [200, 40, 40, 255]);
        let adj = AdjustmentsState {
            saturation: -100.0,
            ..Default::default()
        };
        apply_adjustments(&mut img, &adj, 1.0);
        let px = img.get_pixel(0, 0).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn sepia_full_matches_matrix() {
        let mut img = solid(4, 4, [100, 150, 200, 255]);
        let adj = AdjustmentsState {
            sepia: 100.0,
            ..Default::default()
        };
        apply_adjustments(&mut img, &adj, 1.0);
        let px = img.get_pixel(0, 0).0;
        // 0.393*100 + 0.769*150 + 0.189*200 = 192.45 → 192
        assert_eq!(px[0], 192);
        // 0.349*100 + 0.686*150 + 0.168*200 = 171.4 → 171
        assert_eq!(px[1], 171);
        // 0.272*100 + 0.534*150 + 0.131*200 = 133.5 → 133 or 134 (f32 rounding)
        assert!((px[2] as i32 - 134).abs() <= 1);
    }

    #[test]
    fn hsl_round_trip() {
        for &(r, g, b) in &[
            (1.0, 0.0, 0.0),
            (0.25, 0.5, 0.75),
            (0.9, 0.9, 0.1),
            (0.0, 0.0, 0.0),
            (1.0, 1.0, 1.0),
        ] {
            let (h, s, l) = rgb_to_hsl(r, g, b);
            let (nr, ng, nb) = hsl_to_rgb(h, s, l);
            assert!((nr - r).abs() < 1e-4, "r: {} vs {}", nr, r);
            assert!((ng - g).abs() < 1e-4, "g: {} vs {}", ng, g);
            assert!((nb - b).abs() < 1e-4, "b: {} vs {}", nb, b);
        }
    }
}
