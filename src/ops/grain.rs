// ============================================================================
// FILM GRAIN ENGINE — deterministic multi-octave luminance-masked noise
// ============================================================================
//
// The noise source is a pure hash of quantized pixel position (no RNG
// state), so the same image + parameters always produce the same grain
// pattern — preview and export must match.  The WGSL grain pass in
// `gpu::shaders` uses the same hash and constants.

use image::RgbaImage;
use rayon::prelude::*;

use crate::ops::adjustments::{LUMA_B, LUMA_G, LUMA_R};

/// Octave scales: source-image coordinates are divided by these before
/// hashing.  Offsets decorrelate the octaves.
const SCALE_FINE: f32 = 2.5;
const SCALE_MEDIUM: f32 = 5.5;
const SCALE_COARSE: f32 = 9.0;
const OFFSET_MEDIUM: (f32, f32) = (17.0, 59.0);
const OFFSET_COARSE: (f32, f32) = (43.0, 127.0);

const WEIGHT_FINE: f32 = 0.5;
const WEIGHT_MEDIUM: f32 = 0.3;
const WEIGHT_COARSE: f32 = 0.2;

/// Classic shader hash: deterministic position → [0,1).
fn hash2d(x: f32, y: f32) -> f32 {
    let v = (x * 127.1 + y * 311.7).sin() * 43758.5453;
    v - v.floor()
}

/// Combined 3-octave noise at a pixel position, centered around zero.
fn octave_noise(x: f32, y: f32) -> f32 {
    let fine = hash2d((x / SCALE_FINE).floor(), (y / SCALE_FINE).floor());
    let medium = hash2d(
        (x / SCALE_MEDIUM).floor() + OFFSET_MEDIUM.0,
        (y / SCALE_MEDIUM).floor() + OFFSET_MEDIUM.1,
    );
    let coarse = hash2d(
        (x / SCALE_COARSE).floor() + OFFSET_COARSE.0,
        (y / SCALE_COARSE).floor() + OFFSET_COARSE.1,
    );
    WEIGHT_FINE * fine + WEIGHT_MEDIUM * medium + WEIGHT_COARSE * coarse - 0.5
}

/// Add grain to a post-blur buffer.  `amount` in (0, 1]; values outside the
/// range are clamped, 0 is a no-op.
///
/// The hash domain is source-image pixels: `origin` is the crop window's
/// top-left in source coordinates and `scale` maps crop-space pixels to
/// buffer pixels, so a given image pixel keeps its noise value regardless
/// of crop or render scale.
///
/// Grain is masked toward midtones: fully visible at luma 0.5, fading to
/// nothing at pure black/white.
pub fn apply_grain(img: &mut RgbaImage, amount: f32, origin: (f32, f32), scale: f32) {
    let amount = amount.clamp(0.0, 1.0);
    if amount == 0.0 {
        return;
    }
    let w = img.width() as usize;
    if w == 0 {
        return;
    }
    let stride = w * 4;
    let inv_scale = 1.0 / scale.max(0.001);

    let raw = img.as_mut();
    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let sy = y as f32 * inv_scale + origin.1;
        for x in 0..w {
            let pi = x * 4;
            let r = row[pi] as f32 / 255.0;
            let g = row[pi + 1] as f32 / 255.0;
            let b = row[pi + 2] as f32 / 255.0;

            let luma = LUMA_R * r + LUMA_G * g + LUMA_B * b;
            let mask = (1.0 - (luma - 0.5).abs() * 2.0).max(0.0).sqrt();
            if mask <= 0.0 {
                continue;
            }

            let sx = x as f32 * inv_scale + origin.0;
            let noise = octave_noise(sx, sy) * mask * amount * 0.5;
            row[pi] = ((r + noise) * 255.0).round().clamp(0.0, 255.0) as u8;
            row[pi + 1] = ((g + noise) * 255.0).round().clamp(0.0, 255.0) as u8;
            row[pi + 2] = ((b + noise) * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    });
}

// ============================================================================
// TESTS
// ============================================================================
