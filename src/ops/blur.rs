// ============================================================================
// SEPARABLE BLUR ENGINE — 3× box blur ≈ Gaussian, O(n) sliding window
// ============================================================================
//
// Each box pass is a 1D horizontal sweep followed by a 1D vertical sweep.
// The sweeps keep a running window sum (add the entering pixel, subtract the
// leaving one), so cost is O(pixels) regardless of radius — re-summing the
// window per pixel would be O(pixels·radius) and unusable for large radii.
// Edge handling is clamp-to-edge (boundary pixel replicated).

use image::{RgbaImage, imageops};
use rayon::prelude::*;

/// Blur the whole buffer in place.  `radius <= 0` is a strict no-op.
pub fn box_blur(img: &mut RgbaImage, radius: f32) {
    let box_radius = (radius / 2.0).round() as i64;
    if box_radius <= 0 {
        return;
    }
    let w = img.width() as usize;
    let h = img.height() as usize;
    if w == 0 || h == 0 {
        return;
    }

    let mut buf: Vec<f32> = img.as_raw().iter().map(|&v| v as f32).collect();
    let mut scratch = vec![0.0f32; buf.len()];
    let mut transposed = vec![0.0f32; buf.len()];

    // Three box passes approximate a Gaussian.
    for _ in 0..3 {
        // Horizontal sweep, then the same row sweep on the transposed
        // buffer for the vertical direction.
        slide_rows(&buf, &mut scratch, w, box_radius);
        transpose(&scratch, &mut transposed, w, h);
        slide_rows(&transposed, &mut scratch, h, box_radius);
        transpose(&scratch, &mut buf, h, w);
    }

    let raw = img.as_mut();
    for (dst, &src) in raw.iter_mut().zip(buf.iter()) {
        *dst = src.round().clamp(0.0, 255.0) as u8;
    }
}

/// Blur a sub-rectangle in place.
///
/// The rectangle is extracted with a `2×radius` apron (clamped to the
/// surface) so the window never starves at the region boundary, blurred as
/// its own surface, and only the inner rect is written back.
pub fn box_blur_region(img: &mut RgbaImage, x: i64, y: i64, width: u32, height: u32, radius: f32) {
    let src = img.clone();
    box_blur_region_into(&src, img, x, y, width, height, radius);
}

/// Blur a sub-rectangle of `src` and write it into the same rect of `dst`.
///
/// Reading from a separate source lets the compositor blur regions of the
/// pre-blur base image while accumulating into the global-blurred composite.
/// `src` and `dst` must have identical dimensions.
pub fn box_blur_region_into(
    src: &RgbaImage,
    dst: &mut RgbaImage,
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    radius: f32,
) {
    debug_assert_eq!(src.dimensions(), dst.dimensions());
    if radius <= 0.0 || width == 0 || height == 0 {
        return;
    }
    let img_w = src.width() as i64;
    let img_h = src.height() as i64;

    // Clip the target rect to the surface.
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + width as i64).min(img_w);
    let y1 = (y + height as i64).min(img_h);
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    // Padded extraction rect.
    let pad = (radius * 2.0).ceil() as i64;
    let px0 = (x0 - pad).max(0);
    let py0 = (y0 - pad).max(0);
    let px1 = (x1 + pad).min(img_w);
    let py1 = (y1 + pad).min(img_h);

    let mut sub = imageops::crop_imm(
        src,
        px0 as u32,
        py0 as u32,
        (px1 - px0) as u32,
        (py1 - py0) as u32,
    )
    .to_image();
    box_blur(&mut sub, radius);

    // Write back the inner (non-padded) rect only.
    let sub_raw = sub.as_raw();
    let sub_stride = sub.width() as usize * 4;
    let img_stride = img_w as usize * 4;
    let raw = dst.as_mut();
    for row in y0..y1 {
        let local_y = (row - py0) as usize;
        let src_off = local_y * sub_stride + (x0 - px0) as usize * 4;
        let dst_off = row as usize * img_stride + x0 as usize * 4;
        let len = (x1 - x0) as usize * 4;
        raw[dst_off..dst_off + len].copy_from_slice(&sub_raw[src_off..src_off + len]);
    }
}

/// One sliding-window box sweep along each row of an interleaved RGBA f32
/// buffer.  Rows are independent, so this parallelizes per row.
fn slide_rows(src: &[f32], dst: &mut [f32], w: usize, box_radius: i64) {
    let stride = w * 4;
    let r = box_radius;
    let window = (2 * r + 1) as f32;
    let inv = 1.0 / window;

    dst.par_chunks_mut(stride)
        .zip(src.par_chunks(stride))
        .for_each(|(row_out, row_in)| {
            let clamp_px = |i: i64| -> usize { i.clamp(0, w as i64 - 1) as usize * 4 };
            // Prime the window sum for x = 0 with clamp-to-edge samples.
            let mut sum = [0.0f32; 4];
            for i in -r..=r {
                let off = clamp_px(i);
                for c in 0..4 {
                    sum[c] += row_in[off + c];
                }
            }
            for x in 0..w {
                let out = x * 4;
                for c in 0..4 {
                    row_out[out + c] = sum[c] * inv;
                }
                // Slide: add the entering sample, drop the leaving one.
                let enter = clamp_px(x as i64 + r + 1);
                let leave = clamp_px(x as i64 - r);
                for c in 0..4 {
                    sum[c] += row_in[enter + c] - row_in[leave + c];
                }
            }
        });
}

/// Transpose a w×h interleaved RGBA f32 buffer into h×w, parallel over
/// destination rows.
fn transpose(src: &[f32], dst: &mut [f32], w: usize, h: usize) {
    // Destination has `w` rows of `h` pixels.
    dst.par_chunks_mut(h * 4)
        .enumerate()
        .for_each(|(x, dst_row)| {
            for y in 0..h {
                let s = (y * w + x) * 4;
                let d = y * 4;
                dst_row[d..d + 4].copy_from_slice(&src[s..s + 4]);
            }
        });
}

/// Single horizontal box pass at full precision, for tests and diagnostics.
#[cfg(test)]
fn horizontal_box_pass(img: &RgbaImage, box_radius: i64) -> RgbaImage {
    let w = img.width() as usize;
    let h = img.height() as usize;
    let buf: Vec<f32> = img.as_raw().iter().map(|&v| v as f32).collect();
    let mut out = vec![0.0f32; buf.len()];
    slide_rows(&buf, &mut out, w, box_radius);
    let raw: Vec<u8> = out.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8).collect();
    RgbaImage::from_raw(w as u32, h as u32, raw).unwrap()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_radius_is_a_no_op() {
        let mut img = RgbaImage::from_fn(32, 32, |x, y| {
            image::Rgba([(x * 7) as u8, (y * 5) as u8, 9, 255])
        });
        let before = img.clone();
        box_blur(&mut img, 0.0);
        assert_eq!(before.as_raw(), img.as_raw());
        box_blur(&mut img, -3.0);
        assert_eq!(before.as_raw(), img.as_raw());
        // Radius below the box rounding threshold is also a no-op.
        box_blur(&mut img, 0.9);
        assert_eq!(before.as_raw(), img.as_raw());
    }

    #[test]
    fn single_horizontal_pass_peak_is_window_average() {
        // One white pixel, box_radius = round(5/2) = 3 → window of 7, so the
        // brightest post-pass value is 255/7 rounded.
        let mut img = RgbaImage::from_pixel(21, 9, image::Rgba([0, 0, 0, 255]));
        img.put_pixel(10, 4, image::Rgba([255, 255, 255, 255]));
        let out = horizontal_box_pass(&img, 3);

        let expected = (255.0f32 / 7.0).round() as u8;
        let brightest = out.pixels().map(|p| p.0[0]).max().unwrap();
        assert_eq!(brightest, expected);
        // The footprint spans exactly the window around the source pixel.
        assert_eq!(out.get_pixel(7, 4).0[0], expected);
        assert_eq!(out.get_pixel(13, 4).0[0], expected);
        assert_eq!(out.get_pixel(6, 4).0[0], 0);
        assert_eq!(out.get_pixel(14, 4).0[0], 0);
        // Other rows untouched by a horizontal pass.
        assert_eq!(out.get_pixel(10, 3).0[0], 0);
    }

    fn total_variation(img: &RgbaImage) -> u64 {
        let mut tv = 0u64;
        for y in 0..img.height() {
            for x in 0..img.width() {
                let v = img.get_pixel(x, y).0[0] as i64;
                if x + 1 < img.width() {
                    tv += (v - img.get_pixel(x + 1, y).0[0] as i64).unsigned_abs();
                }
                if y + 1 < img.height() {
                    tv += (v - img.get_pixel(x, y + 1).0[0] as i64).unsigned_abs();
                }
            }
        }
        tv
    }

    #[test]
    fn increasing_radius_monotonically_smooths_checkerboard() {
        let base = RgbaImage::from_fn(64, 64, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        let mut last_tv = total_variation(&base);
        for &radius in &[2.0f32, 4.0, 8.0, 16.0] {
            let mut img = base.clone();
            box_blur(&mut img, radius);
            let tv = total_variation(&img);
            assert!(
                tv < last_tv,
                "radius {} did not smooth: {} >= {}",
                radius,
                tv,
                last_tv
            );
            last_tv = tv;
        }
    }

    #[test]
    fn blur_preserves_flat_regions() {
        let mut img = RgbaImage::from_pixel(32, 32, image::Rgba([90, 120, 200, 255]));
        box_blur(&mut img, 6.0);
        // A constant image is a fixed point of any box filter.
        for p in img.pixels() {
            assert_eq!(p.0, [90, 120, 200, 255]);
        }
    }

    #[test]
    fn regional_blur_leaves_outside_untouched() {
        let mut img = RgbaImage::from_fn(60, 60, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        let before = img.clone();
        box_blur_region(&mut img, 20, 20, 20, 20, 5.0);

        // Inside changed (checkerboard gets averaged toward gray).
        assert_ne!(
            img.get_pixel(30, 30).0,
            before.get_pixel(30, 30).0,
            "region interior should be blurred"
        );
        // Outside the rect is bit-identical.
        for y in 0..60u32 {
            for x in 0..60u32 {
                if x < 20 || x >= 40 || y < 20 || y >= 40 {
                    assert_eq!(img.get_pixel(x, y), before.get_pixel(x, y));
                }
            }
        }
    }

    #[test]
    fn regional_blur_clips_to_surface() {
        let mut img = RgbaImage::from_pixel(16, 16, image::Rgba([50, 50, 50, 255]));
        // Rect partially off-surface must not panic and must not touch alpha.
        box_blur_region(&mut img, -8, -8, 20, 20, 4.0);
        box_blur_region(&mut img, 100, 100, 20, 20, 4.0);
        for p in img.pixels() {
            assert_eq!(p.0[3], 255);
        }
    }
}
