// ============================================================================
// COORDINATE MAPPER — image space ↔ canvas space
// ============================================================================
//
// Every interactive tool (crop handles, stamp drag, annotation drawing,
// blur-area resize) composes on top of this mapping, so it must be exact and
// reversible to sub-pixel precision.

use crate::error::{Error, Result};
use crate::state::{CropArea, Viewport};

/// A point in either image or canvas space, depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Dimensions of the two surfaces the mapping runs between.  Constructed
/// fresh per frame by the compositor; zero-sized surfaces are rejected.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceGeometry {
    pub canvas_width: f32,
    pub canvas_height: f32,
    pub image_width: f32,
    pub image_height: f32,
}

impl SurfaceGeometry {
    pub fn new(canvas_width: f32, canvas_height: f32, image_width: f32, image_height: f32) -> Self {
        Self {
            canvas_width,
            canvas_height,
            image_width,
            image_height,
        }
    }

    fn check(&self) -> Result<()> {
        if self.canvas_width <= 0.0
            || self.canvas_height <= 0.0
            || self.image_width <= 0.0
            || self.image_height <= 0.0
        {
            return Err(Error::MissingSurface);
        }
        Ok(())
    }

    /// Source rect being displayed: the crop rectangle, or the full image.
    fn source_rect(&self, crop: Option<&CropArea>) -> (f32, f32, f32, f32) {
        match crop {
            Some(c) if c.is_valid() => (c.x, c.y, c.width, c.height),
            _ => (0.0, 0.0, self.image_width, self.image_height),
        }
    }
}

/// Fit-to-canvas scale factor for the current crop (or full image).
/// Computed once per image/crop load and stored in `Viewport::scale`.
pub fn fit_scale(geometry: &SurfaceGeometry, crop: Option<&CropArea>) -> Result<f32> {
    geometry.check()?;
    let (_, _, sw, sh) = geometry.source_rect(crop);
    Ok((geometry.canvas_width / sw).min(geometry.canvas_height / sh))
}

/// Map an image-space point to canvas space.
///
/// The displayed source (crop or full image) is centered on the canvas,
/// scaled by `viewport.total_scale()`, then shifted by the pan offset.
pub fn image_to_canvas(
    point: Point,
    viewport: &Viewport,
    crop: Option<&CropArea>,
    geometry: &SurfaceGeometry,
) -> Result<Point> {
    geometry.check()?;
    let (off_x, off_y, sw, sh) = geometry.source_rect(crop);
    let total = viewport.total_scale();
    Ok(Point {
        x: (point.x - off_x - sw / 2.0) * total + geometry.canvas_width / 2.0 + viewport.offset_x,
        y: (point.y - off_y - sh / 2.0) * total + geometry.canvas_height / 2.0 + viewport.offset_y,
    })
}

/// Exact algebraic inverse of [`image_to_canvas`].
pub fn canvas_to_image(
    point: Point,
    viewport: &Viewport,
    crop: Option<&CropArea>,
    geometry: &SurfaceGeometry,
) -> Result<Point> {
    geometry.check()?;
    let (off_x, off_y, sw, sh) = geometry.source_rect(crop);
    let total = viewport.total_scale();
    if total == 0.0 {
        return Err(Error::MissingSurface);
    }
    Ok(Point {
        x: (point.x - geometry.canvas_width / 2.0 - viewport.offset_x) / total + off_x + sw / 2.0,
        y: (point.y - geometry.canvas_height / 2.0 - viewport.offset_y) / total + off_y + sh / 2.0,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    fn round_trip(zoom: f32, crop: Option<CropArea>) {
        let geometry = SurfaceGeometry::new(800.0, 600.0, 400.0, 300.0);
        let mut viewport = Viewport {
            zoom,
            offset_x: 13.5,
            offset_y: -27.25,
            scale: fit_scale(&geometry, crop.as_ref()).unwrap(),
        };
        viewport.set_zoom(zoom);

        for &(x, y) in &[(0.0, 0.0), (199.5, 150.25), (399.0, 299.0), (57.0, 3.0)] {
            let p = Point::new(x, y);
            let c = image_to_canvas(p, &viewport, crop.as_ref(), &geometry).unwrap();
            let back = canvas_to_image(c, &viewport, crop.as_ref(), &geometry).unwrap();
            assert!(
                (back.x - p.x).abs() < EPS && (back.y - p.y).abs() < EPS,
                "round trip failed at ({}, {}) zoom {}: got ({}, {})",
                x,
                y,
                zoom,
                back.x,
                back.y
            );
        }
    }

    #[test]
    fn round_trip_across_viewports() {
        for &zoom in &[0.1, 1.0, 5.0] {
            round_trip(zoom, None);
            round_trip(
                zoom,
                Some(CropArea {
                    x: 50.0,
                    y: 50.0,
                    width: 100.0,
                    height: 100.0,
                }),
            );
        }
    }

    #[test]
    fn center_of_source_maps_to_canvas_center_plus_pan() {
        let geometry = SurfaceGeometry::new(640.0, 480.0, 320.0, 240.0);
        let viewport = Viewport {
            zoom: 2.0,
            offset_x: 10.0,
            offset_y: 20.0,
            scale: 1.5,
        };
        let c = image_to_canvas(Point::new(160.0, 120.0), &viewport, None, &geometry).unwrap();
        assert!((c.x - 330.0).abs() < EPS);
        assert!((c.y - 260.0).abs() < EPS);
    }

    #[test]
    fn crop_origin_maps_like_source_origin() {
        let geometry = SurfaceGeometry::new(200.0, 200.0, 400.0, 400.0);
        let crop = CropArea {
            x: 50.0,
            y: 50.0,
            width: 100.0,
            height: 100.0,
        };
        let viewport = Viewport {
            zoom: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            scale: fit_scale(&geometry, Some(&crop)).unwrap(),
        };
        // The crop center (100, 100) must land on the canvas center.
        let c = image_to_canvas(Point::new(100.0, 100.0), &viewport, Some(&crop), &geometry)
            .unwrap();
        assert!((c.x - 100.0).abs() < EPS);
        assert!((c.y - 100.0).abs() < EPS);
    }

    #[test]
    fn zero_sized_surface_is_rejected() {
        let geometry = SurfaceGeometry::new(0.0, 600.0, 400.0, 300.0);
        let viewport = Viewport::default();
        assert_eq!(
            image_to_canvas(Point::new(1.0, 1.0), &viewport, None, &geometry),
            Err(Error::MissingSurface)
        );
        assert_eq!(
            canvas_to_image(Point::new(1.0, 1.0), &viewport, None, &geometry),
            Err(Error::MissingSurface)
        );
    }

    #[test]
    fn fit_scale_uses_limiting_axis() {
        let geometry = SurfaceGeometry::new(800.0, 600.0, 400.0, 300.0);
        assert!((fit_scale(&geometry, None).unwrap() - 2.0).abs() < EPS);
        let tall = SurfaceGeometry::new(800.0, 300.0, 400.0, 300.0);
        assert!((fit_scale(&tall, None).unwrap() - 1.0).abs() < EPS);
    }
}
