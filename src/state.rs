// ============================================================================
// EDIT STATE — plain serializable parameter structs consumed by the pipeline
// ============================================================================
//
// The rendering core is a pure function of these values plus the source
// pixels.  All structs are owned by the host editing session; the core never
// keeps references into them between frames.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// VIEWPORT
// ============================================================================

/// User-controlled zoom/pan state mapping image space to canvas space.
///
/// `scale` is the fit-to-canvas factor computed once per image/crop load;
/// `zoom` is the user multiplier on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale: f32,
}

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 5.0;

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
        }
    }
}

impl Viewport {
    /// Combined image→canvas scale factor.
    pub fn total_scale(&self) -> f32 {
        self.scale * self.zoom
    }

    /// Set the zoom level, clamped to the supported range.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Viewport used for export: unity zoom, no pan, natural resolution.
    pub fn for_export() -> Self {
        Self {
            zoom: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
        }
    }
}

// ============================================================================
// CROP / TRANSFORM
// ============================================================================

/// Crop rectangle in source-image pixel coordinates.  `None` means full image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropArea {
    pub fn is_valid(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Orthogonal rotation applied on export / draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    pub fn from_degrees(deg: u32) -> Self {
        match deg % 360 {
            90 => Rotation::Cw90,
            180 => Rotation::Cw180,
            270 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    /// 90°/270° swap the output width/height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    pub rotation: Rotation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub scale: f32,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            rotation: Rotation::None,
            flip_horizontal: false,
            flip_vertical: false,
            scale: 1.0,
        }
    }
}

impl TransformState {
    pub fn is_identity(&self) -> bool {
        self.rotation == Rotation::None
            && !self.flip_horizontal
            && !self.flip_vertical
            && (self.scale - 1.0).abs() < f32::EPSILON
    }
}

// ============================================================================
// TONAL ADJUSTMENTS
// ============================================================================

/// The 12 independent tonal sliders.  All default to 0 (identity).
///
/// Ranges: exposure/contrast/highlights/shadows/brightness/saturation/
/// temperature/vignette in [-100, 100]; sepia/grayscale/blur/grain in
/// [0, 100].  Each is applied independently in the fixed order documented
/// on `ops::adjustments::apply_adjustments`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentsState {
    pub exposure: f32,
    pub contrast: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub brightness: f32,
    pub saturation: f32,
    pub temperature: f32,
    pub vignette: f32,
    pub sepia: f32,
    pub grayscale: f32,
    pub blur: f32,
    pub grain: f32,
}

impl AdjustmentsState {
    /// True when every slider is at its default — the whole tonal stage is
    /// skipped in that case (O(1) early return).
    pub fn is_identity(&self) -> bool {
        self.exposure == 0.0
            && self.contrast == 0.0
            && self.highlights == 0.0
            && self.shadows == 0.0
            && self.brightness == 0.0
            && self.saturation == 0.0
            && self.temperature == 0.0
            && self.vignette == 0.0
            && self.sepia == 0.0
            && self.grayscale == 0.0
            && self.blur == 0.0
            && self.grain == 0.0
    }

    /// Clamp every slider to its documented range.
    pub fn clamped(mut self) -> Self {
        let bi = |v: f32| v.clamp(-100.0, 100.0);
        let uni = |v: f32| v.clamp(0.0, 100.0);
        self.exposure = bi(self.exposure);
        self.contrast = bi(self.contrast);
        self.highlights = bi(self.highlights);
        self.shadows = bi(self.shadows);
        self.brightness = bi(self.brightness);
        self.saturation = bi(self.saturation);
        self.temperature = bi(self.temperature);
        self.vignette = bi(self.vignette);
        self.sepia = uni(self.sepia);
        self.grayscale = uni(self.grayscale);
        self.blur = uni(self.blur);
        self.grain = uni(self.grain);
        self
    }

    // ---- Filter presets: just named parameter bundles ----

    pub fn preset_warm() -> Self {
        Self {
            temperature: 35.0,
            saturation: 10.0,
            brightness: 5.0,
            ..Self::default()
        }
    }

    pub fn preset_cool() -> Self {
        Self {
            temperature: -35.0,
            contrast: 8.0,
            ..Self::default()
        }
    }

    pub fn preset_mono() -> Self {
        Self {
            grayscale: 100.0,
            contrast: 15.0,
            ..Self::default()
        }
    }

    pub fn preset_fade() -> Self {
        Self {
            contrast: -25.0,
            brightness: 10.0,
            saturation: -20.0,
            ..Self::default()
        }
    }

    pub fn preset_film() -> Self {
        Self {
            contrast: 12.0,
            grain: 35.0,
            vignette: 20.0,
            saturation: -8.0,
            ..Self::default()
        }
    }
}

// ============================================================================
// REGIONAL EFFECTS AND OVERLAYS
// ============================================================================

/// A rectangular blur region in image space.  Areas composite in array
/// order: later-created areas blend over earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlurArea {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// 0–100; mapped to a pixel radius by the pipeline.
    pub blur_strength: f32,
}

impl BlurArea {
    pub fn new(x: f32, y: f32, width: f32, height: f32, blur_strength: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            x,
            y,
            width,
            height,
            blur_strength: blur_strength.clamp(0.0, 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StampKind {
    Emoji,
    Image,
    Svg,
}

/// A decorative stamp.  `x`/`y` is the center in image space; the aspect
/// ratio is fixed at creation from the source asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampArea {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Degrees, clockwise.
    pub rotation: f32,
    pub asset_id: String,
    pub kind: StampKind,
    /// Emoji codepoint string, or an image/SVG location to fetch-and-cache.
    pub content: String,
}

// ============================================================================
// ANNOTATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Pen,
    Brush,
    Arrow,
    Rectangle,
}

/// One sample of an annotation path.  `width` is brush-only
/// (velocity-derived, per point).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, width: None }
    }

    pub fn with_width(x: f32, y: f32, width: f32) -> Self {
        Self {
            x,
            y,
            width: Some(width),
        }
    }
}

/// A freehand or shape annotation in image space.
///
/// Pen/brush accumulate `points` during a drag; arrow/rectangle carry
/// exactly two points (start, end).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    pub kind: AnnotationKind,
    /// RGBA, 0–255 per channel.
    pub color: [u8; 4],
    pub stroke_width: f32,
    pub points: Vec<StrokePoint>,
    pub shadow: bool,
}

impl Annotation {
    pub fn new(kind: AnnotationKind, color: [u8; 4], stroke_width: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            color,
            stroke_width,
            points: Vec::new(),
            shadow: false,
        }
    }
}

// ============================================================================
// AGGREGATE STATE + HISTORY SNAPSHOT
// ============================================================================

/// Everything the pipeline needs besides the source pixels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditState {
    pub crop_area: Option<CropArea>,
    pub transform: TransformState,
    pub adjustments: AdjustmentsState,
    pub viewport: Viewport,
    pub blur_areas: Vec<BlurArea>,
    pub stamp_areas: Vec<StampArea>,
    pub annotations: Vec<Annotation>,
}

impl EditState {
    /// Called on new image load: crop is cleared, viewport reset.
    pub fn reset_for_new_image(&mut self) {
        self.crop_area = None;
        self.viewport = Viewport::default();
    }

    /// Immutable deep copy for external undo management.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            state: self.clone(),
        }
    }

    /// Restore from a snapshot.
    pub fn restore(&mut self, snapshot: &HistorySnapshot) {
        *self = snapshot.state.clone();
    }
}

/// Opaque value object produced/consumed for undo.  The core never inspects
/// it beyond restoring; history stack management is the host's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    state: EditState,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_adjustments_are_identity() {
        assert!(AdjustmentsState::default().is_identity());
        let mut adj = AdjustmentsState::default();
        adj.sepia = 1.0;
        assert!(!adj.is_identity());
    }

    #[test]
    fn clamp_respects_slider_ranges() {
        let adj = AdjustmentsState {
            exposure: 250.0,
            shadows: -300.0,
            sepia: -5.0,
            blur: 170.0,
            ..Default::default()
        }
        .clamped();
        assert_eq!(adj.exposure, 100.0);
        assert_eq!(adj.shadows, -100.0);
        assert_eq!(adj.sepia, 0.0);
        assert_eq!(adj.blur, 100.0);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut vp = Viewport::default();
        vp.set_zoom(0.01);
        assert_eq!(vp.zoom, MIN_ZOOM);
        vp.set_zoom(50.0);
        assert_eq!(vp.zoom, MAX_ZOOM);
    }

    #[test]
    fn rotation_axis_swap() {
        assert!(Rotation::Cw90.swaps_axes());
        assert!(Rotation::Cw270.swaps_axes());
        assert!(!Rotation::Cw180.swaps_axes());
        assert!(!Rotation::None.swaps_axes());
    }

    #[test]
    fn snapshot_round_trip() {
        let mut state = EditState::default();
        state.adjustments.contrast = 40.0;
        state.blur_areas.push(BlurArea::new(10.0, 10.0, 50.0, 50.0, 80.0));
        let snap = state.snapshot();

        state.adjustments.contrast = 0.0;
        state.blur_areas.clear();
        state.restore(&snap);

        assert_eq!(state.adjustments.contrast, 40.0);
        assert_eq!(state.blur_areas.len(), 1);
    }

    #[test]
    fn edit_state_json_round_trip() {
        let mut state = EditState::default();
        state.adjustments = AdjustmentsState::preset_film();
        state.crop_area = Some(CropArea {
            x: 50.0,
            y: 50.0,
            width: 100.0,
            height: 100.0,
        });
        let json = serde_json::to_string(&state).unwrap();
        let back: EditState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
