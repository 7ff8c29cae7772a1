// ============================================================================
// BRUSH STROKE MODEL — speed-adaptive calligraphic stroke builder
// ============================================================================
//
// Consumes a raw pointer-drag sample stream `(x, y, timestamp_ms)` and
// produces a brush annotation whose per-point width is derived from pointer
// velocity: slow deliberate motion gives a wide wet line, fast motion a thin
// one.  Stroke endings are classified by exit velocity into the calligraphic
// ending styles tome (とめ, deliberate stop — width retained) and hane
// (はね, flicking release — sharp taper), with a medium taper in between.
//
// Speeds are in pixels per millisecond throughout; timestamps come from the
// host, so the model is a pure function of its input stream.

use crate::state::{Annotation, AnnotationKind, StrokePoint};

// ---- Width model ----
const ENTRY_WIDTH_FACTOR: f32 = 0.15;
const MIN_WIDTH_FACTOR: f32 = 0.2;
const MAX_WIDTH_FACTOR: f32 = 2.5;
const SPEED_DECAY: f32 = 2.5;

// ---- Sample filtering / smoothing ----
const BASE_MIN_DISTANCE: f32 = 2.0;
const ENTRY_BLEND_MS: f64 = 150.0;

// ---- Exit taper classification ----
const SPEED_WINDOW: usize = 10;
const TOME_SPEED: f32 = 0.25;
const HANE_SPEED: f32 = 0.5;
const TOME_REDUCTION: f32 = 0.2;
const TOME_TAIL: f32 = 0.15;
const HANE_REDUCTION: f32 = 0.9;
const HANE_TAIL: f32 = 0.4;
const HANE_EASE_POWER: f32 = 1.5;
const MEDIUM_REDUCTION: f32 = 0.6;
const MEDIUM_TAIL: f32 = 0.3;

/// How a stroke ended, by exit velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeEnding {
    /// Slow stop: the width is essentially retained.
    Tome,
    /// Fast flick: steep taper to a point.
    Hane,
    Medium,
}

/// Accumulates one drag gesture into a brush annotation.
///
/// Created on drag-start (`begin`), fed samples while drawing, consumed by
/// `finish` on drag-end.  The Idle → Drawing → Idle lifecycle is the
/// builder's own lifetime.
pub struct BrushStrokeBuilder {
    stroke_width: f32,
    color: [u8; 4],
    shadow: bool,
    points: Vec<StrokePoint>,
    /// Speed recorded alongside each committed point (index 0 = entry, 0.0).
    speeds: Vec<f32>,
    start_time: f64,
    last_time: f64,
}

impl BrushStrokeBuilder {
    /// Start a stroke at the drag-start position.  The entry point is thin:
    /// a brush touches down lightly before pressure builds.
    pub fn begin(x: f32, y: f32, time_ms: f64, stroke_width: f32, color: [u8; 4]) -> Self {
        let entry_width = stroke_width * ENTRY_WIDTH_FACTOR;
        Self {
            stroke_width,
            color,
            shadow: false,
            points: vec![StrokePoint::with_width(x, y, entry_width)],
            speeds: vec![0.0],
            start_time: time_ms,
            last_time: time_ms,
        }
    }

    pub fn with_shadow(mut self, shadow: bool) -> Self {
        self.shadow = shadow;
        self
    }

    /// Feed one pointer sample.  Returns `true` if the sample was committed
    /// as a new point, `false` if it was rejected by the jitter filter.
    pub fn add_sample(&mut self, x: f32, y: f32, time_ms: f64) -> bool {
        let prev = *self.points.last().expect("stroke has at least the entry point");
        let dx = x - prev.x;
        let dy = y - prev.y;
        let distance = (dx * dx + dy * dy).sqrt();
        let dt = (time_ms - self.last_time).max(1.0) as f32;
        let speed = distance / dt;

        // Jitter suppression: slower motion must travel further before a new
        // point commits, otherwise hand tremor turns into zigzag.
        let slow_factor = (1.0 - speed * 2.0).max(0.0);
        let min_distance = BASE_MIN_DISTANCE * (1.0 + slow_factor * 2.0);
        if distance < min_distance {
            return false;
        }

        // Width from speed: exponential decay, wide when slow.
        let min_width = self.stroke_width * MIN_WIDTH_FACTOR;
        let max_width = self.stroke_width * MAX_WIDTH_FACTOR;
        let mut target_width = min_width + (max_width - min_width) * (-speed * SPEED_DECAY).exp();

        // Entry blending: ease up from the thin entry width over the first
        // 150 ms (cubic ease-out).
        let elapsed = time_ms - self.start_time;
        if elapsed < ENTRY_BLEND_MS {
            let u = (elapsed / ENTRY_BLEND_MS) as f32;
            let ease = 1.0 - (1.0 - u).powi(3);
            let entry_width = self.stroke_width * ENTRY_WIDTH_FACTOR;
            target_width = entry_width + (target_width - entry_width) * ease;
        }

        // Smooth against the previous committed width; slow motion gets
        // heavier smoothing.
        let prev_width = prev.width.unwrap_or(target_width);
        let k = 0.3 + slow_factor * 0.4;
        let width = prev_width * (1.0 - k) + target_width * k;

        self.points.push(StrokePoint::with_width(x, y, width));
        self.speeds.push(speed);
        self.last_time = time_ms;
        true
    }

    /// Average speed over the last few committed samples — the exit velocity.
    fn exit_speed(&self) -> f32 {
        let n = self.speeds.len();
        if n <= 1 {
            return 0.0;
        }
        let window = &self.speeds[n.saturating_sub(SPEED_WINDOW)..];
        window.iter().sum::<f32>() / window.len() as f32
    }

    /// Classify the ending from the exit velocity.
    pub fn classify_ending(&self) -> StrokeEnding {
        let speed = self.exit_speed();
        if speed < TOME_SPEED {
            StrokeEnding::Tome
        } else if speed > HANE_SPEED {
            StrokeEnding::Hane
        } else {
            StrokeEnding::Medium
        }
    }

    /// End the stroke: apply the exit taper and produce the annotation.
    pub fn finish(mut self) -> Annotation {
        let ending = self.classify_ending();
        apply_exit_taper(&mut self.points, ending);

        let mut annotation = Annotation::new(AnnotationKind::Brush, self.color, self.stroke_width);
        annotation.shadow = self.shadow;
        annotation.points = self.points;
        annotation
    }
}

/// Reduce widths over the tail of the stroke according to the ending style.
fn apply_exit_taper(points: &mut [StrokePoint], ending: StrokeEnding) {
    let n = points.len();
    if n < 2 {
        return;
    }
    let (max_reduction, tail_fraction) = match ending {
        StrokeEnding::Tome => (TOME_REDUCTION, TOME_TAIL),
        StrokeEnding::Hane => (HANE_REDUCTION, HANE_TAIL),
        StrokeEnding::Medium => (MEDIUM_REDUCTION, MEDIUM_TAIL),
    };
    let tail_len = ((n as f32 * tail_fraction).ceil() as usize).clamp(1, n - 1);
    let start = n - tail_len;

    for (i, point) in points[start..].iter_mut().enumerate() {
        // Progress runs 0 → 1 across the tail, reaching 1 at the final point.
        let progress = (i + 1) as f32 / tail_len as f32;
        let eased = match ending {
            StrokeEnding::Hane => progress.powf(HANE_EASE_POWER),
            _ => progress,
        };
        if let Some(w) = point.width.as_mut() {
            *w *= 1.0 - max_reduction * eased;
        }
    }
}

// ============================================================================
// OUTLINE GEOMETRY — point+width list → fillable closed polygon
// ============================================================================

/// A 2D point of the outline polygon, image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlinePoint {
    pub x: f32,
    pub y: f32,
}

impl OutlinePoint {
    fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

const NORMAL_WINDOW: usize = 2;
const OFFSET_SMOOTH_WINDOW: usize = 5;
const CAP_SEGMENTS: usize = 8;
const DOT_SEGMENTS: usize = 16;

/// Convert a variable-width point list into a filled outline: a closed
/// polygon tracing the left side forward, a rounded tip cap, the right side
/// backward, and a rounded base cap.  The result is meant for scanline
/// filling, not stroking.
pub fn stroke_outline(points: &[StrokePoint], fallback_width: f32) -> Vec<OutlinePoint> {
    match points.len() {
        0 => Vec::new(),
        1 => dot_outline(points[0], fallback_width),
        2 => teardrop_outline(points[0], points[1], fallback_width),
        _ => body_outline(points, fallback_width),
    }
}

/// Single tap: a small ellipse, slightly taller than wide (a brush tip
/// resting on paper).
fn dot_outline(p: StrokePoint, fallback_width: f32) -> Vec<OutlinePoint> {
    let w = p.width.unwrap_or(fallback_width);
    let rx = (w * 0.5).max(0.5);
    let ry = rx * 1.2;
    (0..DOT_SEGMENTS)
        .map(|i| {
            let a = i as f32 / DOT_SEGMENTS as f32 * std::f32::consts::TAU;
            OutlinePoint::new(p.x + a.cos() * rx, p.y + a.sin() * ry)
        })
        .collect()
}

/// Two points: a teardrop — rounded base around the first point tapering to
/// the second.
fn teardrop_outline(a: StrokePoint, b: StrokePoint, fallback_width: f32) -> Vec<OutlinePoint> {
    let w = a.width.unwrap_or(fallback_width).max(1.0);
    let radius = w * 0.5;
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-3 {
        return dot_outline(a, fallback_width);
    }
    let dir = dy.atan2(dx);

    // Half circle on the back side of the base, then the tip.
    let mut outline = Vec::with_capacity(CAP_SEGMENTS + 3);
    for i in 0..=CAP_SEGMENTS {
        let angle = dir + std::f32::consts::FRAC_PI_2
            + i as f32 / CAP_SEGMENTS as f32 * std::f32::consts::PI;
        outline.push(OutlinePoint::new(
            a.x + angle.cos() * radius,
            a.y + angle.sin() * radius,
        ));
    }
    outline.push(OutlinePoint::new(b.x, b.y));
    outline
}

fn body_outline(points: &[StrokePoint], fallback_width: f32) -> Vec<OutlinePoint> {
    let n = points.len();

    // Per-point unit normals from a windowed central-difference direction
    // estimate — a single-sample difference is far too noisy.
    let mut left = Vec::with_capacity(n);
    let mut right = Vec::with_capacity(n);
    for i in 0..n {
        let lo = i.saturating_sub(NORMAL_WINDOW);
        let hi = (i + NORMAL_WINDOW).min(n - 1);
        let dx = points[hi].x - points[lo].x;
        let dy = points[hi].y - points[lo].y;
        let len = (dx * dx + dy * dy).sqrt().max(1e-3);
        let (nx, ny) = (-dy / len, dx / len);
        let half = points[i].width.unwrap_or(fallback_width) * 0.5;
        left.push(OutlinePoint::new(
            points[i].x + nx * half,
            points[i].y + ny * half,
        ));
        right.push(OutlinePoint::new(
            points[i].x - nx * half,
            points[i].y - ny * half,
        ));
    }

    // Moving-average smoothing of both offset polylines kills the zigzag
    // that survives the normal windowing.
    let left = smooth_polyline(&left, OFFSET_SMOOTH_WINDOW);
    let right = smooth_polyline(&right, OFFSET_SMOOTH_WINDOW);

    let tip = points[n - 1];
    let base = points[0];
    let tip_width = tip.width.unwrap_or(fallback_width);
    let base_width = base.width.unwrap_or(fallback_width);

    let mut outline = Vec::new();
    // Left side forward, quadratic-interpolated for a fluid silhouette.
    append_quadratic(&mut outline, &left);
    // Rounded tip cap, sweeping from the left edge to the right edge.
    append_cap(&mut outline, tip.x, tip.y, &left[n - 1], &right[n - 1], tip_width * 0.5);
    // Right side backward.
    let mut reversed = right.clone();
    reversed.reverse();
    append_quadratic(&mut outline, &reversed);
    // Rounded base cap closes the path.
    append_cap(&mut outline, base.x, base.y, &right[0], &left[0], base_width * 0.5);
    outline
}

/// Moving-average smoothing, preserving both endpoints.
fn smooth_polyline(points: &[OutlinePoint], window: usize) -> Vec<OutlinePoint> {
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
                .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
            OutlinePoint::new(sx / count, sy / count)
        })
        .collect()
}

/// Append a polyline sampled through quadratic curves with each point as the
/// control and segment midpoints as knots (the canvas `quadraticCurveTo`
/// idiom).
fn append_quadratic(out: &mut Vec<OutlinePoint>, pts: &[OutlinePoint]) {
    let n = pts.len();
    if n < 3 {
        out.extend_from_slice(pts);
        return;
    }
    out.push(pts[0]);
    for i in 1..n - 1 {
        let k0 = midpoint(&pts[i - 1], &pts[i]);
        let k1 = midpoint(&pts[i], &pts[i + 1]);
        for &t in &[0.25f32, 0.5, 0.75] {
            out.push(quadratic_at(&k0, &pts[i], &k1, t));
        }
    }
    out.push(pts[n - 1]);
}

fn midpoint(a: &OutlinePoint, b: &OutlinePoint) -> OutlinePoint {
    OutlinePoint::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
}

fn quadratic_at(p0: &OutlinePoint, c: &OutlinePoint, p1: &OutlinePoint, t: f32) -> OutlinePoint {
    let u = 1.0 - t;
    OutlinePoint::new(
        u * u * p0.x + 2.0 * u * t * c.x + t * t * p1.x,
        u * u * p0.y + 2.0 * u * t * c.y + t * t * p1.y,
    )
}

/// Append a rounded cap around `(cx, cy)` sweeping from `from` to `to`.
fn append_cap(
    out: &mut Vec<OutlinePoint>,
    cx: f32,
    cy: f32,
    from: &OutlinePoint,
    to: &OutlinePoint,
    radius: f32,
) {
    let a0 = (from.y - cy).atan2(from.x - cx);
    let mut a1 = (to.y - cy).atan2(to.x - cx);
    // Always take the short way around.
    while a1 - a0 > std::f32::consts::PI {
        a1 -= std::f32::consts::TAU;
    }
    while a0 - a1 > std::f32::consts::PI {
        a1 += std::f32::consts::TAU;
    }
    let r = radius.max(0.25);
    for i in 1..CAP_SEGMENTS {
        let t = i as f32 / CAP_SEGMENTS as f32;
        let a = a0 + (a1 - a0) * t;
        out.push(OutlinePoint::new(cx + a.cos() * r, cy + a.sin() * r));
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive a stroke with constant step distance and interval.
    fn synthetic_stroke(steps: usize, step_px: f32, step_ms: f64, width: f32) -> BrushStrokeBuilder {
        let mut builder = BrushStrokeBuilder::begin(0.0, 0.0, 0.0, width, [0, 0, 0, 255]);
        let mut x = 0.0;
        let mut t = 0.0;
        for _ in 0..steps {
            x += step_px;
            t += step_ms;
            builder.add_sample(x, 0.0, t);
        }
        builder
    }

    #[test]
    fn entry_point_is_thin() {
        let builder = BrushStrokeBuilder::begin(5.0, 5.0, 0.0, 10.0, [0, 0, 0, 255]);
        assert_eq!(builder.points[0].width, Some(10.0 * ENTRY_WIDTH_FACTOR));
    }

    #[test]
    fn slow_jitter_is_rejected() {
        let mut builder = BrushStrokeBuilder::begin(0.0, 0.0, 0.0, 10.0, [0, 0, 0, 255]);
        // Tiny slow movements: speed ≈ 0.0125 px/ms → the adaptive minimum
        // distance grows to ~6 px, which tremor never covers.
        for i in 1..20 {
            assert!(!builder.add_sample(i as f32 * 0.25, 0.0, i as f64 * 20.0));
        }
        assert_eq!(builder.points.len(), 1);
    }

    #[test]
    fn fast_motion_commits_with_small_steps() {
        let mut builder = BrushStrokeBuilder::begin(0.0, 0.0, 0.0, 10.0, [0, 0, 0, 255]);
        // speed = 3 px/ms → slow_factor 0 → min distance = base (2 px).
        assert!(builder.add_sample(3.0, 0.0, 1.0));
    }

    #[test]
    fn slow_stroke_ends_tome_with_width_retained() {
        // 5 px per 25 ms → speed 0.2 < 0.25.
        let builder = synthetic_stroke(30, 5.0, 25.0, 10.0);
        assert_eq!(builder.classify_ending(), StrokeEnding::Tome);

        let pre_taper = builder.points.last().unwrap().width.unwrap();
        let annotation = builder.finish();
        let final_width = annotation.points.last().unwrap().width.unwrap();
        assert!(
            final_width >= pre_taper * 0.8 - 1e-4,
            "tome keeps ≥80% of the exit width: {} vs {}",
            final_width,
            pre_taper
        );
    }

    #[test]
    fn fast_stroke_ends_hane_with_sharp_taper() {
        // 20 px per 10 ms → speed 2.0 > 0.5.
        let builder = synthetic_stroke(30, 20.0, 10.0, 10.0);
        assert_eq!(builder.classify_ending(), StrokeEnding::Hane);

        let pre_taper = builder.points.last().unwrap().width.unwrap();
        let annotation = builder.finish();
        let final_width = annotation.points.last().unwrap().width.unwrap();
        assert!(
            final_width <= pre_taper * 0.1 + 1e-4,
            "hane cuts ≥90% of the exit width: {} vs {}",
            final_width,
            pre_taper
        );
    }

    #[test]
    fn medium_stroke_gets_linear_taper() {
        // 6 px per 15 ms → speed 0.4, between the thresholds.
        let builder = synthetic_stroke(30, 6.0, 15.0, 10.0);
        assert_eq!(builder.classify_ending(), StrokeEnding::Medium);

        let pre_taper = builder.points.last().unwrap().width.unwrap();
        let annotation = builder.finish();
        let final_width = annotation.points.last().unwrap().width.unwrap();
        let ratio = final_width / pre_taper;
        assert!(
            (ratio - 0.4).abs() < 0.05,
            "medium ends near 60% reduction, got ratio {}",
            ratio
        );
    }

    #[test]
    fn widths_stay_inside_the_model_bounds() {
        let builder = synthetic_stroke(50, 8.0, 16.0, 10.0);
        for p in &builder.points {
            let w = p.width.unwrap();
            assert!(w > 0.0 && w <= 10.0 * MAX_WIDTH_FACTOR, "width {}", w);
        }
    }

    #[test]
    fn slow_motion_widens_the_line() {
        let slow = synthetic_stroke(30, 5.0, 25.0, 10.0); // 0.2 px/ms
        let fast = synthetic_stroke(30, 20.0, 10.0, 10.0); // 2.0 px/ms
        let w_slow = slow.points[20].width.unwrap();
        let w_fast = fast.points[20].width.unwrap();
        assert!(
            w_slow > w_fast * 2.0,
            "slow {} should be much wider than fast {}",
            w_slow,
            w_fast
        );
    }

    #[test]
    fn outline_degenerate_shapes() {
        assert!(stroke_outline(&[], 8.0).is_empty());

        let dot = stroke_outline(&[StrokePoint::with_width(10.0, 10.0, 6.0)], 8.0);
        assert_eq!(dot.len(), DOT_SEGMENTS);

        let drop = stroke_outline(
            &[
                StrokePoint::with_width(0.0, 0.0, 6.0),
                StrokePoint::with_width(20.0, 0.0, 2.0),
            ],
            8.0,
        );
        // Base arc plus the tip point.
        assert!(drop.len() >= CAP_SEGMENTS + 2);
        assert!(drop.iter().any(|p| (p.x - 20.0).abs() < 1e-3));
    }

    #[test]
    fn outline_encloses_the_spine() {
        let builder = synthetic_stroke(20, 8.0, 16.0, 10.0);
        let outline = stroke_outline(&builder.points, 10.0);
        assert!(outline.len() > builder.points.len() * 2);
        // Points appear both above and below the horizontal spine.
        assert!(outline.iter().any(|p| p.y > 0.5));
        assert!(outline.iter().any(|p| p.y < -0.5));
    }
}
