// ============================================================================
// GPU SHADERS — all WGSL code kept inline for containment
// ============================================================================
//
// Every numeric constant below is shared with the CPU operators in
// `crate::ops` (contrast pivot, luma weights, vignette strength, grain hash).
// A change on either side must be mirrored or preview and export drift.

// ============================================================================
// TONAL SHADER — stages 1–10 of the adjustment chain in one fragment pass
// ============================================================================
//
// Samples the source texture through a crop-aware UV window (origin + scale),
// so rendering a cropped preview never needs a separate extraction pass.
pub const TONAL_SHADER: &str = r#"
struct TonalUniforms {
    uv_origin: vec2<f32>,     // crop window origin in source UV space
    uv_scale: vec2<f32>,      // crop window extent in source UV space
    out_size: vec2<f32>,      // output target dimensions in pixels
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
};

@group(0) @binding(0) var<uniform> u: TonalUniforms;
@group(0) @binding(1) var src_tex: texture_2d<f32>;
@group(0) @binding(2) var src_samp: sampler;

const CONTRAST_PIVOT: f32 = 0.5019608; // 128/255
const LUMA: vec3<f32> = vec3<f32>(0.2126, 0.7152, 0.0722);
const VIGNETTE_STRENGTH: f32 = 1.5;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    let p = positions[vi];
    var out: VertexOutput;
    out.position = vec4<f32>(p, 0.0, 1.0);
    // Top-left origin UV to match image memory order.
    out.uv = vec2<f32>(p.x * 0.5 + 0.5, 0.5 - p.y * 0.5);
    return out;
}

fn rgb_to_hsl(c: vec3<f32>) -> vec3<f32> {
    let max_c = max(c.r, max(c.g, c.b));
    let min_c = min(c.r, min(c.g, c.b));
    let l = (max_c + min_c) * 0.5;
    let d = max_c - min_c;
    if (d <= 1e-6) {
        return vec3<f32>(0.0, 0.0, l);
    }
    var h: f32;
    if (max_c == c.r) {
        h = (c.g - c.b) / d;
        if (h < 0.0) { h = h + 6.0; }
    } else if (max_c == c.g) {
        h = (c.b - c.r) / d + 2.0;
    } else {
        h = (c.r - c.g) / d + 4.0;
    }
    h = h / 6.0;
    let s = d / max(1.0 - abs(2.0 * l - 1.0), 1e-6);
    return vec3<f32>(h, clamp(s, 0.0, 1.0), l);
}

fn hue_to_rgb(p: f32, q: f32, t_in: f32) -> f32 {
    let t = fract(t_in);
    if (t < 1.0 / 6.0) { return p + (q - p) * 6.0 * t; }
    if (t < 0.5) { return q; }
    if (t < 2.0 / 3.0) { return p + (q - p) * (2.0 / 3.0 - t) * 6.0; }
    return p;
}

fn hsl_to_rgb(hsl: vec3<f32>) -> vec3<f32> {
    if (hsl.y <= 1e-6) {
        return vec3<f32>(hsl.z);
    }
    var q: f32;
    if (hsl.z < 0.5) {
        q = hsl.z * (1.0 + hsl.y);
    } else {
        q = hsl.z + hsl.y - hsl.z * hsl.y;
    }
    let p = 2.0 * hsl.z - q;
    return vec3<f32>(
        hue_to_rgb(p, q, hsl.x + 1.0 / 3.0),
        hue_to_rgb(p, q, hsl.x),
        hue_to_rgb(p, q, hsl.x - 1.0 / 3.0),
    );
}

fn adjust(color: vec3<f32>, dist2: f32) -> vec3<f32> {
    // 1. Brightness
    var c = color * u.brightness_mul;
    // 2. Contrast about the 8-bit midpoint
    c = (c - vec3<f32>(CONTRAST_PIVOT)) * u.contrast_mul + vec3<f32>(CONTRAST_PIVOT);
    // 3. Exposure
    c = c * u.exposure_mul;
    // 4. Shadows / highlights
    if (u.shadows != 0.0 || u.highlights != 0.0) {
        let luma = dot(c, LUMA);
        let shadow_mask = (1.0 - luma) * (1.0 - luma);
        let highlight_mask = luma * luma;
        c = c - c * u.shadows * shadow_mask * 0.5;
        c = c + c * u.highlights * highlight_mask * 0.5;
    }
    // 5. Saturation via HSL (the only mid-chain clamp)
    if (u.saturation != 0.0) {
        let hsl = rgb_to_hsl(clamp(c, vec3<f32>(0.0), vec3<f32>(1.0)));
        let s = clamp(hsl.y * (1.0 + u.saturation), 0.0, 1.0);
        c = hsl_to_rgb(vec3<f32>(hsl.x, s, hsl.z));
    }
    // 6. Temperature
    c.r = c.r + u.temperature;
    c.b = c.b - u.temperature;
    // 7. Sepia matrix blend
    if (u.sepia > 0.0) {
        let sep = vec3<f32>(
            dot(c, vec3<f32>(0.393, 0.769, 0.189)),
            dot(c, vec3<f32>(0.349, 0.686, 0.168)),
            dot(c, vec3<f32>(0.272, 0.534, 0.131)),
        );
        c = c + (sep - c) * u.sepia;
    }
    // 8. Grayscale blend toward luma
    if (u.grayscale > 0.0) {
        let luma = dot(c, LUMA);
        c = c + (vec3<f32>(luma) - c) * u.grayscale;
    }
    // 9. Vignette
    if (u.vignette != 0.0) {
        c = c * (1.0 + u.vignette * dist2 * VIGNETTE_STRENGTH);
    }
    // 10. Single deferred clamp
    return clamp(c, vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let src_uv = u.uv_origin + in.uv * u.uv_scale;
    let color = textureSample(src_tex, src_samp, src_uv);

    // Normalized squared distance from center: 0 center, 1 corners.
    let half_size = u.out_size * 0.5;
    let n = (in.position.xy - half_size) / half_size;
    let dist2 = (n.x * n.x + n.y * n.y) / 2.0;

    return vec4<f32>(adjust(color.rgb, dist2), color.a);
}
"#;

// ============================================================================
// BLUR SHADER — one box pass along a single axis
// ============================================================================
//
// The renderer issues three horizontal+vertical pass pairs, matching the CPU
// triple-box approximation.  Integer texel loads with manual clamp-to-edge
// keep the window math identical to the sliding-window CPU sweep.
pub const BLUR_SHADER: &str = r#"
struct BlurUniforms {
    dir_x: i32,
    dir_y: i32,
    box_radius: i32,
    _pad: i32,
};

@group(0) @binding(0) var<uniform> u: BlurUniforms;
@group(0) @binding(1) var src_tex: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    var out: VertexOutput;
    out.position = vec4<f32>(positions[vi], 0.0, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let size = vec2<i32>(textureDimensions(src_tex));
    let p = vec2<i32>(in.position.xy);
    let dir = vec2<i32>(u.dir_x, u.dir_y);

    var sum = vec4<f32>(0.0);
    for (var i = -u.box_radius; i <= u.box_radius; i = i + 1) {
        let q = clamp(p + dir * i, vec2<i32>(0), size - vec2<i32>(1));
        sum = sum + textureLoad(src_tex, q, 0);
    }
    return sum / f32(2 * u.box_radius + 1);
}
"#;

// ============================================================================
// REGION COMPOSITE SHADER — select blurred pixels inside a rect
// ============================================================================
pub const REGION_COMPOSITE_SHADER: &str = r#"
struct RegionUniforms {
    rect_min: vec2<f32>,   // target pixels, inclusive
    rect_max: vec2<f32>,   // target pixels, exclusive
};

@group(0) @binding(0) var<uniform> u: RegionUniforms;
@group(0) @binding(1) var acc_tex: texture_2d<f32>;
@group(0) @binding(2) var blurred_tex: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    var out: VertexOutput;
    out.position = vec4<f32>(positions[vi], 0.0, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let p = in.position.xy;
    let pixel = vec2<i32>(p);
    let inside = p.x >= u.rect_min.x && p.x < u.rect_max.x
        && p.y >= u.rect_min.y && p.y < u.rect_max.y;
    let acc = textureLoad(acc_tex, pixel, 0);
    let blurred = textureLoad(blurred_tex, pixel, 0);
    return select(acc, blurred, inside);
}
"#;

// ============================================================================
// GRAIN SHADER — deterministic hash-noise pass (amount 0 is a pure copy)
// ============================================================================
pub const GRAIN_SHADER: &str = r#"
struct GrainUniforms {
    origin: vec2<f32>,
    amount: f32,
    inv_scale: f32,
};

@group(0) @binding(0) var<uniform> u: GrainUniforms;
@group(0) @binding(1) var src_tex: texture_2d<f32>;

const LUMA: vec3<f32> = vec3<f32>(0.2126, 0.7152, 0.0722);

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    var out: VertexOutput;
    out.position = vec4<f32>(positions[vi], 0.0, 1.0);
    return out;
}

fn hash2d(x: f32, y: f32) -> f32 {
    return fract(sin(x * 127.1 + y * 311.7) * 43758.5453);
}

fn octave_noise(x: f32, y: f32) -> f32 {
    let fine = hash2d(floor(x / 2.5), floor(y / 2.5));
    let medium = hash2d(floor(x / 5.5) + 17.0, floor(y / 5.5) + 59.0);
    let coarse = hash2d(floor(x / 9.0) + 43.0, floor(y / 9.0) + 127.0);
    return 0.5 * fine + 0.3 * medium + 0.2 * coarse - 0.5;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(in.position.xy);
    var color = textureLoad(src_tex, pixel, 0);
    if (u.amount <= 0.0) {
        return color;
    }
    let luma = dot(color.rgb, LUMA);
    let mask = sqrt(max(1.0 - abs(luma - 0.5) * 2.0, 0.0));
    // Source-image coordinates, matching the CPU hash domain: the noise
    // pattern sticks to image pixels across crop and render scale.
    let x = (in.position.x - 0.5) * u.inv_scale + u.origin.x;
    let y = (in.position.y - 0.5) * u.inv_scale + u.origin.y;
    let noise = octave_noise(x, y) * mask * u.amount * 0.5;
    let rgb = clamp(color.rgb + vec3<f32>(noise), vec3<f32>(0.0), vec3<f32>(1.0));
    return vec4<f32>(rgb, color.a);
}
"#;
