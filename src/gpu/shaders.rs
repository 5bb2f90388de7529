// ============================================================================
// GPU SHADERS - WGSL kept inline
// ============================================================================

// ============================================================================
// STROKE SHADER - brush preview / commit
// ============================================================================
//
// Bindings:
//   0: base texture (last committed pixels, read with textureLoad)
//   1: display storage texture (written)
//   2: StrokeParams uniform (mirrors `preview::StrokeParams`)
//
// `cs_stroke` runs once per pixel: copies base → display and paints pixels
// covered by a circle/square brush. `cs_line` runs as a single invocation
// after it for 1px brushes and walks the clipped Bresenham span prepared by
// `brush::LineSpan`, so it never runs longer than the clip is wide.
//
// The coverage math must stay identical to `brush.rs` (same operation order,
// no sqrt) so the preview never differs from the CPU buffer.
pub const STROKE_SHADER: &str = r#"
struct StrokeParams {
    prev_center: vec2<f32>,
    curr_center: vec2<f32>,
    square_offset: vec2<f32>,
    radius: f32,
    radius_sq: f32,
    color: u32,           // packed little-endian RGBA8
    mode: u32,            // 0=line, 1=circle, 2=square
    width: u32,
    height: u32,
    line_x: i32,
    line_y: i32,
    line_err: i32,
    line_points: u32,
    line_dx: i32,
    line_dy: i32,
    line_sx: i32,
    line_sy: i32,
    box_min_x: u32,
    box_min_y: u32,
    box_max_x: u32,
    box_max_y: u32,
    clip_min_x: u32,
    clip_min_y: u32,
    clip_max_x: u32,
    clip_max_y: u32,
};

@group(0) @binding(0) var base_tex: texture_2d<f32>;
@group(0) @binding(1) var display_tex: texture_storage_2d<rgba8unorm, write>;
@group(0) @binding(2) var<uniform> params: StrokeParams;

fn unpack_rgba(bits: u32) -> vec4<f32> {
    let r = f32(bits & 0xFFu) / 255.0;
    let g = f32((bits >> 8u) & 0xFFu) / 255.0;
    let b = f32((bits >> 16u) & 0xFFu) / 255.0;
    let a = f32((bits >> 24u) & 0xFFu) / 255.0;
    return vec4<f32>(r, g, b, a);
}

fn dot2(a: vec2<f32>, b: vec2<f32>) -> f32 {
    return a.x * b.x + a.y * b.y;
}

fn distance_sq(a: vec2<f32>, b: vec2<f32>) -> f32 {
    let d = a - b;
    return dot2(d, d);
}

fn distance_sq_to_segment(p: vec2<f32>, v: vec2<f32>, w: vec2<f32>) -> f32 {
    let l2 = distance_sq(v, w);
    if (l2 == 0.0) {
        return distance_sq(p, v);
    }
    let vw = w - v;
    let t = clamp(dot2(p - v, vw) / l2, 0.0, 1.0);
    return distance_sq(p, vec2<f32>(v.x + t * vw.x, v.y + t * vw.y));
}

fn closest_point_on_line(pt: vec2<f32>, a: vec2<f32>, b: vec2<f32>) -> vec2<f32> {
    let d = b - a;
    let len_sq = dot2(d, d);
    if (len_sq > 0.0) {
        let s = dot2(pt - a, d) / len_sq;
        return vec2<f32>(a.x + d.x * s, a.y + d.y * s);
    }
    return a;
}

fn square_covers(p: vec2<f32>) -> bool {
    let prev = params.prev_center;
    let curr = params.curr_center;
    let off = params.square_offset;
    let r = params.radius;

    let on1 = closest_point_on_line(p, prev - off, curr - off);
    let on2 = closest_point_on_line(p, prev + off, curr + off);
    let between = (p.y > on1.y && p.y < on2.y) || (p.x > on1.x && p.x < on2.x);
    if (!between) {
        return false;
    }

    let lo = min(prev, curr) - vec2<f32>(r, r);
    let hi = max(prev, curr) + vec2<f32>(r, r);
    return p.x > lo.x && p.x < hi.x && p.y > lo.y && p.y < hi.y;
}

fn in_clip(x: i32, y: i32) -> bool {
    return x >= i32(params.clip_min_x) && y >= i32(params.clip_min_y)
        && x < i32(params.clip_max_x) && y < i32(params.clip_max_y);
}

fn covers(x: u32, y: u32) -> bool {
    if (x < params.box_min_x || y < params.box_min_y || x >= params.box_max_x || y >= params.box_max_y) {
        return false;
    }
    let p = vec2<f32>(f32(x) + 0.5, f32(y) + 0.5);
    if (params.mode == 1u) {
        return distance_sq_to_segment(p, params.curr_center, params.prev_center) < params.radius_sq;
    }
    if (params.mode == 2u) {
        return square_covers(p);
    }
    return false;
}

@compute @workgroup_size(16, 16)
fn cs_stroke(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.width || gid.y >= params.height) {
        return;
    }
    let coord = vec2<i32>(i32(gid.x), i32(gid.y));
    var color = textureLoad(base_tex, coord, 0);
    if (covers(gid.x, gid.y)) {
        color = unpack_rgba(params.color);
    }
    textureStore(display_tex, coord, color);
}

@compute @workgroup_size(1)
fn cs_line() {
    if (params.mode != 0u) {
        return;
    }
    let color = unpack_rgba(params.color);
    var x = params.line_x;
    var y = params.line_y;
    var err = params.line_err;

    for (var i = 0u; i < params.line_points; i += 1u) {
        if (in_clip(x, y)) {
            textureStore(display_tex, vec2<i32>(x, y), color);
        }
        let e2 = 2 * err;
        if (e2 >= params.line_dy) {
            err += params.line_dy;
            x += params.line_sx;
        }
        if (e2 <= params.line_dx) {
            err += params.line_dx;
            y += params.line_sy;
        }
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    /// Identifiers that are reserved in GLSL or HLSL and break translation
    /// on the GL and DX12 backends even though WGSL accepts them.
    const FOREIGN_RESERVED: &[&str] = &[
        "packed", "input", "output", "filter", "sample", "buffer", "shared", "common", "partition", "active",
        "texture", "sampler", "cast", "namespace", "template", "half", "fixed", "precision", "lowp", "mediump",
        "highp", "attribute", "varying", "volatile", "restrict", "readonly", "writeonly", "line",
        "point", "triangle", "register", "groupshared", "cbuffer", "tbuffer", "matrix", "vector", "string",
    ];

    fn identifiers(source: &str) -> Vec<&str> {
        source
            .lines()
            .map(|l| l.split("//").next().unwrap_or(""))
            .flat_map(|l| l.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')))
            .filter(|w| w.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_'))
            .collect()
    }

    #[test]
    fn test_shader_avoids_backend_reserved_words() {
        let used = identifiers(STROKE_SHADER);
        assert!(used.contains(&"unpack_rgba"));
        for word in FOREIGN_RESERVED {
            assert!(!used.contains(word), "`{word}` is reserved by a shader backend");
        }
    }

    #[test]
    fn test_entry_points_present() {
        assert!(STROKE_SHADER.contains("fn cs_stroke("));
        assert!(STROKE_SHADER.contains("fn cs_line("));
    }
}
