//! The threshold-silhouette effect: shader sources plus a CPU reference.
//!
//! The fragment program is small enough to mirror exactly on the CPU, so the
//! per-pixel contract (scroll, sample, bias, hard step, opaque alpha) is
//! implemented twice: once as Vulkan GLSL compiled through naga, and once as
//! [`evaluate`] for the unit tests. Both must agree; change them together.

/// Per-draw parameters of the flame effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParams {
    /// Vertical scroll rate of the sampled noise, in UV units per second.
    pub animation_speed: f32,
    /// Vertical shift of the threshold boundary.
    pub y_offset: f32,
    /// Declared flame tint. Uploaded with the other uniforms but not read by
    /// the fragment computation; the hard threshold forces channels to 0 or 1.
    pub flame_color: [f32; 4],
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            animation_speed: 0.2,
            y_offset: 0.5,
            flame_color: [0.8, 0.2, 1.0, 1.0],
        }
    }
}

/// Computes the scrolled sample coordinate for a surface UV at `time`.
///
/// No wrapping happens here; arbitrarily negative second components are valid
/// and rely on the sampler's repeat addressing to tile.
pub fn scrolled_uv(uv: [f32; 2], time: f32, animation_speed: f32) -> [f32; 2] {
    [uv[0], uv[1] - time * animation_speed]
}

/// Maps an out-of-range texture coordinate back into [0, 1), the CPU analogue
/// of repeat addressing.
pub fn wrap(coord: f32) -> f32 {
    coord.rem_euclid(1.0)
}

/// Hard step at 0.5: values at or above the cutoff become 1.0, the rest 0.0.
pub fn step_threshold(value: f32) -> f32 {
    if value >= 0.5 {
        1.0
    } else {
        0.0
    }
}

/// Biases a sampled noise color against the vertical gradient and thresholds
/// each RGB channel. Alpha is emitted at 1.0 regardless of the sample.
pub fn shade(uv: [f32; 2], noise: [f32; 4], y_offset: f32) -> [f32; 4] {
    let bias = uv[1] - y_offset;
    [
        step_threshold(noise[0] - bias),
        step_threshold(noise[1] - bias),
        step_threshold(noise[2] - bias),
        1.0,
    ]
}

/// Full per-pixel contract: scroll the UV, sample the noise field, then bias
/// and threshold. `sample` stands in for the texture fetch and receives the
/// unwrapped coordinate, exactly like the GPU sampler does.
pub fn evaluate<F>(uv: [f32; 2], time: f32, params: &EffectParams, sample: F) -> [f32; 4]
where
    F: Fn([f32; 2]) -> [f32; 4],
{
    let scrolled = scrolled_uv(uv, time, params.animation_speed);
    shade(uv, sample(scrolled), params.y_offset)
}

/// Pass-through vertex stage for the clip-space plane mesh.
pub(crate) const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec3 position;
layout(location = 1) in vec2 uv;

layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = uv;
    gl_Position = vec4(position, 1.0);
}
";

/// Fragment stage implementing the threshold silhouette.
///
/// The uniform block layout must match `FlameUniforms`.
pub(crate) const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform FlameParams {
    float time;
    float animation_speed;
    float y_offset;
    float _pad0;
    vec4 flame_color;
} ubo;

layout(set = 1, binding = 0) uniform texture2D noise_texture;
layout(set = 1, binding = 1) uniform sampler noise_sampler;

void main() {
    // Scroll vertically; repeat addressing tiles out-of-range coordinates.
    vec2 uv = vec2(v_uv.x, v_uv.y - ubo.time * ubo.animation_speed);
    vec4 noise = texture(sampler2D(noise_texture, noise_sampler), uv);

    // Bias against the vertical gradient, then hard-threshold per channel.
    vec3 rgb = noise.rgb - vec3(v_uv.y - ubo.y_offset);
    rgb = step(vec3(0.5), rgb);

    out_color = vec4(rgb, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_field(coord: [f32; 2]) -> [f32; 4] {
        let u = wrap(coord[0]);
        let v = wrap(coord[1]);
        [u, v, (u + v) * 0.5, 0.25]
    }

    #[test]
    fn output_channels_are_binary() {
        let params = EffectParams::default();
        for step_u in 0..=10 {
            for step_v in 0..=10 {
                for step_t in 0..5 {
                    let uv = [step_u as f32 / 10.0, step_v as f32 / 10.0];
                    let time = step_t as f32 * 1.7;
                    let color = evaluate(uv, time, &params, gradient_field);
                    for channel in &color[..3] {
                        assert!(
                            *channel == 0.0 || *channel == 1.0,
                            "channel {channel} is not binary for uv={uv:?} time={time}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn scroll_advances_linearly_with_time() {
        let uv = [0.3, 0.6];
        let speed = 0.2;
        let (t1, t2) = (1.25, 4.75);
        let s1 = scrolled_uv(uv, t1, speed);
        let s2 = scrolled_uv(uv, t2, speed);
        assert_eq!(s1[0], s2[0]);
        assert!((s1[1] - s2[1] - speed * (t2 - t1)).abs() < 1e-6);
    }

    #[test]
    fn alpha_is_always_opaque() {
        let params = EffectParams {
            animation_speed: -0.8,
            y_offset: 0.1,
            ..EffectParams::default()
        };
        for step in 0..20 {
            let uv = [step as f32 / 19.0, 1.0 - step as f32 / 19.0];
            let color = evaluate(uv, step as f32 * 0.33, &params, gradient_field);
            assert_eq!(color[3], 1.0);
        }
    }

    #[test]
    fn midpoint_sample_at_centerline_is_white() {
        let color = shade([0.2, 0.5], [0.5, 0.5, 0.5, 1.0], 0.5);
        assert_eq!(color, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn midpoint_sample_at_top_is_black() {
        let color = shade([0.2, 1.0], [0.5, 0.5, 0.5, 1.0], 0.5);
        assert_eq!(color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn wrapping_matches_repeat_addressing() {
        assert!((wrap(-3.2) - 0.8).abs() < 1e-6);
        assert!((wrap(2.4) - 0.4).abs() < 1e-6);
        assert_eq!(wrap(0.0), 0.0);

        // A tileable field sampled through `wrap` cannot tell -3.2 from 0.8.
        let a = gradient_field([0.7, -3.2]);
        let b = gradient_field([0.7, 0.8]);
        for (lhs, rhs) in a.iter().zip(b.iter()) {
            assert!((lhs - rhs).abs() < 1e-6);
        }
    }

    #[test]
    fn flame_color_does_not_influence_output() {
        let tinted = EffectParams {
            flame_color: [0.1, 0.9, 0.3, 0.5],
            ..EffectParams::default()
        };
        let plain = EffectParams::default();
        let uv = [0.4, 0.7];
        assert_eq!(
            evaluate(uv, 2.0, &tinted, gradient_field),
            evaluate(uv, 2.0, &plain, gradient_field)
        );
    }
}
