use bytemuck::{Pod, Zeroable};

use crate::effect::EffectParams;

/// CPU-side mirror of the `FlameParams` uniform block.
///
/// The layout matches the std140 block declared in the fragment shader, so
/// field order and padding are load-bearing. `flame_color` sits after an
/// explicit pad float to land on the 16-byte boundary a `vec4` requires.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub(crate) struct FlameUniforms {
    pub time: f32,
    pub animation_speed: f32,
    pub y_offset: f32,
    _pad0: f32,
    pub flame_color: [f32; 4],
}

unsafe impl Zeroable for FlameUniforms {}
unsafe impl Pod for FlameUniforms {}

impl FlameUniforms {
    /// Seeds the uniform block from the effect parameters at time zero.
    pub fn new(params: &EffectParams) -> Self {
        Self {
            time: 0.0,
            animation_speed: params.animation_speed,
            y_offset: params.y_offset,
            _pad0: 0.0,
            flame_color: params.flame_color,
        }
    }

    /// Writes the current animation time; the only per-frame mutation.
    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    /// Sanity-checks that the CPU mirror of the uniform block matches the
    /// layout baked into the GLSL fragment source.
    #[test]
    fn flame_uniforms_follow_std140_layout() {
        let uniforms = FlameUniforms::new(&EffectParams::default());
        let base = &uniforms as *const _ as usize;

        assert_eq!(align_of::<FlameUniforms>(), 16);
        assert_eq!(size_of::<FlameUniforms>(), 32);
        assert_eq!((&uniforms.time as *const _ as usize) - base, 0);
        assert_eq!((&uniforms.animation_speed as *const _ as usize) - base, 4);
        assert_eq!((&uniforms.y_offset as *const _ as usize) - base, 8);
        assert_eq!((&uniforms.flame_color as *const _ as usize) - base, 16);
    }

    #[test]
    fn set_time_leaves_parameters_untouched() {
        let params = EffectParams {
            animation_speed: 0.7,
            y_offset: 0.25,
            flame_color: [0.1, 0.2, 0.3, 0.4],
        };
        let mut uniforms = FlameUniforms::new(&params);
        uniforms.set_time(12.5);
        assert_eq!(uniforms.time, 12.5);
        assert_eq!(uniforms.animation_speed, 0.7);
        assert_eq!(uniforms.y_offset, 0.25);
        assert_eq!(uniforms.flame_color, [0.1, 0.2, 0.3, 0.4]);
    }
}
