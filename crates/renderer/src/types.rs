use std::path::PathBuf;

use crate::effect::EffectParams;
use crate::geometry::DEFAULT_SEGMENTS;
use crate::runtime::{RenderPolicy, StopConditions, TimePolicy};

/// Describes how the noise texture should be populated.
#[derive(Clone, Debug)]
pub enum NoiseSource {
    /// Decode an image file from disk (must be tileable to scroll seamlessly).
    File { path: PathBuf },
    /// Generate a seamless value-noise tile on the CPU.
    Procedural { size: u32, seed: u64 },
}

impl Default for NoiseSource {
    fn default() -> Self {
        Self::Procedural {
            size: 256,
            seed: 0,
        }
    }
}

/// Anti-aliasing policy for the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Antialiasing {
    /// Pick the highest sample count supported by the target format.
    Auto,
    /// Disable MSAA and render directly into the target.
    Off,
    /// Request a specific MSAA sample count (clamped to what the device supports).
    Samples(u32),
}

impl Default for Antialiasing {
    fn default() -> Self {
        Self::Auto
    }
}

/// Immutable configuration passed to the renderer at start-up.
///
/// `RendererConfig` mirrors CLI flags and tells the renderer how large the
/// target surface should be, where the noise comes from, which effect
/// parameters to upload, and how the frame loop should behave and end.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Window or offscreen surface size in physical pixels.
    pub surface_size: (u32, u32),
    /// Source of the tileable noise texture.
    pub noise: NoiseSource,
    /// Uniform values for the threshold effect.
    pub effect: EffectParams,
    /// Plane subdivisions per axis.
    pub plane_segments: (u32, u32),
    /// Anti-aliasing mode requested by the caller.
    pub antialiasing: Antialiasing,
    /// High-level render behaviour requested by the caller.
    pub policy: RenderPolicy,
    /// Clock driving the time uniform.
    pub timing: TimePolicy,
    /// Limits that end the otherwise perpetual loop.
    pub stop: StopConditions,
}

impl Default for RendererConfig {
    /// Provides a 1080p animated configuration with procedural noise.
    fn default() -> Self {
        Self {
            surface_size: (1920, 1080),
            noise: NoiseSource::default(),
            effect: EffectParams::default(),
            plane_segments: (DEFAULT_SEGMENTS, DEFAULT_SEGMENTS),
            antialiasing: Antialiasing::default(),
            policy: RenderPolicy::default(),
            timing: TimePolicy::default(),
            stop: StopConditions::none(),
        }
    }
}
