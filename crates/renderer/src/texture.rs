//! Noise texture upload and the procedural fallback tile.

use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::flip_vertical_in_place;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::types::NoiseSource;

/// Lattice resolution of the generated value-noise tile.
const LATTICE_CELLS: u32 = 8;

/// GPU-resident noise texture with repeat addressing on both axes.
///
/// Construction fully decodes and uploads the image before returning, which is
/// what guarantees the first draw never samples an unready texture.
pub(crate) struct NoiseTexture {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub width: u32,
    pub height: u32,
}

impl NoiseTexture {
    pub fn from_source(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &NoiseSource,
    ) -> Result<Self> {
        match source {
            NoiseSource::File { path } => Self::from_file(device, queue, path),
            NoiseSource::Procedural { size, seed } => {
                let pixels = value_noise_tile(*size, *seed);
                tracing::info!(size, seed, "generated procedural noise tile");
                Ok(Self::from_rgba8(
                    device,
                    queue,
                    &pixels,
                    *size,
                    *size,
                    "procedural noise texture",
                ))
            }
        }
    }

    fn from_file(device: &wgpu::Device, queue: &wgpu::Queue, path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to open noise texture at {}", path.display()))?;

        let mut rgba = image.to_rgba8();
        let width = rgba.width();
        let height = rgba.height();
        if width == 0 || height == 0 {
            anyhow::bail!(
                "noise texture at {} has zero extent ({}x{})",
                path.display(),
                width,
                height
            );
        }

        flip_vertical_in_place(&mut rgba);

        tracing::info!(path = %path.display(), width, height, "loaded noise texture");
        Ok(Self::from_rgba8(
            device,
            queue,
            rgba.as_raw(),
            width,
            height,
            "noise texture",
        ))
    }

    fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pixels: &[u8],
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        // Plain Unorm, not Srgb: the threshold compares raw sample values
        // against 0.5, so the bytes must reach the shader undecoded.
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            pixels,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("noise sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            _texture: texture,
            view,
            sampler,
            width,
            height,
        }
    }
}

/// Generates a seamless grayscale value-noise tile as RGBA8 pixels.
///
/// Lattice values come from a hash of the wrapped lattice coordinates, so the
/// left/right and top/bottom edges interpolate toward the same corners and the
/// tile repeats without seams.
pub fn value_noise_tile(size: u32, seed: u64) -> Vec<u8> {
    let size = size.max(2);
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);

    for py in 0..size {
        for px in 0..size {
            let fx = px as f32 / size as f32 * LATTICE_CELLS as f32;
            let fy = py as f32 / size as f32 * LATTICE_CELLS as f32;
            let ix = fx.floor() as u32;
            let iy = fy.floor() as u32;
            let tx = smoothstep(fx - ix as f32);
            let ty = smoothstep(fy - iy as f32);

            let c00 = lattice(ix, iy, seed);
            let c10 = lattice(ix + 1, iy, seed);
            let c01 = lattice(ix, iy + 1, seed);
            let c11 = lattice(ix + 1, iy + 1, seed);

            let top = c00 + (c10 - c00) * tx;
            let bottom = c01 + (c11 - c01) * tx;
            let value = top + (bottom - top) * ty;

            let byte = (value * 255.0).round().clamp(0.0, 255.0) as u8;
            pixels.extend_from_slice(&[byte, byte, byte, 255]);
        }
    }

    pixels
}

/// Hash-based lattice value in [0, 1]; coordinates wrap at the lattice size.
fn lattice(ix: u32, iy: u32, seed: u64) -> f32 {
    let x = (ix % LATTICE_CELLS) as u64;
    let y = (iy % LATTICE_CELLS) as u64;
    let mut state = seed ^ (x << 32) ^ y;
    // splitmix64 finalizer
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    state = (state ^ (state >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    state = (state ^ (state >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    state ^= state >> 31;
    (state >> 40) as f32 / (1u64 << 24) as f32
}

fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_generation_is_deterministic() {
        assert_eq!(value_noise_tile(64, 7), value_noise_tile(64, 7));
        assert_ne!(value_noise_tile(64, 7), value_noise_tile(64, 8));
    }

    #[test]
    fn tile_is_grayscale_and_opaque() {
        let pixels = value_noise_tile(32, 3);
        assert_eq!(pixels.len(), 32 * 32 * 4);
        for pixel in pixels.chunks(4) {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
            assert_eq!(pixel[3], 255);
        }
    }

    #[test]
    fn lattice_wraps_at_tile_boundaries() {
        for y in 0..LATTICE_CELLS {
            assert_eq!(lattice(0, y, 42), lattice(LATTICE_CELLS, y, 42));
            assert_eq!(lattice(y, 0, 42), lattice(y, LATTICE_CELLS, 42));
        }
    }

    #[test]
    fn lattice_values_stay_in_unit_range() {
        for ix in 0..LATTICE_CELLS {
            for iy in 0..LATTICE_CELLS {
                let value = lattice(ix, iy, 9);
                assert!((0.0..=1.0).contains(&value));
            }
        }
    }

    #[test]
    fn tiny_sizes_are_clamped() {
        assert_eq!(value_noise_tile(0, 1).len(), 2 * 2 * 4);
    }
}
