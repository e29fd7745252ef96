//! GPU resources backing the flame pipeline.
//!
//! `GpuState` owns everything needed to draw a frame: device and queue, the
//! (optional) swapchain surface, the compiled pipeline, the plane mesh
//! buffers, the noise texture bind group, and the CPU mirror of the uniform
//! block. Offscreen construction leaves the surface out and renders into a
//! readback-capable texture instead.

use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::naga::ShaderStage;
use wgpu::util::DeviceExt;
use wgpu::TextureFormatFeatureFlags;
use winit::dpi::PhysicalSize;

use crate::effect::{FRAGMENT_SHADER_GLSL, VERTEX_SHADER_GLSL};
use crate::geometry::{PlaneMesh, PlaneVertex};
use crate::runtime::TimeSample;
use crate::texture::NoiseTexture;
use crate::types::{Antialiasing, RendererConfig};
use crate::uniforms::FlameUniforms;

pub(crate) struct GpuState {
    /// `wgpu` instance that produced the surface; kept alive for the surface lifetime.
    _instance: wgpu::Instance,
    /// Limits advertised by the adapter; used to validate resize requests.
    limits: wgpu::Limits,
    /// Swapchain surface; absent when rendering offscreen.
    surface: Option<wgpu::Surface<'static>>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    /// Swapchain configuration; present exactly when `surface` is.
    surface_config: Option<wgpu::SurfaceConfiguration>,
    /// Color format of whatever we render into.
    target_format: wgpu::TextureFormat,
    /// Current target size in physical pixels.
    size: PhysicalSize<u32>,
    /// MSAA sample count used by the render pipeline.
    sample_count: u32,
    /// Optional multisample color buffer when MSAA is enabled.
    multisample_target: Option<MultisampleTarget>,
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    noise_bind_group: wgpu::BindGroup,
    /// Owned texture/sampler so the bind group remains valid.
    _noise: NoiseTexture,
    /// CPU copy of the uniform data mirrored into the buffer each frame.
    uniforms: FlameUniforms,
}

impl GpuState {
    /// Creates a GPU pipeline presenting into the supplied window surface.
    pub fn for_window<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        config: &RendererConfig,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::default();
        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;
        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        Self::new_internal(instance, Some(surface), initial_size, config)
    }

    /// Creates a GPU pipeline rendering into an offscreen readback target.
    pub fn offscreen(size: (u32, u32), config: &RendererConfig) -> Result<Self> {
        let instance = wgpu::Instance::default();
        Self::new_internal(
            instance,
            None,
            PhysicalSize::new(size.0, size.1),
            config,
        )
    }

    fn new_internal(
        instance: wgpu::Instance,
        surface: Option<wgpu::Surface<'static>>,
        initial_size: PhysicalSize<u32>,
        config: &RendererConfig,
    ) -> Result<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface.as_ref(),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let adapter_features = adapter.features();
        let limits = adapter.limits();
        let max_dimension = limits.max_texture_dimension_2d;
        let requested_width = initial_size.width.max(1);
        let requested_height = initial_size.height.max(1);
        if requested_width > max_dimension || requested_height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested surface is {width}x{height}",
                max_dimension = max_dimension,
                width = requested_width,
                height = requested_height
            );
        }

        let surface_caps = surface
            .as_ref()
            .map(|surface| surface.get_capabilities(&adapter));
        let target_format = match &surface_caps {
            Some(caps) => caps
                .formats
                .iter()
                .copied()
                .find(|format| format.is_srgb())
                .unwrap_or(caps.formats[0]),
            None => wgpu::TextureFormat::Rgba8UnormSrgb,
        };

        let format_features = adapter.get_texture_format_features(target_format);
        let mut supported_samples = format_features.flags.supported_sample_counts();
        if !supported_samples.contains(&1) {
            supported_samples.push(1);
        }
        supported_samples.sort_unstable();
        supported_samples.dedup();

        let mut sample_count = match config.antialiasing {
            Antialiasing::Auto => *supported_samples.last().unwrap_or(&1),
            Antialiasing::Off => 1,
            Antialiasing::Samples(requested) => {
                if supported_samples.contains(&requested) {
                    requested
                } else {
                    let fallback = supported_samples
                        .iter()
                        .copied()
                        .filter(|&count| count <= requested)
                        .max()
                        .unwrap_or(*supported_samples.first().unwrap_or(&1));
                    tracing::warn!(
                        requested,
                        fallback,
                        ?supported_samples,
                        "requested MSAA sample count not supported; falling back"
                    );
                    fallback
                }
            }
        };

        if sample_count > 1
            && !format_features
                .flags
                .contains(TextureFormatFeatureFlags::MULTISAMPLE_RESOLVE)
        {
            tracing::warn!(
                ?target_format,
                "target format does not support MSAA resolve; disabling MSAA"
            );
            sample_count = 1;
        }

        if sample_count > 4
            && !adapter_features.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
        {
            let fallback = supported_samples
                .iter()
                .copied()
                .filter(|&count| count <= 4)
                .max()
                .unwrap_or(1);
            tracing::warn!(
                sample_count,
                fallback,
                "adapter lacks TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES; clamping MSAA"
            );
            sample_count = fallback;
        }

        tracing::info!(
            antialiasing = ?config.antialiasing,
            sample_count,
            supported_samples = ?supported_samples,
            "resolved MSAA configuration"
        );

        let mut required_features = wgpu::Features::empty();
        if sample_count > 4 {
            required_features |= wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        }

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("flamewall device"),
            required_features,
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&device_descriptor))
            .context("failed to create GPU device")?;

        let size = PhysicalSize::new(requested_width, requested_height);

        let surface_config = match (&surface, &surface_caps) {
            (Some(surface), Some(caps)) => {
                let surface_config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format: target_format,
                    width: size.width,
                    height: size.height,
                    present_mode: caps.present_modes[0],
                    alpha_mode: caps.alpha_modes[0],
                    view_formats: vec![],
                    desired_maximum_frame_latency: 1,
                };
                surface.configure(&device, &surface_config);
                Some(surface_config)
            }
            _ => None,
        };

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("plane vertex"),
            source: wgpu::ShaderSource::Glsl {
                shader: VERTEX_SHADER_GLSL.into(),
                stage: ShaderStage::Vertex,
                defines: &[],
            },
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("flame fragment"),
            source: wgpu::ShaderSource::Glsl {
                shader: FRAGMENT_SHADER_GLSL.into(),
                stage: ShaderStage::Fragment,
                defines: &[],
            },
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let noise_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("noise layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("flame pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &noise_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("flame pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[PlaneVertex::LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: sample_count,
                ..wgpu::MultisampleState::default()
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    // The material draws transparently even though the shader
                    // always emits alpha 1.0.
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        let mesh = PlaneMesh::subdivided(config.plane_segments.0, config.plane_segments.1);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("plane vertex buffer"),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("plane index buffer"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        // Resolve and upload the noise before anything can be drawn; the first
        // frame must never sample an unready texture.
        let noise = NoiseTexture::from_source(&device, &queue, &config.noise)?;

        let noise_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("noise bind group"),
            layout: &noise_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&noise.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&noise.sampler),
                },
            ],
        });

        let uniforms = FlameUniforms::new(&config.effect);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("uniform buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let multisample_target = if sample_count > 1 {
            Some(MultisampleTarget::new(
                &device,
                target_format,
                size,
                sample_count,
            ))
        } else {
            None
        };

        tracing::info!(
            width = size.width,
            height = size.height,
            noise_width = noise.width,
            noise_height = noise.height,
            "initialised GPU state"
        );

        Ok(Self {
            _instance: instance,
            limits,
            surface,
            device,
            queue,
            surface_config,
            target_format,
            size,
            sample_count,
            multisample_target,
            pipeline,
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
            uniform_buffer,
            uniform_bind_group,
            noise_bind_group,
            _noise: noise,
            uniforms,
        })
    }

    /// Returns the current target size.
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Reconfigures the swapchain to match the new size.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        let max_dimension = self.limits.max_texture_dimension_2d;
        if new_size.width > max_dimension || new_size.height > max_dimension {
            tracing::warn!(
                width = new_size.width,
                height = new_size.height,
                max_dimension,
                "requested resize exceeds GPU max texture dimension; keeping previous size"
            );
            return;
        }

        self.size = new_size;
        if let (Some(surface), Some(surface_config)) =
            (self.surface.as_ref(), self.surface_config.as_mut())
        {
            surface_config.width = new_size.width;
            surface_config.height = new_size.height;
            surface.configure(&self.device, surface_config);
        }
        self.multisample_target = if self.sample_count > 1 {
            Some(MultisampleTarget::new(
                &self.device,
                self.target_format,
                new_size,
                self.sample_count,
            ))
        } else {
            None
        };
    }

    /// Advances the uniform block and uploads it to the GPU.
    fn update_uniforms(&mut self, sample: TimeSample) {
        self.uniforms.set_time(sample.seconds);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));
        tracing::trace!(
            time = sample.seconds,
            frame = sample.frame_index,
            "uploaded uniforms"
        );
    }

    /// Records and submits a frame to the swapchain.
    pub fn render_frame(&mut self, sample: TimeSample) -> Result<(), wgpu::SurfaceError> {
        self.update_uniforms(sample);

        let surface = self
            .surface
            .as_ref()
            .expect("render_frame requires a window surface");
        let frame = surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render encoder"),
            });
        self.encode_pass(&mut encoder, &view);
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        tracing::trace!(
            "presented frame size={}x{}",
            self.size.width,
            self.size.height
        );
        Ok(())
    }

    /// Renders one frame into an offscreen texture and reads it back.
    pub fn render_to_image(&mut self, sample: TimeSample) -> Result<image::RgbaImage> {
        self.update_uniforms(sample);

        let extent = wgpu::Extent3d {
            width: self.size.width,
            height: self.size.height,
            depth_or_array_layers: 1,
        };
        let target = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("export target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.target_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let bytes_per_pixel = 4u32;
        let unpadded_bytes_per_row = self.size.width * bytes_per_pixel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("export readback buffer"),
            size: (padded_bytes_per_row * self.size.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("export encoder"),
            });
        self.encode_pass(&mut encoder, &view);
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.size.height),
                },
            },
            extent,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .context("failed to wait for GPU readback")?;
        receiver
            .recv()
            .context("readback channel closed before mapping completed")?
            .context("failed to map readback buffer")?;

        let mapped = slice.get_mapped_range();
        let mut pixels =
            Vec::with_capacity((unpadded_bytes_per_row * self.size.height) as usize);
        for row in mapped.chunks(padded_bytes_per_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
        drop(mapped);
        readback.unmap();

        image::RgbaImage::from_raw(self.size.width, self.size.height, pixels)
            .ok_or_else(|| anyhow!("readback produced a malformed image"))
    }

    /// Encodes the full-screen flame pass into `encoder`, resolving MSAA when
    /// enabled.
    fn encode_pass(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let (attachment_view, resolve_target) = match self.multisample_target.as_ref() {
            Some(msaa) => (&msaa.view, Some(view)),
            None => (view, None),
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("flame pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: attachment_view,
                depth_slice: None,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        render_pass.set_bind_group(1, &self.noise_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

struct MultisampleTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl MultisampleTarget {
    fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        size: PhysicalSize<u32>,
        sample_count: u32,
    ) -> Self {
        let extent = wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("flamewall msaa color"),
            size: extent,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
