use std::fs;

use anyhow::{anyhow, Context, Result};
use flameconfig::{AntialiasSetting, FlameConfig};
use noisefetch::{parse_noise_handle, NoiseCache, NoiseClient, NoiseHandle, PathResolver};
use renderer::{
    Antialiasing, EffectParams, NoiseSource, RenderPolicy, Renderer, RendererConfig,
    StopConditions, TimePolicy, DEFAULT_SEGMENTS,
};
use tracing_subscriber::EnvFilter;

use crate::cli::{parse_export_format, RunArgs};
use crate::paths::AppPaths;

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config = load_config(&args, &paths)?;
    let noise = resolve_noise(&args, &config, &paths)?;
    let renderer_config = build_renderer_config(&args, &config, noise)?;

    tracing::info!(
        size = ?renderer_config.surface_size,
        policy = ?renderer_config.policy,
        timing = ?renderer_config.timing,
        "starting flamewall renderer"
    );
    Renderer::new(renderer_config).run()
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn print_paths() -> Result<()> {
    let paths = AppPaths::discover()?;
    println!("Resolved directories:");
    println!("  config:      {}", paths.config_dir().display());
    println!("  cache:       {}", paths.cache_dir().display());
    println!("  config file: {}", paths.config_file().display());
    println!("  noise cache: {}", paths.noise_cache_dir().display());
    Ok(())
}

/// Loads the TOML configuration: an explicit `--config` path must exist, the
/// default per-user file is optional.
fn load_config(args: &RunArgs, paths: &AppPaths) -> Result<FlameConfig> {
    if let Some(path) = &args.config {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        return FlameConfig::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()));
    }

    let default_path = paths.config_file();
    if default_path.is_file() {
        let raw = fs::read_to_string(&default_path)
            .with_context(|| format!("failed to read config at {}", default_path.display()))?;
        return FlameConfig::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config at {}", default_path.display()));
    }

    Ok(FlameConfig::default())
}

/// Resolves the noise handle (flag over config) into a renderer source.
///
/// Remote handles are materialised through the cache here, before the
/// renderer starts, so the render loop never begins without its texture.
fn resolve_noise(args: &RunArgs, config: &FlameConfig, paths: &AppPaths) -> Result<NoiseSource> {
    let Some(input) = args.noise.as_deref().or(config.noise.source.as_deref()) else {
        return Ok(NoiseSource::Procedural {
            size: config.noise.procedural_size,
            seed: config.noise.procedural_seed,
        });
    };

    let resolver = PathResolver::new()?;
    let handle = parse_noise_handle(&resolver, input)?;

    let client = if args.cache_only {
        tracing::info!("remote fetch disabled (--cache-only)");
        None
    } else if matches!(handle, NoiseHandle::Remote(_)) {
        Some(NoiseClient::new()?)
    } else {
        None
    };

    if args.refresh && args.cache_only {
        tracing::warn!("refresh requested together with --cache-only; using cache only");
    }

    let cache = NoiseCache::at(paths.noise_cache_dir());
    let path = noisefetch::resolve_noise_image(&handle, &cache, client.as_ref(), args.refresh)?;
    Ok(NoiseSource::File { path })
}

/// Merges CLI flags over the TOML configuration into a renderer config.
fn build_renderer_config(
    args: &RunArgs,
    config: &FlameConfig,
    noise: NoiseSource,
) -> Result<RendererConfig> {
    let surface_size = match args.size.as_deref() {
        Some(raw) => flameconfig::parse_size(raw).map_err(|err| anyhow!(err))?,
        None => config.render.size.unwrap_or((1920, 1080)),
    };

    let effect = EffectParams {
        animation_speed: args.speed.unwrap_or(config.effect.animation_speed),
        y_offset: args.y_offset.unwrap_or(config.effect.y_offset),
        flame_color: args.flame_color.unwrap_or(config.effect.flame_color),
    };
    if !effect.animation_speed.is_finite() {
        anyhow::bail!("--speed must be a finite number");
    }
    if !effect.y_offset.is_finite() {
        anyhow::bail!("--y-offset must be a finite number");
    }

    let timing = args.clock.unwrap_or(TimePolicy::FixedStep {
        step: config.effect.time_step,
    });

    let target_fps = normalize_fps(args.fps.or(config.render.fps));

    let policy = if let Some(path) = &args.still_export {
        let format = parse_export_format(path).map_err(|err| anyhow!(err))?;
        RenderPolicy::Export {
            time: args.still_time,
            path: path.clone(),
            format,
        }
    } else if args.still {
        RenderPolicy::Still {
            time: args.still_time,
        }
    } else {
        RenderPolicy::Animate { target_fps }
    };

    if args.frames == Some(0) {
        anyhow::bail!("--frames must be greater than zero");
    }
    if args.duration.is_some_and(|duration| duration.is_zero()) {
        anyhow::bail!("--duration must be greater than zero");
    }
    let stop = StopConditions {
        max_frames: args.frames.or(config.render.max_frames),
        max_runtime: args.duration.or(config.render.max_runtime),
    };

    let antialiasing = match args.antialias {
        Some(antialias) => antialias,
        None => config
            .render
            .antialias
            .map(map_antialias)
            .unwrap_or_default(),
    };

    Ok(RendererConfig {
        surface_size,
        noise,
        effect,
        plane_segments: (DEFAULT_SEGMENTS, DEFAULT_SEGMENTS),
        antialiasing,
        policy,
        timing,
        stop,
    })
}

fn normalize_fps(value: Option<f32>) -> Option<f32> {
    value.and_then(|fps| if fps > 0.0 { Some(fps) } else { None })
}

fn map_antialias(setting: AntialiasSetting) -> Antialiasing {
    match setting {
        AntialiasSetting::Auto => Antialiasing::Auto,
        AntialiasSetting::Off => Antialiasing::Off,
        AntialiasSetting::Samples2 => Antialiasing::Samples(2),
        AntialiasSetting::Samples4 => Antialiasing::Samples(4),
        AntialiasSetting::Samples8 => Antialiasing::Samples(8),
        AntialiasSetting::Samples16 => Antialiasing::Samples(16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use std::time::Duration;

    fn args_from(argv: &[&str]) -> RunArgs {
        Cli::parse_from(argv).run
    }

    #[test]
    fn flags_override_config_values() {
        let config = FlameConfig::from_toml_str(
            r#"
version = 1

[effect]
animation_speed = 0.9
y_offset = 0.1

[render]
size = "640x480"
fps = 30
"#,
        )
        .unwrap();
        let args = args_from(&["flamewall", "--speed", "0.3", "--size", "1280x720"]);

        let resolved =
            build_renderer_config(&args, &config, NoiseSource::default()).unwrap();
        assert_eq!(resolved.surface_size, (1280, 720));
        assert!((resolved.effect.animation_speed - 0.3).abs() < f32::EPSILON);
        assert!((resolved.effect.y_offset - 0.1).abs() < f32::EPSILON);
        assert_eq!(resolved.policy, RenderPolicy::Animate {
            target_fps: Some(30.0)
        });
    }

    #[test]
    fn config_time_step_feeds_the_fixed_clock() {
        let config = FlameConfig::from_toml_str(
            r#"
version = 1

[effect]
time_step = 0.05
"#,
        )
        .unwrap();
        let args = args_from(&["flamewall"]);
        let resolved =
            build_renderer_config(&args, &config, NoiseSource::default()).unwrap();
        assert_eq!(resolved.timing, TimePolicy::FixedStep { step: 0.05 });

        let args = args_from(&["flamewall", "--clock", "real"]);
        let resolved =
            build_renderer_config(&args, &config, NoiseSource::default()).unwrap();
        assert_eq!(resolved.timing, TimePolicy::RealTime);
    }

    #[test]
    fn still_export_selects_the_export_policy() {
        let args = args_from(&[
            "flamewall",
            "--still-export",
            "out.png",
            "--still-time",
            "4.2",
        ]);
        let resolved =
            build_renderer_config(&args, &FlameConfig::default(), NoiseSource::default()).unwrap();
        match resolved.policy {
            RenderPolicy::Export { time, path, format } => {
                assert_eq!(time, Some(4.2));
                assert_eq!(path, std::path::PathBuf::from("out.png"));
                assert_eq!(format, renderer::ExportFormat::Png);
            }
            other => panic!("expected export policy, got {other:?}"),
        }
    }

    #[test]
    fn frame_and_duration_limits_merge_into_stop_conditions() {
        let config = FlameConfig::from_toml_str(
            r#"
version = 1

[render]
max_frames = 100
"#,
        )
        .unwrap();
        let args = args_from(&["flamewall", "--duration", "30s"]);
        let resolved = build_renderer_config(&args, &config, NoiseSource::default()).unwrap();
        assert_eq!(resolved.stop.max_frames, Some(100));
        assert_eq!(resolved.stop.max_runtime, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_frame_budget_is_rejected() {
        let args = args_from(&["flamewall", "--frames", "0"]);
        let err = build_renderer_config(&args, &FlameConfig::default(), NoiseSource::default())
            .unwrap_err();
        assert!(err.to_string().contains("--frames"));
    }

    #[test]
    fn zero_fps_means_uncapped() {
        let args = args_from(&["flamewall", "--fps", "0"]);
        let resolved =
            build_renderer_config(&args, &FlameConfig::default(), NoiseSource::default()).unwrap();
        assert_eq!(resolved.policy, RenderPolicy::Animate { target_fps: None });
    }

    #[test]
    fn antialias_settings_map_onto_renderer_modes() {
        assert_eq!(map_antialias(AntialiasSetting::Auto), Antialiasing::Auto);
        assert_eq!(map_antialias(AntialiasSetting::Off), Antialiasing::Off);
        assert_eq!(
            map_antialias(AntialiasSetting::Samples8),
            Antialiasing::Samples(8)
        );
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let temp = tempfile::tempdir().unwrap();
        let config_path = temp.path().join("custom.toml");
        fs::write(
            &config_path,
            r#"
version = 1

[effect]
animation_speed = 0.7
"#,
        )
        .unwrap();

        let args = args_from(&[
            "flamewall",
            "--config",
            config_path.to_str().unwrap(),
        ]);
        let paths = AppPaths::with_roots(temp.path(), temp.path());
        let config = load_config(&args, &paths).unwrap();
        assert!((config.effect.animation_speed - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let args = args_from(&["flamewall", "--config", "/nonexistent/flame.toml"]);
        let paths = AppPaths::with_roots(temp.path(), temp.path());
        assert!(load_config(&args, &paths).is_err());
    }

    #[test]
    fn absent_noise_handle_falls_back_to_procedural() {
        let temp = tempfile::tempdir().unwrap();
        let args = args_from(&["flamewall"]);
        let paths = AppPaths::with_roots(temp.path(), temp.path());
        let source = resolve_noise(&args, &FlameConfig::default(), &paths).unwrap();
        assert!(matches!(
            source,
            NoiseSource::Procedural { size: 256, seed: 0 }
        ));
    }

    #[test]
    fn local_noise_handle_resolves_to_the_file() {
        let temp = tempfile::tempdir().unwrap();
        let noise_path = temp.path().join("noise.png");
        fs::write(&noise_path, b"png").unwrap();

        let args = args_from(&["flamewall", "--noise", noise_path.to_str().unwrap()]);
        let paths = AppPaths::with_roots(temp.path(), temp.path());
        let source = resolve_noise(&args, &FlameConfig::default(), &paths).unwrap();
        match source {
            NoiseSource::File { path } => assert_eq!(path, noise_path),
            other => panic!("expected file source, got {other:?}"),
        }
    }
}
