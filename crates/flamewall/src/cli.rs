use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use renderer::{Antialiasing, ExportFormat, TimePolicy, DEFAULT_TIME_STEP};

#[derive(Parser, Debug)]
#[command(
    name = "flamewall",
    author,
    version,
    about = "Flame-edge silhouette shader demo",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to a TOML configuration file (defaults to the user config dir).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Noise handle: a tileable image path or an http(s) URL.
    #[arg(long, value_name = "HANDLE")]
    pub noise: Option<String>,

    /// Override the render resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Optional FPS cap (0 = uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Render exactly this many frames, then exit.
    #[arg(long, value_name = "COUNT")]
    pub frames: Option<u64>,

    /// Stop after this much wall-clock time (e.g. `30s` or `2.5`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
    pub duration: Option<Duration>,

    /// Vertical scroll rate of the noise, in UV units per second.
    #[arg(long, value_name = "SPEED")]
    pub speed: Option<f32>,

    /// Vertical shift of the threshold boundary.
    #[arg(long, value_name = "OFFSET")]
    pub y_offset: Option<f32>,

    /// Flame tint as `R,G,B[,A]` floats or `#RRGGBB[AA]` hex.
    #[arg(long, value_name = "COLOR", value_parser = parse_color)]
    pub flame_color: Option<[f32; 4]>,

    /// Render a single still frame instead of animating continuously.
    #[arg(long)]
    pub still: bool,

    /// Timestamp (seconds) to evaluate for still/export modes.
    #[arg(long, value_name = "SECONDS")]
    pub still_time: Option<f32>,

    /// Export a still frame to the provided PNG path then exit.
    #[arg(long, value_name = "PATH")]
    pub still_export: Option<PathBuf>,

    /// Force refresh of the cached remote noise image before launch.
    #[arg(long)]
    pub refresh: bool,

    /// Skip any remote fetches and rely on the cache.
    #[arg(long)]
    pub cache_only: bool,

    /// Anti-aliasing policy: `auto`, `off`, or an explicit MSAA sample count (e.g. `4`).
    #[arg(long, value_name = "MODE", value_parser = parse_antialias)]
    pub antialias: Option<Antialiasing>,

    /// Animation clock: `fixed[:STEP]` (deterministic) or `real` (wall-clock).
    #[arg(long, value_name = "CLOCK", value_parser = parse_clock)]
    pub clock: Option<TimePolicy>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print resolved directories for config and cache roots.
    Paths,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_antialias(value: &str) -> Result<Antialiasing, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("anti-alias mode must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "max" | "default" => Ok(Antialiasing::Auto),
        "off" | "none" | "disable" | "disabled" | "0" => Ok(Antialiasing::Off),
        _ => {
            let samples: u32 = normalized.parse().map_err(|_| {
                format!("invalid anti-alias sample count '{trimmed}'; use auto/off or 2/4/8/16")
            })?;

            if samples == 0 || samples == 1 {
                return Ok(Antialiasing::Off);
            }

            if !matches!(samples, 2 | 4 | 8 | 16) {
                return Err(format!(
                    "unsupported sample count {samples}; supported values are 2, 4, 8, or 16"
                ));
            }

            Ok(Antialiasing::Samples(samples))
        }
    }
}

pub fn parse_clock(value: &str) -> Result<TimePolicy, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("clock mode must not be empty".to_string());
    }

    let (mode, rest) = match trimmed.split_once(':') {
        Some((mode, rest)) => (mode.trim().to_ascii_lowercase(), Some(rest.trim())),
        None => (trimmed.to_ascii_lowercase(), None),
    };

    match mode.as_str() {
        "real" | "wall" | "wallclock" => {
            if rest.is_some() {
                return Err("the real clock takes no step argument".to_string());
            }
            Ok(TimePolicy::RealTime)
        }
        "fixed" | "step" => {
            let step = match rest {
                None => DEFAULT_TIME_STEP,
                Some(raw) => {
                    let step: f32 = raw
                        .parse()
                        .map_err(|_| format!("invalid clock step '{raw}'"))?;
                    if !step.is_finite() || step <= 0.0 {
                        return Err("clock step must be greater than zero".to_string());
                    }
                    step
                }
            };
            Ok(TimePolicy::FixedStep { step })
        }
        other => Err(format!(
            "unknown clock mode '{other}'; expected fixed[:STEP] or real"
        )),
    }
}

pub fn parse_color(value: &str) -> Result<[f32; 4], String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("color must not be empty".to_string());
    }

    if let Some(hex) = trimmed.strip_prefix('#') {
        return parse_hex_color(hex);
    }

    let components: Vec<&str> = trimmed.split(',').map(str::trim).collect();
    if !(3..=4).contains(&components.len()) {
        return Err(format!(
            "invalid color '{trimmed}'; expected R,G,B[,A] or #RRGGBB[AA]"
        ));
    }

    let mut color = [0.0, 0.0, 0.0, 1.0];
    for (index, raw) in components.iter().enumerate() {
        let component: f32 = raw
            .parse()
            .map_err(|_| format!("invalid color component '{raw}'"))?;
        if !component.is_finite() || !(0.0..=1.0).contains(&component) {
            return Err(format!("color component '{raw}' must be within [0, 1]"));
        }
        color[index] = component;
    }
    Ok(color)
}

fn parse_hex_color(hex: &str) -> Result<[f32; 4], String> {
    if !matches!(hex.len(), 6 | 8) {
        return Err(format!("invalid hex color '#{hex}'; expected RRGGBB[AA]"));
    }

    let mut color = [0.0, 0.0, 0.0, 1.0];
    for (index, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).map_err(|_| "invalid hex color".to_string())?;
        let byte = u8::from_str_radix(pair, 16)
            .map_err(|_| format!("invalid hex digits '{pair}' in color"))?;
        color[index] = byte as f32 / 255.0;
    }
    Ok(color)
}

pub fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    flameconfig::parse_duration(value)
}

pub fn parse_export_format(path: &PathBuf) -> Result<ExportFormat, String> {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => Ok(ExportFormat::Png),
        None => Err("export path has no extension; expected .png".to_string()),
        Some(other) => Err(format!(
            "unsupported export format '.{other}'; expected .png"
        )),
    }
}
