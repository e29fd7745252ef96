use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level TOML configuration for the flame demo.
///
/// Every section is optional; missing values fall back to the built-in effect
/// defaults (scroll speed 0.2, threshold offset 0.5, fixed 0.02 s time step).
/// CLI flags override whatever is resolved here.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlameConfig {
    pub version: u32,
    #[serde(default)]
    pub effect: EffectSettings,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub noise: NoiseSettings,
}

impl Default for FlameConfig {
    fn default() -> Self {
        Self {
            version: 1,
            effect: EffectSettings::default(),
            render: RenderSettings::default(),
            noise: NoiseSettings::default(),
        }
    }
}

/// Uniform values fed to the fragment stage.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EffectSettings {
    /// Vertical scroll rate of the sampled noise, in UV units per second.
    #[serde(default = "default_animation_speed")]
    pub animation_speed: f32,
    /// Vertical shift of the threshold boundary.
    #[serde(default = "default_y_offset")]
    pub y_offset: f32,
    /// Declared flame tint; uploaded to the uniform block but not read by the
    /// threshold computation.
    #[serde(default = "default_flame_color")]
    pub flame_color: [f32; 4],
    /// Seconds added to the time uniform per rendered frame.
    #[serde(default = "default_time_step")]
    pub time_step: f32,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            animation_speed: default_animation_speed(),
            y_offset: default_y_offset(),
            flame_color: default_flame_color(),
            time_step: default_time_step(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RenderSettings {
    /// Surface size as `WIDTHxHEIGHT`.
    #[serde(default, deserialize_with = "deserialize_size_opt")]
    pub size: Option<(u32, u32)>,
    /// FPS cap; 0 or absent means render every frame callback.
    #[serde(default)]
    pub fps: Option<f32>,
    #[serde(default, deserialize_with = "deserialize_antialias_opt")]
    pub antialias: Option<AntialiasSetting>,
    /// Stop after this many frames.
    #[serde(default)]
    pub max_frames: Option<u64>,
    /// Stop after this much wall-clock time.
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub max_runtime: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NoiseSettings {
    /// Noise handle: a local image path or an http(s) URL. Absent means the
    /// procedural tile is used.
    #[serde(default)]
    pub source: Option<String>,
    /// Edge length of the generated fallback tile, in pixels.
    #[serde(default = "default_procedural_size")]
    pub procedural_size: u32,
    /// Seed for the generated fallback tile.
    #[serde(default)]
    pub procedural_seed: u64,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            source: None,
            procedural_size: default_procedural_size(),
            procedural_seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AntialiasSetting {
    Auto,
    Off,
    Samples2,
    Samples4,
    Samples8,
    Samples16,
}

fn default_animation_speed() -> f32 {
    0.2
}

fn default_y_offset() -> f32 {
    0.5
}

fn default_flame_color() -> [f32; 4] {
    [0.8, 0.2, 1.0, 1.0]
}

fn default_time_step() -> f32 {
    0.02
}

fn default_procedural_size() -> u32 {
    256
}

/// Parses a `WIDTHxHEIGHT` string such as `1920x1080`.
pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{value}'; expected WIDTHxHEIGHT"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width in size '{value}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height in size '{value}'"))?;
    if width == 0 || height == 0 {
        return Err("size dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

/// Parses a duration given as seconds or a human-readable string like `90s`.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("duration must not be empty".into());
    }
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_nan() || seconds < 0.0 {
            return Err("duration must be non-negative".into());
        }
        return Ok(Duration::from_secs_f64(seconds));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}

fn deserialize_size_opt<'de, D>(deserializer: D) -> Result<Option<(u32, u32)>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|value| parse_size(&value).map_err(de::Error::custom))
        .transpose()
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn deserialize_antialias_opt<'de, D>(deserializer: D) -> Result<Option<AntialiasSetting>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Num(i64),
    }

    let helper: Option<Helper> = Option::deserialize(deserializer)?;
    let result = match helper {
        None => None,
        Some(Helper::Str(raw)) => Some(parse_antialias(&raw).map_err(de::Error::custom)?),
        Some(Helper::Num(value)) => {
            if value < 0 {
                return Err(de::Error::custom("antialias value must be non-negative"));
            }
            let raw = value.to_string();
            Some(parse_antialias(&raw).map_err(de::Error::custom)?)
        }
    };
    Ok(result)
}

pub fn parse_antialias(raw: &str) -> Result<AntialiasSetting, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "max" | "default" => Ok(AntialiasSetting::Auto),
        "off" | "none" | "disable" | "disabled" | "0" | "1" => Ok(AntialiasSetting::Off),
        "2" => Ok(AntialiasSetting::Samples2),
        "4" => Ok(AntialiasSetting::Samples4),
        "8" => Ok(AntialiasSetting::Samples8),
        "16" => Ok(AntialiasSetting::Samples16),
        other => Err(format!("invalid antialias setting '{other}'")),
    }
}

impl FlameConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: FlameConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if !self.effect.animation_speed.is_finite() {
            return Err(ConfigError::Invalid(
                "effect.animation_speed must be a finite number".into(),
            ));
        }

        if !self.effect.y_offset.is_finite() {
            return Err(ConfigError::Invalid(
                "effect.y_offset must be a finite number".into(),
            ));
        }

        if !(self.effect.time_step.is_finite() && self.effect.time_step > 0.0) {
            return Err(ConfigError::Invalid(
                "effect.time_step must be greater than zero".into(),
            ));
        }

        for (index, component) in self.effect.flame_color.iter().enumerate() {
            if !component.is_finite() || *component < 0.0 || *component > 1.0 {
                return Err(ConfigError::Invalid(format!(
                    "effect.flame_color[{index}] must be within [0, 1]"
                )));
            }
        }

        if let Some(fps) = self.render.fps {
            if !fps.is_finite() || fps < 0.0 {
                return Err(ConfigError::Invalid("render.fps must be >= 0".into()));
            }
        }

        if let Some(frames) = self.render.max_frames {
            if frames == 0 {
                return Err(ConfigError::Invalid(
                    "render.max_frames must be greater than zero".into(),
                ));
            }
        }

        if let Some(runtime) = self.render.max_runtime {
            if runtime.is_zero() {
                return Err(ConfigError::Invalid(
                    "render.max_runtime must be greater than zero".into(),
                ));
            }
        }

        if let Some(source) = &self.noise.source {
            if source.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "noise.source must not be empty when set".into(),
                ));
            }
        }

        if !(2..=4096).contains(&self.noise.procedural_size) {
            return Err(ConfigError::Invalid(
                "noise.procedural_size must be within [2, 4096]".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[effect]
animation_speed = 0.35
y_offset = 0.4
flame_color = [0.9, 0.3, 0.1, 1.0]

[render]
size = "1280x720"
fps = 60
antialias = 4
max_frames = 600
max_runtime = "30s"

[noise]
source = "https://example.com/perlin.png"
procedural_size = 128
procedural_seed = 7
"#;

    #[test]
    fn parses_sample_config() {
        let config = FlameConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert!((config.effect.animation_speed - 0.35).abs() < f32::EPSILON);
        assert_eq!(config.render.size, Some((1280, 720)));
        assert_eq!(config.render.antialias, Some(AntialiasSetting::Samples4));
        assert_eq!(config.render.max_frames, Some(600));
        assert_eq!(config.render.max_runtime, Some(Duration::from_secs(30)));
        assert_eq!(
            config.noise.source.as_deref(),
            Some("https://example.com/perlin.png")
        );
        assert_eq!(config.noise.procedural_size, 128);
    }

    #[test]
    fn empty_sections_fall_back_to_effect_defaults() {
        let config = FlameConfig::from_toml_str("version = 1").expect("parse config");
        assert!((config.effect.animation_speed - 0.2).abs() < f32::EPSILON);
        assert!((config.effect.y_offset - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.effect.flame_color, [0.8, 0.2, 1.0, 1.0]);
        assert!((config.effect.time_step - 0.02).abs() < f32::EPSILON);
        assert!(config.render.size.is_none());
        assert!(config.noise.source.is_none());
    }

    #[test]
    fn rejects_unknown_version() {
        let err = FlameConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_time_step() {
        let err = FlameConfig::from_toml_str(
            r#"
version = 1

[effect]
time_step = 0.0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_flame_color() {
        let err = FlameConfig::from_toml_str(
            r#"
version = 1

[effect]
flame_color = [1.5, 0.0, 0.0, 1.0]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_size() {
        let err = FlameConfig::from_toml_str(
            r#"
version = 1

[render]
size = "1280by720"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn parses_duration_values() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5").unwrap(), Duration::from_secs_f64(1.5));
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parses_size_values() {
        assert_eq!(parse_size("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_size(" 640X480 ").unwrap(), (640, 480));
        assert!(parse_size("0x100").is_err());
        assert!(parse_size("nonsense").is_err());
    }
}
