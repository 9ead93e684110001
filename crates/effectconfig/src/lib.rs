use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use frameclock::TimeUnit;
use renderer::samples::Sample;
use renderer::{Color, Composite, Resolution, UniformSet, UniformValue};
use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A scene: a surface size, a named palette, and effect layers painted
/// bottom to top.
#[derive(Debug, Clone, Deserialize)]
pub struct SceneConfig {
    pub version: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(
        default = "default_frame_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub frame_interval: Duration,
    #[serde(default)]
    pub palette: BTreeMap<String, String>,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Layer {
    pub name: String,
    #[serde(default)]
    pub sample: Option<String>,
    #[serde(default)]
    pub shader: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub content: ContentSetting,
    /// Fill or pill color; a hex color or `@palette` reference.
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub composite: Composite,
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub time_unit: TimeUnit,
    #[serde(default)]
    pub uniforms: BTreeMap<String, UniformSetting>,
}

/// What a layer decorates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContentSetting {
    #[default]
    Fill,
    Pill,
    Image(PathBuf),
    None,
}

impl FromStr for ContentSetting {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Some(path) = trimmed.strip_prefix("image:") {
            if path.trim().is_empty() {
                return Err("image content must name a file, e.g. 'image:logo.png'".into());
            }
            return Ok(ContentSetting::Image(PathBuf::from(path.trim())));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "fill" => Ok(ContentSetting::Fill),
            "pill" | "button" => Ok(ContentSetting::Pill),
            "none" | "empty" => Ok(ContentSetting::None),
            other => Err(format!(
                "unknown content '{other}'; expected fill, pill, image:<path>, or none"
            )),
        }
    }
}

/// Raw uniform value as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UniformSetting {
    Number(f64),
    Pair([f64; 2]),
    Text(String),
}

impl fmt::Display for UniformSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformSetting::Number(value) => write!(f, "{value}"),
            UniformSetting::Pair([x, y]) => write!(f, "[{x}, {y}]"),
            UniformSetting::Text(text) => write!(f, "'{text}'"),
        }
    }
}

/// Where a layer's program comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectSource {
    Sample(Sample),
    Shader(PathBuf),
}

fn default_width() -> u32 {
    480
}

fn default_height() -> u32 {
    160
}

fn default_frame_interval() -> Duration {
    Duration::from_millis(16)
}

fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr<Err = String>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of milliseconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_millis(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v / 1_000.0)
                .map_err(|_| E::custom(format!("duration of {v}ms is out of range")))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl SceneConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SceneConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    /// Looks up a palette entry by name.
    pub fn palette_color(&self, name: &str) -> Result<Color, ConfigError> {
        let raw = self.palette.get(name).ok_or_else(|| {
            ConfigError::Invalid(format!("unknown palette color '@{name}'"))
        })?;
        Color::from_hex(raw).ok_or_else(|| {
            ConfigError::Invalid(format!("palette color '{name}' has invalid hex value '{raw}'"))
        })
    }

    /// Resolves a `#hex` or `@palette` color reference.
    pub fn color(&self, text: &str) -> Result<Color, ConfigError> {
        if let Some(name) = text.strip_prefix('@') {
            return self.palette_color(name);
        }
        Color::from_hex(text).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "invalid color '{text}'; expected '#rrggbb', '#rrggbbaa', or '@palette'"
            ))
        })
    }

    /// Color the layer's fill or pill is painted with; white when unset.
    pub fn content_color(&self, layer: &Layer) -> Result<Color, ConfigError> {
        match &layer.color {
            Some(text) => self.color(text),
            None => Ok(Color::WHITE),
        }
    }

    /// The layer's static uniforms with palette references resolved.
    pub fn layer_uniforms(&self, layer: &Layer) -> Result<UniformSet, ConfigError> {
        let mut set = UniformSet::new();
        for (name, setting) in &layer.uniforms {
            let value = match setting {
                UniformSetting::Number(value) => UniformValue::Float(*value as f32),
                UniformSetting::Pair([x, y]) => UniformValue::Vec2([*x as f32, *y as f32]),
                UniformSetting::Text(text) => {
                    UniformValue::Color(self.color(text).map_err(|err| match err {
                        ConfigError::Invalid(reason) => ConfigError::Invalid(format!(
                            "layer '{}' uniform '{name}': {reason}",
                            layer.name
                        )),
                        other => other,
                    })?)
                }
            };
            set.insert(name.clone(), value);
        }
        Ok(set)
    }

    /// Rebases relative shader and image paths onto `base`, typically the
    /// directory holding the scene file.
    pub fn resolve_paths(&mut self, base: &Path) {
        for layer in &mut self.layers {
            if let Some(shader) = layer.shader.as_mut() {
                if shader.is_relative() {
                    *shader = base.join(&*shader);
                }
            }
            if let ContentSetting::Image(path) = &mut layer.content {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "surface size must be positive, found {}x{}",
                self.width, self.height
            )));
        }

        if self.frame_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "frame_interval must be greater than zero".into(),
            ));
        }

        for (name, raw) in &self.palette {
            if Color::from_hex(raw).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "palette color '{name}' has invalid hex value '{raw}'"
                )));
            }
        }

        if self.layers.is_empty() {
            return Err(ConfigError::Invalid(
                "config must define at least one layer".into(),
            ));
        }

        let mut names = BTreeSet::new();
        for layer in &self.layers {
            if layer.name.trim().is_empty() {
                return Err(ConfigError::Invalid("layer name may not be empty".into()));
            }
            if !names.insert(layer.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "layer '{}' is defined more than once",
                    layer.name
                )));
            }
            layer.effect_source()?;
            self.content_color(layer)?;
            self.layer_uniforms(layer)?;
        }

        Ok(())
    }
}

impl Layer {
    pub fn effect_source(&self) -> Result<EffectSource, ConfigError> {
        match (&self.sample, &self.shader) {
            (Some(sample), None) => sample
                .parse()
                .map(EffectSource::Sample)
                .map_err(|reason| ConfigError::Invalid(format!("layer '{}': {reason}", self.name))),
            (None, Some(path)) => Ok(EffectSource::Shader(path.clone())),
            (Some(_), Some(_)) => Err(ConfigError::Invalid(format!(
                "layer '{}' sets both 'sample' and 'shader'; choose one",
                self.name
            ))),
            (None, None) => Err(ConfigError::Invalid(format!(
                "layer '{}' must set either 'sample' or 'shader'",
                self.name
            ))),
        }
    }
}
