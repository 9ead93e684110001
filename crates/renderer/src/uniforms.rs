use std::collections::BTreeMap;
use std::fmt;

/// Name of the host-supplied animation time uniform.
pub const TIME_UNIFORM: &str = "time";
/// Name of the host-supplied paint-surface resolution uniform.
pub const RESOLUTION_UNIFORM: &str = "resolution";
/// Name of the implicit content texture sampler.
pub const CONTENT_UNIFORM: &str = "content";

/// Straight (non-premultiplied) RGBA color with channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parses `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('#')?;
        let well_formed = matches!(digits.len(), 6 | 8)
            && digits.chars().all(|c| c.is_ascii_hexdigit());
        if !well_formed {
            return None;
        }
        let channel = |index: usize| u8::from_str_radix(&digits[index..index + 2], 16).ok();
        let alpha = if digits.len() == 8 { channel(6)? } else { 255 };
        Some(Self::from_rgba8([channel(0)?, channel(2)?, channel(4)?, alpha]))
    }

    pub fn from_rgba8(pixel: [u8; 4]) -> Self {
        Self::rgba(
            pixel[0] as f32 / 255.0,
            pixel[1] as f32 / 255.0,
            pixel[2] as f32 / 255.0,
            pixel[3] as f32 / 255.0,
        )
    }

    /// Quantizes to 8 bits per channel, clamping out-of-range values.
    pub fn to_rgba8(self) -> [u8; 4] {
        let quantize = |value: f32| {
            if value.is_nan() {
                0
            } else {
                (value.clamp(0.0, 1.0) * 255.0).round() as u8
            }
        };
        [
            quantize(self.r),
            quantize(self.g),
            quantize(self.b),
            quantize(self.a),
        ]
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Kind of a declared uniform input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Color,
    /// Texture sampler; only the implicit `content` input uses it.
    Shader,
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformKind::Float => f.write_str("float"),
            UniformKind::Vec2 => f.write_str("vec2"),
            UniformKind::Color => f.write_str("color"),
            UniformKind::Shader => f.write_str("shader"),
        }
    }
}

/// Value bound to a uniform name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Color(Color),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Color(_) => UniformKind::Color,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<Color> for UniformValue {
    fn from(value: Color) -> Self {
        UniformValue::Color(value)
    }
}

/// Named uniform values, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSet {
    values: BTreeMap<String, UniformValue>,
}

impl UniformSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<N: Into<String>, V: Into<UniformValue>> FromIterator<(N, V)> for UniformSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut set = UniformSet::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

/// Paint-surface size in physical pixels; both sides are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn as_vec2(&self) -> [f32; 2] {
        [self.width as f32, self.height as f32]
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Complete uniform set handed to a compiled shader for one frame.
///
/// Holds exactly the program's declared value uniforms: host values for
/// `time` and `resolution` when declared, plus the static bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundUniforms {
    values: UniformSet,
    resolution: Resolution,
}

impl BoundUniforms {
    pub(crate) fn new(values: UniformSet, resolution: Resolution) -> Self {
        Self { values, resolution }
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.values.get(name) {
            Some(UniformValue::Float(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn vec2(&self, name: &str) -> Option<[f32; 2]> {
        match self.values.get(name) {
            Some(UniformValue::Vec2(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn color(&self, name: &str) -> Option<Color> {
        match self.values.get(name) {
            Some(UniformValue::Color(value)) => Some(*value),
            _ => None,
        }
    }

    /// The `time` uniform, or 0 when the program does not declare it.
    pub fn time(&self) -> f32 {
        self.float(TIME_UNIFORM).unwrap_or(0.0)
    }

    /// Size of the surface being painted.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name)
    }

    pub fn values(&self) -> &UniformSet {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        let opaque = Color::from_hex("#ff8000").expect("rgb");
        assert_eq!(opaque.to_rgba8(), [255, 128, 0, 255]);

        let translucent = Color::from_hex("#00000080").expect("rgba");
        assert_eq!(translucent.to_rgba8(), [0, 0, 0, 128]);

        assert!(Color::from_hex("ff8000").is_none());
        assert!(Color::from_hex("#ff80").is_none());
        assert!(Color::from_hex("#gg8000").is_none());
    }

    #[test]
    fn quantization_clamps_out_of_range_channels() {
        let color = Color::rgba(1.7, -0.3, f32::NAN, 0.5);
        assert_eq!(color.to_rgba8(), [255, 0, 0, 128]);
    }

    #[test]
    fn uniform_set_iterates_in_name_order() {
        let set = UniformSet::new()
            .with("tl", Color::WHITE)
            .with("br", Color::BLACK)
            .with("scale", 2.0);
        let names: Vec<_> = set.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["br", "scale", "tl"]);
        assert_eq!(set.get("scale").map(UniformValue::kind), Some(UniformKind::Float));
    }

    #[test]
    fn resolution_never_collapses_to_zero() {
        let resolution = Resolution::new(0, 12);
        assert_eq!(resolution, Resolution::new(1, 12));
        assert_eq!(resolution.as_vec2(), [1.0, 12.0]);
    }
}
