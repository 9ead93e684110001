//! Bundled effect programs.
//!
//! Each sample pairs dialect source with a native kernel computing the same
//! pixel function, so it runs on either runtime.

use std::fmt;
use std::str::FromStr;

use crate::content::ContentSampler;
use crate::error::EffectError;
use crate::program::{PixelKernel, ShaderProgram};
use crate::uniforms::{BoundUniforms, Color};

/// How the blue web derives its ray direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlueWebVariant {
    /// Aspect-corrected, normalized direction.
    #[default]
    Corrected,
    /// Raw `uv - 0.5` direction with no normalization.
    Plain,
}

/// Named sample, as selected from the command line or a scene file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    BlueWeb(BlueWebVariant),
    Gradient,
}

impl Sample {
    pub const NAMES: [&'static str; 3] = ["blue-web", "blue-web-plain", "gradient"];

    pub fn name(self) -> &'static str {
        match self {
            Sample::BlueWeb(BlueWebVariant::Corrected) => "blue-web",
            Sample::BlueWeb(BlueWebVariant::Plain) => "blue-web-plain",
            Sample::Gradient => "gradient",
        }
    }

    pub fn program(self) -> Result<ShaderProgram, EffectError> {
        match self {
            Sample::BlueWeb(variant) => blue_web(variant),
            Sample::Gradient => gradient(),
        }
    }
}

impl FromStr for Sample {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blue-web" | "blueweb" => Ok(Sample::BlueWeb(BlueWebVariant::Corrected)),
            "blue-web-plain" => Ok(Sample::BlueWeb(BlueWebVariant::Plain)),
            "gradient" => Ok(Sample::Gradient),
            other => Err(format!(
                "unknown sample '{other}'; expected one of {}",
                Sample::NAMES.join(", ")
            )),
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const BLUE_WEB_PRELUDE: &str = r"uniform float time;
uniform vec2 resolution;
uniform shader content;

float f(vec3 p) {
    p.z -= time;
    float a = p.z * 0.1;
    float cosa = cos(a);
    float sina = sin(a);
    vec2 rotated = vec2(p.x * cosa + p.y * sina, -p.x * sina + p.y * cosa);
    return 0.1 - length(cos(rotated) + sin(p.yz));
}

half4 main(vec2 coord) {
    vec2 uv = coord / resolution;
    half4 base = content.eval(coord);
    if (base.a == 0.0) {
        return base;
    }
";

const BLUE_WEB_CORRECTED: &str = r"    float aspect = resolution.x / resolution.y;
    vec3 d = normalize(vec3((uv.x - 0.5) * aspect, uv.y - 0.5, 0.5));
";

const BLUE_WEB_PLAIN: &str = r"    vec3 d = vec3(uv - 0.5, 0.5);
";

const BLUE_WEB_MARCH: &str = r"    vec3 p = vec3(0.0);
    for (int i = 0; i < 32; i++) {
        float dist = f(p);
        p += dist * d;
        if (abs(dist) < 0.001) {
            break;
        }
    }
    vec3 color = (sin(p) + vec3(2.0, 5.0, 9.0)) / length(p);
    return half4(color, base.a);
}
";

const GRADIENT_SOURCE: &str = r"uniform float2 resolution;
layout(color) uniform float4 tl;
layout(color) uniform float4 br;
uniform shader content;

float4 main(float2 coord) {
    float2 uv = coord / resolution.xy;
    float d = distance(uv, float2(0.0, 0.0));
    return tl * (1.0 - d) + br * d;
}
";

const MARCH_STEPS: usize = 32;
const MARCH_EPSILON: f32 = 0.001;

/// Ray-marched rotating lattice, tinted blue, drawn only where the content
/// is visible.
pub fn blue_web(variant: BlueWebVariant) -> Result<ShaderProgram, EffectError> {
    let direction = match variant {
        BlueWebVariant::Corrected => BLUE_WEB_CORRECTED,
        BlueWebVariant::Plain => BLUE_WEB_PLAIN,
    };
    let source = format!("{BLUE_WEB_PRELUDE}{direction}{BLUE_WEB_MARCH}");
    let label = Sample::BlueWeb(variant).name();
    Ok(ShaderProgram::parse(source)?
        .with_label(label)
        .with_kernel(BlueWebKernel { variant }))
}

/// Diagonal blend from `tl` at the top-left corner to `br` one surface
/// diagonal away.
pub fn gradient() -> Result<ShaderProgram, EffectError> {
    Ok(ShaderProgram::parse(GRADIENT_SOURCE)?
        .with_label("gradient")
        .with_kernel(gradient_kernel))
}

struct BlueWebKernel {
    variant: BlueWebVariant,
}

impl PixelKernel for BlueWebKernel {
    fn shade(
        &self,
        coord: [f32; 2],
        uniforms: &BoundUniforms,
        content: &ContentSampler<'_>,
    ) -> Color {
        let base = content.eval(coord);
        if base.a == 0.0 {
            return base;
        }
        let [width, height] = uniforms.resolution().as_vec2();
        let uv = [coord[0] / width, coord[1] / height];
        let d = match self.variant {
            BlueWebVariant::Corrected => {
                let aspect = width / height;
                normalize([(uv[0] - 0.5) * aspect, uv[1] - 0.5, 0.5])
            }
            BlueWebVariant::Plain => [uv[0] - 0.5, uv[1] - 0.5, 0.5],
        };

        let time = uniforms.time();
        let mut p = [0.0f32; 3];
        for _ in 0..MARCH_STEPS {
            let dist = lattice_distance(p, time);
            for axis in 0..3 {
                p[axis] += dist * d[axis];
            }
            if dist.abs() < MARCH_EPSILON {
                break;
            }
        }

        let inv_len = 1.0 / length(p);
        Color::rgba(
            (p[0].sin() + 2.0) * inv_len,
            (p[1].sin() + 5.0) * inv_len,
            (p[2].sin() + 9.0) * inv_len,
            base.a,
        )
    }
}

fn lattice_distance(mut p: [f32; 3], time: f32) -> f32 {
    p[2] -= time;
    let (sina, cosa) = (p[2] * 0.1).sin_cos();
    let rotated = [p[0] * cosa + p[1] * sina, -p[0] * sina + p[1] * cosa];
    let x = rotated[0].cos() + p[1].sin();
    let y = rotated[1].cos() + p[2].sin();
    0.1 - (x * x + y * y).sqrt()
}

fn gradient_kernel(coord: [f32; 2], uniforms: &BoundUniforms, _: &ContentSampler<'_>) -> Color {
    let [width, height] = uniforms.resolution().as_vec2();
    let uv = [coord[0] / width, coord[1] / height];
    let d = (uv[0] * uv[0] + uv[1] * uv[1]).sqrt();
    let tl = uniforms.color("tl").unwrap_or_default().to_array();
    let br = uniforms.color("br").unwrap_or_default().to_array();
    let mix = |channel: usize| tl[channel] * (1.0 - d) + br[channel] * d;
    Color::rgba(mix(0), mix(1), mix(2), mix(3))
}

fn length(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = length(v);
    if len == 0.0 {
        return v;
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use frameclock::FixedTimeProducer;
    use image::RgbaImage;

    use super::*;
    use crate::composite::Composite;
    use crate::content::{Content, Empty, Fill, Pill};
    use crate::effect::{attach, attach_with_composite};
    use crate::software::SoftwareRuntime;
    use crate::uniforms::{Resolution, UniformSet};

    fn palette() -> UniformSet {
        UniformSet::new()
            .with("tl", Color::rgba(1.0, 0.0, 0.0, 1.0))
            .with("br", Color::rgba(0.0, 0.0, 1.0, 1.0))
    }

    #[test]
    fn sample_names_round_trip() {
        for name in Sample::NAMES {
            let sample: Sample = name.parse().expect("known sample");
            assert_eq!(sample.name(), name);
        }
        assert!("plasma".parse::<Sample>().is_err());
    }

    #[test]
    fn gradient_asks_only_for_theme_colors() {
        let program = gradient().expect("sample");
        let statics: Vec<_> = program.static_uniforms().map(|decl| decl.name.as_str()).collect();
        assert_eq!(statics, ["tl", "br"]);
        assert!(program.uniform("tl").is_some_and(|decl| decl.color_layout));
        assert!(!program.declares("time"));
    }

    #[test]
    fn gradient_runs_from_top_left_to_bottom_right() {
        let decorated = attach_with_composite(
            Empty,
            gradient().expect("sample"),
            palette(),
            Rc::new(FixedTimeProducer::new(0.0)),
            Composite::Replace,
            &SoftwareRuntime::new(),
        )
        .expect("attach");
        let frame = decorated.paint(Resolution::new(100, 100));

        let corner = frame.get_pixel(0, 0).0;
        assert!(corner[0] > 250 && corner[2] < 5, "top-left is tl: {corner:?}");
        // d = 1 along the top edge's far end.
        let edge = frame.get_pixel(99, 0).0;
        assert!(edge[0] < 5 && edge[2] > 250, "one unit away is br: {edge:?}");
        assert_eq!(corner[3], 255);
    }

    #[test]
    fn blue_web_needs_no_static_uniforms() {
        for variant in [BlueWebVariant::Corrected, BlueWebVariant::Plain] {
            let program = blue_web(variant).expect("sample");
            assert_eq!(program.static_uniforms().count(), 0);
            assert!(program.declares("time"));
            assert!(program.declares("resolution"));
            assert!(program.declares("content"));
        }
    }

    #[test]
    fn blue_web_keeps_transparent_corners_of_the_pill() {
        let pill = Pill::new(Color::WHITE);
        let resolution = Resolution::new(64, 24);
        let decorated = attach(
            pill,
            blue_web(BlueWebVariant::Corrected).expect("sample"),
            UniformSet::new(),
            Rc::new(FixedTimeProducer::new(1000.0)),
            &SoftwareRuntime::new(),
        )
        .expect("attach");

        let frame = decorated.paint(resolution);
        let content = Pill::new(Color::WHITE).render(resolution);
        assert_eq!(frame.get_pixel(0, 0).0[3], 0);
        assert_eq!(content.get_pixel(0, 0).0[3], 0);
        let center = frame.get_pixel(32, 12).0;
        assert_eq!(center[3], content.get_pixel(32, 12).0[3]);
        assert!(center[2] >= center[0], "web is blue-dominant: {center:?}");
    }

    #[test]
    fn blue_web_is_deterministic_for_a_fixed_time() {
        let paint = |time: f32| -> RgbaImage {
            attach(
                Fill::new(Color::WHITE),
                blue_web(BlueWebVariant::Corrected).expect("sample"),
                UniformSet::new(),
                Rc::new(FixedTimeProducer::new(time)),
                &SoftwareRuntime::new(),
            )
            .expect("attach")
            .paint(Resolution::new(32, 16))
        };
        assert_eq!(paint(2.5), paint(2.5));
        assert_ne!(paint(2.5), paint(40.0));
    }

    #[test]
    fn variants_differ_on_wide_surfaces() {
        let paint = |variant| {
            attach(
                Fill::new(Color::WHITE),
                blue_web(variant).expect("sample"),
                UniformSet::new(),
                Rc::new(FixedTimeProducer::new(3.0)),
                &SoftwareRuntime::new(),
            )
            .expect("attach")
            .paint(Resolution::new(48, 12))
        };
        assert_ne!(
            paint(BlueWebVariant::Corrected),
            paint(BlueWebVariant::Plain)
        );
    }
}
