//! CPU reference runtime.
//!
//! Evaluates a program through its native [`PixelKernel`]. Output is fully
//! deterministic, which makes this the runtime of choice for tests and the
//! fallback when no GPU adapter exists.

use std::rc::Rc;

use image::{Rgba, RgbaImage};

use crate::composite::Composite;
use crate::content::ContentSampler;
use crate::error::EffectError;
use crate::program::{PixelKernel, ShaderProgram};
use crate::runtime::{CompiledShader, ShaderRuntime};
use crate::uniforms::BoundUniforms;

#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareRuntime;

impl SoftwareRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl ShaderRuntime for SoftwareRuntime {
    fn name(&self) -> &'static str {
        "software"
    }

    fn compile(
        &self,
        program: &ShaderProgram,
        composite: Composite,
    ) -> Result<Box<dyn CompiledShader>, EffectError> {
        let kernel = program.kernel().cloned().ok_or_else(|| {
            EffectError::UnsupportedShaderRuntime(format!(
                "program '{}' has no native pixel kernel for the software runtime",
                program.label()
            ))
        })?;
        tracing::debug!(program = program.label(), ?composite, "prepared software shader");
        Ok(Box::new(SoftwareShader { kernel, composite }))
    }
}

struct SoftwareShader {
    kernel: Rc<dyn PixelKernel>,
    composite: Composite,
}

impl CompiledShader for SoftwareShader {
    fn evaluate(&self, uniforms: &BoundUniforms, content: &RgbaImage) -> RgbaImage {
        let sampler = ContentSampler::new(content);
        let (width, height) = content.dimensions();
        RgbaImage::from_fn(width, height, |x, y| {
            let coord = [x as f32 + 0.5, y as f32 + 0.5];
            let alpha = sampler.alpha_at(x, y) as f32 / 255.0;
            let shaded = self.kernel.shade(coord, uniforms, &sampler);
            Rgba(self.composite.apply(shaded, alpha).to_rgba8())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::{Color, Resolution, UniformSet};

    fn left_half_red(coord: [f32; 2], uniforms: &BoundUniforms, _: &ContentSampler<'_>) -> Color {
        if coord[0] < uniforms.resolution().width as f32 / 2.0 {
            Color::rgba(1.0, 0.0, 0.0, 1.0)
        } else {
            Color::rgba(0.0, 0.0, 1.0, 1.0)
        }
    }

    #[test]
    fn requires_a_native_kernel() {
        let program = ShaderProgram::parse("vec4 main(vec2 p) { return vec4(1.0); }")
            .expect("program")
            .with_label("sourceless");
        let err = SoftwareRuntime::new()
            .compile(&program, Composite::default())
            .err()
            .expect("compile should fail");
        assert!(
            matches!(err, EffectError::UnsupportedShaderRuntime(ref reason) if reason.contains("sourceless"))
        );
    }

    #[test]
    fn shades_pixel_centers() {
        let program = ShaderProgram::parse("vec4 main(vec2 p) { return vec4(1.0); }")
            .expect("program")
            .with_kernel(left_half_red);
        let shader = SoftwareRuntime::new()
            .compile(&program, Composite::Replace)
            .expect("compiled");

        let resolution = Resolution::new(4, 1);
        let uniforms = BoundUniforms::new(UniformSet::new(), resolution);
        let output = shader.evaluate(&uniforms, &RgbaImage::new(4, 1));

        assert_eq!(output.get_pixel(1, 0).0, [255, 0, 0, 255]);
        assert_eq!(output.get_pixel(2, 0).0, [0, 0, 255, 255]);
    }
}
