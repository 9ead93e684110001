//! Headless wgpu runtime.
//!
//! - `context` owns the instance, adapter, and device; no surface is created.
//! - `uniforms` lays declared uniforms out as a std140 block.
//! - `pipeline` compiles the wrapped GLSL and renders one frame per call,
//!   reading the target texture back into an image.

mod context;
mod pipeline;
pub(crate) mod uniforms;

use std::rc::Rc;

use image::RgbaImage;

use crate::composite::Composite;
use crate::error::EffectError;
use crate::program::ShaderProgram;
use crate::runtime::{CompiledShader, ShaderRuntime};
use crate::uniforms::BoundUniforms;

use context::GpuContext;
use pipeline::EffectPipeline;
use uniforms::UniformLayout;

/// Runtime backed by the first available GPU adapter.
pub struct GpuRuntime {
    context: Rc<GpuContext>,
}

impl GpuRuntime {
    /// Opens a headless device; fails with
    /// [`EffectError::UnsupportedShaderRuntime`] when no adapter is usable.
    pub fn new() -> Result<Self, EffectError> {
        let context = GpuContext::new()
            .map_err(|err| EffectError::UnsupportedShaderRuntime(format!("{err:#}")))?;
        tracing::info!(adapter = %context.adapter_name, "GPU runtime ready");
        Ok(Self {
            context: Rc::new(context),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.context.adapter_name
    }
}

impl std::fmt::Debug for GpuRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuRuntime")
            .field("adapter", &self.context.adapter_name)
            .finish()
    }
}

impl ShaderRuntime for GpuRuntime {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn compile(
        &self,
        program: &ShaderProgram,
        composite: Composite,
    ) -> Result<Box<dyn CompiledShader>, EffectError> {
        let layout = UniformLayout::for_program(program);
        let (pipeline, error) = self
            .context
            .validated(|| EffectPipeline::new(&self.context, program, &layout, composite));
        if let Some(error) = error {
            return Err(EffectError::UnsupportedShaderRuntime(format!(
                "program '{}' failed to compile for the GPU runtime: {error}",
                program.label()
            )));
        }
        tracing::debug!(
            program = program.label(),
            uniform_bytes = layout.size(),
            ?composite,
            "compiled GPU shader"
        );
        Ok(Box::new(GpuShader {
            context: Rc::clone(&self.context),
            pipeline,
            layout,
            label: program.label().to_string(),
        }))
    }
}

struct GpuShader {
    context: Rc<GpuContext>,
    pipeline: EffectPipeline,
    layout: UniformLayout,
    label: String,
}

impl CompiledShader for GpuShader {
    fn evaluate(&self, uniforms: &BoundUniforms, content: &RgbaImage) -> RgbaImage {
        let bytes = self.layout.pack(uniforms);
        let (result, error) = self
            .context
            .validated(|| self.pipeline.render(&self.context, &bytes, content));
        let failure = match (result, error) {
            (Ok(image), None) => return image,
            (Ok(_), Some(error)) => error.to_string(),
            (Err(err), _) => format!("{err:#}"),
        };
        tracing::error!(
            program = %self.label,
            error = %failure,
            "GPU evaluation failed; painting content undecorated"
        );
        content.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Empty, Pill};
    use crate::effect::attach_with_composite;
    use crate::samples::{self, BlueWebVariant};
    use crate::software::SoftwareRuntime;
    use crate::uniforms::{Color, Resolution, UniformSet};
    use frameclock::{FixedTimeProducer, TimeProducer};

    const MAX_CHANNEL_DIFFERENCE: u8 = 2;

    fn paint_on(
        runtime: &dyn ShaderRuntime,
        program: ShaderProgram,
        statics: UniformSet,
        composite: Composite,
        pill: bool,
    ) -> RgbaImage {
        let time: Rc<dyn TimeProducer> = Rc::new(FixedTimeProducer::new(2.5));
        let resolution = Resolution::new(97, 31);
        if pill {
            let element = Pill::new(Color::WHITE);
            attach_with_composite(element, program, statics, time, composite, runtime)
                .expect("attach")
                .paint(resolution)
        } else {
            attach_with_composite(Empty, program, statics, time, composite, runtime)
                .expect("attach")
                .paint(resolution)
        }
    }

    fn max_difference(a: &RgbaImage, b: &RgbaImage) -> u8 {
        assert_eq!(a.dimensions(), b.dimensions());
        a.as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(x, y)| x.abs_diff(*y))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn samples_match_the_software_runtime() {
        let Ok(gpu) = GpuRuntime::new() else {
            // No adapter on this machine.
            return;
        };
        let software = SoftwareRuntime::new();
        let gradient_statics = UniformSet::new()
            .with("tl", Color::rgba(0.4, 0.31, 0.64, 1.0))
            .with("br", Color::rgba(1.0, 0.98, 1.0, 1.0));

        let cases = [
            (
                "gradient",
                samples::gradient().expect("sample"),
                gradient_statics,
                Composite::Replace,
                false,
            ),
            (
                "blue-web",
                samples::blue_web(BlueWebVariant::Corrected).expect("sample"),
                UniformSet::new(),
                Composite::MaskByContent,
                true,
            ),
            (
                "blue-web-plain",
                samples::blue_web(BlueWebVariant::Plain).expect("sample"),
                UniformSet::new(),
                Composite::MaskByContent,
                true,
            ),
        ];
        for (name, program, statics, composite, pill) in cases {
            let expected = paint_on(&software, program.clone(), statics.clone(), composite, pill);
            let actual = paint_on(&gpu, program, statics, composite, pill);
            let difference = max_difference(&expected, &actual);
            assert!(
                difference <= MAX_CHANNEL_DIFFERENCE,
                "{name}: GPU output differs from software by {difference}"
            );
        }
    }

    #[test]
    fn invalid_glsl_is_reported_as_unsupported() {
        let Ok(runtime) = GpuRuntime::new() else {
            // No adapter on this machine.
            return;
        };
        let program = ShaderProgram::parse("vec4 main(vec2 p) { return undefined_call(p); }")
            .expect("program")
            .with_label("broken");
        let err = runtime
            .compile(&program, Composite::Replace)
            .err()
            .expect("compile should fail");
        assert!(
            matches!(err, EffectError::UnsupportedShaderRuntime(ref reason) if reason.contains("broken"))
        );
    }
}
