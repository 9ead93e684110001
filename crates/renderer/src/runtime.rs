use std::fmt;
use std::str::FromStr;

use image::RgbaImage;

use crate::composite::Composite;
use crate::error::EffectError;
use crate::gpu::GpuRuntime;
use crate::program::ShaderProgram;
use crate::software::SoftwareRuntime;
use crate::uniforms::BoundUniforms;

/// Host capability that turns a program into something paintable.
pub trait ShaderRuntime {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Prepares `program` for per-frame evaluation.
    ///
    /// Fails with [`EffectError::UnsupportedShaderRuntime`] when this runtime
    /// cannot run the program.
    fn compile(
        &self,
        program: &ShaderProgram,
        composite: Composite,
    ) -> Result<Box<dyn CompiledShader>, EffectError>;
}

/// A program ready to be evaluated once per frame.
pub trait CompiledShader {
    /// Evaluates the pixel function for every pixel of `content`, which has
    /// already been rendered at `uniforms.resolution()`.
    fn evaluate(&self, uniforms: &BoundUniforms, content: &RgbaImage) -> RgbaImage;
}

/// Which runtime the caller would like to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeChoice {
    /// GPU when an adapter is available, software otherwise.
    #[default]
    Auto,
    Gpu,
    Software,
}

impl FromStr for RuntimeChoice {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(RuntimeChoice::Auto),
            "gpu" | "wgpu" => Ok(RuntimeChoice::Gpu),
            "software" | "cpu" => Ok(RuntimeChoice::Software),
            other => Err(format!(
                "unknown runtime '{other}'; expected auto, gpu, or software"
            )),
        }
    }
}

impl fmt::Display for RuntimeChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeChoice::Auto => f.write_str("auto"),
            RuntimeChoice::Gpu => f.write_str("gpu"),
            RuntimeChoice::Software => f.write_str("software"),
        }
    }
}

/// Builds the runtime requested by `choice`.
pub fn select_runtime(choice: RuntimeChoice) -> Result<Box<dyn ShaderRuntime>, EffectError> {
    match choice {
        RuntimeChoice::Software => Ok(Box::new(SoftwareRuntime::new())),
        RuntimeChoice::Gpu => Ok(Box::new(GpuRuntime::new()?)),
        RuntimeChoice::Auto => match GpuRuntime::new() {
            Ok(runtime) => Ok(Box::new(runtime)),
            Err(err) => {
                tracing::warn!(error = %err, "GPU runtime unavailable; using software runtime");
                Ok(Box::new(SoftwareRuntime::new()))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_runtime_names() {
        assert_eq!("AUTO".parse::<RuntimeChoice>(), Ok(RuntimeChoice::Auto));
        assert_eq!("wgpu".parse::<RuntimeChoice>(), Ok(RuntimeChoice::Gpu));
        assert_eq!("cpu".parse::<RuntimeChoice>(), Ok(RuntimeChoice::Software));
        assert!("metal".parse::<RuntimeChoice>().is_err());
    }

    #[test]
    fn software_selection_never_touches_the_gpu() {
        let runtime = select_runtime(RuntimeChoice::Software).expect("software runtime");
        assert_eq!(runtime.name(), "software");
    }
}
