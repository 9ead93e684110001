//! Time-animated shader effects over arbitrary content.
//!
//! An effect binds a [`ShaderProgram`], its static uniforms, and a shared
//! [`TimeProducer`](frameclock::TimeProducer) into something that decorates
//! any [`Content`]. Each paint the flow is:
//!
//! ```text
//!   DecoratedElement::paint(resolution)
//!          │
//!          ├─▶ Content::render ─────────────▶ content texture
//!          │
//!          └─▶ ShaderEffect::bind ─▶ {time, resolution, ..statics}
//!                                        │
//!                 CompiledShader::evaluate ◀┘ ─▶ composited RGBA frame
//! ```
//!
//! Programs are compiled once at attach time by a [`ShaderRuntime`]: the GPU
//! runtime translates the dialect to GLSL and renders off-screen through
//! `wgpu`, while the software runtime evaluates a program's native
//! [`PixelKernel`] on the CPU. Binding problems are reported at attach time
//! and never during painting.

mod compile;
mod composite;
mod content;
mod effect;
mod error;
mod gpu;
mod program;
mod runtime;
pub mod samples;
mod software;
mod uniforms;

pub use composite::{blend_over, Composite};
pub use content::{Content, ContentSampler, Empty, Fill, ImageContent, Pill};
pub use effect::{
    attach, attach_with_composite, check_bindings, DecoratedElement, MountedElement,
    ShaderEffect,
};
pub use error::{BindingReport, EffectError};
pub use gpu::GpuRuntime;
pub use program::{PixelKernel, ShaderProgram, UniformDecl};
pub use runtime::{select_runtime, CompiledShader, RuntimeChoice, ShaderRuntime};
pub use software::SoftwareRuntime;
pub use uniforms::{
    BoundUniforms, Color, Resolution, UniformKind, UniformSet, UniformValue, CONTENT_UNIFORM,
    RESOLUTION_UNIFORM, TIME_UNIFORM,
};
