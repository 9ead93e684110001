use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::composite::Composite;
use crate::gpu::uniforms::UniformLayout;
use crate::program::{split_uniform_line, strip_comments, ShaderProgram};

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("effect fullscreen vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

/// Wraps an effect program into a GLSL 450 fragment shader and compiles it.
///
/// Validation errors surface through the device error scope opened by the
/// caller, not through this function.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    program: &ShaderProgram,
    layout: &UniformLayout,
    composite: Composite,
) -> wgpu::ShaderModule {
    let wrapped = wrap_effect_fragment(program, layout, composite);
    tracing::trace!(program = program.label(), source = %wrapped, "wrapped effect fragment");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(program.label()),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrapped),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// Produces a self-contained GLSL fragment shader from effect source.
///
/// 1. Blank `#version` directives and uniform declarations, keeping line
///    count so compiler diagnostics still point at the author's lines.
/// 2. Route `content.eval(..)` through the texel-fetch helper.
/// 3. Prepend the header (uniform block, content bindings, type aliases) and
///    append the footer that calls the renamed `main` with the fragment
///    coordinate and applies the composite mode.
pub(crate) fn wrap_effect_fragment(
    program: &ShaderProgram,
    layout: &UniformLayout,
    composite: Composite,
) -> String {
    let stripped = strip_comments(program.source());
    let mut body = String::with_capacity(stripped.len());
    for line in stripped.lines() {
        let keep = !line.trim_start().starts_with("#version") && split_uniform_line(line).is_none();
        if keep {
            body.push_str(&line.replace("content.eval(", "effect_content_eval("));
        }
        body.push('\n');
    }

    let members = layout.glsl_members();
    let gate = match composite {
        Composite::MaskByContent => MASK_GATE,
        Composite::Replace => "",
    };
    format!(
        "{HEADER_PRELUDE}{members}{HEADER_BINDINGS}\n#line 1\n{body}{FOOTER_OPEN}{gate}{FOOTER_CLOSE}"
    )
}

const HEADER_PRELUDE: &str = r"#version 450
layout(location = 0) out vec4 effect_out_color;

layout(std140, set = 0, binding = 0) uniform EffectUniforms {
";

const HEADER_BINDINGS: &str = r"};

layout(set = 0, binding = 1) uniform texture2D effect_content_texture;
layout(set = 0, binding = 2) uniform sampler effect_content_sampler;

vec4 effect_content_eval(vec2 coord) {
    vec2 texel = clamp(floor(coord), vec2(0.0), effect_surface - vec2(1.0));
    return texelFetch(
        sampler2D(effect_content_texture, effect_content_sampler),
        ivec2(texel),
        0
    );
}

#define half float
#define half2 vec2
#define half3 vec3
#define half4 vec4
#define float2 vec2
#define float3 vec3
#define float4 vec4
#define main effect_main
";

const FOOTER_OPEN: &str = r"
#undef main
void main() {
    vec2 effect_coord = gl_FragCoord.xy;
    vec4 color = effect_main(effect_coord);
";

const MASK_GATE: &str = r"    if (effect_content_eval(effect_coord).a <= 0.0) {
        color = vec4(0.0);
    }
";

const FOOTER_CLOSE: &str = r"    effect_out_color = clamp(color, vec4(0.0), vec4(1.0));
}
";

/// Full-screen triangle generated from the vertex index.
const VERTEX_SHADER_GLSL: &str = r"#version 450

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    gl_Position = vec4(positions[vertex_index], 0.0, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    const TINT: &str = r"#version 300 es
uniform float time;
layout(color) uniform half4 tint; // overlay
uniform shader content;
half4 main(float2 coord) {
    half4 base = content.eval(coord);
    return half4(tint.rgb * (0.5 + 0.5 * sin(time)), base.a);
}
";

    fn wrap(composite: Composite) -> String {
        let program = ShaderProgram::parse(TINT).expect("program");
        let layout = UniformLayout::for_program(&program);
        wrap_effect_fragment(&program, &layout, composite)
    }

    #[test]
    fn wrap_replaces_declarations_with_block_members() {
        let wrapped = wrap(Composite::MaskByContent);
        assert_eq!(wrapped.matches("#version").count(), 1);
        assert!(!wrapped.contains("uniform float time;"));
        assert!(!wrapped.contains("uniform shader content"));
        assert!(wrapped.contains("    float time;\n"));
        assert!(wrapped.contains("    vec4 tint;\n"));
        assert!(wrapped.contains("    vec2 effect_surface;\n"));
        assert!(wrapped.contains("effect_content_eval(coord)"));
        assert!(!wrapped.contains("content.eval"));
    }

    #[test]
    fn wrap_keeps_author_line_numbers() {
        let wrapped = wrap(Composite::Replace);
        let (_, body) = wrapped.split_once("#line 1\n").expect("line directive");
        let main_line = body
            .lines()
            .position(|line| line.starts_with("half4 main"))
            .expect("entry point");
        assert_eq!(main_line, 4);
    }

    #[test]
    fn composite_mode_controls_the_alpha_gate() {
        assert!(wrap(Composite::MaskByContent).contains("effect_content_eval(effect_coord).a <= 0.0"));
        assert!(!wrap(Composite::Replace).contains("effect_content_eval(effect_coord)"));
    }
}
