//! Effect shader programs and their declared uniform interface.
//!
//! Programs are written in a small SkSL-like dialect:
//!
//! ```text
//! uniform float time;
//! uniform vec2 resolution;
//! layout(color) uniform float4 tint;
//! uniform shader content;
//!
//! half4 main(vec2 coord) {
//!     half4 base = content.eval(coord);
//!     return half4(tint.rgb, base.a);
//! }
//! ```
//!
//! Parsing only extracts what the host needs to bind inputs: one
//! [`UniformDecl`] per declared uniform and the presence of a single `main`
//! entry point. Anything else is left to the runtime that compiles the
//! program.

use std::fmt;
use std::rc::Rc;

use crate::content::ContentSampler;
use crate::error::EffectError;
use crate::uniforms::{
    BoundUniforms, Color, UniformKind, CONTENT_UNIFORM, RESOLUTION_UNIFORM, TIME_UNIFORM,
};

/// Native implementation of a program's pixel function.
///
/// The software runtime evaluates programs through their kernel; it receives
/// pixel-center coordinates with a top-left origin.
pub trait PixelKernel {
    fn shade(&self, coord: [f32; 2], uniforms: &BoundUniforms, content: &ContentSampler<'_>)
        -> Color;
}

impl<F> PixelKernel for F
where
    F: Fn([f32; 2], &BoundUniforms, &ContentSampler<'_>) -> Color,
{
    fn shade(
        &self,
        coord: [f32; 2],
        uniforms: &BoundUniforms,
        content: &ContentSampler<'_>,
    ) -> Color {
        self(coord, uniforms, content)
    }
}

/// One `uniform` declaration found in the program source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
    /// Declared with a `layout(color)` qualifier.
    pub color_layout: bool,
    /// Zero-based source line of the declaration.
    pub line: usize,
}

impl UniformDecl {
    /// True for the uniforms the host injects (`time`, `resolution`,
    /// `content`) rather than the caller.
    pub fn is_host_supplied(&self) -> bool {
        is_reserved(&self.name)
    }
}

pub(crate) fn is_reserved(name: &str) -> bool {
    name == TIME_UNIFORM || name == RESOLUTION_UNIFORM || name == CONTENT_UNIFORM
}

/// Immutable shader source plus its parsed uniform interface.
#[derive(Clone)]
pub struct ShaderProgram {
    label: String,
    source: Rc<str>,
    uniforms: Vec<UniformDecl>,
    kernel: Option<Rc<dyn PixelKernel>>,
}

impl ShaderProgram {
    /// Parses `source`, failing with [`EffectError::InvalidProgram`] when the
    /// declarations or entry point are malformed.
    pub fn parse(source: impl Into<String>) -> Result<Self, EffectError> {
        let source: String = source.into();
        let stripped = strip_comments(&source);
        let uniforms = parse_uniforms(&stripped)?;
        validate_reserved(&uniforms)?;
        match count_entry_points(&stripped) {
            0 => return Err(invalid("missing entry point `main(vec2)` returning a 4-vector")),
            1 => {}
            count => return Err(invalid(format!("found {count} entry points named `main`"))),
        }
        Ok(Self {
            label: "effect".to_string(),
            source: Rc::from(source),
            uniforms,
            kernel: None,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Attaches a native pixel function mirroring the source, enabling the
    /// software runtime.
    pub fn with_kernel(mut self, kernel: impl PixelKernel + 'static) -> Self {
        self.kernel = Some(Rc::new(kernel));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Declared uniforms in source order.
    pub fn uniforms(&self) -> &[UniformDecl] {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<&UniformDecl> {
        self.uniforms.iter().find(|decl| decl.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.uniform(name).is_some()
    }

    /// Uniforms the caller has to bind at attach time.
    pub fn static_uniforms(&self) -> impl Iterator<Item = &UniformDecl> {
        self.uniforms.iter().filter(|decl| !decl.is_host_supplied())
    }

    pub fn kernel(&self) -> Option<&Rc<dyn PixelKernel>> {
        self.kernel.as_ref()
    }
}

impl fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("label", &self.label)
            .field("uniforms", &self.uniforms)
            .field("has_kernel", &self.kernel.is_some())
            .finish()
    }
}

fn invalid(reason: impl Into<String>) -> EffectError {
    EffectError::InvalidProgram(reason.into())
}

/// Blanks out `//` and `/* */` comments, keeping line breaks so line numbers
/// still match the author's source.
pub(crate) fn strip_comments(source: &str) -> String {
    let mut output = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_line = false;
    let mut in_block = false;
    while let Some(c) = chars.next() {
        if in_line {
            if c == '\n' {
                in_line = false;
                output.push('\n');
            }
            continue;
        }
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
                output.push(' ');
            } else if c == '\n' {
                output.push('\n');
            }
            continue;
        }
        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    in_line = true;
                    continue;
                }
                Some('*') => {
                    chars.next();
                    in_block = true;
                    continue;
                }
                _ => {}
            }
        }
        output.push(c);
    }
    output
}

/// Splits a declaration line into its `layout(...)` qualifier (if any) and
/// the remainder after `uniform `; `None` when the line declares no uniform.
pub(crate) fn split_uniform_line(line: &str) -> Option<(Option<&str>, &str)> {
    let mut rest = line.trim_start();
    let mut layout = None;
    if let Some(after) = rest.strip_prefix("layout") {
        let after = after.trim_start().strip_prefix('(')?;
        let close = after.find(')')?;
        layout = Some(after[..close].trim());
        rest = after[close + 1..].trim_start();
    }
    let declaration = rest.strip_prefix("uniform")?;
    if !declaration.starts_with(char::is_whitespace) {
        return None;
    }
    Some((layout, declaration.trim_start()))
}

fn parse_uniforms(stripped: &str) -> Result<Vec<UniformDecl>, EffectError> {
    let mut uniforms: Vec<UniformDecl> = Vec::new();
    for (line_index, line) in stripped.lines().enumerate() {
        let Some((layout, declaration)) = split_uniform_line(line) else {
            continue;
        };
        let statement = declaration
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        if !declaration.contains(';') {
            return Err(invalid(format!(
                "line {}: uniform declaration must end with `;` on the same line",
                line_index + 1
            )));
        }

        let mut words = statement.split_whitespace().peekable();
        if matches!(words.peek(), Some(&("lowp" | "mediump" | "highp"))) {
            words.next();
        }
        let type_name = words
            .next()
            .ok_or_else(|| invalid(format!("line {}: missing uniform type", line_index + 1)))?;
        let names = words.collect::<Vec<_>>().join(" ");
        let color_layout = layout.is_some_and(|qualifiers| {
            qualifiers
                .split(',')
                .any(|qualifier| qualifier.trim() == "color")
        });

        for name in names.split(',').map(str::trim) {
            if !is_identifier(name) {
                return Err(invalid(format!(
                    "line {}: invalid uniform name `{name}`",
                    line_index + 1
                )));
            }
            let kind = map_type(type_name).ok_or_else(|| {
                invalid(format!(
                    "line {}: unsupported uniform type `{type_name}` for `{name}`",
                    line_index + 1
                ))
            })?;
            if uniforms.iter().any(|existing| existing.name == name) {
                return Err(invalid(format!("uniform `{name}` declared more than once")));
            }
            uniforms.push(UniformDecl {
                name: name.to_string(),
                kind,
                color_layout,
                line: line_index,
            });
        }
    }
    Ok(uniforms)
}

fn map_type(type_name: &str) -> Option<UniformKind> {
    match type_name {
        "float" | "half" => Some(UniformKind::Float),
        "vec2" | "float2" | "half2" => Some(UniformKind::Vec2),
        "vec4" | "float4" | "half4" => Some(UniformKind::Color),
        "shader" => Some(UniformKind::Shader),
        _ => None,
    }
}

fn validate_reserved(uniforms: &[UniformDecl]) -> Result<(), EffectError> {
    for decl in uniforms {
        let expected = match decl.name.as_str() {
            TIME_UNIFORM => Some(UniformKind::Float),
            RESOLUTION_UNIFORM => Some(UniformKind::Vec2),
            CONTENT_UNIFORM => Some(UniformKind::Shader),
            _ => None,
        };
        match expected {
            Some(kind) if kind != decl.kind => {
                return Err(invalid(format!(
                    "`{}` is reserved and must be declared as {kind}, found {}",
                    decl.name, decl.kind
                )));
            }
            None if decl.kind == UniformKind::Shader => {
                return Err(invalid(format!(
                    "shader uniform `{}` is not supported; the only sampler is `{CONTENT_UNIFORM}`",
                    decl.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Counts `<4-vector type> main (` definitions.
fn count_entry_points(stripped: &str) -> usize {
    let bytes = stripped.as_bytes();
    let mut count = 0;
    let mut search_from = 0;
    while let Some(offset) = stripped[search_from..].find("main") {
        let start = search_from + offset;
        let end = start + "main".len();
        search_from = end;

        let preceded_by_ident = start > 0 && is_identifier_char(bytes[start - 1] as char);
        let followed_by_ident = end < bytes.len() && is_identifier_char(bytes[end] as char);
        if preceded_by_ident || followed_by_ident {
            continue;
        }
        if !stripped[end..].trim_start().starts_with('(') {
            continue;
        }
        let return_type = stripped[..start]
            .trim_end()
            .rsplit(|c: char| !is_identifier_char(c))
            .next()
            .unwrap_or_default();
        if matches!(return_type, "vec4" | "half4" | "float4") {
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINTED: &str = r"
        uniform float time;          // seconds
        uniform vec2 resolution;
        layout(color) uniform float4 tint;
        uniform shader content;

        /* block comment mentioning half4 main(vec2 p) */
        half4 main(vec2 coord) {
            return half4(tint.rgb, content.eval(coord).a);
        }
    ";

    #[test]
    fn parses_declared_uniforms_in_order() {
        let program = ShaderProgram::parse(TINTED).expect("program");
        let names: Vec<_> = program.uniforms().iter().map(|decl| decl.name.as_str()).collect();
        assert_eq!(names, vec!["time", "resolution", "tint", "content"]);

        let tint = program.uniform("tint").expect("tint");
        assert_eq!(tint.kind, UniformKind::Color);
        assert!(tint.color_layout);
        assert_eq!(tint.line, 3);

        let statics: Vec<_> = program.static_uniforms().map(|decl| decl.name.as_str()).collect();
        assert_eq!(statics, vec!["tint"]);
    }

    #[test]
    fn accepts_comma_separated_declarations() {
        let program = ShaderProgram::parse(
            "uniform half2 offset, scale;\nfloat4 main(float2 p) { return float4(offset, scale); }",
        )
        .expect("program");
        assert_eq!(program.uniforms().len(), 2);
        assert!(program
            .uniforms()
            .iter()
            .all(|decl| decl.kind == UniformKind::Vec2 && decl.line == 0));
    }

    #[test]
    fn ignores_commented_out_declarations() {
        let program = ShaderProgram::parse(
            "// uniform float ghost;\nuniform float time;\nvec4 main(vec2 p) { return vec4(time); }",
        )
        .expect("program");
        assert!(!program.declares("ghost"));
        assert!(program.declares("time"));
    }

    #[test]
    fn rejects_unsupported_types() {
        let err = ShaderProgram::parse("uniform vec3 axis;\nvec4 main(vec2 p) { return vec4(0); }")
            .unwrap_err();
        assert!(matches!(err, EffectError::InvalidProgram(ref reason) if reason.contains("vec3")));
    }

    #[test]
    fn rejects_misdeclared_reserved_uniforms() {
        let err =
            ShaderProgram::parse("uniform vec2 time;\nvec4 main(vec2 p) { return vec4(0); }")
                .unwrap_err();
        assert!(matches!(err, EffectError::InvalidProgram(_)));

        let err =
            ShaderProgram::parse("uniform shader image;\nvec4 main(vec2 p) { return vec4(0); }")
                .unwrap_err();
        assert!(matches!(err, EffectError::InvalidProgram(ref reason) if reason.contains("image")));
    }

    #[test]
    fn rejects_duplicates() {
        let err = ShaderProgram::parse(
            "uniform float a;\nuniform float a;\nvec4 main(vec2 p) { return vec4(a); }",
        )
        .unwrap_err();
        assert!(matches!(err, EffectError::InvalidProgram(ref reason) if reason.contains("more than once")));
    }

    #[test]
    fn requires_exactly_one_entry_point() {
        let missing = ShaderProgram::parse("uniform float time;\nvec4 domain(vec2 p);");
        assert!(matches!(missing, Err(EffectError::InvalidProgram(_))));

        let doubled = ShaderProgram::parse(
            "vec4 main(vec2 p) { return vec4(0); }\nhalf4 main(vec2 p) { return half4(0); }",
        );
        assert!(matches!(doubled, Err(EffectError::InvalidProgram(_))));
    }

    #[test]
    fn uniform_keyword_needs_a_word_boundary() {
        assert!(split_uniform_line("uniformity = 1.0;").is_none());
        assert_eq!(
            split_uniform_line("  layout(color) uniform half4 tl;"),
            Some((Some("color"), "half4 tl;"))
        );
    }
}
