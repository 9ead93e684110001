//! std140 layout of the generated uniform block.
//!
//! Value uniforms keep their declaration order. One hidden `vec2` carrying the
//! surface size is appended so the content sampling helper can clamp texel
//! coordinates without relying on `resolution` being declared.

use crate::program::ShaderProgram;
use crate::uniforms::{BoundUniforms, UniformKind, UniformValue};

/// Name of the hidden member holding the paint-surface size.
pub(crate) const SURFACE_MEMBER: &str = "effect_surface";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LayoutField {
    pub name: String,
    pub kind: UniformKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UniformLayout {
    fields: Vec<LayoutField>,
    size: usize,
}

impl UniformLayout {
    pub fn for_program(program: &ShaderProgram) -> Self {
        let mut fields = Vec::new();
        let mut cursor: usize = 0;
        let members = program
            .uniforms()
            .iter()
            .filter(|decl| decl.kind != UniformKind::Shader)
            .map(|decl| (decl.name.clone(), decl.kind))
            .chain(std::iter::once((SURFACE_MEMBER.to_string(), UniformKind::Vec2)));
        for (name, kind) in members {
            let (align, size) = std140_extent(kind);
            let offset = cursor.next_multiple_of(align);
            fields.push(LayoutField { name, kind, offset });
            cursor = offset + size;
        }
        Self {
            fields,
            size: cursor.next_multiple_of(16),
        }
    }

    #[cfg(test)]
    pub fn fields(&self) -> &[LayoutField] {
        &self.fields
    }

    /// Byte size of the block, a multiple of 16.
    pub fn size(&self) -> usize {
        self.size
    }

    /// GLSL member declarations for the block body.
    pub fn glsl_members(&self) -> String {
        let mut members = String::new();
        for field in &self.fields {
            let glsl_type = match field.kind {
                UniformKind::Float => "float",
                UniformKind::Vec2 => "vec2",
                UniformKind::Color => "vec4",
                UniformKind::Shader => continue,
            };
            members.push_str(&format!("    {glsl_type} {};\n", field.name));
        }
        members
    }

    /// Packs `uniforms` into block-sized bytes.
    pub fn pack(&self, uniforms: &BoundUniforms) -> Vec<u8> {
        let mut words = vec![0.0f32; self.size / 4];
        for field in &self.fields {
            let index = field.offset / 4;
            if field.name == SURFACE_MEMBER {
                let [width, height] = uniforms.resolution().as_vec2();
                words[index] = width;
                words[index + 1] = height;
                continue;
            }
            match uniforms.get(&field.name) {
                Some(UniformValue::Float(value)) => words[index] = *value,
                Some(UniformValue::Vec2(value)) => {
                    words[index..index + 2].copy_from_slice(value);
                }
                Some(UniformValue::Color(color)) => {
                    words[index..index + 4].copy_from_slice(&color.to_array());
                }
                None => {
                    tracing::warn!(uniform = %field.name, "uniform missing at pack time; using zero");
                }
            }
        }
        bytemuck::cast_slice(&words).to_vec()
    }
}

/// `(alignment, size)` in bytes under std140.
fn std140_extent(kind: UniformKind) -> (usize, usize) {
    match kind {
        UniformKind::Float => (4, 4),
        UniformKind::Vec2 => (8, 8),
        UniformKind::Color => (16, 16),
        UniformKind::Shader => (1, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::{Color, Resolution, UniformSet};

    const GRADIENT: &str = r"
        uniform float2 resolution;
        uniform float time;
        layout(color) uniform float4 tl;
        uniform float scale;
        uniform shader content;
        float4 main(float2 p) { return tl; }
    ";

    #[test]
    fn follows_std140_alignment() {
        let program = ShaderProgram::parse(GRADIENT).expect("program");
        let layout = UniformLayout::for_program(&program);
        let offsets: Vec<_> = layout
            .fields()
            .iter()
            .map(|field| (field.name.as_str(), field.offset))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("resolution", 0),
                ("time", 8),
                ("tl", 16),
                ("scale", 32),
                (SURFACE_MEMBER, 40),
            ]
        );
        assert_eq!(layout.size(), 48);
        assert!(!layout.glsl_members().contains("content"));
    }

    #[test]
    fn packs_values_at_their_offsets() {
        let program = ShaderProgram::parse(GRADIENT).expect("program");
        let layout = UniformLayout::for_program(&program);
        let values = UniformSet::new()
            .with("resolution", [640.0, 480.0])
            .with("time", 1.5)
            .with("tl", Color::rgba(0.1, 0.2, 0.3, 0.4))
            .with("scale", 2.0);
        let bound = BoundUniforms::new(values, Resolution::new(640, 480));

        let bytes = layout.pack(&bound);
        assert_eq!(bytes.len(), 48);
        let words: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(&words[0..2], &[640.0, 480.0]);
        assert_eq!(words[2], 1.5);
        assert_eq!(&words[4..8], &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(words[8], 2.0);
        assert_eq!(&words[10..12], &[640.0, 480.0]);
    }

    #[test]
    fn empty_interface_still_has_a_member() {
        let program = ShaderProgram::parse("vec4 main(vec2 p) { return vec4(1.0); }")
            .expect("program");
        let layout = UniformLayout::for_program(&program);
        assert_eq!(layout.fields().len(), 1);
        assert_eq!(layout.size(), 16);
    }
}
