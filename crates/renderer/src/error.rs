use std::fmt;

/// Failures surfaced while building or attaching a shader effect.
///
/// Both attach-time variants are static: retrying with the same inputs fails
/// the same way.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EffectError {
    #[error("uniform bindings do not match the program: {0}")]
    BindingMismatch(BindingReport),
    #[error("shader runtime unavailable: {0}")]
    UnsupportedShaderRuntime(String),
    #[error("invalid shader program: {0}")]
    InvalidProgram(String),
}

/// Differences between a program's declared uniforms and what the caller
/// supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingReport {
    /// Declared by the program but not supplied.
    pub missing: Vec<String>,
    /// Supplied but not declared, or reserved for the host.
    pub unexpected: Vec<String>,
    /// Supplied with a value of the wrong kind.
    pub mistyped: Vec<String>,
}

impl BindingReport {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mistyped.is_empty()
    }
}

impl fmt::Display for BindingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing [{}]", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected [{}]", self.unexpected.join(", ")));
        }
        if !self.mistyped.is_empty() {
            parts.push(format!("mistyped [{}]", self.mistyped.join(", ")));
        }
        if parts.is_empty() {
            f.write_str("no differences")
        } else {
            f.write_str(&parts.join("; "))
        }
    }
}
