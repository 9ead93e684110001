use std::cell::Cell;
use std::rc::Rc;

use frameclock::{FrameTick, FrameTicker, Subscription, TimeProducer};
use image::RgbaImage;

use crate::composite::Composite;
use crate::content::Content;
use crate::error::{BindingReport, EffectError};
use crate::program::{is_reserved, ShaderProgram};
use crate::runtime::{CompiledShader, ShaderRuntime};
use crate::uniforms::{
    BoundUniforms, Resolution, UniformKind, UniformSet, UniformValue, RESOLUTION_UNIFORM,
    TIME_UNIFORM,
};

/// A compiled program bound to its static inputs and a time source.
pub struct ShaderEffect {
    program: ShaderProgram,
    static_uniforms: UniformSet,
    time: Rc<dyn TimeProducer>,
    composite: Composite,
    compiled: Box<dyn CompiledShader>,
}

impl ShaderEffect {
    /// Validates `static_uniforms` against the program and compiles it on
    /// `runtime`.
    ///
    /// Binding problems are reported before the runtime is consulted, so a
    /// mismatch always surfaces as [`EffectError::BindingMismatch`].
    pub fn new(
        program: ShaderProgram,
        static_uniforms: UniformSet,
        time: Rc<dyn TimeProducer>,
        composite: Composite,
        runtime: &dyn ShaderRuntime,
    ) -> Result<Self, EffectError> {
        check_bindings(&program, &static_uniforms)?;
        let compiled = runtime.compile(&program, composite)?;
        tracing::debug!(
            program = program.label(),
            runtime = runtime.name(),
            statics = static_uniforms.len(),
            ?composite,
            "attached shader effect"
        );
        Ok(Self {
            program,
            static_uniforms,
            time,
            composite,
            compiled,
        })
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub fn composite(&self) -> Composite {
        self.composite
    }

    /// Assembles the full uniform set for one frame at `resolution`.
    pub fn bind(&self, resolution: Resolution) -> BoundUniforms {
        let mut values = self.static_uniforms.clone();
        if self.program.declares(TIME_UNIFORM) {
            values.insert(TIME_UNIFORM, self.time.current_time());
        }
        if self.program.declares(RESOLUTION_UNIFORM) {
            values.insert(RESOLUTION_UNIFORM, resolution.as_vec2());
        }
        BoundUniforms::new(values, resolution)
    }

    /// Shades already-rendered `content`; the paint resolution is the
    /// content's size.
    pub fn apply(&self, content: &RgbaImage) -> RgbaImage {
        let (width, height) = content.dimensions();
        let uniforms = self.bind(Resolution::new(width, height));
        tracing::trace!(
            program = self.program.label(),
            time = uniforms.time(),
            resolution = %uniforms.resolution(),
            "evaluating shader effect"
        );
        self.compiled.evaluate(&uniforms, content)
    }
}

impl std::fmt::Debug for ShaderEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderEffect")
            .field("program", &self.program)
            .field("static_uniforms", &self.static_uniforms)
            .field("composite", &self.composite)
            .finish_non_exhaustive()
    }
}

/// Checks that `supplied` binds exactly the caller-provided uniforms the
/// program declares, each with a value of the declared kind.
pub fn check_bindings(program: &ShaderProgram, supplied: &UniformSet) -> Result<(), EffectError> {
    let mut report = BindingReport::default();
    for decl in program.static_uniforms() {
        match supplied.get(&decl.name) {
            None => report.missing.push(decl.name.clone()),
            Some(value) if !kind_matches(decl.kind, value) => {
                report.mistyped.push(decl.name.clone())
            }
            Some(_) => {}
        }
    }
    for (name, _) in supplied.iter() {
        if is_reserved(name) || !program.declares(name) {
            report.unexpected.push(name.to_string());
        }
    }

    if report.is_empty() {
        Ok(())
    } else {
        tracing::debug!(program = program.label(), %report, "uniform binding mismatch");
        Err(EffectError::BindingMismatch(report))
    }
}

fn kind_matches(kind: UniformKind, value: &UniformValue) -> bool {
    value.kind() == kind
}

/// Decorates `element` with `program` using the default
/// [`Composite::MaskByContent`] mode.
pub fn attach<C: Content>(
    element: C,
    program: ShaderProgram,
    static_uniforms: UniformSet,
    time: Rc<dyn TimeProducer>,
    runtime: &dyn ShaderRuntime,
) -> Result<DecoratedElement<C>, EffectError> {
    attach_with_composite(
        element,
        program,
        static_uniforms,
        time,
        Composite::default(),
        runtime,
    )
}

pub fn attach_with_composite<C: Content>(
    element: C,
    program: ShaderProgram,
    static_uniforms: UniformSet,
    time: Rc<dyn TimeProducer>,
    composite: Composite,
    runtime: &dyn ShaderRuntime,
) -> Result<DecoratedElement<C>, EffectError> {
    let effect = ShaderEffect::new(program, static_uniforms, time, composite, runtime)?;
    Ok(DecoratedElement::new(element, effect))
}

/// Content with a shader effect painted over it.
///
/// Decorated elements are content themselves, so effects can be stacked.
#[derive(Debug)]
pub struct DecoratedElement<C> {
    element: C,
    effect: ShaderEffect,
}

impl<C: Content> DecoratedElement<C> {
    pub fn new(element: C, effect: ShaderEffect) -> Self {
        Self { element, effect }
    }

    /// Renders one frame: the element goes to an offscreen buffer that the
    /// effect samples as `content`.
    pub fn paint(&self, resolution: Resolution) -> RgbaImage {
        let content = self.element.render(resolution);
        self.effect.apply(&content)
    }

    pub fn effect(&self) -> &ShaderEffect {
        &self.effect
    }

    pub fn element(&self) -> &C {
        &self.element
    }

    /// Drops the effect, returning the undecorated element.
    pub fn into_inner(self) -> C {
        self.element
    }
}

impl<C: Content + 'static> DecoratedElement<C> {
    /// Paints a frame on every `ticker` tick until the returned handle is
    /// dropped.
    pub fn mount(
        self,
        ticker: &FrameTicker,
        resolution: Resolution,
        mut sink: impl FnMut(&FrameTick, RgbaImage) + 'static,
    ) -> MountedElement {
        let shared_resolution = Rc::new(Cell::new(resolution));
        let frames = Rc::new(Cell::new(0u64));
        let listener_resolution = Rc::clone(&shared_resolution);
        let listener_frames = Rc::clone(&frames);
        let label = self.effect.program.label().to_string();
        let subscription = ticker.subscribe(move |tick| {
            let frame = self.paint(listener_resolution.get());
            listener_frames.set(listener_frames.get() + 1);
            sink(tick, frame);
        });
        tracing::debug!(program = %label, %resolution, "mounted shader effect");
        MountedElement {
            label,
            resolution: shared_resolution,
            frames,
            _subscription: subscription,
        }
    }
}

impl<C: Content> Content for DecoratedElement<C> {
    fn render(&self, resolution: Resolution) -> RgbaImage {
        self.paint(resolution)
    }
}

/// Live subscription of a decorated element to a frame ticker. Dropping it
/// unmounts the element.
pub struct MountedElement {
    label: String,
    resolution: Rc<Cell<Resolution>>,
    frames: Rc<Cell<u64>>,
    _subscription: Subscription,
}

impl MountedElement {
    /// Changes the paint resolution for subsequent frames.
    pub fn resize(&self, resolution: Resolution) {
        self.resolution.set(resolution);
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution.get()
    }

    /// Frames painted since mounting.
    pub fn frames_painted(&self) -> u64 {
        self.frames.get()
    }

    pub fn unmount(self) {}
}

impl Drop for MountedElement {
    fn drop(&mut self) {
        tracing::debug!(
            program = %self.label,
            frames = self.frames.get(),
            "unmounted shader effect"
        );
    }
}
