use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use effectconfig::{ContentSetting, EffectSource, Layer, SceneConfig, UniformSetting};
use frameclock::{TimeProducer, TimeUnit};
use image::RgbaImage;
use renderer::samples::Sample;
use renderer::{
    attach_with_composite, blend_over, Composite, Content, DecoratedElement, EffectError, Empty,
    Fill, ImageContent, Pill, Resolution, ShaderProgram, ShaderRuntime,
};

use crate::cli::SceneArgs;

/// Background gradient behind a blue-web button, themed by the palette.
const DEMO_SCENE: &str = r##"
version = 1
width = 480
height = 160
frame_interval = "16ms"

[palette]
primary = "#6650a4"
surface = "#fffbfe"

[[layers]]
name = "background"
sample = "gradient"
content = "none"
composite = "replace"
[layers.uniforms]
tl = "@primary"
br = "@surface"

[[layers]]
name = "button"
sample = "blue-web"
content = "pill"
"##;

/// One paintable layer of a scene.
pub enum SceneLayer {
    Decorated {
        name: String,
        element: DecoratedElement<Box<dyn Content>>,
    },
    /// Content whose effect could not run on the selected runtime.
    Plain {
        name: String,
        element: Box<dyn Content>,
    },
}

impl SceneLayer {
    pub fn name(&self) -> &str {
        match self {
            SceneLayer::Decorated { name, .. } | SceneLayer::Plain { name, .. } => name,
        }
    }

    pub fn is_decorated(&self) -> bool {
        matches!(self, SceneLayer::Decorated { .. })
    }

    pub fn paint(&self, resolution: Resolution) -> RgbaImage {
        match self {
            SceneLayer::Decorated { element, .. } => element.paint(resolution),
            SceneLayer::Plain { element, .. } => element.render(resolution),
        }
    }
}

/// Resolves the scene selected by the command line.
pub fn load(args: &SceneArgs) -> Result<SceneConfig> {
    let mut config = match (&args.scene, args.sample) {
        (Some(path), _) => load_file(path)?,
        (None, Some(sample)) => sample_scene(sample),
        (None, None) => SceneConfig::from_toml_str(DEMO_SCENE).context("invalid demo scene")?,
    };
    if let Some(size) = args.size {
        config.width = size.width;
        config.height = size.height;
    }
    Ok(config)
}

fn load_file(path: &Path) -> Result<SceneConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene at {}", path.display()))?;
    let mut config = SceneConfig::from_toml_str(&text)
        .with_context(|| format!("failed to load scene {}", path.display()))?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    tracing::debug!(path = %path.display(), layers = config.layers.len(), "loaded scene");
    Ok(config)
}

/// Single-layer scene showing one bundled sample the way the demo uses it.
fn sample_scene(sample: Sample) -> SceneConfig {
    let mut palette = BTreeMap::new();
    palette.insert("primary".to_string(), "#6650a4".to_string());
    palette.insert("surface".to_string(), "#fffbfe".to_string());

    let (content, composite, uniforms) = match sample {
        Sample::Gradient => (
            ContentSetting::None,
            Composite::Replace,
            BTreeMap::from([
                ("tl".to_string(), UniformSetting::Text("@primary".into())),
                ("br".to_string(), UniformSetting::Text("@surface".into())),
            ]),
        ),
        Sample::BlueWeb(_) => (ContentSetting::Pill, Composite::MaskByContent, BTreeMap::new()),
    };

    SceneConfig {
        version: 1,
        width: 480,
        height: 160,
        frame_interval: std::time::Duration::from_millis(16),
        palette,
        layers: vec![Layer {
            name: sample.name().to_string(),
            sample: Some(sample.name().to_string()),
            shader: None,
            content,
            color: None,
            composite,
            time_unit: TimeUnit::Seconds,
            uniforms,
        }],
    }
}

/// Attaches every layer's effect on `runtime`. `time_for` supplies the time
/// producer for a layer's unit.
///
/// Effects the runtime cannot run are logged and their content is painted
/// undecorated; any other attach failure aborts.
pub fn build_layers(
    config: &SceneConfig,
    runtime: &dyn ShaderRuntime,
    mut time_for: impl FnMut(TimeUnit) -> Rc<dyn TimeProducer>,
) -> Result<Vec<SceneLayer>> {
    let mut layers = Vec::with_capacity(config.layers.len());
    for layer in &config.layers {
        let program = load_program(layer)?;
        let statics = config.layer_uniforms(layer)?;
        let element = build_content(config, layer)?;
        let time = time_for(layer.time_unit);
        match attach_with_composite(element, program, statics, time, layer.composite, runtime) {
            Ok(element) => layers.push(SceneLayer::Decorated {
                name: layer.name.clone(),
                element,
            }),
            Err(EffectError::UnsupportedShaderRuntime(reason)) => {
                tracing::warn!(
                    layer = %layer.name,
                    runtime = runtime.name(),
                    %reason,
                    "effect unsupported; painting content undecorated"
                );
                layers.push(SceneLayer::Plain {
                    name: layer.name.clone(),
                    element: build_content(config, layer)?,
                });
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to attach effect to layer '{}'", layer.name)
                });
            }
        }
    }
    Ok(layers)
}

fn load_program(layer: &Layer) -> Result<ShaderProgram> {
    match layer.effect_source()? {
        EffectSource::Sample(sample) => Ok(sample.program()?),
        EffectSource::Shader(path) => {
            read_program(&path).map(|program| program.with_label(&layer.name))
        }
    }
}

/// Reads and parses an effect shader file, labelled with its file stem.
pub fn read_program(path: &Path) -> Result<ShaderProgram> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read shader at {}", path.display()))?;
    let label = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("effect")
        .to_string();
    ShaderProgram::parse(source)
        .map(|program| program.with_label(label))
        .with_context(|| format!("failed to parse shader {}", path.display()))
}

fn build_content(config: &SceneConfig, layer: &Layer) -> Result<Box<dyn Content>> {
    let element: Box<dyn Content> = match &layer.content {
        ContentSetting::Fill => Box::new(Fill::new(config.content_color(layer)?)),
        ContentSetting::Pill => Box::new(Pill::new(config.content_color(layer)?)),
        ContentSetting::Image(path) => Box::new(
            ImageContent::open(path)
                .with_context(|| format!("failed to load image {}", path.display()))?,
        ),
        ContentSetting::None => Box::new(Empty),
    };
    Ok(element)
}

/// Source-over blends `frames` bottom to top onto a transparent canvas.
pub fn compose<'a>(
    resolution: Resolution,
    frames: impl IntoIterator<Item = &'a RgbaImage>,
) -> RgbaImage {
    let mut canvas = RgbaImage::new(resolution.width, resolution.height);
    for frame in frames {
        blend_over(&mut canvas, frame);
    }
    canvas
}
