use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::samples::Sample;
use renderer::{Resolution, RuntimeChoice};

#[derive(Parser, Debug)]
#[command(
    name = "shaderfx",
    author,
    version,
    about = "Render time-animated shader effects over content"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse an effect shader and list the uniforms it declares.
    Inspect(InspectArgs),
    /// Render one still frame to a PNG file.
    Render(RenderArgs),
    /// Render a sequence of frames driven by a frame ticker.
    Animate(AnimateArgs),
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Effect shader source file.
    #[arg(value_name = "SHADER")]
    pub shader: PathBuf,
}

/// Where the layers come from. Without either flag the built-in demo scene
/// is used.
#[derive(Args, Debug)]
pub struct SceneArgs {
    /// Scene description TOML file.
    #[arg(long, value_name = "FILE", conflicts_with = "sample")]
    pub scene: Option<PathBuf>,

    /// Bundled sample effect (`blue-web`, `blue-web-plain`, `gradient`).
    #[arg(long, value_name = "NAME", value_parser = parse_sample)]
    pub sample: Option<Sample>,

    /// Override the surface size (e.g. `640x200`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_surface_size)]
    pub size: Option<Resolution>,

    /// Shader runtime: `auto`, `gpu`, or `software`.
    #[arg(
        long,
        value_name = "RUNTIME",
        value_parser = parse_runtime,
        default_value = "auto"
    )]
    pub runtime: RuntimeChoice,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub scene: SceneArgs,

    /// Animation time in seconds to evaluate the frame at.
    #[arg(long, value_name = "SECONDS", default_value_t = 0.0)]
    pub time: f32,

    /// Output PNG path.
    #[arg(short, long, value_name = "PATH")]
    pub output: PathBuf,
}

#[derive(Args, Debug)]
pub struct AnimateArgs {
    #[command(flatten)]
    pub scene: SceneArgs,

    /// Number of frames to render.
    #[arg(long, value_name = "COUNT", default_value_t = 60)]
    pub frames: u64,

    /// Frame rate; defaults to the scene's frame interval.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Pace frames against the wall clock instead of synthetic timestamps.
    #[arg(long)]
    pub realtime: bool,

    /// Directory receiving `frame_00000.png`, `frame_00001.png`, ...
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_sample(value: &str) -> Result<Sample, String> {
    value.parse()
}

pub fn parse_runtime(value: &str) -> Result<RuntimeChoice, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("runtime must not be empty".to_string());
    }
    trimmed.parse()
}

pub fn parse_surface_size(spec: &str) -> Result<Resolution, String> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 640x200".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".into());
    }

    Ok(Resolution::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::samples::BlueWebVariant;

    #[test]
    fn parses_surface_sizes() {
        assert_eq!(
            parse_surface_size("640x200").unwrap(),
            Resolution::new(640, 200)
        );
        assert_eq!(
            parse_surface_size(" 32 X 16 ").unwrap(),
            Resolution::new(32, 16)
        );
        assert!(parse_surface_size("0x10").is_err());
        assert!(parse_surface_size("640").is_err());
    }

    #[test]
    fn parses_render_invocation() {
        let cli = Cli::try_parse_from([
            "shaderfx",
            "render",
            "--sample",
            "blue-web-plain",
            "--runtime",
            "software",
            "--time",
            "1.5",
            "-o",
            "out.png",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render command");
        };
        assert_eq!(args.scene.sample, Some(Sample::BlueWeb(BlueWebVariant::Plain)));
        assert_eq!(args.scene.runtime, RuntimeChoice::Software);
        assert_eq!(args.time, 1.5);
        assert_eq!(args.output, PathBuf::from("out.png"));
    }

    #[test]
    fn scene_and_sample_conflict() {
        let err = Cli::try_parse_from([
            "shaderfx", "render", "--scene", "a.toml", "--sample", "gradient", "-o", "x.png",
        ]);
        assert!(err.is_err());
    }
}
