use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use frameclock::{
    FixedTimeProducer, FrameClock, FrameDriver, FrameStats, FrameTicker, TimeProducer, TimeUnit,
};
use image::RgbaImage;
use renderer::{select_runtime, ShaderRuntime};
use tracing_subscriber::EnvFilter;

use crate::cli::{AnimateArgs, InspectArgs, RenderArgs, SceneArgs};
use crate::scene::{self, SceneLayer};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let program = scene::read_program(&args.shader)?;
    println!("Shader: {}", args.shader.display());
    println!("Uniforms:");
    if program.uniforms().is_empty() {
        println!("  (none)");
    }
    for decl in program.uniforms() {
        let source = if decl.is_host_supplied() {
            "host"
        } else {
            "caller"
        };
        let layout = if decl.color_layout {
            " layout(color)"
        } else {
            ""
        };
        println!(
            "  {:<16} {:<7} {source}{layout}  (line {})",
            decl.name,
            decl.kind.to_string(),
            decl.line + 1
        );
    }
    let statics: Vec<_> = program
        .static_uniforms()
        .map(|decl| decl.name.as_str())
        .collect();
    if statics.is_empty() {
        println!("Caller supplies: nothing");
    } else {
        println!("Caller supplies: {}", statics.join(", "));
    }
    Ok(())
}

pub fn render(args: RenderArgs) -> Result<()> {
    let elapsed = Duration::try_from_secs_f32(args.time)
        .map_err(|_| anyhow!("--time must be a non-negative number of seconds"))?;
    let config = scene::load(&args.scene)?;
    let resolution = config.resolution();
    let runtime = prepare_runtime(&args.scene)?;

    let layers = scene::build_layers(&config, runtime.as_ref(), |unit: TimeUnit| {
        Rc::new(FixedTimeProducer::new(unit.convert(elapsed))) as Rc<dyn TimeProducer>
    })?;
    let frames: Vec<_> = layers
        .iter()
        .map(|layer| {
            tracing::debug!(
                layer = layer.name(),
                decorated = layer.is_decorated(),
                "painting layer"
            );
            layer.paint(resolution)
        })
        .collect();
    let frame = scene::compose(resolution, &frames);

    if let Some(parent) = args.output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    save_png(&frame, &args.output)?;
    tracing::info!(
        path = %args.output.display(),
        %resolution,
        layers = layers.len(),
        runtime = runtime.name(),
        time = args.time,
        "rendered still frame"
    );
    Ok(())
}

pub fn animate(args: AnimateArgs) -> Result<()> {
    if args.frames == 0 {
        bail!("--frames must be greater than zero");
    }
    let config = scene::load(&args.scene)?;
    let resolution = config.resolution();
    let runtime = prepare_runtime(&args.scene)?;
    let driver = match args.fps {
        Some(fps) => FrameDriver::from_fps(fps, args.realtime),
        None if args.realtime => FrameDriver::Realtime {
            interval: config.frame_interval,
        },
        None => FrameDriver::Fixed {
            interval: config.frame_interval,
        },
    };
    fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    let ticker = FrameTicker::new();
    // Clocks subscribe while layers are built, ahead of every painter.
    let mut clocks: Vec<(TimeUnit, Rc<FrameClock>)> = Vec::new();
    let layers = scene::build_layers(&config, runtime.as_ref(), |unit| {
        let clock = match clocks.iter().find(|(existing, _)| *existing == unit) {
            Some((_, clock)) => Rc::clone(clock),
            None => {
                let clock = Rc::new(FrameClock::new(&ticker, unit));
                clocks.push((unit, Rc::clone(&clock)));
                clock
            }
        };
        clock as Rc<dyn TimeProducer>
    })?;

    let slots: Rc<RefCell<Vec<Option<RgbaImage>>>> =
        Rc::new(RefCell::new(vec![None; layers.len()]));
    let mut mounted = Vec::new();
    for (index, layer) in layers.into_iter().enumerate() {
        match layer {
            SceneLayer::Decorated { name, element } => {
                let sink_slots = Rc::clone(&slots);
                let handle = element.mount(&ticker, resolution, move |_, frame| {
                    sink_slots.borrow_mut()[index] = Some(frame);
                });
                tracing::debug!(layer = %name, "mounted layer");
                mounted.push(handle);
            }
            SceneLayer::Plain { name, element } => {
                tracing::debug!(layer = %name, "painted undecorated layer once");
                slots.borrow_mut()[index] = Some(element.render(resolution));
            }
        }
    }

    let failure: Rc<RefCell<Option<anyhow::Error>>> = Rc::new(RefCell::new(None));
    let writer = {
        let slots = Rc::clone(&slots);
        let failure = Rc::clone(&failure);
        let dir = args.output.clone();
        ticker.subscribe(move |tick| {
            if failure.borrow().is_some() {
                return;
            }
            let frame = scene::compose(resolution, slots.borrow().iter().flatten());
            let path = frame_path(&dir, tick.frame_index);
            if let Err(err) = save_png(&frame, &path) {
                *failure.borrow_mut() = Some(err);
            }
        })
    };
    let stats = Rc::new(RefCell::new(FrameStats::new()));
    let stats_subscription = {
        let stats = Rc::clone(&stats);
        ticker.subscribe(move |tick| stats.borrow_mut().record(tick))
    };

    tracing::info!(
        frames = args.frames,
        interval_ms = driver.interval().as_secs_f32() * 1_000.0,
        realtime = args.realtime,
        runtime = runtime.name(),
        %resolution,
        "animating scene"
    );
    driver.run(&ticker, args.frames);

    drop(writer);
    drop(stats_subscription);
    let painted: Vec<u64> = mounted.iter().map(|handle| handle.frames_painted()).collect();
    drop(mounted);
    let failed = failure.borrow_mut().take();
    if let Some(err) = failed {
        return Err(err);
    }

    let stats = stats.borrow();
    tracing::info!(
        dir = %args.output.display(),
        frames = args.frames,
        painted = ?painted,
        average_ms = stats.average_frame_ms(),
        fps = stats.fps(),
        stalls = stats.stalls(),
        "animation finished"
    );
    Ok(())
}

fn prepare_runtime(args: &SceneArgs) -> Result<Box<dyn ShaderRuntime>> {
    let runtime = select_runtime(args.runtime)
        .with_context(|| format!("failed to initialise the {} runtime", args.runtime))?;
    tracing::debug!(requested = %args.runtime, selected = runtime.name(), "shader runtime ready");
    Ok(runtime)
}

pub fn frame_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("frame_{index:05}.png"))
}

fn save_png(frame: &RgbaImage, path: &Path) -> Result<()> {
    frame
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}
